//! RTCM v3 wire-format codec: frame scanner, message dispatcher, and the
//! per-message decoders.

pub mod ephemeris;
pub mod legacy_obs;
pub mod msm;
pub mod options;
pub mod ssr;
pub mod station;
pub mod store;

pub use options::DecoderOptions;
pub use store::{NavigationStore, ObservationEpochStore};

#[cfg(feature = "log")]
use log::{debug, trace, warn};

use thiserror::Error;

use crate::crc24q;
use crate::observation::ObservationEpoch;

/// Framing and field-range problems are folded into [`DispatchOutcome`]
/// rather than this type (they are recoverable and counter-only);
/// `RtcmError` covers what a caller cannot safely ignore.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RtcmError {
    #[error("frame too short: {0} bytes")]
    Truncated(usize),

    #[error("payload length {0} exceeds the 10-bit maximum of 1023")]
    LengthOverflow(usize),

    #[error("CRC-24Q mismatch")]
    CrcMismatch,

    #[error("station id changed from {previous} to {incoming} mid-stream")]
    StationIdChanged { previous: u16, incoming: u16 },

    #[error("MSM cell count {nsat}*{nsig}={product} exceeds 64")]
    TooManyCells { nsat: usize, nsig: usize, product: usize },

    #[error("bit field error: {0}")]
    Bit(#[from] crate::bitbuf::BitError),

    #[error("unknown satellite PRN {prn} for {constellation:?}")]
    UnknownSatellite {
        constellation: crate::sv::Constellation,
        prn: u8,
    },
}

/// What happened to one dispatched message: a sealed variant replacing a
/// boolean/status-code mixture.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A message of a known, handled type was decoded and applied to the
    /// decoder's store/epoch-in-progress.
    Decoded { message_type: u16 },
    /// The type ID is not one this crate decodes; still counted.
    Unsupported { message_type: u16 },
    /// The message was well-framed but semantically rejected: the
    /// frame's CRC was valid but its content violates an invariant (e.g.
    /// station ID mismatch, `nsat*nsig > 64`).
    Rejected { message_type: u16, reason: RtcmError },
    /// A full observation epoch was just completed (`obsflag` cleared).
    ObservationEpochReady(ObservationEpoch),
}

/// Incremental byte-stream framer. Feed bytes one at a time; on a
/// validated frame, [`FrameScanner::feed_byte`] returns the payload
/// (preamble and CRC stripped). Resynchronizes by shifting one byte on
/// preamble mismatch or CRC failure, exactly as specified.
#[derive(Debug, Clone)]
pub struct FrameScanner {
    buf: Vec<u8>,
    frames_accepted: u64,
    resyncs: u64,
    crc_failures: u64,
}

/// Result of feeding one byte to the scanner.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedResult {
    Incomplete,
    Frame(Vec<u8>),
    Resync,
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScanner {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(1029),
            frames_accepted: 0,
            resyncs: 0,
            crc_failures: 0,
        }
    }

    pub fn frames_accepted(&self) -> u64 {
        self.frames_accepted
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    pub fn crc_failures(&self) -> u64 {
        self.crc_failures
    }

    /// Feeds one byte into the scanner, returning a frame when the buffer
    /// holds a complete, CRC-valid preamble-through-payload span.
    pub fn feed_byte(&mut self, byte: u8) -> FeedResult {
        if self.buf.is_empty() {
            if byte != 0xD3 {
                return FeedResult::Incomplete;
            }
            self.buf.push(byte);
            return FeedResult::Incomplete;
        }

        self.buf.push(byte);

        if self.buf.len() < 3 {
            return FeedResult::Incomplete;
        }

        let len = (((self.buf[1] as usize) & 0x03) << 8) | self.buf[2] as usize;
        let total_len = 3 + len + 3;

        if self.buf.len() < total_len {
            return FeedResult::Incomplete;
        }

        let frame = std::mem::take(&mut self.buf);
        if crc24q::verify(&frame[..total_len]) {
            self.frames_accepted += 1;
            #[cfg(feature = "log")]
            trace!("accepted frame, payload_len={}", len);
            FeedResult::Frame(frame[3..3 + len].to_vec())
        } else {
            self.crc_failures += 1;
            self.resyncs += 1;
            #[cfg(feature = "log")]
            warn!("CRC-24Q mismatch, resynchronizing");
            // Resync by shifting one byte, not by discarding the
            // whole buffer — re-feed everything after the first byte.
            for &b in &frame[1..] {
                if let FeedResult::Frame(f) = self.feed_byte(b) {
                    return FeedResult::Frame(f);
                }
            }
            FeedResult::Resync
        }
    }
}

/// Peeks the 12-bit message type from a decoded payload (first 12 bits,
/// big-endian).
pub fn peek_message_type(payload: &[u8]) -> Option<u16> {
    if payload.len() < 2 {
        return None;
    }
    let reader = crate::bitbuf::BitReader::new(payload);
    reader.get_uint(0, 12).ok().map(|v| v as u16)
}

/// Persistent per-stream decoder state: latched
/// station ID, navigation/observation accumulators, per-type counters, and
/// the parsed options string.
#[derive(Debug, Clone)]
pub struct Decoder {
    pub options: DecoderOptions,
    pub nav: NavigationStore,
    pub obs_store: ObservationEpochStore,
    pub station_id: Option<u16>,
    pub type_counters: std::collections::HashMap<u16, u64>,
    pub rejected_counters: std::collections::HashMap<u16, u64>,
    /// Per (satellite, frequency-index) carrier-phase rollover and
    /// loss-of-lock tracking state.
    pub carrier_tracks: std::collections::HashMap<(crate::sv::SV, u8), legacy_obs::CarrierTrack>,
}

impl Decoder {
    pub fn new(options: DecoderOptions) -> Self {
        Self {
            options,
            nav: NavigationStore::new(),
            obs_store: ObservationEpochStore::new(),
            station_id: None,
            type_counters: std::collections::HashMap::new(),
            rejected_counters: std::collections::HashMap::new(),
            carrier_tracks: std::collections::HashMap::new(),
        }
    }

    /// Station-ID consistency: latches on first use; a later mismatch
    /// rejects the frame unless `-STA=<id>` overrides it.
    fn check_station_id(&mut self, incoming: u16) -> Result<(), RtcmError> {
        if let Some(forced) = self.options.station_override {
            self.station_id = Some(forced);
            return Ok(());
        }
        match self.station_id {
            None => {
                self.station_id = Some(incoming);
                Ok(())
            },
            Some(latched) if latched == incoming => Ok(()),
            Some(latched) => Err(RtcmError::StationIdChanged {
                previous: latched,
                incoming,
            }),
        }
    }

    /// Dispatches one already-framed payload: a total function from
    /// type ID to decoder, unsupported types counted but otherwise ignored.
    pub fn dispatch(&mut self, payload: &[u8]) -> DispatchOutcome {
        let Some(message_type) = peek_message_type(payload) else {
            return DispatchOutcome::Rejected {
                message_type: 0,
                reason: RtcmError::Truncated(payload.len()),
            };
        };

        *self.type_counters.entry(message_type).or_insert(0) += 1;
        #[cfg(feature = "log")]
        debug!("dispatching message type {}", message_type);

        let result = match message_type {
            1001..=1004 | 1009..=1012 => {
                legacy_obs::decode(payload, message_type, self).map(|epoch| {
                    if let Some(epoch) = epoch {
                        return DispatchOutcome::ObservationEpochReady(epoch);
                    }
                    DispatchOutcome::Decoded { message_type }
                })
            },
            1005 | 1006 => station::decode_reference_station(payload, message_type, self)
                .map(|_| DispatchOutcome::Decoded { message_type }),
            1007 | 1008 | 1033 => station::decode_descriptor(payload, message_type, self)
                .map(|_| DispatchOutcome::Decoded { message_type }),
            1029 => station::decode_text(payload, self).map(|_| DispatchOutcome::Decoded {
                message_type,
            }),
            1019 | 1020 | 1041 | 1042 | 1044 | 1045 | 1046 => {
                ephemeris::decode(payload, message_type, self).map(|_| DispatchOutcome::Decoded {
                    message_type,
                })
            },
            1071..=1137 => msm::decode(payload, message_type, self).map(|epoch| {
                if let Some(epoch) = epoch {
                    return DispatchOutcome::ObservationEpochReady(epoch);
                }
                DispatchOutcome::Decoded { message_type }
            }),
            1057..=1068 | 1230 | 1240..=1263 | 4076 => {
                ssr::decode(payload, message_type, self).map(|_| DispatchOutcome::Decoded {
                    message_type,
                })
            },
            _ => {
                return DispatchOutcome::Unsupported { message_type };
            },
        };

        match result {
            Ok(outcome) => outcome,
            Err(reason) => {
                *self.rejected_counters.entry(message_type).or_insert(0) += 1;
                #[cfg(feature = "log")]
                warn!("rejected message type {}: {}", message_type, reason);
                DispatchOutcome::Rejected { message_type, reason }
            },
        }
    }

    pub(crate) fn latch_station_id(&mut self, incoming: u16) -> Result<(), RtcmError> {
        self.check_station_id(incoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_accepts_known_rtcm_1005_frame_with_valid_crc() {
        let mut payload = vec![0xD3u8, 0x00, 0x13];
        payload.extend_from_slice(&[
            0x3E, 0xD0, 0x00, 0x26, 0x90, 0x00, 0x00, 0x32, 0x6C, 0x48, 0x6F, 0x45, 0xC0, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00,
        ]);
        crc24q::append(&mut payload);

        let mut scanner = FrameScanner::new();
        let mut result = FeedResult::Incomplete;
        for &b in &payload {
            result = scanner.feed_byte(b);
        }
        assert!(matches!(result, FeedResult::Frame(_)));
        assert_eq!(scanner.frames_accepted(), 1);
    }

    #[test]
    fn scanner_resyncs_on_crc_failure() {
        let mut payload = vec![0xD3u8, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF];
        crc24q::append(&mut payload);
        payload[4] ^= 0xFF; // corrupt payload after framing+crc computed

        let mut scanner = FrameScanner::new();
        let mut saw_resync_or_frame = false;
        for &b in &payload {
            match scanner.feed_byte(b) {
                FeedResult::Resync | FeedResult::Frame(_) => saw_resync_or_frame = true,
                FeedResult::Incomplete => {},
            }
        }
        assert!(saw_resync_or_frame);
    }

    #[test]
    fn station_id_mismatch_is_rejected() {
        let mut decoder = Decoder::new(DecoderOptions::default());
        decoder.latch_station_id(1234).unwrap();
        assert_eq!(
            decoder.latch_station_id(5678),
            Err(RtcmError::StationIdChanged {
                previous: 1234,
                incoming: 5678
            })
        );
    }

    #[test]
    fn station_override_always_succeeds() {
        let mut decoder = Decoder::new(DecoderOptions {
            station_override: Some(42),
            ..Default::default()
        });
        decoder.latch_station_id(1234).unwrap();
        decoder.latch_station_id(9999).unwrap();
        assert_eq!(decoder.station_id, Some(42));
    }

    #[test]
    fn unsupported_type_is_counted_not_rejected() {
        let mut decoder = Decoder::new(DecoderOptions::default());
        let reader_bits = {
            let mut w = crate::bitbuf::BitWriter::with_capacity_bits(16);
            w.set_uint(0, 12, 9999);
            w.into_bytes()
        };
        let outcome = decoder.dispatch(&reader_bits);
        assert_eq!(outcome, DispatchOutcome::Unsupported { message_type: 9999 });
    }
}
