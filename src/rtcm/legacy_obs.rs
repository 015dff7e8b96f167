//! Legacy GPS/GLONASS observation messages, 1001-1004 and 1009-1012.
//!
//! All four GPS variants (and their GLONASS counterparts) share one header
//! parse and one per-satellite field parse, parameterized on "has L2" and
//! "has CNR" rather than four duplicated decoders.

use crate::bitbuf::BitReader;
use crate::observation::{LliFlags, ObservationEpoch, SignalObservation};
use crate::signal::SignalCode;
use crate::sv::{sv_from_wire, Constellation, SV};
use crate::time::GnssTime;

use super::{Decoder, RtcmError};

const GPS_AMBIGUITY_UNIT_M: f64 = 299_792.458;
const GLONASS_AMBIGUITY_UNIT_M: f64 = 599_584.916;
const PSEUDORANGE_LSB_M: f64 = 0.02;
const PHASE_LSB_CYCLES: f64 = 0.0005;
const INVALID_PHASE_RAW: i64 = -(1i64 << 19); // sentinel 0xFFF80000 over 20 bits
const L2_PR_DIFF_INVALID_RAW: i64 = -(1i64 << 13); // sentinel 0xFFFFE000 over 14 bits
const PHASE_ROLLOVER_THRESHOLD_CYCLES: f64 = 750.0;
const PHASE_ROLLOVER_STEP_CYCLES: f64 = 1500.0;

/// Per (satellite, frequency-index) rollover/LLI tracking state the decoder
/// retains between epochs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CarrierTrack {
    pub prev_cycles: Option<f64>,
    pub prev_lock_indicator: Option<u8>,
}

/// Non-linear lock-indicator → approximate lock-time (seconds), decoded
/// through the standard RTCM/RTKLIB lock-time table.
pub fn lock_time_s(indicator: u8) -> u32 {
    const TABLE: [u32; 16] = [
        0, 24, 72, 168, 360, 744, 1512, 3096, 6264, 12552, 24120, 48176, 96312, 192624, 385248,
        785000,
    ];
    let idx = ((indicator as usize) / 8).min(TABLE.len() - 1);
    TABLE[idx]
}

fn is_glonass(message_type: u16) -> bool {
    (1009..=1012).contains(&message_type)
}

fn has_l2(message_type: u16) -> bool {
    matches!(message_type, 1003 | 1004 | 1011 | 1012)
}

fn has_cnr(message_type: u16) -> bool {
    matches!(message_type, 1002 | 1004 | 1010 | 1012)
}

fn l2_code_to_signal(constellation: Constellation, selector: u8) -> SignalCode {
    match (constellation, selector) {
        (Constellation::GPS, 0) => SignalCode::GpsL2X,
        (Constellation::GPS, 1) => SignalCode::GpsL2P,
        (Constellation::GPS, 2) => SignalCode::GpsL2D,
        (Constellation::GPS, _) => SignalCode::GpsL2W,
        (_, 0) => SignalCode::GloG2C,
        _ => SignalCode::GloG2P,
    }
}

/// Decodes one legacy observation message, feeding it into the decoder's
/// in-progress [`crate::rtcm::ObservationEpochStore`]. Returns `Some(epoch)`
/// once `obsflag` (the sync bit clearing) completes the epoch.
pub fn decode(
    payload: &[u8],
    message_type: u16,
    decoder: &mut Decoder,
) -> Result<Option<ObservationEpoch>, RtcmError> {
    let r = BitReader::new(payload);
    let mut off = 12; // message type already consumed by peek

    let station_id = r.get_uint(off, 12)? as u16;
    off += 12;

    let glonass = is_glonass(message_type);
    let constellation = if glonass {
        Constellation::Glonass
    } else {
        Constellation::GPS
    };

    let time = if glonass {
        let _dow = r.get_uint(off, 3)?;
        off += 3;
        let tod_ms = r.get_uint(off, 27)? as u32;
        off += 27;
        // tod_ms is GLONASS time-of-day (UTC+3h); resolved against UTC
        // here, then reinterpreted as GLONASS broadcast time.
        GnssTime::from_glonass(GnssTime::resolve_tow_ms(
            decoder
                .obs_store
                .reference_epoch()
                .unwrap_or_else(|| GnssTime::from_gps_week_tow(0, 0.0).epoch()),
            tod_ms,
            hifitime::TimeScale::UTC,
        ))
    } else {
        let tow_ms = r.get_uint(off, 30)? as u32;
        off += 30;
        GnssTime::from_epoch(GnssTime::resolve_tow_ms(
            decoder
                .obs_store
                .reference_epoch()
                .unwrap_or_else(|| GnssTime::from_gps_week_tow(0, 0.0).epoch()),
            tow_ms,
            hifitime::TimeScale::GPST,
        ))
    };

    let sync = r.get_uint(off, 1)? != 0;
    off += 1;
    let nsat = r.get_uint(off, 5)? as usize;
    off += 5;
    let _smoothing_indicator = r.get_uint(off, 1)?;
    off += 1;
    let _smoothing_interval = r.get_uint(off, 3)?;
    off += 3;

    decoder.latch_station_id(station_id)?;
    let l2 = has_l2(message_type);
    let cnr = has_cnr(message_type);

    let ambiguity_unit_m = if glonass {
        GLONASS_AMBIGUITY_UNIT_M
    } else {
        GPS_AMBIGUITY_UNIT_M
    };

    decoder.obs_store.begin_or_continue(station_id, time);

    for _ in 0..nsat {
        let prn = r.get_uint(off, 6)? as u8;
        off += 6;
        let sv = sv_from_wire(constellation, prn.max(1))
            .ok_or(RtcmError::UnknownSatellite { constellation, prn })?;

        let _l1_code_indicator = r.get_uint(off, 1)?;
        off += 1;
        let l1_ambiguity = r.get_uint(off, 8)? as f64;
        off += 8;
        let l1_pr_raw = r.get_uint(off, 24)? as f64;
        off += 24;
        let l1_pr_m = l1_ambiguity * ambiguity_unit_m + l1_pr_raw * PSEUDORANGE_LSB_M;

        let l1_phase_raw = r.get_int(off, 20)?;
        off += 20;
        let l1_lock = r.get_uint(off, 7)? as u8;
        off += 7;

        let l1_cnr_mdbhz = if cnr || !l2 {
            let raw = r.get_uint(off, 8)?;
            off += 8;
            (raw as f64 * 0.25 * 1000.0) as u32
        } else {
            0
        };

        let track_key = (sv, 0u8);
        let track = decoder.carrier_tracks.entry(track_key).or_default();
        let mut l1_phase_cycles = if l1_phase_raw == INVALID_PHASE_RAW {
            0.0
        } else {
            l1_phase_raw as f64 * PHASE_LSB_CYCLES + l1_ambiguity * ambiguity_unit_m
                / wavelength_for(constellation, 0)
        };
        apply_rollover(track, &mut l1_phase_cycles);

        let l1_lli = compute_lli(track.prev_lock_indicator, l1_lock);
        track.prev_lock_indicator = Some(l1_lock);

        let epoch = decoder.obs_store.current_mut().expect("just began");
        let record = epoch.satellite_mut(sv);
        record.insert(
            0,
            SignalObservation {
                carrier_phase_cycles: l1_phase_cycles,
                pseudorange_m: l1_pr_m,
                doppler_hz: 0.0,
                snr_mdbhz: l1_cnr_mdbhz,
                lli: Some(l1_lli),
                code: Some(if glonass {
                    SignalCode::GloG1C
                } else {
                    SignalCode::GpsL1C
                }),
            },
        );

        if l2 {
            let l2_code_sel = r.get_uint(off, 2)? as u8;
            off += 2;
            let l2_pr_diff_raw = r.get_int(off, 14)?;
            off += 14;
            let l2_phase_raw = r.get_int(off, 20)?;
            off += 20;
            let l2_lock = r.get_uint(off, 7)? as u8;
            off += 7;
            let l2_cnr_mdbhz = if cnr {
                let raw = r.get_uint(off, 8)?;
                off += 8;
                (raw as f64 * 0.25 * 1000.0) as u32
            } else {
                0
            };

            let l2_pr_m = if l2_pr_diff_raw == L2_PR_DIFF_INVALID_RAW {
                0.0
            } else {
                l1_pr_m + l2_pr_diff_raw as f64 * PSEUDORANGE_LSB_M
            };

            let l2_track_key = (sv, 1u8);
            let l2_track = decoder.carrier_tracks.entry(l2_track_key).or_default();
            let mut l2_phase_cycles = if l2_phase_raw == INVALID_PHASE_RAW {
                0.0
            } else {
                l2_phase_raw as f64 * PHASE_LSB_CYCLES
                    + l1_ambiguity * ambiguity_unit_m / wavelength_for(constellation, 1)
            };
            apply_rollover(l2_track, &mut l2_phase_cycles);
            let l2_lli = compute_lli(l2_track.prev_lock_indicator, l2_lock);
            l2_track.prev_lock_indicator = Some(l2_lock);

            let epoch = decoder.obs_store.current_mut().expect("just began");
            let record = epoch.satellite_mut(sv);
            record.insert(
                1,
                SignalObservation {
                    carrier_phase_cycles: l2_phase_cycles,
                    pseudorange_m: l2_pr_m,
                    doppler_hz: 0.0,
                    snr_mdbhz: l2_cnr_mdbhz,
                    lli: Some(l2_lli),
                    code: Some(l2_code_to_signal(constellation, l2_code_sel)),
                },
            );
        }
    }

    Ok(decoder.obs_store.complete_if_done(sync))
}

fn wavelength_for(constellation: Constellation, freq_idx: u8) -> f64 {
    let code = match (constellation, freq_idx) {
        (Constellation::Glonass, 0) => SignalCode::GloG1C,
        (Constellation::Glonass, _) => SignalCode::GloG2C,
        (_, 0) => SignalCode::GpsL1C,
        _ => SignalCode::GpsL2C,
    };
    code.wavelength_m(0)
}

/// Unwraps a carrier-phase value against the previous epoch's: a jump of
/// more than ±750 cycles is assumed to be a ±1500-cycle wrap, not a slip.
fn apply_rollover(track: &mut CarrierTrack, value: &mut f64) {
    if let Some(prev) = track.prev_cycles {
        let delta = *value - prev;
        if delta > PHASE_ROLLOVER_THRESHOLD_CYCLES {
            *value -= PHASE_ROLLOVER_STEP_CYCLES;
        } else if delta < -PHASE_ROLLOVER_THRESHOLD_CYCLES {
            *value += PHASE_ROLLOVER_STEP_CYCLES;
        }
    }
    track.prev_cycles = Some(*value);
}

/// Flags a cycle slip when the lock indicator resets (zero following zero)
/// or drops below its previous value, either of which implies the receiver
/// re-acquired lock since the last epoch.
fn compute_lli(previous: Option<u8>, incoming: u8) -> LliFlags {
    match previous {
        Some(0) if incoming == 0 => LliFlags::CYCLE_SLIP,
        Some(prev) if incoming < prev => LliFlags::CYCLE_SLIP,
        _ => LliFlags::OK_OR_UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollover_wraps_past_positive_threshold() {
        let mut track = CarrierTrack {
            prev_cycles: Some(1000.0),
            prev_lock_indicator: None,
        };
        let mut value = 1000.0 - 1200.0; // deviates by -1200
        apply_rollover(&mut track, &mut value);
        assert!((value - (1000.0 - 1200.0 + 1500.0)).abs() < 1.0e-9);
    }

    #[test]
    fn lli_flags_on_zero_to_zero_lock() {
        assert_eq!(compute_lli(Some(0), 0), LliFlags::CYCLE_SLIP);
        assert_eq!(compute_lli(Some(50), 10), LliFlags::CYCLE_SLIP);
        assert_eq!(compute_lli(Some(10), 50), LliFlags::OK_OR_UNKNOWN);
    }

    #[test]
    fn lock_time_table_is_monotonic() {
        let mut last = 0;
        for i in (0..128).step_by(8) {
            let t = lock_time_s(i as u8);
            assert!(t >= last);
            last = t;
        }
    }
}
