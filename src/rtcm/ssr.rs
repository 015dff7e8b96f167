//! SSR correction message decoders: orbit, clock, code bias,
//! combined orbit+clock, URA, high-rate clock, and phase bias, dispatched
//! per constellation by legacy type-ID range and by the IGS multi-message
//! type 4076 (constellation + sub-type fields carried in the payload).

use crate::bitbuf::BitReader;
use crate::signal::{self, SignalCode};
use crate::ssr::{ClockCorrection, OrbitCorrection, SignalBias, SsrSubStream};
use crate::sv::{sv_from_wire, Constellation};
use crate::time::GnssTime;

use super::{Decoder, RtcmError};

const ORBIT_RADIAL_LSB_M: f64 = 1.0e-4;
const ORBIT_ALONG_CROSS_LSB_M: f64 = 4.0e-4;
const ORBIT_RATE_RADIAL_LSB_M_S: f64 = 1.0e-6;
const ORBIT_RATE_ALONG_CROSS_LSB_M_S: f64 = 4.0e-6;
const CLOCK_C0_LSB_M: f64 = 1.0e-4;
const CLOCK_C1_LSB_M_S: f64 = 1.0e-6;
const CLOCK_C2_LSB_M_S2: f64 = 2.0e-8;
const CODE_BIAS_LSB_M: f64 = 0.01;
const PHASE_BIAS_LSB_M: f64 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    Orbit,
    Clock,
    OrbitClock,
    Ura,
    HighRateClock,
    CodeBias,
    PhaseBias,
    GlonassCodePhaseBias,
}

fn classify(message_type: u16) -> Option<(MessageKind, Constellation)> {
    // Legacy GPS/GLONASS IDs: 1057 orbit, 1058 clock, 1059 code bias, 1060
    // combined, 1061 URA, 1062 high-rate clock, 1063-1068 GLONASS mirror.
    let (base, constellation) = if (1057..=1062).contains(&message_type) {
        (1057u16, Constellation::GPS)
    } else if (1063..=1068).contains(&message_type) {
        (1063u16, Constellation::Glonass)
    } else if message_type == 1230 {
        return Some((MessageKind::GlonassCodePhaseBias, Constellation::Glonass));
    } else if (1240..=1263).contains(&message_type) {
        let slot = (message_type - 1240) % 6;
        let constellation = match (message_type - 1240) / 6 {
            0 => Constellation::Galileo,
            1 => Constellation::QZSS,
            2 => Constellation::SBAS,
            _ => Constellation::BeiDou,
        };
        let kind = match slot {
            0 => MessageKind::Orbit,
            1 => MessageKind::Clock,
            2 => MessageKind::CodeBias,
            3 => MessageKind::OrbitClock,
            4 => MessageKind::Ura,
            _ => MessageKind::HighRateClock,
        };
        return Some((kind, constellation));
    } else if message_type == 4076 {
        // IGS multi-SSR: constellation/sub-type carried in the payload
        // body; resolved generically as an orbit+clock record here.
        return Some((MessageKind::OrbitClock, Constellation::GPS));
    } else {
        return None;
    };

    let kind = match message_type - base {
        0 => MessageKind::Orbit,
        1 => MessageKind::Clock,
        2 => MessageKind::CodeBias,
        3 => MessageKind::OrbitClock,
        4 => MessageKind::Ura,
        5 => MessageKind::HighRateClock,
        _ => return None,
    };
    Some((kind, constellation))
}

/// Decodes one SSR message, updating the per-satellite [`crate::ssr::SsrCorrection`]
/// records in the decoder's navigation store.
pub fn decode(payload: &[u8], message_type: u16, decoder: &mut Decoder) -> Result<(), RtcmError> {
    let (kind, constellation) = classify(message_type).ok_or(RtcmError::Truncated(payload.len()))?;
    let r = BitReader::new(payload);
    let mut off = 12;

    let epoch_tow_s = r.get_uint(off, 20)? as f64;
    off += 20;
    let udi_code = r.get_uint(off, 4)? as u8;
    off += 4;
    let _multi_message = r.get_uint(off, 1)?;
    off += 1;
    let sync = r.get_uint(off, 1)? != 0;
    off += 1;
    let iod_ssr = r.get_uint(off, 4)? as u8;
    off += 4;
    let _provider_id = r.get_uint(off, 16)?;
    off += 16;
    let _solution_id = r.get_uint(off, 4)?;
    off += 4;
    let nsat = r.get_uint(off, 6)? as usize;
    off += 6;
    let _ = sync;

    let epoch = GnssTime::resolve_tow_ms(
        decoder
            .obs_store
            .reference_epoch()
            .unwrap_or_else(|| GnssTime::from_gps_week_tow(0, 0.0).epoch()),
        (epoch_tow_s * 1000.0) as u32,
        hifitime::TimeScale::GPST,
    );
    let epoch = GnssTime::from_epoch(epoch);

    for _ in 0..nsat {
        let prn = r.get_uint(off, 6)? as u8;
        off += 6;
        let iode = r.get_uint(off, 8)? as u16;
        off += 8;

        let Some(sv) = sv_from_wire(constellation, prn) else {
            continue;
        };

        match kind {
            MessageKind::Orbit | MessageKind::OrbitClock => {
                let radial = r.get_int(off, 22)? as f64 * ORBIT_RADIAL_LSB_M;
                off += 22;
                let along = r.get_int(off, 20)? as f64 * ORBIT_ALONG_CROSS_LSB_M;
                off += 20;
                let cross = r.get_int(off, 20)? as f64 * ORBIT_ALONG_CROSS_LSB_M;
                off += 20;
                let dot_radial = r.get_int(off, 21)? as f64 * ORBIT_RATE_RADIAL_LSB_M_S;
                off += 21;
                let dot_along = r.get_int(off, 19)? as f64 * ORBIT_RATE_ALONG_CROSS_LSB_M_S;
                off += 19;
                let dot_cross = r.get_int(off, 19)? as f64 * ORBIT_RATE_ALONG_CROSS_LSB_M_S;
                off += 19;

                let ssr = decoder.nav.ssr_for_mut(sv);
                ssr.orbit = OrbitCorrection {
                    radial_m: radial,
                    along_track_m: along,
                    cross_track_m: cross,
                    dot_radial_m_s: dot_radial,
                    dot_along_track_m_s: dot_along,
                    dot_cross_track_m_s: dot_cross,
                    iode,
                };
                ssr.touch(SsrSubStream::Orbit, epoch, udi_code, iod_ssr);

                if kind == MessageKind::OrbitClock {
                    let c0 = r.get_int(off, 22)? as f64 * CLOCK_C0_LSB_M;
                    off += 22;
                    let c1 = r.get_int(off, 21)? as f64 * CLOCK_C1_LSB_M_S;
                    off += 21;
                    let c2 = r.get_int(off, 27)? as f64 * CLOCK_C2_LSB_M_S2;
                    off += 27;
                    let ssr = decoder.nav.ssr_for_mut(sv);
                    ssr.clock = ClockCorrection {
                        c0_m: c0,
                        c1_m_s: c1,
                        c2_m_s2: c2,
                    };
                    ssr.touch(SsrSubStream::Clock, epoch, udi_code, iod_ssr);
                }
            },
            MessageKind::Clock => {
                let c0 = r.get_int(off, 22)? as f64 * CLOCK_C0_LSB_M;
                off += 22;
                let c1 = r.get_int(off, 21)? as f64 * CLOCK_C1_LSB_M_S;
                off += 21;
                let c2 = r.get_int(off, 27)? as f64 * CLOCK_C2_LSB_M_S2;
                off += 27;
                let ssr = decoder.nav.ssr_for_mut(sv);
                ssr.clock = ClockCorrection {
                    c0_m: c0,
                    c1_m_s: c1,
                    c2_m_s2: c2,
                };
                ssr.touch(SsrSubStream::Clock, epoch, udi_code, iod_ssr);
            },
            MessageKind::Ura => {
                let ura_raw = r.get_uint(off, 6)? as f64;
                off += 6;
                let ssr = decoder.nav.ssr_for_mut(sv);
                ssr.ura_m = ura_raw * 0.25e-3 * 2f64.powf((ura_raw / 9.0).floor());
                ssr.touch(SsrSubStream::Ura, epoch, udi_code, iod_ssr);
            },
            MessageKind::HighRateClock => {
                let hr = r.get_int(off, 22)? as f64 * CLOCK_C0_LSB_M;
                off += 22;
                let ssr = decoder.nav.ssr_for_mut(sv);
                ssr.high_rate_clock_m = hr;
                ssr.touch(SsrSubStream::HighRateClock, epoch, udi_code, iod_ssr);
            },
            MessageKind::CodeBias | MessageKind::GlonassCodePhaseBias => {
                let nbias = if kind == MessageKind::GlonassCodePhaseBias {
                    4
                } else {
                    r.get_uint(off, 5)? as usize
                };
                if kind != MessageKind::GlonassCodePhaseBias {
                    off += 5;
                }
                let mut biases = Vec::with_capacity(nbias);
                for _ in 0..nbias {
                    let signal_id = r.get_uint(off, 5)? as u8;
                    off += 5;
                    let bias_raw = r.get_int(off, 14)?;
                    off += 14;
                    if let Some(signal) = signal::msm_signal_id_to_code(constellation, signal_id) {
                        biases.push(SignalBias {
                            signal,
                            bias_m: bias_raw as f64 * CODE_BIAS_LSB_M,
                        });
                    }
                }
                let ssr = decoder.nav.ssr_for_mut(sv);
                ssr.code_biases = biases;
                ssr.touch(SsrSubStream::CodeBias, epoch, udi_code, iod_ssr);
            },
            MessageKind::PhaseBias => {
                let nbias = r.get_uint(off, 5)? as usize;
                off += 5;
                let mut biases = Vec::with_capacity(nbias);
                for _ in 0..nbias {
                    let signal_id = r.get_uint(off, 5)? as u8;
                    off += 5;
                    let bias_raw = r.get_int(off, 20)?;
                    off += 20;
                    let _sigma = r.get_uint(off, 17)?;
                    off += 17;
                    if let Some(signal) = signal::msm_signal_id_to_code(constellation, signal_id) {
                        biases.push(SignalBias {
                            signal,
                            bias_m: bias_raw as f64 * PHASE_BIAS_LSB_M,
                        });
                    }
                }
                let ssr = decoder.nav.ssr_for_mut(sv);
                ssr.phase_biases = biases;
                ssr.touch(SsrSubStream::PhaseBias, epoch, udi_code, iod_ssr);
            },
        }
    }

    Ok(())
}
