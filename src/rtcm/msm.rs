//! Multi-Signal Message decoders, types 1071-1137 (variants 4-7).
//!
//! All MSM variants share one header layout and one cell-mask-driven body;
//! what differs is pseudorange/phase bit widths and whether Doppler/
//! extended-info fields are present. This is decoded through one generic
//! routine parameterized by [`MsmVariant`], rather than one function per
//! (constellation × variant) combination.

use crate::bitbuf::BitReader;
use crate::observation::{LliFlags, ObservationEpoch, SignalObservation};
use crate::signal::{self, SignalCode};
use crate::sv::{sv_from_wire, Constellation, SV};
use crate::time::GnssTime;

use super::{Decoder, RtcmError};

/// Re-anchoring window for the MSM fine pseudorange field: the coarse
/// range and fine range are combined modulo this many metres.
pub const MSM_PHASE_RANGE_WINDOW_M: f64 = 1171.0;

const LIGHT_MS_M: f64 = 299_792.458; // metres of range per millisecond of light travel

/// CNR field LSB, in dB·Hz, common to all MSM variants.
const MSM_CNR_SCALE_DBHZ: f64 = 0.25;

#[derive(Debug, Clone, Copy)]
struct MsmVariant {
    pr_bits: u32,
    pr_scale_pow2: i32,
    phase_bits: u32,
    lock_bits: u32,
    cnr_bits: u32,
    has_ext_info: bool,
    has_doppler: bool,
}

fn variant_for(message_type: u16) -> Option<MsmVariant> {
    let variant = ((message_type - 1070) % 10).max(1);
    let variant = if (1..=7).contains(&variant) { variant } else { return None };
    Some(match variant {
        4 => MsmVariant {
            pr_bits: 15,
            pr_scale_pow2: -24,
            phase_bits: 22,
            lock_bits: 4,
            cnr_bits: 6,
            has_ext_info: false,
            has_doppler: false,
        },
        5 => MsmVariant {
            pr_bits: 15,
            pr_scale_pow2: -24,
            phase_bits: 22,
            lock_bits: 4,
            cnr_bits: 6,
            has_ext_info: true,
            has_doppler: true,
        },
        6 => MsmVariant {
            pr_bits: 20,
            pr_scale_pow2: -29,
            phase_bits: 24,
            lock_bits: 10,
            cnr_bits: 10,
            has_ext_info: false,
            has_doppler: false,
        },
        7 => MsmVariant {
            pr_bits: 20,
            pr_scale_pow2: -29,
            phase_bits: 24,
            lock_bits: 10,
            cnr_bits: 10,
            has_ext_info: true,
            has_doppler: true,
        },
        _ => return None,
    })
}

fn constellation_for(message_type: u16) -> Constellation {
    match message_type / 10 {
        107 => Constellation::GPS,
        108 => Constellation::Glonass,
        109 => Constellation::Galileo,
        110 => Constellation::SBAS,
        111 => Constellation::QZSS,
        112 => Constellation::BeiDou,
        113 => Constellation::IRNSS,
        _ => Constellation::GPS,
    }
}

/// Decodes one MSM message into the in-progress observation epoch,
/// returning it once `sync` (the `obsflag` sentinel) clears.
pub fn decode(
    payload: &[u8],
    message_type: u16,
    decoder: &mut Decoder,
) -> Result<Option<ObservationEpoch>, RtcmError> {
    let variant = variant_for(message_type).ok_or(RtcmError::Truncated(payload.len()))?;
    let constellation = constellation_for(message_type);
    let r = BitReader::new(payload);
    let mut off = 12;

    let station_id = r.get_uint(off, 12)? as u16;
    off += 12;
    decoder.latch_station_id(station_id)?;

    let time = if constellation == Constellation::Glonass {
        let _dow = r.get_uint(off, 3)?;
        off += 3;
        let tod_ms = r.get_uint(off, 27)? as u32;
        off += 27;
        GnssTime::from_glonass(GnssTime::resolve_tow_ms(
            decoder
                .obs_store
                .reference_epoch()
                .unwrap_or_else(|| GnssTime::from_gps_week_tow(0, 0.0).epoch()),
            tod_ms,
            hifitime::TimeScale::UTC,
        ))
    } else {
        let tow_raw = r.get_uint(off, 30)? as u32;
        off += 30;
        let tow_ms = if constellation == Constellation::BeiDou {
            tow_raw + 14_000
        } else {
            tow_raw
        };
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
    let _iod = r.get_uint(off, 3)?;
    off += 3;
    let _reserved = r.get_uint(off, 7)?;
    off += 7;
    let _clock_steering = r.get_uint(off, 2)?;
    off += 2;
    let _clock_ext = r.get_uint(off, 2)?;
    off += 2;
    let _smoothing = r.get_uint(off, 1)?;
    off += 1;
    let _smoothing_interval = r.get_uint(off, 3)?;
    off += 3;

    let sat_mask = r.get_uint(off, 64)?;
    off += 64;
    let sig_mask = r.get_uint(off, 32)? as u32;
    off += 32;

    let sat_prns: Vec<u8> = (0..64)
        .filter(|i| sat_mask & (1u64 << (63 - i)) != 0)
        .map(|i| (i + 1) as u8)
        .collect();
    let sig_ids: Vec<u8> = (0..32)
        .filter(|i| sig_mask & (1u32 << (31 - i)) != 0)
        .map(|i| (i + 1) as u8)
        .collect();

    let nsat = sat_prns.len();
    let nsig = sig_ids.len();
    let product = nsat * nsig;
    if product > 64 {
        return Err(RtcmError::TooManyCells { nsat, nsig, product });
    }

    let mut cell_mask = vec![false; product];
    for cell in cell_mask.iter_mut() {
        *cell = r.get_uint(off, 1)? != 0;
        off += 1;
    }

    // Satellite rough-range data: integer ms (8 bits) + optional ext-info
    // (4 bits) + rough-rate (14 bits, variants 5/7).
    let mut rough_range_ms = vec![0u8; nsat];
    for v in rough_range_ms.iter_mut() {
        *v = r.get_uint(off, 8)? as u8;
        off += 8;
    }
    if variant.has_ext_info {
        off += 4 * nsat; // satellite extended info, not consumed further
    }
    let mut rough_range_mod_ms = vec![0u16; nsat];
    for v in rough_range_mod_ms.iter_mut() {
        *v = r.get_uint(off, 10)? as u16;
        off += 10;
    }
    if variant.has_doppler {
        off += 14 * nsat; // rough phase-range-rate, not modeled further
    }

    decoder.obs_store.begin_or_continue(station_id, time);

    for (sat_idx, &prn) in sat_prns.iter().enumerate() {
        let Some(sv) = sv_from_wire(constellation, prn) else {
            off_skip_remaining_cells(&r, &mut off, &cell_mask, sat_idx, nsig, &variant);
            continue;
        };

        for sig_idx in 0..nsig {
            let cell_idx = sat_idx * nsig + sig_idx;
            if !cell_mask.get(cell_idx).copied().unwrap_or(false) {
                continue;
            }

            let fine_pr_raw = r.get_int(off, variant.pr_bits as usize)?;
            off += variant.pr_bits as usize;
            let fine_phase_raw = r.get_int(off, variant.phase_bits as usize)?;
            off += variant.phase_bits as usize;
            let lock = r.get_uint(off, variant.lock_bits as usize)? as u8;
            off += variant.lock_bits as usize;
            let _half_cycle = r.get_uint(off, 1)?;
            off += 1;
            let cnr_raw = r.get_uint(off, variant.cnr_bits as usize)? as u32;
            off += variant.cnr_bits as usize;
            let doppler_hz = if variant.has_doppler {
                let raw = r.get_int(off, 15)?;
                off += 15;
                raw as f64 * 0.0001
            } else {
                0.0
            };

            let rough_ms = rough_range_ms[sat_idx] as f64;
            let rough_mod_ms = rough_range_mod_ms[sat_idx] as f64 * 2f64.powi(-10);
            let fine_pr_scale = 2f64.powi(variant.pr_scale_pow2);
            let pseudorange_m = (rough_ms + rough_mod_ms) * LIGHT_MS_M
                + fine_pr_raw as f64 * fine_pr_scale * LIGHT_MS_M;

            let Some(code) = signal::msm_signal_id_to_code(constellation, sig_ids[sig_idx]) else {
                continue;
            };
            let wavelength_m = code.wavelength_m(0);
            let phase_range_m = (rough_ms + rough_mod_ms) * LIGHT_MS_M
                + fine_phase_raw as f64 * fine_pr_scale * LIGHT_MS_M;
            let carrier_phase_cycles = reanchor_phase(
                decoder,
                sv,
                sig_idx as u8,
                pseudorange_m,
                phase_range_m,
                wavelength_m,
                lock,
            );

            let track = decoder
                .carrier_tracks
                .entry((sv, sig_idx as u8))
                .or_default();
            let lli = if lock == 0 && track.prev_lock_indicator == Some(0) {
                LliFlags::CYCLE_SLIP
            } else {
                LliFlags::OK_OR_UNKNOWN
            };
            track.prev_lock_indicator = Some(lock);

            let snr_mdbhz = (cnr_raw as f64 * MSM_CNR_SCALE_DBHZ * 1000.0).round() as u32;

            let epoch = decoder.obs_store.current_mut().expect("just began");
            let record = epoch.satellite_mut(sv);
            record.insert(
                code.nominal_freq_index() as usize,
                SignalObservation {
                    carrier_phase_cycles,
                    pseudorange_m,
                    doppler_hz,
                    snr_mdbhz,
                    lli: Some(lli),
                    code: Some(code),
                },
            );
        }
    }

    Ok(decoder.obs_store.complete_if_done(sync))
}

/// Normalizes carrier-phase so `(phase - integer*wavelength)` stays within
/// [`MSM_PHASE_RANGE_WINDOW_M`] of the rough range, re-anchoring the
/// integer cycle whenever it drifts beyond that window or LLI bit 0 is set.
fn reanchor_phase(
    decoder: &mut Decoder,
    sv: SV,
    freq_idx: u8,
    pseudorange_m: f64,
    phase_range_m: f64,
    wavelength_m: f64,
    lock: u8,
) -> f64 {
    let track = decoder.carrier_tracks.entry((sv, freq_idx)).or_default();
    let raw_cycles = phase_range_m / wavelength_m;

    let needs_reanchor = lock == 0
        || match track.prev_cycles {
            Some(prev) => ((raw_cycles - prev) * wavelength_m).abs() > MSM_PHASE_RANGE_WINDOW_M,
            None => (phase_range_m - pseudorange_m).abs() > MSM_PHASE_RANGE_WINDOW_M,
        };

    if needs_reanchor {
        track.prev_cycles = Some(raw_cycles);
    }
    raw_cycles
}

fn off_skip_remaining_cells(
    r: &BitReader,
    off: &mut usize,
    cell_mask: &[bool],
    sat_idx: usize,
    nsig: usize,
    variant: &MsmVariant,
) {
    let per_cell_bits = variant.pr_bits as usize
        + variant.phase_bits as usize
        + variant.lock_bits as usize
        + 1
        + variant.cnr_bits as usize
        + if variant.has_doppler { 15 } else { 0 };
    for sig_idx in 0..nsig {
        let cell_idx = sat_idx * nsig + sig_idx;
        if cell_mask.get(cell_idx).copied().unwrap_or(false) {
            *off += per_cell_bits;
        }
    }
    let _ = r;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_tables_match_known_bit_widths() {
        let v4 = variant_for(1077 - 3).unwrap(); // 1074 GPS MSM4
        assert_eq!(v4.pr_bits, 15);
        assert_eq!(v4.phase_bits, 22);
        let v7 = variant_for(1077).unwrap(); // 1077 GPS MSM7
        assert_eq!(v7.pr_bits, 20);
        assert_eq!(v7.phase_bits, 24);
        assert!(v7.has_doppler);
    }

    #[test]
    fn too_many_cells_is_rejected() {
        // 9 satellites * 8 signals = 72 > 64.
        let mut w = crate::bitbuf::BitWriter::with_capacity_bits(2000);
        w.set_uint(0, 12, 1077);
        w.set_uint(12, 12, 1);
        w.set_uint(24, 30, 0);
        w.set_uint(54, 1, 0);
        w.set_uint(55, 3, 0);
        w.set_uint(58, 7, 0);
        w.set_uint(65, 2, 0);
        w.set_uint(67, 2, 0);
        w.set_uint(69, 1, 0);
        w.set_uint(70, 3, 0);
        let mut sat_mask: u64 = 0;
        for i in 0..9 {
            sat_mask |= 1u64 << (63 - i);
        }
        w.set_uint(73, 64, sat_mask);
        let mut sig_mask: u32 = 0;
        for i in 0..8 {
            sig_mask |= 1u32 << (31 - i);
        }
        w.set_uint(137, 32, sig_mask as u64);
        let payload = w.into_bytes();

        let mut decoder = Decoder::new(crate::rtcm::DecoderOptions::default());
        let err = decode(&payload, 1077, &mut decoder).unwrap_err();
        assert!(matches!(err, RtcmError::TooManyCells { .. }));
    }
}
