//! Cycle-slip detection: LLI flags from the decoder, the
//! geometry-free combination, and the Melbourne-Wübbena wide-lane
//! combination, each independently capable of marking an ambiguity as
//! slipped.

use crate::observation::{LliFlags, ObservationRecord};
use crate::signal::SignalCode;
use crate::time::GnssTime;

use super::PppFilter;

/// Jump in the geometry-free combination (L1 phase minus L2 phase, in
/// metres) beyond which a slip is declared.
const GF_JUMP_THRESHOLD_M: f64 = 0.05;

/// Jump in the Melbourne-Wübbena wide-lane combination, in metres, beyond
/// which a slip is declared.
const MW_JUMP_THRESHOLD_M: f64 = 10.0;

fn geometry_free_m(freq0_cycles: f64, freq0_hz: f64, freq1_cycles: f64, freq1_hz: f64) -> f64 {
    let lambda0 = crate::signal::SPEED_OF_LIGHT_M_S / freq0_hz;
    let lambda1 = crate::signal::SPEED_OF_LIGHT_M_S / freq1_hz;
    freq0_cycles * lambda0 - freq1_cycles * lambda1
}

fn melbourne_wubbena_m(
    phase0_cycles: f64,
    phase1_cycles: f64,
    freq0_hz: f64,
    freq1_hz: f64,
    code0_m: f64,
    code1_m: f64,
) -> f64 {
    let wide_lane_wavelength_m = crate::signal::SPEED_OF_LIGHT_M_S / (freq0_hz - freq1_hz);
    let phase_term_m = (phase0_cycles - phase1_cycles) * wide_lane_wavelength_m;
    let narrow_lane_code_m = (freq0_hz * code0_m + freq1_hz * code1_m) / (freq0_hz + freq1_hz);
    phase_term_m - narrow_lane_code_m
}

/// Runs every available detector over `observations`, updating each
/// tracked ambiguity's `slipped` flag and the two combinations' previous
/// values in `filter.ambiguity_tracks`.
pub fn detect_all(filter: &mut PppFilter, observations: &[ObservationRecord], _epoch: GnssTime) {
    for record in observations {
        let Some(slot) = filter.sat_slots.iter().position(|s| *s == record.satellite) else {
            continue;
        };

        for freq_idx in 0..filter.layout.n_freq.min(2) {
            let slip_by_lli = record.freq[freq_idx]
                .lli
                .map(|lli| lli.contains(LliFlags::CYCLE_SLIP))
                .unwrap_or(false);

            let key = (record.satellite, freq_idx);
            let track = filter.ambiguity_tracks.entry(key).or_default();
            if slip_by_lli {
                track.slipped = true;
            }
        }

        if filter.layout.n_freq < 2 {
            continue;
        }

        let f0 = &record.freq[0];
        let f1 = &record.freq[1];
        if !f0.is_phase_present() || !f1.is_phase_present() {
            continue;
        }
        let (Some(code0), Some(code1)) = (f0.code, f1.code) else {
            continue;
        };
        // GLONASS FDMA channel number is not tracked at this layer; the
        // nominal (FCN=0) frequency is used, which biases the combination
        // by at most one channel spacing and is a known approximation.
        let freq0_hz = code0.carrier_frequency_hz(0);
        let freq1_hz = code1.carrier_frequency_hz(0);

        let gf = geometry_free_m(f0.carrier_phase_cycles, freq0_hz, f1.carrier_phase_cycles, freq1_hz);
        let mw = melbourne_wubbena_m(
            f0.carrier_phase_cycles,
            f1.carrier_phase_cycles,
            freq0_hz,
            freq1_hz,
            f0.pseudorange_m,
            f1.pseudorange_m,
        );

        let _ = slot;
        for freq_idx in 0..2 {
            let key = (record.satellite, freq_idx);
            let track = filter.ambiguity_tracks.entry(key).or_default();

            if let Some(prev) = track.geometry_free_prev_m {
                if (gf - prev).abs() > GF_JUMP_THRESHOLD_M {
                    track.slipped = true;
                }
            }
            track.geometry_free_prev_m = Some(gf);

            if let Some(prev) = track.melbourne_wubbena_prev_m {
                if (mw - prev).abs() > MW_JUMP_THRESHOLD_M {
                    track.slipped = true;
                }
            }
            track.melbourne_wubbena_prev_m = Some(mw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::SignalObservation;
    use crate::ppp::PppConfig;
    use crate::sv::{Constellation, SV};

    #[test]
    fn lli_flag_marks_slip() {
        let mut filter = PppFilter::new(PppConfig::default());
        let sv = SV::new(Constellation::GPS, 1);
        filter.slot_for(sv);
        let mut rec = ObservationRecord::empty(sv);
        rec.freq[0] = SignalObservation {
            carrier_phase_cycles: 100.0,
            lli: Some(LliFlags::CYCLE_SLIP),
            code: Some(SignalCode::GpsL1C),
            ..Default::default()
        };
        detect_all(&mut filter, &[rec], GnssTime::from_gps_week_tow(2000, 0.0));
        assert!(filter.ambiguity_tracks.get(&(sv, 0)).unwrap().slipped);
    }

    #[test]
    fn geometry_free_jump_marks_slip() {
        let mut filter = PppFilter::new(PppConfig::default());
        let sv = SV::new(Constellation::GPS, 1);
        filter.slot_for(sv);
        let make = |phase0: f64, phase1: f64| {
            let mut rec = ObservationRecord::empty(sv);
            rec.freq[0] = SignalObservation {
                carrier_phase_cycles: phase0,
                pseudorange_m: 20_000_000.0,
                code: Some(SignalCode::GpsL1C),
                ..Default::default()
            };
            rec.freq[1] = SignalObservation {
                carrier_phase_cycles: phase1,
                pseudorange_m: 20_000_000.0,
                code: Some(SignalCode::GpsL2C),
                ..Default::default()
            };
            rec
        };
        let t0 = GnssTime::from_gps_week_tow(2000, 0.0);
        detect_all(&mut filter, &[make(1.0e7, 1.0e7)], t0);
        assert!(!filter.ambiguity_tracks.get(&(sv, 0)).unwrap().slipped);
        detect_all(&mut filter, &[make(1.0e7 + 1000.0, 1.0e7)], t0);
        assert!(filter.ambiguity_tracks.get(&(sv, 0)).unwrap().slipped);
    }
}
