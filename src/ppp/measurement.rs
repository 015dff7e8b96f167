//! Measurement model: for each tracked (satellite, frequency,
//! code-or-phase) observation, computes the observed-minus-computed
//! residual, a sparse Jacobian row into the flat state vector, and the
//! elevation-dependent measurement variance.

use nalgebra::Vector3;

use crate::observation::ObservationRecord;
use crate::rtcm::NavigationStore;
use crate::signal::{SignalCode, SPEED_OF_LIGHT_M_S};
use crate::sv::{Constellation, SV};
use crate::time::GnssTime;

use super::{eclipse, geodesy, windup, PppFilter};

const CODE_SIGMA_BASE_M: f64 = 0.30;
const CODE_SIGMA_ELEVATION_M: f64 = 0.15;
const PHASE_SIGMA_BASE_M: f64 = 0.003;
const PHASE_SIGMA_ELEVATION_M: f64 = 0.0015;
const MIN_ELEVATION_DEG: f64 = 7.0;

/// SNR-dependent variance term, scaled by how far the observed SNR falls
/// below `SNR_MAX_DBHZ`.
const SIGMA_SNR_M: f64 = 0.05;
const SNR_MAX_DBHZ: f64 = 52.0;
const SIGMA_RCV_CODE_M: f64 = 0.10;
const SIGMA_RCV_PHASE_M: f64 = 0.002;
const SIGMA_MEAS_TYPE_CODE: f64 = 1.0;
const SIGMA_MEAS_TYPE_PHASE: f64 = 1.0;
/// GLONASS FDMA code-phase inter-frequency bias, not otherwise modeled.
const GLONASS_CODE_IFB_VARIANCE_M2: f64 = 0.6 * 0.6;
/// Noise amplification of forming an ionosphere-free combination from two
/// noisy frequencies.
const IONO_FREE_COMBINATION_FACTOR: f64 = 3.0;
/// Residual mapping-function/ionosphere-model error not already captured
/// by the estimated troposphere/ionosphere states themselves.
const TROP_RESIDUAL_SIGMA_M: f64 = 0.01;
const IONO_RESIDUAL_SIGMA_M: f64 = 0.03;

/// Reference carrier used to scale the per-satellite ionosphere state
/// (stored in L1-equivalent delay) down to whatever frequency a given
/// observation was made on.
const REFERENCE_FREQ_HZ: f64 = 1.575_42e9;

pub enum Kind {
    Code,
    Phase,
}

/// One linearized measurement: `value` is observed-minus-computed in
/// metres, `jacobian` is a sparse list of `(state_index, coefficient)`
/// pairs, `variance_m2` is the a-priori measurement variance.
pub struct Measurement {
    pub satellite: SV,
    pub kind: Kind,
    pub value: f64,
    pub jacobian: Vec<(usize, f64)>,
    pub variance_m2: f64,
}

fn elevation_rad(receiver_position_m: Vector3<f64>, sat_position_m: Vector3<f64>) -> f64 {
    let up = receiver_position_m.normalize();
    let los = (sat_position_m - receiver_position_m).normalize();
    los.dot(&up).asin()
}

/// System-wide variance scale factor: GLONASS FDMA tracking carries extra
/// code-phase noise relative to CDMA systems.
fn sys_factor(constellation: Constellation) -> f64 {
    match constellation {
        Constellation::Glonass => 1.5,
        _ => 1.0,
    }
}

/// Tracking-code-specific variance scale: semi-codeless P(Y)/encrypted
/// tracking is noisier than direct civilian code tracking.
fn code_quality_factor(code: SignalCode) -> f64 {
    use SignalCode::*;
    match code {
        GpsL1W | GpsL2W | GpsL2D => 2.0,
        _ => 1.0,
    }
}

/// Full measurement-variance model: elevation- and SNR-dependent base
/// noise, scaled by system and tracking-code factors and by the
/// ionosphere-free combination's noise amplification when in use, plus
/// additive contributions from the troposphere/ionosphere residual model
/// error and the broadcast ephemeris variance. GLONASS pseudoranges carry
/// an additional FDMA inter-frequency bias term.
#[allow(clippy::too_many_arguments)]
fn measurement_variance_m2(
    kind: &Kind,
    constellation: Constellation,
    code: SignalCode,
    elevation_rad: f64,
    snr_dbhz: f64,
    iono_free_combination: bool,
    trop_mapping: f64,
    iono_scale: f64,
    eph_var_m2: f64,
) -> f64 {
    let (base_m, elevation_slope_m, sigma_rcv_m, sigma_meas_type) = match kind {
        Kind::Code => (CODE_SIGMA_BASE_M, CODE_SIGMA_ELEVATION_M, SIGMA_RCV_CODE_M, SIGMA_MEAS_TYPE_CODE),
        Kind::Phase => (PHASE_SIGMA_BASE_M, PHASE_SIGMA_ELEVATION_M, SIGMA_RCV_PHASE_M, SIGMA_MEAS_TYPE_PHASE),
    };

    let el_sin = elevation_rad.sin().max(0.05);
    let bracket_m2 = base_m * base_m
        + (elevation_slope_m / el_sin).powi(2)
        + SIGMA_SNR_M * SIGMA_SNR_M * 10f64.powf(0.1 * (SNR_MAX_DBHZ - snr_dbhz))
        + sigma_rcv_m * sigma_rcv_m * sigma_meas_type * sigma_meas_type;

    let sys = sys_factor(constellation);
    let code_phase = code_quality_factor(code);
    let iflc = if iono_free_combination { IONO_FREE_COMBINATION_FACTOR } else { 1.0 };

    let trop_var_m2 = (trop_mapping * TROP_RESIDUAL_SIGMA_M).powi(2);
    let iono_var_m2 = (IONO_RESIDUAL_SIGMA_M).powi(2);

    let mut var = sys * sys * code_phase * code_phase * iflc * iflc * bracket_m2
        + trop_var_m2
        + iono_scale * iono_scale * iono_var_m2
        + eph_var_m2;

    if matches!(kind, Kind::Code) && constellation == Constellation::Glonass {
        var += GLONASS_CODE_IFB_VARIANCE_M2;
    }

    var
}

/// Builds the measurement set for one epoch. Satellites without usable
/// ephemeris, below the elevation mask, or eclipse-excluded are skipped
/// rather than rejected by the outlier test.
pub fn build(filter: &mut PppFilter, observations: &[ObservationRecord], epoch_time: GnssTime, nav: &NavigationStore) -> Vec<Measurement> {
    let mut out = Vec::new();
    let receiver_position_m = filter.position();

    for record in observations {
        let sv = record.satellite;
        let Ok(sat_state) = nav.satposs(epoch_time, sv, 0) else {
            continue;
        };
        if !sat_state.healthy {
            continue;
        }

        let elevation = elevation_rad(receiver_position_m, sat_state.position_m);
        if elevation.to_degrees() < MIN_ELEVATION_DEG {
            continue;
        }
        if eclipse::is_excluded(sv, sat_state.position_m, epoch_time, None) {
            continue;
        }

        let Some(slot) = filter.sat_slots.iter().position(|s| *s == sv) else {
            continue;
        };
        let Some(clock_idx) = filter.layout.clock_index(sv.constellation) else {
            continue;
        };
        let geometric_range_m = (sat_state.position_m - receiver_position_m).norm();
        let los_unit = (sat_state.position_m - receiver_position_m) / geometric_range_m;

        let trop_delay_m = if filter.layout.trop_len > 0 {
            let geodetic = geodesy::ecef_to_geodetic(receiver_position_m);
            let zenith_m = geodesy::saastamoinen_zenith_delay_m(&geodetic);
            let mapping = 1.0 / elevation.sin().max(0.05);
            zenith_m * mapping + filter.x[filter.layout.trop_offset] * mapping
        } else {
            0.0
        };

        let iono_idx = filter.layout.iono_index(slot);
        let iono_l1_m = iono_idx.map(|i| filter.x[i]).unwrap_or(0.0);

        let previous_windup = filter
            .ambiguity_tracks
            .get(&(sv, 0usize))
            .and_then(|track| track.windup_prev_cycles);
        let wind_up_cycles =
            windup::accumulated_windup_cycles(sv, sat_state.position_m, receiver_position_m, epoch_time, previous_windup);
        filter
            .ambiguity_tracks
            .entry((sv, 0usize))
            .or_default()
            .windup_prev_cycles = Some(wind_up_cycles);

        for freq_idx in 0..filter.layout.n_freq.min(record.freq.len()) {
            let slot_obs = &record.freq[freq_idx];
            let Some(code) = slot_obs.code else { continue };
            let freq_hz = code.carrier_frequency_hz(0);
            let wavelength_m = SPEED_OF_LIGHT_M_S / freq_hz;
            let iono_scale = (REFERENCE_FREQ_HZ / freq_hz).powi(2);
            let iono_m = iono_l1_m * iono_scale;

            let mut jacobian = vec![
                (0usize, los_unit.x),
                (1usize, los_unit.y),
                (2usize, los_unit.z),
                (clock_idx, 1.0),
            ];
            if let Some(i) = filter.layout.iono_index(slot) {
                jacobian.push((i, 1.0));
            }
            if filter.layout.trop_len > 0 {
                jacobian.push((filter.layout.trop_offset, 1.0 / elevation.sin().max(0.05)));
            }

            if slot_obs.is_code_present() {
                // L5 receiver DCB only affects the L5 code, never phase.
                let mut code_jacobian = jacobian.clone();
                let dcb_m = if freq_idx == 2 && filter.layout.dcb_len > 0 {
                    code_jacobian.push((filter.layout.dcb_offset, 1.0));
                    filter.x[filter.layout.dcb_offset]
                } else {
                    0.0
                };
                let computed_m =
                    geometric_range_m - SPEED_OF_LIGHT_M_S * sat_state.clock_bias_s + trop_delay_m + iono_m + dcb_m;
                let snr_dbhz = slot_obs.snr_mdbhz as f64 / 1000.0;
                out.push(Measurement {
                    satellite: sv,
                    kind: Kind::Code,
                    value: slot_obs.pseudorange_m - computed_m,
                    jacobian: code_jacobian,
                    variance_m2: measurement_variance_m2(
                        &Kind::Code,
                        sv.constellation,
                        code,
                        elevation,
                        snr_dbhz,
                        filter.config.iono_free_combination,
                        1.0 / elevation.sin().max(0.05),
                        iono_scale,
                        sat_state.variance_m2,
                    ),
                });
            }

            if slot_obs.is_phase_present() {
                let Some(amb_idx) = filter.layout.ambiguity_index(slot, freq_idx) else {
                    continue;
                };
                let mut phase_jacobian = jacobian;
                if let Some(i) = filter.layout.iono_index(slot) {
                    if let Some(entry) = phase_jacobian.iter_mut().find(|(idx, _)| *idx == i) {
                        entry.1 = -1.0;
                    }
                }
                phase_jacobian.push((amb_idx, wavelength_m));

                let computed_m = geometric_range_m - SPEED_OF_LIGHT_M_S * sat_state.clock_bias_s + trop_delay_m - iono_m
                    + wind_up_cycles * wavelength_m
                    + filter.x[amb_idx] * wavelength_m;
                let snr_dbhz = slot_obs.snr_mdbhz as f64 / 1000.0;
                out.push(Measurement {
                    satellite: sv,
                    kind: Kind::Phase,
                    value: slot_obs.carrier_phase_cycles * wavelength_m - computed_m,
                    jacobian: phase_jacobian,
                    variance_m2: measurement_variance_m2(
                        &Kind::Phase,
                        sv.constellation,
                        code,
                        elevation,
                        snr_dbhz,
                        filter.config.iono_free_combination,
                        1.0 / elevation.sin().max(0.05),
                        iono_scale,
                        sat_state.variance_m2,
                    ),
                });
            }
        }
    }

    out
}
