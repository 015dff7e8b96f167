//! Iterative measurement update: rebuilds the linearized
//! measurement set each pass, applies sequential scalar Kalman updates
//! over the active-state subset, and rejects any measurement whose
//! normalized innovation exceeds `thres_reject_sigma`, up to `max_iter`
//! passes or until nothing more is rejected.

use std::collections::{HashMap, HashSet};

use crate::observation::ObservationRecord;
use crate::rtcm::NavigationStore;
use crate::time::GnssTime;

use super::measurement;
use super::{PppFilter, PppStatus};

/// The states the update runs over this epoch: the position/velocity/
/// acceleration block (`i < 9`) unconditionally, plus any other state
/// that has already been given a real value and a positive variance.
/// Everything else sits at its prior (zero, untouched) and is left out of
/// the linear algebra rather than multiplied through as dead weight.
fn active_indices(x: &nalgebra::DVector<f64>, p: &nalgebra::DMatrix<f64>) -> Vec<usize> {
    (0..x.len())
        .filter(|&i| i < 9 || (x[i] != 0.0 && p[(i, i)] > 0.0))
        .collect()
}

/// Gathers the full state's active rows/columns into a dense compressed
/// (x, P) pair.
fn compress(
    x: &nalgebra::DVector<f64>,
    p: &nalgebra::DMatrix<f64>,
    active: &[usize],
) -> (nalgebra::DVector<f64>, nalgebra::DMatrix<f64>) {
    let m = active.len();
    let mut cx = nalgebra::DVector::zeros(m);
    let mut cp = nalgebra::DMatrix::zeros(m, m);
    for (ci, &i) in active.iter().enumerate() {
        cx[ci] = x[i];
        for (cj, &j) in active.iter().enumerate() {
            cp[(ci, cj)] = p[(i, j)];
        }
    }
    (cx, cp)
}

/// Scatters a compressed (x, P) pair back into the full state; inactive
/// entries are left exactly as they were.
fn scatter(
    x: &mut nalgebra::DVector<f64>,
    p: &mut nalgebra::DMatrix<f64>,
    active: &[usize],
    cx: &nalgebra::DVector<f64>,
    cp: &nalgebra::DMatrix<f64>,
) {
    for (ci, &i) in active.iter().enumerate() {
        x[i] = cx[ci];
        for (cj, &j) in active.iter().enumerate() {
            p[(i, j)] = cp[(ci, cj)];
        }
    }
}

/// Rewrites a sparse full-state jacobian into compressed-index space,
/// dropping any term whose state isn't in the active subset: a state that
/// hasn't been initialized yet contributes nothing to this pass.
fn remap_jacobian(jacobian: &[(usize, f64)], index_map: &HashMap<usize, usize>) -> Vec<(usize, f64)> {
    jacobian
        .iter()
        .filter_map(|&(idx, coeff)| index_map.get(&idx).map(|&ci| (ci, coeff)))
        .collect()
}

/// Applies one scalar measurement update in place over the compressed
/// state, returning the normalized innovation `|y| / sqrt(HPH^T + R)` so
/// the caller can decide whether to reject it.
fn scalar_update(
    x: &mut nalgebra::DVector<f64>,
    p: &mut nalgebra::DMatrix<f64>,
    value: f64,
    variance_m2: f64,
    jacobian: &[(usize, f64)],
) -> f64 {
    let n = x.len();
    let mut p_ht = vec![0.0; n];
    for row in 0..n {
        let mut sum = 0.0;
        for &(col, coeff) in jacobian {
            sum += p[(row, col)] * coeff;
        }
        p_ht[row] = sum;
    }

    let mut h_p_ht = 0.0;
    for &(col, coeff) in jacobian {
        h_p_ht += coeff * p_ht[col];
    }

    let s = h_p_ht + variance_m2;
    let normalized = value.abs() / s.sqrt();

    let k: Vec<f64> = p_ht.iter().map(|v| v / s).collect();
    for i in 0..n {
        x[i] += k[i] * value;
    }
    for row in 0..n {
        for col in 0..n {
            p[(row, col)] -= k[row] * p_ht[col];
        }
    }

    normalized
}

/// Runs the iterative outlier-rejecting filter update for one epoch and
/// returns the resulting [`PppStatus`].
pub fn iterate(filter: &mut PppFilter, observations: &[ObservationRecord], epoch_time: GnssTime, nav: &NavigationStore) -> PppStatus {
    if observations.is_empty() {
        return PppStatus::None;
    }

    let active = active_indices(&filter.x, &filter.p);
    let index_map: HashMap<usize, usize> = active.iter().enumerate().map(|(ci, &i)| (i, ci)).collect();

    let mut rejected_keys: HashSet<(crate::sv::SV, bool)> = HashSet::new();
    let mut last_good_count = 0usize;
    let mut any_phase_used = false;

    for _iteration in 0..filter.config.max_iter {
        let measurements = measurement::build(filter, observations, epoch_time, nav);
        if measurements.is_empty() {
            break;
        }

        let mut worst: Option<(usize, f64)> = None;
        let mut good_count = 0usize;
        let mut phase_used = false;

        let (mut x, mut p) = compress(&filter.x, &filter.p, &active);

        for (i, m) in measurements.iter().enumerate() {
            let is_phase = matches!(m.kind, super::measurement::Kind::Phase);
            let key = (m.satellite, is_phase);
            if rejected_keys.contains(&key) {
                continue;
            }

            // Reject on the raw pre-fit residual before it ever reaches the
            // Kalman update, independent of the post-fit normalized-sigma
            // check below.
            let max_innovation_m = if is_phase {
                filter.config.max_innovation_phase_m
            } else {
                filter.config.max_innovation_code_m
            };
            if m.value.abs() > max_innovation_m {
                rejected_keys.insert(key);
                filter.rejection_counter += 1;
                continue;
            }

            let compressed_jacobian = remap_jacobian(&m.jacobian, &index_map);
            if compressed_jacobian.is_empty() {
                continue;
            }

            let normalized = scalar_update(&mut x, &mut p, m.value, m.variance_m2, &compressed_jacobian);
            good_count += 1;
            if is_phase {
                phase_used = true;
            }

            if normalized > filter.config.thres_reject_sigma {
                match worst {
                    Some((_, best_so_far)) if best_so_far >= normalized => {},
                    _ => worst = Some((i, normalized)),
                }
            }
        }

        if let Some((idx, _)) = worst {
            let m = &measurements[idx];
            let is_phase = matches!(m.kind, super::measurement::Kind::Phase);
            rejected_keys.insert((m.satellite, is_phase));
            filter.rejection_counter += 1;
            continue;
        }

        scatter(&mut filter.x, &mut filter.p, &active, &x, &p);
        last_good_count = good_count;
        any_phase_used = phase_used;
        break;
    }

    if last_good_count == 0 {
        filter.iteration_overflow_counter += 1;
        return PppStatus::None;
    }

    if any_phase_used && last_good_count >= 8 {
        PppStatus::Ppp
    } else {
        PppStatus::Single
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppp::PppConfig;

    #[test]
    fn empty_observations_yield_none_status() {
        let mut filter = PppFilter::new(PppConfig::default());
        let nav = NavigationStore::new();
        let t = GnssTime::from_gps_week_tow(2200, 0.0);
        assert_eq!(iterate(&mut filter, &[], t, &nav), PppStatus::None);
    }

    #[test]
    fn observations_with_no_ephemeris_yield_none_status() {
        use crate::observation::ObservationRecord;
        use crate::sv::{Constellation, SV};

        let mut filter = PppFilter::new(PppConfig::default());
        let nav = NavigationStore::new();
        let t = GnssTime::from_gps_week_tow(2200, 0.0);
        let rec = ObservationRecord::empty(SV::new(Constellation::GPS, 1));
        assert_eq!(iterate(&mut filter, &[rec], t, &nav), PppStatus::None);
    }

    #[test]
    fn active_indices_always_include_the_dynamics_block() {
        let x = nalgebra::DVector::zeros(20);
        let p = nalgebra::DMatrix::zeros(20, 20);
        let active = active_indices(&x, &p);
        assert_eq!(active, (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn active_indices_pick_up_initialized_states_past_the_dynamics_block() {
        let mut x = nalgebra::DVector::zeros(20);
        let mut p = nalgebra::DMatrix::zeros(20, 20);
        x[12] = 3.0;
        p[(12, 12)] = 1.0;
        let active = active_indices(&x, &p);
        assert!(active.contains(&12));
        assert!(!active.contains(&13));
    }

    #[test]
    fn compress_then_scatter_round_trips_active_state() {
        let mut x = nalgebra::DVector::zeros(12);
        let mut p = nalgebra::DMatrix::zeros(12, 12);
        x[0] = 1.5;
        x[10] = 4.0;
        p[(10, 10)] = 9.0;
        let active = active_indices(&x, &p);

        let (mut cx, mut cp) = compress(&x, &p, &active);
        cx[0] += 0.5;
        cp[(0, 0)] += 0.25;

        let mut out_x = x.clone();
        let mut out_p = p.clone();
        scatter(&mut out_x, &mut out_p, &active, &cx, &cp);

        assert_eq!(out_x[0], 2.0);
        assert_eq!(out_p[(0, 0)], 0.25);
        assert_eq!(out_x[10], 4.0);
        assert_eq!(out_x[5], 0.0);
    }

    #[test]
    fn remap_jacobian_drops_inactive_terms() {
        let index_map: HashMap<usize, usize> = [(0usize, 0usize), (3usize, 1usize)].into_iter().collect();
        let jacobian = vec![(0usize, 1.0), (3usize, 2.0), (50usize, 5.0)];
        let remapped = remap_jacobian(&jacobian, &index_map);
        assert_eq!(remapped, vec![(0, 1.0), (1, 2.0)]);
    }
}
