//! Single-point (code-only) position and per-constellation clock solve,
//! used by the time update as the "single-point solution" the filter
//! reinitializes position (KinematicNoDynamics) and clock (every mode)
//! from every epoch.
//!
//! This is a plain iterative weighted least squares over first-frequency
//! pseudoranges; it deliberately does not model Earth rotation during
//! signal transit or relativistic clock corrections beyond what the
//! broadcast ephemeris already supplies; those refinements belong to the
//! EKF itself rather than to this cheap seed.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector, Vector3};

use crate::observation::ObservationRecord;
use crate::rtcm::NavigationStore;
use crate::signal::SPEED_OF_LIGHT_M_S;
use crate::sv::Constellation;
use crate::time::GnssTime;

const MAX_ITERATIONS: usize = 8;
const CONVERGENCE_M: f64 = 1.0e-3;

/// Result of a single-point solve: ECEF position and one clock bias
/// (seconds) per constellation present in the observation set.
pub struct SppSolution {
    pub position_m: Vector3<f64>,
    pub clock_bias_s: HashMap<Constellation, f64>,
}

/// Solves for receiver position and per-constellation clock bias from
/// first-frequency pseudoranges only. Returns `None` if fewer than four
/// usable pseudoranges (position + at least one clock unknown) are
/// available, or the iteration fails to converge.
pub fn solve(
    observations: &[ObservationRecord],
    epoch_time: GnssTime,
    nav: &NavigationStore,
    constellations: &[Constellation],
    seed_position_m: Vector3<f64>,
) -> Option<SppSolution> {
    let mut constellations_seen: Vec<Constellation> = Vec::new();
    let mut rows: Vec<(Vector3<f64>, f64, Constellation)> = Vec::new();

    for record in observations {
        let sv = record.satellite;
        if !constellations.contains(&sv.constellation) {
            continue;
        }
        let Ok(sat_state) = nav.satposs(epoch_time, sv, 0) else { continue };
        if !sat_state.healthy {
            continue;
        }
        let Some(code_obs) = record.freq.iter().find(|f| f.is_code_present()) else {
            continue;
        };

        if !constellations_seen.contains(&sv.constellation) {
            constellations_seen.push(sv.constellation);
        }
        rows.push((sat_state.position_m, code_obs.pseudorange_m, sv.constellation));
    }

    let n_clocks = constellations_seen.len();
    if rows.len() < 3 + n_clocks.max(1) {
        return None;
    }

    let mut position_m = seed_position_m;
    let mut clocks_m = vec![0.0; n_clocks.max(1)];

    for _ in 0..MAX_ITERATIONS {
        let n_unknowns = 3 + n_clocks.max(1);
        let mut h = DMatrix::<f64>::zeros(rows.len(), n_unknowns);
        let mut y = DVector::<f64>::zeros(rows.len());

        for (row_idx, (sat_pos, pseudorange_m, constellation)) in rows.iter().enumerate() {
            let diff = sat_pos - position_m;
            let range = diff.norm();
            let los = diff / range;
            let clock_idx = constellations_seen.iter().position(|c| c == constellation).unwrap_or(0);
            let clock_m = clocks_m[clock_idx];

            h[(row_idx, 0)] = -los.x;
            h[(row_idx, 1)] = -los.y;
            h[(row_idx, 2)] = -los.z;
            h[(row_idx, 3 + clock_idx)] = 1.0;

            y[row_idx] = pseudorange_m - (range + clock_m);
        }

        let ht = h.transpose();
        let normal = &ht * &h;
        let rhs = &ht * &y;
        let solution = normal.clone().cholesky().map(|c| c.solve(&rhs)).or_else(|| normal.try_inverse().map(|inv| inv * &rhs))?;

        position_m += Vector3::new(solution[0], solution[1], solution[2]);
        for (i, c) in clocks_m.iter_mut().enumerate() {
            *c += solution[3 + i];
        }

        if solution.rows(0, 3).norm() < CONVERGENCE_M {
            break;
        }
    }

    let mut clock_bias_s = HashMap::new();
    for (i, c) in constellations_seen.iter().enumerate() {
        clock_bias_s.insert(*c, clocks_m[i] / SPEED_OF_LIGHT_M_S);
    }

    Some(SppSolution { position_m, clock_bias_s })
}
