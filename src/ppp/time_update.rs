//! Time update: propagates the state mean and covariance across
//! `dt` seconds, applying dynamics-dependent process noise per state
//! block, the every-epoch single-point clock/position reinitialization,
//! the day-boundary ambiguity reset, and outage-driven ionosphere
//! covariance inflation.

use nalgebra::Vector3;

use crate::observation::ObservationRecord;
use crate::rtcm::NavigationStore;
use crate::signal::SPEED_OF_LIGHT_M_S;
use crate::time::GnssTime;

use super::spp::{self, SppSolution};
use super::{PositionMode, PppFilter};

const POSITION_PROCESS_NOISE_STATIC_M2: f64 = 1.0e-8;
const POSITION_PROCESS_NOISE_KINEMATIC_M2: f64 = 30.0 * 30.0;
const VELOCITY_PROCESS_NOISE_M2_S2: f64 = 1.0 * 1.0;
const CLOCK_PROCESS_NOISE_M2_S: f64 = 9.0e4;
/// Variance assigned to a receiver clock state on every epoch's
/// single-point-solution reset.
const CLOCK_RESET_VARIANCE_M2: f64 = 60.0 * 60.0;
const TROP_PROCESS_NOISE_M2_S: f64 = 1.0e-8;
const IONO_PROCESS_NOISE_M2_S: f64 = 0.01;
const DCB_INIT_VALUE_M: f64 = 1.0e-6;
const DCB_INIT_VARIANCE_M2: f64 = 30.0 * 30.0;

/// Reset variance applied to an ionosphere state after a tracking gap
/// beyond the configured threshold, or to an ambiguity after a detected
/// slip, outage, or day-boundary jump: wide enough that the next
/// measurement update re-estimates it from scratch.
const RESET_VARIANCE_M2: f64 = 1.0e8;

/// Runs the time update in place. `observations` is this epoch's
/// already-decoded record set, used both to update per-satellite outage
/// counters and, via [`spp::solve`], to seed the every-epoch
/// clock/position reinitialization.
pub fn run(
    filter: &mut PppFilter,
    epoch_time: GnssTime,
    dt: f64,
    observations: &[ObservationRecord],
    nav: &NavigationStore,
) {
    let dt = dt.max(0.0);
    let seed_position_m = filter.position();
    let spp_solution = spp::solve(observations, epoch_time, nav, &filter.config.constellations, seed_position_m);

    propagate_position(filter, dt, spp_solution.as_ref());
    propagate_clocks(filter, dt, spp_solution.as_ref());
    propagate_troposphere(filter, dt);
    propagate_ionosphere(filter, dt, observations);
    propagate_dcb(filter);
    propagate_ambiguities(filter, observations, epoch_time);
}

/// L5 receiver DCB: "initialize to 1e-6 with 30^2 m^2 variance
/// once" — a single global state, seeded the first time it is touched and
/// otherwise left as a pure random walk (no process noise is specified).
fn propagate_dcb(filter: &mut PppFilter) {
    if filter.layout.dcb_len == 0 {
        return;
    }
    let idx = filter.layout.dcb_offset;
    if filter.p[(idx, idx)] == 0.0 {
        filter.x[idx] = DCB_INIT_VALUE_M;
        filter.p[(idx, idx)] = DCB_INIT_VARIANCE_M2;
    }
}

fn propagate_position(filter: &mut PppFilter, dt: f64, spp_solution: Option<&SppSolution>) {
    let layout = filter.layout.clone();
    match filter.config.position_mode {
        PositionMode::Fixed => {
            if let Some(known) = filter.config.fixed_position_m {
                filter.x[0] = known.x;
                filter.x[1] = known.y;
                filter.x[2] = known.z;
            }
            for i in 0..3 {
                filter.p[(i, i)] = POSITION_PROCESS_NOISE_STATIC_M2;
            }
        },
        PositionMode::Static => {
            for i in 0..3 {
                filter.p[(i, i)] += POSITION_PROCESS_NOISE_STATIC_M2 * dt;
            }
        },
        PositionMode::KinematicNoDynamics => {
            if let Some(solution) = spp_solution {
                filter.x[0] = solution.position_m.x;
                filter.x[1] = solution.position_m.y;
                filter.x[2] = solution.position_m.z;
                for i in 0..3 {
                    filter.p[(i, i)] = POSITION_PROCESS_NOISE_KINEMATIC_M2;
                }
            } else {
                for i in 0..3 {
                    filter.p[(i, i)] += POSITION_PROCESS_NOISE_KINEMATIC_M2 * dt;
                }
            }
        },
        PositionMode::KinematicWithDynamics => {
            debug_assert_eq!(layout.position_len, 9);
            let mut pos = Vector3::new(filter.x[0], filter.x[1], filter.x[2]);
            let vel = Vector3::new(filter.x[3], filter.x[4], filter.x[5]);
            let acc = Vector3::new(filter.x[6], filter.x[7], filter.x[8]);
            pos += vel * dt + 0.5 * acc * dt * dt;
            let new_vel = vel + acc * dt;
            filter.x[0] = pos.x;
            filter.x[1] = pos.y;
            filter.x[2] = pos.z;
            filter.x[3] = new_vel.x;
            filter.x[4] = new_vel.y;
            filter.x[5] = new_vel.z;

            for i in 0..3 {
                filter.p[(i, i)] += POSITION_PROCESS_NOISE_KINEMATIC_M2 * dt;
                filter.p[(3 + i, 3 + i)] += VELOCITY_PROCESS_NOISE_M2_S2 * dt;
            }
        },
    }
}

/// Grows each clock state's variance by the usual process noise, then, if
/// a single-point solution was available this epoch, resets every
/// constellation's clock state to that solution's estimate with variance
/// [`CLOCK_RESET_VARIANCE_M2`] — unconditionally, every epoch, every
/// position mode. A solve failure (too few pseudoranges) just falls back
/// to the process-noise growth already applied.
fn propagate_clocks(filter: &mut PppFilter, dt: f64, spp_solution: Option<&SppSolution>) {
    for i in 0..filter.layout.clock_len {
        let idx = filter.layout.clock_offset + i;
        filter.p[(idx, idx)] += CLOCK_PROCESS_NOISE_M2_S * dt;
    }

    let Some(solution) = spp_solution else {
        return;
    };
    for (constellation, clock_bias_s) in &solution.clock_bias_s {
        let Some(idx) = filter.layout.clock_index(*constellation) else {
            continue;
        };
        filter.x[idx] = clock_bias_s * SPEED_OF_LIGHT_M_S;
        filter.p[(idx, idx)] = CLOCK_RESET_VARIANCE_M2;
    }
}

/// True at the epoch whose time lands exactly on a day boundary:
/// `ROUND(tow·10) mod 864_000 == 0`, evaluated against continuous GPS
/// time so it fires at every day rollover regardless of GPS week number.
fn is_day_boundary(t: GnssTime) -> bool {
    let seconds = t.to_gpst().to_duration().to_seconds();
    let tenths = (seconds * 10.0).round() as i64;
    tenths.rem_euclid(864_000) == 0
}

fn propagate_troposphere(filter: &mut PppFilter, dt: f64) {
    for i in 0..filter.layout.trop_len {
        let idx = filter.layout.trop_offset + i;
        filter.p[(idx, idx)] += TROP_PROCESS_NOISE_M2_S * dt;
    }
}

fn propagate_ionosphere(filter: &mut PppFilter, dt: f64, observations: &[ObservationRecord]) {
    if filter.layout.iono_len == 0 {
        return;
    }

    let observed_slots: Vec<usize> = observations
        .iter()
        .filter_map(|r| filter.sat_slots.iter().position(|s| *s == r.satellite))
        .collect();

    for slot in 0..filter.layout.iono_len {
        let Some(idx) = filter.layout.iono_index(slot) else {
            continue;
        };
        let Some(sv) = filter.sat_slots.get(slot).copied() else {
            continue;
        };
        let track = filter.iono_tracks.entry(sv).or_default();

        if observed_slots.contains(&slot) {
            track.outage_epochs = 0;
        } else {
            track.outage_epochs = track.outage_epochs.saturating_add(1);
        }

        if track.outage_epochs > filter.config.gap_resion_epochs {
            filter.p[(idx, idx)] = RESET_VARIANCE_M2;
        } else {
            filter.p[(idx, idx)] += IONO_PROCESS_NOISE_M2_S * dt;
        }
    }
}

fn propagate_ambiguities(filter: &mut PppFilter, observations: &[ObservationRecord], epoch_time: GnssTime) {
    let day_boundary = is_day_boundary(epoch_time);
    let observed: std::collections::HashSet<_> = observations.iter().map(|r| r.satellite).collect();

    let keys: Vec<_> = filter.ambiguity_tracks.keys().copied().collect();
    for (sv, freq_idx) in keys {
        let Some(slot) = filter.sat_slots.iter().position(|s| *s == sv) else {
            continue;
        };
        let Some(idx) = filter.layout.ambiguity_index(slot, freq_idx) else {
            continue;
        };

        let track = *filter.ambiguity_tracks.get(&(sv, freq_idx)).unwrap();
        let untouched = filter.p[(idx, idx)] == 0.0;
        let reset = untouched
            || track.slipped
            || track.outage_epochs > filter.config.max_outage_epochs
            || day_boundary;

        if reset {
            filter.p[(idx, idx)] = RESET_VARIANCE_M2;
        }

        let track_mut = filter.ambiguity_tracks.get_mut(&(sv, freq_idx)).unwrap();
        if reset {
            track_mut.slipped = false;
            track_mut.outage_epochs = 0;
        }
        if !observed.contains(&sv) {
            track_mut.outage_epochs = track_mut.outage_epochs.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppp::{AmbiguityTrack, PppConfig};
    use crate::rtcm::NavigationStore;
    use crate::sv::{Constellation, SV};

    #[test]
    fn static_mode_grows_position_variance_slowly() {
        let mut filter = PppFilter::new(PppConfig {
            position_mode: PositionMode::Static,
            ..Default::default()
        });
        let nav = NavigationStore::new();
        let t = GnssTime::from_gps_week_tow(2200, 1.0);
        run(&mut filter, t, 1.0, &[], &nav);
        assert!(filter.p[(0, 0)] > 0.0);
        assert!(filter.p[(0, 0)] < 1.0);
    }

    #[test]
    fn fixed_mode_holds_known_position_every_epoch() {
        let known = Vector3::new(1.0, 2.0, 3.0);
        let mut filter = PppFilter::new(PppConfig {
            position_mode: PositionMode::Fixed,
            fixed_position_m: Some(known),
            ..Default::default()
        });
        filter.x[0] = 0.0;
        let nav = NavigationStore::new();
        let t = GnssTime::from_gps_week_tow(2200, 1.0);
        run(&mut filter, t, 1.0, &[], &nav);
        assert_eq!(filter.position(), known);
        assert_eq!(filter.p[(0, 0)], POSITION_PROCESS_NOISE_STATIC_M2);
    }

    #[test]
    fn clock_variance_grows_absent_a_single_point_solution() {
        let mut filter = PppFilter::new(PppConfig::default());
        let nav = NavigationStore::new();
        let t = GnssTime::from_gps_week_tow(2200, 1.0);
        run(&mut filter, t, 1.0, &[], &nav);
        let idx = filter.layout.clock_offset;
        assert_eq!(filter.p[(idx, idx)], CLOCK_PROCESS_NOISE_M2_S * 1.0);
    }

    #[test]
    fn day_boundary_resets_ambiguity_variance() {
        let mut filter = PppFilter::new(PppConfig::default());
        let nav = NavigationStore::new();
        let sv = SV::new(Constellation::GPS, 1);
        filter.slot_for(sv);
        let slot = filter.sat_slots.iter().position(|s| *s == sv).unwrap();
        let idx = filter.layout.ambiguity_index(slot, 0).unwrap();
        filter.ambiguity_tracks.insert((sv, 0), AmbiguityTrack::default());
        filter.p[(idx, idx)] = 5.0;

        // GPS week rollover: tow == 0 always lands on a day boundary.
        let t = GnssTime::from_gps_week_tow(2200, 0.0);
        run(&mut filter, t, 1.0, &[], &nav);

        assert_eq!(filter.p[(idx, idx)], RESET_VARIANCE_M2);
    }

    #[test]
    fn non_boundary_tow_is_not_a_day_boundary() {
        assert!(!is_day_boundary(GnssTime::from_gps_week_tow(2200, 100.0)));
    }
}
