//! Precise Point Positioning Extended Kalman Filter engine.
//!
//! The filter state is a flat, owned `nalgebra::DVector`/`DMatrix` pair
//!, with index ranges computed once
//! from [`PppConfig`] rather than scattered offset arithmetic.

pub mod eclipse;
pub mod geodesy;
pub mod measurement;
pub mod residual;
pub mod slip;
pub mod spp;
pub mod time_update;
pub mod windup;

#[cfg(feature = "log")]
use log::warn;

use nalgebra::{DMatrix, DVector};

use crate::observation::ObservationEpoch;
use crate::rtcm::NavigationStore;
use crate::sv::{Constellation, SV};
use crate::time::GnssTime;

/// Maximum tracked satellites the ionosphere/ambiguity blocks size
/// themselves against. A fixed bound keeps the state layout computable
/// without a dynamic satellite catalogue.
pub const MAXSAT: usize = 96;

/// Troposphere estimation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TropOption {
    Off,
    ZtdOnly,
    ZtdWithGradients,
}

impl TropOption {
    fn slots(self) -> usize {
        match self {
            TropOption::Off => 0,
            TropOption::ZtdOnly => 1,
            TropOption::ZtdWithGradients => 3,
        }
    }
}

/// Ionosphere estimation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IonoOption {
    Off,
    PerSatellite,
}

/// Position/dynamics mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionMode {
    Fixed,
    Static,
    KinematicNoDynamics,
    KinematicWithDynamics,
}

/// Filter solution quality: `NONE, SINGLE, PPP, FIX` in order of increasing
/// confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PppStatus {
    None,
    Single,
    Ppp,
    Fix,
}

/// Deterministic configuration driving the state layout and every
/// time-update / measurement rule. Built once per filter, never as global
/// mutable state.
#[derive(Debug, Clone, PartialEq)]
pub struct PppConfig {
    pub position_mode: PositionMode,
    pub trop_option: TropOption,
    pub iono_option: IonoOption,
    pub n_freq: usize,
    pub l5_dcb: bool,
    pub constellations: Vec<Constellation>,
    pub max_iter: usize,
    pub thres_reject_sigma: f64,
    pub max_outage_epochs: u32,
    pub gap_resion_epochs: u32,
    pub max_innovation_code_m: f64,
    pub max_innovation_phase_m: f64,
    pub iono_free_combination: bool,
    /// Known ECEF coordinate the filter holds position to under
    /// [`PositionMode::Fixed`]. Unused by every other mode.
    pub fixed_position_m: Option<nalgebra::Vector3<f64>>,
}

impl Default for PppConfig {
    fn default() -> Self {
        Self {
            position_mode: PositionMode::KinematicWithDynamics,
            trop_option: TropOption::ZtdOnly,
            iono_option: IonoOption::PerSatellite,
            n_freq: 2,
            l5_dcb: false,
            constellations: vec![Constellation::GPS, Constellation::Glonass, Constellation::Galileo],
            max_iter: 8,
            thres_reject_sigma: 4.0,
            max_outage_epochs: 120,
            gap_resion_epochs: 120,
            max_innovation_code_m: 30.0,
            max_innovation_phase_m: 0.15,
            iono_free_combination: false,
            fixed_position_m: None,
        }
    }
}

/// Index ranges into the flat state vector, computed once from
/// [`PppConfig`] rather than scattered each time a state block is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    pub position_len: usize,
    pub clock_offset: usize,
    pub clock_len: usize,
    pub trop_offset: usize,
    pub trop_len: usize,
    pub iono_offset: usize,
    pub iono_len: usize,
    pub dcb_offset: usize,
    pub dcb_len: usize,
    pub ambiguity_offset: usize,
    pub ambiguity_len: usize,
    pub n_freq: usize,
    pub constellations: Vec<Constellation>,
}

impl StateLayout {
    pub fn from_config(config: &PppConfig) -> Self {
        let position_len = match config.position_mode {
            PositionMode::KinematicWithDynamics => 9,
            _ => 3,
        };
        let clock_len = config.constellations.len();
        let trop_len = config.trop_option.slots();
        let iono_len = match config.iono_option {
            IonoOption::Off => 0,
            IonoOption::PerSatellite => MAXSAT,
        };
        let dcb_len = if config.l5_dcb { 1 } else { 0 };
        let ambiguity_len = config.n_freq * MAXSAT;

        let clock_offset = position_len;
        let trop_offset = clock_offset + clock_len;
        let iono_offset = trop_offset + trop_len;
        let dcb_offset = iono_offset + iono_len;
        let ambiguity_offset = dcb_offset + dcb_len;

        Self {
            position_len,
            clock_offset,
            clock_len,
            trop_offset,
            trop_len,
            iono_offset,
            iono_len,
            dcb_offset,
            dcb_len,
            ambiguity_offset,
            ambiguity_len,
            n_freq: config.n_freq,
            constellations: config.constellations.clone(),
        }
    }

    pub fn total_len(&self) -> usize {
        self.ambiguity_offset + self.ambiguity_len
    }

    pub fn clock_index(&self, constellation: Constellation) -> Option<usize> {
        self.constellations
            .iter()
            .position(|c| *c == constellation)
            .map(|i| self.clock_offset + i)
    }

    pub fn iono_index(&self, sat_slot: usize) -> Option<usize> {
        if self.iono_len == 0 || sat_slot >= self.iono_len {
            return None;
        }
        Some(self.iono_offset + sat_slot)
    }

    pub fn ambiguity_index(&self, sat_slot: usize, freq_idx: usize) -> Option<usize> {
        if freq_idx >= self.n_freq || sat_slot >= MAXSAT {
            return None;
        }
        Some(self.ambiguity_offset + sat_slot * self.n_freq + freq_idx)
    }
}

/// Per-(satellite, frequency) ambiguity bookkeeping: outage counter and
/// slip flag, consumed by the time-update and the slip detectors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AmbiguityTrack {
    pub outage_epochs: u32,
    pub slipped: bool,
    pub geometry_free_prev_m: Option<f64>,
    pub melbourne_wubbena_prev_m: Option<f64>,
    pub windup_prev_cycles: Option<f64>,
}

/// Per-satellite ionosphere outage bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IonoTrack {
    pub outage_epochs: u32,
}

/// The PPP filter's full mutable state: the (x, P) pair, the candidate
/// "ambiguity-fixed" (xa, Pa) pair, the satellite↔state-slot assignment,
/// and the per-(sat,freq) bookkeeping the time update consumes.
#[derive(Debug, Clone)]
pub struct PppFilter {
    pub config: PppConfig,
    pub layout: StateLayout,
    pub x: DVector<f64>,
    pub p: DMatrix<f64>,
    pub xa: Option<DVector<f64>>,
    pub pa: Option<DMatrix<f64>>,
    pub time: Option<GnssTime>,
    pub status: PppStatus,
    pub sat_slots: Vec<SV>,
    pub ambiguity_tracks: std::collections::HashMap<(SV, usize), AmbiguityTrack>,
    pub iono_tracks: std::collections::HashMap<SV, IonoTrack>,
    pub rejection_counter: u64,
    pub iteration_overflow_counter: u64,
}

impl PppFilter {
    pub fn new(config: PppConfig) -> Self {
        let layout = StateLayout::from_config(&config);
        let n = layout.total_len();
        Self {
            config,
            x: DVector::zeros(n),
            p: DMatrix::zeros(n, n),
            layout,
            xa: None,
            pa: None,
            time: None,
            status: PppStatus::None,
            sat_slots: Vec::new(),
            ambiguity_tracks: std::collections::HashMap::new(),
            iono_tracks: std::collections::HashMap::new(),
            rejection_counter: 0,
            iteration_overflow_counter: 0,
        }
    }

    /// Assigns `sv` a stable state-slot index, growing the tracked-satellite
    /// list up to [`MAXSAT`].
    pub fn slot_for(&mut self, sv: SV) -> Option<usize> {
        if let Some(pos) = self.sat_slots.iter().position(|s| *s == sv) {
            return Some(pos);
        }
        if self.sat_slots.len() >= MAXSAT {
            #[cfg(feature = "log")]
            warn!("satellite catalogue full, dropping {:?}", sv);
            return None;
        }
        self.sat_slots.push(sv);
        Some(self.sat_slots.len() - 1)
    }

    pub fn position(&self) -> nalgebra::Vector3<f64> {
        nalgebra::Vector3::new(self.x[0], self.x[1], self.x[2])
    }
}

/// Single-epoch entry point: `pppos(filter, observations, nav)`.
/// Precondition: `observations` is one already-assembled epoch (time
/// non-decreasing versus `filter.time`); a still-open epoch with no
/// resolved time is a no-op. Postcondition: `filter`'s state and `status`
/// are updated; failure never aborts — it shows up
/// as `PppStatus::None` plus the rejection/overflow counters.
pub fn pppos(filter: &mut PppFilter, observations: &ObservationEpoch, nav: &NavigationStore) -> PppStatus {
    let Some(epoch_time) = observations.time else {
        return PppStatus::None;
    };
    let records = &observations.satellites;

    let dt = match filter.time {
        Some(prev) => (epoch_time.to_gpst() - prev.to_gpst()).to_seconds(),
        None => 1.0,
    };

    for record in records {
        filter.slot_for(record.satellite);
    }

    slip::detect_all(filter, records, epoch_time);
    time_update::run(filter, epoch_time, dt, records, nav);

    let status = residual::iterate(filter, records, epoch_time, nav);
    filter.time = Some(epoch_time);
    filter.status = status;
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_offsets_are_contiguous_and_ordered() {
        let config = PppConfig::default();
        let layout = StateLayout::from_config(&config);
        assert_eq!(layout.position_len, 9);
        assert!(layout.clock_offset >= layout.position_len);
        assert!(layout.trop_offset >= layout.clock_offset + layout.clock_len);
        assert!(layout.iono_offset >= layout.trop_offset + layout.trop_len);
        assert!(layout.ambiguity_offset >= layout.dcb_offset + layout.dcb_len);
        assert_eq!(layout.total_len(), layout.ambiguity_offset + layout.ambiguity_len);
    }

    #[test]
    fn fixed_mode_has_three_position_slots() {
        let config = PppConfig {
            position_mode: PositionMode::Fixed,
            ..Default::default()
        };
        let layout = StateLayout::from_config(&config);
        assert_eq!(layout.position_len, 3);
    }

    #[test]
    fn clock_index_resolves_per_constellation() {
        let config = PppConfig::default();
        let layout = StateLayout::from_config(&config);
        assert!(layout.clock_index(Constellation::GPS).is_some());
        assert!(layout.clock_index(Constellation::BeiDou).is_none());
    }
}
