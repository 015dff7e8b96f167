//! Navigation / Observation Store: the junction between the RTCM decoders
//! and the PPP engine, holding the ephemeris, SSR and station state the
//! filter reads by reference each epoch.

use std::collections::HashMap;

use crate::ephemeris::{Ephemeris, EphemerisError, EphemerisStore, SatState};
use crate::observation::ObservationEpoch;
use crate::ssr::SsrCorrection;
use crate::station::StationMetadata;
use crate::sv::SV;
use crate::time::GnssTime;

/// Everything the PPP engine reads by reference each epoch: retained
/// ephemerides, the latest SSR correction per satellite, and station
/// metadata. Held by reference during a `pppos` call: no concurrent
/// mutation is assumed.
#[derive(Debug, Clone, Default)]
pub struct NavigationStore {
    pub ephemeris: EphemerisStore,
    pub ssr: HashMap<SV, SsrCorrection>,
    pub station: Option<StationMetadata>,
}

impl NavigationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The crate's realization of the `satposs` contract:
    /// ephemeris-only evaluation, ignoring precise-product corrections
    /// that remain out of scope for this store (external precise-orbit
    /// tables are consumed by the caller, not synthesized here).
    pub fn satposs(&self, t: GnssTime, sv: SV, set_index: u8) -> Result<SatState, EphemerisError> {
        let eph = self
            .ephemeris
            .lookup(sv, set_index, t)
            .ok_or(EphemerisError::MissingData)?;
        eph.evaluate(sv, t)
    }

    pub fn ssr_for(&self, sv: SV) -> Option<&SsrCorrection> {
        self.ssr.get(&sv)
    }

    pub fn ssr_for_mut(&mut self, sv: SV) -> &mut SsrCorrection {
        self.ssr.entry(sv).or_default()
    }
}

/// Accumulates per-satellite observation records for the epoch currently
/// being assembled from legacy or MSM messages, handing the epoch off to
/// the caller once `obsflag` clears.
#[derive(Debug, Clone, Default)]
pub struct ObservationEpochStore {
    current: Option<ObservationEpoch>,
}

impl ObservationEpochStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts or continues an in-progress epoch for `station_id`/`time`.
    /// A station-id or time discontinuity against the in-progress epoch
    /// starts a fresh one; the stale partial epoch is discarded rather
    /// than carried across an obvious reset boundary.
    pub fn begin_or_continue(&mut self, station_id: u16, time: GnssTime) -> &mut ObservationEpoch {
        let needs_fresh = match &self.current {
            Some(epoch) => epoch.station_id != station_id || epoch.time != Some(time),
            None => true,
        };
        if needs_fresh {
            self.current = Some(ObservationEpoch::new(station_id, time));
        }
        self.current.as_mut().unwrap()
    }

    /// Completes the in-progress epoch when `sync` (the `obsflag`
    /// sentinel) clears, returning it to the caller.
    pub fn complete_if_done(&mut self, sync: bool) -> Option<ObservationEpoch> {
        if sync {
            return None;
        }
        self.current.take()
    }

    /// The in-progress epoch's timestamp, used to resolve week/day
    /// ambiguity in subsequently decoded time-of-week fields.
    pub fn reference_epoch(&self) -> Option<hifitime::Epoch> {
        self.current.as_ref().and_then(|e| e.time).map(|t| t.epoch())
    }

    pub fn current_mut(&mut self) -> Option<&mut ObservationEpoch> {
        self.current.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv::Constellation;

    #[test]
    fn epoch_completes_when_sync_clears() {
        let mut store = ObservationEpochStore::new();
        let t = GnssTime::from_gps_week_tow(2000, 1.0);
        store.begin_or_continue(1234, t);
        assert!(store.complete_if_done(true).is_none());
        let epoch = store.complete_if_done(false);
        assert!(epoch.is_some());
    }

    #[test]
    fn station_change_discards_stale_partial_epoch() {
        let mut store = ObservationEpochStore::new();
        let t = GnssTime::from_gps_week_tow(2000, 1.0);
        {
            let epoch = store.begin_or_continue(1234, t);
            epoch.satellite_mut(SV::new(Constellation::GPS, 1));
        }
        let epoch = store.begin_or_continue(5678, t);
        assert!(epoch.satellites.is_empty());
    }
}
