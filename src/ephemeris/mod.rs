//! Broadcast ephemeris: Keplerian, GLONASS and SBAS variants.

mod glonass;
mod kepler;
mod sbas;

pub use glonass::GlonassEphemeris;
pub use kepler::{KeplerianEphemeris, Solver};
pub use sbas::SbasEphemeris;

use thiserror::Error;

use nalgebra::Vector6;

use crate::sv::{Constellation, SV};
use crate::time::GnssTime;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum EphemerisError {
    #[error("{0:?}: ephemeris not supported")]
    NotSupported(Constellation),

    #[error("kepler solver did not converge")]
    Diverged,

    #[error("requested epoch is outside the ephemeris validity window")]
    OutOfValidityWindow,

    #[error("missing data")]
    MissingData,
}

/// Broadcast ephemeris for one satellite, as decoded from 1019/1020/1041/
/// 1042/1044/1045/1046. The Keplerian variant covers GPS/Galileo/QZSS/
/// BeiDou/IRNSS; GLONASS and SBAS use a state-vector representation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Ephemeris {
    Keplerian(KeplerianEphemeris),
    Glonass(GlonassEphemeris),
    Sbas(SbasEphemeris),
}

impl Ephemeris {
    pub fn iode(&self) -> u16 {
        match self {
            Ephemeris::Keplerian(k) => k.iode as u16,
            Ephemeris::Glonass(g) => g.tb_min as u16,
            Ephemeris::Sbas(s) => s.iode as u16,
        }
    }

    pub fn toe(&self) -> GnssTime {
        match self {
            Ephemeris::Keplerian(k) => k.toe,
            Ephemeris::Glonass(g) => g.tb,
            Ephemeris::Sbas(s) => s.t0,
        }
    }

    pub fn health_ok(&self) -> bool {
        match self {
            Ephemeris::Keplerian(k) => k.health == 0,
            Ephemeris::Glonass(g) => !g.unhealthy,
            Ephemeris::Sbas(_) => true,
        }
    }

    /// Evaluates satellite position (ECEF, metres), velocity (m/s) and
    /// clock bias/drift (seconds, s/s) at `t`. This is the crate's
    /// concrete realization of the `satposs` contract.
    pub fn evaluate(&self, satellite: SV, t: GnssTime) -> Result<SatState, EphemerisError> {
        match self {
            Ephemeris::Keplerian(k) => k.evaluate(satellite, t),
            Ephemeris::Glonass(g) => g.evaluate(t),
            Ephemeris::Sbas(s) => s.evaluate(t),
        }
    }
}

/// Evaluated satellite state at one epoch: ECEF position/velocity plus
/// clock correction and its variance, matching the `satposs` contract's
/// `(rs, dts, var, health)` output tuple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatState {
    pub position_m: nalgebra::Vector3<f64>,
    pub velocity_m_s: nalgebra::Vector3<f64>,
    pub clock_bias_s: f64,
    pub clock_drift_s_s: f64,
    pub variance_m2: f64,
    pub healthy: bool,
}

impl SatState {
    pub fn position_velocity(&self) -> Vector6<f64> {
        Vector6::new(
            self.position_m.x,
            self.position_m.y,
            self.position_m.z,
            self.velocity_m_s.x,
            self.velocity_m_s.y,
            self.velocity_m_s.z,
        )
    }
}

/// Retains broadcast ephemeris sets per satellite, deduplicated so that
/// a new set replaces the stored one only when IODE (and, where
/// applicable, IODC/toe) differs, unless `-EPHALL` is in effect. Multiple
/// sets per satellite are kept (e.g. Galileo I/NAV vs. F/NAV), indexed by
/// `set_index` (0 = I/NAV, 1 = F/NAV, as per the originating message type).
#[derive(Debug, Clone, Default)]
pub struct EphemerisStore {
    sets: std::collections::HashMap<(SV, u8), Vec<Ephemeris>>,
}

impl EphemerisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a decoded ephemeris, applying the dedup rule above. Returns
    /// `true` if the store was actually updated.
    pub fn insert(&mut self, sv: SV, set_index: u8, eph: Ephemeris, force: bool) -> bool {
        let bucket = self.sets.entry((sv, set_index)).or_default();

        if let Some(existing) = bucket.last() {
            if !force && !Self::should_replace(existing, &eph) {
                return false;
            }
            *bucket.last_mut().unwrap() = eph;
        } else {
            bucket.push(eph);
        }
        true
    }

    fn should_replace(existing: &Ephemeris, incoming: &Ephemeris) -> bool {
        match (existing, incoming) {
            (Ephemeris::Glonass(a), Ephemeris::Glonass(b)) => {
                let dtoe = (b.tb.to_gpst() - a.tb.to_gpst()).to_seconds().abs();
                dtoe >= 1.0 || a.unhealthy != b.unhealthy
            },
            (a, b) => a.iode() != b.iode() || a.toe().epoch() != b.toe().epoch(),
        }
    }

    /// Looks up the most recently stored ephemeris for `sv` in `set_index`
    /// that is valid at `t`.
    pub fn lookup(&self, sv: SV, set_index: u8, t: GnssTime) -> Option<&Ephemeris> {
        let bucket = self.sets.get(&(sv, set_index))?;
        bucket.iter().rev().find(|eph| match eph {
            Ephemeris::Keplerian(k) => k.is_valid_at(t),
            _ => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv::Constellation;

    #[test]
    fn dedup_rejects_identical_iode() {
        let mut store = EphemerisStore::new();
        let sv = SV::new(Constellation::GPS, 5);
        let k = KeplerianEphemeris {
            iode: 42,
            toe: GnssTime::from_gps_week_tow(2000, 302_400.0),
            ..Default::default()
        };
        assert!(store.insert(sv, 0, Ephemeris::Keplerian(k), false));
        assert!(!store.insert(sv, 0, Ephemeris::Keplerian(k), false));
    }

    #[test]
    fn ephall_forces_replacement() {
        let mut store = EphemerisStore::new();
        let sv = SV::new(Constellation::GPS, 5);
        let k = KeplerianEphemeris {
            iode: 42,
            toe: GnssTime::from_gps_week_tow(2000, 302_400.0),
            ..Default::default()
        };
        store.insert(sv, 0, Ephemeris::Keplerian(k), false);
        assert!(store.insert(sv, 0, Ephemeris::Keplerian(k), true));
    }
}
