//! SBAS broadcast ephemeris (message 1043): a simple state vector with
//! constant acceleration over its short (~2 minute) validity window, same
//! shape as GLONASS's but without the harmonic/lunisolar terms.

use nalgebra::Vector3;

use super::{EphemerisError, SatState};
use crate::time::GnssTime;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SbasEphemeris {
    pub t0: GnssTime,
    pub iode: u16,
    pub ura_m: f64,
    pub position_m: Vector3<f64>,
    pub velocity_m_s: Vector3<f64>,
    pub accel_m_s2: Vector3<f64>,
    pub agf0_s: f64,
    pub agf1_s_s: f64,
}

impl Default for SbasEphemeris {
    fn default() -> Self {
        Self {
            t0: GnssTime::from_gps_week_tow(0, 0.0),
            iode: 0,
            ura_m: 2.0,
            position_m: Vector3::zeros(),
            velocity_m_s: Vector3::zeros(),
            accel_m_s2: Vector3::zeros(),
            agf0_s: 0.0,
            agf1_s_s: 0.0,
        }
    }
}

impl SbasEphemeris {
    pub fn evaluate(&self, t: GnssTime) -> Result<SatState, EphemerisError> {
        let dt = (t.to_gpst() - self.t0.to_gpst()).to_seconds();
        if dt.abs() > 180.0 {
            return Err(EphemerisError::OutOfValidityWindow);
        }

        let position_m =
            self.position_m + self.velocity_m_s * dt + self.accel_m_s2 * (0.5 * dt * dt);
        let velocity_m_s = self.velocity_m_s + self.accel_m_s2 * dt;

        Ok(SatState {
            position_m,
            velocity_m_s,
            clock_bias_s: self.agf0_s + self.agf1_s_s * dt,
            clock_drift_s_s: self.agf1_s_s,
            variance_m2: self.ura_m * self.ura_m,
            healthy: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_order_taylor_propagation() {
        let eph = SbasEphemeris {
            t0: GnssTime::from_gps_week_tow(2000, 302_400.0),
            position_m: Vector3::new(42_164_000.0, 0.0, 0.0),
            velocity_m_s: Vector3::new(0.0, 10.0, 0.0),
            accel_m_s2: Vector3::new(0.0, 0.0, 0.001),
            ..Default::default()
        };
        let t = GnssTime::from_gps_week_tow(2000, 302_400.0 + 60.0);
        let state = eph.evaluate(t).unwrap();
        assert!((state.position_m.y - 600.0).abs() < 1.0e-6);
    }

    #[test]
    fn outside_two_minute_window_rejected() {
        let eph = SbasEphemeris {
            t0: GnssTime::from_gps_week_tow(2000, 302_400.0),
            ..Default::default()
        };
        let t = GnssTime::from_gps_week_tow(2000, 302_400.0 + 400.0);
        assert!(eph.evaluate(t).is_err());
    }
}
