//! GLONASS broadcast ephemeris (message 1020): a state vector (position,
//! velocity, lunisolar acceleration) propagated by numerical integration of
//! PZ-90.11 equations of motion, rather than the Keplerian element set GPS
//! and its peers use.

use nalgebra::Vector3;

use super::{EphemerisError, SatState};
use crate::time::GnssTime;

/// Earth gravitational parameter used by the PZ-90.11 propagator (m^3/s^2).
const GM_M3_S2: f64 = 3.986_004_4e14;
/// Equatorial radius (m).
const EARTH_RADIUS_M: f64 = 6_378_136.0;
/// J2 zonal harmonic.
const J2: f64 = 1.082_625_75e-3;
/// Earth rotation rate (rad/s).
const OMEGA_EARTH: f64 = 7.292_115e-5;
/// Integration step (s) for the 4th-order Runge-Kutta propagator.
const RK4_STEP_S: f64 = 60.0;
/// Replace a stored ephemeris set only if `tb` differs by at least this much.
pub const VALIDITY_HALF_WINDOW_S: f64 = 900.0;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlonassEphemeris {
    pub tb: GnssTime,
    pub tb_min: u16,
    pub position_m: Vector3<f64>,
    pub velocity_m_s: Vector3<f64>,
    pub accel_luni_solar_m_s2: Vector3<f64>,
    pub tau_n_s: f64,
    pub gamma_n: f64,
    pub freq_channel: i8,
    pub unhealthy: bool,
    pub age_days: u8,
}

impl Default for GlonassEphemeris {
    fn default() -> Self {
        Self {
            tb: GnssTime::from_gps_week_tow(0, 0.0),
            tb_min: 0,
            position_m: Vector3::zeros(),
            velocity_m_s: Vector3::zeros(),
            accel_luni_solar_m_s2: Vector3::zeros(),
            tau_n_s: 0.0,
            gamma_n: 0.0,
            freq_channel: 0,
            unhealthy: false,
            age_days: 0,
        }
    }
}

fn acceleration(pos: Vector3<f64>, accel_luni_solar: Vector3<f64>) -> Vector3<f64> {
    let r = pos.norm();
    let r2 = r * r;
    let r5 = r2 * r2 * r;
    let factor = 1.5 * J2 * GM_M3_S2 * EARTH_RADIUS_M.powi(2) / r5;
    let z2_over_r2 = (pos.z * pos.z) / r2;

    let gx = -GM_M3_S2 * pos.x / (r2 * r) - factor * pos.x * (1.0 - 5.0 * z2_over_r2);
    let gy = -GM_M3_S2 * pos.y / (r2 * r) - factor * pos.y * (1.0 - 5.0 * z2_over_r2);
    let gz = -GM_M3_S2 * pos.z / (r2 * r) - factor * pos.z * (3.0 - 5.0 * z2_over_r2);

    Vector3::new(gx, gy, gz) + accel_luni_solar
}

/// One RK4 step of the PZ-90.11 equations of motion for `(position, velocity)`.
fn rk4_step(
    pos: Vector3<f64>,
    vel: Vector3<f64>,
    accel_luni_solar: Vector3<f64>,
    dt: f64,
) -> (Vector3<f64>, Vector3<f64>) {
    let deriv = |p: Vector3<f64>, v: Vector3<f64>| (v, acceleration(p, accel_luni_solar));

    let (k1p, k1v) = deriv(pos, vel);
    let (k2p, k2v) = deriv(pos + k1p * (dt / 2.0), vel + k1v * (dt / 2.0));
    let (k3p, k3v) = deriv(pos + k2p * (dt / 2.0), vel + k2v * (dt / 2.0));
    let (k4p, k4v) = deriv(pos + k3p * dt, vel + k3v * dt);

    let pos_next = pos + (k1p + k2p * 2.0 + k3p * 2.0 + k4p) * (dt / 6.0);
    let vel_next = vel + (k1v + k2v * 2.0 + k3v * 2.0 + k4v) * (dt / 6.0);
    (pos_next, vel_next)
}

impl GlonassEphemeris {
    pub fn evaluate(&self, t: GnssTime) -> Result<SatState, EphemerisError> {
        let dt_total = (t.to_gpst() - self.tb.to_gpst()).to_seconds();
        if dt_total.abs() > 1_800.0 {
            return Err(EphemerisError::OutOfValidityWindow);
        }

        let steps = (dt_total.abs() / RK4_STEP_S).ceil().max(1.0) as usize;
        let dt = dt_total / steps as f64;

        let (mut pos, mut vel) = (self.position_m, self.velocity_m_s);
        for _ in 0..steps {
            let (next_pos, next_vel) = rk4_step(pos, vel, self.accel_luni_solar_m_s2, dt);
            pos = next_pos;
            vel = next_vel;
        }

        let bias = -self.tau_n_s + self.gamma_n * dt_total;
        let drift = self.gamma_n;

        Ok(SatState {
            position_m: pos,
            velocity_m_s: vel,
            clock_bias_s: bias,
            clock_drift_s_s: drift,
            variance_m2: 9.0,
            healthy: !self.unhealthy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_propagation_preserves_radius() {
        let eph = GlonassEphemeris {
            tb: GnssTime::from_gps_week_tow(2000, 302_400.0),
            position_m: Vector3::new(0.0, 25_000_000.0, 0.0),
            velocity_m_s: Vector3::new(-2_000.0, 0.0, 500.0),
            ..Default::default()
        };
        let t = GnssTime::from_gps_week_tow(2000, 302_400.0 + 120.0);
        let state = eph.evaluate(t).unwrap();
        let r0 = eph.position_m.norm();
        let r1 = state.position_m.norm();
        assert!((r1 - r0).abs() < 50_000.0);
    }

    #[test]
    fn stale_reference_epoch_is_rejected() {
        let eph = GlonassEphemeris {
            tb: GnssTime::from_gps_week_tow(2000, 302_400.0),
            ..Default::default()
        };
        let t = GnssTime::from_gps_week_tow(2000, 302_400.0 + 3_600.0);
        assert!(eph.evaluate(t).is_err());
    }
}
