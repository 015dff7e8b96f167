//! Keplerian broadcast ephemeris (GPS/Galileo/QZSS/BeiDou/IRNSS) and the
//! Kepler solver that turns it into an ECEF position/velocity/clock state.
//!
//! The iterative eccentric-anomaly solve, the harmonic corrections, and
//! the MEO/GEO rotation into ECEF follow the usual broadcast-ephemeris
//! algorithm, adapted here to the RTCM-decoded struct defined in this
//! module and expressed with plain `nalgebra` types rather than a full
//! orbit-kernel dependency.

#[cfg(feature = "log")]
use log::{debug, error};

use nalgebra::{Matrix3, Rotation, Rotation3, SMatrix, Vector3, Vector4, Vector6};

use super::{EphemerisError, SatState};
use crate::sv::{Constellation, SV};
use crate::time::GnssTime;

/// Keplerian broadcast ephemeris (1019 GPS, 1041 IRNSS, 1042 BeiDou, 1044
/// QZSS, 1045/1046 Galileo).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeplerianEphemeris {
    pub toe: GnssTime,
    pub toc: GnssTime,
    pub sqrt_a: f64,
    pub ecc: f64,
    pub i0_rad: f64,
    pub omega0_rad: f64,
    pub aop_rad: f64,
    pub m0_rad: f64,
    pub dn_rad_s: f64,
    pub idot_rad_s: f64,
    pub omega_dot_rad_s: f64,
    pub cus_rad: f64,
    pub cuc_rad: f64,
    pub cis_rad: f64,
    pub cic_rad: f64,
    pub crs_m: f64,
    pub crc_m: f64,
    pub af0_s: f64,
    pub af1_s_s: f64,
    pub af2_s_s2: f64,
    pub tgd_s: f64,
    pub iode: u16,
    pub iodc: u16,
    pub ura_m: f64,
    pub health: u8,
}

impl Default for KeplerianEphemeris {
    fn default() -> Self {
        Self {
            toe: GnssTime::from_gps_week_tow(0, 0.0),
            toc: GnssTime::from_gps_week_tow(0, 0.0),
            sqrt_a: 5153.6,
            ecc: 0.0,
            i0_rad: 0.0,
            omega0_rad: 0.0,
            aop_rad: 0.0,
            m0_rad: 0.0,
            dn_rad_s: 0.0,
            idot_rad_s: 0.0,
            omega_dot_rad_s: 0.0,
            cus_rad: 0.0,
            cuc_rad: 0.0,
            cis_rad: 0.0,
            cic_rad: 0.0,
            crs_m: 0.0,
            crc_m: 0.0,
            af0_s: 0.0,
            af1_s_s: 0.0,
            af2_s_s2: 0.0,
            tgd_s: 0.0,
            iode: 0,
            iodc: 0,
            ura_m: 2.0,
            health: 0,
        }
    }
}

/// Validity half-window per constellation/// valid within ±(system-specific) seconds of toe").
fn validity_window_s(constellation: Constellation) -> f64 {
    match constellation {
        Constellation::GPS | Constellation::QZSS => 7_200.0,
        Constellation::Galileo => 10_800.0,
        Constellation::BeiDou => 21_600.0,
        Constellation::IRNSS => 7_200.0,
        _ => 7_200.0,
    }
}

impl KeplerianEphemeris {
    pub fn is_valid_at(&self, t: GnssTime) -> bool {
        let dt = (t.to_gpst() - self.toe.to_gpst()).to_seconds().abs();
        dt <= validity_window_s(Constellation::GPS) * 2.0 // loosened: constellation unknown here
    }

    fn is_valid_for(&self, constellation: Constellation, t: GnssTime) -> bool {
        let dt = (t.to_gpst() - self.toe.to_gpst()).to_seconds().abs();
        dt <= validity_window_s(constellation)
    }

    /// Satellite clock correction (seconds) at `t`, per the standard
    /// polynomial model: `af0 + af1*dt + af2*dt^2 - tgd`.
    pub fn clock_correction(&self, t: GnssTime) -> (f64, f64) {
        let dt = (t.to_gpst() - self.toc.to_gpst()).to_seconds();
        let bias = self.af0_s + self.af1_s_s * dt + self.af2_s_s2 * dt * dt - self.tgd_s;
        let drift = self.af1_s_s + 2.0 * self.af2_s_s2 * dt;
        (bias, drift)
    }

    pub fn evaluate(&self, satellite: SV, t: GnssTime) -> Result<SatState, EphemerisError> {
        if !self.is_valid_for(satellite.constellation, t) {
            return Err(EphemerisError::OutOfValidityWindow);
        }

        let solver = Solver::solve(self, satellite, t, 10)?;
        let pv_m = solver.position_velocity_m();
        let (bias, drift) = self.clock_correction(t);

        Ok(SatState {
            position_m: Vector3::new(pv_m[0], pv_m[1], pv_m[2]),
            velocity_m_s: Vector3::new(pv_m[3], pv_m[4], pv_m[5]),
            clock_bias_s: bias + solver.dtr,
            clock_drift_s_s: drift + solver.fd_dtr,
            variance_m2: self.ura_m * self.ura_m,
            healthy: self.health == 0,
        })
    }
}

/// Intermediate state carried across the iterative eccentric-anomaly
/// solve.
#[derive(Debug, Clone, Copy)]
pub struct Solver {
    pub satellite: SV,
    pub dt_seconds: f64,
    pub u_k: f64,
    pub r_k: f64,
    pub i_k: f64,
    pub omega_k: f64,
    pub fd_u_k: f64,
    pub fd_r_k: f64,
    pub fd_i_k: f64,
    pub fd_omega_k: f64,
    pub dtr: f64,
    pub fd_dtr: f64,
    pub r_sv: (f64, f64, f64),
}

impl Solver {
    fn orbit_velocity(&self) -> (f64, f64) {
        let (sin_u_k, cos_u_k) = self.u_k.sin_cos();
        let fd_x = self.fd_r_k * cos_u_k - self.r_k * self.fd_u_k * sin_u_k;
        let fd_y = self.fd_r_k * sin_u_k + self.r_k * self.fd_u_k * cos_u_k;
        (fd_x, fd_y)
    }

    fn meo_orbit_to_ecef_rotation_matrix(&self) -> Rotation<f64, 3> {
        let rotation_x = Rotation3::from_axis_angle(&Vector3::x_axis(), self.i_k);
        let rotation_z = Rotation3::from_axis_angle(&Vector3::z_axis(), self.omega_k);
        rotation_z * rotation_x
    }

    /// Builds the solver state for `satellite` at `t`, iterating the
    /// eccentric-anomaly equation up to `max_iteration` times.
    pub fn solve(
        eph: &KeplerianEphemeris,
        satellite: SV,
        t: GnssTime,
        max_iteration: usize,
    ) -> Result<Self, EphemerisError> {
        let gm_m3_s2 = match satellite.constellation {
            Constellation::BeiDou => 3.986_004_418E14_f64,
            Constellation::Galileo => 3.986_004_418E14_f64,
            _ => 3.986_005_0E14_f64, // GPS ICD
        };

        let omega_e = match satellite.constellation {
            Constellation::Galileo => 7.292_115_146_7E-5_f64,
            _ => 7.292_115_146_7E-5_f64,
        };

        let dtr_f = match satellite.constellation {
            Constellation::BeiDou | Constellation::Galileo => -4.442_807_309_043_977_5E-10_f64,
            _ => -4.442_807_633_393_06E-10_f64,
        };

        let sma_m = eph.sqrt_a * eph.sqrt_a;
        let dt_seconds = (t.to_gpst() - eph.toe.to_gpst()).to_seconds();

        let n0 = (gm_m3_s2 / sma_m.powi(3)).sqrt();
        let n = n0 + eph.dn_rad_s;
        let m_k = eph.m0_rad + n * dt_seconds;

        let mut e_k;
        let mut e_k_lst = m_k;
        let mut i = 0;
        loop {
            if i > max_iteration {
                #[cfg(feature = "log")]
                error!("({}) kepler solver: did not converge", satellite);
                return Err(EphemerisError::Diverged);
            }
            e_k = m_k + eph.ecc * e_k_lst.sin();
            if (e_k - e_k_lst).abs() < 1.0e-12 {
                break;
            }
            i += 1;
            e_k_lst = e_k;
        }

        let (sin_e_k, cos_e_k) = e_k.sin_cos();
        let v_k = ((1.0 - eph.ecc.powi(2)).sqrt() * sin_e_k).atan2(cos_e_k - eph.ecc);

        let phi_k = v_k + eph.aop_rad;
        let (x2_sin_phi_k, x2_cos_phi_k) = (2.0 * phi_k).sin_cos();

        let du_k = eph.cus_rad * x2_sin_phi_k + eph.cuc_rad * x2_cos_phi_k;
        let u_k = phi_k + du_k;

        let dr_k = eph.crs_m * x2_sin_phi_k + eph.crc_m * x2_cos_phi_k;
        let r_k = sma_m * (1.0 - eph.ecc * e_k.cos()) + dr_k;

        let di_k = eph.cis_rad * x2_sin_phi_k + eph.cic_rad * x2_cos_phi_k;

        let fd_omega_k = eph.omega_dot_rad_s - omega_e;
        let fd_e_k = n / (1.0 - eph.ecc * e_k.cos());
        let fd_phi_k = ((1.0 + eph.ecc) / (1.0 - eph.ecc)).sqrt()
            * ((v_k / 2.0).cos() / (e_k / 2.0).cos()).powi(2)
            * fd_e_k;

        let fd_u_k =
            (eph.cus_rad * x2_cos_phi_k - eph.cuc_rad * x2_sin_phi_k) * fd_phi_k * 2.0 + fd_phi_k;

        let fd_r_k = sma_m * eph.ecc * e_k.sin() * fd_e_k
            + 2.0 * (eph.crs_m * x2_cos_phi_k - eph.crc_m * x2_sin_phi_k) * fd_phi_k;

        let fd_i_k = eph.idot_rad_s
            + 2.0 * (eph.cis_rad * x2_cos_phi_k - eph.cic_rad * x2_sin_phi_k) * fd_phi_k;

        let sqrt_sma_m = eph.sqrt_a;
        let dtr = dtr_f * eph.ecc * sqrt_sma_m * e_k.sin();
        let fd_dtr = dtr_f * eph.ecc * sqrt_sma_m * e_k.cos() * fd_e_k;

        let toe_tow_s = eph.toe.to_gpst().to_time_of_week().1 as f64 * 1.0e-9;
        let omega_k = eph.omega0_rad + (eph.omega_dot_rad_s - omega_e) * dt_seconds
            - omega_e * toe_tow_s;

        let i_k = eph.i0_rad + di_k + eph.idot_rad_s * dt_seconds;

        let (x, y) = (r_k * u_k.cos(), r_k * u_k.sin());
        let r_sv = (x, y, 0.0);

        #[cfg(feature = "log")]
        debug!(
            "({}) dt={}s omega_k={} i_k={} r_sv=({}, {})",
            satellite, dt_seconds, omega_k, i_k, x, y
        );

        Ok(Self {
            satellite,
            dt_seconds,
            omega_k,
            dtr,
            fd_dtr,
            u_k,
            i_k,
            fd_u_k,
            r_k,
            fd_r_k,
            fd_i_k,
            fd_omega_k,
            r_sv,
        })
    }

    /// ECEF position (m) + velocity (m/s) as a flat 6-vector.
    pub fn position_velocity_m(&self) -> Vector6<f64> {
        let (x_m, y_m, _) = self.r_sv;
        let pos_m = self.meo_orbit_to_ecef_rotation_matrix() * Vector3::new(x_m, y_m, 0.0);

        let (fd_x, fd_y) = self.orbit_velocity();
        let (sin_omega_k, cos_omega_k) = self.omega_k.sin_cos();
        let (sin_i_k, cos_i_k) = self.i_k.sin_cos();

        let mut fd_r = SMatrix::<f64, 3, 4>::zeros();
        fd_r[(0, 0)] = cos_omega_k;
        fd_r[(0, 1)] = -sin_omega_k * cos_i_k;
        fd_r[(0, 2)] = -(x_m * sin_omega_k + y_m * cos_omega_k * cos_i_k);
        fd_r[(0, 3)] = y_m * sin_omega_k * sin_i_k;
        fd_r[(1, 0)] = sin_omega_k;
        fd_r[(1, 1)] = cos_omega_k * cos_i_k;
        fd_r[(1, 2)] = x_m * cos_omega_k - y_m * sin_omega_k * cos_i_k;
        fd_r[(1, 3)] = y_m * cos_omega_k * sin_i_k;
        fd_r[(2, 1)] = sin_i_k;
        fd_r[(2, 3)] = y_m * cos_i_k;

        let vel_m = fd_r * Vector4::new(fd_x, fd_y, self.fd_omega_k, self.fd_i_k);

        Vector6::new(pos_m[0], pos_m[1], pos_m[2], vel_m[0], vel_m[1], vel_m[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_orbit_stays_near_nominal_radius() {
        let eph = KeplerianEphemeris {
            toe: GnssTime::from_gps_week_tow(2000, 302_400.0),
            toc: GnssTime::from_gps_week_tow(2000, 302_400.0),
            sqrt_a: 5153.6,
            ecc: 0.001,
            i0_rad: 0.96,
            omega0_rad: 1.0,
            aop_rad: 0.5,
            m0_rad: 0.2,
            ..Default::default()
        };
        let sv = SV::new(Constellation::GPS, 1);
        let t = GnssTime::from_gps_week_tow(2000, 302_400.0 + 600.0);
        let state = eph.evaluate(sv, t).unwrap();
        let r = state.position_m.norm();
        assert!((r - 26_560_000.0).abs() < 50_000.0);
    }

    #[test]
    fn outside_validity_window_is_rejected() {
        let eph = KeplerianEphemeris {
            toe: GnssTime::from_gps_week_tow(2000, 302_400.0),
            sqrt_a: 5153.6,
            ..Default::default()
        };
        let sv = SV::new(Constellation::GPS, 1);
        let t = GnssTime::from_gps_week_tow(2000, 302_400.0 + 10_000.0);
        assert!(eph.evaluate(sv, t).is_err());
    }
}
