//! Satellite phase wind-up: the carrier-phase cycle offset induced
//! by the relative rotation of the satellite's yaw-steered antenna and the
//! receiver's antenna, accumulated continuously across epochs per
//! satellite so the half-turn ambiguity in `acos` doesn't fold the series.

use nalgebra::Vector3;

use crate::sv::SV;
use crate::time::GnssTime;

use super::eclipse::sun_direction_ecef_unit;

/// Satellite body axes for a yaw-steered (nadir-pointing, sun-tracking
/// solar panel) attitude law: `ez` points at the Earth, `ex`/`ey` span the
/// plane normal to it with `ey` along the solar-panel rotation axis.
fn satellite_body_axes(sat_position_m: Vector3<f64>, sun_unit: Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let ez = -sat_position_m.normalize();
    let es = sun_unit - ez * ez.dot(&sun_unit);
    let ey = ez.cross(&es).normalize();
    let ex = ey.cross(&ez);
    (ex, ey)
}

/// Receiver local east/north unit vectors at `position_m` (ECEF), used as
/// the fixed-dipole receiver antenna axes.
fn receiver_local_axes(position_m: Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let up = position_m.normalize();
    let east = Vector3::z_axis().cross(&up).normalize();
    let north = up.cross(&east);
    (east, north)
}

/// Computes the instantaneous (half-turn-ambiguous) wind-up phase in
/// cycles for one satellite/receiver pair, per the Wu et al. (1993)
/// effective-dipole model.
fn instantaneous_windup_cycles(
    sat_position_m: Vector3<f64>,
    receiver_position_m: Vector3<f64>,
    sun_unit: Vector3<f64>,
) -> f64 {
    let los = (receiver_position_m - sat_position_m).normalize();
    let (exs, eys) = satellite_body_axes(sat_position_m, sun_unit);
    let (exr, eyr) = receiver_local_axes(receiver_position_m);

    let ds = exs - los * los.dot(&exs) - los.cross(&eys);
    let dr = exr - los * los.dot(&exr) + los.cross(&eyr);

    let cos_psi = (ds.dot(&dr) / (ds.norm() * dr.norm())).clamp(-1.0, 1.0);
    let mut psi_cycles = cos_psi.acos() / std::f64::consts::TAU;

    let sign_reference = ds.cross(&dr);
    if los.dot(&sign_reference) < 0.0 {
        psi_cycles = -psi_cycles;
    }
    psi_cycles
}

/// Accumulated wind-up for `sv` between epochs, resolving the half-turn
/// ambiguity against `previous_cycles` by choosing the integer-cycle
/// offset nearest the prior value.
pub fn accumulated_windup_cycles(
    sv: SV,
    sat_position_m: Vector3<f64>,
    receiver_position_m: Vector3<f64>,
    t: GnssTime,
    previous_cycles: Option<f64>,
) -> f64 {
    let _ = sv;
    let sun_unit = sun_direction_ecef_unit(t);
    let psi = instantaneous_windup_cycles(sat_position_m, receiver_position_m, sun_unit);

    match previous_cycles {
        Some(prev) => {
            let n = ((prev - psi) / 1.0).round();
            psi + n
        },
        None => psi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv::Constellation;

    #[test]
    fn windup_is_continuous_across_small_motion() {
        let sv = SV::new(Constellation::GPS, 1);
        let t = GnssTime::from_gps_week_tow(2200, 100_000.0);
        let sat = Vector3::new(20_000_000.0, 10_000_000.0, 5_000_000.0);
        let rx = Vector3::new(4_000_000.0, 1_000_000.0, 4_500_000.0);

        let w0 = accumulated_windup_cycles(sv, sat, rx, t, None);
        let sat2 = sat + Vector3::new(100.0, 50.0, -30.0);
        let w1 = accumulated_windup_cycles(sv, sat2, rx, t, Some(w0));
        assert!((w1 - w0).abs() < 0.1);
    }

    #[test]
    fn windup_has_no_nan_for_typical_geometry() {
        let sv = SV::new(Constellation::GPS, 1);
        let t = GnssTime::from_gps_week_tow(2200, 50_000.0);
        let sat = Vector3::new(15_000_000.0, -12_000_000.0, 18_000_000.0);
        let rx = Vector3::new(4_000_000.0, 1_000_000.0, 4_500_000.0);
        let w = accumulated_windup_cycles(sv, sat, rx, t, None);
        assert!(w.is_finite());
    }
}
