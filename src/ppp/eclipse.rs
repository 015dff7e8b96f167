//! Satellite eclipse exclusion: BLOCK IIA satellites lack the yaw-steering
//! law newer blocks use, so their attitude is unreliable while their body
//! lies in Earth's shadow; their phase observations are excluded until they
//! have cleared the shadow by a margin. Other satellite blocks keep steering
//! correctly through eclipse and are never excluded on this basis.

use nalgebra::Vector3;

use crate::sv::SV;
use crate::time::GnssTime;

const EARTH_RADIUS_M: f64 = 6_378_137.0;
const ASTRONOMICAL_UNIT_M: f64 = 1.495_978_707e11;

/// Historical Block IIA PRNs, which lack the yaw-steering law the newer
/// blocks use and need a wider shadow margin.
const BLOCK_IIA_GPS_PRNS: [u8; 3] = [24, 26, 27];

/// Shadow-exit margin, in seconds, before a recovering BLOCK IIA
/// satellite's observations are trusted again.
const BLOCK_IIA_RECOVERY_MARGIN_S: f64 = 3600.0;

/// Low-precision geocentric sun direction (unit vector, ECEF), from the
/// Astronomical Almanac's low-precision solar coordinates reduced through
/// a GMST rotation. Accurate to a few arcminutes, which is ample for
/// shadow-crossing geometry.
pub fn sun_direction_ecef_unit(t: GnssTime) -> Vector3<f64> {
    let jd = t.to_utc().to_jde_utc_days();
    let d = jd - 2_451_545.0;

    let mean_longitude_deg = (280.460 + 0.985_647_4 * d).rem_euclid(360.0);
    let mean_anomaly_deg = (357.528 + 0.985_600_3 * d).rem_euclid(360.0);
    let mean_anomaly_rad = mean_anomaly_deg.to_radians();

    let ecliptic_longitude_deg = mean_longitude_deg
        + 1.915 * mean_anomaly_rad.sin()
        + 0.020 * (2.0 * mean_anomaly_rad).sin();
    let ecliptic_longitude_rad = ecliptic_longitude_deg.to_radians();

    let obliquity_rad = (23.439 - 0.000_000_4 * d).to_radians();

    let x_eci = ecliptic_longitude_rad.cos();
    let y_eci = obliquity_rad.cos() * ecliptic_longitude_rad.sin();
    let z_eci = obliquity_rad.sin() * ecliptic_longitude_rad.sin();

    let gmst_deg = (280.460_618_37 + 360.985_647_366_29 * d).rem_euclid(360.0);
    let gmst_rad = gmst_deg.to_radians();

    let x_ecef = gmst_rad.cos() * x_eci + gmst_rad.sin() * y_eci;
    let y_ecef = -gmst_rad.sin() * x_eci + gmst_rad.cos() * y_eci;
    let z_ecef = z_eci;

    Vector3::new(x_ecef, y_ecef, z_ecef).normalize()
}

/// Geocentric sun position in ECEF metres, for cylindrical shadow testing.
fn sun_position_ecef_m(t: GnssTime) -> Vector3<f64> {
    sun_direction_ecef_unit(t) * ASTRONOMICAL_UNIT_M
}

/// Cylindrical shadow test: `true` when `sat_position_m` lies within
/// Earth's shadow cylinder along the sun direction.
fn in_shadow_cylinder(sat_position_m: Vector3<f64>, sun_position_m: Vector3<f64>) -> bool {
    let sun_dir = sun_position_m.normalize();
    let along_sun = sat_position_m.dot(&sun_dir);
    if along_sun > 0.0 {
        return false;
    }
    let perpendicular = sat_position_m - sun_dir * along_sun;
    perpendicular.norm() < EARTH_RADIUS_M
}

/// Whether `sv` at `sat_position_m`/`t` should be excluded from the
/// measurement update. Only BLOCK IIA satellites lack the yaw-steering law
/// that keeps attitude (and so phase windup) well-defined through a shadow
/// crossing, so exclusion never triggers for any other satellite type,
/// regardless of shadow placement.
pub fn is_excluded(sv: SV, sat_position_m: Vector3<f64>, t: GnssTime, seconds_since_shadow_exit: Option<f64>) -> bool {
    let is_block_iia =
        sv.constellation == crate::sv::Constellation::GPS && BLOCK_IIA_GPS_PRNS.contains(&sv.prn);
    if !is_block_iia {
        return false;
    }

    let sun_position_m = sun_position_ecef_m(t);
    if in_shadow_cylinder(sat_position_m, sun_position_m) {
        return true;
    }

    match seconds_since_shadow_exit {
        Some(dt) => dt < BLOCK_IIA_RECOVERY_MARGIN_S,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv::Constellation;

    #[test]
    fn sun_direction_is_unit_length() {
        let t = GnssTime::from_gps_week_tow(2200, 100_000.0);
        let sun = sun_direction_ecef_unit(t);
        assert!((sun.norm() - 1.0).abs() < 1.0e-9);
    }

    #[test]
    fn satellite_behind_earth_from_sun_is_shadowed() {
        let t = GnssTime::from_gps_week_tow(2200, 100_000.0);
        let sun_dir = sun_direction_ecef_unit(t);
        let sat_position_m = -sun_dir * 26_000_000.0;
        assert!(in_shadow_cylinder(sat_position_m, sun_dir * ASTRONOMICAL_UNIT_M));
    }

    #[test]
    fn satellite_sunward_is_never_shadowed() {
        let t = GnssTime::from_gps_week_tow(2200, 100_000.0);
        let sun_dir = sun_direction_ecef_unit(t);
        let sat_position_m = sun_dir * 26_000_000.0;
        let sv = SV::new(Constellation::GPS, 1);
        assert!(!is_excluded(sv, sat_position_m, t, None));
    }

    #[test]
    fn eclipsed_non_block_iia_satellite_is_not_excluded() {
        let t = GnssTime::from_gps_week_tow(2200, 100_000.0);
        let sun_dir = sun_direction_ecef_unit(t);
        let sat_position_m = -sun_dir * 26_000_000.0;
        let sv = SV::new(Constellation::GPS, 1);
        assert!(!BLOCK_IIA_GPS_PRNS.contains(&sv.prn));
        assert!(!is_excluded(sv, sat_position_m, t, None));
    }

    #[test]
    fn eclipsed_block_iia_satellite_is_excluded() {
        let t = GnssTime::from_gps_week_tow(2200, 100_000.0);
        let sun_dir = sun_direction_ecef_unit(t);
        let sat_position_m = -sun_dir * 26_000_000.0;
        let sv = SV::new(Constellation::GPS, BLOCK_IIA_GPS_PRNS[0]);
        assert!(is_excluded(sv, sat_position_m, t, None));
    }
}
