//! WGS84 ECEF/geodetic conversion and the Saastamoinen zenith troposphere
//! model, used by the measurement model's troposphere mapping.

use nalgebra::Vector3;

const WGS84_A_M: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// Geodetic coordinates: latitude/longitude in radians, height in metres.
pub struct Geodetic {
    pub lat_rad: f64,
    pub lon_rad: f64,
    pub height_m: f64,
}

/// Closed-form ECEF-to-geodetic conversion (Bowring's method), accurate to
/// sub-millimetre height error for terrestrial receiver positions.
pub fn ecef_to_geodetic(position_m: Vector3<f64>) -> Geodetic {
    let (x, y, z) = (position_m.x, position_m.y, position_m.z);
    let lon_rad = y.atan2(x);
    let p = (x * x + y * y).sqrt();

    if p < 1.0e-3 {
        let lat_rad = if z >= 0.0 { std::f64::consts::FRAC_PI_2 } else { -std::f64::consts::FRAC_PI_2 };
        return Geodetic { lat_rad, lon_rad, height_m: z.abs() - WGS84_A_M * (1.0 - WGS84_F) };
    }

    let b = WGS84_A_M * (1.0 - WGS84_F);
    let theta = (z * WGS84_A_M).atan2(p * b);
    let ep2 = (WGS84_A_M * WGS84_A_M - b * b) / (b * b);
    let lat_rad = (z + ep2 * b * theta.sin().powi(3)).atan2(p - WGS84_E2 * WGS84_A_M * theta.cos().powi(3));

    let sin_lat = lat_rad.sin();
    let n = WGS84_A_M / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    let height_m = p / lat_rad.cos() - n;

    Geodetic { lat_rad, lon_rad, height_m }
}

/// Saastamoinen zenith hydrostatic + wet delay, metres, using the standard
/// atmosphere model (no met-station input) referenced at 50% relative
/// humidity, 1013.25 hPa / 18 degC sea-level values scaled by height.
pub fn saastamoinen_zenith_delay_m(geodetic: &Geodetic) -> f64 {
    let h = geodetic.height_m.max(0.0);
    let pressure_hpa = 1013.25 * (1.0 - 2.2557e-5 * h).powf(5.2568);
    let temp_k = 291.15 - 6.5e-3 * h;
    let rel_humidity = 0.5 * (-6.396e-4 * h).exp();
    let e_hpa = rel_humidity * (-37.2465 + 0.213166 * temp_k - 0.000256908 * temp_k * temp_k).exp();

    let lat = geodetic.lat_rad;
    let f = 1.0 - 0.00266 * (2.0 * lat).cos() - 0.00028 * h * 1.0e-3;

    (0.0022768 * pressure_hpa + 0.0022768 * (1255.0 / temp_k + 0.05) * e_hpa) / f
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_recovers_known_latitude() {
        let geodetic = Geodetic { lat_rad: 45f64.to_radians(), lon_rad: 10f64.to_radians(), height_m: 500.0 };
        let n = WGS84_A_M / (1.0 - WGS84_E2 * geodetic.lat_rad.sin().powi(2)).sqrt();
        let x = (n + geodetic.height_m) * geodetic.lat_rad.cos() * geodetic.lon_rad.cos();
        let y = (n + geodetic.height_m) * geodetic.lat_rad.cos() * geodetic.lon_rad.sin();
        let z = (n * (1.0 - WGS84_E2) + geodetic.height_m) * geodetic.lat_rad.sin();
        let back = ecef_to_geodetic(Vector3::new(x, y, z));
        assert!((back.lat_rad - geodetic.lat_rad).abs() < 1.0e-9);
        assert!((back.height_m - geodetic.height_m).abs() < 1.0e-3);
    }

    #[test]
    fn zenith_delay_is_physically_reasonable() {
        let geodetic = Geodetic { lat_rad: 45f64.to_radians(), lon_rad: 0.0, height_m: 0.0 };
        let delay = saastamoinen_zenith_delay_m(&geodetic);
        assert!(delay > 2.0 && delay < 2.6);
    }
}
