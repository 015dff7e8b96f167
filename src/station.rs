//! Station/antenna/receiver metadata: reference-point position,
//! antenna/receiver descriptors, and GLONASS code-phase biases carried by
//! messages 1005/1006/1007/1008/1029/1033/1230.

use nalgebra::Vector3;

/// ARP ECEF position + optional antenna height, antenna/receiver
/// descriptors, and the GLONASS code-phase bias array, keyed by station ID.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StationMetadata {
    pub station_id: u16,
    pub itrf_year: u8,
    pub arp_ecef_m: Vector3<f64>,
    pub antenna_height_m: Option<f64>,
    pub antenna_delta_m: Vector3<f64>,
    pub antenna_descriptor: String,
    pub antenna_serial: String,
    pub antenna_setup_id: u8,
    pub receiver_descriptor: String,
    pub receiver_firmware: String,
    pub receiver_serial: String,
    /// GLONASS code-phase bias per signal, in the order broadcast by 1230
    /// (L1 C/A, L1 P, L2 C/A, L2 P), units of 0.02 m as decoded to metres.
    pub glonass_code_phase_bias_m: [f64; 4],
}

impl StationMetadata {
    pub fn new(station_id: u16) -> Self {
        Self {
            station_id,
            ..Default::default()
        }
    }

    /// Station IDs must be consistent once latched; a mismatch means the
    /// caller should reject the frame and leave prior state untouched.
    pub fn is_consistent_with(&self, incoming_station_id: u16) -> bool {
        self.station_id == incoming_station_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metadata_has_zero_arp() {
        let meta = StationMetadata::new(1234);
        assert_eq!(meta.station_id, 1234);
        assert_eq!(meta.arp_ecef_m, Vector3::zeros());
    }

    #[test]
    fn station_id_mismatch_is_detected() {
        let meta = StationMetadata::new(1234);
        assert!(meta.is_consistent_with(1234));
        assert!(!meta.is_consistent_with(5678));
    }
}
