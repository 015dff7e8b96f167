//! Reference-station, antenna, and receiver-descriptor messages: 1005,
//! 1006, 1007, 1008, 1029, 1033.

use crate::bitbuf::BitReader;
use crate::station::StationMetadata;

use super::{Decoder, RtcmError};

const ECEF_LSB_M: f64 = 0.0001;
const ANTENNA_HEIGHT_LSB_M: f64 = 0.0001;

/// 1005 (ARP only) / 1006 (ARP + antenna height).
pub fn decode_reference_station(
    payload: &[u8],
    message_type: u16,
    decoder: &mut Decoder,
) -> Result<(), RtcmError> {
    let r = BitReader::new(payload);
    let mut off = 12;

    let station_id = r.get_uint(off, 12)? as u16;
    off += 12;
    let itrf_year = r.get_uint(off, 6)? as u8;
    off += 6;
    let _gps_indicator = r.get_uint(off, 1)?;
    off += 1;
    let _glonass_indicator = r.get_uint(off, 1)?;
    off += 1;
    let _galileo_indicator = r.get_uint(off, 1)?;
    off += 1;
    let _reference_station_indicator = r.get_uint(off, 1)?;
    off += 1;

    let x_raw = r.get_int38(off)?;
    off += 38;
    let _single_receiver_oscillator = r.get_uint(off, 1)?;
    off += 1;
    let _reserved = r.get_uint(off, 1)?;
    off += 1;
    let y_raw = r.get_int38(off)?;
    off += 38;
    let _quarter_cycle_indicator = r.get_uint(off, 2)?;
    off += 2;
    let z_raw = r.get_int38(off)?;
    off += 38;

    decoder.latch_station_id(station_id)?;

    let antenna_height_m = if message_type == 1006 {
        let raw = r.get_uint(off, 16)? as f64;
        Some(raw * ANTENNA_HEIGHT_LSB_M)
    } else {
        None
    };

    let station = decoder.nav.station.get_or_insert_with(|| StationMetadata::new(station_id));
    station.station_id = station_id;
    station.itrf_year = itrf_year;
    station.arp_ecef_m = nalgebra::Vector3::new(
        x_raw as f64 * ECEF_LSB_M,
        y_raw as f64 * ECEF_LSB_M,
        z_raw as f64 * ECEF_LSB_M,
    );
    station.antenna_height_m = antenna_height_m;

    Ok(())
}

/// 1007 (antenna descriptor), 1008 (+ serial), 1033 (+ receiver descriptor).
pub fn decode_descriptor(
    payload: &[u8],
    message_type: u16,
    decoder: &mut Decoder,
) -> Result<(), RtcmError> {
    let r = BitReader::new(payload);
    let mut off = 12;

    let station_id = r.get_uint(off, 12)? as u16;
    off += 12;
    decoder.latch_station_id(station_id)?;

    let descriptor_len = r.get_uint(off, 8)? as usize;
    off += 8;
    let descriptor = r.get_ascii(off, descriptor_len)?;
    off += descriptor_len * 8;

    let setup_id = r.get_uint(off, 8)? as u8;
    off += 8;

    let station = decoder.nav.station.get_or_insert_with(|| StationMetadata::new(station_id));
    station.antenna_descriptor = descriptor;
    station.antenna_setup_id = setup_id;

    if message_type == 1008 || message_type == 1033 {
        let serial_len = r.get_uint(off, 8)? as usize;
        off += 8;
        let serial = r.get_ascii(off, serial_len)?;
        off += serial_len * 8;
        decoder.nav.station.as_mut().unwrap().antenna_serial = serial;

        if message_type == 1033 {
            let rcv_desc_len = r.get_uint(off, 8)? as usize;
            off += 8;
            let rcv_desc = r.get_ascii(off, rcv_desc_len)?;
            off += rcv_desc_len * 8;

            let rcv_fw_len = r.get_uint(off, 8)? as usize;
            off += 8;
            let rcv_fw = r.get_ascii(off, rcv_fw_len)?;
            off += rcv_fw_len * 8;

            let rcv_serial_len = r.get_uint(off, 8)? as usize;
            off += 8;
            let rcv_serial = r.get_ascii(off, rcv_serial_len)?;
            off += rcv_serial_len * 8;

            let station = decoder.nav.station.as_mut().unwrap();
            station.receiver_descriptor = rcv_desc;
            station.receiver_firmware = rcv_fw;
            station.receiver_serial = rcv_serial;
        }
    }

    Ok(())
}

/// 1029: UTF-8 text message, not otherwise consumed by the core.
pub fn decode_text(payload: &[u8], decoder: &mut Decoder) -> Result<String, RtcmError> {
    let r = BitReader::new(payload);
    let mut off = 12;
    let station_id = r.get_uint(off, 12)? as u16;
    off += 12;
    decoder.latch_station_id(station_id)?;
    let _mjd = r.get_uint(off, 16)?;
    off += 16;
    let _tod_s = r.get_uint(off, 17)?;
    off += 17;
    let char_count = r.get_uint(off, 7)? as usize;
    off += 7;
    let byte_count = r.get_uint(off, 8)? as usize;
    off += 8;
    let _ = char_count;
    r.get_ascii(off, byte_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtcm::{DecoderOptions, Decoder};

    #[test]
    fn scenario_a_arp_decode() {
        let mut w = crate::bitbuf::BitWriter::with_capacity_bits(22 * 8);
        w.set_uint(0, 12, 1005);
        w.set_uint(12, 12, 1234);
        w.set_uint(24, 6, 0);
        w.set_int38(36, (3_973_204.88 / ECEF_LSB_M).round() as i64);
        w.set_int38(76, (1_005_308.80 / ECEF_LSB_M).round() as i64);
        w.set_int38(116, (4_890_200.00 / ECEF_LSB_M).round() as i64);
        let payload = w.into_bytes();
        let mut decoder = Decoder::new(DecoderOptions::default());
        decode_reference_station(&payload, 1005, &mut decoder).unwrap();
        let station = decoder.nav.station.unwrap();
        assert_eq!(station.station_id, 1234);
        assert!((station.arp_ecef_m.x - 3_973_204.88).abs() < 0.001);
        assert!((station.arp_ecef_m.y - 1_005_308.80).abs() < 0.001);
        assert!((station.arp_ecef_m.z - 4_890_200.00).abs() < 0.001);
    }
}
