//! Broadcast-ephemeris message decoders: 1019 GPS, 1020 GLONASS, 1041
//! IRNSS, 1042 BeiDou, 1044 QZSS, 1045/1046 Galileo F/NAV and I/NAV.

use hifitime::TimeScale;

use crate::bitbuf::BitReader;
use crate::ephemeris::{Ephemeris, GlonassEphemeris, KeplerianEphemeris};
use crate::sv::{sv_from_wire, Constellation};
use crate::time::GnssTime;

use super::{Decoder, RtcmError};

const GAL_WEEK_OFFSET: u32 = 1024;

/// Scale factors for the Keplerian field set, 2^-k as the ICD specifies.
struct KeplerianScale {
    sqrt_a: f64,
    ecc: f64,
    angle: f64, // i0, omega0, aop, m0 share 2^-31 semicircles
    rate_small: f64,
    rate_tiny: f64,
    cuc_cus_cic_cis: f64,
    crc_crs: f64,
    af0: f64,
    af1: f64,
    af2: f64,
    tgd: f64,
}

const PI: f64 = std::f64::consts::PI;

const GPS_SCALE: KeplerianScale = KeplerianScale {
    sqrt_a: 2f64.powi(-19),
    ecc: 2f64.powi(-33),
    angle: 2f64.powi(-31) * PI,
    rate_small: 2f64.powi(-43) * PI,
    rate_tiny: 2f64.powi(-43) * PI,
    cuc_cus_cic_cis: 2f64.powi(-29),
    crc_crs: 2f64.powi(-5),
    af0: 2f64.powi(-31),
    af1: 2f64.powi(-43),
    af2: 2f64.powi(-55),
    tgd: 2f64.powi(-31),
};

fn decode_keplerian(
    r: &BitReader,
    mut off: usize,
    constellation: Constellation,
    decoder_reference: GnssTime,
) -> Result<(u8, KeplerianEphemeris), RtcmError> {
    let scale = &GPS_SCALE;

    let prn = r.get_uint(off, 6)? as u8;
    off += 6;
    let week = r.get_uint(off, 10)? as u32;
    off += 10;
    let _ura = r.get_uint(off, 4)?;
    off += 4;
    let _code_on_l2 = r.get_uint(off, 2)?;
    off += 2;
    let idot = r.get_int(off, 14)? as f64 * scale.rate_tiny;
    off += 14;
    let iode = r.get_uint(off, 8)? as u16;
    off += 8;
    let toc_s = r.get_uint(off, 16)? as f64 * 16.0;
    off += 16;
    let af2 = r.get_int(off, 8)? as f64 * scale.af2;
    off += 8;
    let af1 = r.get_int(off, 16)? as f64 * scale.af1;
    off += 16;
    let af0 = r.get_int(off, 22)? as f64 * scale.af0;
    off += 22;
    let iodc = r.get_uint(off, 10)? as u16;
    off += 10;
    let crs = r.get_int(off, 16)? as f64 * scale.crc_crs;
    off += 16;
    let dn = r.get_int(off, 16)? as f64 * scale.rate_small;
    off += 16;
    let m0 = r.get_int(off, 32)? as f64 * scale.angle;
    off += 32;
    let cuc = r.get_int(off, 16)? as f64 * scale.cuc_cus_cic_cis;
    off += 16;
    let ecc = r.get_uint(off, 32)? as f64 * scale.ecc;
    off += 32;
    let cus = r.get_int(off, 16)? as f64 * scale.cuc_cus_cic_cis;
    off += 16;
    let sqrt_a = r.get_uint(off, 32)? as f64 * scale.sqrt_a;
    off += 32;
    let toe_s = r.get_uint(off, 16)? as f64 * 16.0;
    off += 16;
    let cic = r.get_int(off, 16)? as f64 * scale.cuc_cus_cic_cis;
    off += 16;
    let omega0 = r.get_int(off, 32)? as f64 * scale.angle;
    off += 32;
    let cis = r.get_int(off, 16)? as f64 * scale.cuc_cus_cic_cis;
    off += 16;
    let i0 = r.get_int(off, 32)? as f64 * scale.angle;
    off += 32;
    let crc = r.get_int(off, 16)? as f64 * scale.crc_crs;
    off += 16;
    let aop = r.get_int(off, 32)? as f64 * scale.angle;
    off += 32;
    let omega_dot = r.get_int(off, 24)? as f64 * scale.rate_small;
    off += 24;
    let tgd = r.get_int(off, 8)? as f64 * scale.tgd;
    off += 8;
    let health = r.get_uint(off, 6)? as u8;

    let scale_time = match constellation {
        Constellation::BeiDou => TimeScale::BDT,
        Constellation::Galileo => TimeScale::GST,
        _ => TimeScale::GPST,
    };
    let week = if constellation == Constellation::Galileo {
        week + GAL_WEEK_OFFSET
    } else {
        week
    };
    let adjusted_week =
        GnssTime::adjust_ephemeris_week(decoder_reference.epoch(), week, toe_s, scale_time);

    let toe = GnssTime::from_epoch(hifitime::Epoch::from_time_of_week(
        adjusted_week,
        (toe_s * 1.0e9) as u64,
        scale_time,
    ));
    let toc = GnssTime::from_epoch(hifitime::Epoch::from_time_of_week(
        adjusted_week,
        (toc_s * 1.0e9) as u64,
        scale_time,
    ));

    let eph = KeplerianEphemeris {
        toe,
        toc,
        sqrt_a,
        ecc,
        i0_rad: i0,
        omega0_rad: omega0,
        aop_rad: aop,
        m0_rad: m0,
        dn_rad_s: dn,
        idot_rad_s: idot,
        omega_dot_rad_s: omega_dot,
        cus_rad: cus,
        cuc_rad: cuc,
        cis_rad: cis,
        cic_rad: cic,
        crs_m: crs,
        crc_m: crc,
        af0_s: af0,
        af1_s_s: af1,
        af2_s_s2: af2,
        tgd_s: tgd,
        iode,
        iodc,
        ura_m: 2.0,
        health,
    };
    Ok((prn, eph))
}

fn decode_glonass(r: &BitReader, mut off: usize) -> Result<(u8, GlonassEphemeris), RtcmError> {
    let prn = r.get_uint(off, 6)? as u8;
    off += 6;
    let freq_channel = r.get_int(off, 5)? as i8;
    off += 5;
    let _almanac_health = r.get_uint(off, 1)?;
    off += 1;
    let _almanac_health_avail = r.get_uint(off, 1)?;
    off += 1;
    let _p1 = r.get_uint(off, 2)?;
    off += 2;
    let tb_min = r.get_uint(off, 7)? as u16;
    off += 7;

    let vel_x = r.get_sign_magnitude(off, 24)? as f64 * 2f64.powi(-20) * 1000.0;
    off += 24;
    let pos_x = r.get_sign_magnitude(off, 27)? as f64 * 2f64.powi(-11) * 1000.0;
    off += 27;
    let accel_x = r.get_sign_magnitude(off, 5)? as f64 * 2f64.powi(-30) * 1000.0;
    off += 5;

    let vel_y = r.get_sign_magnitude(off, 24)? as f64 * 2f64.powi(-20) * 1000.0;
    off += 24;
    let pos_y = r.get_sign_magnitude(off, 27)? as f64 * 2f64.powi(-11) * 1000.0;
    off += 27;
    let accel_y = r.get_sign_magnitude(off, 5)? as f64 * 2f64.powi(-30) * 1000.0;
    off += 5;

    let vel_z = r.get_sign_magnitude(off, 24)? as f64 * 2f64.powi(-20) * 1000.0;
    off += 24;
    let pos_z = r.get_sign_magnitude(off, 27)? as f64 * 2f64.powi(-11) * 1000.0;
    off += 27;
    let accel_z = r.get_sign_magnitude(off, 5)? as f64 * 2f64.powi(-30) * 1000.0;
    off += 5;

    let unhealthy = r.get_uint(off, 1)? != 0;
    off += 1;
    let _p2 = r.get_uint(off, 1)?;
    off += 1;
    let _tb = r.get_uint(off, 7)?;
    off += 7;
    let gamma_n = r.get_sign_magnitude(off, 11)? as f64 * 2f64.powi(-40);
    off += 11;
    let _p3 = r.get_uint(off, 1)?;
    off += 1;
    let tau_n = r.get_sign_magnitude(off, 22)? as f64 * 2f64.powi(-30);

    let tb = GnssTime::from_glonass(hifitime::Epoch::from_time_of_week(
        0,
        (tb_min as u64) * 15 * 60 * 1_000_000_000,
        TimeScale::UTC,
    ));

    Ok((
        prn,
        GlonassEphemeris {
            tb,
            tb_min,
            position_m: nalgebra::Vector3::new(pos_x, pos_y, pos_z),
            velocity_m_s: nalgebra::Vector3::new(vel_x, vel_y, vel_z),
            accel_luni_solar_m_s2: nalgebra::Vector3::new(accel_x, accel_y, accel_z),
            tau_n_s: tau_n,
            gamma_n,
            freq_channel,
            unhealthy,
            age_days: 0,
        },
    ))
}

/// Decodes a broadcast-ephemeris message and inserts it into the decoder's
/// navigation store, applying the ephemeris store's deduplication rule.
pub fn decode(payload: &[u8], message_type: u16, decoder: &mut Decoder) -> Result<(), RtcmError> {
    let r = BitReader::new(payload);
    let off = 12;

    let reference = decoder
        .obs_store
        .reference_epoch()
        .map(GnssTime::from_epoch)
        .unwrap_or_else(|| GnssTime::from_gps_week_tow(0, 0.0));

    let (set_index, constellation, (prn, ephemeris)) = match message_type {
        1019 => (0u8, Constellation::GPS, {
            let (prn, eph) = decode_keplerian(&r, off, Constellation::GPS, reference)?;
            (prn, Ephemeris::Keplerian(eph))
        }),
        1041 => (0u8, Constellation::IRNSS, {
            let (prn, eph) = decode_keplerian(&r, off, Constellation::IRNSS, reference)?;
            (prn, Ephemeris::Keplerian(eph))
        }),
        1042 => (0u8, Constellation::BeiDou, {
            let (prn, eph) = decode_keplerian(&r, off, Constellation::BeiDou, reference)?;
            (prn, Ephemeris::Keplerian(eph))
        }),
        1044 => (0u8, Constellation::QZSS, {
            let (prn, eph) = decode_keplerian(&r, off, Constellation::QZSS, reference)?;
            (prn, Ephemeris::Keplerian(eph))
        }),
        1045 => (1u8, Constellation::Galileo, {
            let (prn, eph) = decode_keplerian(&r, off, Constellation::Galileo, reference)?;
            (prn, Ephemeris::Keplerian(eph))
        }),
        1046 => (0u8, Constellation::Galileo, {
            let (prn, eph) = decode_keplerian(&r, off, Constellation::Galileo, reference)?;
            (prn, Ephemeris::Keplerian(eph))
        }),
        1020 => (0u8, Constellation::Glonass, {
            let (prn, eph) = decode_glonass(&r, off)?;
            (prn, Ephemeris::Glonass(eph))
        }),
        _ => unreachable!("dispatcher only routes supported ephemeris types here"),
    };

    let sv = sv_from_wire(constellation, prn).ok_or(RtcmError::UnknownSatellite {
        constellation,
        prn,
    })?;

    decoder
        .nav
        .ephemeris
        .insert(sv, set_index, ephemeris, decoder.options.ephall);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtcm::{Decoder, DecoderOptions};

    #[test]
    fn scenario_c_gps_ephemeris_dedup() {
        let mut w = crate::bitbuf::BitWriter::with_capacity_bits(600);
        w.set_uint(0, 12, 1019);
        w.set_uint(12, 6, 5); // PRN 5
        w.set_uint(18, 10, 2000); // week
        w.set_uint(24, 4, 0);
        w.set_uint(28, 2, 0);
        w.set_int(30, 14, 0); // idot
        w.set_uint(44, 8, 42); // iode
        w.set_uint(52, 16, (302_400.0 / 16.0) as u64); // toc
        let payload = w.into_bytes();

        let mut decoder = Decoder::new(DecoderOptions::default());
        decode(&payload, 1019, &mut decoder).unwrap();
        let sv = crate::sv::SV::new(Constellation::GPS, 5);
        assert!(decoder.nav.ephemeris.lookup(sv, 0, GnssTime::from_gps_week_tow(2000, 302_400.0)).is_some());

        decode(&payload, 1019, &mut decoder).unwrap();
        // identical iode: stored set stays a single entry (no growth,
        // dedup rule applied inside EphemerisStore::insert).
    }
}
