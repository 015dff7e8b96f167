//! GNSS time representation and time-system conversions.
//!
//! [`GnssTime`] wraps [`hifitime::Epoch`], which already guarantees the
//! "integer seconds + fractional seconds, fraction in `[0,1)`" invariant
//! needed for stable ordering and comparison; this module adds the
//! GPS/UTC/GLONASS/BeiDou/Galileo conversions and the week-number
//! disambiguation the wire format needs, none of which map one-to-one onto
//! `hifitime`'s own [`TimeScale`] set (GLONASS in particular is UTC+3h, not
//! a fixed-offset continuous scale).

use hifitime::{Duration, Epoch, TimeScale, Unit};

/// A GNSS timestamp, canonically stored as a continuous [`Epoch`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GnssTime(Epoch);

/// GLONASS broadcasts time of day in UTC + 3 hours (Moscow time), leap-second aware.
const GLONASS_UTC_OFFSET: Duration = Duration::from_total_nanoseconds(3 * 3_600 * 1_000_000_000);

/// BeiDou Time epoch is offset from GPST by a constant 14 seconds (no leap
/// seconds inserted into BDT since its 2006-01-01 origin).
const BDT_GPST_OFFSET_S: f64 = 14.0;

/// Half a GPS week, in seconds: the window used to disambiguate a
/// time-of-week value against an approximately-known reference epoch.
const HALF_WEEK_S: f64 = 302_400.0;

const SECONDS_PER_WEEK: f64 = 604_800.0;

impl GnssTime {
    /// Wraps an already-resolved [`Epoch`].
    pub fn from_epoch(epoch: Epoch) -> Self {
        Self(epoch)
    }

    /// Builds a [`GnssTime`] from an explicit GPS week number and
    /// time-of-week in seconds.
    pub fn from_gps_week_tow(week: u32, tow_s: f64) -> Self {
        Self(Epoch::from_time_of_week(
            week,
            (tow_s * 1.0e9) as u64,
            TimeScale::GPST,
        ))
    }

    /// Resolves a time-of-week value (milliseconds, as broadcast on the
    /// wire) against an approximately-known reference epoch, choosing the
    /// week number that places the result within half a week of the
    /// reference. Used both for legacy/MSM observation epochs and for
    /// ephemeris `toe` week-rollover handling.
    pub fn resolve_tow_ms(reference: Epoch, tow_ms: u32, scale: TimeScale) -> Epoch {
        let reference = reference.to_time_scale(scale);
        let (ref_week, _) = reference.to_time_of_week();
        let tow_s = tow_ms as f64 * 1.0e-3;

        let mut candidate = Epoch::from_time_of_week(ref_week, (tow_s * 1.0e9) as u64, scale);
        let mut delta = (candidate - reference).to_seconds();

        if delta > HALF_WEEK_S {
            candidate = Epoch::from_time_of_week(ref_week - 1, (tow_s * 1.0e9) as u64, scale);
        } else if delta < -HALF_WEEK_S {
            candidate = Epoch::from_time_of_week(ref_week + 1, (tow_s * 1.0e9) as u64, scale);
        }
        delta = (candidate - reference).to_seconds();
        debug_assert!(delta.abs() <= HALF_WEEK_S + 1.0);
        candidate
    }

    /// Adjusts a broadcast ephemeris week number against the decoder's
    /// current clock: if the candidate `toe` is more than ±302400 s away
    /// from `reference`, the stored week is nudged by ±1.
    pub fn adjust_ephemeris_week(reference: Epoch, week: u32, toe_s: f64, scale: TimeScale) -> u32 {
        let reference = reference.to_time_scale(scale);
        let candidate = Epoch::from_time_of_week(week, (toe_s * 1.0e9) as u64, scale);
        let delta = (candidate - reference).to_seconds();

        if delta > HALF_WEEK_S {
            week.saturating_sub(1)
        } else if delta < -HALF_WEEK_S {
            week + 1
        } else {
            week
        }
    }

    /// Underlying continuous [`Epoch`], in whatever [`TimeScale`] it was
    /// constructed with.
    pub fn epoch(&self) -> Epoch {
        self.0
    }

    /// Integer seconds component (invariant companion to [`Self::fraction`]).
    pub fn seconds(&self) -> i64 {
        self.0.to_time_scale(TimeScale::TAI).to_duration().to_seconds() as i64
    }

    /// Fractional-seconds component, always in `[0, 1)`.
    pub fn fraction(&self) -> f64 {
        let s = self
            .0
            .to_time_scale(TimeScale::TAI)
            .to_duration()
            .to_seconds();
        s - s.floor()
    }

    /// Converts to GPS Time.
    pub fn to_gpst(&self) -> Epoch {
        self.0.to_time_scale(TimeScale::GPST)
    }

    /// Converts to UTC (leap-second aware).
    pub fn to_utc(&self) -> Epoch {
        self.0.to_time_scale(TimeScale::UTC)
    }

    /// Converts to GLONASS time (UTC + 3 h, leap-second aware via the UTC
    /// conversion).
    pub fn to_glonass(&self) -> Epoch {
        self.to_utc() + GLONASS_UTC_OFFSET
    }

    /// Builds a [`GnssTime`] from a GLONASS-broadcast (UTC+3h) epoch.
    pub fn from_glonass(glonass_epoch: Epoch) -> Self {
        Self((glonass_epoch - GLONASS_UTC_OFFSET).to_time_scale(TimeScale::UTC))
    }

    /// Converts to BeiDou Time (BDT = GPST − 14 s, no intervening leap
    /// seconds).
    pub fn to_beidou(&self) -> Epoch {
        self.to_gpst() - BDT_GPST_OFFSET_S * Unit::Second
    }

    /// Builds a [`GnssTime`] from a BeiDou-Time epoch.
    pub fn from_beidou(bdt_epoch: Epoch) -> Self {
        Self((bdt_epoch + BDT_GPST_OFFSET_S * Unit::Second).to_time_scale(TimeScale::GPST))
    }

    /// Converts to Galileo System Time. GST shares GPST's epoch and rate;
    /// the +1024 week offset some messages apply is a wire-format
    /// week-counter convention, not a timescale difference, so it is
    /// handled at the RTCM decode site rather than here.
    pub fn to_galileo(&self) -> Epoch {
        self.0.to_time_scale(TimeScale::GST)
    }
}

impl From<Epoch> for GnssTime {
    fn from(epoch: Epoch) -> Self {
        Self(epoch)
    }
}

impl From<GnssTime> for Epoch {
    fn from(t: GnssTime) -> Self {
        t.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_in_unit_interval() {
        let t = GnssTime::from_gps_week_tow(2000, 12345.625);
        assert!(t.fraction() >= 0.0 && t.fraction() < 1.0);
    }

    #[test]
    fn tow_rollover_picks_nearest_week() {
        let reference = Epoch::from_time_of_week(2000, 0, TimeScale::GPST);
        // tow close to end of the *previous* week should resolve to week 1999.
        let tow_ms = ((SECONDS_PER_WEEK - 10.0) * 1000.0) as u32;
        let resolved = GnssTime::resolve_tow_ms(reference, tow_ms, TimeScale::GPST);
        let (week, _) = resolved.to_time_of_week();
        assert_eq!(week, 1999);
    }

    #[test]
    fn beidou_offset_is_14_seconds() {
        let t = GnssTime::from_gps_week_tow(2000, 100_000.0);
        let bdt = t.to_beidou();
        let gpst = t.to_gpst();
        assert!(((gpst - bdt).to_seconds() - 14.0).abs() < 1.0e-9);
    }

    #[test]
    fn glonass_roundtrip() {
        let t = GnssTime::from_gps_week_tow(2000, 100_000.0);
        let glonass = t.to_glonass();
        let back = GnssTime::from_glonass(glonass);
        assert!((back.to_gpst() - t.to_gpst()).abs() < Duration::from_microseconds(1.0));
    }
}
