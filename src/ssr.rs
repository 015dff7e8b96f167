//! State-Space Representation (SSR) corrections: per-satellite
//! orbit/clock/bias corrections broadcast on top of broadcast ephemeris,
//! decomposed into six independently updated sub-streams.

use crate::signal::SignalCode;
use crate::time::GnssTime;

/// The sixteen update intervals `udi` can encode, in seconds.
pub const UPDATE_INTERVALS_S: [u16; 16] = [
    1, 2, 5, 10, 15, 30, 60, 120, 240, 300, 600, 900, 1800, 3600, 7200, 10_800,
];

/// Decodes a 4-bit `udi` code into its update interval in seconds.
pub fn update_interval_s(udi_code: u8) -> Option<u16> {
    UPDATE_INTERVALS_S.get(udi_code as usize).copied()
}

/// One of the six independently-updated SSR sub-streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SsrSubStream {
    Orbit = 0,
    Clock = 1,
    HighRateClock = 2,
    Ura = 3,
    CodeBias = 4,
    PhaseBias = 5,
}

impl SsrSubStream {
    pub const ALL: [SsrSubStream; 6] = [
        SsrSubStream::Orbit,
        SsrSubStream::Clock,
        SsrSubStream::HighRateClock,
        SsrSubStream::Ura,
        SsrSubStream::CodeBias,
        SsrSubStream::PhaseBias,
    ];
}

/// Radial/along-track/cross-track orbit correction plus its rates (m, m/s).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrbitCorrection {
    pub radial_m: f64,
    pub along_track_m: f64,
    pub cross_track_m: f64,
    pub dot_radial_m_s: f64,
    pub dot_along_track_m_s: f64,
    pub dot_cross_track_m_s: f64,
    pub iode: u16,
}

/// Polynomial clock correction (m, m/s, m/s^2).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockCorrection {
    pub c0_m: f64,
    pub c1_m_s: f64,
    pub c2_m_s2: f64,
}

/// Single code or phase bias value, tagged by the signal it applies to.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalBias {
    pub signal: SignalCode,
    pub bias_m: f64,
}

/// Per-satellite SSR state, with the per-sub-stream bookkeeping (epoch,
/// `udi`, IOD-SSR, cumulative `update` flag).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SsrCorrection {
    pub epoch: [Option<GnssTime>; 6],
    pub udi_code: [u8; 6],
    pub iod_ssr: [u8; 6],
    pub update: [bool; 6],

    pub orbit: OrbitCorrection,
    pub clock: ClockCorrection,
    pub high_rate_clock_m: f64,
    pub ura_m: f64,
    pub code_biases: Vec<SignalBias>,
    pub phase_biases: Vec<SignalBias>,
}

impl SsrCorrection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `stream`'s bookkeeping fields and sets the cumulative
    /// `update` flag.
    pub fn touch(&mut self, stream: SsrSubStream, epoch: GnssTime, udi_code: u8, iod_ssr: u8) {
        let i = stream as usize;
        self.epoch[i] = Some(epoch);
        self.udi_code[i] = udi_code;
        self.iod_ssr[i] = iod_ssr;
        self.update[i] = true;
    }

    /// Total correction (orbit + clock, in metres along line of sight is
    /// left to the caller) combined per the standard: `c0 - dot(radial...)`
    /// is the PPP engine's job; this just exposes the decoded components.
    pub fn has_any_update(&self) -> bool {
        self.update.iter().any(|&u| u)
    }

    pub fn code_bias(&self, signal: SignalCode) -> Option<f64> {
        self.code_biases
            .iter()
            .find(|b| b.signal == signal)
            .map(|b| b.bias_m)
    }

    pub fn phase_bias(&self, signal: SignalCode) -> Option<f64> {
        self.phase_biases
            .iter()
            .find(|b| b.signal == signal)
            .map(|b| b.bias_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udi_table_has_sixteen_entries() {
        assert_eq!(UPDATE_INTERVALS_S.len(), 16);
        assert_eq!(update_interval_s(0), Some(1));
        assert_eq!(update_interval_s(15), Some(10_800));
        assert_eq!(update_interval_s(16), None);
    }

    #[test]
    fn touch_sets_cumulative_update_flag() {
        let mut ssr = SsrCorrection::new();
        assert!(!ssr.has_any_update());
        ssr.touch(
            SsrSubStream::Clock,
            GnssTime::from_gps_week_tow(2000, 0.0),
            5,
            3,
        );
        assert!(ssr.has_any_update());
        assert!(ssr.update[SsrSubStream::Clock as usize]);
        assert!(!ssr.update[SsrSubStream::Orbit as usize]);
    }

    #[test]
    fn bias_lookup_by_signal() {
        let mut ssr = SsrCorrection::new();
        ssr.code_biases.push(SignalBias {
            signal: SignalCode::GpsL1C,
            bias_m: 0.42,
        });
        assert_eq!(ssr.code_bias(SignalCode::GpsL1C), Some(0.42));
        assert_eq!(ssr.code_bias(SignalCode::GpsL2C), None);
    }
}
