//! `gnss-core`: RTCM v3 wire-format codec and Precise Point Positioning (PPP)
//! engine for multi-constellation, multi-frequency GNSS.
//!
//! The crate is split into the two pipelines described by its design
//! document: a bit-exact RTCM v3 frame scanner / message codec (module
//! [`rtcm`]) and an Extended Kalman Filter PPP engine (module [`ppp`]),
//! sharing a common GNSS data model (time, satellite identity, signals,
//! observations, ephemerides, SSR corrections, station metadata).

#[cfg(test)]
mod tests;

pub mod bitbuf;
pub mod crc24q;
pub mod ephemeris;
pub mod observation;
pub mod ppp;
pub mod rtcm;
pub mod signal;
pub mod ssr;
pub mod station;
pub mod sv;
pub mod time;

/// Common re-exports for downstream users of the crate.
pub mod prelude {
    pub use crate::bitbuf::{BitReader, BitWriter};
    pub use crate::ephemeris::{Ephemeris, EphemerisError, GlonassEphemeris, SbasEphemeris};
    pub use crate::observation::{LliFlags, ObservationEpoch, ObservationRecord};
    pub use crate::ppp::{PppConfig, PppFilter, PppStatus};
    pub use crate::rtcm::{Decoder, DecoderOptions, DispatchOutcome, RtcmError};
    pub use crate::signal::SignalCode;
    pub use crate::ssr::SsrCorrection;
    pub use crate::station::StationMetadata;
    pub use crate::sv::{Constellation, SV};
    pub use crate::time::GnssTime;
}
