//! Tracking-code identity and frequency/index resolution.
//!
//! The RTCM MSM cell mask and the legacy observation messages both need to
//! turn a small wire-level code identifier into: a human-readable RINEX-style
//! obs-code label, a carrier frequency (parametric on the GLONASS FCN), and a
//! frequency *index* the observation record can slot the value into. These
//! tables are large, constellation-specific, and intertwined with priority
//! logic; they are modeled here as `const` arrays built once rather than
//! per-call `match` chains scattered across the decoders.

use crate::sv::Constellation;

/// Speed of light, metres/second (IAU / CODATA value used throughout GNSS
/// processing).
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// GLONASS FDMA base frequencies and per-channel spacing (Hz).
const GLONASS_G1_BASE_HZ: f64 = 1.602_00e9;
const GLONASS_G1_DELTA_HZ: f64 = 0.562_50e6;
const GLONASS_G2_BASE_HZ: f64 = 1.246_00e9;
const GLONASS_G2_DELTA_HZ: f64 = 0.437_50e6;
const GLONASS_G3_HZ: f64 = 1.202_025e9;

/// Tracking code identity, covering the signal set in common use across
/// GPS/GLONASS/Galileo/QZSS/BeiDou/IRNSS/SBAS. Variants are named
/// `<System><Band><Attribute>` and each corresponds to a 2-character
/// RINEX/RTCM obs-code label via [`SignalCode::obs_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum SignalCode {
    GpsL1C,
    GpsL1P,
    GpsL1W,
    GpsL1S,
    GpsL1L,
    GpsL1X,
    GpsL2C,
    GpsL2D,
    GpsL2S,
    GpsL2L,
    GpsL2X,
    GpsL2P,
    GpsL2W,
    GpsL5I,
    GpsL5Q,
    GpsL5X,
    GloG1C,
    GloG1P,
    GloG2C,
    GloG2P,
    GloG3I,
    GloG3Q,
    GloG3X,
    GloG1aA,
    GloG1aB,
    GloG2aA,
    GloG2aB,
    GalE1B,
    GalE1C,
    GalE1X,
    GalE1A,
    GalE5aI,
    GalE5aQ,
    GalE5aX,
    GalE5bI,
    GalE5bQ,
    GalE5bX,
    GalE5abI,
    GalE5abQ,
    GalE5abX,
    GalE6B,
    GalE6C,
    GalE6X,
    GalE6A,
    BdsB1I,
    BdsB1Q,
    BdsB1X,
    BdsB1CD,
    BdsB1CP,
    BdsB1CX,
    BdsB2I,
    BdsB2Q,
    BdsB2X,
    BdsB2aD,
    BdsB2aP,
    BdsB2aX,
    BdsB2bI,
    BdsB2bQ,
    BdsB2bX,
    BdsB3I,
    BdsB3Q,
    BdsB3X,
    QzssL1C,
    QzssL1S,
    QzssL1X,
    QzssL2S,
    QzssL2L,
    QzssL2X,
    QzssL5I,
    QzssL5Q,
    QzssL5X,
    QzssL6S,
    QzssL6L,
    QzssL6X,
    IrnssL5A,
    IrnssL5B,
    IrnssL5C,
    IrnssSA,
    SbasL1C,
    SbasL5I,
    SbasL5Q,
}

/// Frequency-band index within an [`crate::observation::ObservationRecord`].
/// `Extended(n)` designates spillover "extended observation" slots for
/// additional codes tracked on a frequency index already occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FreqIndex {
    Base(u8),
    Extended(u8),
}

impl SignalCode {
    /// 2-character RINEX/RTCM observation-code label, e.g. `"1C"`, `"5Q"`.
    pub fn obs_code(&self) -> &'static str {
        use SignalCode::*;
        match self {
            GpsL1C | GloG1C | GalE1C | BdsB1CP | QzssL1C | SbasL1C => "1C",
            GpsL1P | GloG1P => "1P",
            GpsL1W => "1W",
            GpsL1S | QzssL1S => "1S",
            GpsL1L => "1L",
            GpsL1X | GalE1X | BdsB1CX | QzssL1X => "1X",
            GalE1B => "1B",
            GalE1A | GalE6A => "1A",
            GpsL2C => "2C",
            GpsL2D => "2D",
            GpsL2S | QzssL2S => "2S",
            GpsL2L | QzssL2L => "2L",
            GpsL2X | QzssL2X => "2X",
            GpsL2P => "2P",
            GpsL2W => "2W",
            GloG2C => "2C",
            GloG2P => "2P",
            GpsL5I | QzssL5I | IrnssL5A => "5I",
            GpsL5Q | QzssL5Q | IrnssL5B => "5Q",
            GpsL5X | QzssL5X | IrnssL5C => "5X",
            GloG3I => "3I",
            GloG3Q => "3Q",
            GloG3X => "3X",
            GloG1aA => "4A",
            GloG1aB => "4B",
            GloG2aA => "6A",
            GloG2aB => "6B",
            GalE5aI => "5I",
            GalE5aQ => "5Q",
            GalE5aX => "5X",
            GalE5bI => "7I",
            GalE5bQ => "7Q",
            GalE5bX => "7X",
            GalE5abI => "8I",
            GalE5abQ => "8Q",
            GalE5abX => "8X",
            GalE6B | QzssL6S => "6B",
            GalE6C => "6C",
            GalE6X | QzssL6X => "6X",
            QzssL6L => "6L",
            BdsB1I => "2I",
            BdsB1Q => "2Q",
            BdsB1X => "2X",
            BdsB1CD => "1D",
            BdsB2I => "7I",
            BdsB2Q => "7Q",
            BdsB2X => "7X",
            BdsB2aD => "5D",
            BdsB2aP => "5P",
            BdsB2aX => "5X",
            BdsB2bI => "7D",
            BdsB2bQ => "7P",
            BdsB2bX => "7Z",
            BdsB3I => "6I",
            BdsB3Q => "6Q",
            BdsB3X => "6X",
            IrnssSA => "9A",
            SbasL5I => "5I",
            SbasL5Q => "5Q",
        }
    }

    /// Constellation this code belongs to.
    pub fn constellation(&self) -> Constellation {
        use SignalCode::*;
        match self {
            GpsL1C | GpsL1P | GpsL1W | GpsL1S | GpsL1L | GpsL1X | GpsL2C | GpsL2D | GpsL2S
            | GpsL2L | GpsL2X | GpsL2P | GpsL2W | GpsL5I | GpsL5Q | GpsL5X => Constellation::GPS,
            GloG1C | GloG1P | GloG2C | GloG2P | GloG3I | GloG3Q | GloG3X | GloG1aA | GloG1aB
            | GloG2aA | GloG2aB => Constellation::Glonass,
            GalE1B | GalE1C | GalE1X | GalE1A | GalE5aI | GalE5aQ | GalE5aX | GalE5bI | GalE5bQ
            | GalE5bX | GalE5abI | GalE5abQ | GalE5abX | GalE6B | GalE6C | GalE6X | GalE6A => {
                Constellation::Galileo
            },
            BdsB1I | BdsB1Q | BdsB1X | BdsB1CD | BdsB1CP | BdsB1CX | BdsB2I | BdsB2Q | BdsB2X
            | BdsB2aD | BdsB2aP | BdsB2aX | BdsB2bI | BdsB2bQ | BdsB2bX | BdsB3I | BdsB3Q
            | BdsB3X => Constellation::BeiDou,
            QzssL1C | QzssL1S | QzssL1X | QzssL2S | QzssL2L | QzssL2X | QzssL5I | QzssL5Q
            | QzssL5X | QzssL6S | QzssL6L | QzssL6X => Constellation::QZSS,
            IrnssL5A | IrnssL5B | IrnssL5C | IrnssSA => Constellation::IRNSS,
            SbasL1C | SbasL5I | SbasL5Q => Constellation::SBAS,
        }
    }

    /// Frequency index `0..NFREQ` this code nominally occupies (before
    /// priority arbitration / extended-observation spillover is applied).
    pub fn nominal_freq_index(&self) -> u8 {
        use SignalCode::*;
        match self {
            GpsL1C | GpsL1P | GpsL1W | GpsL1S | GpsL1L | GpsL1X | GloG1C | GloG1P | GalE1B
            | GalE1C | GalE1X | GalE1A | BdsB1I | BdsB1Q | BdsB1X | BdsB1CD | BdsB1CP
            | BdsB1CX | QzssL1C | QzssL1S | QzssL1X | SbasL1C => 0,
            GpsL2C | GpsL2D | GpsL2S | GpsL2L | GpsL2X | GpsL2P | GpsL2W | GloG2C | GloG2P
            | QzssL2S | QzssL2L | QzssL2X => 1,
            GpsL5I | GpsL5Q | GpsL5X | GalE5aI | GalE5aQ | GalE5aX | BdsB2aD | BdsB2aP
            | BdsB2aX | QzssL5I | QzssL5Q | QzssL5X | IrnssL5A | IrnssL5B | IrnssL5C
            | SbasL5I | SbasL5Q => 2,
            GalE5bI | GalE5bQ | GalE5bX | BdsB2I | BdsB2Q | BdsB2X | BdsB2bI | BdsB2bQ
            | BdsB2bX => 3,
            GalE5abI | GalE5abQ | GalE5abX => 4,
            GalE6B | GalE6C | GalE6X | GalE6A | BdsB3I | BdsB3Q | BdsB3X | QzssL6S | QzssL6L
            | QzssL6X | GloG2aA | GloG2aB => 5,
            GloG3I | GloG3Q | GloG3X | GloG1aA | GloG1aB => 6,
            IrnssSA => 7,
        }
    }

    /// Nominal carrier frequency in Hz. For GLONASS FDMA signals, `fcn` is
    /// the satellite's frequency-channel number (−7..=6); ignored otherwise.
    pub fn carrier_frequency_hz(&self, fcn: i8) -> f64 {
        use SignalCode::*;
        match self {
            GpsL1C | GpsL1P | GpsL1W | GpsL1S | GpsL1L | GpsL1X | GalE1B | GalE1C | GalE1X
            | GalE1A => 1.575_42e9,
            GpsL2C | GpsL2D | GpsL2S | GpsL2L | GpsL2X | GpsL2P | GpsL2W => 1.227_60e9,
            GpsL5I | GpsL5Q | GpsL5X | GalE5aI | GalE5aQ | GalE5aX => 1.176_45e9,
            GalE5bI | GalE5bQ | GalE5bX => 1.207_14e9,
            GalE5abI | GalE5abQ | GalE5abX => 1.191_795e9,
            GalE6B | GalE6C | GalE6X | GalE6A => 1.278_75e9,
            GloG1C | GloG1P => GLONASS_G1_BASE_HZ + fcn as f64 * GLONASS_G1_DELTA_HZ,
            GloG2C | GloG2P => GLONASS_G2_BASE_HZ + fcn as f64 * GLONASS_G2_DELTA_HZ,
            GloG3I | GloG3Q | GloG3X => GLONASS_G3_HZ,
            GloG1aA | GloG1aB => 1.600_995e9,
            GloG2aA | GloG2aB => 1.248_060e9,
            BdsB1I | BdsB1Q | BdsB1X => 1.561_098e9,
            BdsB1CD | BdsB1CP | BdsB1CX => 1.575_42e9,
            BdsB2I | BdsB2Q | BdsB2X => 1.207_14e9,
            BdsB2aD | BdsB2aP | BdsB2aX => 1.176_45e9,
            BdsB2bI | BdsB2bQ | BdsB2bX => 1.207_14e9,
            BdsB3I | BdsB3Q | BdsB3X => 1.268_52e9,
            QzssL1C | QzssL1S | QzssL1X => 1.575_42e9,
            QzssL2S | QzssL2L | QzssL2X => 1.227_60e9,
            QzssL5I | QzssL5Q | QzssL5X => 1.176_45e9,
            QzssL6S | QzssL6L | QzssL6X => 1.278_75e9,
            IrnssL5A | IrnssL5B | IrnssL5C => 1.176_45e9,
            IrnssSA => 2.492_028e9,
            SbasL1C => 1.575_42e9,
            SbasL5I | SbasL5Q => 1.176_45e9,
        }
    }

    /// Wavelength in metres, derived from [`Self::carrier_frequency_hz`].
    pub fn wavelength_m(&self, fcn: i8) -> f64 {
        SPEED_OF_LIGHT_M_S / self.carrier_frequency_hz(fcn)
    }
}

/// RTCM MSM signal-id (5-bit DF380/DF381/...) table entries for a given
/// constellation: wire id → obs-code label. Incomplete ids decode to `None`
/// and the cell is skipped.
pub fn msm_signal_id_to_code(constellation: Constellation, id: u8) -> Option<SignalCode> {
    use SignalCode::*;
    match constellation {
        Constellation::GPS => Some(match id {
            2 => GpsL1C,
            3 => GpsL1P,
            4 => GpsL1W,
            8 => GpsL2C,
            9 => GpsL2P,
            10 => GpsL2W,
            15 => GpsL2S,
            16 => GpsL2L,
            17 => GpsL2X,
            22 => GpsL5I,
            23 => GpsL5Q,
            24 => GpsL5X,
            30 => GpsL1L,
            31 => GpsL1X,
            _ => return None,
        }),
        Constellation::Glonass => Some(match id {
            2 => GloG1C,
            3 => GloG1P,
            8 => GloG2C,
            9 => GloG2P,
            _ => return None,
        }),
        Constellation::Galileo => Some(match id {
            2 => GalE1C,
            3 => GalE1B,
            4 => GalE1X,
            5 => GalE1A,
            9 => GalE6B,
            10 => GalE6C,
            11 => GalE6X,
            14 => GalE5bI,
            15 => GalE5bQ,
            16 => GalE5bX,
            18 => GalE5abI,
            19 => GalE5abQ,
            20 => GalE5abX,
            22 => GalE5aI,
            23 => GalE5aQ,
            24 => GalE5aX,
            _ => return None,
        }),
        Constellation::SBAS => Some(match id {
            2 => SbasL1C,
            22 => SbasL5I,
            23 => SbasL5Q,
            _ => return None,
        }),
        Constellation::QZSS => Some(match id {
            2 => QzssL1C,
            9 => QzssL6S,
            10 => QzssL6L,
            11 => QzssL6X,
            15 => QzssL2S,
            16 => QzssL2L,
            17 => QzssL2X,
            22 => QzssL5I,
            23 => QzssL5Q,
            24 => QzssL5X,
            30 => QzssL1S,
            31 => QzssL1X,
            _ => return None,
        }),
        Constellation::BeiDou => Some(match id {
            2 => BdsB1I,
            3 => BdsB1Q,
            4 => BdsB1X,
            8 => BdsB3I,
            9 => BdsB3Q,
            10 => BdsB3X,
            14 => BdsB2I,
            15 => BdsB2Q,
            16 => BdsB2X,
            22 => BdsB2aD,
            23 => BdsB2aP,
            24 => BdsB2aX,
            25 => BdsB1CD,
            26 => BdsB1CP,
            27 => BdsB1CX,
            28 => BdsB2bI,
            29 => BdsB2bQ,
            30 => BdsB2bX,
            _ => return None,
        }),
        Constellation::IRNSS => Some(match id {
            22 => IrnssL5A,
            23 => IrnssL5B,
            24 => IrnssL5C,
            _ => return None,
        }),
        _ => None,
    }
}

/// Resolves several codes competing for the same frequency index down to
/// one primary code plus a priority-ordered spillover list for "extended
/// observation" slots. `priority` ranks codes lowest-index-first.
pub fn resolve_priority(codes: &[SignalCode], priority: &[SignalCode]) -> Vec<SignalCode> {
    let mut ranked: Vec<SignalCode> = codes.to_vec();
    ranked.sort_by_key(|c| priority.iter().position(|p| p == c).unwrap_or(usize::MAX));
    ranked
}

/// Default tracking-code priority, highest-priority first: civilian
/// unencrypted codes before encrypted/derived ones, pilot (Q/C) channels
/// before data+pilot combined (X) channels. Used to arbitrate which code
/// occupies a frequency index's primary slot when a receiver reports more
/// than one code on that index.
pub const DEFAULT_SIGNAL_PRIORITY: &[SignalCode] = &[
    SignalCode::GpsL1C, SignalCode::GpsL1P, SignalCode::GpsL1W, SignalCode::GpsL1S,
    SignalCode::GpsL1L, SignalCode::GpsL1X,
    SignalCode::GpsL2C, SignalCode::GpsL2S, SignalCode::GpsL2L, SignalCode::GpsL2X,
    SignalCode::GpsL2D, SignalCode::GpsL2P, SignalCode::GpsL2W,
    SignalCode::GpsL5Q, SignalCode::GpsL5I, SignalCode::GpsL5X,
    SignalCode::GloG1C, SignalCode::GloG1P, SignalCode::GloG2C, SignalCode::GloG2P,
    SignalCode::GloG3Q, SignalCode::GloG3I, SignalCode::GloG3X,
    SignalCode::GloG1aA, SignalCode::GloG1aB, SignalCode::GloG2aA, SignalCode::GloG2aB,
    SignalCode::GalE1C, SignalCode::GalE1B, SignalCode::GalE1X, SignalCode::GalE1A,
    SignalCode::GalE5aQ, SignalCode::GalE5aI, SignalCode::GalE5aX,
    SignalCode::GalE5bQ, SignalCode::GalE5bI, SignalCode::GalE5bX,
    SignalCode::GalE5abQ, SignalCode::GalE5abI, SignalCode::GalE5abX,
    SignalCode::GalE6C, SignalCode::GalE6B, SignalCode::GalE6X, SignalCode::GalE6A,
    SignalCode::BdsB1I, SignalCode::BdsB1Q, SignalCode::BdsB1X,
    SignalCode::BdsB1CP, SignalCode::BdsB1CD, SignalCode::BdsB1CX,
    SignalCode::BdsB2I, SignalCode::BdsB2Q, SignalCode::BdsB2X,
    SignalCode::BdsB2aP, SignalCode::BdsB2aD, SignalCode::BdsB2aX,
    SignalCode::BdsB2bQ, SignalCode::BdsB2bI, SignalCode::BdsB2bX,
    SignalCode::BdsB3Q, SignalCode::BdsB3I, SignalCode::BdsB3X,
    SignalCode::QzssL1C, SignalCode::QzssL1S, SignalCode::QzssL1X,
    SignalCode::QzssL2L, SignalCode::QzssL2S, SignalCode::QzssL2X,
    SignalCode::QzssL5Q, SignalCode::QzssL5I, SignalCode::QzssL5X,
    SignalCode::QzssL6L, SignalCode::QzssL6S, SignalCode::QzssL6X,
    SignalCode::IrnssL5A, SignalCode::IrnssL5B, SignalCode::IrnssL5C, SignalCode::IrnssSA,
    SignalCode::SbasL1C, SignalCode::SbasL5Q, SignalCode::SbasL5I,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msm_signal_table_roundtrips_known_ids() {
        assert_eq!(
            msm_signal_id_to_code(Constellation::GPS, 2),
            Some(SignalCode::GpsL1C)
        );
        assert_eq!(msm_signal_id_to_code(Constellation::GPS, 0), None);
    }

    #[test]
    fn glonass_fdma_frequency_is_parametric_on_fcn() {
        let f0 = SignalCode::GloG1C.carrier_frequency_hz(0);
        let f1 = SignalCode::GloG1C.carrier_frequency_hz(1);
        assert!((f1 - f0 - GLONASS_G1_DELTA_HZ).abs() < 1.0e-6);
    }

    #[test]
    fn priority_resolution_orders_by_table() {
        let priority = [SignalCode::GpsL1C, SignalCode::GpsL1W, SignalCode::GpsL1P];
        let codes = vec![SignalCode::GpsL1P, SignalCode::GpsL1C];
        let resolved = resolve_priority(&codes, &priority);
        assert_eq!(resolved[0], SignalCode::GpsL1C);
    }

    #[test]
    fn default_priority_prefers_civilian_over_encrypted_gps_l1() {
        let codes = vec![SignalCode::GpsL1W, SignalCode::GpsL1C];
        let resolved = resolve_priority(&codes, DEFAULT_SIGNAL_PRIORITY);
        assert_eq!(resolved[0], SignalCode::GpsL1C);
    }
}
