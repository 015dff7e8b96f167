//! Per-epoch, per-satellite observation records: per-frequency arrays of
//! carrier phase, pseudorange, Doppler and SNR, with `0.0` meaning "absent"
//! and loss-of-lock carried as bit flags.

use bitflags::bitflags;

use crate::signal::SignalCode;
use crate::sv::SV;
use crate::time::GnssTime;

/// Number of "normal" frequency-index slots an [`ObservationRecord`] carries
/// before spilling into extended-observation slots.
pub const NFREQ: usize = 3;

/// Number of extended-observation slots for codes that spill over when
/// multiple tracked codes share a frequency index.
pub const NEXOBS: usize = 3;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    /// Loss-of-lock indicator bits: bit 0 flags a cycle slip, bit 1 flags
    /// half-cycle ambiguity.
    pub struct LliFlags: u8 {
        const OK_OR_UNKNOWN = 0x00;
        const CYCLE_SLIP = 0x01;
        const HALF_CYCLE_AMBIGUITY = 0x02;
    }
}

/// A single (satellite, frequency-index) slot's worth of measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalObservation {
    /// Carrier phase, in cycles. Zero means "absent".
    pub carrier_phase_cycles: f64,
    /// Pseudorange, in metres. Zero means "absent".
    pub pseudorange_m: f64,
    /// Doppler, in Hz. Zero means "absent".
    pub doppler_hz: f64,
    /// Carrier-to-noise ratio, in thousandths of dB·Hz.
    pub snr_mdbhz: u32,
    /// Loss-of-lock flags for this slot.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub lli: Option<LliFlags>,
    /// Tracking code assigned to this slot.
    pub code: Option<SignalCode>,
}

impl SignalObservation {
    pub fn is_phase_present(&self) -> bool {
        self.carrier_phase_cycles != 0.0
    }

    pub fn is_code_present(&self) -> bool {
        self.pseudorange_m != 0.0
    }
}

/// Full observation record for one satellite at one epoch: `NFREQ` base
/// slots plus `NEXOBS` extended slots for additional tracked codes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObservationRecord {
    pub satellite: SV,
    pub freq: [SignalObservation; NFREQ],
    pub extended: [SignalObservation; NEXOBS],
}

impl ObservationRecord {
    pub fn empty(satellite: SV) -> Self {
        Self {
            satellite,
            freq: [SignalObservation::default(); NFREQ],
            extended: [SignalObservation::default(); NEXOBS],
        }
    }

    /// Writes `obs` into frequency index `idx`. A code conflict at `idx` is
    /// arbitrated by [`crate::signal::resolve_priority`]: the
    /// higher-priority code keeps the primary slot, the other spills into
    /// the first free extended slot.
    pub fn insert(&mut self, idx: usize, obs: SignalObservation) {
        if idx < NFREQ {
            let slot = &mut self.freq[idx];
            if slot.code.is_none() || slot.code == obs.code {
                *slot = obs;
                return;
            }
            let (Some(occupant_code), Some(incoming_code)) = (slot.code, obs.code) else {
                return self.spill(obs);
            };
            let ranked = crate::signal::resolve_priority(
                &[occupant_code, incoming_code],
                crate::signal::DEFAULT_SIGNAL_PRIORITY,
            );
            if ranked[0] == incoming_code {
                let displaced = std::mem::replace(slot, obs);
                self.spill(displaced);
            } else {
                self.spill(obs);
            }
            return;
        }
        self.spill(obs);
    }

    fn spill(&mut self, obs: SignalObservation) {
        for slot in self.extended.iter_mut() {
            if slot.code.is_none() {
                *slot = obs;
                return;
            }
        }
        // no free slot: drop silently rather than overwrite unrelated data.
    }
}

/// One fully-assembled observation epoch: station id, time, and the
/// per-satellite records collected until `obsflag` clears.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObservationEpoch {
    pub station_id: u16,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub time: Option<GnssTime>,
    pub satellites: Vec<ObservationRecord>,
}

impl ObservationEpoch {
    pub fn new(station_id: u16, time: GnssTime) -> Self {
        Self {
            station_id,
            time: Some(time),
            satellites: Vec::new(),
        }
    }

    pub fn satellite_mut(&mut self, sv: SV) -> &mut ObservationRecord {
        if let Some(pos) = self.satellites.iter().position(|r| r.satellite == sv) {
            &mut self.satellites[pos]
        } else {
            self.satellites.push(ObservationRecord::empty(sv));
            self.satellites.last_mut().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv::Constellation;

    #[test]
    fn insert_spills_into_extended_slot_on_code_conflict() {
        let mut rec = ObservationRecord::empty(SV::new(Constellation::GPS, 1));
        let a = SignalObservation {
            pseudorange_m: 20_000_000.0,
            code: Some(SignalCode::GpsL1C),
            ..Default::default()
        };
        let b = SignalObservation {
            pseudorange_m: 20_000_001.0,
            code: Some(SignalCode::GpsL1W),
            ..Default::default()
        };
        rec.insert(0, a);
        rec.insert(0, b);
        assert_eq!(rec.freq[0].code, Some(SignalCode::GpsL1C));
        assert_eq!(rec.extended[0].code, Some(SignalCode::GpsL1W));
    }

    #[test]
    fn lli_bit_semantics() {
        let flags = LliFlags::CYCLE_SLIP | LliFlags::HALF_CYCLE_AMBIGUITY;
        assert!(flags.contains(LliFlags::CYCLE_SLIP));
        assert!(flags.contains(LliFlags::HALF_CYCLE_AMBIGUITY));
        assert_eq!(LliFlags::OK_OR_UNKNOWN.bits(), 0);
    }
}
