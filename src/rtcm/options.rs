//! Options-string grammar: space-separated tokens shared by the RTCM
//! decoder and the PPP engine.

/// Parsed decoder/filter options, built once from the raw options string
/// rather than re-parsed per call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecoderOptions {
    /// `-STA=<id>`: override the latched station ID instead of rejecting a
    /// mismatch.
    pub station_override: Option<u16>,
    /// `-EPHALL`: force ephemeris replacement unconditionally.
    pub ephall: bool,
    /// `-GALINAV` / `-GALFNAV`: restrict Galileo ephemeris selection.
    pub gal_inav_only: bool,
    pub gal_fnav_only: bool,
    /// `-RT_INP`: real-time input timing mode, consumed by callers.
    pub realtime_input: bool,
    /// `-INVPRR`: invert pseudorange-rate (Doppler) sign convention.
    pub invert_prr: bool,
    /// `-GAP_RESION=<int>`: ionosphere-outage reset threshold, epochs.
    pub gap_resion: Option<u32>,
}

impl DecoderOptions {
    pub fn parse(raw: &str) -> Self {
        let mut opts = Self::default();
        for token in raw.split_whitespace() {
            if let Some(v) = token.strip_prefix("-STA=") {
                opts.station_override = v.parse().ok();
            } else if token == "-EPHALL" {
                opts.ephall = true;
            } else if token == "-GALINAV" {
                opts.gal_inav_only = true;
            } else if token == "-GALFNAV" {
                opts.gal_fnav_only = true;
            } else if token == "-RT_INP" {
                opts.realtime_input = true;
            } else if token == "-INVPRR" {
                opts.invert_prr = true;
            } else if let Some(v) = token.strip_prefix("-GAP_RESION=") {
                opts.gap_resion = v.parse().ok();
            }
        }
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_known_tokens() {
        let opts = DecoderOptions::parse("-STA=1234 -EPHALL -GAP_RESION=120");
        assert_eq!(opts.station_override, Some(1234));
        assert!(opts.ephall);
        assert_eq!(opts.gap_resion, Some(120));
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let opts = DecoderOptions::parse("-BOGUS=7 -EPHALL");
        assert!(opts.ephall);
    }
}
