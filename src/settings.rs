// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Host-provided encoder configuration and its property schema.
//!
//! The settings deliberately exclude the frame dimensions and frame rate:
//! those are derived from the host's video output, not from user
//! configuration.

/// Specifies the encoder operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateControl {
    /// The encoder shall maintain a constant bitrate, in kbit/s.
    ConstantBitrate(u32),

    /// The encoder shall keep a codec specific quality parameter constant
    /// (QP for H.264) disregarding bitrate.
    ConstantQuality(u32),
}

impl RateControl {
    pub(crate) fn is_same_variant(left: &Self, right: &Self) -> bool {
        std::mem::discriminant(left) == std::mem::discriminant(right)
    }

    /// Target bitrate in kbit/s, if this mode has one.
    pub(crate) fn bitrate_target(&self) -> Option<u32> {
        match self {
            RateControl::ConstantBitrate(target) => Some(*target),
            RateControl::ConstantQuality(_) => None,
        }
    }
}

/// Parameters the host may set on an encoder session. Everything else is
/// derived from the video output at session creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub rate_control: RateControl,
    /// When set, `buffer_size` overrides the rate controller's buffering
    /// window instead of the target bitrate.
    pub use_buffer_size: bool,
    /// Rate control buffer size in kbit.
    pub buffer_size: u32,
    /// Keyframe interval in seconds; 0 leaves the choice to the engine.
    pub keyint_sec: u32,
    /// Free-form `key=value` options, space separated.
    pub options: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            rate_control: RateControl::ConstantBitrate(60000),
            use_buffer_size: false,
            buffer_size: 2500,
            keyint_sec: 0,
            options: String::new(),
        }
    }
}

/// One parsed `key=value` entry from [`EncoderSettings::options`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOption {
    pub name: String,
    pub value: String,
}

/// Option keys that are owned by the host pipeline and must not be smuggled
/// in through the free-form string.
const RESERVED_OPTIONS: &[&str] =
    &["fps", "force-cfr", "width", "height", "opencl", "preset", "profile", "tune"];

/// Splits a space separated `key=value` option string. Malformed or reserved
/// entries are dropped with a warning rather than failing the whole list.
pub fn parse_options(options: &str) -> Vec<EncoderOption> {
    let mut parsed = Vec::new();

    for entry in options.split_whitespace() {
        let Some((name, value)) = entry.split_once('=') else {
            log::warn!("Invalid option entry: {entry}");
            continue;
        };

        if name.is_empty() || value.is_empty() {
            log::warn!("Invalid option entry: {entry}");
            continue;
        }

        if RESERVED_OPTIONS.iter().any(|r| name.eq_ignore_ascii_case(r)) {
            log::warn!("Option {name} is controlled by the host, ignoring");
            continue;
        }

        parsed.push(EncoderOption { name: name.to_owned(), value: value.to_owned() });
    }

    parsed
}

/// Schema of one host-visible configuration field, used by hosts to build
/// their configuration UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    Int { name: &'static str, description: &'static str, min: i64, max: i64, step: i64 },
    Bool { name: &'static str, description: &'static str },
    Text { name: &'static str, description: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let settings = EncoderSettings::default();
        assert_eq!(settings.rate_control, RateControl::ConstantBitrate(60000));
        assert!(!settings.use_buffer_size);
        assert_eq!(settings.buffer_size, 2500);
        assert_eq!(settings.keyint_sec, 0);
        assert!(settings.options.is_empty());
    }

    #[test]
    fn parses_well_formed_options() {
        let parsed = parse_options("frame-skip=0 level=3.1");
        assert_eq!(
            parsed,
            vec![
                EncoderOption { name: "frame-skip".into(), value: "0".into() },
                EncoderOption { name: "level".into(), value: "3.1".into() },
            ]
        );
    }

    #[test]
    fn drops_malformed_entries() {
        assert!(parse_options("=x foo= bar baz=").is_empty());
        assert_eq!(parse_options("a=1 nonsense b=2").len(), 2);
    }

    #[test]
    fn drops_reserved_keys() {
        let parsed = parse_options("width=640 FPS=60 frame-skip=1");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "frame-skip");
    }

    #[test]
    fn rate_control_helpers() {
        let cbr = RateControl::ConstantBitrate(2500);
        let cqp = RateControl::ConstantQuality(23);
        assert!(RateControl::is_same_variant(&cbr, &RateControl::ConstantBitrate(1)));
        assert!(!RateControl::is_same_variant(&cbr, &cqp));
        assert_eq!(cbr.bitrate_target(), Some(2500));
        assert_eq!(cqp.bitrate_target(), None);
    }
}
