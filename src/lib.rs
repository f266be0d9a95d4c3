// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Adapter exposing an external H.264/SVC compression engine to a host media
//! pipeline behind a fixed create/encode/update lifecycle.
//!
//! The host interacts with the crate through the traits in [`encoder`]
//! (registered into a [`host::EncoderRegistry`]), while the compression
//! engine itself sits behind the [`backend::SvcEngine`] seam. The only
//! engine shipped here is OpenH264, gated behind the `openh264` feature.

pub mod backend;
pub mod encoder;
pub mod frame;
pub mod host;
pub mod settings;

use std::str::FromStr;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Whether both dimensions are non-zero and even. The SVC engine only
    /// accepts 4:2:0 input, which requires even dimensions.
    pub fn is_codeable(&self) -> bool {
        self.width > 0 && self.height > 0 && self.width % 2 == 0 && self.height % 2 == 0
    }
}

/// Frame rate as a rational number, as handed out by the host's video output.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn as_f32(&self) -> f32 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f32 / self.den as f32
    }

    /// Frames per second rounded to the nearest integer.
    pub fn rounded(&self) -> u32 {
        if self.den == 0 {
            return 0;
        }
        (self.num + self.den / 2) / self.den
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self { num: 30, den: 1 }
    }
}

/// Raw pixel layout of frames submitted for encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    I420,
    NV12,
    I444,
}

impl VideoFormat {
    pub fn plane_count(&self) -> usize {
        match self {
            VideoFormat::I420 | VideoFormat::I444 => 3,
            VideoFormat::NV12 => 2,
        }
    }
}

impl FromStr for VideoFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i420" | "I420" => Ok(VideoFormat::I420),
            "nv12" | "NV12" => Ok(VideoFormat::NV12),
            "i444" | "I444" => Ok(VideoFormat::I444),
            _ => Err("unrecognized video format. Valid values: i420, nv12, i444"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codeable_resolutions() {
        assert!(Resolution { width: 1280, height: 720 }.is_codeable());
        assert!(!Resolution { width: 1281, height: 720 }.is_codeable());
        assert!(!Resolution { width: 1280, height: 0 }.is_codeable());
    }

    #[test]
    fn frame_rate_rounding() {
        assert_eq!(FrameRate { num: 30000, den: 1001 }.rounded(), 30);
        assert_eq!(FrameRate { num: 24, den: 1 }.rounded(), 24);
        assert_eq!(FrameRate { num: 1, den: 0 }.rounded(), 0);
    }

    #[test]
    fn format_from_str() {
        assert_eq!(VideoFormat::from_str("i420"), Ok(VideoFormat::I420));
        assert_eq!(VideoFormat::from_str("NV12"), Ok(VideoFormat::NV12));
        assert!(VideoFormat::from_str("rgba").is_err());
    }
}
