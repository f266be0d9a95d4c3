// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Host-facing encoder contract.
//!
//! A host obtains an [`EncoderSession`] from an [`EncoderPlugin`] (usually
//! through the [`EncoderRegistry`]) and then drives it serially: one
//! [`encode`] call per raw frame, each returning at most one compressed
//! packet. Teardown is `Drop`.
//!
//! [`EncoderRegistry`]: crate::host::EncoderRegistry
//! [`encode`]: EncoderSession::encode

pub mod h264;

use bytes::Bytes;
use thiserror::Error;

use crate::backend::EngineError;
use crate::frame::FrameError;
use crate::frame::PlanarFrame;
use crate::host::HostServices;
use crate::host::ScaleInfo;
use crate::settings::EncoderSettings;
use crate::settings::Property;

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("no encoder registered under id {0:?}")]
    UnknownEncoder(String),
    #[error("settings rejected: {0}")]
    BadSettings(String),
    #[error("video output is {0:?}, which the engine cannot encode")]
    UnsupportedResolution(crate::Resolution),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    /// The session was configured but its engine was never opened.
    #[error("encoder session has no engine instance")]
    NotReady,
    #[error(transparent)]
    InvalidFrame(#[from] FrameError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

pub type EncodeResult<T> = Result<T, EncodeError>;

/// Outcome of a settings update on a running session. `Rejected` means the
/// change would require tearing the session down and creating a new one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpdateStatus {
    Accepted,
    Rejected,
}

/// One compressed output unit. The payload is an owned buffer that stays
/// valid independently of later encode calls, so hosts may queue it for
/// asynchronous transmission.
#[derive(Clone, Debug)]
pub struct Packet {
    pub data: Bytes,
    pub pts: i64,
    pub dts: i64,
    /// True when the engine produced an instantaneous refresh frame.
    pub keyframe: bool,
}

/// Out-of-band codec initialization bytes and supplemental enhancement
/// information, captured after engine initialization and replaced whenever
/// the engine re-emits non-VCL data mid-stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderData {
    pub extra_data: Vec<u8>,
    pub sei: Vec<u8>,
}

/// Stateless descriptor and factory for one encoder implementation.
pub trait EncoderPlugin {
    /// Stable identifier the host registers and creates sessions by.
    fn id(&self) -> &'static str;

    /// Codec name of the produced bitstream, eg. "h264".
    fn codec(&self) -> &'static str;

    /// Human readable name for host UIs.
    fn name(&self) -> &'static str;

    fn defaults(&self) -> EncoderSettings;

    /// Schema of the settings fields for host configuration UIs.
    fn properties(&self) -> Vec<Property>;

    fn create(
        &self,
        settings: &EncoderSettings,
        host: &dyn HostServices,
    ) -> Result<Box<dyn EncoderSession>, CreateError>;
}

/// One running compression context. The host serializes all calls; the
/// session performs no internal synchronization and no I/O.
pub trait EncoderSession {
    /// Submits one raw frame. `Ok(None)` is a normal outcome: the engine
    /// buffered or skipped the frame without producing output this call.
    fn encode(&mut self, frame: &PlanarFrame) -> EncodeResult<Option<Packet>>;

    /// Applies new settings to the pending parameters. Once the engine is
    /// instantiated only parameters that do not require engine recreation
    /// are accepted; the running engine itself is never reconfigured.
    fn update(&mut self, settings: &EncoderSettings) -> UpdateStatus;

    /// The last captured codec initialization bytes, or `None` if the
    /// engine was never successfully created.
    fn extra_data(&self) -> Option<&[u8]>;

    /// The last captured SEI bytes, or `None` if the engine was never
    /// successfully created.
    fn sei_data(&self) -> Option<&[u8]>;

    /// Format negotiation: rewrites `info` to a format the session can
    /// consume if the proposed one is unsupported.
    fn video_info(&self, info: &mut ScaleInfo);
}

#[cfg(test)]
pub(crate) mod tests {
    /// Fills preallocated I420 planes with a deterministic gradient plus a
    /// moving dot, so consecutive frames differ and the engine has real
    /// work to do.
    pub fn fill_test_frame_i420(
        width: usize,
        height: usize,
        t: f32,
        y_plane: &mut [u8],
        u_plane: &mut [u8],
        v_plane: &mut [u8],
    ) {
        let (sin, cos) = f32::sin_cos(t);
        let dot_col = width as f32 * (1.1 + sin) / 2.2;
        let dot_row = height as f32 * (1.1 + 2.0 * sin * cos) / 2.2;
        let dot_size2 = ((width.min(height) as f32) * 0.05).powi(2);

        for row in 0..height {
            for col in 0..width {
                let dist =
                    (dot_col - col as f32).powi(2) + (dot_row - row as f32).powi(2);
                let y = if dist < dot_size2 {
                    0.0
                } else {
                    (row + col) as f32 / (width + height) as f32
                };
                y_plane[row * width + col] = (y * 255.0).clamp(0.0, 255.0) as u8;

                if row % 2 == 0 && col % 2 == 0 {
                    let chroma_pos = (row / 2) * width.div_ceil(2) + col / 2;
                    u_plane[chroma_pos] = ((row as f32 / height as f32) * sin.powi(2)
                        * 255.0)
                        .clamp(0.0, 255.0) as u8;
                    v_plane[chroma_pos] = ((col as f32 / width as f32) * cos.powi(2)
                        * 255.0)
                        .clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}
