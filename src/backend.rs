// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Seam between the adapter and the external compression engine.
//!
//! An engine is a synchronous, stateful H.264/SVC compressor. The adapter
//! owns exactly one engine instance per session and calls it from a single
//! thread; all blocking happens inside the engine's encode call.

#[cfg(test)]
pub(crate) mod dummy;
#[cfg(feature = "openh264")]
pub mod openh264;

use thiserror::Error;

use crate::frame::PlanarFrame;
use crate::settings::EncoderOption;
use crate::settings::RateControl;
use crate::FrameRate;
use crate::Resolution;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to allocate the engine instance")]
    AllocationFailed,
    #[error("the engine rejected its initialization parameters")]
    InitializationFailed,
    #[error("the engine failed to encode the frame")]
    EncodeFailed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// How the engine should trade latency against compression efficiency.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UsageHint {
    CameraRealTime,
    ScreenContentRealTime,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ComplexityHint {
    Low,
    Medium,
    High,
}

/// Engine-facing parameter block, derived from [`EncoderSettings`] and the
/// host's video output info at session creation and on every update.
///
/// [`EncoderSettings`]: crate::settings::EncoderSettings
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderParams {
    pub resolution: Resolution,
    pub framerate: FrameRate,
    pub rate_control: RateControl,
    /// Bitrate cap in kbit/s, fixed at 130% of the target.
    pub max_bitrate: u32,
    /// Rate control buffering window in kbit, when the host asked for one.
    pub buffer_size: Option<u32>,
    /// Distance between forced intra refreshes, in frames.
    pub intra_period: u32,
    /// Lets the rate controller drop frames to hold the target bitrate.
    pub enable_frame_skip: bool,
    /// Always a single spatial layer; kept explicit because the engine's
    /// parameter block is layered.
    pub spatial_layers: u32,
    pub usage: UsageHint,
    pub complexity: ComplexityHint,
    /// Options the adapter did not recognize itself, passed through for the
    /// engine to interpret or ignore.
    pub extra_options: Vec<EncoderOption>,
}

/// Frame classification reported by the engine for one encode call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineFrameType {
    /// Instantaneous refresh frame; decodable from scratch.
    Idr,
    Intra,
    Inter,
    /// The rate controller dropped the frame; no output was produced.
    Skip,
    Invalid,
}

/// One output layer produced by an encode call.
#[derive(Clone, Debug)]
pub struct EngineLayer {
    /// True for video coding layer data (slices), false for out-of-band data
    /// such as parameter sets and SEI.
    pub is_video: bool,
    /// NAL units in Annex B framing, in decode order.
    pub nals: Vec<Vec<u8>>,
}

/// Everything the engine produced for a single submitted picture.
#[derive(Clone, Debug)]
pub struct EngineOutput {
    pub frame_type: EngineFrameType,
    pub layers: Vec<EngineLayer>,
}

/// A live engine instance. Dropping it releases the underlying handle, on
/// every exit path including failed session creation.
pub trait SvcEngine {
    /// NAL units the engine emitted during initialization, if any. OpenH264
    /// emits parameter sets with the first IDR instead, so an empty result
    /// is normal.
    fn startup_headers(&mut self) -> EngineResult<Vec<Vec<u8>>>;

    /// Synchronously compresses one picture. `timestamp_ms` is the engine's
    /// clock for rate control, derived from the session's frame index.
    fn encode_picture(
        &mut self,
        frame: &PlanarFrame,
        timestamp_ms: u64,
    ) -> EngineResult<EngineOutput>;
}

/// Opens engine instances for [`EncoderParams`]. A session clones whatever
/// state the factory carries, so factories stay cheap.
pub trait SvcEngineFactory: Clone {
    type Engine: SvcEngine;

    fn open(&self, params: &EncoderParams) -> EngineResult<Self::Engine>;
}
