// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! OpenH264 engine backend.
//!
//! Wraps the bundled Cisco OpenH264 SVC encoder behind [`SvcEngine`]. The
//! library compiles the engine from source, so no system dependency is
//! required.

use anyhow::anyhow;
use openh264::encoder::Encoder;
use openh264::encoder::EncoderConfig;
use openh264::encoder::FrameType;
use openh264::encoder::RateControlMode;
use openh264::encoder::SpsPpsStrategy;
use openh264::encoder::UsageType;
use openh264::formats::YUVSource;
use openh264::OpenH264API;
use openh264::Timestamp;

use crate::backend::EncoderParams;
use crate::backend::EngineError;
use crate::backend::EngineFrameType;
use crate::backend::EngineLayer;
use crate::backend::EngineOutput;
use crate::backend::EngineResult;
use crate::backend::SvcEngine;
use crate::backend::SvcEngineFactory;
use crate::backend::UsageHint;
use crate::frame::PlanarFrame;
use crate::settings::RateControl;

/// I420 view over a [`PlanarFrame`] in the shape OpenH264 consumes. The
/// frame is validated by the adapter before it gets here.
struct PlanarSource<'a> {
    frame: &'a PlanarFrame<'a>,
}

impl YUVSource for PlanarSource<'_> {
    fn dimensions(&self) -> (usize, usize) {
        (self.frame.resolution.width as usize, self.frame.resolution.height as usize)
    }

    fn strides(&self) -> (usize, usize, usize) {
        let stride = |index| self.frame.plane(index).map(|p| p.stride).unwrap_or(0);
        (stride(0), stride(1), stride(2))
    }

    fn y(&self) -> &[u8] {
        self.frame.plane(0).map(|p| p.data).unwrap_or(&[])
    }

    fn u(&self) -> &[u8] {
        self.frame.plane(1).map(|p| p.data).unwrap_or(&[])
    }

    fn v(&self) -> &[u8] {
        self.frame.plane(2).map(|p| p.data).unwrap_or(&[])
    }
}

/// Opens [`OpenH264Engine`] instances.
#[derive(Copy, Clone, Debug, Default)]
pub struct OpenH264Factory;

impl SvcEngineFactory for OpenH264Factory {
    type Engine = OpenH264Engine;

    fn open(&self, params: &EncoderParams) -> EngineResult<OpenH264Engine> {
        OpenH264Engine::open(params)
    }
}

pub struct OpenH264Engine {
    encoder: Encoder,
}

impl OpenH264Engine {
    pub fn open(params: &EncoderParams) -> EngineResult<Self> {
        let usage = match params.usage {
            UsageHint::CameraRealTime => UsageType::CameraVideoRealTime,
            UsageHint::ScreenContentRealTime => UsageType::ScreenContentRealTime,
        };

        let mut config = EncoderConfig::new()
            .usage_type(usage)
            .max_frame_rate(params.framerate.as_f32())
            .sps_pps_strategy(SpsPpsStrategy::IncreasingId)
            .enable_skip_frame(params.enable_frame_skip);

        // The engine derives its own bitrate cap and buffering window from
        // the target; `max_bitrate` and `buffer_size` have no knob here.
        config = match params.rate_control {
            RateControl::ConstantBitrate(kbps) => config
                .rate_control_mode(RateControlMode::Bitrate)
                .set_bitrate_bps(kbps.saturating_mul(1000)),
            RateControl::ConstantQuality(_) => {
                config.rate_control_mode(RateControlMode::Quality)
            }
        };

        for option in &params.extra_options {
            log::debug!("option {}={} not consumed by the engine", option.name, option.value);
        }

        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|err| {
                EngineError::Other(anyhow!("failed to initialize OpenH264: {err}"))
            })?;

        log::debug!(
            "OpenH264 engine up: {}x{}, intra period {}",
            params.resolution.width,
            params.resolution.height,
            params.intra_period,
        );

        Ok(Self { encoder })
    }
}

impl SvcEngine for OpenH264Engine {
    fn startup_headers(&mut self) -> EngineResult<Vec<Vec<u8>>> {
        // OpenH264 emits SPS/PPS as a non-VCL layer with the first IDR, not
        // at initialization.
        Ok(Vec::new())
    }

    fn encode_picture(
        &mut self,
        frame: &PlanarFrame,
        timestamp_ms: u64,
    ) -> EngineResult<EngineOutput> {
        let source = PlanarSource { frame };
        let bitstream = self
            .encoder
            .encode_at(&source, Timestamp::from_millis(timestamp_ms))
            .map_err(|err| EngineError::Other(anyhow!("OpenH264 encode failed: {err}")))?;

        let frame_type = match bitstream.frame_type() {
            FrameType::IDR => EngineFrameType::Idr,
            FrameType::I => EngineFrameType::Intra,
            FrameType::P | FrameType::IPMixed => EngineFrameType::Inter,
            FrameType::Skip => EngineFrameType::Skip,
            _ => EngineFrameType::Invalid,
        };

        let mut layers = Vec::with_capacity(bitstream.num_layers());
        for layer_index in 0..bitstream.num_layers() {
            let Some(layer) = bitstream.layer(layer_index) else {
                continue;
            };
            let mut nals = Vec::with_capacity(layer.nal_count());
            for nal_index in 0..layer.nal_count() {
                if let Some(nal) = layer.nal_unit(nal_index) {
                    nals.push(nal.to_vec());
                }
            }
            layers.push(EngineLayer { is_video: layer.is_video(), nals });
        }

        Ok(EngineOutput { frame_type, layers })
    }
}
