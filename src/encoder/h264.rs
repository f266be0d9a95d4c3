// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! H.264 encoder adapter.
//!
//! Owns one engine instance, derives the engine parameter block from host
//! settings plus the host's video output, and turns each submitted frame
//! into at most one compressed packet. Non-VCL engine output (parameter
//! sets, SEI) is captured as side data instead of being returned in
//! packets.

use bytes::BytesMut;

use crate::backend::ComplexityHint;
use crate::backend::EncoderParams;
use crate::backend::EngineFrameType;
use crate::backend::SvcEngine;
use crate::backend::SvcEngineFactory;
use crate::backend::UsageHint;
use crate::encoder::CreateError;
use crate::encoder::EncodeError;
use crate::encoder::EncodeResult;
use crate::encoder::EncoderPlugin;
use crate::encoder::EncoderSession;
use crate::encoder::HeaderData;
use crate::encoder::Packet;
use crate::encoder::UpdateStatus;
use crate::frame::FrameError;
use crate::frame::PlanarFrame;
use crate::host::HostServices;
use crate::host::PerformanceToken;
use crate::host::ScaleInfo;
use crate::host::VideoInfo;
use crate::settings::parse_options;
use crate::settings::EncoderSettings;
use crate::settings::Property;
use crate::settings::RateControl;
use crate::VideoFormat;

/// Intra refresh distance used when the host leaves `keyint_sec` at 0.
const DEFAULT_INTRA_PERIOD: u32 = 320;

/// Engine bitrate cap relative to the target.
const MAX_BITRATE_PERCENT: u32 = 130;

const NAL_TYPE_SEI: u8 = 6;

/// NAL unit type of an Annex B framed NAL, or `None` for an empty buffer.
fn nal_unit_type(nal: &[u8]) -> Option<u8> {
    let body = nal
        .strip_prefix(&[0, 0, 0, 1][..])
        .or_else(|| nal.strip_prefix(&[0, 0, 1][..]))
        .unwrap_or(nal);
    body.first().map(|byte| byte & 0x1f)
}

/// Sorts non-VCL NALs into SEI and everything-else (parameter sets).
fn classify_non_vcl(nals: &[Vec<u8>], extra_data: &mut Vec<u8>, sei: &mut Vec<u8>) {
    for nal in nals {
        match nal_unit_type(nal) {
            Some(NAL_TYPE_SEI) => sei.extend_from_slice(nal),
            Some(_) => extra_data.extend_from_slice(nal),
            None => (),
        }
    }
}

/// Builds the engine parameter block. Dimensions and timing come from the
/// host's video output; settings never override them.
fn derive_params(
    settings: &EncoderSettings,
    info: &VideoInfo,
) -> Result<EncoderParams, CreateError> {
    if !info.resolution.is_codeable() {
        return Err(CreateError::UnsupportedResolution(info.resolution));
    }

    let fps = info.framerate.rounded();
    if fps == 0 {
        return Err(CreateError::BadSettings("video output reports no frame rate".into()));
    }

    let max_bitrate = match settings.rate_control {
        RateControl::ConstantBitrate(0) => {
            return Err(CreateError::BadSettings("bitrate must be positive".into()))
        }
        RateControl::ConstantBitrate(target) => {
            target.saturating_mul(MAX_BITRATE_PERCENT) / 100
        }
        RateControl::ConstantQuality(qp) if qp > 51 => {
            return Err(CreateError::BadSettings(format!(
                "quality parameter {qp} out of range"
            )))
        }
        // No bitrate target to cap.
        RateControl::ConstantQuality(_) => 0,
    };

    let intra_period = if settings.keyint_sec == 0 {
        DEFAULT_INTRA_PERIOD
    } else {
        settings.keyint_sec.saturating_mul(fps)
    };

    let mut enable_frame_skip = true;
    let mut extra_options = Vec::new();
    for option in parse_options(&settings.options) {
        match option.name.as_str() {
            "frame-skip" => match option.value.as_str() {
                "0" | "false" | "off" => enable_frame_skip = false,
                "1" | "true" | "on" => enable_frame_skip = true,
                other => log::warn!("frame-skip: unrecognized value {other:?}"),
            },
            _ => extra_options.push(option),
        }
    }

    Ok(EncoderParams {
        resolution: info.resolution,
        framerate: info.framerate,
        rate_control: settings.rate_control.clone(),
        max_bitrate,
        buffer_size: settings.use_buffer_size.then_some(settings.buffer_size),
        intra_period,
        enable_frame_skip,
        spatial_layers: 1,
        usage: UsageHint::ScreenContentRealTime,
        complexity: ComplexityHint::Low,
        extra_options,
    })
}

/// True when moving from `current` to `next` cannot be expressed without
/// tearing the engine down. Bitrate and buffer sizing stay adjustable;
/// structural parameters do not.
fn requires_recreation(current: &EncoderParams, next: &EncoderParams) -> bool {
    current.resolution != next.resolution
        || current.framerate != next.framerate
        || !RateControl::is_same_variant(&current.rate_control, &next.rate_control)
        || current.intra_period != next.intra_period
        || current.enable_frame_skip != next.enable_frame_skip
}

/// One H.264 compression session over an engine obtained from `F`.
///
/// Lifecycle: [`configure`] derives parameters without touching the engine,
/// [`open`] instantiates it, and `Drop` tears everything down. Most hosts
/// go through [`create`], which chains the first two.
///
/// [`configure`]: H264Adapter::configure
/// [`open`]: H264Adapter::open
/// [`create`]: H264Adapter::create
pub struct H264Adapter<F: SvcEngineFactory> {
    factory: F,
    engine: Option<F::Engine>,
    video_info: VideoInfo,
    params: EncoderParams,
    settings: EncoderSettings,
    headers: HeaderData,
    /// Count of frames accepted by the engine, also the base of the
    /// engine's timestamp unit.
    frame_index: u64,
    _performance: PerformanceToken,
}

impl<F: SvcEngineFactory> H264Adapter<F> {
    /// Derives the engine parameters and acquires the host's performance
    /// hint, but does not instantiate the engine yet. Updates at this stage
    /// may still change every parameter.
    pub fn configure(
        factory: F,
        settings: &EncoderSettings,
        host: &dyn HostServices,
    ) -> Result<Self, CreateError> {
        let video_info = host.video_info();
        let params = derive_params(settings, &video_info)?;

        log::info!(
            "h264 session: {}x{} @ {:.2} fps, rate control {:?}",
            params.resolution.width,
            params.resolution.height,
            params.framerate.as_f32(),
            params.rate_control,
        );
        if !settings.options.is_empty() {
            log::info!("custom settings: {}", settings.options);
        }

        let performance = host.request_high_performance("h264 encoding");

        Ok(Self {
            factory,
            engine: None,
            video_info,
            params,
            settings: settings.clone(),
            headers: HeaderData::default(),
            frame_index: 0,
            _performance: performance,
        })
    }

    /// Instantiates the engine with the current parameters and captures any
    /// header/SEI NALs it emits at startup. No-op if already open.
    pub fn open(&mut self) -> Result<(), CreateError> {
        if self.engine.is_some() {
            return Ok(());
        }

        let mut engine = self.factory.open(&self.params).map_err(|err| {
            log::warn!("engine creation failed: {err}");
            err
        })?;

        let startup_nals = engine.startup_headers().map_err(|err| {
            log::warn!("failed to read engine startup headers: {err}");
            err
        })?;

        let mut headers = HeaderData::default();
        classify_non_vcl(&startup_nals, &mut headers.extra_data, &mut headers.sei);
        self.headers = headers;
        self.engine = Some(engine);
        Ok(())
    }

    /// `configure` followed by `open`. On failure everything acquired so
    /// far, including the performance hint, is released before returning.
    pub fn create(
        factory: F,
        settings: &EncoderSettings,
        host: &dyn HostServices,
    ) -> Result<Self, CreateError> {
        let mut adapter = Self::configure(factory, settings, host)?;
        adapter.open()?;
        Ok(adapter)
    }

    pub fn is_open(&self) -> bool {
        self.engine.is_some()
    }

    /// Number of frames the engine has accepted so far, including skipped
    /// ones.
    pub fn frames_submitted(&self) -> u64 {
        self.frame_index
    }

    fn encode_frame(&mut self, frame: &PlanarFrame) -> EncodeResult<Option<Packet>> {
        if self.engine.is_none() {
            return Err(EncodeError::NotReady);
        }

        if frame.format != VideoFormat::I420 {
            return Err(FrameError::UnsupportedFormat(frame.format).into());
        }
        if frame.resolution != self.params.resolution {
            return Err(FrameError::ResolutionMismatch {
                expected: self.params.resolution,
                got: frame.resolution,
            }
            .into());
        }
        frame.validate()?;

        // Engine timestamp unit: frame index scaled by the frame rate
        // numerator. An engine peculiarity, not a codec contract.
        let timestamp_ms = self.frame_index * u64::from(self.params.framerate.num) / 1000;

        let output = match self.engine.as_mut() {
            Some(engine) => engine.encode_picture(frame, timestamp_ms).map_err(|err| {
                log::warn!("encode failed: {err}");
                EncodeError::Engine(err)
            })?,
            None => return Err(EncodeError::NotReady),
        };

        let index = self.frame_index;
        self.frame_index += 1;

        if output.frame_type == EngineFrameType::Skip {
            log::debug!("engine skipped frame {index}");
            return Ok(None);
        }

        let mut payload = BytesMut::new();
        let mut extra_data = Vec::new();
        let mut sei = Vec::new();
        for layer in &output.layers {
            if layer.is_video {
                for nal in &layer.nals {
                    payload.extend_from_slice(nal);
                }
            } else {
                classify_non_vcl(&layer.nals, &mut extra_data, &mut sei);
            }
        }

        // The engine re-emitted out-of-band data; replace the captured
        // copies.
        if !extra_data.is_empty() {
            self.headers.extra_data = extra_data;
        }
        if !sei.is_empty() {
            self.headers.sei = sei;
        }

        if payload.is_empty() {
            // Accepted but buffered; nothing to hand out this call.
            return Ok(None);
        }

        let pts = timestamp_ms as i64;
        Ok(Some(Packet {
            data: payload.freeze(),
            pts,
            dts: pts,
            keyframe: output.frame_type == EngineFrameType::Idr,
        }))
    }

    fn update_settings(&mut self, settings: &EncoderSettings) -> UpdateStatus {
        let params = match derive_params(settings, &self.video_info) {
            Ok(params) => params,
            Err(err) => {
                log::warn!("rejecting settings update: {err}");
                return UpdateStatus::Rejected;
            }
        };

        if self.engine.is_some() && requires_recreation(&self.params, &params) {
            log::warn!("settings update would require engine recreation, rejecting");
            return UpdateStatus::Rejected;
        }

        // Pending parameters only; the live engine keeps running unchanged.
        self.params = params;
        self.settings = settings.clone();
        UpdateStatus::Accepted
    }
}

impl<F> EncoderSession for H264Adapter<F>
where
    F: SvcEngineFactory + 'static,
    F::Engine: 'static,
{
    fn encode(&mut self, frame: &PlanarFrame) -> EncodeResult<Option<Packet>> {
        self.encode_frame(frame)
    }

    fn update(&mut self, settings: &EncoderSettings) -> UpdateStatus {
        self.update_settings(settings)
    }

    fn extra_data(&self) -> Option<&[u8]> {
        if self.engine.is_some() {
            Some(&self.headers.extra_data)
        } else {
            None
        }
    }

    fn sei_data(&self) -> Option<&[u8]> {
        if self.engine.is_some() {
            Some(&self.headers.sei)
        } else {
            None
        }
    }

    fn video_info(&self, info: &mut ScaleInfo) {
        if info.format != VideoFormat::I420 {
            info.format = VideoFormat::I420;
        }
    }
}

/// [`EncoderPlugin`] for the H.264 adapter, parameterized on the engine
/// factory so hosts and tests can swap the engine.
pub struct H264Plugin<F: SvcEngineFactory> {
    factory: F,
}

impl<F: SvcEngineFactory> H264Plugin<F> {
    pub fn with_factory(factory: F) -> Self {
        Self { factory }
    }
}

#[cfg(feature = "openh264")]
impl H264Plugin<crate::backend::openh264::OpenH264Factory> {
    /// Plugin backed by the bundled OpenH264 engine.
    pub fn openh264() -> Self {
        Self::with_factory(crate::backend::openh264::OpenH264Factory)
    }
}

impl<F> EncoderPlugin for H264Plugin<F>
where
    F: SvcEngineFactory + 'static,
    F::Engine: 'static,
{
    fn id(&self) -> &'static str {
        "ext_h264"
    }

    fn codec(&self) -> &'static str {
        "h264"
    }

    fn name(&self) -> &'static str {
        "h264"
    }

    fn defaults(&self) -> EncoderSettings {
        EncoderSettings::default()
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::Int {
                name: "bitrate",
                description: "Bitrate",
                min: 50,
                max: 10_000_000,
                step: 1,
            },
            Property::Text { name: "options", description: "Encoder options" },
        ]
    }

    fn create(
        &self,
        settings: &EncoderSettings,
        host: &dyn HostServices,
    ) -> Result<Box<dyn EncoderSession>, CreateError> {
        let adapter = H264Adapter::create(self.factory.clone(), settings, host)?;
        Ok(Box::new(adapter))
    }
}
