// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Minimal encode loop: raw I420 frames in, Annex B H.264 out.

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::PathBuf;

use argh::FromArgs;
use h264_adapter::encoder::h264::H264Plugin;
use h264_adapter::encoder::EncoderSession;
use h264_adapter::encoder::Packet;
use h264_adapter::frame::PlanarFrame;
use h264_adapter::host::EncoderRegistry;
use h264_adapter::host::HostServices;
use h264_adapter::host::PerformanceToken;
use h264_adapter::host::VideoInfo;
use h264_adapter::settings::EncoderSettings;
use h264_adapter::settings::RateControl;
use h264_adapter::FrameRate;
use h264_adapter::Resolution;
use h264_adapter::VideoFormat;

/// Simple encoder
#[derive(Debug, FromArgs)]
struct Args {
    /// input file with raw I420 frames
    #[argh(positional)]
    input: PathBuf,

    /// input frames width
    #[argh(option)]
    width: u32,

    /// input frames height
    #[argh(option)]
    height: u32,

    /// input frames count
    #[argh(option)]
    count: usize,

    /// target bitrate in kbit/s
    #[argh(option, default = "2500")]
    bitrate: u32,

    /// framerate
    #[argh(option, default = "30")]
    framerate: u32,

    /// output file to write the bitstream to
    #[argh(option)]
    output: Option<PathBuf>,
}

struct CliHost {
    info: VideoInfo,
}

impl HostServices for CliHost {
    fn video_info(&self) -> VideoInfo {
        self.info
    }

    fn request_high_performance(&self, reason: &str) -> PerformanceToken {
        log::debug!("high performance requested: {reason}");
        PerformanceToken::noop()
    }
}

fn main() {
    env_logger::init();
    let args: Args = argh::from_env();

    let resolution = Resolution { width: args.width, height: args.height };
    let host = CliHost {
        info: VideoInfo {
            resolution,
            framerate: FrameRate { num: args.framerate, den: 1 },
            format: VideoFormat::I420,
        },
    };

    let mut registry = EncoderRegistry::new();
    registry.register(Box::new(H264Plugin::openh264())).expect("duplicate encoder id");

    let settings = EncoderSettings {
        rate_control: RateControl::ConstantBitrate(args.bitrate),
        ..Default::default()
    };
    let mut session =
        registry.create("ext_h264", &settings, &host).expect("unable to create encoder session");

    let mut input = File::open(&args.input).expect("unable to open input file");
    let mut output =
        args.output.map(|path| File::create(path).expect("unable to create output file"));

    let width = args.width as usize;
    let height = args.height as usize;
    let luma_size = width * height;
    let chroma_size = width.div_ceil(2) * height.div_ceil(2);
    let mut raw = vec![0u8; luma_size + 2 * chroma_size];

    let mut packets = 0usize;
    let mut keyframes = 0usize;
    let mut coded_bytes = 0usize;
    for index in 0..args.count {
        input.read_exact(&mut raw).expect("unable to read frame");
        let (y, chroma) = raw.split_at(luma_size);
        let (u, v) = chroma.split_at(chroma_size);
        let frame = PlanarFrame::i420(
            resolution,
            y,
            u,
            v,
            [width, width.div_ceil(2), width.div_ceil(2)],
            index as i64,
        );

        match session.encode(&frame).expect("encode failed") {
            Some(Packet { data, keyframe, .. }) => {
                packets += 1;
                coded_bytes += data.len();
                if keyframe {
                    keyframes += 1;
                }
                if let Some(output) = output.as_mut() {
                    output.write_all(&data).expect("unable to write output");
                }
            }
            None => log::debug!("no output for frame {index}"),
        }
    }

    println!("{packets} packets ({keyframes} keyframes), {coded_bytes} bytes");
}
