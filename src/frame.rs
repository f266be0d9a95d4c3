// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Raw frame representation lent by the host to the encoder for the duration
//! of one encode call. The planes stay host-owned; the adapter only reads
//! them and never copies more than it has to.

use thiserror::Error;

use crate::Resolution;
use crate::VideoFormat;

/// Upper bound on the number of planes a host may hand over.
pub const MAX_PLANES: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("expected {expected} planes for {format:?}, got {got}")]
    PlaneCount { format: VideoFormat, expected: usize, got: usize },
    #[error("plane {plane} stride {stride} is smaller than the row width {width}")]
    StrideTooSmall { plane: usize, stride: usize, width: usize },
    #[error("plane {plane} holds {len} bytes, needs at least {needed}")]
    PlaneTooSmall { plane: usize, len: usize, needed: usize },
    #[error("frame is {got:?} but the session was created for {expected:?}")]
    ResolutionMismatch { expected: Resolution, got: Resolution },
    #[error("unsupported input format {0:?}")]
    UnsupportedFormat(VideoFormat),
}

/// One borrowed image plane.
#[derive(Copy, Clone, Debug)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Distance in bytes between the starts of two consecutive rows.
    pub stride: usize,
}

/// A raw planar frame. Valid only for the duration of the encode call it is
/// passed to; the adapter does not hold on to the plane references.
pub struct PlanarFrame<'a> {
    pub format: VideoFormat,
    pub resolution: Resolution,
    pub planes: [Option<Plane<'a>>; MAX_PLANES],
    /// Presentation timestamp as assigned by the host.
    pub pts: i64,
}

impl<'a> PlanarFrame<'a> {
    /// Builds an I420 frame from three contiguous planes.
    pub fn i420(
        resolution: Resolution,
        y: &'a [u8],
        u: &'a [u8],
        v: &'a [u8],
        strides: [usize; 3],
        pts: i64,
    ) -> Self {
        Self {
            format: VideoFormat::I420,
            resolution,
            planes: [
                Some(Plane { data: y, stride: strides[0] }),
                Some(Plane { data: u, stride: strides[1] }),
                Some(Plane { data: v, stride: strides[2] }),
                None,
            ],
            pts,
        }
    }

    pub fn plane(&self, index: usize) -> Option<&Plane<'a>> {
        self.planes.get(index).and_then(|p| p.as_ref())
    }

    /// Checks that the plane set is internally consistent: the right number
    /// of planes for the format, each large enough for its sub-sampled
    /// dimensions. Performs no side effects.
    pub fn validate(&self) -> Result<(), FrameError> {
        let expected = self.format.plane_count();
        let got = self.planes.iter().filter(|p| p.is_some()).count();
        if got != expected {
            return Err(FrameError::PlaneCount { format: self.format, expected, got });
        }

        for index in 0..expected {
            let plane = match self.plane(index) {
                Some(plane) => plane,
                // Plane count matched but a hole sits before the end.
                None => {
                    return Err(FrameError::PlaneCount { format: self.format, expected, got })
                }
            };

            let (width, rows) = plane_dimensions(self.format, index, self.resolution);
            if plane.stride < width {
                return Err(FrameError::StrideTooSmall {
                    plane: index,
                    stride: plane.stride,
                    width,
                });
            }

            let needed = if rows == 0 { 0 } else { plane.stride * (rows - 1) + width };
            if plane.data.len() < needed {
                return Err(FrameError::PlaneTooSmall {
                    plane: index,
                    len: plane.data.len(),
                    needed,
                });
            }
        }

        Ok(())
    }
}

/// Returns the row width in bytes and the row count of plane `index`.
pub fn plane_dimensions(
    format: VideoFormat,
    index: usize,
    resolution: Resolution,
) -> (usize, usize) {
    let width = resolution.width as usize;
    let height = resolution.height as usize;
    // Chroma planes of 4:2:0 formats are aligned up to 2.
    let half_width = width.div_ceil(2);
    let half_height = height.div_ceil(2);

    match (format, index) {
        (_, 0) => (width, height),
        (VideoFormat::I420, _) => (half_width, half_height),
        // Interleaved UV, one full-width row per two luma rows.
        (VideoFormat::NV12, _) => (half_width * 2, half_height),
        (VideoFormat::I444, _) => (width, height),
    }
}
