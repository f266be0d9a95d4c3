// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Scripted in-memory engine for tests. Encodes nothing; replays whatever
//! outputs the test queued and keeps counters for lifecycle assertions.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use crate::backend::EncoderParams;
use crate::backend::EngineError;
use crate::backend::EngineFrameType;
use crate::backend::EngineLayer;
use crate::backend::EngineOutput;
use crate::backend::EngineResult;
use crate::backend::SvcEngine;
use crate::backend::SvcEngineFactory;
use crate::frame::PlanarFrame;

/// Wraps `payload` into a single Annex B NAL unit of the given type.
pub(crate) fn make_nal(nal_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut nal = vec![0, 0, 0, 1, 0x60 | (nal_type & 0x1f)];
    nal.extend_from_slice(payload);
    nal
}

pub(crate) fn vcl_layer(nal_type: u8, payload: &[u8]) -> EngineLayer {
    EngineLayer { is_video: true, nals: vec![make_nal(nal_type, payload)] }
}

pub(crate) fn non_vcl_layer(nals: Vec<Vec<u8>>) -> EngineLayer {
    EngineLayer { is_video: false, nals }
}

pub(crate) fn idr_output(payload: &[u8]) -> EngineOutput {
    EngineOutput { frame_type: EngineFrameType::Idr, layers: vec![vcl_layer(5, payload)] }
}

pub(crate) fn inter_output(payload: &[u8]) -> EngineOutput {
    EngineOutput { frame_type: EngineFrameType::Inter, layers: vec![vcl_layer(1, payload)] }
}

pub(crate) fn skip_output() -> EngineOutput {
    EngineOutput { frame_type: EngineFrameType::Skip, layers: Vec::new() }
}

#[derive(Default)]
pub(crate) struct DummyState {
    outputs: Mutex<VecDeque<EngineResult<EngineOutput>>>,
    startup_nals: Mutex<Vec<Vec<u8>>>,
    fail_open: AtomicBool,
    pub opened: AtomicUsize,
    pub dropped: AtomicUsize,
    pub encode_calls: AtomicUsize,
    pub timestamps: Mutex<Vec<u64>>,
    pub last_params: Mutex<Option<EncoderParams>>,
}

/// Factory handing out [`DummyEngine`]s that all share one [`DummyState`],
/// so the test keeps visibility after the session takes ownership.
#[derive(Clone, Default)]
pub(crate) struct DummyFactory {
    pub state: Arc<DummyState>,
}

impl DummyFactory {
    pub fn push_output(&self, output: EngineResult<EngineOutput>) {
        self.state.outputs.lock().unwrap().push_back(output);
    }

    pub fn set_startup_nals(&self, nals: Vec<Vec<u8>>) {
        *self.state.startup_nals.lock().unwrap() = nals;
    }

    pub fn set_fail_open(&self) {
        self.state.fail_open.store(true, Ordering::SeqCst);
    }
}

impl SvcEngineFactory for DummyFactory {
    type Engine = DummyEngine;

    fn open(&self, params: &EncoderParams) -> EngineResult<DummyEngine> {
        *self.state.last_params.lock().unwrap() = Some(params.clone());
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(EngineError::AllocationFailed);
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(DummyEngine { state: Arc::clone(&self.state) })
    }
}

pub(crate) struct DummyEngine {
    state: Arc<DummyState>,
}

impl SvcEngine for DummyEngine {
    fn startup_headers(&mut self) -> EngineResult<Vec<Vec<u8>>> {
        Ok(self.state.startup_nals.lock().unwrap().clone())
    }

    fn encode_picture(
        &mut self,
        _frame: &PlanarFrame,
        timestamp_ms: u64,
    ) -> EngineResult<EngineOutput> {
        self.state.encode_calls.fetch_add(1, Ordering::SeqCst);
        self.state.timestamps.lock().unwrap().push(timestamp_ms);
        match self.state.outputs.lock().unwrap().pop_front() {
            Some(output) => output,
            None => Ok(inter_output(b"dummy")),
        }
    }
}

impl Drop for DummyEngine {
    fn drop(&mut self) {
        self.state.dropped.fetch_add(1, Ordering::SeqCst);
    }
}
