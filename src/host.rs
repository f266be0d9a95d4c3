// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Host pipeline services and the encoder registry.
//!
//! The registry replaces a fixed function-table registration scheme:
//! encoder implementations are trait objects registered once at process
//! start, and the host creates sessions by id.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::encoder::CreateError;
use crate::encoder::EncoderPlugin;
use crate::encoder::EncoderSession;
use crate::settings::EncoderSettings;
use crate::FrameRate;
use crate::Resolution;
use crate::VideoFormat;

/// Properties of the host's video output that encoder sessions derive their
/// dimensions and timing from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VideoInfo {
    pub resolution: Resolution,
    pub framerate: FrameRate,
    pub format: VideoFormat,
}

/// Format negotiation record passed to [`EncoderSession::video_info`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScaleInfo {
    pub format: VideoFormat,
}

/// Keeps a host power-management hint alive for as long as the token exists.
/// Dropping the token releases the hint exactly once.
pub struct PerformanceToken {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl PerformanceToken {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self { release: Some(Box::new(release)) }
    }

    /// For hosts without a power-management layer.
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for PerformanceToken {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Services an encoder session needs from its host pipeline.
pub trait HostServices {
    /// The video output this session will encode. Settings never override
    /// these values.
    fn video_info(&self) -> VideoInfo;

    /// Registers a high performance hint with the host's power-management
    /// layer. The hint is held for the lifetime of the returned token.
    fn request_high_performance(&self, reason: &str) -> PerformanceToken;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("an encoder is already registered under id {0:?}")]
    DuplicateId(String),
}

/// Host-owned table of available encoder implementations.
#[derive(Default)]
pub struct EncoderRegistry {
    plugins: BTreeMap<String, Box<dyn EncoderPlugin>>,
}

impl EncoderRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register(&mut self, plugin: Box<dyn EncoderPlugin>) -> Result<(), RegistryError> {
        let id = plugin.id().to_owned();
        if self.plugins.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        log::info!("Registered encoder {id:?} (codec {})", plugin.codec());
        self.plugins.insert(id, plugin);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&dyn EncoderPlugin> {
        self.plugins.get(id).map(|p| p.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(|id| id.as_str())
    }

    /// Creates a session on the plugin registered under `id`.
    pub fn create(
        &self,
        id: &str,
        settings: &EncoderSettings,
        host: &dyn HostServices,
    ) -> Result<Box<dyn EncoderSession>, CreateError> {
        let plugin = self.get(id).ok_or_else(|| CreateError::UnknownEncoder(id.to_owned()))?;
        plugin.create(settings, host)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;

    /// Host stub handing out a fixed video output and counting performance
    /// token acquisitions and releases.
    pub(crate) struct TestHost {
        pub info: VideoInfo,
        pub tokens_taken: Arc<AtomicUsize>,
        pub tokens_released: Arc<AtomicUsize>,
    }

    impl TestHost {
        pub fn new(resolution: Resolution, framerate: FrameRate) -> Self {
            Self {
                info: VideoInfo { resolution, framerate, format: VideoFormat::I420 },
                tokens_taken: Arc::new(AtomicUsize::new(0)),
                tokens_released: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl HostServices for TestHost {
        fn video_info(&self) -> VideoInfo {
            self.info
        }

        fn request_high_performance(&self, _reason: &str) -> PerformanceToken {
            self.tokens_taken.fetch_add(1, Ordering::SeqCst);
            let released = Arc::clone(&self.tokens_released);
            PerformanceToken::new(move || {
                released.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[test]
    fn token_releases_once_on_drop() {
        let host = TestHost::new(Resolution { width: 2, height: 2 }, FrameRate::default());
        let token = host.request_high_performance("test");
        assert_eq!(host.tokens_taken.load(Ordering::SeqCst), 1);
        assert_eq!(host.tokens_released.load(Ordering::SeqCst), 0);
        drop(token);
        assert_eq!(host.tokens_released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_token_is_droppable() {
        drop(PerformanceToken::noop());
    }
}
