//! One-time bootstrap of the native Opus library.
//!
//! Every guild's [`AudioManager`] consults [`ensure_initialised`] before
//! joining a channel. The first caller locates and loads libopus for the
//! host platform; everyone else, including callers racing the first, sees
//! the same cached answer. A failed load disables audio until the process
//! restarts, while the rest of the library remains usable.
//!
//! [`AudioManager`]: crate::AudioManager

mod error;
mod loader;
mod platform;

pub use self::{
    error::CodecError,
    loader::{LoadedCodec, NativeLoader},
    platform::Platform,
};

#[cfg(not(feature = "natives"))]
pub use self::loader::DisabledLoader;
#[cfg(feature = "natives")]
pub use self::loader::ExtractingLoader;

use crate::constants::OPUS_LIBRARY_NAME;
use derivative::Derivative;
use once_cell::sync::{Lazy, OnceCell};
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info};

static GLOBAL: Lazy<CodecBootstrap> = Lazy::new(CodecBootstrap::from_env);

/// Returns the process-wide codec bootstrap.
#[must_use]
pub fn global() -> &'static CodecBootstrap {
    &GLOBAL
}

/// Loads the native codec if no one has tried yet, returning whether audio
/// is supported by this process.
pub fn ensure_initialised() -> bool {
    GLOBAL.ensure_initialised()
}

/// Returns the bundle path libopus was loaded from, if loading succeeded.
pub fn library_path() -> Option<&'static str> {
    GLOBAL.library_path()
}

#[derive(Debug)]
struct Outcome {
    library_path: Option<String>,
    // Held to keep the library mapped.
    _codec: Option<LoadedCodec>,
}

impl Outcome {
    fn supported(&self) -> bool {
        self.library_path.is_some()
    }
}

/// Lazily evaluated, never repeated attempt to load the native codec.
///
/// Most code should use the process-wide instance behind [`global`];
/// separate instances exist so that embedders and tests may target an
/// explicit platform or supply their own [`NativeLoader`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CodecBootstrap {
    platform: Platform,
    #[derivative(Debug = "ignore")]
    loader: Box<dyn NativeLoader>,
    outcome: OnceCell<Outcome>,
}

impl CodecBootstrap {
    /// Creates a bootstrap which will load libopus for `platform` using `loader`.
    pub fn new<L>(platform: Platform, loader: L) -> Self
    where
        L: NativeLoader + 'static,
    {
        Self {
            platform,
            loader: Box::new(loader),
            outcome: OnceCell::new(),
        }
    }

    /// Creates a bootstrap for the host platform, reading libraries from
    /// the natives bundle described by the environment.
    #[cfg(feature = "natives")]
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(Platform::current(), ExtractingLoader::from_env())
    }

    /// Creates a bootstrap for the host platform which cannot load libraries.
    #[cfg(not(feature = "natives"))]
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(Platform::current(), DisabledLoader)
    }

    /// Returns the platform this bootstrap targets.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Loads the native codec if no one has tried yet, returning whether
    /// audio is supported.
    ///
    /// Concurrent callers block until the first attempt completes.
    pub fn ensure_initialised(&self) -> bool {
        self.outcome.get_or_init(|| self.initialise()).supported()
    }

    /// Returns whether a load attempt has completed.
    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Returns the bundle path libopus was loaded from, if loading succeeded.
    ///
    /// This does not trigger a load attempt.
    #[must_use]
    pub fn library_path(&self) -> Option<&str> {
        self.outcome
            .get()
            .and_then(|outcome| outcome.library_path.as_deref())
    }

    fn initialise(&self) -> Outcome {
        let attempt = self.platform.library_resource(OPUS_LIBRARY_NAME).and_then(|resource| {
            let loaded = panic::catch_unwind(AssertUnwindSafe(|| self.loader.load(&resource)))
                .unwrap_or_else(|payload| Err(CodecError::Unknown(panic_message(&*payload))));

            loaded.map(|codec| (resource, codec))
        });

        match attempt {
            Ok((resource, codec)) => {
                info!(
                    "Audio system successfully set up with {} from {:?}.",
                    resource,
                    codec.path()
                );

                Outcome {
                    library_path: Some(resource),
                    _codec: Some(codec),
                }
            },
            Err(e) => {
                self.report(&e);
                info!("Audio system encountered problems while loading, and is disabled.");

                Outcome {
                    library_path: None,
                    _codec: None,
                }
            },
        }
    }

    fn report(&self, e: &CodecError) {
        match e {
            CodecError::UnsupportedPlatform(p) => error!(
                "Audio is not supported on this system ({}). \
                Supported systems: Windows, macOS and Linux (x86, x86-64).",
                p
            ),
            CodecError::Io(io) => error!(
                "I/O error while setting up temporary files for audio: {}.",
                io
            ),
            CodecError::Link(reason) => error!(
                "Failed to link the native audio library for {}: {}.",
                self.platform, reason
            ),
            CodecError::Unknown(reason) => error!(
                "Unknown error while setting up the audio system: {}.",
                reason
            ),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "loader panicked".to_string()
    }
}
