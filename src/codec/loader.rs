use super::CodecError;
use std::path::{Path, PathBuf};

/// A successfully loaded native codec library.
///
/// Dropping this value may unload the library, so the bootstrap keeps it
/// for the lifetime of the process.
#[derive(Debug)]
pub struct LoadedCodec {
    path: PathBuf,
    #[cfg(feature = "natives")]
    library: Option<libloading::Library>,
    #[cfg(feature = "natives")]
    staging: Option<tempfile::TempDir>,
}

impl LoadedCodec {
    /// Describes a library loaded at `path` by some external means.
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            #[cfg(feature = "natives")]
            library: None,
            #[cfg(feature = "natives")]
            staging: None,
        }
    }

    /// Path the library was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns whether this value keeps a dynamic library mapped.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        #[cfg(feature = "natives")]
        {
            self.library.is_some()
        }
        #[cfg(not(feature = "natives"))]
        {
            false
        }
    }
}

/// Strategy for making a native library available to this process.
pub trait NativeLoader: Send + Sync {
    /// Loads the library found at `resource` within a natives bundle,
    /// e.g., `natives/linux-x86-64/libopus.so`.
    fn load(&self, resource: &str) -> Result<LoadedCodec, CodecError>;
}

#[cfg(feature = "natives")]
pub use self::extract::ExtractingLoader;

#[cfg(feature = "natives")]
mod extract {
    use super::*;
    use crate::constants::{NATIVES_ROOT_ENV, OPUS_PROBE_SYMBOL};
    use libloading::{Library, Symbol};
    use std::{env, fs, os::raw::c_char};
    use tracing::debug;

    /// Loads libraries from a natives bundle on disk.
    ///
    /// Each library is copied into a private temporary directory before
    /// being opened, so that the bundle itself is never locked or mapped.
    #[derive(Clone, Debug)]
    pub struct ExtractingLoader {
        root: PathBuf,
    }

    impl ExtractingLoader {
        /// Creates a loader reading from the bundle rooted at `root`.
        pub fn new<P: Into<PathBuf>>(root: P) -> Self {
            Self { root: root.into() }
        }

        /// Creates a loader rooted at [`NATIVES_ROOT_ENV`], if set, or at the
        /// directory containing the running executable.
        ///
        /// [`NATIVES_ROOT_ENV`]: crate::constants::NATIVES_ROOT_ENV
        #[must_use]
        pub fn from_env() -> Self {
            let root = env::var_os(NATIVES_ROOT_ENV)
                .map(PathBuf::from)
                .or_else(|| {
                    env::current_exe()
                        .ok()
                        .and_then(|exe| exe.parent().map(Path::to_path_buf))
                })
                .unwrap_or_else(|| PathBuf::from("."));

            Self::new(root)
        }

        /// Returns the bundle root.
        #[must_use]
        pub fn root(&self) -> &Path {
            &self.root
        }
    }

    impl NativeLoader for ExtractingLoader {
        fn load(&self, resource: &str) -> Result<LoadedCodec, CodecError> {
            let source = self.root.join(resource);
            let file_name = source
                .file_name()
                .ok_or_else(|| CodecError::Unknown(format!("bad resource path {}", resource)))?
                .to_owned();

            let staging = tempfile::Builder::new().prefix("skylark-natives").tempdir()?;
            let target = staging.path().join(file_name);

            debug!("Extracting {:?} to {:?}.", source, target);
            fs::copy(&source, &target)?;

            // SAFETY: libopus runs no initialisers with preconditions on load.
            let library = unsafe { Library::new(&target)? };

            {
                // SAFETY: only the symbol's presence is checked; it is never called.
                let _probe: Symbol<unsafe extern "C" fn() -> *const c_char> =
                    unsafe { library.get(OPUS_PROBE_SYMBOL)? };
            }

            Ok(LoadedCodec {
                path: target,
                library: Some(library),
                staging: Some(staging),
            })
        }
    }
}

/// Loader used when native loading is compiled out.
#[cfg(not(feature = "natives"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledLoader;

#[cfg(not(feature = "natives"))]
impl NativeLoader for DisabledLoader {
    fn load(&self, resource: &str) -> Result<LoadedCodec, CodecError> {
        Err(CodecError::Link(format!(
            "cannot load {}: built without the `natives` feature",
            resource
        )))
    }
}
