use super::CodecError;
use crate::constants::NATIVES_DIR;
use std::fmt;

/// A host platform, named by its native resource prefix.
///
/// Prefixes follow the `<os>-<arch>` layout used by prebuilt native
/// bundles, e.g., `linux-x86-64`, `win32-x86` or `darwin`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Platform {
    resource_prefix: String,
}

impl Platform {
    /// Describes the platform this process is running on.
    #[must_use]
    pub fn current() -> Self {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Describes a platform from Rust's `target_os` and `target_arch` names.
    #[must_use]
    pub fn from_parts(os: &str, arch: &str) -> Self {
        let os = match os {
            "windows" => "win32",
            // Universal binaries: no arch suffix.
            "macos" | "ios" => return Self::from_prefix("darwin"),
            other => other,
        };

        let arch = match arch {
            "x86_64" => "x86-64",
            "x86" => "x86",
            "aarch64" => "aarch64",
            "arm" => "arm",
            other => other,
        };

        Self::from_prefix(format!("{}-{}", os, arch))
    }

    /// Describes a platform by its resource prefix.
    pub fn from_prefix<S: Into<String>>(resource_prefix: S) -> Self {
        Self {
            resource_prefix: resource_prefix.into(),
        }
    }

    /// Returns this platform's resource prefix.
    #[must_use]
    pub fn resource_prefix(&self) -> &str {
        &self.resource_prefix
    }

    /// Returns the shared library extension used on this platform.
    pub fn library_extension(&self) -> Result<&'static str, CodecError> {
        let prefix = &self.resource_prefix;

        // "darwin" contains "win": order matters.
        if prefix.contains("darwin") {
            Ok("dylib")
        } else if prefix.contains("win") {
            Ok("dll")
        } else if prefix.contains("linux") {
            Ok("so")
        } else {
            Err(CodecError::UnsupportedPlatform(prefix.clone()))
        }
    }

    /// Returns the path of the named library inside a natives bundle.
    pub fn library_resource(&self, name: &str) -> Result<String, CodecError> {
        let ext = self.library_extension()?;

        Ok(format!(
            "{}/{}/{}.{}",
            NATIVES_DIR, self.resource_prefix, name, ext
        ))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource_prefix)
    }
}
