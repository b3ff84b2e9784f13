use std::{error::Error as StdError, fmt, io::Error as IoError};

/// Reasons the native audio codec could not be set up.
///
/// These are logged by the bootstrap and never returned from connection
/// attempts, which instead fail with [`JoinError::AudioUnsupported`].
///
/// [`JoinError::AudioUnsupported`]: crate::error::JoinError::AudioUnsupported
#[derive(Debug)]
#[non_exhaustive]
pub enum CodecError {
    /// No native library is shipped for this platform.
    UnsupportedPlatform(String),
    /// Preparing the library's temporary files failed.
    Io(IoError),
    /// The library was found, but could not be linked.
    Link(String),
    /// The loader failed in some other way.
    Unknown(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to set up native audio codec: ")?;
        match self {
            CodecError::UnsupportedPlatform(p) => write!(f, "unsupported platform {}", p),
            CodecError::Io(e) => write!(f, "i/o error preparing library ({})", e),
            CodecError::Link(e) => write!(f, "could not link library ({})", e),
            CodecError::Unknown(e) => write!(f, "unknown error ({})", e),
        }
    }
}

impl StdError for CodecError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CodecError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for CodecError {
    fn from(e: IoError) -> Self {
        CodecError::Io(e)
    }
}

#[cfg(feature = "natives")]
impl From<libloading::Error> for CodecError {
    fn from(e: libloading::Error) -> Self {
        CodecError::Link(e.to_string())
    }
}
