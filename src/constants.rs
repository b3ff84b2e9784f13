//! Constants affecting connection management and gateway payloads.

use std::time::Duration;

/// Gateway opcode of an outbound voice state update.
pub const VOICE_STATE_UPDATE_OPCODE: u8 = 4;

/// Default time a connection handle is given to finish readying.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default time a connection handle waits on its audio packet queue.
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// File stem of the native Opus library.
pub const OPUS_LIBRARY_NAME: &str = "libopus";

/// Symbol looked up to verify that a loaded library really is libopus.
pub const OPUS_PROBE_SYMBOL: &[u8] = b"opus_get_version_string\0";

/// Directory, relative to the natives root, holding per-platform libraries.
pub const NATIVES_DIR: &str = "natives";

/// Environment variable overriding the natives root.
///
/// When unset, the directory of the running executable is used.
pub const NATIVES_ROOT_ENV: &str = "SKYLARK_NATIVES_DIR";

/// Number of bits of a snowflake below the timestamp, used for shard routing.
pub(crate) const SNOWFLAKE_SHARD_SHIFT: u32 = 22;
