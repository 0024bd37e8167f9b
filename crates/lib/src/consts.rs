/// Default cache directory name, created next to the unit manifest.
pub const CACHE_DIR_NAME: &str = ".strata";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "STRATA_CACHE_DIR";

/// Subdirectory of the cache directory holding artifact entries.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// File name of the persisted build history inside the cache directory.
pub const HISTORY_FILENAME: &str = "history.json";

/// Length of the truncated hash used to derive store keys from unit ids.
pub const KEY_HASH_PREFIX_LEN: usize = 20;

/// Version tag mixed into every content signature.
///
/// Bump this when the signature layout changes so old cache entries miss.
pub const SIGNATURE_VERSION: u32 = 1;

/// Timeout applied to actions that do not declare one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Unit manifest file name looked up when none is given.
pub const MANIFEST_FILENAME: &str = "strata.json";
