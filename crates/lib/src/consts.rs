/// Application name, used for default directory names.
pub const APP_NAME: &str = "predex";

/// Length of the truncated hash used for cache entry directory names.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Directory name marking the shared extraction root for unpacked library archives.
///
/// Units below this directory are identified by their path relative to it, so two
/// copies of the same library collapse onto one cache key.
pub const SHARED_EXTRACTION_DIR: &str = "exploded-aar";

/// Logical name of the final output slot.
pub const MAIN_OUTPUT_NAME: &str = "main";

/// Extension of single-file dex archives.
pub const DOT_JAR: &str = ".jar";

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "PREDEX_CACHE_DIR";
