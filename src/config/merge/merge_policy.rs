//! Merge rules: defaults, override order, conflict handling.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key; tables are merged, not replaced.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("build.dispatch_timeout_ms", 30_000_i64)?
        .set_default("build.stop_timeout_ms", 10_000_i64)?
        .set_default("storage.store_path", ".study-tree/store")?
        .set_default("logging.level", "info")
}
