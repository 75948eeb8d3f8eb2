//! Layered configuration
//!
//! Two file layers are read and merged:
//! - Global: `~/.config/stagectl/stagectl.toml`
//! - Project: `./stagectl.toml` (or the file given with `--config`)
//!
//! `STAGECTL_*` environment variables override both.

pub mod merge;
pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use merge::{apply_env_overrides, merge_configs};
pub use parser::{parse_stagectl_toml, parse_stagectl_toml_str};
pub use schema::{
    CleanupSettings, HealthEntry, HealthSettings, ResourceEntry, StageConfig, StagectlConfig,
    validate_namespace,
};
pub use store::ConfigStore;
