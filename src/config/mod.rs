pub mod loader;
pub mod schema;
pub mod version;

pub use loader::{load_from_path, load_from_str, load_settings, ConfigError, DEFAULT_CONFIG_FILE};
pub use schema::{
    BuildSettings, LaunchSettings, LogLevel, PathSettings, Settings, ValidationError,
    ValidationIssue,
};
pub use version::{matches_requirement, parse_version, VersionError};
