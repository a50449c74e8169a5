use crate::archive::ArchiveMetadata;
use crate::cache::DigestAlgorithm;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Everything a run needs, built once at startup and passed by reference.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub paths: PathSettings,
    pub build: BuildSettings,
    pub launch: LaunchSettings,
    /// Extra main attributes written into the produced archive's manifest.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    pub source: PathBuf,
    pub plugins: PathBuf,
    pub cache: PathBuf,
    /// Relative values resolve inside `cache`.
    pub artifact: PathBuf,
    pub dump: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            source: PathBuf::from("server.jar"),
            plugins: PathBuf::from("wrapper-plugins"),
            cache: PathBuf::from("cache"),
            artifact: PathBuf::from("patched.jar"),
            dump: PathBuf::from("dump"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
    pub module_suffix: String,
    pub digest: DigestAlgorithm,
    /// 0 fatal, 1 warn, 2 info, 3 debug.
    pub log_level: Option<i64>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            module_suffix: ".class".to_string(),
            digest: DigestAlgorithm::default(),
            log_level: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchSettings {
    pub java: String,
    pub jvm_args: Vec<String>,
    pub args: Vec<String>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            java: "java".to_string(),
            jvm_args: Vec::new(),
            args: Vec::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        let paths = [
            ("paths.source", &self.paths.source),
            ("paths.plugins", &self.paths.plugins),
            ("paths.cache", &self.paths.cache),
            ("paths.artifact", &self.paths.artifact),
            ("paths.dump", &self.paths.dump),
        ];
        for (field, path) in paths {
            if path.as_os_str().is_empty() {
                issues.push(ValidationIssue::MissingField { field });
            }
        }
        if self.paths.artifact.file_name().is_none() && !self.paths.artifact.as_os_str().is_empty()
        {
            issues.push(ValidationIssue::InvalidValue {
                field: "paths.artifact",
                message: "must name a file".to_string(),
            });
        }

        let suffix = &self.build.module_suffix;
        if suffix.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "build.module_suffix",
            });
        } else if suffix.contains('/') {
            issues.push(ValidationIssue::InvalidValue {
                field: "build.module_suffix",
                message: format!("'{}' must not contain '/'", suffix),
            });
        }

        if self.launch.java.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "launch.java",
            });
        }

        for key in self.metadata.keys() {
            let valid = !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                issues.push(ValidationIssue::InvalidValue {
                    field: "metadata",
                    message: format!("'{}' is not a valid manifest attribute name", key),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    pub fn artifact_path(&self) -> PathBuf {
        resolve_in(&self.paths.cache, &self.paths.artifact)
    }

    /// Manifest attributes stamped onto every produced archive.
    pub fn base_metadata(&self) -> ArchiveMetadata {
        let mut metadata = ArchiveMetadata::new().with(
            "Created-By",
            format!("jar-patcher {}", env!("CARGO_PKG_VERSION")),
        );
        for (key, value) in &self.metadata {
            metadata.main.set(key.as_str(), value.as_str());
        }
        metadata
    }
}

fn resolve_in(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingField {
        field: &'static str,
    },
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "setting '{field}' must not be empty")
            }
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "setting '{field}' is invalid: {message}")
            }
        }
    }
}

/// Diagnostic verbosity, numbered as on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Fatal = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn from_number(level: i64) -> Option<Self> {
        match level {
            0 => Some(LogLevel::Fatal),
            1 => Some(LogLevel::Warn),
            2 => Some(LogLevel::Info),
            3 => Some(LogLevel::Debug),
            _ => None,
        }
    }

    /// `tracing` filter directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Fatal => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    /// Pick the effective level. A debug override wins; an out-of-range
    /// request falls back to info and yields a warning message.
    pub fn resolve(requested: Option<i64>, force_debug: bool) -> (LogLevel, Option<String>) {
        if force_debug {
            return (LogLevel::Debug, None);
        }
        match requested {
            None => (LogLevel::Info, None),
            Some(n) => match LogLevel::from_number(n) {
                Some(level) => (level, None),
                None => (
                    LogLevel::Info,
                    Some(format!(
                        "Invalid log level {} (expected 0-3), falling back to info",
                        n
                    )),
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.artifact_path(), PathBuf::from("cache/patched.jar"));
        assert_eq!(settings.build.module_suffix, ".class");
        assert_eq!(settings.build.digest, DigestAlgorithm::Sha256);
    }

    #[test]
    fn test_absolute_artifact_kept() {
        let mut settings = Settings::default();
        settings.paths.artifact = PathBuf::from("/opt/out.jar");
        assert_eq!(settings.artifact_path(), PathBuf::from("/opt/out.jar"));
    }

    #[test]
    fn test_validation_collects_all_issues() {
        let mut settings = Settings::default();
        settings.paths.source = PathBuf::new();
        settings.build.module_suffix = " ".to_string();
        settings.launch.java = String::new();
        settings
            .metadata
            .insert("Bad Key".to_string(), "x".to_string());

        let err = settings.validate().unwrap_err();
        assert_eq!(err.issues.len(), 4);
        assert!(err.to_string().contains("paths.source"));
        assert!(err.to_string().contains("Bad Key"));
    }

    #[test]
    fn test_base_metadata_has_created_by_and_extras() {
        let mut settings = Settings::default();
        settings
            .metadata
            .insert("Implementation-Title".to_string(), "patched".to_string());
        let md = settings.base_metadata();
        assert!(md.get("Created-By").unwrap().starts_with("jar-patcher "));
        assert_eq!(md.get("Implementation-Title"), Some("patched"));
    }

    #[test]
    fn test_log_level_resolution() {
        assert_eq!(LogLevel::resolve(None, false), (LogLevel::Info, None));
        assert_eq!(LogLevel::resolve(Some(0), false), (LogLevel::Fatal, None));
        assert_eq!(LogLevel::resolve(Some(1), true), (LogLevel::Debug, None));

        let (level, warning) = LogLevel::resolve(Some(7), false);
        assert_eq!(level, LogLevel::Info);
        assert!(warning.unwrap().contains("7"));
        assert_eq!(LogLevel::Fatal.directive(), "error");
    }
}
