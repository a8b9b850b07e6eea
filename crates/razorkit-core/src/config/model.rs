use super::consts::limits;
use super::ConfigError;
use crate::types::TemplateBaseType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete engine configuration; every field has a default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Extra namespaces imported into every generated unit
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default = "default_base_type")]
    pub base_type: String,
    #[serde(default = "default_true")]
    pub emit_line_pragmas: bool,
    /// Read artifacts back into memory instead of holding a shared lock
    #[serde(default = "default_true")]
    pub disable_temp_file_locking: bool,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            namespaces: Vec::new(),
            base_type: default_base_type(),
            emit_line_pragmas: true,
            disable_temp_file_locking: true,
            artifacts: ArtifactsConfig::default(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Where compiled binaries are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactMode {
    /// Load straight from the in-memory binary
    #[default]
    Memory,
    /// A private temporary directory removed with the engine
    Temp,
    /// A caller-provided directory (`path`)
    Directory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default)]
    pub mode: ArtifactMode,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_layout_depth")]
    pub max_layout_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_layout_depth: limits::MAX_LAYOUT_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_imports_file_name")]
    pub imports_file_name: String,
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            imports_file_name: default_imports_file_name(),
            extension: default_extension(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_base_type() -> String {
    TemplateBaseType::HTML.to_string()
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_max_layout_depth() -> usize {
    limits::MAX_LAYOUT_DEPTH
}

fn default_imports_file_name() -> String {
    "_imports".to_string()
}

fn default_extension() -> String {
    "cshtml".to_string()
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks values that deserialize fine but cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.max_layout_depth == 0 {
            return Err(ConfigError::invalid(
                "runtime.max_layout_depth",
                "must be at least 1",
            ));
        }
        if self.compiler.base_type.trim().is_empty() {
            return Err(ConfigError::invalid("compiler.base_type", "must not be empty"));
        }
        if self.compiler.artifacts.mode == ArtifactMode::Directory
            && self.compiler.artifacts.path.is_none()
        {
            return Err(ConfigError::invalid(
                "compiler.artifacts.path",
                "required when mode = \"directory\"",
            ));
        }
        if self.source.imports_file_name.contains('/') {
            return Err(ConfigError::invalid(
                "source.imports_file_name",
                "must be a file name, not a path",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.compiler.base_type, "TemplateBase");
        assert!(config.compiler.emit_line_pragmas);
        assert!(config.compiler.disable_temp_file_locking);
        assert_eq!(config.compiler.artifacts.mode, ArtifactMode::Memory);
        assert_eq!(config.runtime.max_layout_depth, 16);
        assert_eq!(config.source.imports_file_name, "_imports");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[compiler]
namespaces = ["Site"]
base_type = "RawTemplateBase"
emit_line_pragmas = false
disable_temp_file_locking = false
lock_timeout_ms = 250

[compiler.artifacts]
mode = "directory"
path = "/tmp/razorkit"

[runtime]
max_layout_depth = 4

[source]
imports_file_name = "_ViewImports"
extension = "rzr"
"#;
        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.compiler.namespaces, vec!["Site"]);
        assert_eq!(config.compiler.base_type, "RawTemplateBase");
        assert!(!config.compiler.disable_temp_file_locking);
        assert_eq!(config.compiler.artifacts.mode, ArtifactMode::Directory);
        assert_eq!(
            config.compiler.artifacts.path.as_deref(),
            Some(Path::new("/tmp/razorkit"))
        );
        assert_eq!(config.runtime.max_layout_depth, 4);
        assert_eq!(config.source.extension, "rzr");
    }

    #[test]
    fn test_directory_mode_requires_path() {
        let result = EngineConfig::from_toml_str("[compiler.artifacts]\nmode = \"directory\"\n");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, .. }) if field == "compiler.artifacts.path"
        ));
    }

    #[test]
    fn test_zero_layout_depth_rejected() {
        let result = EngineConfig::from_toml_str("[runtime]\nmax_layout_depth = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_mode_is_parse_error() {
        let result = EngineConfig::from_toml_str("[compiler.artifacts]\nmode = \"cloud\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("razorkit.toml");
        let mut config = EngineConfig::default();
        config.runtime.max_layout_depth = 3;
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
    }
}
