use crate::provider::{CommandProviderConfig, QueuedMutationsProvider};
use crate::runner::{FileErrorPolicy, WavesPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Provider type '{0}' selected but its settings are missing")]
    MissingProviderSettings(&'static str),

    #[error("Waves minimum {minimum} exceeds maximum {maximum}")]
    InvalidWaves { minimum: usize, maximum: usize },
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct WavesSettings {
    #[serde(default)]
    pub minimum: usize,
    pub maximum: Option<usize>,
}

impl WavesSettings {
    pub fn to_policy(&self) -> Result<WavesPolicy, ConfigError> {
        if let Some(maximum) = self.maximum {
            if self.minimum > maximum {
                return Err(ConfigError::InvalidWaves {
                    minimum: self.minimum,
                    maximum,
                });
            }
        }
        Ok(WavesPolicy {
            minimum: self.minimum,
            maximum: self.maximum,
        })
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    #[default]
    Command,
    WavesFile,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CommandProviderSettings {
    pub command: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub working_dir: Option<PathBuf>,
}

fn default_timeout_ms() -> u64 {
    CommandProviderSettings::DEFAULT_TIMEOUT_MS
}

impl Default for CommandProviderSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_ms: default_timeout_ms(),
            working_dir: None,
        }
    }
}

impl CommandProviderSettings {
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

    pub fn to_provider_config(&self) -> CommandProviderConfig {
        CommandProviderConfig {
            command: self.command.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            working_dir: self.working_dir.clone(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct WavesFileSettings {
    pub path: PathBuf,
}

impl WavesFileSettings {
    pub fn load(&self) -> Result<QueuedMutationsProvider, anyhow::Error> {
        QueuedMutationsProvider::from_json_file(&self.path)
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub command_settings: Option<CommandProviderSettings>,
    #[serde(default)]
    pub waves_file_settings: Option<WavesFileSettings>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FilesConfig {
    /// Relative file names in waves are resolved against this directory.
    pub root_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ErrorsConfig {
    #[serde(default)]
    pub on_file_error: FileErrorPolicy,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct AutomutateConfig {
    #[serde(default)]
    pub waves: WavesSettings,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub errors: ErrorsConfig,
}

pub const DEFAULT_CONFIG_FILE: &str = "automutate.toml";

impl AutomutateConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Checks that the settings for the selected provider are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.waves.to_policy()?;
        match self.provider.provider_type {
            ProviderType::Command if self.provider.command_settings.is_none() => {
                Err(ConfigError::MissingProviderSettings("command"))
            }
            ProviderType::WavesFile if self.provider.waves_file_settings.is_none() => {
                Err(ConfigError::MissingProviderSettings("waves-file"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = AutomutateConfig::from_toml_str("").unwrap();
        assert_eq!(config, AutomutateConfig::default());
        assert_eq!(config.errors.on_file_error, FileErrorPolicy::Continue);
        assert_eq!(config.waves.to_policy().unwrap(), WavesPolicy::default());
    }

    #[test]
    fn full_config_parses() {
        let config = AutomutateConfig::from_toml_str(
            r#"
            [waves]
            minimum = 1
            maximum = 10

            [provider]
            provider-type = "command"

            [provider.command-settings]
            command = ["my-linter", "--fix-json"]
            working-dir = "."

            [files]
            root-dir = "src"

            [errors]
            on-file-error = "abort"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.waves.to_policy().unwrap(),
            WavesPolicy {
                minimum: 1,
                maximum: Some(10)
            }
        );
        let command = config.provider.command_settings.as_ref().unwrap();
        assert_eq!(command.command, vec!["my-linter", "--fix-json"]);
        assert_eq!(command.timeout_ms, 30_000);
        assert_eq!(
            command.to_provider_config().timeout,
            Duration::from_secs(30)
        );
        assert_eq!(config.files.root_dir, Some(PathBuf::from("src")));
        assert_eq!(config.errors.on_file_error, FileErrorPolicy::Abort);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(AutomutateConfig::from_toml_str("[waves]\nminimm = 1\n").is_err());
    }

    #[test]
    fn validate_requires_selected_provider_settings() {
        let config = AutomutateConfig::from_toml_str(
            "[provider]\nprovider-type = \"waves-file\"\n",
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingProviderSettings("waves-file"))
        ));
    }

    #[test]
    fn minimum_above_maximum_is_rejected() {
        let waves = WavesSettings {
            minimum: 3,
            maximum: Some(2),
        };
        assert!(matches!(
            waves.to_policy(),
            Err(ConfigError::InvalidWaves {
                minimum: 3,
                maximum: 2
            })
        ));
    }

    #[test]
    fn load_from_file_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("automutate.toml");
        std::fs::write(&path, "[waves\n").unwrap();

        match AutomutateConfig::load_from_file(&path) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("Expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn load_from_file_reads_waves_file_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("automutate.toml");
        std::fs::write(
            &path,
            "[provider]\nprovider-type = \"waves-file\"\n[provider.waves-file-settings]\npath = \"waves.json\"\n",
        )
        .unwrap();

        let config = AutomutateConfig::load_from_file(&path).unwrap();
        assert_eq!(config.provider.provider_type, ProviderType::WavesFile);
        assert_eq!(
            config.provider.waves_file_settings,
            Some(WavesFileSettings {
                path: PathBuf::from("waves.json")
            })
        );
    }
}
