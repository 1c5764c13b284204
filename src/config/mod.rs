// src/config/mod.rs - Rule configuration loading, validation and compilation

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use crate::bot::commands::CommandRule;
use crate::bot::replacements::ReplacementRule;
use crate::bot::responses::ResponseRule;
use crate::bot::rules::{ExclusionSet, RuleSet};
use crate::types::{DuplicateMode, MatchMode};

/// Config file used when `CHATWARDEN_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Errors that stop the bot from starting
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid regex in {rule} ({pattern}): {source}")]
    Pattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Channel or user ids, written either as a list or as an `{id: bool}` map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdSet {
    List(Vec<String>),
    Map(HashMap<String, bool>),
}

impl Default for IdSet {
    fn default() -> Self {
        IdSet::List(Vec::new())
    }
}

impl IdSet {
    /// Ids that are excluded. Map entries set to `false` are not.
    pub fn to_set(&self) -> HashSet<String> {
        match self {
            IdSet::List(ids) => ids.iter().cloned().collect(),
            IdSet::Map(ids) => ids
                .iter()
                .filter(|(_, excluded)| **excluded)
                .map(|(id, _)| id.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub command: String,
    pub response: String,
    #[serde(default)]
    pub regexp: bool,
    #[serde(default)]
    pub contains: bool,
    #[serde(default)]
    pub typing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementConfig {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub regexp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    pub trigger: String,
    pub reply: String,
    #[serde(default)]
    pub regexp: bool,
}

/// On-disk configuration, every section optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfiguration {
    pub commands: Vec<CommandConfig>,
    pub replacements: Vec<ReplacementConfig>,
    pub responses: Vec<ResponseConfig>,
    pub excluded_channels: IdSet,
    pub excluded_users: IdSet,
    pub duplicate_mode: DuplicateMode,
}

/// Serialization format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Unknown or missing extensions are read as JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

impl BotConfiguration {
    pub fn parse(content: &str, format: ConfigFormat, path: &Path) -> Result<Self, ConfigError> {
        let parsed = match format {
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Compile every pattern into the immutable rule set
    pub fn compile(&self) -> Result<RuleSet, ConfigError> {
        ConfigValidator::new().validate(self)?;

        let commands = self
            .commands
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mode = MatchMode::from_flags(c.regexp, c.contains);
                CommandRule::new(c.command.clone(), c.response.clone(), mode, c.typing)
                    .map_err(|source| pattern_error(format!("commands[{}]", i), &c.command, source))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let replacements = self
            .replacements
            .iter()
            .enumerate()
            .map(|(i, r)| {
                if r.regexp {
                    ReplacementRule::regex(&r.from, r.to.clone())
                        .map_err(|source| pattern_error(format!("replacements[{}]", i), &r.from, source))
                } else {
                    Ok(ReplacementRule::literal(r.from.clone(), r.to.clone()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let responses = self
            .responses
            .iter()
            .enumerate()
            .map(|(i, r)| {
                if r.regexp {
                    ResponseRule::regex(&r.trigger, r.reply.clone())
                        .map_err(|source| pattern_error(format!("responses[{}]", i), &r.trigger, source))
                } else {
                    Ok(ResponseRule::substring(r.trigger.clone(), r.reply.clone()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let exclusions = ExclusionSet {
            channels: self.excluded_channels.to_set(),
            users: self.excluded_users.to_set(),
        };

        Ok(RuleSet::new(self.duplicate_mode, commands, replacements, responses, exclusions))
    }
}

fn pattern_error(rule: String, pattern: &str, source: regex::Error) -> ConfigError {
    ConfigError::Pattern {
        rule,
        pattern: pattern.to_string(),
        source,
    }
}

/// Structural checks that run before any pattern is compiled
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, config: &BotConfiguration) -> Result<(), ConfigError> {
        for (i, command) in config.commands.iter().enumerate() {
            if command.command.is_empty() {
                return Err(ConfigError::Invalid(format!("commands[{}] has an empty trigger", i)));
            }
            if command.response.is_empty() {
                warn!("commands[{}] ('{}') has an empty response and will never reply", i, command.command);
            }
        }

        for (i, replacement) in config.replacements.iter().enumerate() {
            if replacement.from.is_empty() {
                return Err(ConfigError::Invalid(format!("replacements[{}] has an empty 'from'", i)));
            }
        }

        for (i, response) in config.responses.iter().enumerate() {
            if response.trigger.is_empty() {
                return Err(ConfigError::Invalid(format!("responses[{}] has an empty trigger", i)));
            }
        }

        Ok(())
    }
}

/// Path from `CHATWARDEN_CONFIG`, or `config.json` in the working directory
pub fn config_path_from_env() -> PathBuf {
    env::var("CHATWARDEN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Read and parse a config file. A missing file means "nothing configured".
pub async fn load_configuration(path: &Path) -> Result<BotConfiguration, ConfigError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Config file {} not found, running with no rules", path.display());
            return Ok(BotConfiguration::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let config = BotConfiguration::parse(&content, ConfigFormat::from_path(path), path)?;
    debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Load, validate and compile the rules at `path`
pub async fn load_rules(path: &Path) -> Result<RuleSet, ConfigError> {
    let config = load_configuration(path).await?;
    let rules = config.compile()?;

    info!(
        "Loaded {} commands, {} replacements, {} responses ({:?} duplicate detection, {} excluded channels, {} excluded users)",
        rules.commands.len(),
        rules.replacements.len(),
        rules.responses.len(),
        rules.duplicate_mode,
        rules.exclusions.channels.len(),
        rules.exclusions.users.len(),
    );
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_means_no_rules() {
        let temp_dir = tempdir().unwrap();
        let rules = load_rules(&temp_dir.path().join("config.json")).await.unwrap();

        assert!(rules.commands.is_empty());
        assert!(rules.replacements.is_empty());
        assert!(rules.responses.is_empty());
        assert_eq!(rules.duplicate_mode, DuplicateMode::Literal);
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let config = serde_json::json!({
            "commands": [
                {"command": "!hello", "response": "Hello!"},
                {"command": "^ping (\\w+)$", "response": "pong $1", "regexp": true, "typing": true},
                {"command": "help", "response": "See #faq", "contains": true}
            ],
            "replacements": [{"from": "foo", "to": "bar"}],
            "responses": [{"trigger": "(?i)thanks", "reply": "you're welcome", "regexp": true}],
            "excluded_channels": {"111": true, "222": false},
            "excluded_users": ["333"],
            "duplicate_mode": "numeric"
        });
        fs::write(&path, serde_json::to_string(&config).unwrap()).await.unwrap();

        let rules = load_rules(&path).await.unwrap();
        assert_eq!(rules.commands.len(), 3);
        assert_eq!(rules.replacements.len(), 1);
        assert_eq!(rules.responses.len(), 1);
        assert_eq!(rules.duplicate_mode, DuplicateMode::Numeric);
        assert!(rules.exclusions.is_channel_excluded("111"));
        assert!(!rules.exclusions.is_channel_excluded("222"));
        assert!(rules.exclusions.is_user_excluded("333"));

        let responses = rules.commands.matching_responses("ping alice", "ping alice");
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].1, "pong alice");
        assert!(responses[0].0.show_typing);
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("rules.yaml");
        let yaml = r#"
commands:
  - command: hi
    response: hello
replacements:
  - from: '(\w+)@example\.com'
    to: '$1@redacted'
    regexp: true
excluded_users:
  "42": true
"#;
        fs::write(&path, yaml).await.unwrap();

        let rules = load_rules(&path).await.unwrap();
        assert_eq!(rules.commands.len(), 1);
        assert_eq!(rules.replacements.rewrite("mail bob@example.com"), "mail bob@redacted");
        assert!(rules.exclusions.is_user_excluded("42"));
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("rules.toml");
        let content = r#"
duplicate_mode = "numeric"
excluded_channels = ["9"]

[[responses]]
trigger = "rust"
reply = "crab"
"#;
        fs::write(&path, content).await.unwrap();

        let rules = load_rules(&path).await.unwrap();
        assert_eq!(rules.duplicate_mode, DuplicateMode::Numeric);
        assert_eq!(rules.responses.matching_replies("rust!"), vec!["crab"]);
        assert!(rules.exclusions.is_channel_excluded("9"));
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").await.unwrap();

        let result = load_rules(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_invalid_regex_fails_at_load() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let config = serde_json::json!({
            "commands": [{"command": "(unclosed", "response": "x", "regexp": true}]
        });
        fs::write(&path, config.to_string()).await.unwrap();

        match load_rules(&path).await {
            Err(ConfigError::Pattern { rule, pattern, .. }) => {
                assert_eq!(rule, "commands[0]");
                assert_eq!(pattern, "(unclosed");
            }
            other => panic!("expected pattern error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = BotConfiguration::default();
        assert!(ConfigValidator::new().validate(&config).is_ok());

        config.replacements.push(ReplacementConfig {
            from: String::new(),
            to: "x".to_string(),
            regexp: false,
        });
        assert!(matches!(ConfigValidator::new().validate(&config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.YML")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Json);
    }
}
