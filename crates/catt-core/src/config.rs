//! TOML configuration.
//!
//! ```toml
//! [main]
//! client = "/opt/cvp2/openssl/bin/openssl"
//! log_path = "logs"
//! ca_file = "certs/dtla-ca.pem"
//! timeout_secs = 10
//!
//! [libraries]
//! production_lib_cvp2 = "lib/prod-cvp2/libdtcp.so"
//!
//! [keys]
//! production_key_cvp2 = "keys/prod-cvp2"
//!
//! [markers]
//! capability_flag_set = { regex = "CVP2 bit (is )?set" }
//! ```
//!
//! Relative paths resolve against the directory holding the file. Every
//! library and key entry is optional; a missing one skips the cases that
//! need it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::evidence::{Marker, MarkerRegistry, MarkerRule};
use crate::suite::TestSuite;

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "catt.toml";

fn default_log_path() -> PathBuf {
    PathBuf::from(".")
}

const fn default_timeout_secs() -> u64 {
    10
}

/// Whole configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CattConfig {
    pub main: MainSection,
    #[serde(default)]
    pub libraries: LibrariesSection,
    #[serde(default)]
    pub keys: KeysSection,
    #[serde(default)]
    pub markers: BTreeMap<String, MarkerSetting>,
}

/// `[main]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MainSection {
    /// Handshake client executable.
    pub client: PathBuf,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    /// Trust anchor passed as `-CAfile`.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// `[libraries]`: DTCP library per scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibrariesSection {
    pub production_lib_cvp2: Option<PathBuf>,
    pub production_lib_no_cvp2: Option<PathBuf>,
    pub test_lib_cvp2: Option<PathBuf>,
    pub test_lib_no_cvp2: Option<PathBuf>,
}

impl LibrariesSection {
    fn get(&self, key: &str) -> Option<&PathBuf> {
        match key {
            "production_lib_cvp2" => self.production_lib_cvp2.as_ref(),
            "production_lib_no_cvp2" => self.production_lib_no_cvp2.as_ref(),
            "test_lib_cvp2" => self.test_lib_cvp2.as_ref(),
            "test_lib_no_cvp2" => self.test_lib_no_cvp2.as_ref(),
            _ => None,
        }
    }

    fn paths_mut(&mut self) -> [&mut Option<PathBuf>; 4] {
        [
            &mut self.production_lib_cvp2,
            &mut self.production_lib_no_cvp2,
            &mut self.test_lib_cvp2,
            &mut self.test_lib_no_cvp2,
        ]
    }
}

/// `[keys]`: credential directory per scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeysSection {
    pub production_key_cvp2: Option<PathBuf>,
    pub production_key_no_cvp2: Option<PathBuf>,
    pub test_key_cvp2: Option<PathBuf>,
    pub test_key_no_cvp2: Option<PathBuf>,
}

impl KeysSection {
    fn get(&self, key: &str) -> Option<&PathBuf> {
        match key {
            "production_key_cvp2" => self.production_key_cvp2.as_ref(),
            "production_key_no_cvp2" => self.production_key_no_cvp2.as_ref(),
            "test_key_cvp2" => self.test_key_cvp2.as_ref(),
            "test_key_no_cvp2" => self.test_key_no_cvp2.as_ref(),
            _ => None,
        }
    }

    fn paths_mut(&mut self) -> [&mut Option<PathBuf>; 4] {
        [
            &mut self.production_key_cvp2,
            &mut self.production_key_no_cvp2,
            &mut self.test_key_cvp2,
            &mut self.test_key_no_cvp2,
        ]
    }
}

/// A `[markers]` entry: a bare string is a substring rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerSetting {
    Text(String),
    Rule(MarkerRuleSetting),
}

/// Explicit marker rule, e.g. `{ regex = "..." }` or `{ hex = "dead beef" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerRuleSetting {
    Substring(String),
    Regex(String),
    Hex(String),
}

impl MarkerSetting {
    fn compile(&self, marker: &str) -> Result<MarkerRule, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidMarkerRule {
            marker: marker.to_string(),
            message,
        };
        match self {
            Self::Text(text) | Self::Rule(MarkerRuleSetting::Substring(text)) => {
                if text.is_empty() {
                    return Err(invalid("substring must not be empty".to_string()));
                }
                Ok(MarkerRule::Substring(text.clone()))
            }
            Self::Rule(MarkerRuleSetting::Regex(pattern)) => Regex::new(pattern)
                .map(MarkerRule::Pattern)
                .map_err(|err| invalid(err.to_string())),
            Self::Rule(MarkerRuleSetting::Hex(text)) => {
                let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = hex::decode(&digits).map_err(|err| invalid(err.to_string()))?;
                if bytes.is_empty() {
                    return Err(invalid("byte pattern must not be empty".to_string()));
                }
                Ok(MarkerRule::Bytes(bytes))
            }
        }
    }
}

impl CattConfig {
    /// Read, parse, validate, and resolve paths relative to the file.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let mut config = Self::parse_str(&text)?;
        config.resolve_paths(base_dir);
        Ok(config)
    }

    /// Parse and validate without touching paths.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on TOML or validation errors.
    pub fn parse_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns the first violated setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main.client.as_os_str().is_empty() {
            return Err(ConfigError::MissingClient);
        }
        if self.main.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        self.marker_registry().map(|_| ())
    }

    /// Make relative paths relative to `base_dir`.
    ///
    /// A bare client name such as `openssl` is left for `PATH` lookup.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        };

        if self.main.client.components().count() > 1 {
            resolve(&mut self.main.client);
        }
        resolve(&mut self.main.log_path);
        if let Some(ca_file) = self.main.ca_file.as_mut() {
            resolve(ca_file);
        }
        for path in self
            .libraries
            .paths_mut()
            .into_iter()
            .chain(self.keys.paths_mut())
            .flatten()
        {
            resolve(path);
        }
    }

    #[must_use]
    pub const fn time_limit(&self) -> Duration {
        Duration::from_secs(self.main.timeout_secs)
    }

    /// Default marker rules with `[markers]` overrides applied.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for unknown markers or invalid rules.
    pub fn marker_registry(&self) -> Result<MarkerRegistry, ConfigError> {
        self.markers
            .iter()
            .try_fold(MarkerRegistry::default(), |registry, (id, setting)| {
                let marker =
                    Marker::from_id(id).ok_or_else(|| ConfigError::UnknownMarker(id.clone()))?;
                Ok(registry.with_rule(marker, setting.compile(id)?))
            })
    }

    /// Library or credential path by its configuration key.
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&Path> {
        self.libraries
            .get(key)
            .or_else(|| self.keys.get(key))
            .map(PathBuf::as_path)
    }

    /// The standard five-case suite with this file's inputs.
    #[must_use]
    pub fn standard_suite(&self) -> TestSuite {
        TestSuite::standard(|key| self.input(key).map(Path::to_path_buf))
    }
}
