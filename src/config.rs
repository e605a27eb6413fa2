use failure::Fail;
use log::LevelFilter;
use std::{collections::HashMap, fs};

use crate::utils::SingleInit;

static CONFIG: SingleInit<Config> = SingleInit::uninit();

pub fn load() -> crate::Result<&'static Config> {
    CONFIG.get_or_try_init(|| {
        let data = fs::read("config.toml").map_err(ReadConfigurationError)?;
        toml::from_slice(&data).map_err(|e| ConfigurationError(e).into())
    })
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub database: Option<Database>,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub i18n: I18n,
}

impl Config {
    /// Validate configuration correctness.
    pub fn validate(&self) -> Result<(), failure::Error> {
        if self.i18n.languages.is_empty() {
            return Err(ConfiguredLanguagesError.into());
        }

        Ok(())
    }
}

/// Database configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Database {
    /// Connection URL, used unless `DATABASE_URL` is set in the environment.
    pub url: String,
}

/// Logging configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Logging {
    /// Default logging level.
    #[serde(default = "default_level_filter")]
    pub level: LevelFilter,
    /// Custom filters.
    #[serde(default)]
    pub filters: HashMap<String, LevelFilter>,
}

/// Language configuration.
///
/// The order of `languages` is the order in which per-language workflow states
/// are reported (see [`crate::versioning::translation_states()`]).
#[derive(Clone, Debug, Deserialize)]
pub struct I18n {
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

#[derive(Debug, Fail)]
#[fail(display = "Cannot read configuration file")]
pub struct ReadConfigurationError(#[fail(cause)] std::io::Error);

#[derive(Debug, Fail)]
#[fail(display = "Invalid configuration: {}", _0)]
pub struct ConfigurationError(#[fail(cause)] toml::de::Error);

#[derive(Debug, Fail)]
#[fail(display = "At least one language must be configured")]
pub struct ConfiguredLanguagesError;

fn default_level_filter() -> LevelFilter {
    LevelFilter::Info
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: default_level_filter(),
            filters: HashMap::new(),
        }
    }
}

impl Default for I18n {
    fn default() -> Self {
        I18n {
            languages: default_languages(),
        }
    }
}
