use crate::datadir::DataDirectory;

use std::{fmt, io, path::PathBuf, str::FromStr};

use serde::{de, Deserialize, Deserializer};

pub const DEFAULT_FILE_NAME: &str = "verdin.toml";

/// Deserialize an optional field by parsing its string representation.
fn deserialize_fromstr<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    <T as FromStr>::Err: fmt::Display,
{
    let string = String::deserialize(deserializer)?;
    T::from_str(&string)
        .map_err(|e| de::Error::custom(format!("Invalid value '{}': '{}'", string, e)))
}

fn default_loglevel() -> log::LevelFilter {
    log::LevelFilter::Info
}

fn default_proxy() -> String {
    String::new()
}

/// Static application configuration, read from a TOML file at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding wallet records. Defaults to a standard
    /// platform-specific location.
    pub data_dir: Option<PathBuf>,
    #[serde(
        deserialize_with = "deserialize_fromstr",
        default = "default_loglevel"
    )]
    pub log_level: log::LevelFilter,
    /// Default SOCKS5 proxy for new wallets, as "host:port".
    #[serde(default = "default_proxy")]
    pub proxy: String,
    /// Route new wallets through Tor by default.
    #[serde(default)]
    pub use_tor: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: default_loglevel(),
            proxy: default_proxy(),
            use_tor: false,
        }
    }
}

impl Config {
    /// Get the config in the given file, or in the default location if
    /// none is given. A missing default file yields the defaults.
    pub fn from_file(path: Option<PathBuf>) -> Result<Config, ConfigError> {
        let explicit = path.is_some();
        let path = match path {
            Some(path) => path,
            None => {
                let mut path = default_config_folder().ok_or(ConfigError::DatadirNotFound)?;
                path.push(DEFAULT_FILE_NAME);
                path
            }
        };

        match std::fs::read(&path) {
            Ok(content) => toml::from_slice::<Config>(&content)
                .map_err(|e| ConfigError::ReadingFile(format!("Parsing configuration file: {}", e))),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the data directory this config points at.
    pub fn data_directory(&self) -> Result<DataDirectory, ConfigError> {
        let path = match &self.data_dir {
            Some(path) => path.clone(),
            None => {
                let mut path = default_config_folder().ok_or(ConfigError::DatadirNotFound)?;
                path.push("data");
                path
            }
        };
        Ok(DataDirectory::new(path))
    }
}

fn default_config_folder() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push("Verdin");
        path
    })
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    DatadirNotFound,
    FileNotFound,
    ReadingFile(String),
    Unexpected(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::DatadirNotFound => write!(f, "Could not locate the configuration directory."),
            Self::FileNotFound => write!(f, "Could not find the configuration file."),
            Self::ReadingFile(e) => write!(f, "Error while reading the configuration file: {}", e),
            Self::Unexpected(e) => write!(f, "Unexpected error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            ConfigError::FileNotFound
        } else {
            ConfigError::ReadingFile(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_read_from_toml() {
        let toml_str = r#"
            data_dir = "/home/user/.verdin"
            log_level = "debug"
            use_tor = true
        "#;
        let config: Config = toml::from_str(toml_str).expect("Deserializing toml_str");
        assert_eq!(config.data_dir, Some(PathBuf::from("/home/user/.verdin")));
        assert_eq!(config.log_level, log::LevelFilter::Debug);
        assert!(config.use_tor);
        assert_eq!(config.proxy, "");

        // Defaults apply when fields are omitted.
        let config: Config = toml::from_str("").expect("Deserializing empty config");
        assert_eq!(config.log_level, log::LevelFilter::Info);
        assert!(!config.use_tor);
    }

    #[test]
    fn config_missing_explicit_file() {
        let err = Config::from_file(Some(PathBuf::from("/definitely/not/here.toml")))
            .expect_err("File does not exist");
        assert_eq!(err, ConfigError::FileNotFound);
    }
}
