use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use carchive::codec::DEFAULT_COMPRESSION_LEVEL;
use carchive::ops::backup::DEFAULT_MAX_BLOCK_BYTES;
use carchive::ops::BackupOptions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("bad config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// Settings from the config file; anything left out takes its default.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub compression_level: i32,
    pub max_block_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => return Ok(Config::default()),
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn backup_options(&self, base_dir: Option<PathBuf>) -> BackupOptions {
        BackupOptions {
            compression_level: self.compression_level,
            max_block_bytes: self.max_block_bytes,
            base_dir,
        }
    }
}

#[cfg(test)]
mod test_config {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn no_file_is_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.compression_level, 9);
        assert_eq!(config.max_block_bytes, 64 << 20);
    }

    #[test]
    fn partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("conserve.toml");
        fs::write(&path, "max_block_bytes = 4096\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(
            config,
            Config {
                compression_level: 9,
                max_block_bytes: 4096,
            }
        );

        let options = config.backup_options(Some(PathBuf::from("src")));
        assert_eq!(options.max_block_bytes, 4096);
        assert_eq!(options.base_dir, Some(PathBuf::from("src")));
    }

    #[test]
    fn unknown_key() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("conserve.toml");
        fs::write(&path, "compresion_level = 3\n").unwrap();

        assert!(matches!(Config::load(Some(&path)), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn missing_file() {
        let tmp = TempDir::new().unwrap();

        let err = Config::load(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
