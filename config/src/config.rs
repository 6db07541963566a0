// Copyright 2021 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Locating, reading and writing the configuration file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::comments::insert_comments;
use crate::core::global::ChainTypes;
use crate::types::{ChainConfig, ConfigError, ConfigMembers, GlobalConfig};
use crate::util::LoggingConfig;

/// Name of the configuration file, in the working directory or the home.
pub const CONFIG_FILE_NAME: &str = "mimble.toml";
/// Name of the log file written under the home.
pub const LOG_FILE_NAME: &str = "mimble.log";
/// Layout version written to new files.
pub const CONFIG_FILE_VERSION: u32 = 2;

const MIMBLE_HOME: &str = ".mimble";
const CHAIN_DIR: &str = "chain_data";

/// `~/.mimble/<chain>`, created when missing.
fn mimble_home(chain_type: &ChainTypes) -> Result<PathBuf, ConfigError> {
	let home = dirs::home_dir()
		.unwrap_or_default()
		.join(MIMBLE_HOME)
		.join(chain_type.shortname());
	fs::create_dir_all(&home)?;
	Ok(home)
}

fn path_str(path: &Path) -> Result<&str, ConfigError> {
	path.to_str()
		.ok_or_else(|| ConfigError::InvalidPath(path.display().to_string()))
}

/// Loads the configuration for a node. A `mimble.toml` in the working
/// directory is used when present. Otherwise the one in the chain's home
/// directory is, after writing it with the chain defaults if this is the
/// first run.
pub fn initial_setup(chain_type: &ChainTypes) -> Result<GlobalConfig, ConfigError> {
	let local = env::current_dir().map(|dir| dir.join(CONFIG_FILE_NAME));
	if let Ok(path) = local {
		if path.exists() {
			return GlobalConfig::new(path_str(&path)?);
		}
	}

	let home = mimble_home(chain_type)?;
	let path = home.join(CONFIG_FILE_NAME);
	if !path.exists() {
		let mut defaults = GlobalConfig::for_chain(chain_type);
		defaults.update_paths(&home)?;
		defaults.write_to_file(path_str(&path)?)?;
	}
	GlobalConfig::new(path_str(&path)?)
}

impl Default for ConfigMembers {
	fn default() -> ConfigMembers {
		ConfigMembers {
			config_file_version: Some(CONFIG_FILE_VERSION),
			chain: ChainConfig::default(),
			logging: Some(LoggingConfig::default()),
		}
	}
}

impl Default for GlobalConfig {
	fn default() -> GlobalConfig {
		GlobalConfig {
			config_file_path: None,
			members: Some(ConfigMembers::default()),
		}
	}
}

impl GlobalConfig {
	/// Defaults for the given chain type. Test chains keep their full
	/// blocks, they stay small.
	pub fn for_chain(chain_type: &ChainTypes) -> GlobalConfig {
		let mut config = GlobalConfig::default();
		if let Some(members) = config.members.as_mut() {
			members.chain.chain_type = *chain_type;
			members.chain.archive_mode = *chain_type != ChainTypes::Mainnet;
		}
		config
	}

	/// Reads the configuration file at `file_path`.
	pub fn new(file_path: &str) -> Result<GlobalConfig, ConfigError> {
		let path = PathBuf::from(file_path);
		if !path.exists() {
			return Err(ConfigError::NotFound(file_path.to_owned()));
		}
		let contents = fs::read_to_string(&path)?;
		let members = toml::from_str::<ConfigMembers>(&contents)
			.map_err(|e| ConfigError::ParseError(file_path.to_owned(), e.to_string()))?;
		Ok(GlobalConfig {
			config_file_path: Some(path),
			members: Some(members),
		})
	}

	/// Points the chain data directory and the log file under `home`.
	pub fn update_paths(&mut self, home: &Path) -> Result<(), ConfigError> {
		let db_root = path_str(&home.join(CHAIN_DIR))?.to_owned();
		let log_file = path_str(&home.join(LOG_FILE_NAME))?.to_owned();
		if let Some(members) = self.members.as_mut() {
			members.chain.db_root = db_root;
			if let Some(logging) = members.logging.as_mut() {
				logging.log_file_path = log_file;
			}
		}
		Ok(())
	}

	/// The `[chain]` section, defaults when nothing was loaded.
	pub fn chain_config(&self) -> ChainConfig {
		self.members
			.as_ref()
			.map(|m| m.chain.clone())
			.unwrap_or_default()
	}

	/// The `[logging]` section, if the file has one.
	pub fn logging_config(&self) -> Option<LoggingConfig> {
		self.members.as_ref().and_then(|m| m.logging.clone())
	}

	/// The configuration as TOML, without comments.
	pub fn ser_config(&self) -> Result<String, ConfigError> {
		let members = self
			.members
			.as_ref()
			.ok_or_else(|| ConfigError::Serialization("no config members".to_owned()))?;
		toml::to_string(members).map_err(|e| ConfigError::Serialization(e.to_string()))
	}

	/// Writes the configuration to `name`, each known key preceded by a
	/// comment explaining it.
	pub fn write_to_file(&self, name: &str) -> Result<(), ConfigError> {
		let contents = insert_comments(self.ser_config()?);
		fs::write(name, contents)?;
		Ok(())
	}
}
