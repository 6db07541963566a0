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

//! Types making up the configuration file, and its errors.

use std::io;
use std::path::PathBuf;

use crate::core::global::ChainTypes;
use crate::util::LoggingConfig;

/// Failure to locate, read, parse or write a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// The file at the given path is not valid TOML for our sections
	#[error("Error parsing configuration file at {0} - {1}")]
	ParseError(String, String),
	/// Reading or writing the file failed
	#[error("Configuration file IO error: {0}")]
	Io(#[from] io::Error),
	/// No file at the given path
	#[error("Configuration file not found: {0}")]
	NotFound(String),
	/// The sections could not be turned back into TOML
	#[error("Error serializing configuration: {0}")]
	Serialization(String),
	/// A path that is not valid UTF-8 and can't be written to the file
	#[error("Invalid path: {0}")]
	InvalidPath(String),
}

/// The `[chain]` section.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChainConfig {
	/// Directory holding the chain database and the txhashset
	pub db_root: String,
	/// Network whose parameters apply, see `ChainTypes`
	pub chain_type: ChainTypes,
	/// Keep full blocks when compacting
	pub archive_mode: bool,
}

impl Default for ChainConfig {
	fn default() -> ChainConfig {
		ChainConfig {
			db_root: "chain_data".to_owned(),
			chain_type: ChainTypes::default(),
			archive_mode: false,
		}
	}
}

/// A configuration along with the file it came from, if any.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
	/// File the members were read from
	pub config_file_path: Option<PathBuf>,
	/// Parsed sections, `None` only when built by hand without any
	pub members: Option<ConfigMembers>,
}

/// Everything serialized to and from the file, one field per section.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfigMembers {
	/// Layout version of the file, absent in the first layout
	#[serde(default)]
	pub config_file_version: Option<u32>,
	/// Chain section
	#[serde(default)]
	pub chain: ChainConfig,
	/// Logging is left uninitialized when the section is missing
	pub logging: Option<LoggingConfig>,
}
