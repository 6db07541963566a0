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

//! Logging configuration types

use log::LevelFilter;

/// Severity threshold for one of the log outputs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum LogLevel {
	/// Error
	Error,
	/// Warning
	Warning,
	/// Info
	Info,
	/// Debug
	Debug,
	/// Trace
	Trace,
}

impl From<LogLevel> for LevelFilter {
	fn from(level: LogLevel) -> LevelFilter {
		match level {
			LogLevel::Error => LevelFilter::Error,
			LogLevel::Warning => LevelFilter::Warn,
			LogLevel::Info => LevelFilter::Info,
			LogLevel::Debug => LevelFilter::Debug,
			LogLevel::Trace => LevelFilter::Trace,
		}
	}
}

/// Where log records go and how much of them. Missing fields in a config
/// file fall back to the values of `LoggingConfig::default()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
	/// whether to log to stdout
	pub log_to_stdout: bool,
	/// threshold for stdout
	pub stdout_log_level: LogLevel,
	/// whether to log to file
	pub log_to_file: bool,
	/// threshold for the log file
	pub file_log_level: LogLevel,
	/// log file path
	pub log_file_path: String,
	/// append to an existing log file instead of truncating it
	pub log_file_append: bool,
	/// roll the log file over once it grows past this many bytes
	pub log_max_size: Option<u64>,
	/// number of rolled files kept around
	pub log_max_files: u32,
}

impl Default for LoggingConfig {
	fn default() -> LoggingConfig {
		LoggingConfig {
			log_to_stdout: true,
			stdout_log_level: LogLevel::Warning,
			log_to_file: true,
			file_log_level: LogLevel::Info,
			log_file_path: "mimble.log".to_owned(),
			log_file_append: true,
			log_max_size: Some(16 * 1024 * 1024),
			log_max_files: 32,
		}
	}
}

impl LoggingConfig {
	/// The most verbose of the enabled outputs' levels, `Off` when nothing
	/// is enabled.
	pub fn max_level(&self) -> LevelFilter {
		let stdout = if self.log_to_stdout {
			self.stdout_log_level.into()
		} else {
			LevelFilter::Off
		};
		let file = if self.log_to_file {
			self.file_log_level.into()
		} else {
			LevelFilter::Off
		};
		stdout.max(file)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn level_filters() {
		assert_eq!(LevelFilter::from(LogLevel::Warning), LevelFilter::Warn);
		assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::Trace);
		assert!(LevelFilter::from(LogLevel::Debug) > LevelFilter::from(LogLevel::Info));
	}

	#[test]
	fn max_level_ignores_disabled_outputs() {
		let mut config = LoggingConfig::default();
		assert_eq!(config.max_level(), LevelFilter::Info);
		config.log_to_file = false;
		assert_eq!(config.max_level(), LevelFilter::Warn);
		config.log_to_stdout = false;
		assert_eq!(config.max_level(), LevelFilter::Off);
	}

	#[test]
	fn default_config() {
		let config = LoggingConfig::default();
		assert_eq!(config.log_file_path, "mimble.log");
		assert_eq!(config.stdout_log_level, LogLevel::Warning);
		assert_eq!(config.log_max_files, 32);
	}
}
