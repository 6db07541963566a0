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

//! Explanatory comments written above the keys of a generated config file.

const HEADER: &str = "
# Configuration of a mimble chain node.
#
# Without an explicit config file the node looks for one in the working
# directory first, then in [user home]/.mimble/[chain type].
#
";

const SECTION_RULE: &str = "#########################################";

fn section(title: &str) -> String {
	format!("\n{rule}\n### {:<34}###\n{rule}\n", title, rule = SECTION_RULE)
}

/// Comment for a `key = value` line or a `[section]` header.
fn comment_for(key: &str) -> Option<String> {
	let text = match key {
		"config_file_version" => return Some(HEADER.to_owned()),
		"[chain]" => return Some(section("CHAIN CONFIGURATION")),
		"[logging]" => return Some(section("LOGGING CONFIGURATION")),
		"db_root" => "the directory in which the chain database and the txhashset are stored",
		"chain_type" => {
			"network parameters to run with, sets coinbase maturity and the\n\
			 #compaction horizon: AutomatedTesting, UserTesting or Mainnet"
		}
		"archive_mode" => "whether to keep full blocks below the horizon when compacting",
		"log_to_stdout" => "whether to log to stdout",
		"stdout_log_level" => "log level for stdout: Error, Warning, Info, Debug, Trace",
		"log_to_file" => "whether to log to a file",
		"file_log_level" => "log level for file: Error, Warning, Info, Debug, Trace",
		"log_file_path" => "log file path",
		"log_file_append" => "append to the log file (true) or truncate it on every run (false)",
		"log_max_size" => "roll the log file over past this many bytes, remove to never roll",
		"log_max_files" => "number of rolled log files to keep",
		_ => return None,
	};
	Some(format!("\n#{}\n", text))
}

/// The key a TOML line defines, the whole line for section headers.
fn line_key(line: &str) -> &str {
	let line = line.trim();
	if line.starts_with('[') {
		line
	} else {
		line.split('=').next().unwrap_or_default().trim()
	}
}

/// Prepends the known keys of a serialized config with their comment.
pub fn insert_comments(orig: String) -> String {
	let mut out = String::with_capacity(orig.len() * 2);
	for line in orig.split('\n') {
		if let Some(comment) = comment_for(line_key(line)) {
			out.push_str(&comment);
		}
		out.push_str(line);
		out.push('\n');
	}
	out
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn comments_precede_keys() {
		let out = insert_comments("[chain]\ndb_root = \"x\"\nunknown = 1".to_owned());
		let db_root = out.find("db_root =").unwrap();
		let comment = out.find("#the directory in which").unwrap();
		assert!(comment < db_root);
		assert!(out.contains("### CHAIN CONFIGURATION"));
		assert!(out.contains("unknown = 1\n"));
	}

	#[test]
	fn section_banner_is_aligned() {
		let banner = section("LOGGING CONFIGURATION");
		let lines: Vec<&str> = banner.trim().lines().collect();
		assert_eq!(lines.len(), 3);
		assert_eq!(lines[0].len(), lines[1].len());
	}

	#[test]
	fn values_containing_equals() {
		assert_eq!(line_key("log_file_path = \"a=b.log\""), "log_file_path");
		assert_eq!(line_key("[logging]"), "[logging]");
		assert_eq!(line_key(""), "");
	}
}
