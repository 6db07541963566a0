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

//! Logging setup shared by every crate of the workspace. Records from
//! third-party crates are dropped so only our own output reaches the
//! console and the log file.

use crate::types::{LogLevel, LoggingConfig};
use crate::Mutex;
use backtrace::Backtrace;
use log::{LevelFilter, Record};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;
use log4rs::filter::{Filter, Response};
use std::{panic, thread};

const PATTERN: &str = "{d(%Y%m%d %H:%M:%S%.3f)} {h({l})} {M} - {m}{n}";

#[derive(Default)]
struct LoggerState {
	installed: bool,
	log_file: Option<String>,
}

lazy_static! {
	static ref STATE: Mutex<LoggerState> = Mutex::new(LoggerState::default());
}

/// Lets through records emitted from our own crates only.
#[derive(Debug)]
struct OwnCratesFilter;

impl Filter for OwnCratesFilter {
	fn filter(&self, record: &Record<'_>) -> Response {
		match record.module_path() {
			Some(path) if path.starts_with("mimble") => Response::Neutral,
			_ => Response::Reject,
		}
	}
}

fn output(name: &str, level: LevelFilter, append: Box<dyn Append>) -> Appender {
	Appender::builder()
		.filter(Box::new(ThresholdFilter::new(level)))
		.filter(Box::new(OwnCratesFilter))
		.build(name, append)
}

fn console() -> Box<dyn Append> {
	Box::new(
		ConsoleAppender::builder()
			.encoder(Box::new(PatternEncoder::new(PATTERN)))
			.build(),
	)
}

/// A plain file appender, or a rolling one gzipping old files away when a
/// maximum size is configured.
fn log_file(c: &LoggingConfig) -> Result<Box<dyn Append>, String> {
	let path = &c.log_file_path;
	let encoder = Box::new(PatternEncoder::new(PATTERN));
	let cannot_open = |e: std::io::Error| format!("cannot open {}: {}", path, e);
	let append: Box<dyn Append> = match c.log_max_size {
		Some(max_size) => {
			let roller = FixedWindowRoller::builder()
				.build(&format!("{}.{{}}.gz", path), c.log_max_files)
				.map_err(|e| e.to_string())?;
			let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(max_size)), Box::new(roller));
			Box::new(
				RollingFileAppender::builder()
					.append(c.log_file_append)
					.encoder(encoder)
					.build(path, Box::new(policy))
					.map_err(cannot_open)?,
			)
		}
		None => Box::new(
			FileAppender::builder()
				.append(c.log_file_append)
				.encoder(encoder)
				.build(path)
				.map_err(cannot_open)?,
		),
	};
	Ok(append)
}

fn install(outputs: Vec<(&str, Appender)>, level: LevelFilter) -> Result<(), String> {
	let names = outputs.iter().map(|(name, _)| name.to_string());
	let root = Root::builder().appenders(names).build(level);
	let config = Config::builder()
		.appenders(outputs.into_iter().map(|(_, appender)| appender))
		.build(root)
		.map_err(|e| e.to_string())?;
	log4rs::init_config(config)
		.map(|_| ())
		.map_err(|e| e.to_string())
}

/// Installs the global logger described by `config` along with a panic
/// hook that reports panics through it. Without a config only the hook is
/// set up.
pub fn init_logger(config: Option<LoggingConfig>) {
	if let Some(c) = config {
		let mut state = STATE.lock();
		let mut outputs = vec![];
		if c.log_to_stdout {
			outputs.push(("stdout", output("stdout", c.stdout_log_level.into(), console())));
		}
		if c.log_to_file {
			match log_file(&c) {
				Ok(append) => {
					outputs.push(("file", output("file", c.file_log_level.into(), append)));
					state.log_file = Some(c.log_file_path.clone());
				}
				Err(e) => eprintln!("Logging to file disabled: {}", e),
			}
		}
		match install(outputs, c.max_level()) {
			Ok(()) => {
				state.installed = true;
				info!(
					"logging to stdout at {:?}, to file at {:?}",
					c.stdout_log_level, c.file_log_level
				);
			}
			Err(e) => eprintln!("Unable to initialize logging: {}", e),
		}
	}
	send_panic_to_log();
}

/// Debug level console logging for tests. Safe to call from every test,
/// only the first call installs anything.
pub fn init_test_logger() {
	let mut state = STATE.lock();
	if state.installed {
		return;
	}
	let level = LevelFilter::from(LogLevel::Debug);
	// another harness may already own the global logger
	let _ = install(vec![("stdout", output("stdout", level, console()))], level);
	state.installed = true;
}

fn send_panic_to_log() {
	panic::set_hook(Box::new(|info| {
		let backtrace = Backtrace::new();
		let thread = thread::current();
		let thread = thread.name().unwrap_or("unnamed");
		let payload = info.payload();
		let msg = payload
			.downcast_ref::<&str>()
			.copied()
			.or_else(|| payload.downcast_ref::<String>().map(|s| s.as_str()))
			.unwrap_or("Box<Any>");

		match info.location() {
			Some(at) => error!(
				"thread '{}' panicked at '{}': {}:{}\n{:?}",
				thread,
				msg,
				at.file(),
				at.line(),
				backtrace
			),
			None => error!("thread '{}' panicked at '{}'\n{:?}", thread, msg, backtrace),
		}

		eprintln!("Thread '{}' panicked with message:\n\"{}\"", thread, msg);
		// the panic may come from a thread holding the lock
		if let Some(state) = STATE.try_lock() {
			if let Some(path) = &state.log_file {
				eprintln!("See {} for further details.", path);
			}
		}
	}));
}
