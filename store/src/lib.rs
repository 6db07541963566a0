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

//! Storage of core types using LMDB, along with the flat files backing the
//! persistent MMRs.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;
use mimble_core as core;
use mimble_util as util;

pub mod leaf_set;
pub mod lmdb;
pub mod pmmr;
pub mod prune_list;
pub mod types;

const SEP: u8 = b':';

use byteorder::{BigEndian, WriteBytesExt};
use croaring::Bitmap;
use std::fs::{self, File};
use std::io;
use std::path::Path;

pub use crate::lmdb::*;

/// Db key made of a one byte prefix, a separator and an identifier.
pub fn to_key(prefix: u8, k: &[u8]) -> Vec<u8> {
	let mut key = Vec::with_capacity(k.len() + 2);
	key.extend_from_slice(&[prefix, SEP]);
	key.extend_from_slice(k);
	key
}

/// Db key for a numeric identifier, big endian so keys sort by value.
pub fn u64_to_key(prefix: u8, val: u64) -> Vec<u8> {
	let mut key = to_key(prefix, &[]);
	// writing to a vec can't fail
	let _ = key.write_u64::<BigEndian>(val);
	key
}

/// Replaces the file at `path` with what `writer` produces, going through
/// `path` + `temp_suffix` so a crash never leaves a half written file.
pub fn save_via_temp_file<F, P, E>(path: P, temp_suffix: E, mut writer: F) -> io::Result<()>
where
	F: FnMut(&mut File) -> io::Result<()>,
	P: AsRef<Path>,
	E: AsRef<std::ffi::OsStr>,
{
	let path = path.as_ref();
	let mut temp = path.as_os_str().to_os_string();
	temp.push(temp_suffix.as_ref());

	let mut file = File::create(&temp)?;
	writer(&mut file)?;
	file.sync_all()?;
	drop(file);

	// rename only replaces an existing file on unix
	if cfg!(windows) && path.exists() {
		fs::remove_file(path)?;
	}
	fs::rename(&temp, path)
}

/// Loads a serialized bitmap.
pub fn read_bitmap<P: AsRef<Path>>(path: P) -> io::Result<Bitmap> {
	Ok(Bitmap::deserialize(&fs::read(path)?))
}
