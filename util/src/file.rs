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

//! Filesystem helpers for moving whole state directories around.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

fn other_err<E>(e: E) -> io::Error
where
	E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
	io::Error::new(io::ErrorKind::Other, e)
}

/// Removes a file or a whole directory. Nothing there is fine.
pub fn delete<P: AsRef<Path>>(path: P) -> io::Result<()> {
	let path = path.as_ref();
	match fs::symlink_metadata(path) {
		Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
		Ok(_) => fs::remove_file(path),
		Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e),
	}
}

/// Copies everything under `src` into `dst`, creating it if needed, and
/// returns the number of bytes copied. Only plain files and directories
/// can be copied.
pub fn copy_dir_to(src: &Path, dst: &Path) -> io::Result<u64> {
	let mut copied = 0;
	for entry in WalkDir::new(src) {
		let entry = entry.map_err(other_err)?;
		let target = dst.join(entry.path().strip_prefix(src).map_err(other_err)?);
		let kind = entry.file_type();
		if kind.is_dir() {
			fs::create_dir_all(&target)?;
		} else if kind.is_file() {
			copied += fs::copy(entry.path(), &target)?;
		} else {
			return Err(other_err(format!(
				"cannot copy {}",
				entry.path().display()
			)));
		}
	}
	Ok(copied)
}
