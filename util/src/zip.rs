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

//! Zip archives of state directories.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use ::zip::result::{ZipError, ZipResult};
use ::zip::write::FileOptions;
use ::zip::{CompressionMethod, ZipArchive, ZipWriter};
use walkdir::WalkDir;

/// Archives every regular file under `src_dir` into `dst_file`, stored
/// without compression and with 644 permissions. Entry names are relative
/// to `src_dir`.
pub fn compress(src_dir: &Path, dst_file: &File) -> ZipResult<()> {
	if !src_dir.is_dir() {
		return Err(ZipError::Io(io::Error::new(
			io::ErrorKind::NotFound,
			format!("{} is not a directory", src_dir.display()),
		)));
	}

	let options = FileOptions::default()
		.compression_method(CompressionMethod::Stored)
		.unix_permissions(0o644);
	let mut writer = ZipWriter::new(dst_file);

	let files = WalkDir::new(src_dir)
		.into_iter()
		.filter_map(Result::ok)
		.filter(|e| e.file_type().is_file());
	for entry in files {
		let name = match entry.path().strip_prefix(src_dir).ok().and_then(Path::to_str) {
			Some(name) => name.to_owned(),
			None => {
				warn!("zip: skipping {:?}, not a utf8 path", entry.path());
				continue;
			}
		};
		writer.start_file(name, options)?;
		io::copy(&mut File::open(entry.path())?, &mut writer)?;
	}

	writer.finish()?;
	dst_file.sync_all()?;
	Ok(())
}

/// Extracts the entries of `src_file` accepted by `expected` under `dest`
/// and returns how many files were written. Entries whose name changes
/// once sanitized are skipped.
pub fn decompress<R, F>(src_file: R, dest: &Path, expected: F) -> ZipResult<usize>
where
	R: io::Read + io::Seek,
	F: Fn(&Path) -> bool,
{
	let mut archive = ZipArchive::new(src_file)?;
	let mut written = 0;

	for i in 0..archive.len() {
		let mut entry = archive.by_index(i)?;
		let name = entry.sanitized_name();
		if name.to_str() != Some(entry.name()) || !expected(&name) {
			info!("zip: ignoring entry {}", entry.name());
			continue;
		}

		let target = dest.join(&name);
		if entry.name().ends_with('/') {
			fs::create_dir_all(&target)?;
		} else {
			if let Some(parent) = target.parent() {
				fs::create_dir_all(parent)?;
			}
			io::copy(&mut entry, &mut File::create(&target)?)?;
			written += 1;
		}

		#[cfg(unix)]
		set_mode(&target, entry.unix_mode())?;
	}
	Ok(written)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
	use std::os::unix::fs::PermissionsExt;
	match mode {
		Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode)),
		None => Ok(()),
	}
}
