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

//! Flat files backing the persistent MMRs.

use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::core::ser::{self, BinReader, BinWriter, Readable, Reader, Writeable, Writer};

/// Where a variable sized element sits in its data file.
#[derive(Clone, Debug)]
pub struct SizeEntry {
	/// Byte offset in the data file
	pub offset: u64,
	/// Length in bytes
	pub size: u16,
}

impl SizeEntry {
	/// Serialized length of an entry
	pub const LEN: u16 = 10;

	fn end(&self) -> u64 {
		self.offset + u64::from(self.size)
	}
}

impl Readable for SizeEntry {
	fn read<R: Reader>(reader: &mut R) -> Result<SizeEntry, ser::Error> {
		let offset = reader.read_u64()?;
		let size = reader.read_u16()?;
		Ok(SizeEntry { offset, size })
	}
}

impl Writeable for SizeEntry {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.offset)?;
		writer.write_u16(self.size)
	}
}

/// How element boundaries are found in a data file.
pub enum SizeInfo {
	/// Every element takes this many bytes
	FixedSize(u16),
	/// Elements vary, their offsets live in a companion size file
	VariableSize(Box<AppendOnlyFile<SizeEntry>>),
}

fn ser_err(e: ser::Error) -> io::Error {
	io::Error::new(io::ErrorKind::Other, e)
}

// mmap refuses empty files
fn map(file: &File) -> io::Result<Option<memmap::Mmap>> {
	if file.metadata()?.len() == 0 {
		Ok(None)
	} else {
		Ok(Some(unsafe { memmap::Mmap::map(file)? }))
	}
}

// bytes[offset..offset + len], empty when out of range
fn slice_at(bytes: &[u8], offset: u64, len: u16) -> &[u8] {
	let start = offset as usize;
	bytes.get(start..start + usize::from(len)).unwrap_or(&[])
}

/// Typed view over an `AppendOnlyFile`, with 1-indexed positions.
pub struct DataFile<T> {
	file: AppendOnlyFile<T>,
}

impl<T> DataFile<T>
where
	T: Readable + Writeable + Debug,
{
	/// Opens (or creates) the file at `path`.
	pub fn open<P: AsRef<Path>>(path: P, size_info: SizeInfo) -> io::Result<DataFile<T>> {
		Ok(DataFile {
			file: AppendOnlyFile::open(path, size_info)?,
		})
	}

	/// Buffers `data` until the next flush and returns the new size.
	pub fn append(&mut self, data: &T) -> io::Result<u64> {
		self.file.push(data)?;
		Ok(self.size_unsync())
	}

	/// Element at `position`, already adjusted for anything compacted away.
	pub fn read(&self, position: u64) -> Option<T> {
		let idx = position.checked_sub(1)?;
		self.file.read_elmt(idx).ok()
	}

	/// Drops everything after `position`.
	pub fn rewind(&mut self, position: u64) -> io::Result<()> {
		self.file.rewind(position)
	}

	/// Writes buffered changes to disk.
	pub fn flush(&mut self) -> io::Result<()> {
		self.file.flush()
	}

	/// Forgets buffered changes.
	pub fn discard(&mut self) {
		self.file.discard()
	}

	/// Elements on disk.
	pub fn size(&self) -> u64 {
		self.file.len_on_disk().unwrap_or(0)
	}

	/// Elements including buffered ones.
	pub fn size_unsync(&self) -> u64 {
		self.file.len_unsync().unwrap_or(0)
	}

	/// Closes the underlying file and mapping.
	pub fn release(&mut self) {
		self.file.release();
	}

	/// Rewrites the file without the elements at the sorted `prune_pos`.
	pub fn save_prune(&mut self, prune_pos: &[u64]) -> io::Result<()> {
		let skip: Vec<u64> = prune_pos.iter().map(|pos| pos - 1).collect();
		self.file.rewrite_without(&skip)
	}
}

/// File read anywhere through a memory map but only ever appended to.
///
/// Appends stay in memory until `flush`. A rewind below what is on disk
/// truncates the file on the next flush, `discard` undoes both. Pruning
/// rewrites the whole file.
pub struct AppendOnlyFile<T> {
	path: PathBuf,
	size_info: SizeInfo,
	mmap: Option<memmap::Mmap>,
	// bytes appended since the last flush
	pending: Vec<u8>,
	// number of elements before `pending`
	pending_from: u64,
	// elements on disk before a rewind below them, restored by discard
	flushed_before_rewind: Option<u64>,
	_marker: PhantomData<T>,
}

impl AppendOnlyFile<SizeEntry> {
	// Data bytes covered by the flushed entries.
	fn covered_bytes(&self) -> io::Result<u64> {
		match self.pending_from.checked_sub(1) {
			Some(last) => self.read_elmt(last).map(|entry| entry.end()),
			None => Ok(0),
		}
	}
}

impl<T> AppendOnlyFile<T>
where
	T: Debug + Readable + Writeable,
{
	/// Opens (or creates) the file at `path`. The size file of variable
	/// sized data is rebuilt when it doesn't match the data file, as when
	/// the data file was restored on its own.
	pub fn open<P: AsRef<Path>>(path: P, size_info: SizeInfo) -> io::Result<AppendOnlyFile<T>> {
		let mut aof = AppendOnlyFile {
			path: path.as_ref().to_path_buf(),
			size_info,
			mmap: None,
			pending: vec![],
			pending_from: 0,
			flushed_before_rewind: None,
			_marker: PhantomData,
		};
		aof.reopen()?;

		let data_len = aof.size()?;
		let stale_sizes = match aof.size_info {
			SizeInfo::VariableSize(ref sizes) => sizes.covered_bytes()? != data_len,
			SizeInfo::FixedSize(_) => false,
		};
		if stale_sizes {
			aof.rebuild_sizes()?;
			aof.reopen()?;
		}
		Ok(aof)
	}

	fn reopen(&mut self) -> io::Result<()> {
		if let SizeInfo::VariableSize(ref mut sizes) = self.size_info {
			sizes.reopen()?;
		}
		let file = OpenOptions::new()
			.read(true)
			.append(true)
			.create(true)
			.open(&self.path)?;
		self.mmap = map(&file)?;
		self.pending_from = if self.mmap.is_some() {
			self.len_on_disk()?
		} else {
			0
		};
		Ok(())
	}

	fn len_on_disk(&self) -> io::Result<u64> {
		match self.size_info {
			SizeInfo::FixedSize(size) => Ok(self.size()? / u64::from(size)),
			SizeInfo::VariableSize(ref sizes) => sizes.len_on_disk(),
		}
	}

	fn len_unsync(&self) -> io::Result<u64> {
		match self.size_info {
			SizeInfo::FixedSize(size) => {
				Ok(self.pending_from + self.pending.len() as u64 / u64::from(size))
			}
			SizeInfo::VariableSize(ref sizes) => sizes.len_unsync(),
		}
	}

	// Byte offset and length of the element at idx.
	fn span(&self, idx: u64) -> io::Result<(u64, u16)> {
		match self.size_info {
			SizeInfo::FixedSize(size) => Ok((idx * u64::from(size), size)),
			SizeInfo::VariableSize(ref sizes) => {
				sizes.read_elmt(idx).map(|entry| (entry.offset, entry.size))
			}
		}
	}

	fn push(&mut self, elmt: &T) -> io::Result<()> {
		let bytes = ser::ser_vec(elmt).map_err(ser_err)?;
		if let SizeInfo::VariableSize(ref mut sizes) = self.size_info {
			let offset = match sizes.len_unsync()?.checked_sub(1) {
				Some(last) => sizes.read_elmt(last)?.end(),
				None => 0,
			};
			sizes.push(&SizeEntry {
				offset,
				size: bytes.len() as u16,
			})?;
		}
		self.pending.extend_from_slice(&bytes);
		Ok(())
	}

	fn rewind(&mut self, idx: u64) -> io::Result<()> {
		if idx >= self.len_unsync()? {
			return Ok(());
		}
		if idx >= self.pending_from {
			let (start, _) = self.span(self.pending_from)?;
			let (cut, _) = self.span(idx)?;
			self.pending.truncate(cut.saturating_sub(start) as usize);
		} else {
			if self.flushed_before_rewind.is_none() {
				self.flushed_before_rewind = Some(self.pending_from);
			}
			self.pending.clear();
			self.pending_from = idx;
		}
		if let SizeInfo::VariableSize(ref mut sizes) = self.size_info {
			sizes.rewind(idx)?;
		}
		Ok(())
	}

	fn flush(&mut self) -> io::Result<()> {
		// truncating below reads the size entries we keep
		if let SizeInfo::VariableSize(ref mut sizes) = self.size_info {
			sizes.flush()?;
		}

		// unmapped first, windows won't resize a mapped file
		self.mmap = None;
		if self.flushed_before_rewind.take().is_some() {
			let keep = match self.pending_from.checked_sub(1) {
				Some(last) => {
					let (offset, size) = self.span(last)?;
					offset + u64::from(size)
				}
				None => 0,
			};
			OpenOptions::new()
				.write(true)
				.create(true)
				.open(&self.path)?
				.set_len(keep)?;
		}

		let mut file = OpenOptions::new()
			.read(true)
			.append(true)
			.create(true)
			.open(&self.path)?;
		file.write_all(&self.pending)?;
		file.sync_all()?;
		self.pending.clear();

		self.pending_from = self.len_on_disk()?;
		self.mmap = map(&file)?;
		Ok(())
	}

	fn discard(&mut self) {
		if let Some(flushed) = self.flushed_before_rewind.take() {
			self.pending_from = flushed;
		}
		if let SizeInfo::VariableSize(ref mut sizes) = self.size_info {
			sizes.discard();
		}
		self.pending.clear();
	}

	// Bytes of the element at idx, empty past the end.
	fn read(&self, idx: u64) -> io::Result<&[u8]> {
		if idx >= self.len_unsync()? {
			return Ok(&[]);
		}
		let (offset, size) = self.span(idx)?;
		if idx < self.pending_from {
			Ok(match self.mmap {
				Some(ref mmap) => slice_at(&mmap[..], offset, size),
				None => &[],
			})
		} else {
			let (start, _) = self.span(self.pending_from)?;
			Ok(slice_at(&self.pending, offset.saturating_sub(start), size))
		}
	}

	fn read_elmt(&self, idx: u64) -> io::Result<T> {
		let mut bytes = self.read(idx)?;
		ser::deserialize(&mut bytes).map_err(ser_err)
	}

	// Rewrites the flushed file without the elements at the sorted,
	// 0-indexed positions in skip.
	fn rewrite_without(&mut self, skip: &[u64]) -> io::Result<()> {
		let tmp_path = self.path.with_extension("tmp");
		{
			let mut input = BufReader::new(File::open(&self.path)?);
			let mut reader = BinReader::new(&mut input);
			let mut output = BufWriter::new(File::create(&tmp_path)?);
			let mut writer = BinWriter::new(&mut output);

			let mut skip = skip.iter().peekable();
			let mut idx = 0;
			while let Ok(elmt) = T::read(&mut reader) {
				if skip.peek() == Some(&&idx) {
					skip.next();
				} else {
					elmt.write(&mut writer).map_err(ser_err)?;
				}
				idx += 1;
			}
			output.flush()?;
		}
		self.replace_with(&tmp_path)?;
		self.rebuild_sizes()?;
		self.reopen()
	}

	// Recomputes the size file, if any, from the data file.
	fn rebuild_sizes(&mut self) -> io::Result<()> {
		let sizes = match self.size_info {
			SizeInfo::VariableSize(ref mut sizes) => sizes,
			SizeInfo::FixedSize(_) => return Ok(()),
		};
		let tmp_path = sizes.path.with_extension("tmp");
		debug!("rebuilding size file {:?}", sizes.path);
		{
			let mut input = BufReader::new(File::open(&self.path)?);
			let mut reader = BinReader::new(&mut input);
			let mut output = BufWriter::new(File::create(&tmp_path)?);
			let mut writer = BinWriter::new(&mut output);

			let mut offset = 0;
			while T::read(&mut reader).is_ok() {
				let size = (reader.bytes_read() - offset) as u16;
				SizeEntry { offset, size }
					.write(&mut writer)
					.map_err(ser_err)?;
				offset += u64::from(size);
			}
			output.flush()?;
		}
		sizes.replace_with(&tmp_path)
	}

	fn replace_with(&mut self, other: &Path) -> io::Result<()> {
		self.release();
		fs::remove_file(&self.path)?;
		fs::rename(other, &self.path)
	}

	/// Unmaps the file, here and in the size file.
	pub fn release(&mut self) {
		self.mmap = None;
		if let SizeInfo::VariableSize(ref mut sizes) = self.size_info {
			sizes.release();
		}
	}

	/// Size on disk in bytes.
	pub fn size(&self) -> io::Result<u64> {
		fs::metadata(&self.path).map(|md| md.len())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::core::RangeProof;

	fn open(dir: &Path) -> DataFile<u64> {
		DataFile::open(dir.join("data.bin"), SizeInfo::FixedSize(8)).unwrap()
	}

	fn open_variable(dir: &Path) -> DataFile<RangeProof> {
		let sizes = AppendOnlyFile::open(
			dir.join("size.bin"),
			SizeInfo::FixedSize(SizeEntry::LEN),
		)
		.unwrap();
		DataFile::open(dir.join("data.bin"), SizeInfo::VariableSize(Box::new(sizes))).unwrap()
	}

	#[test]
	fn rewind_within_and_below_buffer() {
		let dir = tempfile::tempdir().unwrap();
		let mut file = open(dir.path());
		for x in 1..=4u64 {
			file.append(&x).unwrap();
		}
		file.flush().unwrap();

		file.append(&5).unwrap();
		file.append(&6).unwrap();
		file.rewind(5).unwrap();
		assert_eq!(file.size_unsync(), 5);
		assert_eq!(file.read(5), Some(5));
		assert_eq!(file.read(6), None);

		// below the flushed size, nothing on disk changes until flush
		file.rewind(2).unwrap();
		assert_eq!(file.size_unsync(), 2);
		assert_eq!(file.size(), 4);
		file.discard();
		assert_eq!(file.size_unsync(), 4);
		assert_eq!(file.read(4), Some(4));

		file.rewind(2).unwrap();
		file.append(&7).unwrap();
		file.flush().unwrap();
		assert_eq!(file.size(), 3);
		assert_eq!(file.read(3), Some(7));

		file.release();
		let file = open(dir.path());
		assert_eq!(file.size(), 3);
		assert_eq!(file.read(2), Some(2));
	}

	#[test]
	fn save_prune_skips_positions() {
		let dir = tempfile::tempdir().unwrap();
		let mut file = open(dir.path());
		for x in 1..=5u64 {
			file.append(&x).unwrap();
		}
		file.flush().unwrap();
		file.save_prune(&[2, 4]).unwrap();
		assert_eq!(file.size(), 3);
		assert_eq!(file.read(1), Some(1));
		assert_eq!(file.read(2), Some(3));
		assert_eq!(file.read(3), Some(5));
	}

	#[test]
	fn variable_size_entries() {
		let dir = tempfile::tempdir().unwrap();
		let proofs: Vec<RangeProof> = (1..=3u8)
			.map(|n| RangeProof::from_vec(vec![n; n as usize * 3]))
			.collect();
		{
			let mut file = open_variable(dir.path());
			for proof in &proofs {
				file.append(proof).unwrap();
			}
			assert_eq!(file.read(2), Some(proofs[1].clone()));
			file.flush().unwrap();
			file.rewind(2).unwrap();
			file.flush().unwrap();
			assert_eq!(file.size(), 2);
			assert_eq!(file.read(3), None);
			file.release();
		}

		// a lost size file is rebuilt from the data
		fs::remove_file(dir.path().join("size.bin")).unwrap();
		let mut file = open_variable(dir.path());
		assert_eq!(file.size(), 2);
		assert_eq!(file.read(1), Some(proofs[0].clone()));
		assert_eq!(file.read(2), Some(proofs[1].clone()));

		file.append(&proofs[2]).unwrap();
		file.flush().unwrap();
		file.save_prune(&[1]).unwrap();
		assert_eq!(file.size(), 2);
		assert_eq!(file.read(1), Some(proofs[1].clone()));
		assert_eq!(file.read(2), Some(proofs[2].clone()));
	}
}
