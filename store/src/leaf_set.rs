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

//! Which leaves of a prunable MMR are still live, kept as a roaring bitmap
//! of positions and saved next to the MMR files.

use std::fs;
use std::path::{Path, PathBuf};

use croaring::Bitmap;

use crate::core::core::hash::Hashed;
use crate::core::core::pmmr;
use crate::core::core::BlockHeader;
use crate::prune_list::PruneList;
use crate::{read_bitmap, save_via_temp_file};
use std::io::{self, Write};

/// Live leaf positions. Changes stay in memory until `flush`, and `discard`
/// goes back to what was last flushed.
pub struct LeafSet {
	path: PathBuf,
	bitmap: Bitmap,
	flushed: Bitmap,
}

impl LeafSet {
	/// Loads the leaf set at `path`, empty if there's no file yet.
	pub fn open<P: AsRef<Path>>(path: P) -> io::Result<LeafSet> {
		let path = path.as_ref().to_path_buf();
		let bitmap = if path.exists() {
			read_bitmap(&path)?
		} else {
			Bitmap::create()
		};
		if !bitmap.is_empty() {
			debug!("leaf_set: {} leaves loaded from {:?}", bitmap.cardinality(), path);
		}
		Ok(LeafSet {
			path,
			flushed: bitmap.clone(),
			bitmap,
		})
	}

	/// Puts a snapshot saved by `snapshot` in place of the leaf set file.
	/// Nothing happens when there's no snapshot.
	pub fn copy_snapshot<P: AsRef<Path>>(path: P, snapshot_path: P) -> io::Result<()> {
		let snapshot_path = snapshot_path.as_ref();
		if !snapshot_path.exists() {
			return Ok(());
		}
		debug!("leaf_set: restoring snapshot {:?}", snapshot_path);
		let mut bitmap = read_bitmap(snapshot_path)?;
		write_bitmap(path.as_ref(), &mut bitmap)
	}

	/// Leaves up to `cutoff_pos` that are gone for good: neither live nor
	/// brought back by `rewind_rm_pos`, and not already compacted away.
	pub fn removed_pre_cutoff(
		&self,
		cutoff_pos: u64,
		rewind_rm_pos: &Bitmap,
		prune_list: &PruneList,
	) -> Bitmap {
		let mut kept = self.bitmap.clone();
		kept.remove_range(cutoff_pos + 1..u32::MAX as u64);
		kept.or_inplace(rewind_rm_pos);

		(1..=cutoff_pos)
			.filter(|&pos| pmmr::is_leaf(pos) && !prune_list.is_pruned(pos))
			.map(|pos| pos as u32)
			.filter(|pos| !kept.contains(*pos))
			.collect()
	}

	/// Back to the state at `cutoff_pos`: later leaves go, and the leaves
	/// in `rewind_rm_pos` spent since come back.
	pub fn rewind(&mut self, cutoff_pos: u64, rewind_rm_pos: &Bitmap) {
		self.bitmap.remove_range(cutoff_pos + 1..u32::MAX as u64);
		for pos in rewind_rm_pos.iter().filter(|pos| u64::from(*pos) <= cutoff_pos) {
			self.bitmap.add(pos);
		}
	}

	/// Marks a leaf live.
	pub fn add(&mut self, pos: u64) {
		self.bitmap.add(pos as u32);
	}

	/// Marks a leaf spent.
	pub fn remove(&mut self, pos: u64) {
		self.bitmap.remove(pos as u32);
	}

	/// Saves the current leaves as `<path>.<header hash>`. A node importing
	/// our state can't rewind it, so it gets the leaves as of the header.
	pub fn snapshot(&self, header: &BlockHeader) -> io::Result<()> {
		let mut bitmap = self.bitmap.clone();
		let snapshot_path = format!("{}.{}", self.path.display(), header.hash());
		write_bitmap(Path::new(&snapshot_path), &mut bitmap)
	}

	/// Writes the leaves to disk.
	pub fn flush(&mut self) -> io::Result<()> {
		write_bitmap(&self.path, &mut self.bitmap)?;
		self.flushed = self.bitmap.clone();
		Ok(())
	}

	/// Drops changes made since the last flush.
	pub fn discard(&mut self) {
		self.bitmap = self.flushed.clone();
	}

	/// Whether the leaf at `pos` is live.
	pub fn includes(&self, pos: u64) -> bool {
		self.bitmap.contains(pos as u32)
	}

	/// Number of live leaves.
	pub fn len(&self) -> usize {
		self.bitmap.cardinality() as usize
	}

	/// No live leaves at all.
	pub fn is_empty(&self) -> bool {
		self.bitmap.is_empty()
	}

	/// Live leaf positions in increasing order.
	pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
		self.bitmap.iter().map(u64::from)
	}
}

fn write_bitmap(path: &Path, bitmap: &mut Bitmap) -> io::Result<()> {
	bitmap.run_optimize();
	let bytes = bitmap.serialize();
	if let Some(dir) = path.parent() {
		fs::create_dir_all(dir)?;
	}
	save_via_temp_file(path, ".tmp", |file| file.write_all(&bytes))
}
