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

//! Roots of the pruned subtrees of an MMR.
//!
//! Once every leaf under a node is gone, the backend drops the whole subtree
//! except its root. Reading the compacted hash and data files then needs the
//! number of hashes (and leaves) compacted away before a given position,
//! which this list keeps precomputed.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use croaring::Bitmap;

use crate::core::core::pmmr::{self, bintree_postorder_height, family};
use crate::{read_bitmap, save_via_temp_file};

/// Pruned subtree roots (1-indexed MMR positions), optionally backed by a
/// bitmap file, with cumulative shifts cached per root.
pub struct PruneList {
	path: Option<PathBuf>,
	roots: Bitmap,
	// (hash shift, leaf shift) accumulated up to and including each root.
	// Only rebuilt on open and flush.
	shifts: Vec<(u64, u64)>,
}

impl PruneList {
	/// Prune list over the provided roots, saved to `path` on flush if any.
	pub fn new(path: Option<PathBuf>, mut roots: Bitmap) -> PruneList {
		roots.remove(0);
		let mut list = PruneList {
			path,
			roots,
			shifts: vec![],
		};
		list.rebuild_shifts();
		list
	}

	/// In-memory prune list with nothing pruned.
	pub fn empty() -> PruneList {
		PruneList::new(None, Bitmap::create())
	}

	/// Loads the prune list saved at `path`, empty if there is no file yet.
	pub fn open<P: AsRef<Path>>(path: P) -> io::Result<PruneList> {
		let path = path.as_ref().to_path_buf();
		let roots = if path.exists() {
			read_bitmap(&path)?
		} else {
			Bitmap::create()
		};
		let list = PruneList::new(Some(path), roots);
		if !list.is_empty() {
			debug!(
				"prune_list: {} roots loaded, {} hashes compacted",
				list.len(),
				list.get_total_shift(),
			);
		}
		Ok(list)
	}

	fn rebuild_shifts(&mut self) {
		let mut shift = 0;
		let mut leaf_shift = 0;
		self.shifts.clear();
		for root in self.roots.iter() {
			let height = bintree_postorder_height(root as u64);
			// the root itself stays, everything below it goes
			shift += 2 * ((1 << height) - 1);
			if height > 0 {
				leaf_shift += 1 << height;
			}
			self.shifts.push((shift, leaf_shift));
		}
	}

	/// Writes the roots to disk (if file backed) and refreshes the shifts.
	pub fn flush(&mut self) -> io::Result<()> {
		self.roots.run_optimize();
		if let Some(ref path) = self.path {
			let bytes = self.roots.serialize();
			save_via_temp_file(path, ".tmp", |file| file.write_all(&bytes))?;
		}
		self.rebuild_shifts();
		Ok(())
	}

	// Cached shifts for the roots at or before pos.
	fn shifts_at(&self, pos: u64) -> (u64, u64) {
		let count = self.roots.rank(pos as u32) as usize;
		if count == 0 || self.shifts.is_empty() {
			return (0, 0);
		}
		self.shifts[count.min(self.shifts.len()) - 1]
	}

	/// Hashes compacted away before `pos` in the hash file. A pruned
	/// position may itself be gone, callers have to check.
	pub fn get_shift(&self, pos: u64) -> u64 {
		self.shifts_at(pos).0
	}

	/// Leaves compacted away before `pos` in the data file.
	pub fn get_leaf_shift(&self, pos: u64) -> u64 {
		self.shifts_at(pos).1
	}

	/// Hashes compacted away overall, offsets the next append.
	pub fn get_total_shift(&self) -> u64 {
		self.get_shift(self.roots.maximum().unwrap_or(0) as u64)
	}

	/// Leaves compacted away overall.
	pub fn get_total_leaf_shift(&self) -> u64 {
		self.get_leaf_shift(self.roots.maximum().unwrap_or(0) as u64)
	}

	/// Marks `pos` as pruned, folding it into its parent for as long as the
	/// sibling subtree is already pruned.
	pub fn add(&mut self, pos: u64) {
		assert!(pos > 0, "prune list positions start at 1");
		if self.is_pruned(pos) {
			return;
		}
		let mut root = pos;
		loop {
			let (parent, sibling) = family(root);
			if !self.is_pruned_root(sibling) {
				break;
			}
			root = parent;
		}
		self.roots.remove_range(pmmr::bintree_range(root));
		self.roots.add(root as u32);
	}

	/// Number of pruned roots.
	pub fn len(&self) -> u64 {
		self.roots.cardinality()
	}

	/// Whether nothing is pruned.
	pub fn is_empty(&self) -> bool {
		self.roots.is_empty()
	}

	/// Whether `pos` is a pruned root or sits under one.
	pub fn is_pruned(&self, pos: u64) -> bool {
		if self.is_pruned_root(pos) {
			return true;
		}
		// the first root after pos is the only one that can cover it
		let after = self.roots.rank(pos as u32) as u32;
		match self.roots.select(after) {
			Some(root) => pmmr::bintree_range(root as u64).contains(&pos),
			None => false,
		}
	}

	/// Whether `pos` is the root of a pruned subtree.
	pub fn is_pruned_root(&self, pos: u64) -> bool {
		assert!(pos > 0, "prune list positions start at 1");
		self.roots.contains(pos as u32)
	}

	/// Pruned roots in increasing order.
	pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
		self.roots.iter().map(u64::from)
	}
}
