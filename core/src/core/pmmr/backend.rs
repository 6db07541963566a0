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

use croaring::Bitmap;

use crate::core::hash::Hash;
use crate::core::BlockHeader;
use crate::ser::PMMRable;

/// Where an MMR keeps its nodes. Positions are MMR positions, writes stay
/// pending until `sync` and `discard` drops them.
///
/// Removing a leaf only has to hide it from `get_hash` and `get_data`, the
/// stored hash stays readable through `get_from_file` as parents and proofs
/// still need it.
pub trait Backend<T: PMMRable> {
	/// Appends a leaf along with its hash and the hashes of the parents it
	/// completes, leaf hash first.
	fn append(&mut self, data: &T, hashes: &[Hash]) -> Result<(), String>;

	/// Truncates to `position` and restores the leaves in `rewind_rm_pos`
	/// removed since.
	fn rewind(&mut self, position: u64, rewind_rm_pos: &Bitmap) -> Result<(), String>;

	/// Hash at position, None once removed.
	fn get_hash(&self, position: u64) -> Option<Hash>;

	/// Leaf data at position, None once removed.
	fn get_data(&self, position: u64) -> Option<T::E>;

	/// Hash at position whether removed or not.
	fn get_from_file(&self, position: u64) -> Option<Hash>;

	/// Hash of a peak. Peaks are never compacted away so a backend can take
	/// a shortcut here.
	fn get_peak_from_file(&self, position: u64) -> Option<Hash> {
		self.get_from_file(position)
	}

	/// Leaf data at position whether removed or not.
	fn get_data_from_file(&self, position: u64) -> Option<T::E>;

	/// Removes the leaf at position.
	fn remove(&mut self, position: u64) -> Result<(), String>;

	/// Positions of the leaves not removed.
	fn leaf_pos_iter(&self) -> Box<dyn Iterator<Item = u64> + '_>;

	/// Count of the leaves not removed.
	fn n_unpruned_leaves(&self) -> u64;

	/// Closes any open files.
	fn release_files(&mut self);

	/// Keeps a copy of the leaf set as of `header`, for a snapshot of the
	/// chain state at that block.
	fn snapshot(&self, header: &BlockHeader) -> Result<(), String>;

	/// Makes pending writes durable.
	fn sync(&mut self) -> Result<(), String>;

	/// Drops pending writes.
	fn discard(&mut self);
}
