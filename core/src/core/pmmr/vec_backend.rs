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

use std::collections::HashSet;

use croaring::Bitmap;

use crate::core::hash::Hash;
use crate::core::pmmr::{self, Backend};
use crate::core::BlockHeader;
use crate::ser::PMMRable;

/// In-memory backend. Removed leaves go in a set and the state at the last
/// sync is kept whole for `discard`.
#[derive(Clone, Debug)]
pub struct VecBackend<T: PMMRable> {
	/// Every node hash, by position
	pub hashes: Vec<Hash>,
	/// Leaf data, by insertion order
	pub data: Vec<T>,
	/// Removed leaf positions
	pub removed: HashSet<u64>,
	synced: Option<Box<VecBackend<T>>>,
}

impl<T: PMMRable> VecBackend<T> {
	/// Empty backend.
	pub fn new() -> VecBackend<T> {
		VecBackend {
			hashes: vec![],
			data: vec![],
			removed: HashSet::new(),
			synced: None,
		}
	}

	/// Number of hashes held.
	pub fn size(&self) -> u64 {
		self.hashes.len() as u64
	}

	fn hash_at(&self, position: u64) -> Option<Hash> {
		let idx = position.checked_sub(1)?;
		self.hashes.get(idx as usize).cloned()
	}
}

impl<T: PMMRable> Default for VecBackend<T> {
	fn default() -> VecBackend<T> {
		VecBackend::new()
	}
}

impl<T: PMMRable> Backend<T> for VecBackend<T> {
	fn append(&mut self, data: &T, hashes: &[Hash]) -> Result<(), String> {
		self.data.push(data.clone());
		self.hashes.extend_from_slice(hashes);
		Ok(())
	}

	fn rewind(&mut self, position: u64, rewind_rm_pos: &Bitmap) -> Result<(), String> {
		self.hashes.truncate(position as usize);
		self.data.truncate(pmmr::n_leaves(position) as usize);
		self.removed
			.retain(|&pos| pos <= position && !rewind_rm_pos.contains(pos as u32));
		Ok(())
	}

	fn get_hash(&self, position: u64) -> Option<Hash> {
		if self.removed.contains(&position) {
			return None;
		}
		self.hash_at(position)
	}

	fn get_data(&self, position: u64) -> Option<T::E> {
		if self.removed.contains(&position) {
			return None;
		}
		self.get_data_from_file(position)
	}

	fn get_from_file(&self, position: u64) -> Option<Hash> {
		self.hash_at(position)
	}

	fn get_data_from_file(&self, position: u64) -> Option<T::E> {
		if position == 0 || !pmmr::is_leaf(position) {
			return None;
		}
		let idx = pmmr::n_leaves(position) - 1;
		self.data.get(idx as usize).map(|elmt| elmt.as_elmt())
	}

	fn remove(&mut self, position: u64) -> Result<(), String> {
		self.removed.insert(position);
		Ok(())
	}

	fn leaf_pos_iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
		let removed = &self.removed;
		Box::new(
			(1..=self.size()).filter(move |pos| pmmr::is_leaf(*pos) && !removed.contains(pos)),
		)
	}

	fn n_unpruned_leaves(&self) -> u64 {
		self.leaf_pos_iter().count() as u64
	}

	fn release_files(&mut self) {}

	fn snapshot(&self, _header: &BlockHeader) -> Result<(), String> {
		Ok(())
	}

	fn sync(&mut self) -> Result<(), String> {
		let mut synced = self.clone();
		synced.synced = None;
		self.synced = Some(Box::new(synced));
		Ok(())
	}

	fn discard(&mut self) {
		let synced = self.synced.take();
		*self = match synced {
			Some(state) => {
				let mut state = *state;
				state.synced = Some(Box::new(state.clone()));
				state
			}
			None => VecBackend::new(),
		};
	}
}
