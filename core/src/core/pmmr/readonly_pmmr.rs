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

use std::marker::PhantomData;

use crate::core::hash::Hash;
use crate::core::pmmr::{bintree_rightmost, insertion_to_pmmr_index};
use crate::core::pmmr::{Backend, ReadablePMMR};
use crate::ser::PMMRable;

/// MMR view over a shared backend, for reads while nothing is being
/// appended.
pub struct ReadonlyPMMR<'a, T, B>
where
	T: PMMRable,
	B: Backend<T>,
{
	size: u64,
	backend: &'a B,
	_marker: PhantomData<T>,
}

impl<'a, T, B> ReadonlyPMMR<'a, T, B>
where
	T: PMMRable,
	B: 'a + Backend<T>,
{
	/// Empty view over the backend.
	pub fn new(backend: &'a B) -> ReadonlyPMMR<'_, T, B> {
		ReadonlyPMMR::at(backend, 0)
	}

	/// View over the first `size` nodes of the backend.
	pub fn at(backend: &'a B, size: u64) -> ReadonlyPMMR<'_, T, B> {
		ReadonlyPMMR {
			size,
			backend,
			_marker: PhantomData,
		}
	}

	/// Up to `max_count` leaves still around, from the 1-based leaf index
	/// `index` onwards, with the index of the last one returned.
	pub fn elements_from_insertion_index(&self, index: u64, max_count: u64) -> (u64, Vec<T::E>) {
		let mut index = index.max(1);
		let mut last = index;
		let mut elements = vec![];
		while (elements.len() as u64) < max_count {
			let pos = insertion_to_pmmr_index(index);
			if pos > self.size {
				break;
			}
			if let Some(data) = self.get_data(pos) {
				elements.push(data);
				last = index;
			}
			index += 1;
		}
		(last, elements)
	}

	/// Hash and data of the last `n` leaves, newest first. Removed leaves
	/// count towards `n` but are left out.
	pub fn get_last_n_insertions(&self, n: u64) -> Vec<(Hash, T::E)> {
		let mut res = vec![];
		let mut pos = self.size;
		for _ in 0..n {
			if pos == 0 {
				break;
			}
			let leaf = bintree_rightmost(pos);
			if let (Some(hash), Some(data)) = (self.get_hash(leaf), self.get_data(leaf)) {
				res.push((hash, data));
			}
			pos = leaf - 1;
		}
		res
	}
}

impl<'a, T, B> ReadablePMMR for ReadonlyPMMR<'a, T, B>
where
	T: PMMRable,
	B: 'a + Backend<T>,
{
	type Leaf = T;

	fn backend(&self) -> &dyn Backend<T> {
		self.backend
	}

	fn unpruned_size(&self) -> u64 {
		self.size
	}
}
