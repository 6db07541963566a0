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
use std::ops::Range;

use croaring::Bitmap;

use crate::core::hash::{Hash, ZERO_HASH};
use crate::core::merkle_proof::MerkleProof;
use crate::core::pmmr::{Backend, ReadonlyPMMR};
use crate::core::BlockHeader;
use crate::ser::{PMMRIndexHashable, PMMRable};

/// Reads shared by the mutable and readonly MMR views. A view only brings
/// its backend and size, anything past the size reads as absent.
pub trait ReadablePMMR {
	/// Leaf type
	type Leaf: PMMRable;

	/// The backend the view reads from.
	fn backend(&self) -> &dyn Backend<Self::Leaf>;

	/// Number of nodes, pruned ones included.
	fn unpruned_size(&self) -> u64;

	/// Whether the MMR has no nodes at all.
	fn is_empty(&self) -> bool {
		self.unpruned_size() == 0
	}

	/// Hash at pos. Removed leaves have none, parents always keep theirs.
	fn get_hash(&self, pos: u64) -> Option<Hash> {
		if !in_range(pos, self.unpruned_size()) {
			None
		} else if is_leaf(pos) {
			self.backend().get_hash(pos)
		} else {
			self.backend().get_from_file(pos)
		}
	}

	/// Data of the leaf at pos, unless removed.
	fn get_data(&self, pos: u64) -> Option<<Self::Leaf as PMMRable>::E> {
		if in_range(pos, self.unpruned_size()) && is_leaf(pos) {
			self.backend().get_data(pos)
		} else {
			None
		}
	}

	/// Hash at pos, removed or not.
	fn get_from_file(&self, pos: u64) -> Option<Hash> {
		if in_range(pos, self.unpruned_size()) {
			self.backend().get_from_file(pos)
		} else {
			None
		}
	}

	/// Hash of the peak at pos.
	fn get_peak_from_file(&self, pos: u64) -> Option<Hash> {
		if in_range(pos, self.unpruned_size()) {
			self.backend().get_peak_from_file(pos)
		} else {
			None
		}
	}

	/// Data of the leaf at pos, removed or not.
	fn get_data_from_file(&self, pos: u64) -> Option<<Self::Leaf as PMMRable>::E> {
		if in_range(pos, self.unpruned_size()) {
			self.backend().get_data_from_file(pos)
		} else {
			None
		}
	}

	/// Positions of the leaves not removed.
	fn leaf_pos_iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
		self.backend().leaf_pos_iter()
	}

	/// Count of the leaves not removed.
	fn n_unpruned_leaves(&self) -> u64 {
		self.backend().n_unpruned_leaves()
	}

	/// Peak hashes, left to right.
	fn peaks(&self) -> Vec<Hash> {
		peaks(self.unpruned_size())
			.into_iter()
			.filter_map(|pos| self.get_peak_from_file(pos))
			.collect()
	}

	/// All peaks bagged right to left, ZERO_HASH when empty.
	fn root(&self) -> Result<Hash, String> {
		let size = self.unpruned_size();
		if size == 0 {
			return Ok(ZERO_HASH);
		}
		bag_peaks(self.peaks(), size).ok_or_else(|| format!("no peaks in mmr of size {}", size))
	}

	/// Proof that the leaf at pos is under the current root: its siblings up
	/// to the local peak, then the bag of the peaks to the right, then the
	/// peaks to the left nearest first.
	fn merkle_proof(&self, pos: u64) -> Result<MerkleProof, String> {
		let size = self.unpruned_size();
		if !is_leaf(pos) || self.get_hash(pos).is_none() {
			return Err(format!("no leaf at {}", pos));
		}
		trace!("merkle_proof: {} in mmr of size {}", pos, size);

		let branch = family_branch(pos, size);
		let mut path: Vec<Hash> = branch
			.iter()
			.filter_map(|&(_, sibling)| self.get_from_file(sibling))
			.collect();

		let peak = branch.last().map_or(pos, |&(parent, _)| parent);
		let (left, right): (Vec<u64>, Vec<u64>) = peaks(size)
			.into_iter()
			.filter(|&p| p != peak)
			.partition(|&p| p < peak);
		let right = right.into_iter().filter_map(|p| self.get_from_file(p)).collect();
		if let Some(bag) = bag_peaks(right, size) {
			path.push(bag);
		}
		path.extend(
			left.into_iter()
				.rev()
				.filter_map(|p| self.get_peak_from_file(p)),
		);

		Ok(MerkleProof {
			mmr_size: size,
			path,
		})
	}
}

fn in_range(pos: u64, size: u64) -> bool {
	pos > 0 && pos <= size
}

// Folds peak hashes from the right, every pair hashed with the MMR size.
fn bag_peaks(peaks: Vec<Hash>, size: u64) -> Option<Hash> {
	peaks.into_iter().rev().fold(None, |bag, peak| {
		Some(match bag {
			None => peak,
			Some(right) => (peak, right).hash_with_index(size),
		})
	})
}

/// Mutable MMR over a borrowed backend.
pub struct PMMR<'a, T, B>
where
	T: PMMRable,
	B: Backend<T>,
{
	size: u64,
	backend: &'a mut B,
	_marker: PhantomData<T>,
}

impl<'a, T, B> PMMR<'a, T, B>
where
	T: PMMRable,
	B: 'a + Backend<T>,
{
	/// Empty MMR over the backend.
	pub fn new(backend: &'a mut B) -> PMMR<'_, T, B> {
		PMMR::at(backend, 0)
	}

	/// MMR over the backend, already holding `size` nodes.
	pub fn at(backend: &'a mut B, size: u64) -> PMMR<'_, T, B> {
		PMMR {
			size,
			backend,
			_marker: PhantomData,
		}
	}

	/// Readonly view at the current size.
	pub fn readonly_pmmr(&self) -> ReadonlyPMMR<'_, T, B> {
		ReadonlyPMMR::at(&*self.backend, self.size)
	}

	/// Appends a leaf along with every parent it completes and returns the
	/// leaf position.
	pub fn push(&mut self, elmt: &T) -> Result<u64, String> {
		let leaf_pos = self.size + 1;
		if !is_leaf(leaf_pos) {
			return Err(format!("invalid mmr size {}", self.size));
		}

		let mut pos = leaf_pos;
		let mut hash = elmt.hash_with_index(pos - 1);
		let mut hashes = vec![hash];
		// a right child completes its parent, whose left child is a peak
		while !is_left_sibling(pos) {
			let (parent, sibling) = family(pos);
			let left = self
				.backend
				.get_peak_from_file(sibling)
				.ok_or_else(|| format!("missing peak at {}", sibling))?;
			hash = (left, hash).hash_with_index(parent - 1);
			hashes.push(hash);
			pos = parent;
		}

		self.backend.append(elmt, &hashes)?;
		self.size = pos;
		Ok(leaf_pos)
	}

	/// Keeps a copy of the leaf set as of `header`.
	pub fn snapshot(&mut self, header: &BlockHeader) -> Result<(), String> {
		self.backend.snapshot(header)
	}

	/// Goes back to the MMR as it was after the leaf at `position` was
	/// pushed, restoring the removed leaves in `rewind_rm_pos`.
	pub fn rewind(&mut self, position: u64, rewind_rm_pos: &Bitmap) -> Result<(), String> {
		// parents completed by that leaf come along
		let mut size = position;
		while !is_leaf(size + 1) {
			size += 1;
		}
		self.backend.rewind(size, rewind_rm_pos)?;
		self.size = size;
		Ok(())
	}

	/// Removes the leaf at position. Ok(false) when it was already gone,
	/// an error when position is not a leaf of this MMR.
	pub fn prune(&mut self, position: u64) -> Result<bool, String> {
		if !in_range(position, self.size) || !is_leaf(position) {
			return Err(format!("cannot prune {}, not a leaf", position));
		}
		if self.backend.get_hash(position).is_none() {
			return Ok(false);
		}
		self.backend.remove(position)?;
		Ok(true)
	}

	/// Checks every parent still around against the hash of its children.
	pub fn validate(&self) -> Result<(), String> {
		for pos in (1..=self.size).filter(|&pos| !is_leaf(pos)) {
			let hash = match self.get_hash(pos) {
				Some(hash) => hash,
				None => continue,
			};
			let right = pos - 1;
			let left = pos - (1 << bintree_postorder_height(pos));
			if let (Some(l), Some(r)) = (self.get_from_file(left), self.get_from_file(right)) {
				if (l, r).hash_with_index(pos - 1) != hash {
					return Err(format!("parent at {} does not match its children", pos));
				}
			}
		}
		Ok(())
	}
}

impl<'a, T, B> ReadablePMMR for PMMR<'a, T, B>
where
	T: PMMRable,
	B: 'a + Backend<T>,
{
	type Leaf = T;

	fn backend(&self) -> &dyn Backend<T> {
		&*self.backend
	}

	fn unpruned_size(&self) -> u64 {
		self.size
	}
}

// Size of a perfect tree of the given height.
fn tree_size(height: u64) -> u64 {
	u64::MAX >> (63 - height)
}

/// Peaks of an MMR of `size` nodes as a bitmap, bit h set for a peak of
/// height h, along with the height of the node that would come next. A
/// size that is not a valid MMR size leaves a non zero height.
///
/// A size of 4 is two peaks of height 1 and 0, followed by a leaf:
/// ```text
///    3
///   / \
///  1   2   4
/// ```
/// hence `(0b11, 0)`.
pub fn peak_map_height(size: u64) -> (u64, u64) {
	let mut rest = size;
	let mut peak_map = 0;
	for height in (0..64).rev() {
		peak_map <<= 1;
		if rest >= tree_size(height) {
			rest -= tree_size(height);
			peak_map |= 1;
		}
	}
	(peak_map, rest)
}

/// Sizes of the peaks of an MMR of `size` nodes, largest first, and the
/// height of the next node.
pub fn peak_sizes_height(size: u64) -> (Vec<u64>, u64) {
	let (peak_map, height) = peak_map_height(size);
	let sizes = (0..64)
		.rev()
		.filter(|h| peak_map & (1 << h) != 0)
		.map(tree_size)
		.collect();
	(sizes, height)
}

/// Positions of the peaks of an MMR of `size` nodes, left to right. Empty
/// when size is not a valid MMR size.
pub fn peaks(size: u64) -> Vec<u64> {
	let (sizes, height) = peak_sizes_height(size);
	if height != 0 {
		return vec![];
	}
	let mut end = 0;
	sizes
		.into_iter()
		.map(|s| {
			end += s;
			end
		})
		.collect()
}

/// Number of leaves in an MMR of `size` nodes. A size that stops partway
/// up a tree counts the leaf that started it.
pub fn n_leaves(size: u64) -> u64 {
	let (leaves, height) = peak_map_height(size);
	if height == 0 {
		leaves
	} else {
		leaves + 1
	}
}

/// Position of the nth leaf, both 1-based.
pub fn insertion_to_pmmr_index(n: u64) -> u64 {
	match n.checked_sub(1) {
		Some(before) => 2 * before - u64::from(before.count_ones()) + 1,
		None => 0,
	}
}

/// Height of the node at pos, leaves being 0.
pub fn bintree_postorder_height(pos: u64) -> u64 {
	match pos.checked_sub(1) {
		Some(size) => peak_map_height(size).1,
		None => 0,
	}
}

/// Whether the node at pos is a leaf.
pub fn is_leaf(pos: u64) -> bool {
	bintree_postorder_height(pos) == 0
}

/// Whether the node at pos is the left child of its parent.
pub fn is_left_sibling(pos: u64) -> bool {
	let (peak_map, height) = peak_map_height(pos.saturating_sub(1));
	peak_map & (1 << height) == 0
}

/// Parent and sibling positions of the node at pos.
pub fn family(pos: u64) -> (u64, u64) {
	let span = 2 << bintree_postorder_height(pos);
	if is_left_sibling(pos) {
		(pos + span, pos + span - 1)
	} else {
		(pos + 1, pos + 1 - span)
	}
}

/// (parent, sibling) pairs from pos up to its peak in an MMR of `size`
/// nodes.
pub fn family_branch(pos: u64, size: u64) -> Vec<(u64, u64)> {
	let mut branch = vec![];
	let mut current = pos;
	while current < size {
		let (parent, sibling) = family(current);
		if parent > size {
			break;
		}
		branch.push((parent, sibling));
		current = parent;
	}
	branch
}

/// Rightmost leaf under the node at pos.
pub fn bintree_rightmost(pos: u64) -> u64 {
	pos - bintree_postorder_height(pos)
}

/// Every position under the node at pos, pos included.
pub fn bintree_range(pos: u64) -> Range<u64> {
	let leftmost = pos + 1 - tree_size(bintree_postorder_height(pos));
	leftmost..(pos + 1)
}
