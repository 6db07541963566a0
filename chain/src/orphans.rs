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

//! Blocks waiting on a parent we haven't seen, and the short memory of
//! recently processed hashes.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::Block;
use crate::types::Options;
use crate::util::RwLock;

/// Most orphans held at once.
pub const MAX_ORPHAN_SIZE: usize = 200;

/// Orphans older than this are the first to go once the pool is full.
const MAX_ORPHAN_AGE_SECS: u64 = 300;

/// Hashes remembered by each of the block and header caches.
pub const HASHES_CACHE_SIZE: usize = 200;

/// Recently processed hashes, newest first. Lets resubmissions of a block
/// or header return early without taking the chain lock.
pub(crate) struct HashCache {
	hashes: RwLock<VecDeque<Hash>>,
}

impl HashCache {
	pub(crate) fn new() -> HashCache {
		HashCache {
			hashes: RwLock::new(VecDeque::with_capacity(HASHES_CACHE_SIZE)),
		}
	}

	pub(crate) fn contains(&self, hash: &Hash) -> bool {
		self.hashes.read().contains(hash)
	}

	pub(crate) fn insert(&self, hash: Hash) {
		let mut hashes = self.hashes.write();
		if !hashes.contains(&hash) {
			hashes.push_front(hash);
			hashes.truncate(HASHES_CACHE_SIZE);
		}
	}
}

/// A block received before its parent, waiting in the pool.
#[derive(Debug, Clone)]
pub struct Orphan {
	/// The block itself
	pub block: Block,
	/// Options it was submitted with, reused when it gets processed
	pub opts: Options,
	/// When it entered the pool
	pub added: Instant,
}

#[derive(Default)]
struct Pool {
	by_hash: HashMap<Hash, Orphan>,
	// every orphan hash at a given height
	by_height: HashMap<u64, Vec<Hash>>,
	evicted: usize,
}

impl Pool {
	fn take(&mut self, hash: &Hash) -> Option<Orphan> {
		let orphan = self.by_hash.remove(hash)?;
		let height = orphan.block.header.height;
		if let Some(hashes) = self.by_height.get_mut(&height) {
			hashes.retain(|h| h != hash);
			if hashes.is_empty() {
				self.by_height.remove(&height);
			}
		}
		Some(orphan)
	}

	// Expired orphans first, then oldest arrivals, until back to the bound.
	fn evict(&mut self) {
		let max_age = Duration::from_secs(MAX_ORPHAN_AGE_SECS);
		let mut by_age: Vec<(bool, Instant, Hash)> = self
			.by_hash
			.iter()
			.map(|(h, o)| (o.added.elapsed() < max_age, o.added, *h))
			.collect();
		let expired = by_age.iter().filter(|x| !x.0).count();
		let excess = self.by_hash.len() - MAX_ORPHAN_SIZE;
		by_age.sort_unstable();
		for (_, _, hash) in by_age.into_iter().take(expired.max(excess)) {
			self.take(&hash);
			self.evicted += 1;
		}
	}
}

/// Bounded holding area for blocks whose parent we don't know about yet.
/// Indexed by hash and by height.
#[derive(Default)]
pub struct OrphanBlockPool {
	pool: RwLock<Pool>,
}

impl OrphanBlockPool {
	/// New empty pool
	pub fn new() -> OrphanBlockPool {
		OrphanBlockPool::default()
	}

	/// Number of orphans currently held
	pub fn len(&self) -> usize {
		self.pool.read().by_hash.len()
	}

	/// No orphan held.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Orphans dropped so far to stay under `MAX_ORPHAN_SIZE`.
	pub fn len_evicted(&self) -> usize {
		self.pool.read().evicted
	}

	/// Adds an orphan, replacing any earlier copy of the same block. Once
	/// over `MAX_ORPHAN_SIZE` every expired orphan is evicted, then the
	/// oldest ones by arrival.
	pub fn add(&self, orphan: Orphan) {
		let mut pool = self.pool.write();
		let hash = orphan.block.hash();
		let hashes = pool
			.by_height
			.entry(orphan.block.header.height)
			.or_insert_with(Vec::new);
		if !hashes.contains(&hash) {
			hashes.push(hash);
		}
		pool.by_hash.insert(hash, orphan);

		if pool.by_hash.len() > MAX_ORPHAN_SIZE {
			pool.evict();
		}
	}

	/// Takes all the orphans at `height` out of the pool.
	pub fn remove_by_height(&self, height: u64) -> Option<Vec<Orphan>> {
		let mut pool = self.pool.write();
		let hashes = pool.by_height.get(&height)?.clone();
		Some(hashes.iter().filter_map(|h| pool.take(h)).collect())
	}

	/// Hashes of the orphans waiting on `parent`.
	pub fn children_of(&self, parent: &Hash) -> Vec<Hash> {
		self.pool
			.read()
			.by_hash
			.iter()
			.filter(|(_, o)| o.block.header.previous == *parent)
			.map(|(h, _)| *h)
			.collect()
	}

	/// Takes the orphans waiting on `parent` out of the pool.
	pub fn remove_children(&self, parent: &Hash) -> Vec<Orphan> {
		let children = self.children_of(parent);
		let mut pool = self.pool.write();
		children.iter().filter_map(|h| pool.take(h)).collect()
	}

	/// Whether the block with this hash is waiting in the pool.
	pub fn contains(&self, hash: &Hash) -> bool {
		self.pool.read().by_hash.contains_key(hash)
	}
}
