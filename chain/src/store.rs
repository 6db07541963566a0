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

//! Chain storage: blocks, headers, heads and the output position index,
//! on top of the key-value store.

use std::sync::Arc;

use croaring::Bitmap;
use lru_cache::LruCache;

use crate::core::consensus::TargetError;
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::{Block, BlockHeader, Commitment, Difficulty};
use crate::core::ser::Readable;
use crate::types::Tip;
use crate::util::RwLock;
use mimble_store as store;
use mimble_store::{option_to_not_found, to_key, u64_to_key, Error};

const STORE_SUBPATH: &str = "chain";

const BLOCK_HEADER_PREFIX: u8 = b'h';
const BLOCK_PREFIX: u8 = b'b';
const HEAD_PREFIX: u8 = b'H';
const HEADER_HEAD_PREFIX: u8 = b'I';
const SYNC_HEAD_PREFIX: u8 = b's';
const HEADER_HEIGHT_PREFIX: u8 = b'8';
const COMMIT_POS_PREFIX: u8 = b'c';
const BLOCK_INPUT_BITMAP_PREFIX: u8 = b'B';

const CACHE_SIZE: usize = 1_000;

fn block_key(h: &Hash) -> Vec<u8> {
	to_key(BLOCK_PREFIX, &h.to_vec())
}

fn header_key(h: &Hash) -> Vec<u8> {
	to_key(BLOCK_HEADER_PREFIX, &h.to_vec())
}

fn bitmap_key(h: &Hash) -> Vec<u8> {
	to_key(BLOCK_INPUT_BITMAP_PREFIX, &h.to_vec())
}

fn output_pos_key(commit: &Commitment) -> Vec<u8> {
	to_key(COMMIT_POS_PREFIX, commit.as_ref())
}

fn height_key(height: u64) -> Vec<u8> {
	u64_to_key(HEADER_HEIGHT_PREFIX, height)
}

// Reads shared by the store and its batches.
trait Source {
	fn read<T: Readable>(&self, key: &[u8]) -> Result<Option<T>, Error>;
	fn has(&self, key: &[u8]) -> Result<bool, Error>;
}

impl Source for store::Store {
	fn read<T: Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		self.get_ser(key)
	}

	fn has(&self, key: &[u8]) -> Result<bool, Error> {
		self.exists(key)
	}
}

impl<'a> Source for store::Batch<'a> {
	fn read<T: Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		self.get_ser(key)
	}

	fn has(&self, key: &[u8]) -> Result<bool, Error> {
		self.exists(key)
	}
}

fn read_tip<S: Source>(src: &S, prefix: u8, name: &str) -> Result<Tip, Error> {
	option_to_not_found(src.read(&[prefix]), || name.to_owned())
}

fn read_block<S: Source>(src: &S, h: &Hash) -> Result<Block, Error> {
	option_to_not_found(src.read(&block_key(h)), || format!("block {}", h))
}

fn read_header<S: Source>(src: &S, h: &Hash) -> Result<BlockHeader, Error> {
	option_to_not_found(src.read(&header_key(h)), || format!("header {}", h))
}

fn read_hash_at<S: Source>(src: &S, height: u64) -> Result<Hash, Error> {
	option_to_not_found(src.read(&height_key(height)), || {
		format!("hash at height {}", height)
	})
}

fn read_output_pos<S: Source>(src: &S, commit: &Commitment) -> Result<u64, Error> {
	option_to_not_found(src.read(&output_pos_key(commit)), || {
		format!("output pos of {:?}", commit)
	})
}

// On the current chain when the height index has this header and it's not
// beyond the head.
fn check_current(header: &BlockHeader, head: &Tip, at_height: Result<Hash, Error>) -> Result<(), Error> {
	if header.height > head.height {
		return Err(Error::NotFoundErr(format!(
			"header at {} beyond head at {}",
			header.height, head.height
		)));
	}
	if at_height? == header.hash() {
		Ok(())
	} else {
		Err(Error::NotFoundErr(format!(
			"header {} not on the current chain",
			header.hash()
		)))
	}
}

/// Chain data on disk, with header and spent bitmap caches in front.
pub struct ChainStore {
	db: store::Store,
	header_cache: RwLock<LruCache<Hash, BlockHeader>>,
	bitmap_cache: RwLock<LruCache<Hash, Vec<u8>>>,
}

impl ChainStore {
	/// Opens (or creates) the chain database under `db_root`.
	pub fn new(db_root: &str) -> Result<ChainStore, Error> {
		Ok(ChainStore {
			db: store::Store::new(db_root, None, Some(STORE_SUBPATH))?,
			header_cache: RwLock::new(LruCache::new(CACHE_SIZE)),
			bitmap_cache: RwLock::new(LruCache::new(CACHE_SIZE)),
		})
	}

	fn cached_header(&self, h: &Hash) -> Option<BlockHeader> {
		self.header_cache.write().get_mut(h).cloned()
	}
}

#[allow(missing_docs)]
impl ChainStore {
	pub fn head(&self) -> Result<Tip, Error> {
		read_tip(&self.db, HEAD_PREFIX, "head")
	}

	pub fn head_header(&self) -> Result<BlockHeader, Error> {
		self.get_block_header(&self.head()?.last_block_h)
	}

	pub fn get_header_head(&self) -> Result<Tip, Error> {
		read_tip(&self.db, HEADER_HEAD_PREFIX, "header head")
	}

	pub fn get_sync_head(&self) -> Result<Tip, Error> {
		read_tip(&self.db, SYNC_HEAD_PREFIX, "sync head")
	}

	pub fn get_block(&self, h: &Hash) -> Result<Block, Error> {
		read_block(&self.db, h)
	}

	pub fn block_exists(&self, h: &Hash) -> Result<bool, Error> {
		self.db.has(&block_key(h))
	}

	pub fn block_header_exists(&self, h: &Hash) -> Result<bool, Error> {
		self.db.has(&header_key(h))
	}

	/// Committed header, through the cache.
	pub fn get_block_header(&self, h: &Hash) -> Result<BlockHeader, Error> {
		if let Some(header) = self.cached_header(h) {
			return Ok(header);
		}
		let header = read_header(&self.db, h)?;
		self.header_cache.write().insert(*h, header.clone());
		Ok(header)
	}

	pub fn get_previous_header(&self, header: &BlockHeader) -> Result<BlockHeader, Error> {
		self.get_block_header(&header.previous)
	}

	pub fn get_hash_by_height(&self, height: u64) -> Result<Hash, Error> {
		read_hash_at(&self.db, height)
	}

	pub fn get_header_by_height(&self, height: u64) -> Result<BlockHeader, Error> {
		self.get_block_header(&self.get_hash_by_height(height)?)
	}

	pub fn get_output_pos(&self, commit: &Commitment) -> Result<u64, Error> {
		read_output_pos(&self.db, commit)
	}

	pub fn is_on_current_chain(&self, header: &BlockHeader) -> Result<(), Error> {
		check_current(header, &self.head()?, self.get_hash_by_height(header.height))
	}

	/// Starts a batch over this store.
	pub fn batch(&self) -> Result<Batch<'_>, Error> {
		Ok(Batch {
			store: self,
			db: self.db.batch()?,
		})
	}
}

/// Changes to the chain store, written all at once on commit and dropped
/// otherwise. Reads see the batch's own changes.
pub struct Batch<'a> {
	store: &'a ChainStore,
	db: store::Batch<'a>,
}

#[allow(missing_docs)]
impl<'a> Batch<'a> {
	pub fn head(&self) -> Result<Tip, Error> {
		read_tip(&self.db, HEAD_PREFIX, "head")
	}

	pub fn head_header(&self) -> Result<BlockHeader, Error> {
		self.get_block_header(&self.head()?.last_block_h)
	}

	pub fn get_header_head(&self) -> Result<Tip, Error> {
		read_tip(&self.db, HEADER_HEAD_PREFIX, "header head")
	}

	pub fn get_sync_head(&self) -> Result<Tip, Error> {
		read_tip(&self.db, SYNC_HEAD_PREFIX, "sync head")
	}

	/// Moves both the body and header heads.
	pub fn save_head(&self, t: &Tip) -> Result<(), Error> {
		self.save_body_head(t)?;
		self.save_header_head(t)
	}

	pub fn save_body_head(&self, t: &Tip) -> Result<(), Error> {
		self.db.put_ser(&[HEAD_PREFIX], t)
	}

	pub fn save_header_head(&self, t: &Tip) -> Result<(), Error> {
		self.db.put_ser(&[HEADER_HEAD_PREFIX], t)
	}

	pub fn save_sync_head(&self, t: &Tip) -> Result<(), Error> {
		self.db.put_ser(&[SYNC_HEAD_PREFIX], t)
	}

	/// Starts the sync head at the header head, setting the header head to
	/// `t` first if there is none yet.
	pub fn init_sync_head(&self, t: &Tip) -> Result<(), Error> {
		let header_head = match self.get_header_head() {
			Err(Error::NotFoundErr(_)) => {
				self.save_header_head(t)?;
				t.clone()
			}
			res => res?,
		};
		self.save_sync_head(&header_head)
	}

	/// Brings the header and sync heads back to the body head.
	pub fn reset_head(&self) -> Result<(), Error> {
		let head = self.head()?;
		self.save_header_head(&head)?;
		self.save_sync_head(&head)
	}

	pub fn get_block(&self, h: &Hash) -> Result<Block, Error> {
		read_block(&self.db, h)
	}

	pub fn block_exists(&self, h: &Hash) -> Result<bool, Error> {
		self.db.has(&block_key(h))
	}

	pub fn block_header_exists(&self, h: &Hash) -> Result<bool, Error> {
		self.db.has(&header_key(h))
	}

	/// Saves the block along with its header.
	pub fn save_block(&self, b: &Block) -> Result<(), Error> {
		let hash = b.hash();
		self.db.put_ser(&block_key(&hash), b)?;
		self.db.put_ser(&header_key(&hash), &b.header)
	}

	/// Deletes the block body and its spent bitmap, the header stays.
	pub fn delete_block(&self, bh: &Hash) -> Result<(), Error> {
		self.db.delete(&block_key(bh))?;
		self.delete_block_input_bitmap(bh)
	}

	pub fn save_block_header(&self, bh: &BlockHeader) -> Result<(), Error> {
		self.db.put_ser(&header_key(&bh.hash()), bh)
	}

	fn save_header_height(&self, bh: &BlockHeader) -> Result<(), Error> {
		self.db.put_ser(&height_key(bh.height), &bh.hash())
	}

	pub fn save_output_pos(&self, commit: &Commitment, pos: u64) -> Result<(), Error> {
		self.db.put_ser(&output_pos_key(commit), &pos)
	}

	pub fn get_output_pos(&self, commit: &Commitment) -> Result<u64, Error> {
		read_output_pos(&self.db, commit)
	}

	pub fn delete_output_pos(&self, commit: &Commitment) -> Result<(), Error> {
		self.db.delete(&output_pos_key(commit))
	}

	/// Header as seen by this batch. Only committed headers ever make it
	/// into the shared cache.
	pub fn get_block_header(&self, h: &Hash) -> Result<BlockHeader, Error> {
		match self.store.cached_header(h) {
			Some(header) => Ok(header),
			None => read_header(&self.db, h),
		}
	}

	pub fn get_previous_header(&self, header: &BlockHeader) -> Result<BlockHeader, Error> {
		self.get_block_header(&header.previous)
	}

	/// Saves the positions spent by a block, caching them for rewinds.
	pub fn save_block_input_bitmap(&self, bh: &Hash, bm: &Bitmap) -> Result<(), Error> {
		let bytes = bm.serialize();
		self.db.put(&bitmap_key(bh), &bytes)?;
		self.store.bitmap_cache.write().insert(*bh, bytes);
		Ok(())
	}

	fn delete_block_input_bitmap(&self, bh: &Hash) -> Result<(), Error> {
		self.store.bitmap_cache.write().remove(bh);
		let key = bitmap_key(bh);
		if self.db.has(&key)? {
			self.db.delete(&key)?;
		}
		Ok(())
	}

	pub fn is_on_current_chain(&self, header: &BlockHeader) -> Result<(), Error> {
		check_current(header, &self.head()?, self.get_hash_by_height(header.height))
	}

	pub fn get_hash_by_height(&self, height: u64) -> Result<Hash, Error> {
		read_hash_at(&self.db, height)
	}

	pub fn get_header_by_height(&self, height: u64) -> Result<BlockHeader, Error> {
		self.get_block_header(&self.get_hash_by_height(height)?)
	}

	/// Points the height index at the chain ending in `header`, dropping
	/// entries above it left over from `old_tip`.
	pub fn setup_height(&self, header: &BlockHeader, old_tip: &Tip) -> Result<(), Error> {
		for height in (header.height + 1)..=old_tip.height {
			self.db.delete(&height_key(height))?;
		}
		self.build_by_height_index(header, false)
	}

	/// Indexes `header` and its ancestors by height. Unless forced, stops at
	/// the first ancestor already indexed, everything below it is too.
	pub fn build_by_height_index(&self, header: &BlockHeader, force: bool) -> Result<(), Error> {
		self.save_header_height(header)?;
		let mut current = header.clone();
		while current.height > 1 {
			current = self.get_previous_header(&current)?;
			if !force && self.is_on_current_chain(&current).is_ok() {
				break;
			}
			self.save_header_height(&current)?;
		}
		Ok(())
	}

	/// Positions spent by the block, from the cache or the db, rebuilt from
	/// the block itself as a last resort.
	pub fn get_block_input_bitmap(&self, bh: &Hash) -> Result<Bitmap, Error> {
		if let Some(bytes) = self.store.bitmap_cache.write().get_mut(bh) {
			return Ok(Bitmap::deserialize(bytes));
		}
		if let Some(bytes) = self.db.get_bytes(&bitmap_key(bh))? {
			return Ok(Bitmap::deserialize(&bytes));
		}

		let block = self.get_block(bh)?;
		let bitmap: Bitmap = block
			.inputs()
			.iter()
			.filter_map(|input| self.get_output_pos(&input.commitment()).ok())
			.map(|pos| pos as u32)
			.collect();
		self.save_block_input_bitmap(bh, &bitmap)?;
		Ok(bitmap)
	}

	/// Folds the batch into its parent, or into the db for a top level one.
	pub fn commit(self) -> Result<(), Error> {
		self.db.commit()
	}

	/// Nested batch, folded into this one on commit.
	pub fn child(&mut self) -> Result<Batch<'_>, Error> {
		Ok(Batch {
			store: self.store,
			db: self.db.child()?,
		})
	}
}

enum HeaderSource<'a> {
	Store(Arc<ChainStore>),
	Batch(Batch<'a>),
}

impl<'a> HeaderSource<'a> {
	fn header(&self, h: &Hash) -> Option<BlockHeader> {
		match self {
			HeaderSource::Store(store) => store.get_block_header(h).ok(),
			HeaderSource::Batch(batch) => batch.get_block_header(h).ok(),
		}
	}
}

/// Walks back from a block yielding the timestamp and difficulty of each,
/// as the difficulty adjustment consumes them.
pub struct DifficultyIter<'a> {
	source: HeaderSource<'a>,
	next: Option<Hash>,
}

impl<'a> DifficultyIter<'a> {
	/// Walks committed headers back from `start`.
	pub fn from<'b>(start: Hash, store: Arc<ChainStore>) -> DifficultyIter<'b> {
		DifficultyIter {
			source: HeaderSource::Store(store),
			next: Some(start),
		}
	}

	/// Walks headers back from `start` as the batch sees them.
	pub fn from_batch(start: Hash, batch: Batch<'_>) -> DifficultyIter<'_> {
		DifficultyIter {
			source: HeaderSource::Batch(batch),
			next: Some(start),
		}
	}
}

impl<'a> Iterator for DifficultyIter<'a> {
	type Item = Result<(u64, Difficulty), TargetError>;

	fn next(&mut self) -> Option<Self::Item> {
		let header = self.source.header(&self.next.take()?)?;
		let prev = if header.height > 0 {
			self.source.header(&header.previous)
		} else {
			None
		};
		let prev_total = prev
			.as_ref()
			.map_or(Difficulty::zero(), |p| p.total_difficulty());
		self.next = prev.map(|p| p.hash());

		let difficulty = header.total_difficulty() - prev_total;
		Some(Ok((header.timestamp.timestamp() as u64, difficulty)))
	}
}
