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

//! The `Chain` facade. Owns the store, the txhashset and the orphan pool,
//! serializes block processing behind the txhashset lock and answers
//! queries about the current chain state.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::merkle_proof::MerkleProof;
use crate::core::core::{
	Block, BlockHeader, Commitment, CommitmentScheme, Difficulty, Output, OutputIdentifier,
	Transaction, TxKernel,
};
use crate::core::global;
use crate::error::Error;
use crate::orphans::{HashCache, Orphan, OrphanBlockPool};
use crate::pipe;
use crate::store;
use crate::txhashset::{self, TxHashSet};
use crate::types::{
	BlockStatus, ChainAdapter, NextDifficulty, NoStatus, Options, Tip, TxHashSetRoots,
	TxHashsetWriteStatus, VerifyPow,
};
use crate::util::RwLock;

/// Attaches what we were doing to a store error.
fn store_err(context: &'static str) -> impl Fn(mimble_store::Error) -> Error {
	move |e| Error::StoreErr(e, context.to_owned())
}

/// The chain a node follows. Block and header processing is serialized by
/// the txhashset write lock. The cached head is only ever updated while
/// that lock is held, right after the batch committing it.
pub struct Chain {
	db_root: String,
	store: Arc<store::ChainStore>,
	adapter: Arc<dyn ChainAdapter + Send + Sync>,
	orphans: Arc<OrphanBlockPool>,
	txhashset: Arc<RwLock<TxHashSet>>,
	// last committed head, readable without taking the txhashset lock
	head: Arc<RwLock<Tip>>,
	block_hashes_cache: HashCache,
	header_hashes_cache: HashCache,
	pow_verifier: Arc<dyn VerifyPow>,
	difficulty: Arc<dyn NextDifficulty>,
	scheme: Arc<dyn CommitmentScheme>,
	archive_mode: bool,
	genesis: BlockHeader,
}

impl Chain {
	/// Opens the chain under `db_root`. An empty db starts from `genesis`.
	/// Otherwise the txhashset is rewound to the stored head and checked
	/// against it, walking the head back one block at a time until they
	/// agree.
	pub fn init(
		db_root: String,
		adapter: Arc<dyn ChainAdapter + Send + Sync>,
		genesis: Block,
		pow_verifier: Arc<dyn VerifyPow>,
		difficulty: Arc<dyn NextDifficulty>,
		scheme: Arc<dyn CommitmentScheme>,
		archive_mode: bool,
	) -> Result<Chain, Error> {
		let store = Arc::new(store::ChainStore::new(&db_root)?);
		let mut txhashset = TxHashSet::open(db_root.clone(), store.clone(), None)?;
		setup_head(&genesis, &store, &mut txhashset)?;

		let head = store.head()?;
		debug!(
			"init: head {} at {}, total difficulty {}",
			head.last_block_h, head.height, head.total_difficulty
		);

		Ok(Chain {
			db_root,
			store,
			adapter,
			orphans: Arc::new(OrphanBlockPool::new()),
			txhashset: Arc::new(RwLock::new(txhashset)),
			head: Arc::new(RwLock::new(head)),
			block_hashes_cache: HashCache::new(),
			header_hashes_cache: HashCache::new(),
			pow_verifier,
			difficulty,
			scheme,
			archive_mode,
			genesis: genesis.header,
		})
	}

	/// The txhashset, shared.
	pub fn txhashset(&self) -> Arc<RwLock<TxHashSet>> {
		self.txhashset.clone()
	}

	/// The chain store, shared.
	pub fn store(&self) -> Arc<store::ChainStore> {
		self.store.clone()
	}

	/// The genesis header this chain was initialized with.
	pub fn genesis(&self) -> BlockHeader {
		self.genesis.clone()
	}

	/// Processes a block then any orphans that were waiting on it, and on
	/// their own children in turn. Returns the new head if the block moved
	/// it, and the block if it was accepted at all.
	pub fn process_block(
		&self,
		b: Block,
		opts: Options,
	) -> Result<(Option<Tip>, Option<Block>), Error> {
		let res = self.process_block_single(b, opts);
		if let Ok((_, Some(ref accepted))) = res {
			self.check_orphans(accepted.hash());
		}
		res
	}

	fn process_block_single(
		&self,
		b: Block,
		opts: Options,
	) -> Result<(Option<Tip>, Option<Block>), Error> {
		let bhash = b.hash();
		if self.block_hashes_cache.contains(&bhash) || self.block_exists(bhash)? {
			debug!("process_block: {} at {} already known", bhash, b.header.height);
			return Ok((None, None));
		}

		let res = {
			let mut txhashset = self.txhashset.write();
			let batch = self.store.batch()?;
			let prev_head = batch.head()?;
			let mut ctx = self.new_ctx(opts, batch, &mut txhashset);
			match pipe::process_block(&b, &mut ctx) {
				Ok(tip) => match ctx.batch.commit() {
					Ok(()) => {
						// still under the txhashset lock, readers never see the
						// cached head behind the db
						let status = match tip {
							Some(ref tip) => {
								*self.head.write() = tip.clone();
								if b.header.previous == prev_head.last_block_h {
									BlockStatus::Next
								} else {
									BlockStatus::Reorg
								}
							}
							None => BlockStatus::Fork,
						};
						Ok((tip, status))
					}
					Err(e) => Err(Error::from(e)),
				},
				Err(e) => Err(e),
			}
		};

		match res {
			Ok((tip, status)) => {
				self.block_hashes_cache.insert(bhash);
				self.adapter.block_accepted(&b, status, opts);
				Ok((tip, Some(b)))
			}
			Err(Error::Orphan) => {
				let height = b.header.height;
				self.orphans.add(Orphan {
					block: b,
					opts,
					added: Instant::now(),
				});
				debug!(
					"process_block: {} at {} is an orphan, {} in pool, {} evicted so far",
					bhash,
					height,
					self.orphans.len(),
					self.orphans.len_evicted(),
				);
				Err(Error::Orphan)
			}
			Err(Error::Unfit(msg)) => {
				debug!(
					"process_block: {} at {} is unfit: {}",
					bhash, b.header.height, msg
				);
				Err(Error::Unfit(msg))
			}
			Err(e) => {
				info!("process_block: rejected {} at {}: {}", bhash, b.header.height, e);
				if e.is_bad_data() {
					self.block_hashes_cache.insert(bhash);
					Err(Error::Other(e.to_string()))
				} else {
					Err(e)
				}
			}
		}
	}

	/// Validates and saves a header ahead of its block, moving the header
	/// head if it has more work. Headers seen recently return right away.
	pub fn process_block_header(&self, bh: &BlockHeader, opts: Options) -> Result<(), Error> {
		let hash = bh.hash();
		if self.header_hashes_cache.contains(&hash) {
			debug!("process_block_header: {} at {} already known", hash, bh.height);
			return Ok(());
		}
		let mut txhashset = self.txhashset.write();
		let batch = self.store.batch()?;
		let mut ctx = self.new_ctx(opts, batch, &mut txhashset);
		pipe::process_block_header(bh, &mut ctx)?;
		ctx.batch.commit()?;
		self.header_hashes_cache.insert(hash);
		Ok(())
	}

	/// Adds a header received while syncing, moving the sync head.
	pub fn sync_block_header(&self, bh: &BlockHeader, opts: Options) -> Result<Option<Tip>, Error> {
		let mut txhashset = self.txhashset.write();
		let batch = self.store.batch()?;
		let mut ctx = self.new_ctx(opts, batch, &mut txhashset);
		let tip = pipe::sync_block_header(bh, &mut ctx)?;
		ctx.batch.commit()?;
		self.header_hashes_cache.insert(bh.hash());
		Ok(tip)
	}

	fn new_ctx<'a>(
		&self,
		opts: Options,
		batch: store::Batch<'a>,
		txhashset: &'a mut TxHashSet,
	) -> pipe::BlockContext<'a> {
		pipe::BlockContext {
			opts,
			pow_verifier: self.pow_verifier.clone(),
			difficulty: self.difficulty.clone(),
			scheme: self.scheme.clone(),
			txhashset,
			batch,
		}
	}

	/// Whether the block is waiting in the orphan pool.
	pub fn is_orphan(&self, hash: &Hash) -> bool {
		self.orphans.contains(hash)
	}

	/// Retries the orphans waiting on `parent`. Works through a queue of
	/// accepted hashes instead of recursing, so long chains of orphans
	/// don't grow the stack.
	pub fn check_orphans(&self, parent: Hash) {
		let mut queue = VecDeque::new();
		queue.push_back(parent);
		while let Some(parent) = queue.pop_front() {
			let children = self.orphans.remove_children(&parent);
			if !children.is_empty() {
				debug!(
					"check_orphans: {} waiting on {}, {} left in pool",
					children.len(),
					parent,
					self.orphans.len(),
				);
			}
			for orphan in children {
				let bhash = orphan.block.hash();
				match self.process_block_single(orphan.block, orphan.opts) {
					Ok((_, Some(_))) => queue.push_back(bhash),
					Ok((_, None)) => {}
					Err(e) => debug!("check_orphans: {} rejected: {}", bhash, e),
				}
			}
		}
	}

	/// Hash of the unspent output matching `output_ref` on the current
	/// chain, `OutputNotFound` when it's spent or never existed.
	pub fn is_unspent(&self, output_ref: &OutputIdentifier) -> Result<Hash, Error> {
		let (hash, _) = self.txhashset.read().is_unspent(output_ref)?;
		Ok(hash)
	}

	/// Height the next block on top of the head will have.
	pub fn next_block_height(&self) -> Result<u64, Error> {
		Ok(self.head_header()?.height + 1)
	}

	/// Validates loose transactions against the current utxo set on top of
	/// an optional `pre_tx`, returning those that could go in the next block.
	/// Nothing is persisted.
	pub fn validate_raw_txs(
		&self,
		txs: &[Transaction],
		pre_tx: Option<&Transaction>,
	) -> Result<Vec<Transaction>, Error> {
		let height = self.next_block_height()?;
		let mut txhashset = self.txhashset.write();
		txhashset::extending_readonly(&mut txhashset, |extension| {
			extension.validate_raw_txs(txs, pre_tx, height)
		})
	}

	/// Fails with `ImmatureCoinbase` if `tx` spends a coinbase that can't be
	/// spent in the next block yet.
	pub fn verify_coinbase_maturity(&self, tx: &Transaction) -> Result<(), Error> {
		let height = self.next_block_height()?;
		let mut txhashset = self.txhashset.write();
		txhashset::extending_readonly(&mut txhashset, |extension| {
			extension.verify_coinbase_maturity(tx.inputs(), height)
		})
	}

	/// Fails with `TxLockHeight` if `tx` can't go in the next block yet.
	pub fn verify_tx_lock_height(&self, tx: &Transaction) -> Result<(), Error> {
		if tx.lock_height() > self.next_block_height()? {
			return Err(Error::TxLockHeight);
		}
		Ok(())
	}

	/// Fully validates the txhashset at the head: roots, sizes, kernel sums
	/// and, unless `fast_validation`, every range proof and kernel
	/// signature. A chain at genesis is valid.
	pub fn validate(&self, fast_validation: bool) -> Result<(), Error> {
		let header = self.store.head_header()?;
		if header.height == 0 {
			return Ok(());
		}
		let scheme = self.scheme.clone();
		let mut txhashset = self.txhashset.write();
		txhashset::extending_readonly(&mut txhashset, |extension| {
			extension.rewind(&header)?;
			extension.validate(fast_validation, &NoStatus, scheme.as_ref())
		})
	}

	/// Fills in the MMR roots and sizes of a block being built, as they
	/// will be once it is applied. Handles blocks building on a fork.
	pub fn set_txhashset_roots(&self, b: &mut Block) -> Result<(), Error> {
		let block: &Block = b;
		let mut txhashset = self.txhashset.write();
		let (roots, sizes) = txhashset::extending_readonly(&mut txhashset, |extension| {
			if block.header.previous != extension.head_header().hash() {
				pipe::rewind_and_apply_fork(block, extension)?;
			}
			extension.apply_block(block)?;
			Ok((extension.roots()?, extension.sizes()))
		})?;

		let header = &mut b.header;
		header.output_root = roots.output_root;
		header.range_proof_root = roots.rproof_root;
		header.kernel_root = roots.kernel_root;
		header.output_mmr_size = sizes.0;
		header.kernel_mmr_size = sizes.2;
		Ok(())
	}

	/// Merkle proof of `output` in the output MMR as of `block_header`.
	pub fn get_merkle_proof(
		&self,
		output: &OutputIdentifier,
		block_header: &BlockHeader,
	) -> Result<MerkleProof, Error> {
		let mut txhashset = self.txhashset.write();
		txhashset::extending_readonly(&mut txhashset, |extension| {
			extension.rewind(block_header)?;
			extension.merkle_proof(output)
		})
	}

	/// Merkle proof of the output with this commitment against the current
	/// output MMR.
	pub fn get_merkle_proof_for_pos(&self, commit: Commitment) -> Result<MerkleProof, Error> {
		self.txhashset.read().merkle_proof(commit)
	}

	/// Roots of the three MMRs at the head.
	pub fn get_txhashset_roots(&self) -> Result<TxHashSetRoots, Error> {
		self.txhashset.read().roots()
	}

	/// Zips the txhashset as of block `h` for a peer doing a fast sync.
	/// The leaf sets are rewound and written to disk first since the peer
	/// can't rewind them itself. Returns the output and kernel MMR sizes at
	/// `h` along with the zip.
	pub fn txhashset_read(&self, h: Hash) -> Result<(u64, u64, File), Error> {
		let header = self.get_block_header(&h)?;
		{
			let mut txhashset = self.txhashset.write();
			txhashset::extending_readonly(&mut txhashset, |extension| {
				extension.rewind(&header)?;
				extension.snapshot()
			})?;
		}
		let zip = txhashset::zip_read(self.db_root.clone(), &header)?;
		Ok((header.output_mmr_size, header.kernel_mmr_size, zip))
	}

	/// Replaces our txhashset with a snapshot at block `h` received from a
	/// peer. The snapshot is unpacked and fully validated in a sandbox
	/// first, our own state is untouched if it doesn't check out. Only
	/// snapshots ahead of our head are taken.
	pub fn txhashset_write(
		&self,
		h: Hash,
		txhashset_data: File,
		status: &dyn TxHashsetWriteStatus,
	) -> Result<(), Error> {
		status.on_setup();

		// held for the whole import
		let mut txhashset = self.txhashset.write();

		let header = self.get_block_header(&h)?;
		if header.height <= self.head()?.height {
			return Err(Error::InvalidTxHashSet("not needed".to_owned()));
		}

		let sandbox = Path::new(&self.db_root)
			.join("tmp")
			.join(format!("txhashset_{}", header.hash()));
		if sandbox.exists() {
			fs::remove_dir_all(&sandbox)?;
		}
		fs::create_dir_all(&sandbox)?;

		if let Err(e) = self.validate_sandbox(&header, &sandbox, txhashset_data, status) {
			warn!("txhashset_write: rejecting snapshot at {}: {}", header.hash(), e);
			clean_sandbox(&sandbox);
			return Err(e);
		}

		txhashset.release_backend_files();
		txhashset::txhashset_replace(sandbox.clone(), PathBuf::from(&self.db_root))?;
		clean_sandbox(&sandbox);
		*txhashset = TxHashSet::open(self.db_root.clone(), self.store.clone(), None)?;

		let tip = Tip::from_header(&header);
		let batch = self.store.batch()?;
		batch.save_body_head(&tip)?;
		batch.build_by_height_index(&header, true)?;
		batch.commit()?;
		status.on_save();

		*self.head.write() = tip;
		debug!("txhashset_write: now at {} from snapshot", header.height);

		drop(txhashset);
		self.check_orphans(header.hash());

		status.on_done();
		Ok(())
	}

	// Unpacks the snapshot into the sandbox and validates it against the
	// header, rebuilding the output index in a batch only committed on
	// success.
	fn validate_sandbox(
		&self,
		header: &BlockHeader,
		sandbox: &Path,
		txhashset_data: File,
		status: &dyn TxHashsetWriteStatus,
	) -> Result<(), Error> {
		txhashset::zip_write(sandbox.to_path_buf(), txhashset_data, header)?;

		let sandbox_root = sandbox
			.to_str()
			.map(String::from)
			.ok_or_else(|| Error::TxHashSetErr(format!("invalid sandbox path {:?}", sandbox)))?;
		let mut sandboxed = TxHashSet::open(sandbox_root, self.store.clone(), Some(header))?;

		debug!("txhashset_write: validating snapshot at {}", header.height);

		// the extension reads its starting point from the batch head, which
		// must be the snapshot header and not our own head
		let mut batch = self.store.batch()?;
		batch.save_body_head(&Tip::from_header(header))?;

		let scheme = self.scheme.clone();
		let res = txhashset::extending(&mut sandboxed, &mut batch, |extension| {
			extension.rewind(header)?;
			extension.validate(false, status, scheme.as_ref())?;
			extension.rebuild_index()
		});
		sandboxed.release_backend_files();
		res?;

		batch.commit()?;
		Ok(())
	}

	/// Compacts everything below the cut-through horizon: spent leaves are
	/// removed from the MMR files and, outside of archive mode, full blocks
	/// are deleted from the db. Blocks processing while it runs, and
	/// validates the chain state once done.
	pub fn compact(&self) -> Result<(), Error> {
		let horizon = global::cut_through_horizon() as u64;
		let head = self.head()?;
		if head.height <= horizon {
			return Ok(());
		}

		{
			let mut txhashset = self.txhashset.write();
			let batch = self.store.batch()?;
			let horizon_header = batch.get_header_by_height(head.height - horizon)?;
			debug!("compact: horizon at {}", horizon_header.height);

			txhashset.compact(&horizon_header, &batch)?;
			if !self.archive_mode {
				remove_historical_blocks(&horizon_header, &batch)?;
			}
			batch.commit()?;
		}

		debug!("compact: validating state after compaction");
		self.validate(true)
	}

	/// The last `distance` leaves of the output MMR, with their hashes.
	pub fn get_last_n_output(&self, distance: u64) -> Vec<(Hash, OutputIdentifier)> {
		self.txhashset.read().last_n_output(distance)
	}

	/// The last `distance` leaves of the kernel MMR, with their hashes.
	pub fn get_last_n_kernel(&self, distance: u64) -> Vec<(Hash, TxKernel)> {
		self.txhashset.read().last_n_kernel(distance)
	}

	/// Insertion index of the last output in the output MMR.
	pub fn highest_output_insertion_index(&self) -> u64 {
		self.txhashset.read().highest_output_insertion_index()
	}

	/// Up to `max` unspent outputs from insertion index `start_index`, with
	/// their range proofs. Also returns the last index read and the highest
	/// index overall, so the caller can page through.
	pub fn unspent_outputs_by_insertion_index(
		&self,
		start_index: u64,
		max: u64,
	) -> Result<(u64, u64, Vec<Output>), Error> {
		let txhashset = self.txhashset.read();
		let highest = txhashset.highest_output_insertion_index();
		let (last, ids) = txhashset.outputs_by_insertion_index(start_index, max);
		let (proofs_last, proofs) = txhashset.rangeproofs_by_insertion_index(start_index, max);
		if last != proofs_last || ids.len() != proofs.len() {
			return Err(Error::TxHashSetErr(
				"output and range proof MMRs out of step".to_owned(),
			));
		}
		let outputs = ids
			.into_iter()
			.zip(proofs)
			.map(|(id, proof)| Output {
				features: id.features,
				commit: id.commit,
				proof,
			})
			.collect();
		Ok((last, highest, outputs))
	}

	/// Cumulative difficulty of the head.
	pub fn total_difficulty(&self) -> Difficulty {
		self.head.read().total_difficulty
	}

	/// Number of blocks in the orphan pool.
	pub fn orphans_len(&self) -> usize {
		self.orphans.len()
	}

	/// Cumulative difficulty of the header head.
	pub fn total_header_difficulty(&self) -> Result<Difficulty, Error> {
		Ok(self.store.get_header_head()?.total_difficulty)
	}

	/// Brings the header and sync heads back to the body head.
	pub fn reset_head(&self) -> Result<(), Error> {
		let batch = self.store.batch()?;
		batch.reset_head()?;
		batch.commit()?;
		Ok(())
	}

	/// The body head, as last committed.
	pub fn head(&self) -> Result<Tip, Error> {
		Ok(self.head.read().clone())
	}

	/// Header of the body head.
	pub fn head_header(&self) -> Result<BlockHeader, Error> {
		self.store
			.head_header()
			.map_err(store_err("chain head header"))
	}

	/// Full block by hash.
	pub fn get_block(&self, h: &Hash) -> Result<Block, Error> {
		Ok(self.store.get_block(h)?)
	}

	/// Header by hash.
	pub fn get_block_header(&self, h: &Hash) -> Result<BlockHeader, Error> {
		Ok(self.store.get_block_header(h)?)
	}

	/// Header at `height` on the current chain.
	pub fn get_header_by_height(&self, height: u64) -> Result<BlockHeader, Error> {
		Ok(self.store.get_header_by_height(height)?)
	}

	/// Hash of the block at `height` on the current chain.
	pub fn get_block_id_by_height(&self, height: u64) -> Result<Hash, Error> {
		Ok(self.store.get_hash_by_height(height)?)
	}

	/// Fails unless `header` is the one the height index holds for its
	/// height.
	pub fn is_on_current_chain(&self, header: &BlockHeader) -> Result<(), Error> {
		self.store
			.is_on_current_chain(header)
			.map_err(store_err("chain is_on_current_chain"))
	}

	/// Tip of the header chain being synced.
	pub fn get_sync_head(&self) -> Result<Tip, Error> {
		self.store.get_sync_head().map_err(store_err("chain get sync head"))
	}

	/// Tip of the most worked header chain.
	pub fn get_header_head(&self) -> Result<Tip, Error> {
		self.store
			.get_header_head()
			.map_err(store_err("chain get header head"))
	}

	/// `(timestamp, difficulty)` of every block from the head backwards, as
	/// the difficulty policy consumes them.
	pub fn difficulty_iter(&self) -> store::DifficultyIter<'_> {
		let head = self.head.read().last_block_h;
		store::DifficultyIter::from(head, self.store.clone())
	}

	/// Whether the full block is in the db.
	pub fn block_exists(&self, h: Hash) -> Result<bool, Error> {
		self.store
			.block_exists(&h)
			.map_err(store_err("chain block exists"))
	}
}

fn clean_sandbox(sandbox: &Path) {
	if let Err(e) = fs::remove_dir_all(sandbox) {
		warn!("txhashset_write: failed to clean sandbox {:?}: {}", sandbox, e);
	}
}

fn remove_historical_blocks(horizon: &BlockHeader, batch: &store::Batch<'_>) -> Result<(), Error> {
	let mut removed = 0;
	let mut current = batch.get_previous_header(horizon)?;
	while current.height > 0 {
		let hash = current.hash();
		if batch.block_exists(&hash)? {
			batch.delete_block(&hash)?;
			removed += 1;
		}
		current = batch.get_previous_header(&current)?;
	}
	debug!(
		"compact: removed {} blocks below {}",
		removed, horizon.height
	);
	Ok(())
}

fn setup_head(genesis: &Block, store: &store::ChainStore, txhashset: &mut TxHashSet) -> Result<(), Error> {
	let mut batch = store.batch()?;
	match batch.head() {
		Ok(mut head) => loop {
			// Files may have been left ahead of the db by an unclean stop:
			// rewinding a writeable extension truncates them back.
			let header = batch.get_block_header(&head.last_block_h)?;
			let res = txhashset::extending(txhashset, &mut batch, |extension| {
				extension.rewind(&header)?;
				extension.validate_roots()?;
				extension.validate_sizes()
			});
			match res {
				Ok(()) => {
					debug!("init: txhashset matches {} at {}", header.hash(), header.height);
					break;
				}
				Err(e) if head.height == 0 => {
					return Err(Error::InvalidTxHashSet(format!(
						"txhashset does not match the genesis header: {}",
						e
					)));
				}
				Err(e) => {
					warn!(
						"init: txhashset does not match {} at {}, stepping back: {}",
						header.hash(),
						header.height,
						e
					);
					let prev_header = batch.get_block_header(&head.prev_block_h)?;
					if let Err(e) = batch.delete_block(&header.hash()) {
						warn!("init: failed to delete block {}: {}", header.hash(), e);
					}
					head = Tip::from_header(&prev_header);
					batch.save_head(&head)?;
					batch.setup_height(&prev_header, &Tip::from_header(&header))?;
				}
			}
		},
		Err(mimble_store::Error::NotFoundErr(_)) => {
			let tip = Tip::from_header(&genesis.header);
			batch.save_block(genesis)?;
			batch.save_head(&tip)?;
			batch.setup_height(&genesis.header, &tip)?;
			txhashset::extending(txhashset, &mut batch, |extension| {
				extension.apply_block(genesis)?;
				extension.validate_roots()?;
				extension.validate_sizes()
			})?;
			info!("init: saved genesis {}", genesis.hash());
		}
		Err(e) => return Err(Error::StoreErr(e, "chain init load head".to_owned())),
	}

	let head = batch.head()?;
	batch.init_sync_head(&head)?;
	batch.commit()?;
	Ok(())
}
