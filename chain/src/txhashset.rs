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

//! The output, range proof and kernel MMRs, with the output position index,
//! and the units of work that extend or rewind them together.

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use croaring::Bitmap;

use crate::core::core::committed::Committed;
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::merkle_proof::MerkleProof;
use crate::core::core::pmmr::{self, Backend, ReadablePMMR, ReadonlyPMMR, PMMR};
use crate::core::core::{
	transaction, Block, BlockHeader, Commitment, CommitmentScheme, Input, Output, OutputIdentifier,
	RangeProof, Transaction, TxKernel,
};
use crate::core::global;
use crate::core::ser::{PMMRIndexHashable, PMMRable};
use crate::error::Error;
use crate::store::{Batch, ChainStore};
use crate::types::{TxHashSetRoots, TxHashsetWriteStatus};
use crate::util::{file, zip};
use mimble_store as store;
use mimble_store::pmmr::{PMMRBackend, PMMR_FILES};

const TXHASHSET_SUBDIR: &str = "txhashset";

const OUTPUT_SUBDIR: &str = "output";
const RANGE_PROOF_SUBDIR: &str = "rangeproof";
const KERNEL_SUBDIR: &str = "kernel";
const TREE_SUBDIRS: [&str; 3] = [OUTPUT_SUBDIR, RANGE_PROOF_SUBDIR, KERNEL_SUBDIR];

const TXHASHSET_ZIP: &str = "txhashset_snapshot.zip";

// Position of an output in the index, None when it isn't there.
fn indexed_pos(res: Result<u64, store::Error>, context: &str) -> Result<Option<u64>, Error> {
	match res {
		Ok(pos) => Ok(Some(pos)),
		Err(store::Error::NotFoundErr(_)) => Ok(None),
		Err(e) => Err(Error::StoreErr(e, context.to_owned())),
	}
}

fn root_of<P: ReadablePMMR>(tree: &P) -> Result<Hash, Error> {
	tree.root().map_err(Error::TxHashSetErr)
}

// One MMR on disk and the size last committed for it.
struct Tree<T: PMMRable> {
	backend: PMMRBackend<T>,
	size: u64,
}

impl<T: PMMRable> Tree<T> {
	fn open(
		root_dir: &Path,
		name: &str,
		prunable: bool,
		header: Option<&BlockHeader>,
	) -> Result<Tree<T>, Error> {
		let dir = root_dir.join(TXHASHSET_SUBDIR).join(name);
		fs::create_dir_all(&dir)?;
		let backend = PMMRBackend::new(&dir, prunable, header)?;
		Ok(Tree {
			size: backend.unpruned_size(),
			backend,
		})
	}

	fn view(&self) -> ReadonlyPMMR<'_, T, PMMRBackend<T>> {
		ReadonlyPMMR::at(&self.backend, self.size)
	}

	fn extend(&mut self) -> PMMR<'_, T, PMMRBackend<T>> {
		PMMR::at(&mut self.backend, self.size)
	}

	fn commit(&mut self, size: u64) -> Result<(), Error> {
		self.backend.sync().map_err(Error::TxHashSetErr)?;
		self.size = size;
		Ok(())
	}
}

/// The three MMRs making up the chain state along with the index of output
/// commitments to their MMR positions.
///
/// The index only says where an output was put. Whether it is still
/// unspent is up to the output MMR, the index can point at spent outputs.
pub struct TxHashSet {
	outputs: Tree<OutputIdentifier>,
	rproofs: Tree<RangeProof>,
	kernels: Tree<TxKernel>,
	index: Arc<ChainStore>,
}

impl TxHashSet {
	/// Opens the MMRs under `root_dir`, creating them if needed. The leaf
	/// sets of the prunable ones are read as of `header` when provided.
	pub fn open(
		root_dir: String,
		index: Arc<ChainStore>,
		header: Option<&BlockHeader>,
	) -> Result<TxHashSet, Error> {
		let root_dir = Path::new(&root_dir);
		Ok(TxHashSet {
			outputs: Tree::open(root_dir, OUTPUT_SUBDIR, true, header)?,
			rproofs: Tree::open(root_dir, RANGE_PROOF_SUBDIR, true, header)?,
			kernels: Tree::open(root_dir, KERNEL_SUBDIR, false, None)?,
			index,
		})
	}

	/// Closes every backend file.
	pub fn release_backend_files(&mut self) {
		self.outputs.backend.release_files();
		self.rproofs.backend.release_files();
		self.kernels.backend.release_files();
	}

	fn discard(&mut self) {
		self.outputs.backend.discard();
		self.rproofs.backend.discard();
		self.kernels.backend.discard();
	}

	/// Hash and position of the output if it is unspent. An index entry
	/// pointing at some other output is a state mismatch.
	pub fn is_unspent(&self, output_id: &OutputIdentifier) -> Result<(Hash, u64), Error> {
		let res = self.index.get_output_pos(&output_id.commit);
		let pos = indexed_pos(res, "txhashset unspent check")?.ok_or(Error::OutputNotFound)?;
		match self.outputs.view().get_hash(pos) {
			None => Err(Error::OutputNotFound),
			Some(hash) if hash == output_id.hash_with_index(pos - 1) => Ok((hash, pos)),
			Some(_) => Err(Error::StateMismatch(
				"output index points at a different output".to_owned(),
			)),
		}
	}

	/// Last `distance` outputs, newest first.
	pub fn last_n_output(&self, distance: u64) -> Vec<(Hash, OutputIdentifier)> {
		self.outputs.view().get_last_n_insertions(distance)
	}

	/// Last `distance` kernels, newest first.
	pub fn last_n_kernel(&self, distance: u64) -> Vec<(Hash, TxKernel)> {
		self.kernels.view().get_last_n_insertions(distance)
	}

	/// Unspent outputs from leaf index `start_index` on, with the index of
	/// the last one returned.
	pub fn outputs_by_insertion_index(
		&self,
		start_index: u64,
		max_count: u64,
	) -> (u64, Vec<OutputIdentifier>) {
		self.outputs
			.view()
			.elements_from_insertion_index(start_index, max_count)
	}

	/// Number of outputs ever added.
	pub fn highest_output_insertion_index(&self) -> u64 {
		pmmr::n_leaves(self.outputs.size)
	}

	/// Range proofs from leaf index `start_index` on.
	pub fn rangeproofs_by_insertion_index(
		&self,
		start_index: u64,
		max_count: u64,
	) -> (u64, Vec<RangeProof>) {
		self.rproofs
			.view()
			.elements_from_insertion_index(start_index, max_count)
	}

	/// Roots of the three MMRs as committed.
	pub fn roots(&self) -> Result<TxHashSetRoots, Error> {
		Ok(TxHashSetRoots {
			output_root: root_of(&self.outputs.view())?,
			rproof_root: root_of(&self.rproofs.view())?,
			kernel_root: root_of(&self.kernels.view())?,
		})
	}

	/// Output, range proof and kernel MMR sizes.
	pub fn sizes(&self) -> (u64, u64, u64) {
		(self.outputs.size, self.rproofs.size, self.kernels.size)
	}

	/// Merkle proof of the unspent output with this commitment against the
	/// current output root.
	pub fn merkle_proof(&self, commit: Commitment) -> Result<MerkleProof, Error> {
		let res = self.index.get_output_pos(&commit);
		let pos = indexed_pos(res, "txhashset merkle proof")?.ok_or(Error::OutputNotFound)?;
		self.outputs
			.view()
			.merkle_proof(pos)
			.map_err(Error::TxHashSetErr)
	}

	/// Drops the data of outputs spent before the horizon from the output
	/// and range proof files. Spends after the horizon are kept so a rewind
	/// there still works.
	pub fn compact(&mut self, horizon_header: &BlockHeader, batch: &Batch<'_>) -> Result<(), Error> {
		let head_header = batch.head_header()?;
		let keep = input_pos_to_rewind(horizon_header, &head_header, batch)?;
		debug!(
			"txhashset: compacting below {} (keeping {} spent)",
			horizon_header.height,
			keep.cardinality()
		);

		let cutoff = horizon_header.output_mmr_size;
		self.outputs.backend.check_compact(cutoff, &keep)?;
		self.rproofs.backend.check_compact(cutoff, &keep)?;
		Ok(())
	}
}

/// Runs `inner` over an extension at the current head and throws away
/// whatever it did, whatever it returns.
pub fn extending_readonly<F, T>(trees: &mut TxHashSet, inner: F) -> Result<T, Error>
where
	F: FnOnce(&mut Extension<'_>) -> Result<T, Error>,
{
	let index = trees.index.clone();
	let batch = index.batch()?;
	let header = batch.head_header()?;

	let res = {
		let mut extension = Extension::new(trees, &batch, header);
		extension.force_rollback();
		inner(&mut extension)
	};
	trees.discard();
	res
}

/// Runs `inner` over an extension at the current head. Index changes go to
/// a child of `batch`. They are kept, and the MMRs synced, only when `inner`
/// succeeds without forcing a rollback.
pub fn extending<'a, F, T>(
	trees: &'a mut TxHashSet,
	batch: &'a mut Batch<'_>,
	inner: F,
) -> Result<T, Error>
where
	F: FnOnce(&mut Extension<'_>) -> Result<T, Error>,
{
	let header = batch.head_header()?;
	let child = batch.child()?;

	let (res, rollback, sizes) = {
		let mut extension = Extension::new(trees, &child, header);
		let res = inner(&mut extension);
		(res, extension.rollback, extension.sizes())
	};

	match res {
		Ok(r) if !rollback => {
			trace!("txhashset: committing extension at sizes {:?}", sizes);
			child.commit()?;
			trees.outputs.commit(sizes.0)?;
			trees.rproofs.commit(sizes.1)?;
			trees.kernels.commit(sizes.2)?;
			Ok(r)
		}
		Ok(r) => {
			trace!("txhashset: rolling back extension at sizes {:?}", sizes);
			trees.discard();
			Ok(r)
		}
		Err(e) => {
			debug!("txhashset: discarding extension: {}", e);
			trees.discard();
			Err(e)
		}
	}
}

/// The MMRs opened for a unit of work, applying or rewinding blocks.
pub struct Extension<'a> {
	header: BlockHeader,

	outputs: PMMR<'a, OutputIdentifier, PMMRBackend<OutputIdentifier>>,
	rproofs: PMMR<'a, RangeProof, PMMRBackend<RangeProof>>,
	kernels: PMMR<'a, TxKernel, PMMRBackend<TxKernel>>,

	rollback: bool,

	/// Batch the index changes go to. Rolled back along with the extension.
	pub batch: &'a Batch<'a>,
}

impl<'a> Committed for Extension<'a> {
	fn inputs_committed(&self) -> Vec<Commitment> {
		vec![]
	}

	fn outputs_committed(&self) -> Vec<Commitment> {
		self.outputs
			.leaf_pos_iter()
			.filter_map(|pos| self.outputs.get_data(pos))
			.map(|out| out.commit)
			.collect()
	}

	fn kernels_committed(&self) -> Vec<Commitment> {
		self.kernels
			.leaf_pos_iter()
			.filter_map(|pos| self.kernels.get_data(pos))
			.map(|kernel| kernel.excess)
			.collect()
	}
}

impl<'a> Extension<'a> {
	fn new(trees: &'a mut TxHashSet, batch: &'a Batch<'_>, header: BlockHeader) -> Extension<'a> {
		Extension {
			header,
			outputs: trees.outputs.extend(),
			rproofs: trees.rproofs.extend(),
			kernels: trees.kernels.extend(),
			rollback: false,
			batch,
		}
	}

	/// Header of the last block applied (or rewound to).
	pub fn head_header(&self) -> &BlockHeader {
		&self.header
	}

	/// Fails when an input spends a coinbase output created fewer than
	/// coinbase maturity blocks before `height`.
	pub fn verify_coinbase_maturity(&self, inputs: &[Input], height: u64) -> Result<(), Error> {
		let newest = inputs
			.iter()
			.filter(|input| input.is_coinbase())
			.filter_map(|input| self.batch.get_output_pos(&input.commitment()).ok())
			.max();
		let pos = match newest {
			Some(pos) => pos,
			None => return Ok(()),
		};

		let maturity = global::coinbase_maturity();
		if height < maturity {
			return Err(Error::ImmatureCoinbase);
		}
		// mature outputs all sit within the output MMR as of maturity blocks ago
		let cutoff = self.batch.get_header_by_height(height - maturity)?;
		if pos > cutoff.output_mmr_size {
			return Err(Error::ImmatureCoinbase);
		}
		Ok(())
	}

	/// Applies the outputs, then the inputs, then the kernels of the block
	/// and returns the positions it spent.
	pub fn apply_block(&mut self, b: &Block) -> Result<Bitmap, Error> {
		let mut spent = Bitmap::create();
		self.apply_parts(b.outputs(), b.inputs(), b.kernels(), &mut spent)?;
		self.header = b.header.clone();
		Ok(spent)
	}

	/// Tries loose transactions on top of the current state, in order, and
	/// returns those that apply. `pre_tx` has to apply before any of them.
	/// Readonly extensions only.
	pub fn validate_raw_txs(
		&mut self,
		txs: &[Transaction],
		pre_tx: Option<&Transaction>,
		height: u64,
	) -> Result<Vec<Transaction>, Error> {
		if let Some(tx) = pre_tx {
			self.apply_raw_tx(tx, height)?;
		}

		let mut valid_txs = vec![];
		for tx in txs {
			match self.apply_raw_tx(tx, height) {
				Ok(()) => valid_txs.push(tx.clone()),
				Err(e) => debug!("validate_raw_txs: dropping {}: {}", tx.hash(), e),
			}
		}
		Ok(valid_txs)
	}

	// A failing tx is undone on its own, leaving whatever applied before it.
	fn apply_raw_tx(&mut self, tx: &Transaction, height: u64) -> Result<(), Error> {
		if !self.rollback {
			return Err(Error::Other(
				"raw transactions only apply to a readonly extension".to_owned(),
			));
		}
		if tx.lock_height() > height {
			return Err(Error::TxLockHeight);
		}
		self.verify_coinbase_maturity(tx.inputs(), height)?;

		let (output_pos, _, kernel_pos) = self.sizes();
		let mut spent = Bitmap::create();
		let res = self.apply_parts(tx.outputs(), tx.inputs(), tx.kernels(), &mut spent);
		if res.is_err() {
			for out in tx.outputs() {
				let commit = out.commitment();
				match self.batch.get_output_pos(&commit) {
					Ok(pos) if pos > output_pos => self.batch.delete_output_pos(&commit)?,
					_ => {}
				}
			}
			self.rewind_to_pos(output_pos, kernel_pos, &spent)?;
		}
		res
	}

	fn apply_parts(
		&mut self,
		outputs: &[Output],
		inputs: &[Input],
		kernels: &[TxKernel],
		spent: &mut Bitmap,
	) -> Result<(), Error> {
		for out in outputs {
			let pos = self.apply_output(out)?;
			self.batch.save_output_pos(&out.commitment(), pos)?;
		}
		for input in inputs {
			let pos = self.apply_input(input)?;
			spent.add(pos as u32);
		}
		for kernel in kernels {
			self.kernels.push(kernel).map_err(Error::TxHashSetErr)?;
		}
		Ok(())
	}

	fn apply_input(&mut self, input: &Input) -> Result<u64, Error> {
		let commit = input.commitment();
		let res = self.batch.get_output_pos(&commit);
		let pos = match indexed_pos(res, "txhashset apply input")? {
			Some(pos) if pos <= self.outputs.unpruned_size() => pos,
			_ => return Err(Error::AlreadySpent(commit)),
		};

		// the input has to match the output it claims to spend, both in the
		// hash file and in the data file
		let expected = OutputIdentifier::from_input(input).hash_with_index(pos - 1);
		if let Some(hash) = self.outputs.get_hash(pos) {
			let data_hash = self
				.outputs
				.get_data(pos)
				.map(|out| out.hash_with_index(pos - 1));
			if hash != expected || data_hash != Some(expected) {
				return Err(Error::StateMismatch(
					"spent output does not match the output index".to_owned(),
				));
			}
		}

		if !self.outputs.prune(pos).map_err(Error::TxHashSetErr)? {
			return Err(Error::AlreadySpent(commit));
		}
		self.rproofs.prune(pos).map_err(Error::TxHashSetErr)?;
		Ok(pos)
	}

	fn apply_output(&mut self, out: &Output) -> Result<u64, Error> {
		let commit = out.commitment();
		if let Ok(pos) = self.batch.get_output_pos(&commit) {
			if self.outputs.get_data(pos).map(|o| o.commit) == Some(commit) {
				return Err(Error::DuplicateCommitment(commit));
			}
		}

		let pos = self
			.outputs
			.push(&OutputIdentifier::from_output(out))
			.map_err(Error::TxHashSetErr)?;
		let rproof_pos = self.rproofs.push(&out.proof).map_err(Error::TxHashSetErr)?;
		if pos != rproof_pos || self.outputs.unpruned_size() != self.rproofs.unpruned_size() {
			return Err(Error::Other(format!(
				"output and range proof MMRs out of step at {} and {}",
				pos, rproof_pos
			)));
		}
		Ok(pos)
	}

	/// Merkle proof of the unspent output against the extension's output
	/// root. Positions are stable under pruning and compaction so the proof
	/// holds whatever was spent around it.
	pub fn merkle_proof(&self, output: &OutputIdentifier) -> Result<MerkleProof, Error> {
		let res = self.batch.get_output_pos(&output.commit);
		let pos = match indexed_pos(res, "txhashset merkle proof")? {
			Some(pos) if self.outputs.get_hash(pos).is_some() => pos,
			_ => return Err(Error::OutputNotFound),
		};
		self.outputs.merkle_proof(pos).map_err(Error::TxHashSetErr)
	}

	/// Keeps a copy of the output and range proof leaf sets as of the
	/// current header, for the state snapshot.
	pub fn snapshot(&mut self) -> Result<(), Error> {
		self.outputs.snapshot(&self.header).map_err(Error::Other)?;
		self.rproofs.snapshot(&self.header).map_err(Error::Other)?;
		Ok(())
	}

	/// Rewinds the MMRs and the output index to `header`, bringing back
	/// the outputs spent since.
	pub fn rewind(&mut self, header: &BlockHeader) -> Result<(), Error> {
		debug!("txhashset: rewind to {} at {}", header.hash(), header.height);

		let spent = input_pos_to_rewind(header, &self.header, self.batch)?;
		self.clean_output_index(header)?;
		self.rewind_to_pos(header.output_mmr_size, header.kernel_mmr_size, &spent)?;
		self.header = header.clone();
		Ok(())
	}

	// Drops the index entries of the outputs created by the blocks being
	// rewound, they all sit beyond the output MMR size we rewind to.
	fn clean_output_index(&self, header: &BlockHeader) -> Result<(), Error> {
		let mut current = self.header.clone();
		while current.height > header.height {
			if let Ok(block) = self.batch.get_block(&current.hash()) {
				for out in block.outputs() {
					let commit = out.commitment();
					match self.batch.get_output_pos(&commit) {
						Ok(pos) if pos > header.output_mmr_size => {
							self.batch.delete_output_pos(&commit)?
						}
						_ => {}
					}
				}
			}
			current = self.batch.get_previous_header(&current)?;
		}
		Ok(())
	}

	fn rewind_to_pos(
		&mut self,
		output_pos: u64,
		kernel_pos: u64,
		spent: &Bitmap,
	) -> Result<(), Error> {
		trace!(
			"txhashset: rewind to output {}, kernel {}",
			output_pos,
			kernel_pos
		);
		self.outputs
			.rewind(output_pos, spent)
			.map_err(Error::TxHashSetErr)?;
		self.rproofs
			.rewind(output_pos, spent)
			.map_err(Error::TxHashSetErr)?;
		self.kernels
			.rewind(kernel_pos, &Bitmap::create())
			.map_err(Error::TxHashSetErr)?;
		Ok(())
	}

	/// Current roots of the three MMRs.
	pub fn roots(&self) -> Result<TxHashSetRoots, Error> {
		Ok(TxHashSetRoots {
			output_root: root_of(&self.outputs)?,
			rproof_root: root_of(&self.rproofs)?,
			kernel_root: root_of(&self.kernels)?,
		})
	}

	/// Checks the roots against the current header. Genesis has nothing to
	/// check.
	pub fn validate_roots(&self) -> Result<(), Error> {
		if self.header.height == 0 {
			return Ok(());
		}
		let roots = self.roots()?;
		let header = &self.header;
		if roots.output_root == header.output_root
			&& roots.rproof_root == header.range_proof_root
			&& roots.kernel_root == header.kernel_root
		{
			Ok(())
		} else {
			Err(Error::InvalidRoot)
		}
	}

	/// Checks the MMR sizes against the current header.
	pub fn validate_sizes(&self) -> Result<(), Error> {
		if self.header.height == 0 {
			return Ok(());
		}
		let (outputs, rproofs, kernels) = self.sizes();
		if outputs == self.header.output_mmr_size
			&& rproofs == outputs
			&& kernels == self.header.kernel_mmr_size
		{
			Ok(())
		} else {
			Err(Error::InvalidMMRSize)
		}
	}

	fn validate_mmrs(&self) -> Result<(), Error> {
		let now = Instant::now();
		self.outputs.validate().map_err(Error::InvalidTxHashSet)?;
		self.rproofs.validate().map_err(Error::InvalidTxHashSet)?;
		self.kernels.validate().map_err(Error::InvalidTxHashSet)?;
		debug!(
			"txhashset: validated mmrs of sizes {:?} in {}ms",
			self.sizes(),
			now.elapsed().as_millis()
		);
		Ok(())
	}

	/// Checks that the unspent outputs less the total supply sum to the
	/// kernel excesses plus the total offset of the current header.
	pub fn validate_kernel_sums(
		&self,
		scheme: &dyn CommitmentScheme,
	) -> Result<(Commitment, Commitment), Error> {
		let sums = self.verify_kernel_sums(
			self.header.total_overage(),
			self.header.total_kernel_offset,
			scheme,
		)?;
		Ok(sums)
	}

	/// Full check of the state against the current header. A fast one
	/// skips range proofs and kernel signatures.
	pub fn validate(
		&self,
		fast_validation: bool,
		status: &dyn TxHashsetWriteStatus,
		scheme: &dyn CommitmentScheme,
	) -> Result<(), Error> {
		self.validate_mmrs()?;
		self.validate_roots()?;
		self.validate_sizes()?;
		if self.header.height == 0 {
			return Ok(());
		}

		self.validate_kernel_sums(scheme)?;
		if !fast_validation {
			self.verify_rangeproofs(status, scheme)?;
			self.verify_kernel_signatures(status, scheme)?;
		}
		Ok(())
	}

	/// Rebuilds the output index from the unspent outputs, after a state
	/// snapshot was swapped in.
	pub fn rebuild_index(&self) -> Result<(), Error> {
		for pos in self.outputs.leaf_pos_iter() {
			if let Some(out) = self.outputs.get_data(pos) {
				self.batch.save_output_pos(&out.commit, pos)?;
			}
		}
		Ok(())
	}

	/// Throws the work away once done, even when it succeeds.
	pub fn force_rollback(&mut self) {
		self.rollback = true;
	}

	/// Output, range proof and kernel MMR sizes.
	pub fn sizes(&self) -> (u64, u64, u64) {
		(
			self.outputs.unpruned_size(),
			self.rproofs.unpruned_size(),
			self.kernels.unpruned_size(),
		)
	}

	fn verify_kernel_signatures(
		&self,
		status: &dyn TxHashsetWriteStatus,
		scheme: &dyn CommitmentScheme,
	) -> Result<(), Error> {
		let now = Instant::now();
		let total = pmmr::n_leaves(self.kernels.unpruned_size());
		let mut verified = 0;
		for pos in 1..=self.kernels.unpruned_size() {
			if let Some(kernel) = self.kernels.get_data(pos) {
				kernel.verify(scheme)?;
				verified += 1;
				if verified % 20 == 0 {
					status.on_validation(verified, total, 0, 0);
				}
			}
		}
		debug!(
			"txhashset: verified {} kernel signatures in {}ms",
			verified,
			now.elapsed().as_millis()
		);
		Ok(())
	}

	fn verify_rangeproofs(
		&self,
		status: &dyn TxHashsetWriteStatus,
		scheme: &dyn CommitmentScheme,
	) -> Result<(), Error> {
		let now = Instant::now();
		let total = self.outputs.n_unpruned_leaves();
		let mut verified = 0;
		for pos in self.outputs.leaf_pos_iter() {
			let out = match self.outputs.get_data(pos) {
				Some(out) => out,
				None => continue,
			};
			let proof = self.rproofs.get_data(pos).ok_or(Error::OutputNotFound)?;
			scheme
				.verify_rangeproof(&out.commit, &proof)
				.map_err(transaction::Error::from)?;
			verified += 1;
			if verified % 20 == 0 {
				status.on_validation(0, 0, verified, total);
			}
		}
		debug!(
			"txhashset: verified {} range proofs in {}ms",
			verified,
			now.elapsed().as_millis()
		);
		Ok(())
	}
}

/// Zips the txhashset files as of `header` and opens the archive for
/// reading. Files that don't belong in a snapshot at that header are left
/// out.
pub fn zip_read(root_dir: String, header: &BlockHeader) -> Result<File, Error> {
	let root_dir = Path::new(&root_dir);
	let staging = root_dir.join(format!("{}_zip", TXHASHSET_SUBDIR));
	let zip_path = root_dir.join(TXHASHSET_ZIP);

	file::delete(&staging)?;
	file::copy_dir_to(&root_dir.join(TXHASHSET_SUBDIR), &staging)?;
	check_and_remove_files(&staging, header)?;
	zip::compress(&staging, &File::create(&zip_path)?).map_err(|e| Error::Other(e.to_string()))?;

	Ok(File::open(zip_path)?)
}

/// Unpacks a txhashset snapshot for `header` under `root_dir`, keeping
/// only the files such a snapshot is made of.
pub fn zip_write(root_dir: PathBuf, txhashset_data: File, header: &BlockHeader) -> Result<(), Error> {
	let txhashset_path = root_dir.join(TXHASHSET_SUBDIR);
	fs::create_dir_all(&txhashset_path)?;
	let expected = expected_files(header);
	zip::decompress(txhashset_data, &txhashset_path, |path| {
		let mut parts = path.iter().filter_map(|c| c.to_str());
		match (parts.next(), parts.next(), parts.next()) {
			(Some(dir), Some(name), None) => TREE_SUBDIRS.contains(&dir) && expected.contains(name),
			_ => false,
		}
	})
	.map_err(|e| Error::Other(e.to_string()))?;
	check_and_remove_files(&txhashset_path, header)
}

/// Replaces the txhashset directory under `to` with the one under `from`.
pub fn txhashset_replace(from: PathBuf, to: PathBuf) -> Result<(), Error> {
	debug!("txhashset_replace: {:?} to {:?}", from, to);
	let target = to.join(TXHASHSET_SUBDIR);
	file::delete(&target)?;
	fs::rename(from.join(TXHASHSET_SUBDIR), &target).map_err(|e| {
		error!("txhashset_replace: rename into {:?} failed: {}", target, e);
		Error::TxHashSetErr(format!("txhashset replace failed: {}", e))
	})
}

// Files a snapshot at the header is made of, the leaf set being the one
// saved for that header.
fn expected_files(header: &BlockHeader) -> HashSet<String> {
	PMMR_FILES
		.iter()
		.map(|name| {
			if name.contains("pmmr_leaf.bin") {
				format!("{}.{}", name, header.hash())
			} else {
				name.to_string()
			}
		})
		.collect()
}

fn entry_names(dir: &Path) -> Result<HashSet<String>, Error> {
	let mut names = HashSet::new();
	for entry in fs::read_dir(dir)? {
		if let Some(name) = entry?.file_name().to_str() {
			names.insert(name.to_owned());
		}
	}
	Ok(names)
}

fn remove_unexpected(dir: &Path, expected: &HashSet<String>) -> Result<(), Error> {
	for name in entry_names(dir)?.difference(expected) {
		debug!("txhashset: removing unexpected {:?} from {:?}", name, dir);
		file::delete(dir.join(name))?;
	}
	Ok(())
}

// Keeps only the tree subdirectories and, within them, the files expected
// in a snapshot at the header.
fn check_and_remove_files(txhashset_path: &Path, header: &BlockHeader) -> Result<(), Error> {
	let subdirs: HashSet<String> = TREE_SUBDIRS.iter().map(|s| s.to_string()).collect();
	remove_unexpected(txhashset_path, &subdirs)?;

	let files = expected_files(header);
	for subdir in &subdirs {
		let path = txhashset_path.join(subdir);
		if path.is_dir() {
			remove_unexpected(&path, &files)?;
		}
	}
	Ok(())
}

/// Positions spent by the blocks from `head_header` back to (excluding)
/// `block_header`, walking previous links so forks work too. These are the
/// outputs a rewind to `block_header` has to bring back.
pub fn input_pos_to_rewind(
	block_header: &BlockHeader,
	head_header: &BlockHeader,
	batch: &Batch<'_>,
) -> Result<Bitmap, Error> {
	let mut spent = Bitmap::create();
	let target = block_header.hash();
	let mut current = head_header.clone();
	while current.height > block_header.height && current.hash() != target {
		if let Ok(bitmap) = batch.get_block_input_bitmap(&current.hash()) {
			spent.or_inplace(&bitmap);
		}
		current = batch.get_previous_header(&current)?;
	}
	Ok(spent)
}
