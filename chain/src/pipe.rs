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

//! Implementation of the chain block acceptance (or refusal) pipeline.

use std::sync::Arc;

use chrono::prelude::Utc;
use chrono::Duration;
use croaring::Bitmap;

use crate::core::consensus;
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::{Block, BlockHeader, CommitmentScheme};
use crate::error::Error;
use crate::store;
use crate::txhashset;
use crate::types::{NextDifficulty, Options, Tip, VerifyPow};

/// Contextual information required to process a new block and either reject or
/// accept it.
pub struct BlockContext<'a> {
	/// The options
	pub opts: Options,
	/// The pow verifier to use when processing a block.
	pub pow_verifier: Arc<dyn VerifyPow>,
	/// The difficulty policy new headers are checked against.
	pub difficulty: Arc<dyn NextDifficulty>,
	/// Commitment arithmetic used to validate block bodies.
	pub scheme: Arc<dyn CommitmentScheme>,
	/// The active txhashset (rewindable MMRs) to use for block processing.
	pub txhashset: &'a mut txhashset::TxHashSet,
	/// The active batch to use for block processing.
	pub batch: store::Batch<'a>,
}

/// Runs the block processing pipeline, including validation and finding a
/// place for the new block in the chain.
/// Returns new head if chain head updated.
pub fn process_block(b: &Block, ctx: &mut BlockContext<'_>) -> Result<Option<Tip>, Error> {
	debug!(
		"pipe: process_block {} at {}, in/out/kern: {}/{}/{}",
		b.hash(),
		b.header.height,
		b.inputs().len(),
		b.outputs().len(),
		b.kernels().len(),
	);

	let head = ctx.batch.head()?;

	// Fast in-memory checks to avoid re-processing a block we recently processed.
	check_known(&b.header, &head, ctx)?;

	// Does this block extend the current head directly.
	let is_next = b.header.previous == head.last_block_h;

	// Block is an orphan if we do not know about the previous full block.
	// Skip this check if we have just processed the previous block.
	let prev = match ctx.batch.get_previous_header(&b.header) {
		Ok(prev) => prev,
		Err(mimble_store::Error::NotFoundErr(_)) => return Err(Error::Orphan),
		Err(e) => return Err(e.into()),
	};
	if !is_next && !ctx.batch.block_exists(&prev.hash())? {
		return Err(Error::Orphan);
	}

	// Process the header for the block.
	// Note: We still want to process the full block if we have seen this header before
	// as we may have processed it "header first" and not yet processed the full block.
	process_header_for_block(&b.header, &prev, ctx)?;

	// Validate the block itself, make sure it is internally consistent.
	validate_block(b, &prev, ctx)?;

	// Start a chain extension unit of work dependent on the success of the
	// internal validation and saving operations
	let has_more_work = b.header.total_difficulty() > head.total_difficulty;
	let spent = txhashset::extending(ctx.txhashset, &mut ctx.batch, |extension| {
		// First we rewind the txhashset extension if necessary
		// to put it into a consistent state for validating the block.
		// We can skip this step if the previous header is the latest header we saw.
		if !is_next {
			rewind_and_apply_fork(b, extension)?;
		}

		// Check any coinbase being spent have matured sufficiently.
		// This needs to be done within the context of a potentially
		// rewound txhashset extension to reflect chain state prior
		// to applying the new block.
		extension.verify_coinbase_maturity(b.inputs(), b.header.height)?;

		// Apply the block to the txhashset state.
		// Validate the txhashset roots and sizes against the block header.
		// Block is invalid if there are any discrepencies.
		let spent = apply_block_to_txhashset(b, extension)?;

		// If applying this block does not increase the work on the chain then
		// we know we have not yet updated the chain to produce a new chain head.
		if !has_more_work {
			extension.force_rollback();
		}

		Ok(spent)
	})?;

	// Add the validated block to the db along with the corresponding
	// block_input_bitmap.
	// We do this even if we have not increased the total cumulative work
	// so we can maintain multiple (in progress) forks.
	add_block(b, &spent, &ctx.batch)?;

	// Update the chain head if total work is increased.
	let res = update_head(b, &head, ctx)?;
	Ok(res)
}

/// Process the block header.
/// This is only ever used during sync and is based on sync_head.
/// We update the sync head to reflect the new header, the header head
/// follows when the header increases the total work we know about.
pub fn sync_block_header(bh: &BlockHeader, ctx: &mut BlockContext<'_>) -> Result<Option<Tip>, Error> {
	debug!(
		"pipe: sync_block_header: {} at {}",
		bh.hash(),
		bh.height
	);

	let prev = match ctx.batch.get_previous_header(bh) {
		Ok(prev) => prev,
		Err(mimble_store::Error::NotFoundErr(_)) => return Err(Error::Orphan),
		Err(e) => return Err(e.into()),
	};

	if !ctx.batch.block_header_exists(&bh.hash())? {
		validate_header(bh, &prev, ctx)?;
		add_block_header(bh, &ctx.batch)?;
	}

	ctx.batch.save_sync_head(&Tip::from_header(bh))?;

	update_header_head(bh, ctx)
}

/// Process block header as part of "header first" block propagation.
/// We validate the header but we do not store it or update header head based
/// on this. We will update these once we get the block back after requesting
/// it.
pub fn process_block_header(bh: &BlockHeader, ctx: &mut BlockContext<'_>) -> Result<(), Error> {
	debug!(
		"pipe: process_block_header: {} at {}",
		bh.hash(),
		bh.height,
	);

	// Check this header is not an obvious duplicate of a header we already
	// processed, returning early if so.
	if ctx.batch.block_header_exists(&bh.hash())? {
		return Ok(());
	}

	let prev = match ctx.batch.get_previous_header(bh) {
		Ok(prev) => prev,
		Err(mimble_store::Error::NotFoundErr(_)) => return Err(Error::Orphan),
		Err(e) => return Err(e.into()),
	};
	validate_header(bh, &prev, ctx)?;
	add_block_header(bh, &ctx.batch)?;
	update_header_head(bh, ctx)?;

	Ok(())
}

// Quick in-memory check to fast-reject any block we already processed.
fn check_known(header: &BlockHeader, head: &Tip, ctx: &BlockContext<'_>) -> Result<(), Error> {
	let bh = header.hash();
	if bh == head.last_block_h || bh == head.prev_block_h {
		return Err(Error::Unfit("already known in head".to_string()));
	}
	if ctx.batch.block_exists(&bh)? {
		return Err(Error::Unfit("already known in store".to_string()));
	}
	Ok(())
}

// Validates and saves the header of a full block, moving the header head
// along if the block carries more work.
fn process_header_for_block(
	header: &BlockHeader,
	prev: &BlockHeader,
	ctx: &mut BlockContext<'_>,
) -> Result<(), Error> {
	validate_header(header, prev, ctx)?;
	add_block_header(header, &ctx.batch)?;
	update_header_head(header, ctx)?;
	Ok(())
}

/// First level of block validation that only needs to act on the block header
/// to make it as cheap as possible. The different validations are also
/// arranged by order of cost to have as little DoS surface as possible.
fn validate_header(
	header: &BlockHeader,
	prev: &BlockHeader,
	ctx: &mut BlockContext<'_>,
) -> Result<(), Error> {
	// check version, enforces scheduled hard fork
	if !consensus::valid_header_version(header.height, header.version) {
		error!(
			"Invalid block header version received ({}), maybe update the node?",
			header.version
		);
		return Err(Error::InvalidBlockVersion(header.version));
	}

	let future_limit = Utc::now()
		+ Duration::seconds((consensus::FUTURE_TIME_LIMIT_BLOCKS * consensus::BLOCK_TIME_SEC) as i64);
	if header.timestamp > future_limit {
		// refuse blocks more than 12 blocks intervals in future (as in bitcoin)
		return Err(Error::Unfit("block time too far in future".to_string()));
	}

	if !ctx.opts.contains(Options::SKIP_POW) && !ctx.pow_verifier.verify(header) {
		error!(
			"pipe: error validating header with cuckoo edge_bits {}",
			header.pow.edge_bits
		);
		return Err(Error::InvalidPow);
	}

	if header.height != prev.height + 1 {
		return Err(Error::InvalidBlockHeight);
	}

	if header.timestamp <= prev.timestamp {
		// prevent time warp attacks and some timestamp manipulations by forcing strict
		// time progression
		return Err(Error::InvalidBlockTime);
	}

	// verify the proof of work and related parameters
	// at this point we have a previous block header
	// we know the height increased by one
	// so now we can check the total_difficulty increase is also valid
	// check the pow hash shows a difficulty at least as large
	// as the target difficulty
	if header.total_difficulty() <= prev.total_difficulty() {
		return Err(Error::DifficultyTooLow);
	}

	if !ctx.opts.contains(Options::SKIP_POW) {
		let target_difficulty = header.difficulty(prev);

		// explicit check to ensure total_difficulty has increased by exactly
		// the _network_ difficulty of the previous block
		let mut diff_iter = store::DifficultyIter::from_batch(prev.hash(), ctx.batch.child()?);
		let next_difficulty = ctx.difficulty.next_difficulty(&mut diff_iter)?;
		if target_difficulty != next_difficulty {
			info!(
				"validate_header: header target difficulty {} != {}",
				target_difficulty.to_num(),
				next_difficulty.to_num(),
			);
			return Err(Error::WrongTotalDifficulty);
		}
	}

	Ok(())
}

fn validate_block(b: &Block, prev: &BlockHeader, ctx: &mut BlockContext<'_>) -> Result<(), Error> {
	b.validate(
		&prev.total_kernel_offset,
		&prev.total_kernel_sum,
		ctx.scheme.as_ref(),
	)
	.map_err(|e| {
		debug!("pipe: validate_block {} failed: {}", b.hash(), e);
		Error::Block(e)
	})?;
	Ok(())
}

/// Fully validate the block by applying it to the txhashset extension.
/// Check both the txhashset roots and sizes are correct after applying the block.
fn apply_block_to_txhashset(
	block: &Block,
	ext: &mut txhashset::Extension<'_>,
) -> Result<Bitmap, Error> {
	let spent = ext.apply_block(block)?;
	ext.validate_roots()?;
	ext.validate_sizes()?;
	Ok(spent)
}

/// Officially adds the block to our chain.
/// Header must be added separately (assume this has been done previously).
fn add_block(b: &Block, spent: &Bitmap, batch: &store::Batch<'_>) -> Result<(), Error> {
	batch.save_block(b)?;
	batch.save_block_input_bitmap(&b.hash(), spent)?;
	Ok(())
}

/// Officially adds the block header to our header chain.
fn add_block_header(bh: &BlockHeader, batch: &store::Batch<'_>) -> Result<(), Error> {
	batch.save_block_header(bh)?;
	Ok(())
}

/// Directly updates the head if we've just appended a new block to it or handle
/// the situation where we've just added enough work to have a fork with more
/// work than the head.
fn update_head(b: &Block, head: &Tip, ctx: &mut BlockContext<'_>) -> Result<Option<Tip>, Error> {
	// if we made a fork with more work than the head (which should also be true
	// when extending the head), update it
	if b.header.total_difficulty() > head.total_difficulty {
		// update the block height index
		ctx.batch.save_body_head(&Tip::from_header(&b.header))?;
		ctx.batch.setup_height(&b.header, head)?;

		debug!(
			"pipe: head updated to {} at {}",
			b.hash(),
			b.header.height
		);

		Ok(Some(Tip::from_header(&b.header)))
	} else {
		Ok(None)
	}
}

/// Update the header head if this header has most work.
fn update_header_head(bh: &BlockHeader, ctx: &mut BlockContext<'_>) -> Result<Option<Tip>, Error> {
	let header_head = ctx.batch.get_header_head()?;
	if bh.total_difficulty() > header_head.total_difficulty {
		let tip = Tip::from_header(bh);
		ctx.batch.save_header_head(&tip)?;

		debug!(
			"pipe: header_head updated to {} at {}",
			tip.last_block_h, tip.height
		);

		Ok(Some(tip))
	} else {
		Ok(None)
	}
}

/// Utility function to handle forks. From the forked block, jump backward
/// to find to fork root. Rewind the txhashset to the root and apply all the
/// forked blocks prior to the one being processed to set the txhashset in
/// the expected state.
pub fn rewind_and_apply_fork(b: &Block, ext: &mut txhashset::Extension<'_>) -> Result<(), Error> {
	// extending a fork, first identify the block where forking occurred
	// keeping the hashes of blocks along the fork
	let mut fork_hashes: Vec<Hash> = vec![];
	let mut current = ext.batch.get_previous_header(&b.header)?;
	while current.height > 0 && ext.batch.is_on_current_chain(&current).is_err() {
		fork_hashes.push(current.hash());
		current = ext.batch.get_previous_header(&current)?;
	}
	fork_hashes.reverse();

	let forked_header = current;

	trace!(
		"rewind_and_apply_fork @ {} [{}], was @ {} [{}]",
		forked_header.height,
		forked_header.hash(),
		b.header.height,
		b.header.hash()
	);

	// Rewind the txhashset state back to the block where we forked from the most work chain.
	if forked_header.hash() != ext.head_header().hash() {
		ext.rewind(&forked_header)?;
	}

	trace!(
		"rewind_and_apply_fork: blocks on fork: {:?}",
		fork_hashes,
	);

	// Now re-apply all blocks on this fork.
	for h in fork_hashes {
		let fb = ext
			.batch
			.get_block(&h)
			.map_err(|e| Error::Other(format!("get block {} for fork: {}", h, e)))?;

		// Re-verify coinbase maturity along this fork.
		ext.verify_coinbase_maturity(fb.inputs(), fb.header.height)?;
		// Validate the block against the UTXO set.
		apply_block_to_txhashset(&fb, ext)?;
	}

	Ok(())
}
