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

//! Block headers and full blocks. A block body is one big aggregated
//! transaction, balanced by the reward it mints.

use std::time::UNIX_EPOCH;

use chrono::prelude::{DateTime, TimeZone, Utc};

use crate::consensus::{self, reward};
use crate::core::committed::{self, BlindingFactor, Commitment, CommitmentScheme, Committed};
use crate::core::hash::{DefaultHashable, Hash, Hashed, ZERO_HASH};
use crate::core::target::Difficulty;
use crate::core::transaction::{self, Input, Output, Transaction, TransactionBody, TxKernel};
use crate::pow::Proof;
use crate::ser::{self, Readable, Reader, SerializationMode, Writeable, Writer};

/// Ways a block can be invalid on its own, before looking at the chain.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
	/// Outputs minus inputs don't add up to the kernel excesses
	#[error("Block Input/output vs kernel sum mismatch")]
	KernelSumMismatch,
	/// The header's running kernel sum is off
	#[error("Block total kernel sum mismatch")]
	InvalidTotalKernelSum,
	/// Coinbase outputs don't match coinbase kernels plus reward and fees
	#[error("Block coinbase sum mismatch")]
	CoinbaseSumMismatch,
	/// Body heavier than `MAX_BLOCK_WEIGHT`
	#[error("Block weight exceeded")]
	TooHeavy,
	/// A kernel locked above the block height
	#[error("Block kernel lock height {0} exceeds block height")]
	KernelLockHeight(u64),
	/// The aggregated body is invalid
	#[error("Block Invalid Transaction: {0}")]
	Transaction(#[from] transaction::Error),
	/// Commitment arithmetic failed
	#[error("Committed Trait: {0}")]
	Committed(committed::Error),
	/// Codec failure
	#[error("Serialization Error: {0}")]
	Serialization(#[from] ser::Error),
	/// Anything else
	#[error("Block Error (display): {0}")]
	Other(String),
}

impl From<committed::Error> for Error {
	fn from(e: committed::Error) -> Error {
		match e {
			committed::Error::KernelSumMismatch => Error::KernelSumMismatch,
			e => Error::Committed(e),
		}
	}
}

fn timestamp_from_secs(secs: i64) -> Option<DateTime<Utc>> {
	if secs < 0 {
		return None;
	}
	Utc.timestamp_opt(secs, 0).single()
}

/// Everything identifying a block and committing to the chain state after
/// it: MMR roots and sizes, running kernel offset and sum, and the work
/// accumulated since genesis.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockHeader {
	/// Header version, see `consensus::valid_header_version`
	pub version: u16,
	/// Genesis is 0
	pub height: u64,
	/// Hash of the parent header
	pub previous: Hash,
	/// Seconds precision, strictly above the parent's
	pub timestamp: DateTime<Utc>,
	/// Output MMR root once this block is applied
	pub output_root: Hash,
	/// Range proof MMR root once this block is applied
	pub range_proof_root: Hash,
	/// Kernel MMR root once this block is applied
	pub kernel_root: Hash,
	/// Sum of every kernel offset up to here. This block's own offset is the
	/// difference with the parent's.
	pub total_kernel_offset: BlindingFactor,
	/// Sum of every kernel excess up to here
	pub total_kernel_sum: Commitment,
	/// Output MMR size once this block is applied
	pub output_mmr_size: u64,
	/// Kernel MMR size once this block is applied
	pub kernel_mmr_size: u64,
	/// Work accumulated since genesis, this block included
	pub total_difficulty: Difficulty,
	/// Mining nonce
	pub nonce: u64,
	/// Proof of work, checked by an injected verifier
	pub pow: Proof,
}

impl DefaultHashable for BlockHeader {}

impl Default for BlockHeader {
	fn default() -> BlockHeader {
		BlockHeader {
			version: 1,
			height: 0,
			previous: ZERO_HASH,
			timestamp: DateTime::<Utc>::from(UNIX_EPOCH),
			output_root: ZERO_HASH,
			range_proof_root: ZERO_HASH,
			kernel_root: ZERO_HASH,
			total_kernel_offset: BlindingFactor::zero(),
			total_kernel_sum: Commitment::default(),
			output_mmr_size: 0,
			kernel_mmr_size: 0,
			total_difficulty: Difficulty::min(),
			nonce: 0,
			pow: Proof::default(),
		}
	}
}

// Field order on the wire: version, height, timestamp, previous, the three
// roots, offset and kernel sum, the two MMR sizes, difficulty, nonce, pow.
impl Writeable for BlockHeader {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		ser_multiwrite!(
			writer,
			[write_u16, self.version],
			[write_u64, self.height],
			[write_i64, self.timestamp.timestamp()]
		);
		for hash in &[
			self.previous,
			self.output_root,
			self.range_proof_root,
			self.kernel_root,
		] {
			hash.write(writer)?;
		}
		self.total_kernel_offset.write(writer)?;
		self.total_kernel_sum.write(writer)?;
		ser_multiwrite!(
			writer,
			[write_u64, self.output_mmr_size],
			[write_u64, self.kernel_mmr_size]
		);
		self.total_difficulty.write(writer)?;
		writer.write_u64(self.nonce)?;
		self.pow.write(writer)
	}
}

impl Readable for BlockHeader {
	fn read<R: Reader>(reader: &mut R) -> Result<BlockHeader, ser::Error> {
		let (version, height, secs) = ser_multiread!(reader, read_u16, read_u64, read_i64);
		let timestamp = timestamp_from_secs(secs).ok_or(ser::Error::CorruptedData)?;
		let [previous, output_root, range_proof_root, kernel_root] = [
			Hash::read(reader)?,
			Hash::read(reader)?,
			Hash::read(reader)?,
			Hash::read(reader)?,
		];
		let total_kernel_offset = BlindingFactor::read(reader)?;
		let total_kernel_sum = Commitment::read(reader)?;
		let (output_mmr_size, kernel_mmr_size) = ser_multiread!(reader, read_u64, read_u64);
		Ok(BlockHeader {
			version,
			height,
			previous,
			timestamp,
			output_root,
			range_proof_root,
			kernel_root,
			total_kernel_offset,
			total_kernel_sum,
			output_mmr_size,
			kernel_mmr_size,
			total_difficulty: Difficulty::read(reader)?,
			nonce: reader.read_u64()?,
			pow: Proof::read(reader)?,
		})
	}
}

impl BlockHeader {
	/// Work accumulated up to and including this header.
	pub fn total_difficulty(&self) -> Difficulty {
		self.total_difficulty
	}

	/// What the block may mint, as a negative overage. Fees only move value
	/// between transactions and the coinbase, so they don't count.
	pub fn overage(&self) -> i64 {
		-(consensus::REWARD as i64)
	}

	/// Everything minted from genesis up to this header, negated.
	pub fn total_overage(&self) -> i64 {
		(self.height as i64).saturating_mul(self.overage())
	}
}

/// A header and the body it commits to.
#[derive(Debug, Clone, Default)]
pub struct Block {
	/// Header
	pub header: BlockHeader,
	/// Inputs, outputs and kernels, reward included
	pub body: TransactionBody,
}

// A block is identified by its header alone.
impl Hashed for Block {
	fn hash(&self) -> Hash {
		self.header.hash()
	}
}

impl Writeable for Block {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.header.write(writer)?;
		match writer.serialization_mode() {
			SerializationMode::Full => self.body.write(writer),
			SerializationMode::Hash => Ok(()),
		}
	}
}

impl Readable for Block {
	fn read<R: Reader>(reader: &mut R) -> Result<Block, ser::Error> {
		Ok(Block {
			header: BlockHeader::read(reader)?,
			body: TransactionBody::read(reader)?,
		})
	}
}

impl Committed for Block {
	fn inputs_committed(&self) -> Vec<Commitment> {
		self.body.inputs_committed()
	}

	fn outputs_committed(&self) -> Vec<Commitment> {
		self.body.outputs_committed()
	}

	fn kernels_committed(&self) -> Vec<Commitment> {
		self.body.kernels_committed()
	}
}

impl Block {
	/// Aggregates `txs` and the reward into the body of a block on top of
	/// `prev`, carrying the running kernel offset and sum forward. Roots and
	/// MMR sizes stay zero until the chain sets them.
	pub fn new(
		prev: &BlockHeader,
		txs: Vec<Transaction>,
		difficulty: Difficulty,
		reward_output: (Output, TxKernel),
		scheme: &dyn CommitmentScheme,
	) -> Result<Block, Error> {
		let (reward_out, reward_kern) = reward_output;
		let mut inputs = vec![];
		let mut outputs = vec![reward_out];
		let mut kernels = vec![reward_kern];
		let mut offsets = vec![prev.total_kernel_offset];
		for tx in txs {
			offsets.push(tx.offset);
			inputs.extend(tx.body.inputs);
			outputs.extend(tx.body.outputs);
			kernels.extend(tx.body.kernels);
		}
		let body = TransactionBody::init(inputs, outputs, kernels, false)?;

		// zero offsets are valid blinding factors but not valid keys, so
		// they stay out of the sum
		offsets.retain(|offset| *offset != BlindingFactor::zero());
		let total_kernel_offset = if offsets.is_empty() {
			BlindingFactor::zero()
		} else {
			scheme.blind_sum(offsets, vec![])?
		};

		let mut excesses = body.kernels_committed();
		if prev.total_kernel_sum != Commitment::default() {
			excesses.push(prev.total_kernel_sum);
		}
		let total_kernel_sum = scheme.commit_sum(excesses, vec![])?;

		let secs = Utc::now().timestamp().max(prev.timestamp.timestamp() + 1);
		let timestamp = timestamp_from_secs(secs)
			.ok_or_else(|| Error::Other(format!("invalid block timestamp {}", secs)))?;

		let header = BlockHeader {
			height: prev.height + 1,
			previous: prev.hash(),
			timestamp,
			total_kernel_offset,
			total_kernel_sum,
			total_difficulty: prev.total_difficulty + difficulty,
			..Default::default()
		};
		Ok(Block { header, body })
	}

	/// A block with an empty body.
	pub fn with_header(header: BlockHeader) -> Block {
		Block {
			header,
			body: TransactionBody::default(),
		}
	}

	/// Inputs of the body.
	pub fn inputs(&self) -> &[Input] {
		&self.body.inputs
	}

	/// Outputs of the body, reward included.
	pub fn outputs(&self) -> &[Output] {
		&self.body.outputs
	}

	/// Kernels of the body, reward included.
	pub fn kernels(&self) -> &[TxKernel] {
		&self.body.kernels
	}

	/// Fees of all the transactions aggregated in.
	pub fn total_fees(&self) -> u64 {
		self.body.fee()
	}

	/// See `BlockHeader::overage`.
	pub fn overage(&self) -> i64 {
		self.header.overage()
	}

	/// Checks everything that doesn't need chain state: the body, weight,
	/// kernel lock heights, the coinbase, and the kernel sums against the
	/// parent's running offset and sum. Returns the sum of this block's
	/// kernel excesses.
	pub fn validate(
		&self,
		prev_kernel_offset: &BlindingFactor,
		prev_kernel_sum: &Commitment,
		scheme: &dyn CommitmentScheme,
	) -> Result<Commitment, Error> {
		self.body.validate(scheme)?;
		let body = &self.body;
		if consensus::exceeds_weight(body.inputs.len(), body.outputs.len(), body.kernels.len()) {
			return Err(Error::TooHeavy);
		}
		if let Some(k) = body.kernels.iter().find(|k| k.lock_height > self.header.height) {
			return Err(Error::KernelLockHeight(k.lock_height));
		}
		self.verify_coinbase(scheme)?;

		let offset = &self.header.total_kernel_offset;
		let block_offset = if offset == prev_kernel_offset {
			BlindingFactor::zero()
		} else {
			scheme.blind_sum(vec![*offset], vec![*prev_kernel_offset])?
		};
		let (_, kernel_sum) = self.verify_kernel_sums(self.overage(), block_offset, scheme)?;

		let mut running = vec![kernel_sum];
		if *prev_kernel_sum != Commitment::default() {
			running.push(*prev_kernel_sum);
		}
		if scheme.commit_sum(running, vec![])? != self.header.total_kernel_sum {
			return Err(Error::InvalidTotalKernelSum);
		}
		Ok(kernel_sum)
	}

	/// Coinbase outputs have to equal coinbase kernels plus the reward and
	/// the fees of the block.
	pub fn verify_coinbase(&self, scheme: &dyn CommitmentScheme) -> Result<(), Error> {
		let outputs: Vec<Commitment> = self
			.outputs()
			.iter()
			.filter(|out| out.is_coinbase())
			.map(Output::commitment)
			.collect();
		let kernels: Vec<Commitment> = self
			.kernels()
			.iter()
			.filter(|k| k.is_coinbase())
			.map(TxKernel::excess)
			.collect();

		let minted = scheme.commit_value(reward(self.total_fees()))?;
		if scheme.commit_sum(kernels, vec![])? != scheme.commit_sum(outputs, vec![minted])? {
			return Err(Error::CoinbaseSumMismatch);
		}
		Ok(())
	}
}
