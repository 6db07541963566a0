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

//! Base types that the block chain pipeline requires.

use crate::core::consensus::{self, TargetError};
use crate::core::core::hash::{Hash, Hashed, ZERO_HASH};
use crate::core::core::{Block, BlockHeader, Difficulty};
use crate::core::ser::{self, Readable, Reader, Writeable, Writer};

bitflags! {
	/// Options for block validation
	pub struct Options: u32 {
		/// No flags
		const NONE = 0b0000_0000;
		/// Runs without checking the Proof of Work, mostly to make testing easier.
		const SKIP_POW = 0b0000_0001;
		/// Adds block while in syncing mode.
		const SYNC = 0b0000_0010;
		/// Block validation on a block we mined ourselves
		const MINE = 0b0000_0100;
	}
}

/// The tip of a fork. A handle to the fork ancestry from its leaf in the
/// blockchain tree. References the max height and the latest and previous
/// blocks
/// for convenience and the total difficulty.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tip {
	/// Height of the tip (max height of the fork)
	pub height: u64,
	/// Last block pushed to the fork
	pub last_block_h: Hash,
	/// Block previous to last
	pub prev_block_h: Hash,
	/// Total difficulty accumulated on that fork
	pub total_difficulty: Difficulty,
}

impl Tip {
	/// Creates a new tip based on provided header.
	pub fn from_header(header: &BlockHeader) -> Tip {
		Tip {
			height: header.height,
			last_block_h: header.hash(),
			prev_block_h: header.previous,
			total_difficulty: header.total_difficulty(),
		}
	}

	/// *Really* easy to accidentally call hash() on a tip (thinking its a header).
	/// So lets make hash() do the right thing here.
	pub fn hash(&self) -> Hash {
		self.last_block_h
	}
}

impl Default for Tip {
	fn default() -> Self {
		Tip {
			height: 0,
			last_block_h: ZERO_HASH,
			prev_block_h: ZERO_HASH,
			total_difficulty: Difficulty::min(),
		}
	}
}

/// Serialization of a tip, required to save to datastore.
impl Writeable for Tip {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.height)?;
		self.last_block_h.write(writer)?;
		self.prev_block_h.write(writer)?;
		self.total_difficulty.write(writer)
	}
}

impl Readable for Tip {
	fn read<R: Reader>(reader: &mut R) -> Result<Tip, ser::Error> {
		let height = reader.read_u64()?;
		let last = Hash::read(reader)?;
		let prev = Hash::read(reader)?;
		let diff = Difficulty::read(reader)?;
		Ok(Tip {
			height,
			last_block_h: last,
			prev_block_h: prev,
			total_difficulty: diff,
		})
	}
}

/// The roots of the three MMRs making up the chain state.
#[derive(Debug, Clone, PartialEq)]
pub struct TxHashSetRoots {
	/// Output root
	pub output_root: Hash,
	/// Range Proof root
	pub rproof_root: Hash,
	/// Kernel root
	pub kernel_root: Hash,
}

/// How a newly accepted block relates to the chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
	/// Block is the "next" block, updating the chain head.
	Next,
	/// Block does not update the chain head and is a fork.
	Fork,
	/// Block updates the chain head via a (potentially disruptive) "reorg".
	/// Previous block was not our previous chain head.
	Reorg,
}

/// Bridge between the chain pipeline and the rest of the system. Handles
/// downstream processing of valid blocks by the rest of the system, most
/// importantly the broadcasting of blocks to our peers.
pub trait ChainAdapter {
	/// The blockchain pipeline has accepted this block as valid and added
	/// it to our chain.
	fn block_accepted(&self, block: &Block, status: BlockStatus, opts: Options);
}

/// Dummy adapter used as a placeholder for real implementations
pub struct NoopAdapter {}

impl ChainAdapter for NoopAdapter {
	fn block_accepted(&self, _b: &Block, _status: BlockStatus, _opts: Options) {}
}

/// Checks the proof of work carried by a block header. The chain never
/// inspects the proof itself.
pub trait VerifyPow: Send + Sync {
	/// Whether the header carries a valid proof of work.
	fn verify(&self, header: &BlockHeader) -> bool;
}

impl<F> VerifyPow for F
where
	F: Fn(&BlockHeader) -> bool + Send + Sync,
{
	fn verify(&self, header: &BlockHeader) -> bool {
		self(header)
	}
}

/// Computes the difficulty the next block has to carry, given the
/// (timestamp, difficulty) history of its ancestors, latest first.
pub trait NextDifficulty: Send + Sync {
	/// Expected difficulty of the block following the provided history.
	fn next_difficulty(
		&self,
		history: &mut dyn Iterator<Item = Result<(u64, Difficulty), TargetError>>,
	) -> Result<Difficulty, TargetError>;
}

/// Difficulty adjustment as defined by the consensus rules.
pub struct ConsensusDifficulty;

impl NextDifficulty for ConsensusDifficulty {
	fn next_difficulty(
		&self,
		history: &mut dyn Iterator<Item = Result<(u64, Difficulty), TargetError>>,
	) -> Result<Difficulty, TargetError> {
		consensus::next_difficulty(history)
	}
}

/// Trait to allow a collection of txhashset write status updates
pub trait TxHashsetWriteStatus {
	/// First setup of the txhashset
	fn on_setup(&self);
	/// Starting validation
	fn on_validation(&self, kernels: u64, kernel_total: u64, rproofs: u64, rproof_total: u64);
	/// Starting to save the txhashset and related data
	fn on_save(&self);
	/// Done writing a new txhashset
	fn on_done(&self);
}

/// Do-nothing implementation of TxHashsetWriteStatus
pub struct NoStatus;

impl TxHashsetWriteStatus for NoStatus {
	fn on_setup(&self) {}
	fn on_validation(&self, _ks: u64, _kts: u64, _rs: u64, _rt: u64) {}
	fn on_save(&self) {}
	fn on_done(&self) {}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::ser;

	#[test]
	fn tip_ser_roundtrip() {
		let header = BlockHeader {
			height: 12,
			total_difficulty: Difficulty::from_num(42),
			..Default::default()
		};
		let tip = Tip::from_header(&header);
		assert_eq!(tip.hash(), header.hash());

		let vec = ser::ser_vec(&tip).unwrap();
		let tip2: Tip = ser::deserialize(&mut &vec[..]).unwrap();
		assert_eq!(tip, tip2);
	}

	#[test]
	fn closure_as_pow_verifier() {
		let always: Box<dyn VerifyPow> = Box::new(|_: &BlockHeader| true);
		let never: Box<dyn VerifyPow> = Box::new(|_: &BlockHeader| false);
		let header = BlockHeader::default();
		assert!(always.verify(&header));
		assert!(!never.verify(&header));
	}
}
