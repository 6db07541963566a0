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

//! Everything that can go wrong while processing blocks or maintaining
//! chain state.

use crate::core::consensus::TargetError;
use crate::core::core::{block, committed, transaction, Commitment};
use crate::core::ser;
use mimble_store as store;
use std::io;

/// Chain errors fall in four groups. `Orphan` is retried once the parent
/// shows up. `Unfit` blocks are dropped but could be fine in another
/// context. The rule violations are permanent for the block at hand. The
/// rest (store, txhashset, state mismatch) are internal failures.
#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum Error {
	/// Block doesn't fit the chain as it is right now
	#[error("Block is unfit: {0}")]
	Unfit(String),
	/// Parent unknown, the block waits in the orphan pool
	#[error("Orphan")]
	Orphan,
	#[error("Difficulty is too low compared to ours or the block PoW hash")]
	DifficultyTooLow,
	/// Total difficulty isn't the parent's plus the block's own
	#[error("Addition of difficulties on all previous blocks is wrong")]
	WrongTotalDifficulty,
	#[error("Invalid PoW")]
	InvalidPow,
	/// Timestamp not after the parent's, or too far in the future
	#[error("Invalid Block Time")]
	InvalidBlockTime,
	/// Height isn't the parent's plus one
	#[error("Invalid Block Height")]
	InvalidBlockHeight,
	#[error("Invalid Block Version: {0}")]
	InvalidBlockVersion(u16),
	/// A header MMR root doesn't match the txhashset after applying the block
	#[error("Invalid Root")]
	InvalidRoot,
	/// A header MMR size doesn't match the txhashset after applying the block
	#[error("Invalid MMR Size")]
	InvalidMMRSize,
	/// Input spending an output missing from the unspent set
	#[error("Already Spent: {0:?}")]
	AlreadySpent(Commitment),
	/// Output commitment already in the unspent set
	#[error("Duplicate Commitment: {0:?}")]
	DuplicateCommitment(Commitment),
	/// Coinbase spent before `coinbase_maturity` confirmations
	#[error("Attempt to spend immature coinbase")]
	ImmatureCoinbase,
	#[error("Output not found")]
	OutputNotFound,
	/// The output index and the MMRs disagree. Fatal, the node state is
	/// corrupted.
	#[error("Chain state mismatch: {0}")]
	StateMismatch(String),
	/// A txhashset snapshot we were handed doesn't validate
	#[error("Invalid TxHashSet: {0}")]
	InvalidTxHashSet(String),
	/// Failed read or write in the db, with what we were doing
	#[error("Store Error: {1}, reason: {0}")]
	StoreErr(store::Error, String),
	/// Record missing from the db
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Serialization Error: {0}")]
	SerErr(#[from] ser::Error),
	/// Failure in the MMR files or their archive
	#[error("TxHashSetErr: {0}")]
	TxHashSetErr(String),
	/// Transaction locked until a later height
	#[error("Transaction Lock Height")]
	TxLockHeight,
	#[error("Transaction Validation Error: {0}")]
	Transaction(#[from] transaction::Error),
	#[error("Invalid Block: {0}")]
	Block(#[from] block::Error),
	#[error("Committed Trait: Error summing and verifying kernel sums: {0}")]
	Committed(#[from] committed::Error),
	/// No difficulty could be computed for the next block
	#[error("Difficulty computation error: {0}")]
	DifficultyErr(#[from] TargetError),
	#[error("Other Error: {0}")]
	Other(String),
}

impl Error {
	/// True when the block itself is at fault, false when the failure comes
	/// from our own state or from a context that may change.
	pub fn is_bad_data(&self) -> bool {
		!matches!(
			self,
			Error::Unfit(_)
				| Error::Orphan
				| Error::StoreErr(..)
				| Error::NotFound(_)
				| Error::SerErr(_)
				| Error::TxHashSetErr(_)
				| Error::StateMismatch(_)
				| Error::DifficultyErr(_)
				| Error::Other(_)
		)
	}
}

impl From<store::Error> for Error {
	fn from(error: store::Error) -> Error {
		if let store::Error::NotFoundErr(what) = error {
			return Error::NotFound(what);
		}
		let reason = error.to_string();
		Error::StoreErr(error, reason)
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::TxHashSetErr(e.to_string())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn bad_data_classification() {
		assert!(!Error::Orphan.is_bad_data());
		assert!(!Error::Unfit("too old".to_owned()).is_bad_data());
		assert!(!Error::NotFound("header".to_owned()).is_bad_data());
		assert!(!Error::StateMismatch("index".to_owned()).is_bad_data());
		assert!(Error::InvalidRoot.is_bad_data());
		assert!(Error::ImmatureCoinbase.is_bad_data());
		assert!(Error::AlreadySpent(Commitment::default()).is_bad_data());
	}

	#[test]
	fn store_not_found_maps_to_not_found() {
		let e: Error = store::Error::NotFoundErr("HEAD".to_owned()).into();
		assert_eq!(e, Error::NotFound("HEAD".to_owned()));
		let e: Error = store::Error::OtherErr("boom".to_owned()).into();
		match e {
			Error::StoreErr(_, reason) => assert!(reason.contains("boom")),
			_ => panic!("expected a store error"),
		}
	}

	#[test]
	fn wrapped_errors_keep_their_source() {
		let e: Error = transaction::Error::CutThrough.into();
		assert_eq!(e, Error::Transaction(transaction::Error::CutThrough));
		assert!(e.is_bad_data());
		let e: Error = TargetError("no data".to_owned()).into();
		assert!(e.to_string().contains("no data"));
	}
}
