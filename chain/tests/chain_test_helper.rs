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

#![allow(dead_code)]

use self::chain::types::{BlockStatus, ChainAdapter, NextDifficulty, Options};
use self::chain::{Chain, ConsensusDifficulty, NoopAdapter};
use self::core::consensus::reward;
use self::core::core::committed::{self, PEDERSEN_COMMITMENT_SIZE};
use self::core::core::{
	BlindingFactor, Block, BlockHeader, Commitment, CommitmentScheme, Difficulty, Input,
	KernelFeatures, Output, OutputFeatures, RangeProof, Signature, Transaction, TxKernel,
};
use self::core::genesis;
use self::core::global::{self, ChainTypes};
use self::util::RwLock;
use byteorder::{BigEndian, ByteOrder};
use chrono::Duration;
use mimble_chain as chain;
use mimble_core as core;
use mimble_util as util;
use std::fs;
use std::sync::Arc;

// Generator point multiplier for blinding factors in the additive scheme.
const G: u64 = 0x9e37_79b9;

/// Insecure commitment scheme for tests: a commitment is v + r*G over
/// wrapping u64 arithmetic, stored big endian in bytes 1..9.
pub struct AdditiveScheme;

fn commit_to_u64(c: &Commitment) -> u64 {
	BigEndian::read_u64(&c.0[1..9])
}

fn u64_to_commit(v: u64) -> Commitment {
	let mut bytes = [0; PEDERSEN_COMMITMENT_SIZE];
	BigEndian::write_u64(&mut bytes[1..9], v);
	Commitment(bytes)
}

fn blind(r: u64) -> BlindingFactor {
	let mut bytes = [0; 32];
	BigEndian::write_u64(&mut bytes[24..], r);
	BlindingFactor(bytes)
}

fn blind_to_u64(b: &BlindingFactor) -> u64 {
	BigEndian::read_u64(&b.0[24..])
}

pub fn commit(value: u64, r: u64) -> Commitment {
	u64_to_commit(value.wrapping_add(r.wrapping_mul(G)))
}

fn sign(msg: &[u8; 32]) -> Signature {
	let mut sig = [0; 64];
	sig[..32].copy_from_slice(msg);
	Signature(sig)
}

impl CommitmentScheme for AdditiveScheme {
	fn commit_value(&self, value: u64) -> Result<Commitment, committed::Error> {
		Ok(commit(value, 0))
	}

	fn commit_blind(&self, blind: &BlindingFactor) -> Result<Commitment, committed::Error> {
		Ok(commit(0, blind_to_u64(blind)))
	}

	fn commit_sum(
		&self,
		positive: Vec<Commitment>,
		negative: Vec<Commitment>,
	) -> Result<Commitment, committed::Error> {
		let pos = positive
			.iter()
			.fold(0u64, |acc, c| acc.wrapping_add(commit_to_u64(c)));
		let sum = negative
			.iter()
			.fold(pos, |acc, c| acc.wrapping_sub(commit_to_u64(c)));
		Ok(u64_to_commit(sum))
	}

	fn blind_sum(
		&self,
		positive: Vec<BlindingFactor>,
		negative: Vec<BlindingFactor>,
	) -> Result<BlindingFactor, committed::Error> {
		let pos = positive
			.iter()
			.fold(0u64, |acc, b| acc.wrapping_add(blind_to_u64(b)));
		let sum = negative
			.iter()
			.fold(pos, |acc, b| acc.wrapping_sub(blind_to_u64(b)));
		Ok(blind(sum))
	}

	fn verify_rangeproof(
		&self,
		_commit: &Commitment,
		proof: &RangeProof,
	) -> Result<(), committed::Error> {
		if proof.is_empty() {
			return Err(committed::Error::InvalidRangeProof);
		}
		Ok(())
	}

	fn verify_signature(
		&self,
		_excess: &Commitment,
		sig: &Signature,
		msg: &[u8; 32],
	) -> Result<(), committed::Error> {
		if sig.0[..32] != msg[..] {
			return Err(committed::Error::InvalidSignature);
		}
		Ok(())
	}
}

/// Adapter recording every notification it gets.
#[derive(Default)]
pub struct StatusAdapter {
	pub statuses: RwLock<Vec<(BlockStatus, Options)>>,
}

impl StatusAdapter {
	pub fn count(&self) -> usize {
		self.statuses.read().len()
	}

	pub fn last(&self) -> Option<BlockStatus> {
		self.statuses.read().last().map(|(status, _)| *status)
	}

	pub fn last_opts(&self) -> Option<Options> {
		self.statuses.read().last().map(|(_, opts)| *opts)
	}
}

impl ChainAdapter for StatusAdapter {
	fn block_accepted(&self, _b: &Block, status: BlockStatus, opts: Options) {
		self.statuses.write().push((status, opts));
	}
}

/// Difficulty policy always asking for the same difficulty.
pub struct FixedDifficulty(pub u64);

impl NextDifficulty for FixedDifficulty {
	fn next_difficulty(
		&self,
		_history: &mut dyn Iterator<Item = Result<(u64, Difficulty), core::consensus::TargetError>>,
	) -> Result<Difficulty, core::consensus::TargetError> {
		Ok(Difficulty::from_num(self.0))
	}
}

pub fn clean_output_dir(dir_name: &str) {
	let _ = fs::remove_dir_all(dir_name);
}

pub fn genesis_block() -> Block {
	global::set_local_chain_type(ChainTypes::AutomatedTesting);
	genesis::genesis_dev()
}

pub fn init_chain_with(
	dir_name: &str,
	adapter: Arc<dyn ChainAdapter + Send + Sync>,
	difficulty: Arc<dyn NextDifficulty>,
	archive_mode: bool,
) -> Chain {
	util::init_test_logger();
	Chain::init(
		dir_name.to_string(),
		adapter,
		genesis_block(),
		Arc::new(|h: &BlockHeader| h.nonce % 2 == 0),
		difficulty,
		Arc::new(AdditiveScheme),
		archive_mode,
	)
	.unwrap()
}

/// Fresh chain in a clean directory, with a proof of work verifier that
/// only accepts even nonces.
pub fn init_chain(dir_name: &str) -> Chain {
	clean_output_dir(dir_name);
	init_chain_with(
		dir_name,
		Arc::new(NoopAdapter {}),
		Arc::new(ConsensusDifficulty),
		false,
	)
}

/// Reopens an existing chain directory.
pub fn reload_chain(dir_name: &str) -> Chain {
	init_chain_with(
		dir_name,
		Arc::new(NoopAdapter {}),
		Arc::new(ConsensusDifficulty),
		false,
	)
}

pub fn output(value: u64, r: u64) -> Output {
	Output {
		features: OutputFeatures::Plain,
		commit: commit(value, r),
		proof: RangeProof::from_vec(vec![1; 8]),
	}
}

// coinbase output and kernel paying the reward plus fees, blinded with r
pub fn reward_output(fees: u64, r: u64) -> (Output, TxKernel) {
	let out = Output {
		features: OutputFeatures::Coinbase,
		commit: commit(reward(fees), r),
		proof: RangeProof::from_vec(vec![1; 8]),
	};
	let mut kernel = TxKernel::empty();
	kernel.features = KernelFeatures::Coinbase;
	kernel.excess = commit(0, r);
	kernel.excess_sig = sign(&kernel.msg_to_sign());
	(out, kernel)
}

/// The output a coinbase blinded with r ends up as, to spend or look up.
pub fn coinbase_input(r: u64) -> Input {
	Input::new(OutputFeatures::Coinbase, commit(reward(0), r))
}

/// A balanced transaction spending the provided inputs (with their value
/// and blinding factor) into plain (value, blind) outputs.
pub fn tx(inputs: Vec<(Input, u64, u64)>, outputs: Vec<(u64, u64)>, fee: u64) -> Transaction {
	let excess_r = outputs
		.iter()
		.fold(0u64, |acc, (_, r)| acc.wrapping_add(*r));
	let excess_r = inputs
		.iter()
		.fold(excess_r, |acc, (_, _, r)| acc.wrapping_sub(*r));
	let mut kernel = TxKernel::empty().with_fee(fee);
	kernel.excess = commit(0, excess_r);
	kernel.excess_sig = sign(&kernel.msg_to_sign());

	Transaction::new(
		inputs.into_iter().map(|(input, _, _)| input).collect(),
		outputs.iter().map(|(v, r)| output(*v, *r)).collect(),
		vec![kernel],
	)
}

/// Builds a block on top of prev with the provided difficulty and fills in
/// its roots and sizes from the chain. The reward is blinded with
/// `reward_r`, which must be unique across the chain.
pub fn prepare_block(
	chain: &Chain,
	prev: &BlockHeader,
	txs: Vec<Transaction>,
	diff: u64,
	reward_r: u64,
) -> Block {
	let fees = txs.iter().map(|tx| tx.fee()).sum();
	let mut b = Block::new(
		prev,
		txs,
		Difficulty::from_num(diff),
		reward_output(fees, reward_r),
		&AdditiveScheme,
	)
	.unwrap();
	b.header.timestamp = prev.timestamp + Duration::seconds(60);
	chain.set_txhashset_roots(&mut b).unwrap();
	b
}

/// Mines `count` empty blocks on top of the current head, skipping proof of
/// work. Rewards are blinded with `first_r`, `first_r + 1`...
pub fn mine_some_on_top(chain: &Chain, count: u64, first_r: u64) {
	for n in 0..count {
		let prev = chain.head_header().unwrap();
		let b = prepare_block(chain, &prev, vec![], 1, first_r + n);
		chain.process_block(b, Options::SKIP_POW).unwrap();
	}
}
