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

//! Common test functions

use byteorder::{BigEndian, ByteOrder};
use mimble_core::consensus::reward;
use mimble_core::core::committed::{self, PEDERSEN_COMMITMENT_SIZE};
use mimble_core::core::hash::DefaultHashable;
use mimble_core::core::{
	BlindingFactor, Block, BlockHeader, Commitment, CommitmentScheme, Difficulty, Input,
	KernelFeatures, Output, OutputFeatures, RangeProof, Signature, Transaction, TxKernel,
};
use mimble_core::ser::{self, FixedLength, PMMRable, Readable, Reader, Writeable, Writer};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TestElem(pub [u32; 4]);

impl DefaultHashable for TestElem {}

impl FixedLength for TestElem {
	const LEN: usize = 16;
}

impl PMMRable for TestElem {
	type E = Self;

	fn as_elmt(&self) -> Self::E {
		*self
	}

	fn elmt_size() -> Option<u16> {
		Some(Self::LEN as u16)
	}
}

impl Writeable for TestElem {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.0[0])?;
		writer.write_u32(self.0[1])?;
		writer.write_u32(self.0[2])?;
		writer.write_u32(self.0[3])
	}
}

impl Readable for TestElem {
	fn read<R: Reader>(reader: &mut R) -> Result<TestElem, ser::Error> {
		Ok(TestElem([
			reader.read_u32()?,
			reader.read_u32()?,
			reader.read_u32()?,
			reader.read_u32()?,
		]))
	}
}

// Generator point multiplier for blinding factors in the additive scheme.
const G: u64 = 0x9e37_79b9;

/// Insecure commitment scheme for tests: a commitment is v + r*G over
/// wrapping u64 arithmetic, stored big endian in bytes 1..9.
pub struct AdditiveScheme;

pub fn commit_to_u64(c: &Commitment) -> u64 {
	BigEndian::read_u64(&c.0[1..9])
}

pub fn u64_to_commit(v: u64) -> Commitment {
	let mut bytes = [0; PEDERSEN_COMMITMENT_SIZE];
	BigEndian::write_u64(&mut bytes[1..9], v);
	Commitment(bytes)
}

pub fn blind(r: u64) -> BlindingFactor {
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

pub fn sign(msg: &[u8; 32]) -> Signature {
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

#[allow(dead_code)]
pub fn output(value: u64, r: u64) -> Output {
	Output {
		features: OutputFeatures::Plain,
		commit: commit(value, r),
		proof: RangeProof::from_vec(vec![1; 8]),
	}
}

#[allow(dead_code)]
pub fn input(value: u64, r: u64) -> Input {
	Input::new(OutputFeatures::Plain, commit(value, r))
}

// coinbase output and kernel paying the reward plus fees, blinded with r
#[allow(dead_code)]
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

// utility producing a balanced transaction spending (value, blind) inputs
// into (value, blind) outputs, paying the provided fee
#[allow(dead_code)]
pub fn tx(inputs: Vec<(u64, u64)>, outputs: Vec<(u64, u64)>, fee: u64) -> Transaction {
	let excess_r = outputs
		.iter()
		.fold(0u64, |acc, (_, r)| acc.wrapping_add(*r));
	let excess_r = inputs
		.iter()
		.fold(excess_r, |acc, (_, r)| acc.wrapping_sub(*r));
	let mut kernel = TxKernel::empty().with_fee(fee);
	kernel.excess = commit(0, excess_r);
	kernel.excess_sig = sign(&kernel.msg_to_sign());

	Transaction::new(
		inputs.iter().map(|(v, r)| input(*v, *r)).collect(),
		outputs.iter().map(|(v, r)| output(*v, *r)).collect(),
		vec![kernel],
	)
}

// utility to create a block without worrying about the reward key
#[allow(dead_code)]
pub fn new_block(txs: Vec<Transaction>, previous_header: &BlockHeader, reward_r: u64) -> Block {
	let fees = txs.iter().map(|tx| tx.fee()).sum();
	Block::new(
		previous_header,
		txs,
		Difficulty::min(),
		reward_output(fees, reward_r),
		&AdditiveScheme,
	)
	.unwrap()
}
