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

mod common;

use self::core::core::hash::Hashed;
use self::core::core::{block, transaction, Block, BlockHeader, Commitment, Committed};
use self::core::genesis;
use self::core::ser;
use crate::common::{blind, commit, new_block, output, reward_output, tx, AdditiveScheme};
use mimble_core as core;

#[test]
fn coinbase_only_block_validates() {
	let genesis = genesis::genesis_dev();
	let b = new_block(vec![], &genesis.header, 7);

	assert_eq!(b.header.height, 1);
	assert_eq!(b.header.previous, genesis.hash());
	assert!(b.header.timestamp > genesis.header.timestamp);
	assert_eq!(b.outputs().len(), 1);
	assert_eq!(b.kernels().len(), 1);

	let kernel_sum = b
		.validate(
			&genesis.header.total_kernel_offset,
			&genesis.header.total_kernel_sum,
			&AdditiveScheme,
		)
		.unwrap();
	assert_eq!(kernel_sum, commit(0, 7));
	assert_eq!(b.header.total_kernel_sum, kernel_sum);
}

#[test]
fn block_with_tx_validates() {
	let genesis = genesis::genesis_dev();
	let tx = tx(vec![(10, 1)], vec![(8, 2)], 2);
	tx.validate(&AdditiveScheme).unwrap();

	let b = new_block(vec![tx], &genesis.header, 5);
	assert_eq!(b.total_fees(), 2);
	assert_eq!(b.inputs().len(), 1);
	assert_eq!(b.outputs().len(), 2);
	assert_eq!(b.kernels().len(), 2);
	b.validate(
		&genesis.header.total_kernel_offset,
		&genesis.header.total_kernel_sum,
		&AdditiveScheme,
	)
	.unwrap();

	// a second block builds on the first kernel sum
	let b2 = new_block(vec![], &b.header, 9);
	let prev_sum = b.header.total_kernel_sum;
	b2.validate(&b.header.total_kernel_offset, &prev_sum, &AdditiveScheme)
		.unwrap();
	assert_ne!(b2.header.total_kernel_sum, prev_sum);
}

#[test]
fn block_with_offset_validates() {
	let genesis = genesis::genesis_dev();
	// move part of the excess into the offset
	let mut tx = tx(vec![(10, 1)], vec![(9, 4)], 1);
	let mut kernel = tx.body.kernels[0].clone();
	kernel.excess = commit(0, 1);
	tx.body.kernels = vec![kernel];
	let tx = tx.with_offset(blind(2));
	tx.validate(&AdditiveScheme).unwrap();

	let b = new_block(vec![tx], &genesis.header, 3);
	assert_eq!(b.header.total_kernel_offset, blind(2));
	b.validate(
		&genesis.header.total_kernel_offset,
		&genesis.header.total_kernel_sum,
		&AdditiveScheme,
	)
	.unwrap();
}

#[test]
fn reward_too_large_fails_coinbase_check() {
	let genesis = genesis::genesis_dev();
	let mut b = new_block(vec![], &genesis.header, 7);
	// coinbase output claiming one more than the reward
	let (mut out, _) = reward_output(1, 7);
	out.commit = commit(core::consensus::reward(0) + 1, 7);
	b.body.outputs = vec![out];

	assert_eq!(
		b.validate(
			&genesis.header.total_kernel_offset,
			&genesis.header.total_kernel_sum,
			&AdditiveScheme,
		),
		Err(block::Error::CoinbaseSumMismatch)
	);
}

#[test]
fn unbalanced_block_fails() {
	let genesis = genesis::genesis_dev();
	let mut b = new_block(vec![], &genesis.header, 7);
	// an output appearing out of nowhere breaks the kernel sums
	b.body = b.body.with_output(output(3, 11));

	assert_eq!(
		b.validate(
			&genesis.header.total_kernel_offset,
			&genesis.header.total_kernel_sum,
			&AdditiveScheme,
		),
		Err(block::Error::KernelSumMismatch)
	);
}

#[test]
fn wrong_total_kernel_sum_fails() {
	let genesis = genesis::genesis_dev();
	let mut b = new_block(vec![], &genesis.header, 7);
	b.header.total_kernel_sum = Commitment::default();

	assert_eq!(
		b.validate(
			&genesis.header.total_kernel_offset,
			&genesis.header.total_kernel_sum,
			&AdditiveScheme,
		),
		Err(block::Error::InvalidTotalKernelSum)
	);
}

#[test]
fn kernel_lock_height_beyond_block_fails() {
	let genesis = genesis::genesis_dev();
	let mut tx = tx(vec![(10, 1)], vec![(8, 2)], 2);
	let mut kernel = tx.body.kernels[0].clone().with_lock_height(5);
	kernel.excess_sig = common::sign(&kernel.msg_to_sign());
	tx.body.kernels = vec![kernel];

	let b = new_block(vec![tx], &genesis.header, 5);
	assert_eq!(
		b.validate(
			&genesis.header.total_kernel_offset,
			&genesis.header.total_kernel_sum,
			&AdditiveScheme,
		),
		Err(block::Error::KernelLockHeight(5))
	);
}

#[test]
fn bad_signature_fails() {
	let genesis = genesis::genesis_dev();
	let mut tx = tx(vec![(10, 1)], vec![(8, 2)], 2);
	let mut kernel = tx.body.kernels[0].clone();
	kernel.fee = 3;
	tx.body.kernels = vec![kernel];

	let b = new_block(vec![tx], &genesis.header, 5);
	assert_eq!(
		b.validate(
			&genesis.header.total_kernel_offset,
			&genesis.header.total_kernel_sum,
			&AdditiveScheme,
		),
		Err(block::Error::Transaction(
			transaction::Error::IncorrectSignature
		))
	);
}

#[test]
fn block_sums_match_committed() {
	let genesis = genesis::genesis_dev();
	let b = new_block(vec![tx(vec![(10, 1)], vec![(8, 2)], 2)], &genesis.header, 5);
	let (utxo_sum, kernel_sum) = b
		.verify_kernel_sums(b.overage(), blind(0), &AdditiveScheme)
		.unwrap();
	assert_eq!(utxo_sum, kernel_sum);
	assert_eq!(kernel_sum, commit(0, 6));
}

#[test]
fn serialize_deserialize_block() {
	let genesis = genesis::genesis_dev();
	let b = new_block(vec![tx(vec![(10, 1)], vec![(8, 2)], 2)], &genesis.header, 5);

	let vec = ser::ser_vec(&b).unwrap();
	let b2: Block = ser::deserialize(&mut &vec[..]).unwrap();

	assert_eq!(b.hash(), b2.hash());
	assert_eq!(b.header, b2.header);
	assert_eq!(b.body, b2.body);

	// the block hash only covers the header
	let header_vec = ser::ser_vec(&b.header).unwrap();
	let header: BlockHeader = ser::deserialize(&mut &header_vec[..]).unwrap();
	assert_eq!(header.hash(), b.hash());
}
