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

mod chain_test_helper;

use self::chain::types::{BlockStatus, Options};
use self::chain::{ConsensusDifficulty, Error};
use self::chain_test_helper::{
	clean_output_dir, init_chain, init_chain_with, mine_some_on_top, prepare_block, reload_chain,
	reward_output, FixedDifficulty, StatusAdapter,
};
use self::core::core::hash::{Hash, Hashed};
use self::core::core::{Difficulty, OutputIdentifier};
use mimble_chain as chain;
use mimble_core as core;
use std::sync::Arc;

fn coinbase_id(r: u64) -> OutputIdentifier {
	OutputIdentifier::from_output(&reward_output(0, r).0)
}

#[test]
fn mine_empty_chain() {
	let chain_dir = ".mimble.empty";
	let chain = init_chain(chain_dir);
	let genesis = chain.head_header().unwrap();
	assert_eq!(chain.head().unwrap().height, 0);

	let b1 = prepare_block(&chain, &genesis, vec![], 1, 1);
	let (tip, accepted) = chain.process_block(b1.clone(), Options::SKIP_POW).unwrap();
	assert_eq!(tip.unwrap().last_block_h, b1.hash());
	assert_eq!(accepted.unwrap().hash(), b1.hash());

	let head = chain.head().unwrap();
	assert_eq!(head.height, 1);
	assert_eq!(
		chain.total_difficulty(),
		genesis.total_difficulty + Difficulty::from_num(1)
	);
	assert_eq!(chain.head_header().unwrap().output_mmr_size, 1);
	assert_eq!(chain.get_header_by_height(1).unwrap().hash(), b1.hash());
	assert!(chain.is_unspent(&coinbase_id(1)).is_ok());

	mine_some_on_top(&chain, 4, 2);
	assert_eq!(chain.head().unwrap().height, 5);
	for n in 1..=5 {
		let header = chain.get_header_by_height(n).unwrap();
		assert!(chain.is_on_current_chain(&header).is_ok());
		assert!(chain.get_block(&header.hash()).is_ok());
		assert_eq!(chain.get_block_id_by_height(n).unwrap(), header.hash());
	}

	// walks back from the head down to genesis, one minute apart
	let history: Vec<(u64, Difficulty)> = chain.difficulty_iter().map(|d| d.unwrap()).collect();
	assert_eq!(history.len(), 6);
	for pair in history[..5].windows(2) {
		assert_eq!(pair[0].0, pair[1].0 + 60);
		assert_eq!(pair[0].1, Difficulty::from_num(1));
	}
	assert_eq!(chain.highest_output_insertion_index(), 5);
	assert_eq!(chain.get_last_n_output(2).len(), 2);
	assert_eq!(chain.get_last_n_kernel(10).len(), 5);
	let (last, max, outputs) = chain.unspent_outputs_by_insertion_index(1, 10).unwrap();
	assert_eq!((last, max, outputs.len()), (5, 5, 5));

	chain.validate(false).unwrap();

	// resubmitting a known block is a no-op
	let (tip, accepted) = chain.process_block(b1, Options::SKIP_POW).unwrap();
	assert!(tip.is_none() && accepted.is_none());

	// state survives a restart
	let head = chain.head().unwrap();
	let roots = chain.get_txhashset_roots().unwrap();
	drop(chain);
	let chain = reload_chain(chain_dir);
	assert_eq!(chain.head().unwrap(), head);
	assert_eq!(chain.get_txhashset_roots().unwrap(), roots);

	clean_output_dir(chain_dir);
}

#[test]
fn mine_forks_and_reorg() {
	let chain_dir = ".mimble.fork";
	clean_output_dir(chain_dir);
	let adapter = Arc::new(StatusAdapter::default());
	let chain = init_chain_with(
		chain_dir,
		adapter.clone(),
		Arc::new(ConsensusDifficulty),
		false,
	);
	let genesis = chain.head_header().unwrap();

	let b1 = prepare_block(&chain, &genesis, vec![], 2, 1);
	chain.process_block(b1.clone(), Options::SKIP_POW).unwrap();
	assert_eq!(adapter.last(), Some(BlockStatus::Next));
	assert_eq!(adapter.count(), 1);

	// a competing block with less work doesn't move the head
	let b1_fork = prepare_block(&chain, &genesis, vec![], 1, 2);
	let (tip, accepted) = chain.process_block(b1_fork.clone(), Options::SKIP_POW).unwrap();
	assert!(tip.is_none());
	assert!(accepted.is_some());
	assert_eq!(adapter.last(), Some(BlockStatus::Fork));
	assert_eq!(adapter.count(), 2);
	assert_eq!(chain.head().unwrap().last_block_h, b1.hash());
	assert!(chain.get_block(&b1_fork.hash()).is_ok());
	assert!(chain.is_on_current_chain(&b1_fork.header).is_err());
	assert!(chain.is_unspent(&coinbase_id(2)).is_err());

	// extending the fork past the main chain work reorgs onto it
	let b2_fork = prepare_block(&chain, &b1_fork.header, vec![], 2, 3);
	let (tip, _) = chain.process_block(b2_fork.clone(), Options::SKIP_POW).unwrap();
	assert_eq!(tip.unwrap().last_block_h, b2_fork.hash());
	assert_eq!(adapter.last(), Some(BlockStatus::Reorg));
	assert_eq!(adapter.count(), 3);

	let head = chain.head().unwrap();
	assert_eq!(head.height, 2);
	assert_eq!(head.total_difficulty, genesis.total_difficulty + Difficulty::from_num(3));
	assert!(chain.is_on_current_chain(&b1_fork.header).is_ok());
	assert!(chain.is_on_current_chain(&b1.header).is_err());
	assert_eq!(chain.get_header_by_height(1).unwrap().hash(), b1_fork.hash());

	// outputs follow the winning fork
	match chain.is_unspent(&coinbase_id(1)) {
		Err(Error::OutputNotFound) => (),
		other => panic!("unexpected {:?}", other),
	}
	assert!(chain.is_unspent(&coinbase_id(2)).is_ok());
	assert!(chain.is_unspent(&coinbase_id(3)).is_ok());
	chain.validate(false).unwrap();

	// sync still notifies, with the options passed through
	let b3 = prepare_block(&chain, &b2_fork.header, vec![], 1, 4);
	chain
		.process_block(b3, Options::SKIP_POW | Options::SYNC)
		.unwrap();
	assert_eq!(adapter.count(), 4);
	assert_eq!(adapter.last(), Some(BlockStatus::Next));
	assert!(adapter.last_opts().unwrap().contains(Options::SYNC));

	clean_output_dir(chain_dir);
}

#[test]
fn process_orphan_then_parent() {
	let chain_dir = ".mimble.orphan";
	let source_dir = ".mimble.orphan_source";
	let chain = init_chain(chain_dir);
	let source = init_chain(source_dir);
	let genesis = chain.head_header().unwrap();

	let b1 = prepare_block(&chain, &genesis, vec![], 1, 1);
	chain.process_block(b1.clone(), Options::SKIP_POW).unwrap();

	// a heavier sibling of b1 and its child, built on a chain that never saw b1
	let b1_sibling = prepare_block(&source, &genesis, vec![], 2, 2);
	source.process_block(b1_sibling.clone(), Options::SKIP_POW).unwrap();
	let b2 = prepare_block(&source, &b1_sibling.header, vec![], 1, 3);

	let head = chain.head().unwrap();
	let roots = chain.get_txhashset_roots().unwrap();
	match chain.process_block(b2.clone(), Options::SKIP_POW) {
		Err(Error::Orphan) => (),
		other => panic!("expected an orphan, got {:?}", other),
	}
	assert!(chain.is_orphan(&b2.hash()));
	assert_eq!(chain.orphans_len(), 1);
	assert_eq!(chain.head().unwrap(), head);
	assert_eq!(chain.get_txhashset_roots().unwrap(), roots);
	assert!(chain.get_block_header(&b2.hash()).is_err());

	// the parent arrives, the orphan gets processed right after it
	chain.process_block(b1_sibling, Options::SKIP_POW).unwrap();
	assert_eq!(chain.orphans_len(), 0);
	let head = chain.head().unwrap();
	assert_eq!(head.last_block_h, b2.hash());
	assert_eq!(head.height, 2);
	assert!(chain.is_on_current_chain(&b2.header).is_ok());

	clean_output_dir(chain_dir);
	clean_output_dir(source_dir);
}

#[test]
fn reject_bad_roots() {
	let chain_dir = ".mimble.bad_roots";
	let chain = init_chain(chain_dir);
	mine_some_on_top(&chain, 2, 1);

	let prev = chain.head_header().unwrap();
	let head = chain.head().unwrap();
	let roots = chain.get_txhashset_roots().unwrap();
	let size = chain.highest_output_insertion_index();

	let mut bad = prepare_block(&chain, &prev, vec![], 1, 10);
	bad.header.output_root = Hash::from_vec(&[7; 32]);
	match chain.process_block(bad, Options::SKIP_POW) {
		Err(Error::Other(_)) => (),
		other => panic!("unexpected {:?}", other),
	}

	let mut bad_size = prepare_block(&chain, &prev, vec![], 1, 11);
	bad_size.header.kernel_mmr_size += 1;
	assert!(chain.process_block(bad_size, Options::SKIP_POW).is_err());

	// nothing moved
	assert_eq!(chain.head().unwrap(), head);
	assert_eq!(chain.get_txhashset_roots().unwrap(), roots);
	assert_eq!(chain.highest_output_insertion_index(), size);

	// and the good version of the block still goes through
	let good = prepare_block(&chain, &prev, vec![], 1, 12);
	chain.process_block(good, Options::SKIP_POW).unwrap();
	assert_eq!(chain.head().unwrap().height, 3);

	clean_output_dir(chain_dir);
}

#[test]
fn check_pow_and_difficulty() {
	let chain_dir = ".mimble.difficulty";
	clean_output_dir(chain_dir);
	let chain = init_chain_with(
		chain_dir,
		Arc::new(StatusAdapter::default()),
		Arc::new(FixedDifficulty(10)),
		false,
	);
	let genesis = chain.head_header().unwrap();

	// the test verifier only accepts even nonces
	let mut bad_pow = prepare_block(&chain, &genesis, vec![], 10, 1);
	bad_pow.header.nonce = 1;
	assert!(chain.process_block(bad_pow.clone(), Options::NONE).is_err());

	let wrong_diff = prepare_block(&chain, &genesis, vec![], 3, 1);
	match chain.process_block(wrong_diff.clone(), Options::NONE) {
		Err(Error::Other(_)) => (),
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(chain.head().unwrap().height, 0);

	let b1 = prepare_block(&chain, &genesis, vec![], 10, 1);
	chain.process_block(b1, Options::NONE).unwrap();
	assert_eq!(chain.head().unwrap().height, 1);

	// too far in the future is unfit, not invalid
	let prev = chain.head_header().unwrap();
	let mut future = prepare_block(&chain, &prev, vec![], 10, 2);
	future.header.timestamp = chrono::Utc::now() + chrono::Duration::hours(1);
	match chain.process_block(future, Options::NONE) {
		Err(Error::Unfit(_)) => (),
		other => panic!("unexpected {:?}", other),
	}

	clean_output_dir(chain_dir);
}

#[test]
fn header_first_and_sync() {
	let chain_dir = ".mimble.headers";
	let source_dir = ".mimble.headers_source";
	let chain = init_chain(chain_dir);
	let source = init_chain(source_dir);
	mine_some_on_top(&source, 3, 1);

	for n in 1..=3 {
		let header = source.get_header_by_height(n).unwrap();
		chain.sync_block_header(&header, Options::SKIP_POW).unwrap();
	}
	assert_eq!(chain.get_sync_head().unwrap().height, 3);
	assert_eq!(chain.get_header_head().unwrap().height, 3);
	assert_eq!(chain.head().unwrap().height, 0);
	assert_eq!(
		chain.total_header_difficulty().unwrap(),
		source.total_difficulty()
	);

	// a header we already know is fine to see again
	let header = source.get_header_by_height(2).unwrap();
	chain.process_block_header(&header, Options::SKIP_POW).unwrap();

	// a header with an unknown parent
	let mut orphan = source.get_header_by_height(3).unwrap();
	orphan.previous = Hash::from_vec(&[3; 32]);
	match chain.process_block_header(&orphan, Options::SKIP_POW) {
		Err(Error::Orphan) => (),
		other => panic!("unexpected {:?}", other),
	}

	// full blocks catch up the body chain
	for n in 1..=3 {
		let header = source.get_header_by_height(n).unwrap();
		let b = source.get_block(&header.hash()).unwrap();
		chain.process_block(b, Options::SKIP_POW | Options::SYNC).unwrap();
	}
	assert_eq!(chain.head().unwrap(), source.head().unwrap());

	chain.reset_head().unwrap();
	assert_eq!(chain.get_sync_head().unwrap(), chain.head().unwrap());

	clean_output_dir(chain_dir);
	clean_output_dir(source_dir);
}

#[test]
fn output_merkle_proofs() {
	let chain_dir = ".mimble.merkle";
	let chain = init_chain(chain_dir);
	mine_some_on_top(&chain, 3, 1);

	let header = chain.head_header().unwrap();
	let out_id = coinbase_id(2);
	assert!(chain.is_unspent(&out_id).is_ok());

	let pos = chain.store().get_output_pos(&out_id.commit).unwrap();
	let proof = chain.get_merkle_proof(&out_id, &header).unwrap();
	assert_eq!(proof.mmr_size, header.output_mmr_size);
	assert!(proof.verify(header.output_root, &out_id, pos).is_ok());

	let current = chain.get_merkle_proof_for_pos(out_id.commit).unwrap();
	assert_eq!(current, proof);

	// the proof doesn't hold for another output or another root
	let other = coinbase_id(3);
	assert!(proof.verify(header.output_root, &other, pos).is_err());
	let prev = chain.get_header_by_height(2).unwrap();
	assert!(proof.verify(prev.output_root, &out_id, pos).is_err());

	// a proof against an older header only covers what existed back then
	let older = chain.get_merkle_proof(&out_id, &prev).unwrap();
	assert_eq!(older.mmr_size, prev.output_mmr_size);
	assert!(older.verify(prev.output_root, &out_id, pos).is_ok());

	match chain.get_merkle_proof(&coinbase_id(99), &header) {
		Err(Error::OutputNotFound) => (),
		other => panic!("unexpected {:?}", other),
	}

	clean_output_dir(chain_dir);
}
