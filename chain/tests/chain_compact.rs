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

use self::chain::types::Options;
use self::chain::{ConsensusDifficulty, NoopAdapter};
use self::chain_test_helper::{
	clean_output_dir, coinbase_input, init_chain, init_chain_with, mine_some_on_top,
	prepare_block, reload_chain, tx,
};
use self::core::consensus::reward;
use self::core::core::hash::Hashed;
use self::core::core::OutputIdentifier;
use self::core::global;
use mimble_chain as chain;
use mimble_core as core;
use std::sync::Arc;

// Mines 4 blocks, spends the first coinbase in the 5th, then mines on top
// until the chain is 25 blocks high.
fn mine_with_spend(chain: &chain::Chain) {
	mine_some_on_top(chain, 4, 1);
	let spend = tx(
		vec![(coinbase_input(1), reward(0), 1)],
		vec![(reward(0) - 1, 500)],
		1,
	);
	let prev = chain.head_header().unwrap();
	let b5 = prepare_block(chain, &prev, vec![spend], 1, 5);
	chain.process_block(b5, Options::SKIP_POW).unwrap();
	mine_some_on_top(chain, 20, 6);
	assert_eq!(chain.head().unwrap().height, 25);
}

#[test]
fn compact_removes_old_blocks() {
	let chain_dir = ".mimble.compact";
	let chain = init_chain(chain_dir);
	assert_eq!(global::cut_through_horizon(), 20);
	mine_with_spend(&chain);

	let head = chain.head().unwrap();
	let roots = chain.get_txhashset_roots().unwrap();
	let b1 = chain.get_header_by_height(1).unwrap();
	let b10 = chain.get_header_by_height(10).unwrap();

	chain.compact().unwrap();

	assert_eq!(chain.head().unwrap(), head);
	assert_eq!(chain.get_txhashset_roots().unwrap(), roots);
	assert!(chain.get_block(&b1.hash()).is_err());
	assert!(chain.get_block_header(&b1.hash()).is_ok());
	assert!(chain.get_block(&b10.hash()).is_ok());
	chain.validate(false).unwrap();

	// unspent outputs below the horizon are still around
	let b2 = chain.get_header_by_height(2).unwrap();
	assert!(chain.is_unspent(&coinbase_id(2)).is_ok());
	assert!(chain.get_merkle_proof(&coinbase_id(2), &head_header(&chain)).is_ok());
	assert!(chain.get_block(&b2.hash()).is_err());

	// compacting again is harmless and the chain keeps going
	chain.compact().unwrap();
	mine_some_on_top(&chain, 2, 100);
	assert_eq!(chain.head().unwrap().height, 27);

	let head = chain.head().unwrap();
	drop(chain);
	let chain = reload_chain(chain_dir);
	assert_eq!(chain.head().unwrap(), head);
	chain.validate(false).unwrap();

	clean_output_dir(chain_dir);
}

#[test]
fn compact_archive_keeps_blocks() {
	let chain_dir = ".mimble.compact_archive";
	clean_output_dir(chain_dir);
	let chain = init_chain_with(
		chain_dir,
		Arc::new(NoopAdapter {}),
		Arc::new(ConsensusDifficulty),
		true,
	);
	mine_with_spend(&chain);

	chain.compact().unwrap();
	let b1 = chain.get_header_by_height(1).unwrap();
	assert!(chain.get_block(&b1.hash()).is_ok());
	chain.validate(true).unwrap();

	clean_output_dir(chain_dir);
}

#[test]
fn compact_short_chain_is_noop() {
	let chain_dir = ".mimble.compact_short";
	let chain = init_chain(chain_dir);
	mine_some_on_top(&chain, 5, 1);

	chain.compact().unwrap();
	let b1 = chain.get_header_by_height(1).unwrap();
	assert!(chain.get_block(&b1.hash()).is_ok());

	clean_output_dir(chain_dir);
}

fn coinbase_id(r: u64) -> OutputIdentifier {
	OutputIdentifier::from_output(&chain_test_helper::reward_output(0, r).0)
}

fn head_header(chain: &chain::Chain) -> core::core::BlockHeader {
	chain.head_header().unwrap()
}
