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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use self::chain::types::Options;
use self::chain::Error;
use self::chain_test_helper::{clean_output_dir, init_chain, mine_some_on_top, prepare_block};
use self::core::core::hash::Hashed;
use self::core::core::Block;
use mimble_chain as chain;
use mimble_core as core;

const SUBMITTERS: usize = 4;

// Main line of 6 blocks, then a heavier 4 block fork from genesis that
// takes over.
fn blocks_with_reorg(dir: &str) -> (Vec<Block>, chain::Tip) {
	let source = init_chain(dir);
	let genesis = source.head_header().unwrap();
	mine_some_on_top(&source, 6, 1);
	let mut blocks: Vec<Block> = (1..=6)
		.map(|n| {
			let header = source.get_header_by_height(n).unwrap();
			source.get_block(&header.hash()).unwrap()
		})
		.collect();

	let mut prev = genesis;
	for r in 100..104 {
		let b = prepare_block(&source, &prev, vec![], 3, r);
		prev = b.header.clone();
		blocks.push(b.clone());
		source.process_block(b, Options::SKIP_POW).unwrap();
	}
	let head = source.head().unwrap();
	assert_eq!(head.last_block_h, prev.hash());
	(blocks, head)
}

#[test]
fn concurrent_submission_keeps_head_in_step_with_store() {
	let source_dir = ".mimble.concurrent_source";
	let chain_dir = ".mimble.concurrent";
	let (blocks, expected) = blocks_with_reorg(source_dir);
	let chain = Arc::new(init_chain(chain_dir));
	let done = Arc::new(AtomicBool::new(false));

	// with the txhashset held for reading no block can be half applied, so
	// the cached head and the db head have to agree
	let reader = {
		let chain = chain.clone();
		let done = done.clone();
		thread::spawn(move || {
			let mut checks = 0;
			while !done.load(Ordering::SeqCst) || checks == 0 {
				let txhashset = chain.txhashset();
				let _guard = txhashset.read();
				assert_eq!(chain.head().unwrap(), chain.store().head().unwrap());
				checks += 1;
			}
		})
	};

	let submitters: Vec<_> = (0..SUBMITTERS)
		.map(|i| {
			let chain = chain.clone();
			let blocks = blocks.clone();
			thread::spawn(move || {
				let n = blocks.len();
				for b in blocks.into_iter().cycle().skip(i * 3).take(n) {
					if i % 2 == 0 {
						let _ = chain.process_block_header(&b.header, Options::SKIP_POW);
					}
					match chain.process_block(b, Options::SKIP_POW) {
						Ok(_) | Err(Error::Orphan) | Err(Error::Unfit(_)) => (),
						Err(e) => panic!("unexpected {:?}", e),
					}
				}
			})
		})
		.collect();
	for s in submitters {
		s.join().unwrap();
	}
	done.store(true, Ordering::SeqCst);
	reader.join().unwrap();

	// an orphan can miss its parent's orphan check, resubmitting settles it
	for b in blocks {
		let _ = chain.process_block(b, Options::SKIP_POW);
	}

	assert_eq!(chain.head().unwrap(), expected);
	assert_eq!(chain.store().head().unwrap(), expected);
	assert_eq!(chain.get_header_head().unwrap(), expected);
	chain.validate(false).unwrap();

	clean_output_dir(chain_dir);
	clean_output_dir(source_dir);
}
