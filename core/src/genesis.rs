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

//! Definition of the genesis block.

use std::time::{Duration, UNIX_EPOCH};

use chrono::prelude::{DateTime, Utc};

use crate::core;
use crate::core::hash::Hash;
use crate::core::target::Difficulty;
use crate::global;

/// Genesis block definition for development networks. Carries no outputs
/// so all its MMR roots are the empty root.
pub fn genesis_dev() -> core::Block {
	core::Block::with_header(core::BlockHeader {
		height: 0,
		previous: Hash::from_vec(&[0xff; 32]),
		timestamp: DateTime::<Utc>::from(UNIX_EPOCH + Duration::from_secs(870_652_800)),
		total_difficulty: Difficulty::from_num(global::initial_block_difficulty()),
		..Default::default()
	})
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::hash::ZERO_HASH;

	#[test]
	fn genesis_is_empty() {
		global::set_local_chain_type(global::ChainTypes::AutomatedTesting);
		let gen = genesis_dev();
		assert_eq!(gen.header.height, 0);
		assert_eq!(gen.header.output_root, ZERO_HASH);
		assert_eq!(gen.header.output_mmr_size, 0);
		assert!(gen.body.inputs.is_empty() && gen.body.outputs.is_empty());
		assert_eq!(gen.header.total_difficulty, Difficulty::one());
	}
}
