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

//! The chain type this process runs, and the parameters that differ
//! between networks because of it. Set once at startup.

use crate::consensus::{COINBASE_MATURITY, CUT_THROUGH_HORIZON, INITIAL_DIFFICULTY};
use crate::util::RwLock;

/// Network flavours. Test chains mature coinbases and compact almost
/// immediately and start at the lowest difficulty.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChainTypes {
	/// Chains built by the test suites
	AutomatedTesting,
	/// Local chains for manual experiments
	UserTesting,
	/// Production network
	Mainnet,
}

struct ChainParams {
	coinbase_maturity: u64,
	cut_through_horizon: u32,
	initial_difficulty: u64,
}

const TESTING_PARAMS: ChainParams = ChainParams {
	coinbase_maturity: 3,
	cut_through_horizon: 20,
	initial_difficulty: 1,
};

const MAINNET_PARAMS: ChainParams = ChainParams {
	coinbase_maturity: COINBASE_MATURITY,
	cut_through_horizon: CUT_THROUGH_HORIZON,
	initial_difficulty: INITIAL_DIFFICULTY,
};

impl ChainTypes {
	/// Directory name for the chain's data.
	pub fn shortname(&self) -> &'static str {
		match self {
			ChainTypes::AutomatedTesting => "auto",
			ChainTypes::UserTesting => "user",
			ChainTypes::Mainnet => "main",
		}
	}

	fn params(self) -> &'static ChainParams {
		match self {
			ChainTypes::Mainnet => &MAINNET_PARAMS,
			ChainTypes::AutomatedTesting | ChainTypes::UserTesting => &TESTING_PARAMS,
		}
	}
}

impl Default for ChainTypes {
	fn default() -> ChainTypes {
		ChainTypes::Mainnet
	}
}

lazy_static! {
	static ref CHAIN_TYPE: RwLock<ChainTypes> = RwLock::new(ChainTypes::default());
}

/// Switches the process to another chain type.
pub fn set_local_chain_type(new_type: ChainTypes) {
	*CHAIN_TYPE.write() = new_type;
}

/// Chain type in effect.
pub fn get_chain_type() -> ChainTypes {
	*CHAIN_TYPE.read()
}

/// Confirmations before a coinbase is spendable.
pub fn coinbase_maturity() -> u64 {
	get_chain_type().params().coinbase_maturity
}

/// Depth, in blocks, under which spent data may be compacted away.
pub fn cut_through_horizon() -> u32 {
	get_chain_type().params().cut_through_horizon
}

/// Difficulty carried by the genesis block.
pub fn initial_block_difficulty() -> u64 {
	get_chain_type().params().initial_difficulty
}

/// Running on mainnet.
pub fn is_production_mode() -> bool {
	get_chain_type() == ChainTypes::Mainnet
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_chains_share_parameters() {
		let user = ChainTypes::UserTesting.params();
		let auto = ChainTypes::AutomatedTesting.params();
		assert_eq!(user.coinbase_maturity, auto.coinbase_maturity);
		assert!(auto.coinbase_maturity < ChainTypes::Mainnet.params().coinbase_maturity);
		assert_eq!(ChainTypes::Mainnet.params().initial_difficulty, INITIAL_DIFFICULTY);
		assert_eq!(ChainTypes::Mainnet.shortname(), "main");
	}
}
