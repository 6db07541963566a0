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

//! Consensus parameters: amounts, block weight limits, maturity and
//! horizon lengths, and the difficulty retarget. Anything a node must agree
//! on with its peers to follow the same chain belongs here.

use crate::core::target::Difficulty;

/// Number of base units in one whole coin.
pub const MIMBLE_BASE: u64 = 1_000_000_000;

/// Target spacing between blocks, in seconds.
pub const BLOCK_TIME_SEC: u64 = 60;

/// Coinbase subsidy of every block, before fees.
pub const REWARD: u64 = BLOCK_TIME_SEC * MIMBLE_BASE;

/// What a coinbase may claim: the subsidy plus the fees of the block.
pub fn reward(fee: u64) -> u64 {
	REWARD.saturating_add(fee)
}

/// Confirmations a coinbase output needs before it can be spent.
pub const COINBASE_MATURITY: u64 = 1_000;

/// Depth below which spent outputs get compacted away, two days of blocks.
/// Deep enough that no realistic reorg reaches under it.
pub const CUT_THROUGH_HORIZON: u32 = 48 * 3600 / (BLOCK_TIME_SEC as u32);

/// How far ahead of our clock a header timestamp may be, in block times.
pub const FUTURE_TIME_LIMIT_BLOCKS: u64 = 12;

/// Block weight of one input.
pub const BLOCK_INPUT_WEIGHT: u64 = 1;
/// Block weight of one output, range proof included.
pub const BLOCK_OUTPUT_WEIGHT: u64 = 21;
/// Block weight of one kernel.
pub const BLOCK_KERNEL_WEIGHT: u64 = 3;
/// Upper bound on the summed weight of a block body.
pub const MAX_BLOCK_WEIGHT: u64 = 40_000;

/// True when a body with these many inputs, outputs and kernels is too
/// heavy to fit in a block.
pub fn exceeds_weight(input_len: usize, output_len: usize, kernel_len: usize) -> bool {
	let weight = input_len as u64 * BLOCK_INPUT_WEIGHT
		+ output_len as u64 * BLOCK_OUTPUT_WEIGHT
		+ kernel_len as u64 * BLOCK_KERNEL_WEIGHT;
	weight > MAX_BLOCK_WEIGHT
}

/// Heights at which the header version is scheduled to change.
pub const HARD_FORK_INTERVAL: u64 = 250_000;

/// Only version 1 headers are accepted, and only before the first fork.
pub fn valid_header_version(height: u64, version: u16) -> bool {
	version == 1 && height < HARD_FORK_INTERVAL
}

/// Blocks whose timestamps are reduced to a median at each end of the
/// retarget window.
pub const MEDIAN_TIME_WINDOW: u64 = 11;

/// Blocks whose difficulty is averaged by the retarget.
pub const DIFFICULTY_ADJUST_WINDOW: u64 = 60;

/// Expected duration of the adjustment window.
pub const BLOCK_TIME_WINDOW: u64 = DIFFICULTY_ADJUST_WINDOW * BLOCK_TIME_SEC;

/// Longest window duration the retarget takes into account.
pub const UPPER_TIME_BOUND: u64 = BLOCK_TIME_WINDOW * 2;

/// Shortest window duration the retarget takes into account.
pub const LOWER_TIME_BOUND: u64 = BLOCK_TIME_WINDOW / 2;

/// The measured window duration only counts for one part in this many.
pub const DAMP_FACTOR: u64 = 3;

/// Difficulty of the mainnet genesis. Deliberately high, early blocks are
/// expected to pull it down.
pub const INITIAL_DIFFICULTY: u64 = 1_000_000;

/// Difficulty history could not be produced or was unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error computing new difficulty: {0}")]
pub struct TargetError(pub String);

/// Collects the `(timestamp, difficulty)` pairs the retarget works on,
/// ordered from earliest to latest. `cursor` walks the chain backwards from
/// the tip.
///
/// A young chain has fewer blocks than the window needs. The missing history
/// is made up by replaying the intervals seen so far backwards from the
/// first block, all at the latest difficulty. A lone genesis counts as one
/// perfectly timed interval.
pub fn difficulty_window<T>(cursor: T) -> Result<Vec<(u64, Difficulty)>, TargetError>
where
	T: IntoIterator<Item = Result<(u64, Difficulty), TargetError>>,
{
	let needed = (MEDIAN_TIME_WINDOW + DIFFICULTY_ADJUST_WINDOW) as usize;
	let mut window = cursor
		.into_iter()
		.take(needed)
		.collect::<Result<Vec<_>, _>>()?;
	window.reverse();

	let (first_ts, last_diff) = match (window.first(), window.last()) {
		(Some(first), Some(last)) => (first.0, last.1),
		_ => return Err(TargetError("no difficulty data".to_owned())),
	};
	if window.len() < needed {
		let mut intervals: Vec<u64> = window
			.windows(2)
			.map(|pair| pair[1].0.saturating_sub(pair[0].0))
			.collect();
		if intervals.is_empty() {
			intervals.push(BLOCK_TIME_SEC);
		}
		let mut ts = first_ts;
		let padding: Vec<(u64, Difficulty)> = intervals
			.iter()
			.rev()
			.cycle()
			.take(needed - window.len())
			.map(|gap| {
				ts = ts.saturating_sub(*gap);
				(ts, last_diff)
			})
			.collect();
		window = padding.into_iter().rev().chain(window).collect();
	}
	Ok(window)
}

fn median_time(blocks: &[(u64, Difficulty)]) -> u64 {
	let mut times: Vec<u64> = blocks.iter().map(|b| b.0).collect();
	times.sort_unstable();
	times[times.len() / 2]
}

/// Difficulty the next block must meet, given the chain history from the
/// tip backwards.
///
/// Averages difficulty over the last `DIFFICULTY_ADJUST_WINDOW` blocks and
/// scales it by how long that window took against how long it should have
/// taken. The window duration runs between the median timestamps of its two
/// ends, is dampened toward the expected duration then clamped to
/// `[LOWER_TIME_BOUND, UPPER_TIME_BOUND]`. Never goes below 1.
pub fn next_difficulty<T>(cursor: T) -> Result<Difficulty, TargetError>
where
	T: IntoIterator<Item = Result<(u64, Difficulty), TargetError>>,
{
	let window = difficulty_window(cursor)?;
	let median_span = MEDIAN_TIME_WINDOW as usize;

	let diff_sum = window[median_span..]
		.iter()
		.fold(0u64, |sum, block| sum.saturating_add(block.1.to_num()));
	let diff_avg = diff_sum / DIFFICULTY_ADJUST_WINDOW;

	let earliest = median_time(&window[..median_span]);
	let latest = median_time(&window[window.len() - median_span..]);
	let ts_delta = latest.saturating_sub(earliest);

	let ts_damp = if diff_avg >= DAMP_FACTOR {
		((DAMP_FACTOR - 1) * BLOCK_TIME_WINDOW + ts_delta) / DAMP_FACTOR
	} else {
		ts_delta
	};
	let adj_ts = ts_damp.clamp(LOWER_TIME_BOUND, UPPER_TIME_BOUND);

	let difficulty = diff_avg.saturating_mul(BLOCK_TIME_WINDOW) / adj_ts;
	Ok(Difficulty::from_num(difficulty.max(1)))
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn reward_includes_fees() {
		assert_eq!(reward(0), REWARD);
		assert_eq!(reward(5), REWARD + 5);
		assert_eq!(reward(u64::MAX), u64::MAX);
	}

	#[test]
	fn header_version_by_height() {
		assert!(valid_header_version(0, 1));
		assert!(!valid_header_version(0, 2));
		assert!(!valid_header_version(HARD_FORK_INTERVAL, 1));
	}

	#[test]
	fn block_weight_limit() {
		assert!(!exceeds_weight(0, 1, 1));
		let max_outputs = (MAX_BLOCK_WEIGHT / BLOCK_OUTPUT_WEIGHT) as usize;
		assert!(!exceeds_weight(0, max_outputs, 0));
		assert!(exceeds_weight(0, max_outputs + 1, 0));
	}
}
