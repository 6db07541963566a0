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

use mimble_core::consensus::{
	difficulty_window, next_difficulty, TargetError, BLOCK_TIME_SEC, DIFFICULTY_ADJUST_WINDOW,
	MEDIAN_TIME_WINDOW,
};
use mimble_core::core::Difficulty;

// Builds difficulty data for `len` blocks, spaced by `interval` seconds from
// `from`, all at the same difficulty. Latest block first, as the chain
// iterates it.
fn repeat(from: u64, interval: u64, diff: u64, len: u64) -> Vec<Result<(u64, Difficulty), TargetError>> {
	(0..len)
		.map(|i| Ok((from + interval * i, Difficulty::from_num(diff))))
		.rev()
		.collect()
}

fn window() -> u64 {
	DIFFICULTY_ADJUST_WINDOW + MEDIAN_TIME_WINDOW
}

#[test]
fn steady_chain_keeps_difficulty() {
	let diff = next_difficulty(repeat(0, BLOCK_TIME_SEC, 1000, window())).unwrap();
	assert_eq!(diff, Difficulty::from_num(1000));

	// older blocks beyond the window don't matter
	let diff = next_difficulty(repeat(0, BLOCK_TIME_SEC, 1000, window() + 50)).unwrap();
	assert_eq!(diff, Difficulty::from_num(1000));
}

#[test]
fn fast_blocks_raise_difficulty() {
	let diff = next_difficulty(repeat(0, BLOCK_TIME_SEC / 2, 1000, window())).unwrap();
	assert_eq!(diff, Difficulty::from_num(1200));
}

#[test]
fn slow_blocks_lower_difficulty() {
	let diff = next_difficulty(repeat(0, BLOCK_TIME_SEC * 2, 1000, window())).unwrap();
	assert_eq!(diff, Difficulty::from_num(750));

	// adjustment is bounded
	let diff = next_difficulty(repeat(0, BLOCK_TIME_SEC * 10, 1000, window())).unwrap();
	assert_eq!(diff, Difficulty::from_num(500));
}

#[test]
fn genesis_only_is_padded() {
	let diff = next_difficulty(repeat(1_000_000, BLOCK_TIME_SEC, 1000, 1)).unwrap();
	assert_eq!(diff, Difficulty::from_num(1000));

	let data = difficulty_window(repeat(1_000_000, 10, 1000, 3)).unwrap();
	assert_eq!(data.len() as u64, window());
	// earliest to latest, simulated blocks reuse the live intervals
	assert_eq!(data[data.len() - 1].0, 1_000_020);
	assert_eq!(data[data.len() - 3].0, 1_000_000);
	assert_eq!(data[data.len() - 4].0, 999_990);
	assert!(data.windows(2).all(|w| w[0].0 <= w[1].0));
}

#[test]
fn difficulty_never_drops_to_zero() {
	let diff = next_difficulty(repeat(0, BLOCK_TIME_SEC * 10, 1, window())).unwrap();
	assert_eq!(diff, Difficulty::min());
}

#[test]
fn difficulty_errors() {
	let empty: Vec<Result<(u64, Difficulty), TargetError>> = vec![];
	assert!(next_difficulty(empty).is_err());

	let mut data = repeat(0, BLOCK_TIME_SEC, 1000, 20);
	data.insert(5, Err(TargetError("missing header".to_owned())));
	assert_eq!(
		next_difficulty(data),
		Err(TargetError("missing header".to_owned()))
	);
}
