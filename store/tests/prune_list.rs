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

use mimble_store as store;

use crate::store::prune_list::PruneList;
use croaring::Bitmap;

#[test]
fn zero_is_never_pruned() {
	let mut bitmap = Bitmap::create();
	bitmap.add(0);
	let pl = PruneList::new(None, bitmap);
	assert!(pl.is_empty());
}

#[test]
fn siblings_roll_up_into_parent() {
	let mut pl = PruneList::empty();
	assert!(!pl.is_pruned(1));

	pl.add(2);
	assert_eq!(pl.iter().collect::<Vec<_>>(), [2]);
	assert!(pl.is_pruned(2));
	assert!(!pl.is_pruned(1));
	assert!(!pl.is_pruned(3));

	// adding the same pos twice is a no-op
	pl.add(2);
	pl.add(1);
	assert_eq!(pl.len(), 1);
	assert_eq!(pl.iter().collect::<Vec<_>>(), [3]);
	assert!(pl.is_pruned(1));
	assert!(pl.is_pruned(2));
	assert!(pl.is_pruned(3));
	assert!(pl.is_pruned_root(3));
	assert!(!pl.is_pruned_root(1));

	pl.add(4);
	pl.add(5);
	assert_eq!(pl.iter().collect::<Vec<_>>(), [7]);
	for pos in 1..=7 {
		assert!(pl.is_pruned(pos));
	}
	assert!(!pl.is_pruned(8));

	// a higher level root swallows anything below it
	let mut pl = PruneList::empty();
	pl.add(4);
	pl.add(1);
	pl.add(7);
	assert_eq!(pl.iter().collect::<Vec<_>>(), [7]);
}

#[test]
fn shifts_only_count_compacted_nodes() {
	let mut pl = PruneList::empty();
	pl.add(1);
	pl.flush().unwrap();

	// a pruned leaf keeps its own hash and data
	assert_eq!(pl.get_shift(3), 0);
	assert_eq!(pl.get_leaf_shift(3), 0);

	pl.add(2);
	pl.flush().unwrap();
	assert_eq!(pl.iter().collect::<Vec<_>>(), [3]);
	assert_eq!(pl.get_shift(2), 0);
	assert_eq!(pl.get_shift(3), 2);
	assert_eq!(pl.get_shift(4), 2);
	assert_eq!(pl.get_leaf_shift(4), 2);
	assert_eq!(pl.get_total_shift(), 2);
	assert_eq!(pl.get_total_leaf_shift(), 2);

	pl.add(4);
	pl.add(5);
	pl.flush().unwrap();
	assert_eq!(pl.iter().collect::<Vec<_>>(), [7]);
	assert_eq!(pl.get_shift(7), 6);
	assert_eq!(pl.get_shift(8), 6);
	assert_eq!(pl.get_leaf_shift(8), 4);

	// unconnected subtrees accumulate
	let mut pl = PruneList::empty();
	pl.add(4);
	pl.add(5);
	pl.add(11);
	pl.add(12);
	pl.flush().unwrap();
	assert_eq!(pl.iter().collect::<Vec<_>>(), [6, 13]);
	assert_eq!(pl.get_shift(7), 2);
	assert_eq!(pl.get_shift(13), 4);
	assert_eq!(pl.get_shift(15), 4);
	assert_eq!(pl.get_leaf_shift(8), 2);
	assert_eq!(pl.get_leaf_shift(16), 4);
}

#[test]
fn prune_list_survives_reopen() {
	let data_dir = "test_output/prune_list_reopen";
	let _ = std::fs::remove_dir_all(data_dir);
	std::fs::create_dir_all(data_dir).unwrap();
	let path = format!("{}/pmmr_prun.bin", data_dir);
	{
		let mut pl = PruneList::open(&path).unwrap();
		pl.add(1);
		pl.add(2);
		pl.flush().unwrap();
	}
	let pl = PruneList::open(&path).unwrap();
	assert_eq!(pl.iter().collect::<Vec<_>>(), [3]);
	assert_eq!(pl.get_shift(4), 2);
	let _ = std::fs::remove_dir_all(data_dir);
}
