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

//! Codec and ordering helpers shared by the core types.

/// Reads several values in a row into a tuple, one reader call each:
/// `let (a, b) = ser_multiread!(reader, read_u64, read_u32);`
#[macro_export]
macro_rules! ser_multiread {
	($rdr:ident, $($read_call:ident $(($val:expr)),*),*) => {
		( $($rdr.$read_call($($val),*)?),* )
	}
}

/// Writes several values in a row, one writer call each:
/// `ser_multiwrite!(writer, [write_u64, a], [write_u32, b]);`
#[macro_export]
macro_rules! ser_multiwrite {
	($wrtr:ident, $([ $write_call:ident, $val:expr ]),* ) => {
		$( $wrtr.$write_call($val)? );*
	}
}

/// Orders and compares a type by its hash. Body elements are kept in hash
/// order so every node lays a body out the same way.
#[macro_export]
macro_rules! hashable_ord {
	($hashable:ident) => {
		impl Ord for $hashable {
			fn cmp(&self, other: &$hashable) -> Ordering {
				self.hash().cmp(&other.hash())
			}
		}

		impl PartialOrd for $hashable {
			fn partial_cmp(&self, other: &$hashable) -> Option<Ordering> {
				Some(self.cmp(other))
			}
		}

		impl PartialEq for $hashable {
			fn eq(&self, other: &$hashable) -> bool {
				self.hash() == other.hash()
			}
		}

		impl Eq for $hashable {}
	};
}
