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

//! Block difficulty, the amount of work a proof of work stands for.

use std::fmt;
use std::ops::{Add, Sub};

use crate::ser::{self, Readable, Reader, Writeable, Writer};

/// Work carried by a block. Summed along a chain it gives the cumulative
/// difficulty forks are ranked by. Arithmetic saturates instead of
/// wrapping.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash, Serialize, Deserialize)]
pub struct Difficulty(u64);

impl Difficulty {
	/// Zero work. Never valid for a block but the neutral start of a sum.
	pub fn zero() -> Difficulty {
		Difficulty(0)
	}

	/// The minimum.
	pub fn one() -> Difficulty {
		Difficulty(1)
	}

	/// Lowest difficulty a block may carry.
	pub fn min() -> Difficulty {
		Difficulty::one()
	}

	/// Wraps a raw value, raising anything under the minimum to it.
	pub fn from_num(num: u64) -> Difficulty {
		Difficulty(num.max(1))
	}

	/// Raw value.
	pub fn to_num(self) -> u64 {
		self.0
	}
}

impl fmt::Display for Difficulty {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl Add for Difficulty {
	type Output = Difficulty;
	fn add(self, other: Difficulty) -> Difficulty {
		Difficulty(self.0.saturating_add(other.0))
	}
}

impl Sub for Difficulty {
	type Output = Difficulty;
	fn sub(self, other: Difficulty) -> Difficulty {
		Difficulty(self.0.saturating_sub(other.0))
	}
}

impl Writeable for Difficulty {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.0)
	}
}

impl Readable for Difficulty {
	fn read<R: Reader>(reader: &mut R) -> Result<Difficulty, ser::Error> {
		// cumulative sums read from disk may legitimately be zero
		Ok(Difficulty(reader.read_u64()?))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn difficulty_never_below_one() {
		assert_eq!(Difficulty::from_num(0), Difficulty::one());
		assert_eq!(Difficulty::from_num(7).to_num(), 7);
	}

	#[test]
	fn difficulty_arithmetic() {
		let a = Difficulty::from_num(10);
		let b = Difficulty::from_num(4);
		assert_eq!((a + b).to_num(), 14);
		assert_eq!((a - b).to_num(), 6);
		assert_eq!((b - a), Difficulty::zero());
		assert_eq!(Difficulty::from_num(u64::MAX) + a, Difficulty::from_num(u64::MAX));
		assert!(a > b);
		assert_eq!(a.to_string(), "10");
	}
}
