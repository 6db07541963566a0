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

//! Proof of work payload carried by block headers. Searching for and
//! verifying solutions happens outside of this crate, headers only carry
//! the solution around and commit to it through their hash.

use crate::ser::{self, Readable, Reader, Writeable, Writer};

/// Upper bound on the number of nonces a proof may carry.
pub const MAX_PROOF_SIZE: usize = 64;

/// A proof of work, made of the graph size it was found on and the nonces
/// of the edges making up the cycle.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Proof {
	/// Power of 2 used for the size of the graph
	pub edge_bits: u8,
	/// The nonces
	pub nonces: Vec<u64>,
}

impl Proof {
	/// Builds a proof with provided nonces at default edge_bits
	pub fn new(mut in_nonces: Vec<u64>) -> Proof {
		in_nonces.sort_unstable();
		Proof {
			edge_bits: 0,
			nonces: in_nonces,
		}
	}

	/// Builds a proof with all bytes zeroed out
	pub fn zero(proof_size: usize) -> Proof {
		Proof {
			edge_bits: 0,
			nonces: vec![0; proof_size],
		}
	}

	/// Returns the proof size
	pub fn proof_size(&self) -> usize {
		self.nonces.len()
	}
}

impl Writeable for Proof {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u8(self.edge_bits)?;
		writer.write_u8(self.nonces.len() as u8)?;
		for n in &self.nonces {
			writer.write_u64(*n)?;
		}
		Ok(())
	}
}

impl Readable for Proof {
	fn read<R: Reader>(reader: &mut R) -> Result<Proof, ser::Error> {
		let edge_bits = reader.read_u8()?;
		let len = reader.read_u8()? as usize;
		if len > MAX_PROOF_SIZE {
			return Err(ser::Error::TooLargeReadErr);
		}
		let mut nonces = Vec::with_capacity(len);
		for _ in 0..len {
			nonces.push(reader.read_u64()?);
		}
		Ok(Proof { edge_bits, nonces })
	}
}
