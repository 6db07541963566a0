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

//! Merkle proofs of output inclusion.

use crate::core::hash::Hash;
use crate::core::pmmr;
use crate::ser::{self, PMMRIndexHashable, Readable, Reader, Writeable, Writer};
use crate::util;

/// Merkle proof errors.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum MerkleProofError {
	/// Hashing up the path doesn't reach the expected root.
	#[error("merkle proof does not lead to the root")]
	RootMismatch,
}

/// Path of sibling hashes from a leaf up to an MMR root, valid for the MMR
/// size it was built at.
#[derive(Debug, Eq, PartialEq, Clone, PartialOrd, Ord, Default)]
pub struct MerkleProof {
	/// MMR size when the proof was built
	pub mmr_size: u64,
	/// Siblings from the leaf upwards, the bagged peaks last
	pub path: Vec<Hash>,
}

impl Writeable for MerkleProof {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.mmr_size)?;
		self.path.write(writer)
	}
}

impl Readable for MerkleProof {
	fn read<R: Reader>(reader: &mut R) -> Result<MerkleProof, ser::Error> {
		Ok(MerkleProof {
			mmr_size: reader.read_u64()?,
			path: Vec::<Hash>::read(reader)?,
		})
	}
}

impl MerkleProof {
	/// Proof for an empty MMR.
	pub fn empty() -> MerkleProof {
		MerkleProof::default()
	}

	/// Hex encoding of the serialized proof.
	pub fn to_hex(&self) -> Result<String, ser::Error> {
		ser::ser_vec(self).map(|bytes| util::to_hex(&bytes))
	}

	/// Parses a proof out of its hex encoding.
	pub fn from_hex(hex: &str) -> Result<MerkleProof, String> {
		let bytes = util::from_hex(hex).map_err(|e| format!("invalid hex: {}", e))?;
		ser::deserialize(&mut &bytes[..]).map_err(|e| format!("invalid merkle proof: {}", e))
	}

	/// Checks that `element` sits at `node_pos` in the MMR with the given
	/// root, hashing up through the path.
	pub fn verify(
		&self,
		root: Hash,
		element: &dyn PMMRIndexHashable,
		node_pos: u64,
	) -> Result<(), MerkleProofError> {
		if node_pos == 0 {
			return Err(MerkleProofError::RootMismatch);
		}
		let size = self.mmr_size;
		// nodes past the size are bags of peaks, indexed with the size
		let index = |pos: u64| if pos > size { size } else { pos - 1 };
		let peaks = pmmr::peaks(size);

		let mut pos = node_pos;
		let mut hash = element.hash_with_index(index(pos));
		for &sibling in &self.path {
			let (parent, sibling_pos) = pmmr::family(pos);
			let sibling_on_left = match peaks.binary_search(&pos) {
				// the last peak is bagged with everything on its left
				Ok(i) => i + 1 == peaks.len(),
				Err(_) => parent > size || pmmr::is_left_sibling(sibling_pos),
			};
			let pair = if sibling_on_left {
				(sibling, hash)
			} else {
				(hash, sibling)
			};
			pos = parent;
			hash = pair.hash_with_index(index(pos));
		}

		if hash == root {
			Ok(())
		} else {
			Err(MerkleProofError::RootMismatch)
		}
	}
}
