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

//! Blake2b-256 hashing of anything with a binary encoding. Every block,
//! header, output and kernel is identified by the hash of its hash-mode
//! serialization.

use std::fmt;

use crate::blake2::blake2b::Blake2b;
use crate::ser::{self, FixedLength, Readable, Reader, SerializationMode, Writeable, Writer};
use crate::util;

/// All zeroes. Marks "no hash", such as the root of an empty MMR.
pub const ZERO_HASH: Hash = Hash([0; 32]);

/// A 32 byte blake2b digest.
#[derive(Copy, Clone, Default, PartialEq, PartialOrd, Eq, Ord, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl FixedLength for Hash {
	const LEN: usize = 32;
}

impl Hash {
	/// Hash from raw bytes, zero padded or truncated to 32 bytes.
	pub fn from_vec(v: &[u8]) -> Hash {
		let mut bytes = [0; Hash::LEN];
		for (dst, src) in bytes.iter_mut().zip(v) {
			*dst = *src;
		}
		Hash(bytes)
	}

	/// The digest as an owned byte vector.
	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	/// The digest bytes.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Lower case hex of the full digest.
	pub fn to_hex(&self) -> String {
		util::to_hex(&self.0)
	}

	/// Parses hex produced by `to_hex`.
	pub fn from_hex(hex: &str) -> Result<Hash, ser::Error> {
		match util::from_hex(hex) {
			Ok(bytes) if bytes.len() == Hash::LEN => Ok(Hash::from_vec(&bytes)),
			_ => Err(ser::Error::CorruptedData),
		}
	}
}

// Logs only need enough of the digest to tell blocks apart.
impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex()[..12])
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl AsRef<[u8]> for Hash {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl Readable for Hash {
	fn read<R: Reader>(reader: &mut R) -> Result<Hash, ser::Error> {
		let mut bytes = [0; Hash::LEN];
		reader.fill(&mut bytes)?;
		Ok(Hash(bytes))
	}
}

impl Writeable for Hash {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(self.0)
	}
}

/// Writer feeding a blake2b state in hash mode.
pub struct HashWriter {
	state: Blake2b,
}

impl HashWriter {
	/// Starts an empty 32 byte digest.
	pub fn new() -> HashWriter {
		HashWriter {
			state: Blake2b::new(Hash::LEN),
		}
	}

	/// The digest of everything written.
	pub fn into_hash(self) -> Hash {
		Hash::from_vec(self.state.finalize().as_bytes())
	}
}

impl Default for HashWriter {
	fn default() -> HashWriter {
		HashWriter::new()
	}
}

impl Writer for HashWriter {
	fn serialization_mode(&self) -> SerializationMode {
		SerializationMode::Hash
	}

	fn write_fixed_bytes<T: AsRef<[u8]>>(&mut self, bytes: T) -> Result<(), ser::Error> {
		self.state.update(bytes.as_ref());
		Ok(())
	}
}

/// Types with a canonical hash.
pub trait Hashed {
	/// The canonical hash.
	fn hash(&self) -> Hash;
}

/// Opts a type into hashing its hash-mode serialization.
pub trait DefaultHashable: Writeable {}

impl<D: DefaultHashable> Hashed for D {
	fn hash(&self) -> Hash {
		let mut hasher = HashWriter::new();
		// the hasher itself never fails a write
		let _ = self.write(&mut hasher);
		hasher.into_hash()
	}
}

impl DefaultHashable for Hash {}
impl DefaultHashable for Vec<u8> {}
impl DefaultHashable for u8 {}
impl DefaultHashable for u64 {}
impl<D: DefaultHashable> DefaultHashable for &D {}
impl<D: DefaultHashable, E: DefaultHashable> DefaultHashable for (D, E) {}
impl<D: DefaultHashable, E: DefaultHashable, F: DefaultHashable> DefaultHashable for (D, E, F) {}
