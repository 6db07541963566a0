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

//! Binary codec used for hashing, storage and the MMR data files. Integers
//! are big endian, collections carry a u64 count prefix and nothing is
//! self-describing: a reader has to know what comes next.

use crate::core::hash::{DefaultHashable, Hash, Hashed};
use byteorder::{BigEndian, ByteOrder};
use std::fmt::Debug;
use std::io::{self, Read, Write};

/// Largest count or length prefix a reader accepts. Anything bigger is
/// taken as corruption instead of an allocation request.
pub const MAX_READ_LEN: u64 = 1_000_000;

/// Codec failures.
#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum Error {
	/// The underlying stream failed, or ended early
	#[error("IO Error: {0} {1:?}")]
	IOErr(String, io::ErrorKind),
	/// Bytes were read but don't decode to a valid value
	#[error("corrupted data")]
	CorruptedData,
	/// A length or count prefix above `MAX_READ_LEN`
	#[error("too large read")]
	TooLargeReadErr,
	/// Items out of hash order
	#[error("broken sort order")]
	SortError,
	/// The same item twice
	#[error("duplicate entries")]
	DuplicateError,
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::IOErr(e.to_string(), e.kind())
	}
}

/// What a writer wants out of the value written to it. Hashing skips the
/// parts that must not affect an identifier, such as range proofs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SerializationMode {
	/// Everything needed to read the value back
	Full,
	/// Only what identifies the value
	Hash,
}

macro_rules! write_be {
	($name:ident, $int:ty, $len:expr, $put:ident) => {
		/// Writes the integer big endian.
		fn $name(&mut self, n: $int) -> Result<(), Error> {
			let mut buf = [0u8; $len];
			BigEndian::$put(&mut buf, n);
			self.write_fixed_bytes(&buf)
		}
	};
}

macro_rules! read_be {
	($name:ident, $int:ty, $len:expr, $get:ident) => {
		/// Reads a big endian integer.
		fn $name(&mut self) -> Result<$int, Error> {
			let mut buf = [0u8; $len];
			self.fill(&mut buf)?;
			Ok(BigEndian::$get(&buf))
		}
	};
}

/// Sink for `Writeable` values. Only raw bytes need implementing.
pub trait Writer {
	/// Whether we're hashing or fully serializing.
	fn serialization_mode(&self) -> SerializationMode;

	/// Writes bytes as is, the reader knows how many to expect.
	fn write_fixed_bytes<T: AsRef<[u8]>>(&mut self, bytes: T) -> Result<(), Error>;

	/// Writes a single byte.
	fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		self.write_fixed_bytes([n])
	}

	write_be!(write_u16, u16, 2, write_u16);
	write_be!(write_u32, u32, 4, write_u32);
	write_be!(write_u64, u64, 8, write_u64);
	write_be!(write_i64, i64, 8, write_i64);

	/// Writes bytes behind a u64 length.
	fn write_bytes<T: AsRef<[u8]>>(&mut self, bytes: T) -> Result<(), Error> {
		let bytes = bytes.as_ref();
		self.write_u64(bytes.len() as u64)?;
		self.write_fixed_bytes(bytes)
	}
}

/// Source for `Readable` values. Only filling a buffer needs implementing.
pub trait Reader {
	/// Fills `buf` completely or fails.
	fn fill(&mut self, buf: &mut [u8]) -> Result<(), Error>;

	/// Reads a single byte.
	fn read_u8(&mut self) -> Result<u8, Error> {
		let mut buf = [0u8; 1];
		self.fill(&mut buf)?;
		Ok(buf[0])
	}

	read_be!(read_u16, u16, 2, read_u16);
	read_be!(read_u32, u32, 4, read_u32);
	read_be!(read_u64, u64, 8, read_u64);
	read_be!(read_i64, i64, 8, read_i64);

	/// Reads exactly `len` bytes, refusing lengths above `MAX_READ_LEN`.
	fn read_fixed_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
		if len as u64 > MAX_READ_LEN {
			return Err(Error::TooLargeReadErr);
		}
		let mut buf = vec![0u8; len];
		self.fill(&mut buf)?;
		Ok(buf)
	}

	/// Reads bytes written by `Writer::write_bytes`.
	fn read_bytes_len_prefix(&mut self) -> Result<Vec<u8>, Error> {
		let len = self.read_u64()?;
		self.read_fixed_bytes(len as usize)
	}
}

/// Types with a binary encoding.
pub trait Writeable {
	/// Encodes `self` into the writer.
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error>;
}

/// Types that can be decoded from their binary encoding.
pub trait Readable: Sized {
	/// Decodes a value off the reader.
	fn read<R: Reader>(reader: &mut R) -> Result<Self, Error>;
}

/// Types whose encoding always takes `LEN` bytes.
pub trait FixedLength {
	/// Encoded length in bytes
	const LEN: usize;
}

/// Reads a value off any `Read`.
pub fn deserialize<T: Readable, R: Read>(source: &mut R) -> Result<T, Error> {
	T::read(&mut BinReader::new(source))
}

/// Writes a value to any `Write`.
pub fn serialize<W: Writeable>(sink: &mut dyn Write, thing: &W) -> Result<(), Error> {
	thing.write(&mut BinWriter::new(sink))
}

/// Encodes a value in memory.
pub fn ser_vec<W: Writeable>(thing: &W) -> Result<Vec<u8>, Error> {
	let mut vec = vec![];
	serialize(&mut vec, thing)?;
	Ok(vec)
}

/// Reader over a byte stream, counting what it consumed so callers
/// streaming through a file know where each value started.
pub struct BinReader<'a> {
	source: &'a mut dyn Read,
	bytes_read: u64,
}

impl<'a> BinReader<'a> {
	/// Reads from `source`.
	pub fn new(source: &'a mut dyn Read) -> BinReader<'a> {
		BinReader {
			source,
			bytes_read: 0,
		}
	}

	/// Bytes consumed so far.
	pub fn bytes_read(&self) -> u64 {
		self.bytes_read
	}
}

impl<'a> Reader for BinReader<'a> {
	fn fill(&mut self, buf: &mut [u8]) -> Result<(), Error> {
		self.source.read_exact(buf)?;
		self.bytes_read += buf.len() as u64;
		Ok(())
	}
}

/// Full mode writer over a byte sink.
pub struct BinWriter<'a> {
	sink: &'a mut dyn Write,
}

impl<'a> BinWriter<'a> {
	/// Writes to `sink`.
	pub fn new(sink: &'a mut dyn Write) -> BinWriter<'a> {
		BinWriter { sink }
	}
}

impl<'a> Writer for BinWriter<'a> {
	fn serialization_mode(&self) -> SerializationMode {
		SerializationMode::Full
	}

	fn write_fixed_bytes<T: AsRef<[u8]>>(&mut self, bytes: T) -> Result<(), Error> {
		Ok(self.sink.write_all(bytes.as_ref())?)
	}
}

macro_rules! int_codec {
	($($int:ty => $write:ident, $read:ident;)*) => {$(
		impl Writeable for $int {
			fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
				writer.$write(*self)
			}
		}

		impl Readable for $int {
			fn read<R: Reader>(reader: &mut R) -> Result<$int, Error> {
				reader.$read()
			}
		}
	)*};
}

int_codec! {
	u8 => write_u8, read_u8;
	u16 => write_u16, read_u16;
	u32 => write_u32, read_u32;
	u64 => write_u64, read_u64;
	i64 => write_i64, read_i64;
}

impl<T: Writeable> Writeable for Vec<T> {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_u64(self.len() as u64)?;
		self.iter().try_for_each(|item| item.write(writer))
	}
}

impl<T: Readable> Readable for Vec<T> {
	fn read<R: Reader>(reader: &mut R) -> Result<Vec<T>, Error> {
		let count = reader.read_u64()?;
		read_multi(reader, count)
	}
}

impl<'a, A: Writeable> Writeable for &'a A {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		(*self).write(writer)
	}
}

macro_rules! tuple_codec {
	($($name:ident . $idx:tt),+) => {
		impl<$($name: Writeable),+> Writeable for ($($name,)+) {
			fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
				$(self.$idx.write(writer)?;)+
				Ok(())
			}
		}

		impl<$($name: Readable),+> Readable for ($($name,)+) {
			fn read<R: Reader>(reader: &mut R) -> Result<Self, Error> {
				Ok(($($name::read(reader)?,)+))
			}
		}
	};
}

tuple_codec!(A.0, B.1);
tuple_codec!(A.0, B.1, C.2);

/// Reads `count` values in a row, for collections whose count was written
/// elsewhere.
pub fn read_multi<T: Readable, R: Reader>(reader: &mut R, count: u64) -> Result<Vec<T>, Error> {
	if count > MAX_READ_LEN {
		return Err(Error::TooLargeReadErr);
	}
	(0..count).map(|_| T::read(reader)).collect()
}

/// Leaf types of an MMR.
pub trait PMMRable: Writeable + Clone + Debug + DefaultHashable {
	/// What goes in the data file for a leaf.
	type E: Readable + Writeable + Debug;

	/// The data file form of this leaf.
	fn as_elmt(&self) -> Self::E;

	/// Encoded size of `E` when fixed, `None` when elements vary in size and
	/// the backend needs a size file.
	fn elmt_size() -> Option<u16>;
}

/// Hashing committing to a position. MMR nodes hash their 0-based position
/// in ahead of their content so equal leaves at different spots differ.
pub trait PMMRIndexHashable {
	/// Hash of `(index, self)`.
	fn hash_with_index(&self, index: u64) -> Hash;
}

impl<T: DefaultHashable> PMMRIndexHashable for T {
	fn hash_with_index(&self, index: u64) -> Hash {
		(index, self).hash()
	}
}

/// Body collections have to be in strictly increasing hash order.
pub trait VerifySortedAndUnique<T> {
	/// `SortError` on a step down, `DuplicateError` on a repeat.
	fn verify_sorted_and_unique(&self) -> Result<(), Error>;
}

impl<T: Hashed> VerifySortedAndUnique<T> for Vec<T> {
	fn verify_sorted_and_unique(&self) -> Result<(), Error> {
		let hashes: Vec<Hash> = self.iter().map(Hashed::hash).collect();
		for pair in hashes.windows(2) {
			match pair[0].cmp(&pair[1]) {
				std::cmp::Ordering::Less => {}
				std::cmp::Ordering::Equal => return Err(Error::DuplicateError),
				std::cmp::Ordering::Greater => return Err(Error::SortError),
			}
		}
		Ok(())
	}
}
