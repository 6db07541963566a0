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

//! The Committed trait, the opaque cryptographic values blocks carry and the
//! scheme used to do arithmetic on them.
//!
//! Commitments, range proofs and signatures are treated as byte containers
//! here. Summing commitments, checking range proofs and kernel signatures is
//! the job of a `CommitmentScheme` provided by the caller.

use std::fmt;

use crate::ser::{self, FixedLength, Readable, Reader, Writeable, Writer};
use crate::util;

/// Failures of commitment arithmetic or verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// The commitment scheme could not process the provided values.
	#[error("Commitment scheme error: {0}")]
	Scheme(String),
	/// Kernel sums do not equal output sums.
	#[error("Kernel sum mismatch")]
	KernelSumMismatch,
	/// Range proof does not verify against its commitment.
	#[error("Invalid range proof")]
	InvalidRangeProof,
	/// Kernel signature does not verify against its excess.
	#[error("Invalid kernel signature")]
	InvalidSignature,
}

/// Size of a serialized commitment
pub const PEDERSEN_COMMITMENT_SIZE: usize = 33;
/// Size of a serialized signature
pub const SIGNATURE_SIZE: usize = 64;
/// Size of a blinding factor
pub const SECRET_KEY_SIZE: usize = 32;
/// Upper bound on the size of a range proof
pub const MAX_PROOF_SIZE: usize = 5_134;

macro_rules! fixed_bytes {
	($name:ident, $size:expr) => {
		impl $name {
			/// Builds from a byte slice, zero padded or truncated to size.
			pub fn from_vec(v: &[u8]) -> $name {
				let mut bytes = [0; $size];
				let n = v.len().min($size);
				bytes[..n].copy_from_slice(&v[..n]);
				$name(bytes)
			}

			/// The raw bytes
			pub fn as_bytes(&self) -> &[u8] {
				&self.0[..]
			}
		}

		impl AsRef<[u8]> for $name {
			fn as_ref(&self) -> &[u8] {
				&self.0[..]
			}
		}

		impl PartialEq for $name {
			fn eq(&self, other: &$name) -> bool {
				self.0[..] == other.0[..]
			}
		}

		impl Eq for $name {}

		impl PartialOrd for $name {
			fn partial_cmp(&self, other: &$name) -> Option<std::cmp::Ordering> {
				Some(self.cmp(other))
			}
		}

		impl Ord for $name {
			fn cmp(&self, other: &$name) -> std::cmp::Ordering {
				self.0[..].cmp(&other.0[..])
			}
		}

		impl std::hash::Hash for $name {
			fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
				std::hash::Hash::hash(&self.0[..], state)
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}({})", stringify!($name), util::to_hex(&self.0[..]))
			}
		}

		impl FixedLength for $name {
			const LEN: usize = $size;
		}

		impl Writeable for $name {
			fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
				writer.write_fixed_bytes(&self.0[..])
			}
		}

		impl Readable for $name {
			fn read<R: Reader>(reader: &mut R) -> Result<$name, ser::Error> {
				let mut bytes = [0; $size];
				reader.fill(&mut bytes)?;
				Ok($name(bytes))
			}
		}
	};
}

/// A Pedersen commitment, hiding a value behind a blinding factor.
#[derive(Clone, Copy)]
pub struct Commitment(pub [u8; PEDERSEN_COMMITMENT_SIZE]);
fixed_bytes!(Commitment, PEDERSEN_COMMITMENT_SIZE);

/// Aggregate signature over a kernel message.
#[derive(Clone, Copy)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);
fixed_bytes!(Signature, SIGNATURE_SIZE);

/// A blinding factor, only ever summed in the clear as kernel offsets.
#[derive(Clone, Copy)]
pub struct BlindingFactor(pub [u8; SECRET_KEY_SIZE]);
fixed_bytes!(BlindingFactor, SECRET_KEY_SIZE);

impl BlindingFactor {
	/// The zero blinding factor
	pub fn zero() -> BlindingFactor {
		BlindingFactor([0; SECRET_KEY_SIZE])
	}
}

impl Default for BlindingFactor {
	fn default() -> BlindingFactor {
		BlindingFactor::zero()
	}
}

impl Default for Commitment {
	fn default() -> Commitment {
		Commitment([0; PEDERSEN_COMMITMENT_SIZE])
	}
}

impl Default for Signature {
	fn default() -> Signature {
		Signature([0; SIGNATURE_SIZE])
	}
}

/// A range proof, proving the value hidden by a commitment is positive and
/// doesn't overflow. Variable size.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct RangeProof {
	/// The proof bytes
	pub proof: Vec<u8>,
}

impl RangeProof {
	/// Wraps the provided proof bytes
	pub fn from_vec(proof: Vec<u8>) -> RangeProof {
		RangeProof { proof }
	}

	/// Length of the proof in bytes
	pub fn len(&self) -> usize {
		self.proof.len()
	}

	/// Whether the proof has no bytes at all
	pub fn is_empty(&self) -> bool {
		self.proof.is_empty()
	}
}

impl fmt::Debug for RangeProof {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "RangeProof({} bytes)", self.proof.len())
	}
}

impl Writeable for RangeProof {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_bytes(&self.proof)
	}
}

impl Readable for RangeProof {
	fn read<R: Reader>(reader: &mut R) -> Result<RangeProof, ser::Error> {
		let len = reader.read_u64()?;
		if len as usize > MAX_PROOF_SIZE {
			return Err(ser::Error::TooLargeReadErr);
		}
		let proof = reader.read_fixed_bytes(len as usize)?;
		Ok(RangeProof { proof })
	}
}

/// Arithmetic and verification over commitments. Blocks only ever need to
/// add commitments up and compare the results, check range proofs and check
/// kernel signatures, so that is all a scheme has to provide.
pub trait CommitmentScheme: Send + Sync {
	/// Commitment to a value with a zero blinding factor.
	fn commit_value(&self, value: u64) -> Result<Commitment, Error>;

	/// Commitment to a zero value with the provided blinding factor.
	fn commit_blind(&self, blind: &BlindingFactor) -> Result<Commitment, Error>;

	/// Sum of the positive commitments minus the sum of the negative ones.
	fn commit_sum(
		&self,
		positive: Vec<Commitment>,
		negative: Vec<Commitment>,
	) -> Result<Commitment, Error>;

	/// Sum of the positive blinding factors minus the negative ones.
	fn blind_sum(
		&self,
		positive: Vec<BlindingFactor>,
		negative: Vec<BlindingFactor>,
	) -> Result<BlindingFactor, Error>;

	/// Verifies a range proof against its commitment.
	fn verify_rangeproof(&self, commit: &Commitment, proof: &RangeProof) -> Result<(), Error>;

	/// Verifies a signature over msg for the public key the excess commits to.
	fn verify_signature(
		&self,
		excess: &Commitment,
		sig: &Signature,
		msg: &[u8; 32],
	) -> Result<(), Error>;
}

/// Anything holding inputs, outputs and kernels: transactions, bodies and
/// blocks. Outputs minus inputs, plus any overage, must equal the kernel
/// excesses plus the offset.
pub trait Committed {
	/// Commitments of the inputs.
	fn inputs_committed(&self) -> Vec<Commitment>;

	/// Commitments of the outputs.
	fn outputs_committed(&self) -> Vec<Commitment>;

	/// Kernel excesses.
	fn kernels_committed(&self) -> Vec<Commitment>;

	/// Sum of the kernel excesses, alone and with the offset folded in.
	fn sum_kernel_excesses(
		&self,
		offset: &BlindingFactor,
		scheme: &dyn CommitmentScheme,
	) -> Result<(Commitment, Commitment), Error> {
		let kernel_sum = scheme.commit_sum(self.kernels_committed(), vec![])?;
		if *offset == BlindingFactor::zero() {
			return Ok((kernel_sum, kernel_sum));
		}
		let with_offset = scheme.commit_sum(vec![kernel_sum, scheme.commit_blind(offset)?], vec![])?;
		Ok((kernel_sum, with_offset))
	}

	/// Outputs minus inputs. A positive overage counts as an extra output,
	/// a negative one (minted value) as an extra input.
	fn sum_commitments(&self, overage: i64, scheme: &dyn CommitmentScheme) -> Result<Commitment, Error> {
		let mut positive = self.outputs_committed();
		let mut negative = self.inputs_committed();
		if overage != 0 {
			let commit = scheme.commit_value(overage.unsigned_abs())?;
			if overage > 0 {
				positive.push(commit);
			} else {
				negative.push(commit);
			}
		}
		scheme.commit_sum(positive, negative)
	}

	/// Checks the balance, returning the utxo sum and the bare kernel sum.
	fn verify_kernel_sums(
		&self,
		overage: i64,
		kernel_offset: BlindingFactor,
		scheme: &dyn CommitmentScheme,
	) -> Result<(Commitment, Commitment), Error> {
		let utxo_sum = self.sum_commitments(overage, scheme)?;
		let (kernel_sum, with_offset) = self.sum_kernel_excesses(&kernel_offset, scheme)?;
		if utxo_sum != with_offset {
			return Err(Error::KernelSumMismatch);
		}
		Ok((utxo_sum, kernel_sum))
	}
}
