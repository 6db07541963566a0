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

//! Inputs, outputs and kernels, and the transactions and block bodies made
//! of them.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::convert::TryFrom;

use crate::core::committed::{
	self, BlindingFactor, Commitment, CommitmentScheme, Committed, RangeProof, Signature,
};
use crate::core::hash::{DefaultHashable, Hashed};
use crate::ser::{
	self, read_multi, PMMRable, Readable, Reader, VerifySortedAndUnique, Writeable, Writer,
};
use crate::util;

/// Why a transaction or body is invalid.
#[derive(Clone, Eq, Debug, PartialEq, thiserror::Error)]
pub enum Error {
	/// Outputs minus inputs don't add up to the kernel excesses and offset
	#[error("Transaction Kernel Sum Mismatch")]
	KernelSumMismatch,
	#[error("Invalid Range Proof")]
	RangeProof,
	/// A kernel excess signature doesn't verify
	#[error("Incorrect Signature")]
	IncorrectSignature,
	/// Any other failure of the commitment scheme
	#[error("Committed Trait: {0}")]
	Committed(committed::Error),
	/// An input spends an output created by the same body
	#[error("Cut-Through Error")]
	CutThrough,
	/// Coinbase output outside of a block coinbase
	#[error("Invalid Output Features")]
	InvalidOutputFeatures,
	/// Coinbase kernel outside of a block coinbase, or one carrying a fee or
	/// lock height
	#[error("Invalid Kernel Features")]
	InvalidKernelFeatures,
	#[error("Serialization Error: {0}")]
	Serialization(ser::Error),
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::Serialization(e)
	}
}

impl From<committed::Error> for Error {
	fn from(e: committed::Error) -> Error {
		match e {
			committed::Error::KernelSumMismatch => Error::KernelSumMismatch,
			committed::Error::InvalidRangeProof => Error::RangeProof,
			committed::Error::InvalidSignature => Error::IncorrectSignature,
			other => Error::Committed(other),
		}
	}
}

/// Kind of kernel, serialized as a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum KernelFeatures {
	/// Regular transaction kernel
	Plain = 0,
	/// Kernel of a block reward
	Coinbase = 1,
}

/// Kind of output, serialized as a single byte. Coinbase outputs are
/// subject to maturity when spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OutputFeatures {
	/// Regular transaction output
	Plain = 0,
	/// Block reward
	Coinbase = 1,
}

macro_rules! features_codec {
	($features:ident) => {
		impl TryFrom<u8> for $features {
			type Error = ser::Error;
			fn try_from(byte: u8) -> Result<$features, ser::Error> {
				match byte {
					0 => Ok($features::Plain),
					1 => Ok($features::Coinbase),
					_ => Err(ser::Error::CorruptedData),
				}
			}
		}

		impl Writeable for $features {
			fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
				writer.write_u8(*self as u8)
			}
		}

		impl Readable for $features {
			fn read<R: Reader>(reader: &mut R) -> Result<$features, ser::Error> {
				$features::try_from(reader.read_u8()?)
			}
		}
	};
}

features_codec!(KernelFeatures);
features_codec!(OutputFeatures);

/// Proof that a transaction balances. The excess is what remains of the
/// summed commitments once amounts cancel out, and the signature shows it
/// is a public key with no value component. The fee and lock height are
/// part of the signed message.
#[derive(Debug, Clone)]
pub struct TxKernel {
	/// Plain or coinbase
	pub features: KernelFeatures,
	/// Fee paid by the transaction
	pub fee: u64,
	/// First block height the kernel may be included at
	pub lock_height: u64,
	/// Public key the transaction blinding factors sum to
	pub excess: Commitment,
	/// Signature by the excess over `kernel_sig_msg(fee, lock_height)`
	pub excess_sig: Signature,
}

impl DefaultHashable for TxKernel {}
hashable_ord!(TxKernel);

impl Writeable for TxKernel {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.features.write(writer)?;
		writer.write_u64(self.fee)?;
		writer.write_u64(self.lock_height)?;
		self.excess.write(writer)?;
		self.excess_sig.write(writer)
	}
}

impl Readable for TxKernel {
	fn read<R: Reader>(reader: &mut R) -> Result<TxKernel, ser::Error> {
		Ok(TxKernel {
			features: KernelFeatures::read(reader)?,
			fee: reader.read_u64()?,
			lock_height: reader.read_u64()?,
			excess: Commitment::read(reader)?,
			excess_sig: Signature::read(reader)?,
		})
	}
}

impl PMMRable for TxKernel {
	type E = Self;

	fn as_elmt(&self) -> Self::E {
		self.clone()
	}

	fn elmt_size() -> Option<u16> {
		let size = 1 + 8 + 8 + committed::PEDERSEN_COMMITMENT_SIZE + committed::SIGNATURE_SIZE;
		Some(size as u16)
	}
}

/// Message a kernel excess signs: fee then lock height, big endian, in the
/// last 16 bytes.
pub fn kernel_sig_msg(fee: u64, lock_height: u64) -> [u8; 32] {
	let mut msg = [0; 32];
	msg[16..24].copy_from_slice(&fee.to_be_bytes());
	msg[24..].copy_from_slice(&lock_height.to_be_bytes());
	msg
}

impl TxKernel {
	/// A plain kernel with zero fee and lock height and blank crypto values.
	pub fn empty() -> TxKernel {
		TxKernel {
			features: KernelFeatures::Plain,
			fee: 0,
			lock_height: 0,
			excess: Commitment::default(),
			excess_sig: Signature::default(),
		}
	}

	/// Same kernel with another fee.
	pub fn with_fee(self, fee: u64) -> TxKernel {
		TxKernel { fee, ..self }
	}

	/// Same kernel with another lock height.
	pub fn with_lock_height(self, lock_height: u64) -> TxKernel {
		TxKernel {
			lock_height,
			..self
		}
	}

	/// Kernel of a block reward.
	pub fn is_coinbase(&self) -> bool {
		self.features == KernelFeatures::Coinbase
	}

	/// The excess commitment.
	pub fn excess(&self) -> Commitment {
		self.excess
	}

	/// What `excess_sig` signs.
	pub fn msg_to_sign(&self) -> [u8; 32] {
		kernel_sig_msg(self.fee, self.lock_height)
	}

	/// Checks the excess signature. A coinbase kernel must not carry a fee
	/// nor a lock height.
	pub fn verify(&self, scheme: &dyn CommitmentScheme) -> Result<(), Error> {
		if self.is_coinbase() && (self.fee != 0 || self.lock_height != 0) {
			return Err(Error::InvalidKernelFeatures);
		}
		scheme
			.verify_signature(&self.excess, &self.excess_sig, &self.msg_to_sign())
			.map_err(|_| Error::IncorrectSignature)
	}
}

/// Inputs, outputs and kernels shared by transactions and blocks. Each list
/// is kept sorted by hash and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionBody {
	/// Spent outputs
	pub inputs: Vec<Input>,
	/// Created outputs
	pub outputs: Vec<Output>,
	/// Kernels, usually one per aggregated transaction
	pub kernels: Vec<TxKernel>,
}

impl Writeable for TransactionBody {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.inputs.len() as u64)?;
		writer.write_u64(self.outputs.len() as u64)?;
		writer.write_u64(self.kernels.len() as u64)?;
		self.inputs.iter().try_for_each(|i| i.write(writer))?;
		self.outputs.iter().try_for_each(|o| o.write(writer))?;
		self.kernels.iter().try_for_each(|k| k.write(writer))
	}
}

/// Rejects bodies that aren't sorted on the wire.
impl Readable for TransactionBody {
	fn read<R: Reader>(reader: &mut R) -> Result<TransactionBody, ser::Error> {
		let input_len = reader.read_u64()?;
		let output_len = reader.read_u64()?;
		let kernel_len = reader.read_u64()?;
		let inputs = read_multi(reader, input_len)?;
		let outputs = read_multi(reader, output_len)?;
		let kernels = read_multi(reader, kernel_len)?;
		TransactionBody::init(inputs, outputs, kernels, true)
	}
}

impl Committed for TransactionBody {
	fn inputs_committed(&self) -> Vec<Commitment> {
		self.inputs.iter().map(Input::commitment).collect()
	}

	fn outputs_committed(&self) -> Vec<Commitment> {
		self.outputs.iter().map(Output::commitment).collect()
	}

	fn kernels_committed(&self) -> Vec<Commitment> {
		self.kernels.iter().map(TxKernel::excess).collect()
	}
}

impl TransactionBody {
	/// No inputs, outputs or kernels.
	pub fn empty() -> TransactionBody {
		TransactionBody::default()
	}

	/// Builds a body from its parts. With `verify_sorted` the parts must
	/// already be in order, otherwise they get sorted.
	pub fn init(
		inputs: Vec<Input>,
		outputs: Vec<Output>,
		kernels: Vec<TxKernel>,
		verify_sorted: bool,
	) -> Result<TransactionBody, ser::Error> {
		let mut body = TransactionBody {
			inputs,
			outputs,
			kernels,
		};
		if verify_sorted {
			body.verify_sorted()?;
		} else {
			body.sort();
		}
		Ok(body)
	}

	/// Sorts each list by hash.
	pub fn sort(&mut self) {
		self.inputs.sort_unstable();
		self.outputs.sort_unstable();
		self.kernels.sort_unstable();
	}

	/// Adds an output at its sorted position, ignoring duplicates.
	pub fn with_output(mut self, output: Output) -> TransactionBody {
		if let Err(at) = self.outputs.binary_search(&output) {
			self.outputs.insert(at, output);
		}
		self
	}

	/// Sum of the kernel fees.
	pub fn fee(&self) -> u64 {
		self.kernels
			.iter()
			.fold(0u64, |fee, k| fee.saturating_add(k.fee))
	}

	/// Highest kernel lock height, 0 without kernels.
	pub fn lock_height(&self) -> u64 {
		self.kernels.iter().map(|k| k.lock_height).max().unwrap_or(0)
	}

	fn verify_sorted(&self) -> Result<(), ser::Error> {
		self.inputs.verify_sorted_and_unique()?;
		self.outputs.verify_sorted_and_unique()?;
		self.kernels.verify_sorted_and_unique()
	}

	fn verify_cut_through(&self) -> Result<(), Error> {
		let created: HashSet<Commitment> = self.outputs.iter().map(Output::commitment).collect();
		if self.inputs.iter().any(|i| created.contains(&i.commit)) {
			return Err(Error::CutThrough);
		}
		Ok(())
	}

	/// Transactions may not mint coins, only a block's coinbase may.
	pub fn verify_features(&self) -> Result<(), Error> {
		if self.outputs.iter().any(Output::is_coinbase) {
			return Err(Error::InvalidOutputFeatures);
		}
		if self.kernels.iter().any(TxKernel::is_coinbase) {
			return Err(Error::InvalidKernelFeatures);
		}
		Ok(())
	}

	/// Context free checks: ordering, cut-through, every range proof and
	/// every kernel signature.
	pub fn validate(&self, scheme: &dyn CommitmentScheme) -> Result<(), Error> {
		self.verify_sorted()?;
		self.verify_cut_through()?;
		for output in &self.outputs {
			output.verify_proof(scheme)?;
		}
		for kernel in &self.kernels {
			kernel.verify(scheme)?;
		}
		Ok(())
	}
}

/// A body plus the kernel offset, the part of the blinding excess kept out
/// of the kernels so transactions can't be told apart once aggregated.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
	/// Offset summed with the kernel excesses when balancing
	pub offset: BlindingFactor,
	/// Inputs, outputs and kernels
	pub body: TransactionBody,
}

impl DefaultHashable for Transaction {}

impl Writeable for Transaction {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.offset.write(writer)?;
		self.body.write(writer)
	}
}

impl Readable for Transaction {
	fn read<R: Reader>(reader: &mut R) -> Result<Transaction, ser::Error> {
		Ok(Transaction {
			offset: BlindingFactor::read(reader)?,
			body: TransactionBody::read(reader)?,
		})
	}
}

impl Committed for Transaction {
	fn inputs_committed(&self) -> Vec<Commitment> {
		self.body.inputs_committed()
	}

	fn outputs_committed(&self) -> Vec<Commitment> {
		self.body.outputs_committed()
	}

	fn kernels_committed(&self) -> Vec<Commitment> {
		self.body.kernels_committed()
	}
}

impl Transaction {
	/// A transaction with a zero offset, its parts sorted.
	pub fn new(inputs: Vec<Input>, outputs: Vec<Output>, kernels: Vec<TxKernel>) -> Transaction {
		let mut body = TransactionBody {
			inputs,
			outputs,
			kernels,
		};
		body.sort();
		Transaction {
			offset: BlindingFactor::zero(),
			body,
		}
	}

	/// Same transaction with another offset.
	pub fn with_offset(self, offset: BlindingFactor) -> Transaction {
		Transaction { offset, ..self }
	}

	/// Spent outputs.
	pub fn inputs(&self) -> &[Input] {
		&self.body.inputs
	}

	/// Created outputs.
	pub fn outputs(&self) -> &[Output] {
		&self.body.outputs
	}

	/// Kernels.
	pub fn kernels(&self) -> &[TxKernel] {
		&self.body.kernels
	}

	/// Sum of the kernel fees.
	pub fn fee(&self) -> u64 {
		self.body.fee()
	}

	/// Value leaving the commitments sum, the fees.
	pub fn overage(&self) -> i64 {
		self.fee() as i64
	}

	/// Highest kernel lock height.
	pub fn lock_height(&self) -> u64 {
		self.body.lock_height()
	}

	/// Full context free validation: no coinbase parts, a valid body, and
	/// commitments balancing against kernels plus offset.
	pub fn validate(&self, scheme: &dyn CommitmentScheme) -> Result<(), Error> {
		self.body.verify_features()?;
		self.body.validate(scheme)?;
		self.verify_kernel_sums(self.overage(), self.offset, scheme)?;
		Ok(())
	}
}

/// Reference to the output being spent. Carries the features of that
/// output so coinbase maturity can be checked.
#[derive(Debug, Clone, Copy)]
pub struct Input {
	/// Features of the spent output
	pub features: OutputFeatures,
	/// Commitment of the spent output
	pub commit: Commitment,
}

impl DefaultHashable for Input {}
hashable_ord!(Input);

impl std::hash::Hash for Input {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		std::hash::Hash::hash(&self.commit, state);
	}
}

impl Writeable for Input {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.features.write(writer)?;
		self.commit.write(writer)
	}
}

impl Readable for Input {
	fn read<R: Reader>(reader: &mut R) -> Result<Input, ser::Error> {
		let features = OutputFeatures::read(reader)?;
		Ok(Input::new(features, Commitment::read(reader)?))
	}
}

impl Input {
	/// Spends the output with this commitment.
	pub fn new(features: OutputFeatures, commit: Commitment) -> Input {
		Input { features, commit }
	}

	/// Commitment of the spent output.
	pub fn commitment(&self) -> Commitment {
		self.commit
	}

	/// Spends a coinbase output.
	pub fn is_coinbase(&self) -> bool {
		self.features == OutputFeatures::Coinbase
	}
}

/// A new unspent output: the commitment to its value and the proof that
/// value is in range.
#[derive(Debug, Clone)]
pub struct Output {
	/// Plain or coinbase
	pub features: OutputFeatures,
	/// Commitment to the value
	pub commit: Commitment,
	/// Proof the committed value is in range
	pub proof: RangeProof,
}

impl DefaultHashable for Output {}
hashable_ord!(Output);

impl std::hash::Hash for Output {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		std::hash::Hash::hash(&self.commit, state);
	}
}

/// The proof lives in its own MMR and is left out of the output hash.
impl Writeable for Output {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.features.write(writer)?;
		self.commit.write(writer)?;
		match writer.serialization_mode() {
			ser::SerializationMode::Hash => Ok(()),
			_ => self.proof.write(writer),
		}
	}
}

impl Readable for Output {
	fn read<R: Reader>(reader: &mut R) -> Result<Output, ser::Error> {
		Ok(Output {
			features: OutputFeatures::read(reader)?,
			commit: Commitment::read(reader)?,
			proof: RangeProof::read(reader)?,
		})
	}
}

impl Output {
	/// Commitment to the value.
	pub fn commitment(&self) -> Commitment {
		self.commit
	}

	/// Created by a block reward.
	pub fn is_coinbase(&self) -> bool {
		self.features == OutputFeatures::Coinbase
	}

	/// What gets appended to the output MMR.
	pub fn identifier(&self) -> OutputIdentifier {
		OutputIdentifier::from_output(self)
	}

	/// Checks the range proof against the commitment.
	pub fn verify_proof(&self, scheme: &dyn CommitmentScheme) -> Result<(), Error> {
		scheme
			.verify_rangeproof(&self.commit, &self.proof)
			.map_err(|_| Error::RangeProof)
	}
}

/// Features and commitment of an output, the leaf of the output MMR. Built
/// from the output itself or from an input spending it, both hash the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputIdentifier {
	/// Plain or coinbase, hashed so maturity can be enforced
	pub features: OutputFeatures,
	/// Commitment to the value
	pub commit: Commitment,
}

impl DefaultHashable for OutputIdentifier {}

impl OutputIdentifier {
	/// Identifier for an output with these features and commitment.
	pub fn new(features: OutputFeatures, commit: &Commitment) -> OutputIdentifier {
		OutputIdentifier {
			features,
			commit: *commit,
		}
	}

	/// Identifier of an output.
	pub fn from_output(output: &Output) -> OutputIdentifier {
		OutputIdentifier::new(output.features, &output.commit)
	}

	/// Identifier of the output an input spends.
	pub fn from_input(input: &Input) -> OutputIdentifier {
		OutputIdentifier::new(input.features, &input.commit)
	}

	/// The commitment.
	pub fn commitment(&self) -> Commitment {
		self.commit
	}

	/// Identifies a coinbase output.
	pub fn is_coinbase(&self) -> bool {
		self.features == OutputFeatures::Coinbase
	}

	/// Feature byte in binary followed by the commitment in hex.
	pub fn to_hex(&self) -> String {
		format!(
			"{:b}{}",
			self.features as u8,
			util::to_hex(self.commit.as_bytes())
		)
	}
}

impl PMMRable for OutputIdentifier {
	type E = Self;

	fn as_elmt(&self) -> Self::E {
		*self
	}

	fn elmt_size() -> Option<u16> {
		Some((1 + committed::PEDERSEN_COMMITMENT_SIZE) as u16)
	}
}

impl Writeable for OutputIdentifier {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.features.write(writer)?;
		self.commit.write(writer)
	}
}

impl Readable for OutputIdentifier {
	fn read<R: Reader>(reader: &mut R) -> Result<OutputIdentifier, ser::Error> {
		let features = OutputFeatures::read(reader)?;
		Ok(OutputIdentifier::new(features, &Commitment::read(reader)?))
	}
}

impl DefaultHashable for RangeProof {}

/// Range proofs vary in size.
impl PMMRable for RangeProof {
	type E = Self;

	fn as_elmt(&self) -> Self::E {
		self.clone()
	}

	fn elmt_size() -> Option<u16> {
		None
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::hash::Hash;
	use crate::ser::{deserialize, ser_vec};

	fn commit(n: u8) -> Commitment {
		Commitment::from_vec(&[n; 33])
	}

	fn output(n: u8) -> Output {
		Output {
			features: OutputFeatures::Plain,
			commit: commit(n),
			proof: RangeProof::default(),
		}
	}

	#[test]
	fn kernel_ser_deser() {
		let kernel = TxKernel {
			features: KernelFeatures::Plain,
			fee: 10,
			lock_height: 100,
			excess: commit(3),
			excess_sig: Signature::from_vec(&[7; 64]),
		};
		let vec = ser_vec(&kernel).unwrap();
		assert_eq!(vec.len() as u16, TxKernel::elmt_size().unwrap());
		let kernel2: TxKernel = deserialize(&mut &vec[..]).unwrap();
		assert_eq!(kernel2.fee, 10);
		assert_eq!(kernel2.lock_height, 100);
		assert_eq!(kernel2.excess, commit(3));
	}

	#[test]
	fn unknown_feature_byte() {
		assert_eq!(OutputFeatures::try_from(1), Ok(OutputFeatures::Coinbase));
		assert_eq!(KernelFeatures::try_from(2), Err(ser::Error::CorruptedData));
		let res: Result<Input, _> = deserialize(&mut &[7u8; 34][..]);
		assert_eq!(res.err(), Some(ser::Error::CorruptedData));
	}

	#[test]
	fn kernel_msg_commits_to_fee_and_lock_height() {
		let msg = kernel_sig_msg(2, 0x0102);
		assert_eq!(msg[..16], [0; 16]);
		assert_eq!(msg[23], 2);
		assert_eq!(msg[30..], [1, 2]);

		let kernel = TxKernel::empty().with_fee(2).with_lock_height(0x0102);
		assert_eq!(kernel.msg_to_sign(), msg);
		assert_ne!(kernel_sig_msg(3, 0x0102), msg);
	}

	#[test]
	fn output_hash_ignores_proof() {
		let a = Output {
			proof: RangeProof::from_vec(vec![1, 2, 3]),
			..output(1)
		};
		let b = Output {
			proof: RangeProof::from_vec(vec![4]),
			..a.clone()
		};
		assert_eq!(a.hash(), b.hash());
		assert_eq!(a.hash(), a.identifier().hash());
		let input = Input::new(OutputFeatures::Plain, commit(1));
		assert_eq!(input.hash(), a.identifier().hash());
	}

	#[test]
	fn features_change_the_identifier_hash() {
		let plain = OutputIdentifier::new(OutputFeatures::Plain, &commit(1));
		let coinbase = OutputIdentifier::new(OutputFeatures::Coinbase, &commit(1));
		assert_ne!(plain.hash(), coinbase.hash());
		assert_ne!(plain.hash(), Hash::default());
	}

	#[test]
	fn body_rejects_unsorted() {
		let mut outputs = vec![output(1), output(2)];
		outputs.sort();
		outputs.reverse();
		assert_eq!(
			TransactionBody::init(vec![], outputs.clone(), vec![], true).err(),
			Some(ser::Error::SortError)
		);
		assert!(TransactionBody::init(vec![], outputs, vec![], false).is_ok());
	}

	#[test]
	fn cut_through_rejected() {
		let body = TransactionBody::init(
			vec![Input::new(OutputFeatures::Plain, commit(9))],
			vec![output(9)],
			vec![],
			false,
		)
		.unwrap();
		assert_eq!(body.verify_cut_through(), Err(Error::CutThrough));
	}

	#[test]
	fn transactions_cannot_mint() {
		let coinbase = Output {
			features: OutputFeatures::Coinbase,
			..output(4)
		};
		let tx = Transaction::new(vec![], vec![coinbase], vec![]);
		assert_eq!(tx.body.verify_features(), Err(Error::InvalidOutputFeatures));
	}
}
