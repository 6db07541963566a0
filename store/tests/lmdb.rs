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

use mimble_core::ser::{self, Readable, Reader, Writeable, Writer};
use mimble_store as store;
use mimble_util as util;

use std::fs;

#[derive(Clone, Debug, PartialEq)]
struct Entry {
	height: u64,
	tag: Vec<u8>,
}

impl Readable for Entry {
	fn read<R: Reader>(reader: &mut R) -> Result<Entry, ser::Error> {
		Ok(Entry {
			height: reader.read_u64()?,
			tag: reader.read_bytes_len_prefix()?,
		})
	}
}

impl Writeable for Entry {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.height)?;
		writer.write_bytes(&self.tag)
	}
}

fn entry(height: u64) -> Entry {
	Entry {
		height,
		tag: format!("entry-{}", height).into_bytes(),
	}
}

fn setup(test_dir: &str) {
	util::init_test_logger();
	let _ = fs::remove_dir_all(test_dir);
}

#[test]
fn batch_is_atomic() -> Result<(), store::Error> {
	let test_dir = "test_output/lmdb_batch_is_atomic";
	setup(test_dir);
	{
		let store = store::Store::new(test_dir, None, None)?;
		let key = store::u64_to_key(b'e', 1);

		// dropped without commit
		{
			let batch = store.batch()?;
			batch.put_ser(&key, &entry(1))?;
			assert_eq!(batch.get_ser::<Entry>(&key)?, Some(entry(1)));
			assert!(batch.exists(&key)?);
		}
		assert_eq!(store.get_ser::<Entry>(&key)?, None);
		assert!(!store.exists(&key)?);

		let batch = store.batch()?;
		batch.put_ser(&key, &entry(1))?;
		batch.put_ser(&store::u64_to_key(b'e', 2), &entry(2))?;
		batch.commit()?;
		assert_eq!(store.get_ser::<Entry>(&key)?, Some(entry(1)));

		let batch = store.batch()?;
		batch.delete(&key)?;
		batch.commit()?;
		assert!(!store.exists(&key)?);
		assert!(store.exists(&store::u64_to_key(b'e', 2))?);
	}
	let _ = fs::remove_dir_all(test_dir);
	Ok(())
}

#[test]
fn child_batch_merges_on_commit_only() -> Result<(), store::Error> {
	let test_dir = "test_output/lmdb_child_batch";
	setup(test_dir);
	{
		let store = store::Store::new(test_dir, None, None)?;
		let mut batch = store.batch()?;
		{
			let child = batch.child()?;
			child.put_ser(&store::u64_to_key(b'e', 1), &entry(1))?;
		}
		{
			let child = batch.child()?;
			child.put_ser(&store::u64_to_key(b'e', 2), &entry(2))?;
			child.commit()?;
		}
		assert!(!batch.exists(&store::u64_to_key(b'e', 1))?);
		assert!(batch.exists(&store::u64_to_key(b'e', 2))?);
		batch.commit()?;
		assert!(store.exists(&store::u64_to_key(b'e', 2))?);
	}
	let _ = fs::remove_dir_all(test_dir);
	Ok(())
}

#[test]
fn store_reopens_with_data() -> Result<(), store::Error> {
	let test_dir = "test_output/lmdb_reopen";
	setup(test_dir);
	{
		let store = store::Store::new(test_dir, Some("env"), None)?;
		let batch = store.batch()?;
		batch.put(b"raw", &[1, 2, 3])?;
		assert_eq!(batch.get_bytes(b"raw")?, Some(vec![1, 2, 3]));
		batch.commit()?;
	}
	{
		let store = store::Store::new(test_dir, Some("env"), None)?;
		assert!(store.exists(b"raw")?);
		let missing: Result<Option<Entry>, _> = store.get_ser(b"nope");
		let err = store::option_to_not_found(missing, || "nope".to_owned()).unwrap_err();
		assert_eq!(err, store::Error::NotFoundErr("nope".to_owned()));
	}
	let _ = fs::remove_dir_all(test_dir);
	Ok(())
}
