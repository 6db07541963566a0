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

//! Key/value storage over LMDB. All writes go through a `Batch`, a single
//! write transaction that is either committed as a whole or dropped.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use lmdb_zero as lmdb;
use lmdb_zero::LmdbResultExt;

use crate::core::global;
use crate::core::ser;
use crate::util::RwLock;

/// Map size increment for a production chain (128 MiB)
pub const ALLOC_CHUNK_SIZE_DEFAULT: usize = 128 * 1024 * 1024;
/// Map size increment anywhere else, keeps test databases small (1 MiB)
pub const ALLOC_CHUNK_SIZE_DEFAULT_TEST: usize = 1024 * 1024;

// grow once more than this share of the map is in use
const RESIZE_PERCENT: f32 = 0.9;
// and keep growing until at most this share is in use
const RESIZE_MIN_TARGET_PERCENT: f32 = 0.65;

const DEFAULT_NAME: &str = "lmdb";

/// Errors raised by the db layer.
#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum Error {
	/// Nothing stored under the requested key
	#[error("Not found in db: {0}")]
	NotFoundErr(String),
	/// LMDB itself failed
	#[error("LMDB failure: {0}")]
	LmdbErr(#[from] lmdb::error::Error),
	/// Stored bytes could not be (de)serialized
	#[error("Stored data serialization failure: {0}")]
	SerErr(#[from] ser::Error),
	/// The db directory could not be set up
	#[error("Db file failure: {0}")]
	FileErr(String),
	/// Anything else
	#[error("Db failure: {0}")]
	OtherErr(String),
}

/// Turns a missing value into `NotFoundErr`, naming what was looked up.
pub fn option_to_not_found<T, F>(res: Result<Option<T>, Error>, what: F) -> Result<T, Error>
where
	F: Fn() -> String,
{
	res?.ok_or_else(|| Error::NotFoundErr(what()))
}

// Map size to move to when the current one is too tight for `used` bytes.
fn grown_mapsize(mapsize: usize, used: usize, chunk: usize) -> Option<usize> {
	if mapsize < chunk {
		return Some(chunk);
	}
	if used as f32 / mapsize as f32 <= RESIZE_PERCENT {
		return None;
	}
	let mut size = mapsize;
	while used as f32 / size as f32 > RESIZE_MIN_TARGET_PERCENT {
		size += chunk;
	}
	Some(size)
}

fn open_db(env: &Arc<lmdb::Environment>, name: &str) -> Result<Arc<lmdb::Database<'static>>, Error> {
	let db = lmdb::Database::open(
		env.clone(),
		Some(name),
		&lmdb::DatabaseOptions::new(lmdb::db::CREATE),
	)?;
	Ok(Arc::new(db))
}

fn read_ser<T: ser::Readable>(
	access: &lmdb::ConstAccessor<'_>,
	db: &lmdb::Database<'_>,
	key: &[u8],
) -> Result<Option<T>, Error> {
	let bytes: Option<&[u8]> = access.get(db, key).to_opt()?;
	bytes
		.map(|mut b| ser::deserialize(&mut b).map_err(Error::from))
		.transpose()
}

fn key_exists(
	access: &lmdb::ConstAccessor<'_>,
	db: &lmdb::Database<'_>,
	key: &[u8],
) -> Result<bool, Error> {
	let found: Option<&lmdb::Ignore> = access.get(db, key).to_opt()?;
	Ok(found.is_some())
}

/// A named database in its own LMDB environment, serializing values with
/// the core binary format.
pub struct Store {
	env: Arc<lmdb::Environment>,
	// only None while the map is being resized
	db: RwLock<Option<Arc<lmdb::Database<'static>>>>,
	name: String,
	alloc_chunk_size: usize,
}

impl Store {
	/// Opens (or creates) the environment `env_name` under `root_path` and
	/// the database `db_name` in it, both defaulting to "lmdb".
	pub fn new(root_path: &str, env_name: Option<&str>, db_name: Option<&str>) -> Result<Store, Error> {
		let path = Path::new(root_path).join(env_name.unwrap_or(DEFAULT_NAME));
		fs::create_dir_all(&path)
			.map_err(|e| Error::FileErr(format!("cannot create {}: {}", path.display(), e)))?;
		let path_str = path
			.to_str()
			.ok_or_else(|| Error::FileErr(format!("not a utf8 path: {}", path.display())))?;

		let mut builder = lmdb::EnvBuilder::new()?;
		builder.set_maxdbs(8)?;
		let env = Arc::new(unsafe { builder.open(path_str, lmdb::open::NOTLS, 0o600)? });
		debug!("db: opened {} with map size {}", path_str, env.info()?.mapsize);

		let name = db_name.unwrap_or(DEFAULT_NAME).to_owned();
		let db = open_db(&env, &name)?;
		let alloc_chunk_size = if global::is_production_mode() {
			ALLOC_CHUNK_SIZE_DEFAULT
		} else {
			ALLOC_CHUNK_SIZE_DEFAULT_TEST
		};
		Ok(Store {
			env,
			db: RwLock::new(Some(db)),
			name,
			alloc_chunk_size,
		})
	}

	fn with_db<T, F>(&self, f: F) -> Result<T, Error>
	where
		F: FnOnce(&lmdb::Database<'static>) -> Result<T, Error>,
	{
		let guard = self.db.read();
		match guard.as_ref() {
			Some(db) => f(db),
			None => Err(Error::OtherErr(format!("db {} is closed", self.name))),
		}
	}

	// The map can only be resized with no transaction open, so this runs
	// before handing out a new batch.
	fn grow_if_needed(&self) -> Result<(), Error> {
		let info = self.env.info()?;
		let used = self.env.stat()?.psize as usize * info.last_pgno;
		let new_size = match grown_mapsize(info.mapsize, used, self.alloc_chunk_size) {
			Some(size) => size,
			None => return Ok(()),
		};

		let mut db = self.db.write();
		*db = None;
		let res = unsafe { self.env.set_mapsize(new_size) };
		*db = Some(open_db(&self.env, &self.name)?);
		res?;

		info!("db: map size of {} grown from {} to {}", self.name, info.mapsize, new_size);
		Ok(())
	}

	/// Reads and deserializes the value under `key`. Uses its own read
	/// transaction, so uncommitted batches are not visible.
	pub fn get_ser<T: ser::Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		self.with_db(|db| {
			let txn = lmdb::ReadTransaction::new(self.env.clone())?;
			let access = txn.access();
			read_ser(&access, db, key)
		})
	}

	/// Whether anything is stored under `key`.
	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		self.with_db(|db| {
			let txn = lmdb::ReadTransaction::new(self.env.clone())?;
			let access = txn.access();
			key_exists(&access, db, key)
		})
	}

	/// Starts a new write batch, growing the map first if it is nearly full.
	pub fn batch(&self) -> Result<Batch<'_>, Error> {
		self.grow_if_needed()?;
		let tx = lmdb::WriteTransaction::new(self.env.clone())?;
		Ok(Batch { store: self, tx })
	}
}

/// Write transaction over a `Store`. Reads through a batch see its own
/// writes. Dropping it without `commit` discards everything.
pub struct Batch<'a> {
	store: &'a Store,
	tx: lmdb::WriteTransaction<'a>,
}

impl<'a> Batch<'a> {
	/// Stores raw bytes under `key`.
	pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
		self.store.with_db(|db| {
			self.tx
				.access()
				.put(db, key, value, lmdb::put::Flags::empty())?;
			Ok(())
		})
	}

	/// Serializes `value` and stores it under `key`.
	pub fn put_ser<W: ser::Writeable>(&self, key: &[u8], value: &W) -> Result<(), Error> {
		self.put(key, &ser::ser_vec(value)?)
	}

	/// Reads and deserializes the value under `key`.
	pub fn get_ser<T: ser::Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		self.store
			.with_db(|db| read_ser(&self.tx.access(), db, key))
	}

	/// Raw bytes under `key`.
	pub fn get_bytes(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		self.store.with_db(|db| {
			let access = self.tx.access();
			let bytes: Option<&[u8]> = access.get(db, key).to_opt()?;
			Ok(bytes.map(|b| b.to_vec()))
		})
	}

	/// Whether anything is stored under `key`, this batch included.
	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		self.store
			.with_db(|db| key_exists(&self.tx.access(), db, key))
	}

	/// Removes `key`, failing if it is not there.
	pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
		self.store.with_db(|db| {
			self.tx.access().del_key(db, key)?;
			Ok(())
		})
	}

	/// Commits to the parent batch for a child, to the db otherwise.
	pub fn commit(self) -> Result<(), Error> {
		self.tx.commit()?;
		Ok(())
	}

	/// Nested batch, merged into this one on commit and dropped otherwise.
	pub fn child(&mut self) -> Result<Batch<'_>, Error> {
		Ok(Batch {
			store: self.store,
			tx: self.tx.child_tx()?,
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn mapsize_growth() {
		let chunk = 100;
		// below one chunk always jumps to a chunk
		assert_eq!(grown_mapsize(10, 0, chunk), Some(chunk));
		// room left, nothing to do
		assert_eq!(grown_mapsize(200, 180, chunk), None);
		// past 90%, grow until 65% or less is used
		assert_eq!(grown_mapsize(200, 190, chunk), Some(300));
		assert_eq!(grown_mapsize(200, 199, chunk), Some(400));
	}
}
