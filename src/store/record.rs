use super::{Bucket, StoreError};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// An entity stored as one key/value row of a bucket table
pub trait Record: Sized {
    type Key: Clone + Eq + Hash + Debug;

    const BUCKET: Bucket;

    fn key(&self) -> Self::Key;

    fn encode_key(key: &Self::Key) -> Vec<u8>;

    fn decode_key(raw: &[u8]) -> Result<Self::Key, StoreError>;

    fn encode_value(&self) -> Result<Vec<u8>, StoreError>;

    /// Rebuild the record from its decoded key and raw value bytes
    fn decode_record(key: Self::Key, raw: &[u8]) -> Result<Self, StoreError>;
}

/// Upsert `record` under its key
pub fn put<R: Record>(tx: &Transaction<'_>, record: &R) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT INTO {} (k, v) VALUES (?1, ?2)
         ON CONFLICT(k) DO UPDATE SET v = excluded.v",
        R::BUCKET.table()
    );
    let key = R::encode_key(&record.key());
    let value = record.encode_value()?;
    tx.execute(&sql, params![key, value])?;
    Ok(())
}

pub fn has<R: Record>(conn: &Connection, key: &R::Key) -> Result<bool, StoreError> {
    let sql = format!("SELECT 1 FROM {} WHERE k = ?1", R::BUCKET.table());
    let found = conn
        .query_row(&sql, [R::encode_key(key)], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Fetch one record, `NotFound` when the key is absent
pub fn peek<R: Record>(conn: &Connection, key: &R::Key) -> Result<R, StoreError> {
    let sql = format!("SELECT v FROM {} WHERE k = ?1", R::BUCKET.table());
    let raw_key = R::encode_key(key);
    let raw: Option<Vec<u8>> = conn
        .query_row(&sql, [&raw_key], |row| row.get(0))
        .optional()?;

    match raw {
        Some(raw) => R::decode_record(key.clone(), &raw),
        None => Err(StoreError::NotFound {
            bucket: R::BUCKET,
            key: hex::encode(raw_key),
        }),
    }
}

/// Every record in the bucket; iteration order carries no meaning
pub fn all<R: Record>(conn: &Connection) -> Result<Vec<R>, StoreError> {
    let sql = format!("SELECT k, v FROM {}", R::BUCKET.table());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (raw_key, raw_value) = row?;
        let key = R::decode_key(&raw_key)?;
        records.push(R::decode_record(key, &raw_value)?);
    }
    Ok(records)
}

pub fn all_as_map<R: Record>(conn: &Connection) -> Result<HashMap<R::Key, R>, StoreError> {
    Ok(all::<R>(conn)?
        .into_iter()
        .map(|record| (record.key(), record))
        .collect())
}

/// Remove one record; returns whether it existed
pub(crate) fn delete<R: Record>(tx: &Transaction<'_>, key: &R::Key) -> Result<bool, StoreError> {
    let sql = format!("DELETE FROM {} WHERE k = ?1", R::BUCKET.table());
    let removed = tx.execute(&sql, [R::encode_key(key)])?;
    Ok(removed > 0)
}
