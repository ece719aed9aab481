//! The keyed state that every part of the bridge reads and writes.
//!
//! The hosting chain owns the real store. Everything here talks to it through [KvStore], so tests can run against a
//! [MemStore] and message handlers can run against a [StoreCache] which is only committed when the whole message
//! succeeds.

mod tables;

use std::{
    collections::BTreeMap,
    fmt::Debug,
    ops::Bound,
};

use anyhow::{Context, Result, anyhow};
use itertools::{EitherOrBoth, Itertools};
use serde::{Serialize, de::DeserializeOwned};
pub(crate) use tables::*;

/// Iteration order of a prefix scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

pub type KvPair = (Vec<u8>, Vec<u8>);

pub type KvIter<'a> = Box<dyn Iterator<Item = Result<KvPair>> + 'a>;

/// A byte-keyed store with ordered iteration. Keys are compared lexicographically.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()>;

    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Iterate over every entry whose key starts with `prefix`, in key order or reverse key order.
    fn scan(&self, prefix: &[u8], order: Order) -> Result<KvIter<'_>>;
}

/// Typed helpers on top of [KvStore]. Values are JSON, counters are big-endian `u64`s.
pub trait KvStoreExt: KvStore {
    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        let Some(bytes) = self.get(key)? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt value at key {}", hex::encode(key)))?;
        Ok(Some(value))
    }

    fn set_json<T: Serialize>(&mut self, key: &[u8], value: &T) -> Result<()> {
        self.set(key, serde_json::to_vec(value)?)
    }

    fn get_u64(&self, key: &[u8]) -> Result<Option<u64>> {
        let Some(bytes) = self.get(key)? else {
            return Ok(None);
        };
        Ok(Some(decode_u64(&bytes)?))
    }

    fn set_u64(&mut self, key: &[u8], value: u64) -> Result<()> {
        self.set(key, value.to_be_bytes().to_vec())
    }

    fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Like [KvStore::scan], but decodes each value as JSON.
    fn scan_json<T: DeserializeOwned>(
        &self,
        prefix: &[u8],
        order: Order,
    ) -> Result<Box<dyn Iterator<Item = Result<T>> + '_>> {
        Ok(Box::new(self.scan(prefix, order)?.map(|kv| {
            let (key, value) = kv?;
            serde_json::from_slice(&value)
                .with_context(|| format!("corrupt value at key {}", hex::encode(key)))
        })))
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

pub(crate) fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| anyhow!("expected 8 bytes, got {}", bytes.len()))?;
    Ok(u64::from_be_bytes(bytes))
}

/// The smallest key which is greater than every key starting with `prefix`. `None` if there is no such key, which is
/// the case for an empty prefix or a prefix made only of `0xff` bytes.
fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn prefix_bounds(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let end = match prefix_end(prefix) {
        Some(end) => Bound::Excluded(end),
        None => Bound::Unbounded,
    };
    (Bound::Included(prefix.to_vec()), end)
}

/// An in-memory [KvStore].
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &[u8], order: Order) -> Result<KvIter<'_>> {
        let range = self
            .entries
            .range(prefix_bounds(prefix))
            .map(|(k, v)| Ok::<_, anyhow::Error>((k.clone(), v.clone())));
        Ok(match order {
            Order::Ascending => Box::new(range),
            Order::Descending => Box::new(range.rev()),
        })
    }
}

/// Buffers writes on top of a parent store. Reads see the buffered writes. Nothing reaches the parent until
/// [StoreCache::commit] is called; dropping the cache discards every write.
pub struct StoreCache<'a, S: ?Sized> {
    parent: &'a mut S,
    /// `None` marks a deletion.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<S: ?Sized> Debug for StoreCache<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCache")
            .field("pending_writes", &self.writes.len())
            .finish()
    }
}

impl<'a, S: KvStore + ?Sized> StoreCache<'a, S> {
    pub fn new(parent: &'a mut S) -> Self {
        StoreCache {
            parent,
            writes: BTreeMap::new(),
        }
    }

    /// Flush every buffered write to the parent, in key order.
    pub fn commit(self) -> Result<()> {
        for (key, value) in self.writes {
            match value {
                Some(value) => self.parent.set(&key, value)?,
                None => self.parent.delete(&key)?,
            }
        }
        Ok(())
    }
}

impl<S: KvStore + ?Sized> KvStore for StoreCache<'_, S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.writes.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn scan(&self, prefix: &[u8], order: Order) -> Result<KvIter<'_>> {
        let parent = self.parent.scan(prefix, order)?;
        let overlay = self.writes.range(prefix_bounds(prefix));
        let overlay: Box<dyn Iterator<Item = (&Vec<u8>, &Option<Vec<u8>>)> + '_> = match order {
            Order::Ascending => Box::new(overlay),
            Order::Descending => Box::new(overlay.rev()),
        };

        // Both sides are sorted in `order`. On equal keys the buffered write shadows the parent's entry.
        let merged = parent
            .merge_join_by(overlay, move |p, (key, _)| {
                let ordering = match p {
                    Ok((parent_key, _)) => parent_key.cmp(key),
                    // Surface errors as early as possible.
                    Err(_) => return std::cmp::Ordering::Less,
                };
                match order {
                    Order::Ascending => ordering,
                    Order::Descending => ordering.reverse(),
                }
            })
            .filter_map(|entry| match entry {
                EitherOrBoth::Left(p) => Some(p),
                EitherOrBoth::Right((key, value)) | EitherOrBoth::Both(_, (key, value)) => {
                    value.clone().map(|value| Ok((key.clone(), value)))
                }
            });
        Ok(Box::new(merged))
    }
}
