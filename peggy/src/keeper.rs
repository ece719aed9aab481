//! The [Keeper] owns the bridge's view of the chain store. Each component of the bridge is an `impl` block on it,
//! in its own module.

use anyhow::anyhow;
use tracing::trace;

use crate::{
    cfg::Config,
    db::{KvStore, KvStoreExt, MemStore, StoreCache, sequence_key},
    error::Result,
};

#[derive(Debug)]
pub struct Keeper<S> {
    pub(crate) store: S,
    pub(crate) config: Config,
}

impl Keeper<MemStore> {
    /// A keeper over a fresh in-memory store, with the default configuration.
    pub fn in_memory() -> Self {
        Keeper {
            store: MemStore::new(),
            config: Config::default(),
        }
    }
}

impl<S: KvStore> Keeper<S> {
    pub fn new(store: S, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Keeper { store, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Run `f` against a write buffer over this keeper's store. The buffered writes are committed if and only if `f`
    /// returns `Ok`, so a failing operation leaves no trace in the store.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Keeper<StoreCache<'_, S>>) -> Result<T>,
    ) -> Result<T> {
        let mut inner = Keeper {
            store: StoreCache::new(&mut self.store),
            config: self.config.clone(),
        };
        let output = f(&mut inner)?;
        inner.store.commit()?;
        Ok(output)
    }

    /// The last value issued from the named sequence, or zero if none has been issued yet.
    pub(crate) fn last_sequence(&self, name: &[u8]) -> Result<u64> {
        Ok(self.store.get_u64(&sequence_key(name))?.unwrap_or(0))
    }

    /// Issue the next value of the named sequence. Sequences start at 1.
    pub(crate) fn next_sequence(&mut self, name: &[u8]) -> Result<u64> {
        let next = self
            .last_sequence(name)?
            .checked_add(1)
            .ok_or_else(|| anyhow!("sequence {} exhausted", String::from_utf8_lossy(name)))?;
        self.store.set_u64(&sequence_key(name), next)?;
        trace!(sequence = %String::from_utf8_lossy(name), next, "issued sequence value");
        Ok(next)
    }
}
