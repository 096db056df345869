//! Typed record families on top of a single sled database
//!
//! Records live under `"{kind}/{id}"` and are CBOR encoded. Multi-record
//! changes go through a [`Batch`] so they land together or not at all, and
//! uniqueness rules are enforced inside a sled transaction.
use super::error::RecordError;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Batch, IVec};
use std::path::Path;
use std::sync::Arc;

/// Anything stored as its own row.
pub trait Record: minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()> {
    /// Key prefix and the name used in not-found messages.
    const KIND: &'static str;

    fn id(&self) -> &str;
}

#[derive(Clone)]
pub struct Store {
    instance: Arc<sled::Db>,
}

impl Store {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(sled::open(path)?)))
    }

    /// An in-memory database removed on drop.
    pub fn temporary() -> anyhow::Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::new(Arc::new(db)))
    }

    fn key(kind: &str, id: &str) -> String {
        format!("{kind}/{id}")
    }

    fn unique_key(index: &str, key: &str) -> String {
        format!("unique/{index}/{key}")
    }

    pub fn get<R: Record>(&self, id: &str) -> anyhow::Result<Option<R>> {
        match self.instance.get(Self::key(R::KIND, id).as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`Store::get`] but a missing row is a `NotFound`.
    pub fn require<R: Record>(&self, id: &str) -> anyhow::Result<R> {
        self.get(id)?
            .ok_or_else(|| RecordError::not_found(R::KIND, id).into())
    }

    pub fn put<R: Record>(&self, record: &R) -> anyhow::Result<()> {
        let key = Self::key(R::KIND, record.id());
        self.instance.insert(key.as_bytes(), minicbor::to_vec(record)?)?;
        Ok(())
    }

    /// Queue a write for [`Store::apply`].
    pub fn stage<R: Record>(batch: &mut Batch, record: &R) -> anyhow::Result<()> {
        let key = Self::key(R::KIND, record.id());
        batch.insert(key.as_bytes(), minicbor::to_vec(record)?);
        Ok(())
    }

    /// Queue the release of a unique index entry taken by [`Store::insert_unique`].
    pub fn stage_release(batch: &mut Batch, index: &str, key: &str) {
        batch.remove(Self::unique_key(index, key).as_bytes());
    }

    pub fn apply(&self, batch: Batch) -> anyhow::Result<()> {
        self.instance.apply_batch(batch)?;
        Ok(())
    }

    pub fn remove<R: Record>(&self, id: &str) -> anyhow::Result<()> {
        self.instance.remove(Self::key(R::KIND, id).as_bytes())?;
        Ok(())
    }

    pub fn all<R: Record>(&self) -> anyhow::Result<Vec<R>> {
        self.scan_values(&format!("{}/", R::KIND))?
            .iter()
            .map(|bytes| minicbor::decode(bytes).map_err(anyhow::Error::from))
            .collect()
    }

    pub fn count<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> anyhow::Result<usize> {
        Ok(self.all::<R>()?.iter().filter(|r| predicate(r)).count())
    }

    pub(crate) fn scan_values(&self, prefix: &str) -> anyhow::Result<Vec<IVec>> {
        self.instance
            .scan_prefix(prefix.as_bytes())
            .values()
            .map(|value| value.map_err(anyhow::Error::from))
            .collect()
    }

    pub(crate) fn stage_raw(batch: &mut Batch, key: &str, value: Vec<u8>) {
        batch.insert(key.as_bytes(), value);
    }

    /// Insert `record` while claiming `key` in the named unique index.
    ///
    /// The claim and the write share one transaction, so two concurrent
    /// callers racing for the same key see exactly one success.
    pub fn insert_unique<R: Record>(
        &self,
        index: &str,
        key: &str,
        record: &R,
    ) -> anyhow::Result<()> {
        let index_key = Self::unique_key(index, key);
        let record_key = Self::key(R::KIND, record.id());
        let bytes = minicbor::to_vec(record)?;

        let outcome = self.instance.transaction(|tx| {
            if tx.get(index_key.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(()));
            }
            tx.insert(index_key.as_bytes(), record.id().as_bytes())?;
            tx.insert(record_key.as_bytes(), bytes.as_slice())?;
            Ok(())
        });

        match outcome {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(())) => Err(RecordError::Conflict(format!(
                "{} already exists for {index} `{key}`",
                R::KIND
            ))
            .into()),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    /// Id of the record holding `key` in a unique index, if any.
    pub fn unique_owner(&self, index: &str, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .instance
            .get(Self::unique_key(index, key).as_bytes())?
            .map(|owner| String::from_utf8_lossy(&owner).into_owned()))
    }

    /// Households, people or anything else currently holding a place in `slot`.
    pub fn seats(&self, slot: &str) -> anyhow::Result<u64> {
        Ok(decode_count(self.instance.get(Self::seat_key(slot).as_bytes())?.as_deref()))
    }

    /// Replace `previous` with `record` while moving it out of `leave` and
    /// into `enter`, a slot with a fixed capacity.
    ///
    /// The row check, both seat counts and the write share one transaction.
    /// A row changed underneath the caller or a full slot is a `Conflict`.
    pub fn reseat<R: Record>(
        &self,
        previous: &R,
        record: &R,
        leave: Option<&str>,
        enter: Option<(&str, u64)>,
    ) -> anyhow::Result<()> {
        let record_key = Self::key(R::KIND, record.id());
        let expected = minicbor::to_vec(previous)?;
        let bytes = minicbor::to_vec(record)?;
        let leave_key = leave.map(Self::seat_key);
        let enter_key = enter.map(|(slot, capacity)| (Self::seat_key(slot), capacity));

        let outcome = self.instance.transaction(|tx| {
            let current = tx.get(record_key.as_bytes())?;
            if current.as_deref() != Some(expected.as_slice()) {
                return Err(ConflictableTransactionError::Abort(Reseat::Stale));
            }
            if let Some(key) = &leave_key {
                let seated = decode_count(tx.get(key.as_bytes())?.as_deref());
                tx.insert(key.as_bytes(), seated.saturating_sub(1).to_be_bytes().to_vec())?;
            }
            if let Some((key, capacity)) = &enter_key {
                let seated = decode_count(tx.get(key.as_bytes())?.as_deref());
                if seated >= *capacity {
                    return Err(ConflictableTransactionError::Abort(Reseat::Full));
                }
                tx.insert(key.as_bytes(), (seated + 1).to_be_bytes().to_vec())?;
            }
            tx.insert(record_key.as_bytes(), bytes.as_slice())?;
            Ok(())
        });

        match outcome {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(Reseat::Stale)) => Err(RecordError::Conflict(format!(
                "{} `{}` changed while it was being moved",
                R::KIND,
                record.id()
            ))
            .into()),
            Err(TransactionError::Abort(Reseat::Full)) => Err(RecordError::Conflict(format!(
                "no room left for {} `{}`",
                R::KIND,
                record.id()
            ))
            .into()),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn seat_key(slot: &str) -> String {
        format!("seats/{slot}")
    }

    /// Atomically bump a named counter and return its new value, starting at 1.
    pub fn increment(&self, counter: &str) -> anyhow::Result<u64> {
        let key = format!("sequence/{counter}");
        let updated = self.instance.update_and_fetch(key.as_bytes(), |current| {
            let next = current
                .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                .map_or(1, |bytes| u64::from_be_bytes(bytes) + 1);
            Some(next.to_be_bytes().to_vec())
        })?;

        updated
            .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_ref()).ok())
            .map(u64::from_be_bytes)
            .ok_or_else(|| anyhow::anyhow!("counter `{counter}` holds a malformed value"))
    }
}

#[derive(Debug, Clone, Copy)]
enum Reseat {
    Stale,
    Full,
}

fn decode_count(bytes: Option<&[u8]>) -> u64 {
    bytes
        .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
        .map_or(0, u64::from_be_bytes)
}
