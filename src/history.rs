//! Witnesses: the append-only log of applied status transitions
use super::store::Store;
use super::types::TimeStamp;
use chrono::Utc;
use serde::Serialize;
use sled::Batch;

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone, Serialize)]
pub struct Witness {
    #[n(0)]
    pub record_id: String, // the document, case, project or period that moved
    #[n(1)]
    pub actor_id: String,
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
    #[n(3)]
    pub from: String,
    #[n(4)]
    pub to: String,
    #[n(5)]
    pub note: Option<String>,
}

impl Witness {
    pub fn new(
        record_id: &str,
        actor_id: &str,
        timestamp: TimeStamp<Utc>,
        from: &str,
        to: &str,
    ) -> Self {
        Self {
            record_id: record_id.to_string(),
            actor_id: actor_id.to_string(),
            timestamp,
            from: from.to_string(),
            to: to.to_string(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    /// CBOR encoding and its sha256 digest, which doubles as the witness key.
    pub fn build(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }

    /// Queue this witness next to the record update it describes.
    pub fn stage(&self, batch: &mut Batch) -> anyhow::Result<String> {
        let (hash, cbor) = self.build()?;
        Store::stage_raw(batch, &format!("witness/{}/{hash}", self.record_id), cbor);
        Ok(hash)
    }
}

/// Every witness for one record, oldest first.
pub fn history(store: &Store, record_id: &str) -> anyhow::Result<Vec<Witness>> {
    let mut witnesses = store
        .scan_values(&format!("witness/{record_id}/"))?
        .iter()
        .map(|bytes| minicbor::decode(bytes).map_err(anyhow::Error::from))
        .collect::<anyhow::Result<Vec<Witness>>>()?;

    witnesses.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(witnesses)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn witness_hash_is_stable() {
        let ts = TimeStamp::new_with(2024, 5, 1, 8, 0, 0);
        let a = Witness::new("doc_1", "user_1", ts.clone(), "PENDING", "PROCESSING");
        let b = Witness::new("doc_1", "user_1", ts, "PENDING", "PROCESSING");

        assert_eq!(a.build().unwrap().0, b.build().unwrap().0);

        let c = b.with_note(Some("walk-in".into()));
        assert_ne!(a.build().unwrap().0, c.build().unwrap().0);
    }

    #[test]
    fn history_is_ordered_and_scoped() {
        let store = Store::temporary().unwrap();
        let mut batch = Batch::default();

        Witness::new("doc_1", "u", TimeStamp::new_with(2024, 5, 2, 0, 0, 0), "PROCESSING", "READY")
            .stage(&mut batch)
            .unwrap();
        Witness::new("doc_1", "u", TimeStamp::new_with(2024, 5, 1, 0, 0, 0), "PENDING", "PROCESSING")
            .stage(&mut batch)
            .unwrap();
        Witness::new("doc_10", "u", TimeStamp::new_with(2024, 5, 1, 0, 0, 0), "PENDING", "CANCELLED")
            .stage(&mut batch)
            .unwrap();
        store.apply(batch).unwrap();

        let log = history(&store, "doc_1").unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].to, "PROCESSING");
        assert_eq!(log[1].to, "READY");
    }
}
