//! Health records kept by barangay health workers
use super::auth::{Action, Module, Session, authorize};
use super::resident::Resident;
use super::store::{Record, Store};
use super::types::{ListQuery, Listable, Listing, TimeStamp, labelled_enum};
use super::utils;
use super::validate::{Field, FieldKind, Schema};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

labelled_enum! {
    pub enum RecordType {
        Checkup = (0, "CHECKUP"),
        Immunization = (1, "IMMUNIZATION"),
        Prenatal = (2, "PRENATAL"),
        Illness = (3, "ILLNESS"),
        Nutrition = (4, "NUTRITION"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct HealthRecord {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub resident_id: String,
    #[n(2)]
    pub resident_name: String,
    #[n(3)]
    pub record_type: RecordType,
    #[n(4)]
    pub description: String,
    #[n(5)]
    pub weight_grams: Option<u64>,
    #[n(6)]
    pub height_mm: Option<u64>,
    #[n(7)]
    pub blood_pressure: Option<String>,
    #[n(8)]
    pub recorded_at: TimeStamp<Utc>,
    #[n(9)]
    pub recorded_by: String,
    #[n(10)]
    pub updated_at: Option<TimeStamp<Utc>>,
}

impl Record for HealthRecord {
    const KIND: &'static str = "health";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Listable for HealthRecord {
    fn status_label(&self) -> &'static str {
        "RECORDED"
    }
    fn category_label(&self) -> Option<&str> {
        Some(self.record_type.as_str())
    }
    fn search_text(&self) -> String {
        format!("{} {}", self.resident_name, self.description)
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.recorded_at
    }
}

// 1,000 kg and 300 cm, in hundredths.
const MAX_WEIGHT: u64 = 100_000;
const MAX_HEIGHT: u64 = 30_000;

// weight_kg and height_cm parse like amounts, in hundredths of the unit.
pub fn health_schema() -> Schema {
    Schema::new(&[
        Field::required("resident_id", FieldKind::Text),
        Field::required("record_type", FieldKind::Choice(RecordType::LABELS)),
        Field::required("description", FieldKind::Text),
        Field::optional("weight_kg", FieldKind::Amount { max: MAX_WEIGHT }),
        Field::optional("height_cm", FieldKind::Amount { max: MAX_HEIGHT }),
        Field::optional("blood_pressure", FieldKind::Text),
        Field::optional("recorded_at", FieldKind::Date),
    ])
}

fn grams(hundredths_of_kg: u64) -> u64 {
    hundredths_of_kg.saturating_mul(10)
}

fn millimetres(hundredths_of_cm: u64) -> u64 {
    hundredths_of_cm / 10
}

pub struct HealthService {
    store: Store,
}

impl HealthService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn record(&self, session: &Session, payload: &Value) -> anyhow::Result<HealthRecord> {
        let actor = authorize(session, Module::Health, Action::Create)?;
        let input = health_schema().check(payload)?;
        let resident: Resident = self.store.require(&input.require_text("resident_id")?)?;

        let record = HealthRecord {
            id: utils::new_uuid_to_bech32("health_")?,
            resident_id: resident.id.clone(),
            resident_name: resident.full_name(),
            record_type: input.require_choice("record_type")?,
            description: input.require_text("description")?,
            weight_grams: input.amount("weight_kg").map(grams),
            height_mm: input.amount("height_cm").map(millimetres),
            blood_pressure: input.text("blood_pressure"),
            recorded_at: input.date("recorded_at").unwrap_or_default(),
            recorded_by: actor.id.clone(),
            updated_at: None,
        };

        self.store.put(&record)?;
        info!(
            record = %record.id,
            resident = %record.resident_id,
            kind = %record.record_type,
            actor = %actor.id,
            "health record added"
        );

        Ok(record)
    }

    pub fn get(&self, session: &Session, id: &str) -> anyhow::Result<HealthRecord> {
        authorize(session, Module::Health, Action::View)?;
        self.store.require(id)
    }

    /// `category` filters on the record type.
    pub fn list(&self, session: &Session, query: &ListQuery) -> anyhow::Result<Listing<HealthRecord>> {
        authorize(session, Module::Health, Action::View)?;
        Ok(query.apply(self.store.all()?))
    }

    pub fn for_resident(
        &self,
        session: &Session,
        resident_id: &str,
    ) -> anyhow::Result<Vec<HealthRecord>> {
        authorize(session, Module::Health, Action::View)?;
        self.store.require::<Resident>(resident_id)?;

        let mut records: Vec<HealthRecord> = self
            .store
            .all::<HealthRecord>()?
            .into_iter()
            .filter(|r| r.resident_id == resident_id)
            .collect();
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(records)
    }

    /// The resident a record belongs to never changes.
    pub fn update(&self, session: &Session, id: &str, payload: &Value) -> anyhow::Result<HealthRecord> {
        let actor = authorize(session, Module::Health, Action::Update)?;
        let input = health_schema().partial().check(payload)?;
        let mut record: HealthRecord = self.store.require(id)?;

        if let Some(kind) = input.choice("record_type") {
            record.record_type = kind;
        }
        if let Some(description) = input.text("description") {
            record.description = description;
        }
        if let Some(weight) = input.amount("weight_kg") {
            record.weight_grams = Some(grams(weight));
        }
        if let Some(height) = input.amount("height_cm") {
            record.height_mm = Some(millimetres(height));
        }
        if let Some(bp) = input.text("blood_pressure") {
            record.blood_pressure = Some(bp);
        }
        if let Some(at) = input.date("recorded_at") {
            record.recorded_at = at;
        }
        record.updated_at = Some(TimeStamp::new());

        self.store.put(&record)?;
        info!(record = %record.id, actor = %actor.id, "health record updated");

        Ok(record)
    }
}
