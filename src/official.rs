//! Elected and appointed officials
use super::auth::{Action, Module, Session, authorize};
use super::error::RecordError;
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
    pub enum Position {
        Captain = (0, "CAPTAIN"),
        Kagawad = (1, "KAGAWAD"),
        Secretary = (2, "SECRETARY"),
        Treasurer = (3, "TREASURER"),
        YouthChairperson = (4, "YOUTH_CHAIRPERSON"),
        TanodChief = (5, "TANOD_CHIEF"),
    }
}

impl Position {
    pub fn title(&self) -> &'static str {
        match self {
            Position::Captain => "Punong Barangay",
            Position::Kagawad => "Barangay Kagawad",
            Position::Secretary => "Barangay Secretary",
            Position::Treasurer => "Barangay Treasurer",
            Position::YouthChairperson => "SK Chairperson",
            Position::TanodChief => "Chief Tanod",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct Official {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub resident_id: Option<String>,
    #[n(2)]
    pub full_name: String,
    #[n(3)]
    pub position: Position,
    #[n(4)]
    pub committee: Option<String>,
    #[n(5)]
    pub term_start: TimeStamp<Utc>,
    #[n(6)]
    pub term_end: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub active: bool,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

impl Record for Official {
    const KIND: &'static str = "official";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Listable for Official {
    fn status_label(&self) -> &'static str {
        if self.active { "ACTIVE" } else { "INACTIVE" }
    }
    fn category_label(&self) -> Option<&str> {
        Some(self.position.as_str())
    }
    fn search_text(&self) -> String {
        format!(
            "{} {}",
            self.full_name,
            self.committee.as_deref().unwrap_or_default()
        )
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
}

pub fn official_schema() -> Schema {
    Schema::new(&[
        Field::optional("resident_id", FieldKind::Text),
        Field::required("full_name", FieldKind::Text),
        Field::required("position", FieldKind::Choice(Position::LABELS)),
        Field::optional("committee", FieldKind::Text),
        Field::required("term_start", FieldKind::Date),
        Field::optional("term_end", FieldKind::Date),
    ])
}

pub fn end_term_schema() -> Schema {
    Schema::new(&[Field::optional("term_end", FieldKind::Date)])
}

pub struct OfficialService {
    store: Store,
}

impl OfficialService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn appoint(&self, session: &Session, payload: &Value) -> anyhow::Result<Official> {
        let actor = authorize(session, Module::Officials, Action::Create)?;
        let input = official_schema().check(payload)?;

        let resident_id = input.text("resident_id");
        if let Some(resident) = &resident_id {
            self.store.require::<Resident>(resident)?;
        }

        let official = Official {
            id: utils::new_uuid_to_bech32("off_")?,
            resident_id,
            full_name: input.require_text("full_name")?,
            position: input.require_choice("position")?,
            committee: input.text("committee"),
            term_start: input.require_date("term_start")?,
            term_end: input.date("term_end"),
            active: true,
            created_at: TimeStamp::new(),
        };

        self.store.put(&official)?;
        info!(
            official = %official.id,
            position = %official.position,
            actor = %actor.id,
            "official appointed"
        );

        Ok(official)
    }

    pub fn get(&self, session: &Session, id: &str) -> anyhow::Result<Official> {
        authorize(session, Module::Officials, Action::View)?;
        self.store.require(id)
    }

    pub fn list(&self, session: &Session, query: &ListQuery) -> anyhow::Result<Listing<Official>> {
        authorize(session, Module::Officials, Action::View)?;
        Ok(query.apply(self.store.all()?))
    }

    pub fn update(&self, session: &Session, id: &str, payload: &Value) -> anyhow::Result<Official> {
        let actor = authorize(session, Module::Officials, Action::Update)?;
        let input = official_schema().partial().check(payload)?;
        let mut official: Official = self.store.require(id)?;

        if let Some(resident) = input.text("resident_id") {
            self.store.require::<Resident>(&resident)?;
            official.resident_id = Some(resident);
        }
        if let Some(name) = input.text("full_name") {
            official.full_name = name;
        }
        if let Some(position) = input.choice("position") {
            official.position = position;
        }
        if let Some(committee) = input.text("committee") {
            official.committee = Some(committee);
        }
        if let Some(start) = input.date("term_start") {
            official.term_start = start;
        }
        if let Some(end) = input.date("term_end") {
            official.term_end = Some(end);
        }

        self.store.put(&official)?;
        info!(official = %official.id, actor = %actor.id, "official updated");

        Ok(official)
    }

    /// Close the term. `term_end` defaults to now.
    pub fn end_term(&self, session: &Session, id: &str, payload: &Value) -> anyhow::Result<Official> {
        let actor = authorize(session, Module::Officials, Action::Update)?;
        let input = end_term_schema().check(payload)?;
        let mut official: Official = self.store.require(id)?;

        if !official.active {
            return Err(RecordError::Conflict(format!(
                "{} is no longer in office",
                official.full_name
            ))
            .into());
        }

        official.active = false;
        official.term_end = Some(input.date("term_end").unwrap_or_default());

        self.store.put(&official)?;
        info!(official = %official.id, actor = %actor.id, "official term ended");

        Ok(official)
    }
}

/// The sitting captain, who signs certificates.
pub fn active_captain(store: &Store) -> anyhow::Result<Option<Official>> {
    Ok(store
        .all::<Official>()?
        .into_iter()
        .filter(|o| o.active && o.position == Position::Captain)
        .max_by(|a, b| a.term_start.cmp(&b.term_start)))
}
