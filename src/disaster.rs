//! Disaster preparedness: household risk profiles, evacuation centers,
//! events and missing-person reports
use super::auth::{Action, Module, Session, authorize};
use super::error::RecordError;
use super::history::Witness;
use super::household::Household;
use super::resident::Resident;
use super::store::{Record, Store};
use super::types::{ListQuery, Listable, Listing, TimeStamp, labelled_enum};
use super::utils;
use super::validate::{Field, FieldKind, Schema, Validated};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sled::Batch;
use tracing::{debug, info};

/// One risk profile per household.
pub const PROFILE_INDEX: &str = "risk_profile_household";
/// At most one open missing-person report per resident.
pub const MISSING_INDEX: &str = "missing_open";

labelled_enum! {
    pub enum RiskLevel {
        High = (0, "HIGH"),
        Medium = (1, "MEDIUM"),
        Low = (2, "LOW"),
        Safe = (3, "SAFE"),
    }
}

labelled_enum! {
    pub enum EventType {
        Typhoon = (0, "TYPHOON"),
        Flood = (1, "FLOOD"),
        Earthquake = (2, "EARTHQUAKE"),
        Fire = (3, "FIRE"),
        Landslide = (4, "LANDSLIDE"),
        Other = (5, "OTHER"),
    }
}

/// Where and since when a household is sheltering. Center and time are
/// one value so neither can be set without the other.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct Evacuation {
    #[n(0)]
    pub center_id: String,
    #[n(1)]
    pub evacuated_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct Vulnerability {
    #[n(0)]
    pub has_senior: bool,
    #[n(1)]
    pub has_pwd: bool,
    #[n(2)]
    pub has_infant: bool,
    #[n(3)]
    pub has_pregnant: bool,
    #[n(4)]
    pub has_chronic_illness: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct RiskProfile {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub household_id: String,
    #[n(2)]
    pub household_number: String,
    #[n(3)]
    pub risk_level: RiskLevel,
    #[n(4)]
    pub vulnerability: Vulnerability,
    #[n(5)]
    pub notes: Option<String>,
    #[n(6)]
    pub evacuation: Option<Evacuation>,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
    #[n(8)]
    pub created_by: String,
    #[n(9)]
    pub updated_at: Option<TimeStamp<Utc>>,
}

impl RiskProfile {
    pub fn is_evacuated(&self) -> bool {
        self.evacuation.is_some()
    }

    pub fn center_id(&self) -> Option<&str> {
        self.evacuation.as_ref().map(|e| e.center_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct EvacuationCenter {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub location: String,
    #[n(3)]
    pub capacity: u32, // households
    #[n(4)]
    pub active: bool,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct DisasterEvent {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub event_type: EventType,
    #[n(3)]
    pub started_at: TimeStamp<Utc>,
    #[n(4)]
    pub ended_at: Option<TimeStamp<Utc>>,
    #[n(5)]
    pub created_by: String,
}

impl DisasterEvent {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct MissingPersonReport {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub resident_id: String,
    #[n(2)]
    pub resident_name: String,
    #[n(3)]
    pub event_id: Option<String>,
    #[n(4)]
    pub last_seen_location: Option<String>,
    #[n(5)]
    pub description: Option<String>,
    #[n(6)]
    pub reported_at: TimeStamp<Utc>,
    #[n(7)]
    pub reported_by: String,
    #[n(8)]
    pub found_at: Option<TimeStamp<Utc>>,
}

impl MissingPersonReport {
    pub fn is_open(&self) -> bool {
        self.found_at.is_none()
    }

    pub fn status(&self) -> &'static str {
        if self.is_open() { "OPEN" } else { "FOUND" }
    }
}

impl Record for RiskProfile {
    const KIND: &'static str = "risk_profile";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for EvacuationCenter {
    const KIND: &'static str = "evacuation_center";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for DisasterEvent {
    const KIND: &'static str = "disaster_event";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for MissingPersonReport {
    const KIND: &'static str = "missing_person";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Listable for RiskProfile {
    fn status_label(&self) -> &'static str {
        if self.is_evacuated() { "EVACUATED" } else { "HOME" }
    }
    fn category_label(&self) -> Option<&str> {
        Some(self.risk_level.as_str())
    }
    fn search_text(&self) -> String {
        format!(
            "{} {}",
            self.household_number,
            self.notes.as_deref().unwrap_or_default()
        )
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
}

impl Listable for DisasterEvent {
    fn status_label(&self) -> &'static str {
        if self.is_active() { "ACTIVE" } else { "ENDED" }
    }
    fn category_label(&self) -> Option<&str> {
        Some(self.event_type.as_str())
    }
    fn search_text(&self) -> String {
        self.name.clone()
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.started_at
    }
}

impl Listable for MissingPersonReport {
    fn status_label(&self) -> &'static str {
        self.status()
    }
    fn search_text(&self) -> String {
        format!(
            "{} {}",
            self.resident_name,
            self.last_seen_location.as_deref().unwrap_or_default()
        )
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.reported_at
    }
}

pub fn profile_schema() -> Schema {
    Schema::new(&[
        Field::required("household_id", FieldKind::Text),
        Field::required("risk_level", FieldKind::Choice(RiskLevel::LABELS)),
        Field::optional("has_senior", FieldKind::Flag),
        Field::optional("has_pwd", FieldKind::Flag),
        Field::optional("has_infant", FieldKind::Flag),
        Field::optional("has_pregnant", FieldKind::Flag),
        Field::optional("has_chronic_illness", FieldKind::Flag),
        Field::optional("notes", FieldKind::Text),
    ])
}

pub fn center_schema() -> Schema {
    Schema::new(&[
        Field::required("name", FieldKind::Text),
        Field::required("location", FieldKind::Text),
        Field::required(
            "capacity",
            FieldKind::Integer {
                min: 1,
                max: u32::MAX as i64,
            },
        ),
    ])
}

pub fn event_schema() -> Schema {
    Schema::new(&[
        Field::required("name", FieldKind::Text),
        Field::required("event_type", FieldKind::Choice(EventType::LABELS)),
        Field::optional("started_at", FieldKind::Date),
    ])
}

pub fn missing_schema() -> Schema {
    Schema::new(&[
        Field::required("resident_id", FieldKind::Text),
        Field::optional("event_id", FieldKind::Text),
        Field::optional("last_seen_location", FieldKind::Text),
        Field::optional("description", FieldKind::Text),
    ])
}

pub fn found_schema() -> Schema {
    Schema::new(&[Field::optional("found_at", FieldKind::Date)])
}

fn apply_flags(vulnerability: &mut Vulnerability, input: &Validated) {
    let flags = [
        ("has_senior", &mut vulnerability.has_senior),
        ("has_pwd", &mut vulnerability.has_pwd),
        ("has_infant", &mut vulnerability.has_infant),
        ("has_pregnant", &mut vulnerability.has_pregnant),
        ("has_chronic_illness", &mut vulnerability.has_chronic_illness),
    ];
    for (name, slot) in flags {
        if let Some(value) = input.flag(name) {
            *slot = value;
        }
    }
}

pub struct DisasterService {
    store: Store,
}

impl DisasterService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn create_profile(&self, session: &Session, payload: &Value) -> anyhow::Result<RiskProfile> {
        let actor = authorize(session, Module::Disaster, Action::Create)?;
        let input = profile_schema().check(payload)?;
        let household: Household = self.store.require(&input.require_text("household_id")?)?;

        let mut vulnerability = Vulnerability::default();
        apply_flags(&mut vulnerability, &input);

        let profile = RiskProfile {
            id: utils::new_uuid_to_bech32("risk_")?,
            household_id: household.id.clone(),
            household_number: household.household_number.clone(),
            risk_level: input.require_choice("risk_level")?,
            vulnerability,
            notes: input.text("notes"),
            evacuation: None,
            created_at: TimeStamp::new(),
            created_by: actor.id.clone(),
            updated_at: None,
        };

        self.store
            .insert_unique(PROFILE_INDEX, &household.id, &profile)
            .map_err(|err| match RecordError::classify(&err) {
                Some(RecordError::Conflict(_)) => RecordError::Conflict(format!(
                    "household {} already has a risk profile",
                    household.household_number
                ))
                .into(),
                _ => err,
            })?;
        info!(profile = %profile.id, household = %household.id, actor = %actor.id, "risk profile created");

        Ok(profile)
    }

    pub fn get_profile(&self, session: &Session, id: &str) -> anyhow::Result<RiskProfile> {
        authorize(session, Module::Disaster, Action::View)?;
        self.store.require(id)
    }

    /// `status` is EVACUATED or HOME; `category` is the risk level.
    pub fn list_profiles(
        &self,
        session: &Session,
        query: &ListQuery,
    ) -> anyhow::Result<Listing<RiskProfile>> {
        authorize(session, Module::Disaster, Action::View)?;
        Ok(query.apply(self.store.all()?))
    }

    pub fn update_profile(
        &self,
        session: &Session,
        id: &str,
        payload: &Value,
    ) -> anyhow::Result<RiskProfile> {
        let actor = authorize(session, Module::Disaster, Action::Update)?;
        let input = profile_schema().partial().check(payload)?;
        let stored: RiskProfile = self.store.require(id)?;
        let mut profile = stored.clone();

        if input
            .text("household_id")
            .is_some_and(|household| household != profile.household_id)
        {
            return Err(RecordError::Conflict(
                "a risk profile cannot move to another household".into(),
            )
            .into());
        }
        if let Some(level) = input.choice("risk_level") {
            profile.risk_level = level;
        }
        apply_flags(&mut profile.vulnerability, &input);
        if let Some(notes) = input.text("notes") {
            profile.notes = Some(notes);
        }
        profile.updated_at = Some(TimeStamp::new());

        // compare-and-swap, seats untouched
        self.store.reseat(&stored, &profile, None, None)?;
        info!(profile = %profile.id, actor = %actor.id, "risk profile updated");

        Ok(profile)
    }

    /// Move a household into an active center. Re-evacuating to the same
    /// center changes nothing; a full center is a conflict.
    pub fn evacuate(
        &self,
        session: &Session,
        profile_id: &str,
        center_id: &str,
    ) -> anyhow::Result<RiskProfile> {
        let actor = authorize(session, Module::Disaster, Action::Update)?;
        let profile: RiskProfile = self.store.require(profile_id)?;
        let center: EvacuationCenter = self.store.require(center_id)?;

        if profile.center_id() == Some(center_id) {
            debug!(profile = %profile.id, center = %center.id, "already evacuated here");
            return Ok(profile);
        }
        if !center.active {
            return Err(
                RecordError::Conflict(format!("evacuation center {} is closed", center.name)).into(),
            );
        }

        let mut moved = profile.clone();
        moved.evacuation = Some(Evacuation {
            center_id: center.id.clone(),
            evacuated_at: TimeStamp::new(),
        });
        moved.updated_at = Some(TimeStamp::new());

        self.store
            .reseat(
                &profile,
                &moved,
                profile.center_id(),
                Some((center.id.as_str(), u64::from(center.capacity))),
            )
            .map_err(|err| match RecordError::classify(&err) {
                Some(RecordError::Conflict(_)) if self.is_full(&center) => {
                    RecordError::Conflict(format!("evacuation center {} is full", center.name))
                        .into()
                }
                _ => err,
            })?;
        info!(profile = %moved.id, center = %center.id, actor = %actor.id, "household evacuated");

        Ok(moved)
    }

    fn is_full(&self, center: &EvacuationCenter) -> bool {
        self.store
            .seats(&center.id)
            .is_ok_and(|seated| seated >= u64::from(center.capacity))
    }

    /// Clear the evacuation. A household already home is left as is.
    pub fn return_home(&self, session: &Session, profile_id: &str) -> anyhow::Result<RiskProfile> {
        let actor = authorize(session, Module::Disaster, Action::Update)?;
        let profile: RiskProfile = self.store.require(profile_id)?;

        let Some(evacuation) = &profile.evacuation else {
            debug!(profile = %profile.id, "household already home");
            return Ok(profile);
        };

        let mut home = profile.clone();
        home.evacuation = None;
        home.updated_at = Some(TimeStamp::new());

        self.store
            .reseat(&profile, &home, Some(evacuation.center_id.as_str()), None)?;
        info!(
            profile = %home.id,
            center = %evacuation.center_id,
            actor = %actor.id,
            "household returned home"
        );

        Ok(home)
    }

    pub fn create_center(&self, session: &Session, payload: &Value) -> anyhow::Result<EvacuationCenter> {
        let actor = authorize(session, Module::Disaster, Action::Create)?;
        let input = center_schema().check(payload)?;

        let center = EvacuationCenter {
            id: utils::new_uuid_to_bech32("evac_")?,
            name: input.require_text("name")?,
            location: input.require_text("location")?,
            capacity: input.require_integer("capacity")? as u32,
            active: true,
            created_at: TimeStamp::new(),
        };

        self.store.put(&center)?;
        info!(center = %center.id, capacity = center.capacity, actor = %actor.id, "evacuation center added");

        Ok(center)
    }

    /// Close or reopen a center. Households already inside stay.
    pub fn set_center_active(
        &self,
        session: &Session,
        center_id: &str,
        active: bool,
    ) -> anyhow::Result<EvacuationCenter> {
        let actor = authorize(session, Module::Disaster, Action::Update)?;
        let mut center: EvacuationCenter = self.store.require(center_id)?;
        if center.active != active {
            center.active = active;
            self.store.put(&center)?;
            info!(center = %center.id, active, actor = %actor.id, "evacuation center toggled");
        }
        Ok(center)
    }

    pub fn list_centers(&self, session: &Session) -> anyhow::Result<Vec<EvacuationCenter>> {
        authorize(session, Module::Disaster, Action::View)?;
        let mut centers = self.store.all::<EvacuationCenter>()?;
        centers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(centers)
    }

    pub fn start_event(&self, session: &Session, payload: &Value) -> anyhow::Result<DisasterEvent> {
        let actor = authorize(session, Module::Disaster, Action::Create)?;
        let input = event_schema().check(payload)?;

        let event = DisasterEvent {
            id: utils::new_uuid_to_bech32("event_")?,
            name: input.require_text("name")?,
            event_type: input.require_choice("event_type")?,
            started_at: input.date("started_at").unwrap_or_default(),
            ended_at: None,
            created_by: actor.id.clone(),
        };

        self.store.put(&event)?;
        info!(event = %event.id, kind = %event.event_type, actor = %actor.id, "disaster event started");

        Ok(event)
    }

    pub fn end_event(&self, session: &Session, event_id: &str) -> anyhow::Result<DisasterEvent> {
        let actor = authorize(session, Module::Disaster, Action::Update)?;
        let mut event: DisasterEvent = self.store.require(event_id)?;

        if !event.is_active() {
            return Err(RecordError::Conflict(format!("event {} has already ended", event.name)).into());
        }
        event.ended_at = Some(TimeStamp::new());

        self.store.put(&event)?;
        info!(event = %event.id, actor = %actor.id, "disaster event ended");

        Ok(event)
    }

    pub fn list_events(
        &self,
        session: &Session,
        query: &ListQuery,
    ) -> anyhow::Result<Listing<DisasterEvent>> {
        authorize(session, Module::Disaster, Action::View)?;
        Ok(query.apply(self.store.all()?))
    }

    /// File a missing-person report. A resident has at most one open report.
    pub fn report_missing(
        &self,
        session: &Session,
        payload: &Value,
    ) -> anyhow::Result<MissingPersonReport> {
        let actor = authorize(session, Module::Disaster, Action::Create)?;
        let input = missing_schema().check(payload)?;
        let resident: Resident = self.store.require(&input.require_text("resident_id")?)?;

        let event_id = input.text("event_id");
        if let Some(event) = &event_id {
            self.store.require::<DisasterEvent>(event)?;
        }

        let report = MissingPersonReport {
            id: utils::new_uuid_to_bech32("missing_")?,
            resident_id: resident.id.clone(),
            resident_name: resident.full_name(),
            event_id,
            last_seen_location: input.text("last_seen_location"),
            description: input.text("description"),
            reported_at: TimeStamp::new(),
            reported_by: actor.id.clone(),
            found_at: None,
        };

        self.store
            .insert_unique(MISSING_INDEX, &resident.id, &report)
            .map_err(|err| match RecordError::classify(&err) {
                Some(RecordError::Conflict(_)) => RecordError::Conflict(format!(
                    "{} already has an open missing-person report",
                    resident.full_name()
                ))
                .into(),
                _ => err,
            })?;
        info!(report = %report.id, resident = %resident.id, actor = %actor.id, "missing person reported");

        Ok(report)
    }

    /// Close an open report. The open-report claim on the resident is
    /// released in the same batch, so a new report can be filed later.
    pub fn mark_found(
        &self,
        session: &Session,
        report_id: &str,
        payload: &Value,
    ) -> anyhow::Result<MissingPersonReport> {
        let actor = authorize(session, Module::Disaster, Action::Update)?;
        let input = found_schema().check(payload)?;
        let mut report: MissingPersonReport = self.store.require(report_id)?;

        if !report.is_open() {
            return Err(RecordError::Conflict(format!(
                "{} was already found",
                report.resident_name
            ))
            .into());
        }

        let now = TimeStamp::new();
        report.found_at = Some(input.date("found_at").unwrap_or_else(|| now.clone()));

        let mut batch = Batch::default();
        Store::stage(&mut batch, &report)?;
        Store::stage_release(&mut batch, MISSING_INDEX, &report.resident_id);
        Witness::new(&report.id, &actor.id, now, "OPEN", "FOUND").stage(&mut batch)?;
        self.store.apply(batch)?;

        info!(report = %report.id, resident = %report.resident_id, actor = %actor.id, "missing person found");
        Ok(report)
    }

    /// `status` is OPEN or FOUND.
    pub fn list_missing(
        &self,
        session: &Session,
        query: &ListQuery,
    ) -> anyhow::Result<Listing<MissingPersonReport>> {
        authorize(session, Module::Disaster, Action::View)?;
        Ok(query.apply(self.store.all()?))
    }
}
