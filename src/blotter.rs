//! Blotter: dispute and incident cases with mediation hearings
use super::auth::{Action, Module, Session, authorize};
use super::error::{FieldErrors, FieldReason, RecordError};
use super::history::{self, Witness};
use super::lifecycle::{Lifecycle, Transition, plan_transition};
use super::sequence::SequenceGenerator;
use super::store::{Record, Store};
use super::types::{ListQuery, Listable, Listing, TimeStamp, labelled_enum};
use super::utils;
use super::validate::{Field, FieldKind, Schema};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sled::Batch;
use tracing::{debug, info};

pub const BLOTTER_PREFIX: &str = "BLT";

labelled_enum! {
    pub enum CaseStatus {
        Filed = (0, "FILED"),
        UnderMediation = (1, "UNDER_MEDIATION"),
        Settled = (2, "SETTLED"),
        Escalated = (3, "ESCALATED"),
        Closed = (4, "CLOSED"),
        Withdrawn = (5, "WITHDRAWN"),
    }
}

impl CaseStatus {
    /// Statuses that close the case and therefore need a written resolution.
    pub fn resolves(&self) -> bool {
        matches!(self, CaseStatus::Settled | CaseStatus::Closed)
    }
}

impl Lifecycle for CaseStatus {
    const RECORD: &'static str = "Blotter case";

    fn initial() -> Self {
        CaseStatus::Filed
    }

    fn targets(self) -> &'static [Self] {
        use CaseStatus::*;
        match self {
            Filed => &[UnderMediation, Settled, Escalated, Closed, Withdrawn],
            UnderMediation => &[Settled, Escalated, Closed, Withdrawn],
            Escalated => &[Closed],
            Settled | Closed | Withdrawn => &[],
        }
    }

    fn label(self) -> &'static str {
        self.as_str()
    }
}

labelled_enum! {
    pub enum IncidentType {
        Dispute = (0, "DISPUTE"),
        Theft = (1, "THEFT"),
        PhysicalInjury = (2, "PHYSICAL_INJURY"),
        Threat = (3, "THREAT"),
        Trespass = (4, "TRESPASS"),
        DomesticConflict = (5, "DOMESTIC_CONFLICT"),
        PropertyDamage = (6, "PROPERTY_DAMAGE"),
        Noise = (7, "NOISE"),
        Other = (8, "OTHER"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct BlotterCase {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub case_number: String,
    #[n(2)]
    pub complainant: String,
    #[n(3)]
    pub respondent: String,
    #[n(4)]
    pub incident_type: IncidentType,
    #[n(5)]
    pub incident_date: TimeStamp<Utc>,
    #[n(6)]
    pub incident_location: String,
    #[n(7)]
    pub narrative: String,
    #[n(8)]
    pub status: CaseStatus,
    #[n(9)]
    pub resolution: Option<String>,
    #[n(10)]
    pub created_at: TimeStamp<Utc>,
    #[n(11)]
    pub created_by: String,
    #[n(12)]
    pub status_changed_at: Option<TimeStamp<Utc>>,
    #[n(13)]
    pub resolved_at: Option<TimeStamp<Utc>>,
    #[n(14)]
    pub resolved_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct Hearing {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub case_id: String,
    #[n(2)]
    pub scheduled_at: TimeStamp<Utc>,
    #[n(3)]
    pub venue: Option<String>,
    #[n(4)]
    pub notes: Option<String>,
    #[n(5)]
    pub created_by: String,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
}

impl Record for BlotterCase {
    const KIND: &'static str = "blotter";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Hearing {
    const KIND: &'static str = "hearing";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Listable for BlotterCase {
    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
    fn category_label(&self) -> Option<&str> {
        Some(self.incident_type.as_str())
    }
    fn search_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.case_number, self.complainant, self.respondent, self.incident_location
        )
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
}

pub fn case_schema() -> Schema {
    Schema::new(&[
        Field::required("complainant", FieldKind::Text),
        Field::required("respondent", FieldKind::Text),
        Field::required("incident_type", FieldKind::Choice(IncidentType::LABELS)),
        Field::required("incident_date", FieldKind::Date),
        Field::required("incident_location", FieldKind::Text),
        Field::required("narrative", FieldKind::Text),
    ])
}

pub fn hearing_schema() -> Schema {
    Schema::new(&[
        Field::required("scheduled_at", FieldKind::Date),
        Field::optional("venue", FieldKind::Text),
        Field::optional("notes", FieldKind::Text),
    ])
}

pub fn transition_schema() -> Schema {
    Schema::new(&[
        Field::required("status", FieldKind::Choice(CaseStatus::LABELS)),
        Field::optional("resolution", FieldKind::Text),
    ])
}

pub struct BlotterService {
    store: Store,
    sequence: SequenceGenerator,
}

impl BlotterService {
    pub fn new(store: Store) -> Self {
        Self {
            sequence: SequenceGenerator::new(store.clone()),
            store,
        }
    }

    pub fn file(&self, session: &Session, payload: &Value) -> anyhow::Result<BlotterCase> {
        let actor = authorize(session, Module::Blotter, Action::Create)?;
        let input = case_schema().check(payload)?;

        let created_at = TimeStamp::new();
        let case = BlotterCase {
            id: utils::new_uuid_to_bech32("case_")?,
            case_number: self.sequence.next(BLOTTER_PREFIX, created_at.year())?,
            complainant: input.require_text("complainant")?,
            respondent: input.require_text("respondent")?,
            incident_type: input.require_choice("incident_type")?,
            incident_date: input.require_date("incident_date")?,
            incident_location: input.require_text("incident_location")?,
            narrative: input.require_text("narrative")?,
            status: CaseStatus::initial(),
            resolution: None,
            created_at,
            created_by: actor.id.clone(),
            status_changed_at: None,
            resolved_at: None,
            resolved_by: None,
        };

        self.store.put(&case)?;
        info!(case = %case.id, case_number = %case.case_number, actor = %actor.id, "blotter case filed");

        Ok(case)
    }

    pub fn get(&self, session: &Session, id: &str) -> anyhow::Result<BlotterCase> {
        authorize(session, Module::Blotter, Action::View)?;
        self.store.require(id)
    }

    pub fn list(&self, session: &Session, query: &ListQuery) -> anyhow::Result<Listing<BlotterCase>> {
        authorize(session, Module::Blotter, Action::View)?;
        Ok(query.apply(self.store.all()?))
    }

    /// Schedule a hearing. The first one moves a FILED case to
    /// UNDER_MEDIATION; the hearing row and the status change are written in
    /// one batch. Later hearings leave the status alone.
    pub fn schedule_hearing(
        &self,
        session: &Session,
        case_id: &str,
        payload: &Value,
    ) -> anyhow::Result<(BlotterCase, Hearing)> {
        let actor = authorize(session, Module::Blotter, Action::Update)?;
        let input = hearing_schema().check(payload)?;
        let mut case: BlotterCase = self.store.require(case_id)?;

        if case.status.is_terminal() || case.status == CaseStatus::Escalated {
            return Err(RecordError::Conflict(format!(
                "case {} is {} and takes no hearings",
                case.case_number, case.status
            ))
            .into());
        }

        let now = TimeStamp::new();
        let hearing = Hearing {
            id: utils::new_uuid_to_bech32("hearing_")?,
            case_id: case.id.clone(),
            scheduled_at: input.require_date("scheduled_at")?,
            venue: input.text("venue"),
            notes: input.text("notes"),
            created_by: actor.id.clone(),
            created_at: now.clone(),
        };

        let mut batch = Batch::default();
        Store::stage(&mut batch, &hearing)?;
        if case.status == CaseStatus::Filed {
            case.status = CaseStatus::UnderMediation;
            case.status_changed_at = Some(now.clone());
            Store::stage(&mut batch, &case)?;
            Witness::new(
                &case.id,
                &actor.id,
                now,
                CaseStatus::Filed.as_str(),
                CaseStatus::UnderMediation.as_str(),
            )
            .with_note(Some("first hearing scheduled".into()))
            .stage(&mut batch)?;
        }
        self.store.apply(batch)?;

        info!(
            case = %case.id,
            hearing = %hearing.id,
            status = %case.status,
            actor = %actor.id,
            "hearing scheduled"
        );

        Ok((case, hearing))
    }

    /// Hearings of a case in schedule order.
    pub fn hearings(&self, session: &Session, case_id: &str) -> anyhow::Result<Vec<Hearing>> {
        authorize(session, Module::Blotter, Action::View)?;
        self.store.require::<BlotterCase>(case_id)?;

        let mut hearings: Vec<Hearing> = self
            .store
            .all::<Hearing>()?
            .into_iter()
            .filter(|h| h.case_id == case_id)
            .collect();
        hearings.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        Ok(hearings)
    }

    /// SETTLED and CLOSED need a resolution and record who resolved the case.
    pub fn transition(
        &self,
        session: &Session,
        id: &str,
        payload: &Value,
    ) -> anyhow::Result<BlotterCase> {
        let actor = authorize(session, Module::Blotter, Action::Update)?;
        let input = transition_schema().check(payload)?;
        let mut case: BlotterCase = self.store.require(id)?;

        let target: CaseStatus = input.require_choice("status")?;
        let (from, to) = match plan_transition(case.status, target)? {
            Transition::Unchanged(status) => {
                debug!(case = %case.id, status = %status, "status unchanged");
                return Ok(case);
            }
            Transition::Advance { from, to } => (from, to),
        };

        let resolution = input.text("resolution");
        let now = TimeStamp::new();
        if to.resolves() {
            let Some(text) = resolution.clone() else {
                return Err(RecordError::ValidationFailed(FieldErrors::single(
                    "resolution",
                    FieldReason::Required,
                ))
                .into());
            };
            case.resolution = Some(text);
            case.resolved_at = Some(now.clone());
            case.resolved_by = Some(actor.id.clone());
        } else if resolution.is_some() {
            case.resolution = resolution.clone();
        }
        case.status = to;
        case.status_changed_at = Some(now.clone());

        let mut batch = Batch::default();
        Store::stage(&mut batch, &case)?;
        Witness::new(&case.id, &actor.id, now, from.as_str(), to.as_str())
            .with_note(resolution)
            .stage(&mut batch)?;
        self.store.apply(batch)?;

        info!(
            case = %case.id,
            case_number = %case.case_number,
            from = %from,
            to = %to,
            actor = %actor.id,
            "blotter status changed"
        );

        Ok(case)
    }

    pub fn history(&self, session: &Session, id: &str) -> anyhow::Result<Vec<Witness>> {
        authorize(session, Module::Blotter, Action::View)?;
        self.store.require::<BlotterCase>(id)?;
        history::history(&self.store, id)
    }
}
