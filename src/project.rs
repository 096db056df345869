//! Barangay projects and their progress log
use super::auth::{Action, Module, Session, authorize};
use super::error::{FieldErrors, FieldReason, RecordError};
use super::history::{self, Witness};
use super::lifecycle::{Lifecycle, Transition, plan_transition};
use super::store::{Record, Store};
use super::types::{ListQuery, Listable, Listing, TimeStamp, labelled_enum};
use super::utils;
use super::validate::{Field, FieldKind, Schema};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sled::Batch;
use tracing::{debug, info};

labelled_enum! {
    pub enum ProjectStatus {
        Planned = (0, "PLANNED"),
        Ongoing = (1, "ONGOING"),
        Completed = (2, "COMPLETED"),
        Suspended = (3, "SUSPENDED"),
        Cancelled = (4, "CANCELLED"),
    }
}

impl Lifecycle for ProjectStatus {
    const RECORD: &'static str = "Project";

    fn initial() -> Self {
        ProjectStatus::Planned
    }

    // COMPLETED and CANCELLED do not reopen.
    fn targets(self) -> &'static [Self] {
        use ProjectStatus::*;
        match self {
            Planned => &[Ongoing, Suspended, Cancelled],
            Ongoing => &[Completed, Suspended, Cancelled],
            Suspended => &[Ongoing, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    fn label(self) -> &'static str {
        self.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct Project {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub description: Option<String>,
    #[n(3)]
    pub location: Option<String>,
    #[n(4)]
    pub budget: u64,
    #[n(5)]
    pub funding_source: Option<String>,
    #[n(6)]
    pub status: ProjectStatus,
    #[n(7)]
    pub progress_percent: u8,
    #[n(8)]
    pub start_date: Option<TimeStamp<Utc>>,
    #[n(9)]
    pub target_end_date: Option<TimeStamp<Utc>>,
    #[n(10)]
    pub actual_end_date: Option<TimeStamp<Utc>>,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
    #[n(12)]
    pub created_by: String,
    #[n(13)]
    pub status_changed_at: Option<TimeStamp<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct ProjectUpdate {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub project_id: String,
    #[n(2)]
    pub note: String,
    #[n(3)]
    pub progress_percent: Option<u8>,
    #[n(4)]
    pub created_by: String,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
}

impl Record for Project {
    const KIND: &'static str = "project";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for ProjectUpdate {
    const KIND: &'static str = "project_update";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Listable for Project {
    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
    fn category_label(&self) -> Option<&str> {
        self.funding_source.as_deref()
    }
    fn search_text(&self) -> String {
        format!(
            "{} {}",
            self.name,
            self.location.as_deref().unwrap_or_default()
        )
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
}

const PROGRESS: FieldKind = FieldKind::Integer { min: 0, max: 100 };

pub fn project_schema() -> Schema {
    Schema::new(&[
        Field::required("name", FieldKind::Text),
        Field::optional("description", FieldKind::Text),
        Field::optional("location", FieldKind::Text),
        Field::required("budget", FieldKind::MONEY),
        Field::optional("funding_source", FieldKind::Text),
        Field::optional("progress_percent", PROGRESS),
        Field::optional("start_date", FieldKind::Date),
        Field::optional("target_end_date", FieldKind::Date),
    ])
}

pub fn update_schema() -> Schema {
    Schema::new(&[
        Field::required("note", FieldKind::Text),
        Field::optional("progress_percent", PROGRESS),
    ])
}

pub fn transition_schema() -> Schema {
    Schema::new(&[
        Field::required("status", FieldKind::Choice(ProjectStatus::LABELS)),
        Field::optional("actual_end_date", FieldKind::Date),
    ])
}

fn check_dates(
    start: Option<&TimeStamp<Utc>>,
    target_end: Option<&TimeStamp<Utc>>,
) -> anyhow::Result<()> {
    let Some((start, end)) = start.zip(target_end) else {
        return Ok(());
    };
    if end < start {
        return Err(RecordError::ValidationFailed(FieldErrors::single(
            "target_end_date",
            FieldReason::OutOfRange,
        ))
        .into());
    }
    Ok(())
}

pub struct ProjectService {
    store: Store,
}

impl ProjectService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn create(&self, session: &Session, payload: &Value) -> anyhow::Result<Project> {
        let actor = authorize(session, Module::Projects, Action::Create)?;
        let input = project_schema().check(payload)?;

        let start_date = input.date("start_date");
        let target_end_date = input.date("target_end_date");
        check_dates(start_date.as_ref(), target_end_date.as_ref())?;

        let project = Project {
            id: utils::new_uuid_to_bech32("proj_")?,
            name: input.require_text("name")?,
            description: input.text("description"),
            location: input.text("location"),
            budget: input.require_amount("budget")?,
            funding_source: input.text("funding_source"),
            status: ProjectStatus::initial(),
            progress_percent: input.integer("progress_percent").unwrap_or(0) as u8,
            start_date,
            target_end_date,
            actual_end_date: None,
            created_at: TimeStamp::new(),
            created_by: actor.id.clone(),
            status_changed_at: None,
        };

        self.store.put(&project)?;
        info!(project = %project.id, actor = %actor.id, "project created");

        Ok(project)
    }

    pub fn get(&self, session: &Session, id: &str) -> anyhow::Result<Project> {
        authorize(session, Module::Projects, Action::View)?;
        self.store.require(id)
    }

    pub fn list(&self, session: &Session, query: &ListQuery) -> anyhow::Result<Listing<Project>> {
        authorize(session, Module::Projects, Action::View)?;
        Ok(query.apply(self.store.all()?))
    }

    /// Edit descriptive fields. Status only moves through [`ProjectService::transition`].
    pub fn update_fields(
        &self,
        session: &Session,
        id: &str,
        payload: &Value,
    ) -> anyhow::Result<Project> {
        let actor = authorize(session, Module::Projects, Action::Update)?;
        let input = project_schema().partial().check(payload)?;
        let mut project: Project = self.store.require(id)?;

        if let Some(name) = input.text("name") {
            project.name = name;
        }
        if let Some(description) = input.text("description") {
            project.description = Some(description);
        }
        if let Some(location) = input.text("location") {
            project.location = Some(location);
        }
        if let Some(budget) = input.amount("budget") {
            project.budget = budget;
        }
        if let Some(source) = input.text("funding_source") {
            project.funding_source = Some(source);
        }
        if let Some(progress) = input.integer("progress_percent") {
            project.progress_percent = progress as u8;
        }
        if let Some(start) = input.date("start_date") {
            project.start_date = Some(start);
        }
        if let Some(end) = input.date("target_end_date") {
            project.target_end_date = Some(end);
        }
        check_dates(project.start_date.as_ref(), project.target_end_date.as_ref())?;

        self.store.put(&project)?;
        info!(project = %project.id, actor = %actor.id, "project updated");

        Ok(project)
    }

    /// Append a progress note. A supplied percentage is written to the
    /// project in the same batch.
    pub fn post_update(
        &self,
        session: &Session,
        id: &str,
        payload: &Value,
    ) -> anyhow::Result<(Project, ProjectUpdate)> {
        let actor = authorize(session, Module::Projects, Action::Update)?;
        let input = update_schema().check(payload)?;
        let mut project: Project = self.store.require(id)?;

        if project.status.is_terminal() {
            return Err(RecordError::Conflict(format!(
                "project {} is {} and takes no updates",
                project.name, project.status
            ))
            .into());
        }

        let progress = input.integer("progress_percent").map(|p| p as u8);
        let update = ProjectUpdate {
            id: utils::new_uuid_to_bech32("pupd_")?,
            project_id: project.id.clone(),
            note: input.require_text("note")?,
            progress_percent: progress,
            created_by: actor.id.clone(),
            created_at: TimeStamp::new(),
        };

        let mut batch = Batch::default();
        Store::stage(&mut batch, &update)?;
        if let Some(progress) = progress {
            project.progress_percent = progress;
            Store::stage(&mut batch, &project)?;
        }
        self.store.apply(batch)?;

        info!(
            project = %project.id,
            progress = project.progress_percent,
            actor = %actor.id,
            "project update posted"
        );

        Ok((project, update))
    }

    /// Progress log, oldest first.
    pub fn updates(&self, session: &Session, id: &str) -> anyhow::Result<Vec<ProjectUpdate>> {
        authorize(session, Module::Projects, Action::View)?;
        self.store.require::<Project>(id)?;

        let mut updates: Vec<ProjectUpdate> = self
            .store
            .all::<ProjectUpdate>()?
            .into_iter()
            .filter(|u| u.project_id == id)
            .collect();
        updates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(updates)
    }

    /// COMPLETED stamps `actual_end_date` with the supplied date or now. Without
    /// an explicit date the project is also marked 100% done.
    pub fn transition(
        &self,
        session: &Session,
        id: &str,
        payload: &Value,
    ) -> anyhow::Result<Project> {
        let actor = authorize(session, Module::Projects, Action::Update)?;
        let input = transition_schema().check(payload)?;
        let mut project: Project = self.store.require(id)?;

        let target: ProjectStatus = input.require_choice("status")?;
        let (from, to) = match plan_transition(project.status, target)? {
            Transition::Unchanged(status) => {
                debug!(project = %project.id, status = %status, "status unchanged");
                return Ok(project);
            }
            Transition::Advance { from, to } => (from, to),
        };

        let now = TimeStamp::new();
        if to == ProjectStatus::Completed {
            match input.date("actual_end_date") {
                Some(date) => project.actual_end_date = Some(date),
                None => {
                    project.actual_end_date = Some(now.clone());
                    project.progress_percent = 100;
                }
            }
        }
        project.status = to;
        project.status_changed_at = Some(now.clone());

        let mut batch = Batch::default();
        Store::stage(&mut batch, &project)?;
        Witness::new(&project.id, &actor.id, now, from.as_str(), to.as_str()).stage(&mut batch)?;
        self.store.apply(batch)?;

        info!(project = %project.id, from = %from, to = %to, actor = %actor.id, "project status changed");
        Ok(project)
    }

    pub fn history(&self, session: &Session, id: &str) -> anyhow::Result<Vec<Witness>> {
        authorize(session, Module::Projects, Action::View)?;
        self.store.require::<Project>(id)?;
        history::history(&self.store, id)
    }
}
