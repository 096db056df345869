//! Household registry
use super::auth::{Action, Module, Session, authorize};
use super::disaster::PROFILE_INDEX;
use super::error::RecordError;
use super::resident::Resident;
use super::sequence::SequenceGenerator;
use super::store::{Record, Store};
use super::types::{ListQuery, Listable, Listing, TimeStamp, labelled_enum};
use super::utils;
use super::validate::{Field, FieldKind, Schema};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

pub const HOUSEHOLD_PREFIX: &str = "HH";

labelled_enum! {
    pub enum HouseholdStatus {
        Active = (0, "ACTIVE"),
        Inactive = (1, "INACTIVE"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct Household {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub household_number: String, // HH-YYYY-NNNNNN
    #[n(2)]
    pub head_resident_id: Option<String>,
    #[n(3)]
    pub address: String,
    #[n(4)]
    pub purok: String,
    #[n(5)]
    pub is_four_ps: bool,
    #[n(6)]
    pub monthly_income: u64, // centavos
    #[n(7)]
    pub status: HouseholdStatus,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    #[n(9)]
    pub created_by: String,
    #[n(10)]
    pub updated_at: Option<TimeStamp<Utc>>,
}

impl Record for Household {
    const KIND: &'static str = "household";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Listable for Household {
    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
    fn category_label(&self) -> Option<&str> {
        Some(&self.purok)
    }
    fn search_text(&self) -> String {
        format!("{} {} {}", self.household_number, self.address, self.purok)
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
}

pub fn household_schema() -> Schema {
    Schema::new(&[
        Field::optional("head_resident_id", FieldKind::Text),
        Field::required("address", FieldKind::Text),
        Field::required("purok", FieldKind::Text),
        Field::optional("is_four_ps", FieldKind::Flag),
        Field::optional("monthly_income", FieldKind::MONEY),
    ])
}

pub struct HouseholdService {
    store: Store,
    sequence: SequenceGenerator,
}

impl HouseholdService {
    pub fn new(store: Store) -> Self {
        Self {
            sequence: SequenceGenerator::new(store.clone()),
            store,
        }
    }

    pub fn create(&self, session: &Session, payload: &Value) -> anyhow::Result<Household> {
        let actor = authorize(session, Module::Households, Action::Create)?;
        let input = household_schema().check(payload)?;

        let head_resident_id = input.text("head_resident_id");
        if let Some(head) = &head_resident_id {
            self.store.require::<Resident>(head)?;
        }

        let created_at = TimeStamp::new();
        let household = Household {
            id: utils::new_uuid_to_bech32("hh_")?,
            household_number: self.sequence.next(HOUSEHOLD_PREFIX, created_at.year())?,
            head_resident_id,
            address: input.require_text("address")?,
            purok: input.require_text("purok")?,
            is_four_ps: input.flag("is_four_ps").unwrap_or(false),
            monthly_income: input.amount("monthly_income").unwrap_or(0),
            status: HouseholdStatus::Active,
            created_at,
            created_by: actor.id.clone(),
            updated_at: None,
        };

        self.store.put(&household)?;
        info!(
            household = %household.id,
            number = %household.household_number,
            actor = %actor.id,
            "household created"
        );

        Ok(household)
    }

    pub fn get(&self, session: &Session, id: &str) -> anyhow::Result<Household> {
        authorize(session, Module::Households, Action::View)?;
        self.store.require(id)
    }

    pub fn list(&self, session: &Session, query: &ListQuery) -> anyhow::Result<Listing<Household>> {
        authorize(session, Module::Households, Action::View)?;
        Ok(query.apply(self.store.all()?))
    }

    /// Active residents living in the household.
    pub fn members(&self, session: &Session, id: &str) -> anyhow::Result<Vec<Resident>> {
        authorize(session, Module::Households, Action::View)?;
        self.store.require::<Household>(id)?;
        active_members(&self.store, id)
    }

    pub fn update(&self, session: &Session, id: &str, payload: &Value) -> anyhow::Result<Household> {
        let actor = authorize(session, Module::Households, Action::Update)?;
        let input = household_schema().partial().check(payload)?;
        let mut household: Household = self.store.require(id)?;

        if let Some(head) = input.text("head_resident_id") {
            self.store.require::<Resident>(&head)?;
            household.head_resident_id = Some(head);
        }
        if let Some(address) = input.text("address") {
            household.address = address;
        }
        if let Some(purok) = input.text("purok") {
            household.purok = purok;
        }
        if let Some(flag) = input.flag("is_four_ps") {
            household.is_four_ps = flag;
        }
        if let Some(income) = input.amount("monthly_income") {
            household.monthly_income = income;
        }
        household.updated_at = Some(TimeStamp::new());

        self.store.put(&household)?;
        info!(household = %household.id, actor = %actor.id, "household updated");

        Ok(household)
    }

    fn ensure_no_dependents(&self, household: &Household) -> anyhow::Result<()> {
        let members = active_members(&self.store, &household.id)?.len();
        if members > 0 {
            return Err(RecordError::DependencyBlocked(format!(
                "household {} still has {members} active resident(s)",
                household.household_number
            ))
            .into());
        }
        Ok(())
    }

    /// Soft delete. Refused while active residents reference the household.
    pub fn deactivate(&self, session: &Session, id: &str) -> anyhow::Result<Household> {
        let actor = authorize(session, Module::Households, Action::Update)?;
        let mut household: Household = self.store.require(id)?;
        if household.status == HouseholdStatus::Inactive {
            return Ok(household);
        }
        self.ensure_no_dependents(&household)?;

        household.status = HouseholdStatus::Inactive;
        household.updated_at = Some(TimeStamp::new());
        self.store.put(&household)?;
        info!(household = %household.id, actor = %actor.id, "household deactivated");

        Ok(household)
    }

    /// Hard delete, SUPER_ADMIN only. Refused while active residents or a
    /// risk profile reference the household.
    pub fn delete(&self, session: &Session, id: &str) -> anyhow::Result<()> {
        let actor = authorize(session, Module::Households, Action::Delete)?;
        let household: Household = self.store.require(id)?;
        self.ensure_no_dependents(&household)?;

        if self.store.unique_owner(PROFILE_INDEX, id)?.is_some() {
            return Err(RecordError::DependencyBlocked(format!(
                "household {} has a disaster risk profile",
                household.household_number
            ))
            .into());
        }

        self.store.remove::<Household>(id)?;
        info!(household = %id, actor = %actor.id, "household deleted");
        Ok(())
    }
}

pub(crate) fn active_members(store: &Store, household_id: &str) -> anyhow::Result<Vec<Resident>> {
    Ok(store
        .all::<Resident>()?
        .into_iter()
        .filter(|r| r.is_active() && r.household_id.as_deref() == Some(household_id))
        .collect())
}
