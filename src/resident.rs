//! Resident registry
use super::auth::{Action, Module, Session, authorize};
use super::disaster::MISSING_INDEX;
use super::document::DocumentRequest;
use super::error::{FieldErrors, FieldReason, RecordError};
use super::health::HealthRecord;
use super::household::{Household, HouseholdStatus};
use super::lifecycle::Lifecycle;
use super::store::{Record, Store};
use super::types::{ListQuery, Listable, Listing, TimeStamp, labelled_enum};
use super::utils;
use super::validate::{Field, FieldKind, Schema, Validated};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

pub const SENIOR_AGE: u32 = 60;

labelled_enum! {
    pub enum Sex {
        Male = (0, "MALE"),
        Female = (1, "FEMALE"),
    }
}

labelled_enum! {
    pub enum CivilStatus {
        Single = (0, "SINGLE"),
        Married = (1, "MARRIED"),
        Widowed = (2, "WIDOWED"),
        Separated = (3, "SEPARATED"),
        Divorced = (4, "DIVORCED"),
    }
}

labelled_enum! {
    pub enum Education {
        NoFormalSchooling = (0, "NONE"),
        Elementary = (1, "ELEMENTARY"),
        HighSchool = (2, "HIGH_SCHOOL"),
        Vocational = (3, "VOCATIONAL"),
        College = (4, "COLLEGE"),
        Postgraduate = (5, "POSTGRADUATE"),
    }
}

labelled_enum! {
    pub enum Employment {
        Employed = (0, "EMPLOYED"),
        SelfEmployed = (1, "SELF_EMPLOYED"),
        Unemployed = (2, "UNEMPLOYED"),
        Student = (3, "STUDENT"),
        Retired = (4, "RETIRED"),
    }
}

labelled_enum! {
    pub enum ResidentStatus {
        Active = (0, "ACTIVE"),
        Inactive = (1, "INACTIVE"),
        Deceased = (2, "DECEASED"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct Resident {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub household_id: Option<String>,
    #[n(2)]
    pub first_name: String,
    #[n(3)]
    pub middle_name: Option<String>,
    #[n(4)]
    pub last_name: String,
    #[n(5)]
    pub suffix: Option<String>,
    #[n(6)]
    pub sex: Sex,
    #[n(7)]
    pub birth_date: TimeStamp<Utc>,
    #[n(8)]
    pub civil_status: CivilStatus,
    #[n(9)]
    pub purok: String,
    #[n(10)]
    pub education: Education,
    #[n(11)]
    pub employment: Employment,
    #[n(12)]
    pub occupation: Option<String>,
    #[n(13)]
    pub is_voter: bool,
    #[n(14)]
    pub is_pwd: bool,
    #[n(15)]
    pub is_solo_parent: bool,
    #[n(16)]
    pub is_four_ps: bool,
    #[n(17)]
    pub is_ofw: bool,
    #[n(18)]
    pub status: ResidentStatus,
    #[n(19)]
    pub created_at: TimeStamp<Utc>,
    #[n(20)]
    pub created_by: String,
    #[n(21)]
    pub updated_at: Option<TimeStamp<Utc>>,
}

impl Record for Resident {
    const KIND: &'static str = "resident";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Listable for Resident {
    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
    fn category_label(&self) -> Option<&str> {
        Some(&self.purok)
    }
    fn search_text(&self) -> String {
        format!("{} {}", self.full_name(), self.purok)
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
}

impl Resident {
    pub fn full_name(&self) -> String {
        let mut parts = vec![self.first_name.as_str()];
        if let Some(middle) = &self.middle_name {
            parts.push(middle);
        }
        parts.push(&self.last_name);
        if let Some(suffix) = &self.suffix {
            parts.push(suffix);
        }
        parts.join(" ")
    }

    /// Whole years of age on `date`.
    pub fn age_on(&self, date: NaiveDate) -> u32 {
        date.years_since(self.birth_date.date_naive()).unwrap_or(0)
    }

    pub fn is_senior_on(&self, date: NaiveDate) -> bool {
        self.age_on(date) >= SENIOR_AGE
    }

    pub fn is_active(&self) -> bool {
        self.status == ResidentStatus::Active
    }
}

pub fn resident_schema() -> Schema {
    Schema::new(&[
        Field::optional("household_id", FieldKind::Text),
        Field::required("first_name", FieldKind::Text),
        Field::optional("middle_name", FieldKind::Text),
        Field::required("last_name", FieldKind::Text),
        Field::optional("suffix", FieldKind::Text),
        Field::required("sex", FieldKind::Choice(Sex::LABELS)),
        Field::required("birth_date", FieldKind::Date),
        Field::required("civil_status", FieldKind::Choice(CivilStatus::LABELS)),
        Field::required("purok", FieldKind::Text),
        Field::optional("education", FieldKind::Choice(Education::LABELS)),
        Field::optional("employment", FieldKind::Choice(Employment::LABELS)),
        Field::optional("occupation", FieldKind::Text),
        Field::optional("is_voter", FieldKind::Flag),
        Field::optional("is_pwd", FieldKind::Flag),
        Field::optional("is_solo_parent", FieldKind::Flag),
        Field::optional("is_four_ps", FieldKind::Flag),
        Field::optional("is_ofw", FieldKind::Flag),
    ])
}

// A birth date after today is rejected like any other field error.
fn check_birth_date(birth_date: &TimeStamp<Utc>) -> anyhow::Result<()> {
    if birth_date > &TimeStamp::new() {
        return Err(RecordError::ValidationFailed(FieldErrors::single(
            "birth_date",
            FieldReason::OutOfRange,
        ))
        .into());
    }
    Ok(())
}

pub struct ResidentService {
    store: Store,
}

impl ResidentService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Households accept new members only while active.
    fn require_open_household(&self, household_id: &str) -> anyhow::Result<()> {
        let household = self.store.require::<Household>(household_id)?;
        if household.status != HouseholdStatus::Active {
            return Err(RecordError::Conflict(format!(
                "household {} is inactive",
                household.household_number
            ))
            .into());
        }
        Ok(())
    }

    pub fn register(&self, session: &Session, payload: &Value) -> anyhow::Result<Resident> {
        let actor = authorize(session, Module::Residents, Action::Create)?;
        let input = resident_schema().check(payload)?;

        let birth_date = input.require_date("birth_date")?;
        check_birth_date(&birth_date)?;
        let household_id = input.text("household_id");
        if let Some(household_id) = &household_id {
            self.require_open_household(household_id)?;
        }

        let resident = Resident {
            id: utils::new_uuid_to_bech32("res_")?,
            household_id,
            first_name: input.require_text("first_name")?,
            middle_name: input.text("middle_name"),
            last_name: input.require_text("last_name")?,
            suffix: input.text("suffix"),
            sex: input.require_choice("sex")?,
            birth_date,
            civil_status: input.require_choice("civil_status")?,
            purok: input.require_text("purok")?,
            education: input
                .choice("education")
                .unwrap_or(Education::NoFormalSchooling),
            employment: input.choice("employment").unwrap_or(Employment::Unemployed),
            occupation: input.text("occupation"),
            is_voter: input.flag("is_voter").unwrap_or(false),
            is_pwd: input.flag("is_pwd").unwrap_or(false),
            is_solo_parent: input.flag("is_solo_parent").unwrap_or(false),
            is_four_ps: input.flag("is_four_ps").unwrap_or(false),
            is_ofw: input.flag("is_ofw").unwrap_or(false),
            status: ResidentStatus::Active,
            created_at: TimeStamp::new(),
            created_by: actor.id.clone(),
            updated_at: None,
        };

        self.store.put(&resident)?;
        info!(resident = %resident.id, actor = %actor.id, "resident registered");

        Ok(resident)
    }

    pub fn get(&self, session: &Session, id: &str) -> anyhow::Result<Resident> {
        authorize(session, Module::Residents, Action::View)?;
        self.store.require(id)
    }

    pub fn list(&self, session: &Session, query: &ListQuery) -> anyhow::Result<Listing<Resident>> {
        authorize(session, Module::Residents, Action::View)?;
        Ok(query.apply(self.store.all()?))
    }

    pub fn update(&self, session: &Session, id: &str, payload: &Value) -> anyhow::Result<Resident> {
        let actor = authorize(session, Module::Residents, Action::Update)?;
        let input = resident_schema().partial().check(payload)?;
        let mut resident: Resident = self.store.require(id)?;

        if let Some(household_id) = input.text("household_id") {
            if resident.household_id.as_deref() != Some(household_id.as_str()) {
                self.require_open_household(&household_id)?;
            }
            resident.household_id = Some(household_id);
        }
        if let Some(birth_date) = input.date("birth_date") {
            check_birth_date(&birth_date)?;
            resident.birth_date = birth_date;
        }
        apply_fields(&mut resident, &input);
        resident.updated_at = Some(TimeStamp::new());

        self.store.put(&resident)?;
        info!(resident = %resident.id, actor = %actor.id, "resident updated");

        Ok(resident)
    }

    /// Soft delete. The row stays for history and reports skip it.
    pub fn deactivate(&self, session: &Session, id: &str) -> anyhow::Result<Resident> {
        let actor = authorize(session, Module::Residents, Action::Update)?;
        let mut resident: Resident = self.store.require(id)?;
        if resident.status == ResidentStatus::Inactive {
            return Ok(resident);
        }

        resident.status = ResidentStatus::Inactive;
        resident.updated_at = Some(TimeStamp::new());
        self.store.put(&resident)?;
        info!(resident = %resident.id, actor = %actor.id, "resident deactivated");

        Ok(resident)
    }

    fn blocking_dependent(&self, id: &str) -> anyhow::Result<Option<&'static str>> {
        let headed = self.store.count::<Household>(|h| {
            h.status == HouseholdStatus::Active && h.head_resident_id.as_deref() == Some(id)
        })?;
        if headed > 0 {
            return Ok(Some("heads an active household"));
        }
        if self.store.unique_owner(MISSING_INDEX, id)?.is_some() {
            return Ok(Some("has an open missing person report"));
        }
        let pending = self
            .store
            .count::<DocumentRequest>(|d| d.resident_id == id && !d.status.is_terminal())?;
        if pending > 0 {
            return Ok(Some("has document requests in progress"));
        }
        if self.store.count::<HealthRecord>(|h| h.resident_id == id)? > 0 {
            return Ok(Some("has health records"));
        }
        Ok(None)
    }

    /// Hard delete, SUPER_ADMIN only. Refused while anything live still
    /// points at the resident.
    pub fn delete(&self, session: &Session, id: &str) -> anyhow::Result<()> {
        let actor = authorize(session, Module::Residents, Action::Delete)?;
        let resident: Resident = self.store.require(id)?;

        if let Some(dependent) = self.blocking_dependent(id)? {
            return Err(RecordError::DependencyBlocked(format!(
                "{} {dependent}",
                resident.full_name()
            ))
            .into());
        }

        self.store.remove::<Resident>(id)?;
        info!(resident = %id, actor = %actor.id, "resident deleted");
        Ok(())
    }
}

fn apply_fields(resident: &mut Resident, input: &Validated) {
    if let Some(v) = input.text("first_name") {
        resident.first_name = v;
    }
    if let Some(v) = input.text("middle_name") {
        resident.middle_name = Some(v);
    }
    if let Some(v) = input.text("last_name") {
        resident.last_name = v;
    }
    if let Some(v) = input.text("suffix") {
        resident.suffix = Some(v);
    }
    if let Some(v) = input.choice("sex") {
        resident.sex = v;
    }
    if let Some(v) = input.choice("civil_status") {
        resident.civil_status = v;
    }
    if let Some(v) = input.text("purok") {
        resident.purok = v;
    }
    if let Some(v) = input.choice("education") {
        resident.education = v;
    }
    if let Some(v) = input.choice("employment") {
        resident.employment = v;
    }
    if let Some(v) = input.text("occupation") {
        resident.occupation = Some(v);
    }
    if let Some(v) = input.flag("is_voter") {
        resident.is_voter = v;
    }
    if let Some(v) = input.flag("is_pwd") {
        resident.is_pwd = v;
    }
    if let Some(v) = input.flag("is_solo_parent") {
        resident.is_solo_parent = v;
    }
    if let Some(v) = input.flag("is_four_ps") {
        resident.is_four_ps = v;
    }
    if let Some(v) = input.flag("is_ofw") {
        resident.is_ofw = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resident_born(year: i32, month: u32, day: u32) -> Resident {
        Resident {
            id: "res_1".into(),
            household_id: None,
            first_name: "Jose".into(),
            middle_name: Some("Protacio".into()),
            last_name: "Rizal".into(),
            suffix: None,
            sex: Sex::Male,
            birth_date: TimeStamp::new_with(year, month, day, 0, 0, 0),
            civil_status: CivilStatus::Single,
            purok: "Purok 1".into(),
            education: Education::College,
            employment: Employment::Employed,
            occupation: None,
            is_voter: true,
            is_pwd: false,
            is_solo_parent: false,
            is_four_ps: false,
            is_ofw: false,
            status: ResidentStatus::Active,
            created_at: TimeStamp::new(),
            created_by: "user_1".into(),
            updated_at: None,
        }
    }

    #[test]
    fn age_counts_whole_years() {
        let resident = resident_born(1964, 6, 19);
        let day_before = NaiveDate::from_ymd_opt(2024, 6, 18).unwrap();
        let birthday = NaiveDate::from_ymd_opt(2024, 6, 19).unwrap();

        assert_eq!(resident.age_on(day_before), 59);
        assert!(!resident.is_senior_on(day_before));
        assert_eq!(resident.age_on(birthday), 60);
        assert!(resident.is_senior_on(birthday));
    }

    #[test]
    fn full_name_skips_missing_parts() {
        let mut resident = resident_born(1990, 1, 1);
        assert_eq!(resident.full_name(), "Jose Protacio Rizal");
        resident.middle_name = None;
        resident.suffix = Some("Jr.".into());
        assert_eq!(resident.full_name(), "Jose Rizal Jr.");
    }

    #[test]
    fn resident_cbor_roundtrip() {
        let original = resident_born(1990, 1, 1);
        let encoded = minicbor::to_vec(&original).unwrap();
        let decoded: Resident = minicbor::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }
}
