//! CSV exports of the registries and disaster lists
use super::auth::{Action, Module, Session, authorize};
use super::disaster::{DisasterEvent, EvacuationCenter, MissingPersonReport, RiskProfile};
use super::household::Household;
use super::resident::Resident;
use super::store::Store;
use super::types::TimeStamp;
use super::utils::format_centavos;
use chrono::{NaiveDate, SecondsFormat, Utc};
use std::collections::HashMap;
use tracing::info;

/// `Content-Disposition` value for a download named after `name` and `date`.
pub fn attachment_header(name: &str, date: NaiveDate) -> String {
    format!("attachment; filename=\"{name}-{}.csv\"", date.format("%Y-%m-%d"))
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "YES" } else { "NO" }
}

fn instant(stamp: &TimeStamp<Utc>) -> String {
    stamp
        .to_datetime_utc()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn render(header: &[&str], rows: Vec<Vec<String>>) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

pub const RESIDENT_HEADER: &[&str] = &[
    "id",
    "last_name",
    "first_name",
    "middle_name",
    "suffix",
    "sex",
    "birth_date",
    "age",
    "civil_status",
    "purok",
    "household_number",
    "education",
    "employment",
    "occupation",
    "voter",
    "pwd",
    "solo_parent",
    "four_ps",
    "ofw",
    "status",
];

/// Residents sorted by surname, then given name.
pub fn residents_csv(
    residents: &[Resident],
    households: &[Household],
    as_of: NaiveDate,
) -> anyhow::Result<String> {
    let numbers: HashMap<&str, &str> = households
        .iter()
        .map(|h| (h.id.as_str(), h.household_number.as_str()))
        .collect();

    let mut sorted: Vec<&Resident> = residents.iter().collect();
    sorted.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));

    let rows = sorted
        .into_iter()
        .map(|r| {
            vec![
                r.id.clone(),
                r.last_name.clone(),
                r.first_name.clone(),
                r.middle_name.clone().unwrap_or_default(),
                r.suffix.clone().unwrap_or_default(),
                r.sex.to_string(),
                r.birth_date.date_naive().to_string(),
                r.age_on(as_of).to_string(),
                r.civil_status.to_string(),
                r.purok.clone(),
                r.household_id
                    .as_deref()
                    .and_then(|id| numbers.get(id))
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
                r.education.to_string(),
                r.employment.to_string(),
                r.occupation.clone().unwrap_or_default(),
                yes_no(r.is_voter).into(),
                yes_no(r.is_pwd).into(),
                yes_no(r.is_solo_parent).into(),
                yes_no(r.is_four_ps).into(),
                yes_no(r.is_ofw).into(),
                r.status.to_string(),
            ]
        })
        .collect();

    render(RESIDENT_HEADER, rows)
}

pub const HOUSEHOLD_HEADER: &[&str] = &[
    "household_number",
    "head",
    "address",
    "purok",
    "members",
    "four_ps",
    "monthly_income",
    "status",
];

pub fn households_csv(households: &[Household], residents: &[Resident]) -> anyhow::Result<String> {
    let names: HashMap<&str, String> = residents
        .iter()
        .map(|r| (r.id.as_str(), r.full_name()))
        .collect();

    let mut sorted: Vec<&Household> = households.iter().collect();
    sorted.sort_by(|a, b| a.household_number.cmp(&b.household_number));

    let rows = sorted
        .into_iter()
        .map(|h| {
            let members = residents
                .iter()
                .filter(|r| r.is_active() && r.household_id.as_deref() == Some(h.id.as_str()))
                .count();
            vec![
                h.household_number.clone(),
                h.head_resident_id
                    .as_deref()
                    .and_then(|id| names.get(id).cloned())
                    .unwrap_or_default(),
                h.address.clone(),
                h.purok.clone(),
                members.to_string(),
                yes_no(h.is_four_ps).into(),
                format_centavos(h.monthly_income),
                h.status.to_string(),
            ]
        })
        .collect();

    render(HOUSEHOLD_HEADER, rows)
}

pub const RISK_PROFILE_HEADER: &[&str] = &[
    "household_number",
    "risk_level",
    "has_senior",
    "has_pwd",
    "has_infant",
    "has_pregnant",
    "has_chronic_illness",
    "evacuated",
    "evacuation_center",
    "evacuated_at",
    "notes",
];

pub fn risk_profiles_csv(
    profiles: &[RiskProfile],
    centers: &[EvacuationCenter],
) -> anyhow::Result<String> {
    let center_names: HashMap<&str, &str> = centers
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    let mut sorted: Vec<&RiskProfile> = profiles.iter().collect();
    sorted.sort_by(|a, b| {
        (a.risk_level, &a.household_number).cmp(&(b.risk_level, &b.household_number))
    });

    let rows = sorted
        .into_iter()
        .map(|p| {
            let v = p.vulnerability;
            vec![
                p.household_number.clone(),
                p.risk_level.to_string(),
                yes_no(v.has_senior).into(),
                yes_no(v.has_pwd).into(),
                yes_no(v.has_infant).into(),
                yes_no(v.has_pregnant).into(),
                yes_no(v.has_chronic_illness).into(),
                yes_no(p.is_evacuated()).into(),
                p.center_id()
                    .and_then(|id| center_names.get(id))
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
                p.evacuation
                    .as_ref()
                    .map(|e| instant(&e.evacuated_at))
                    .unwrap_or_default(),
                p.notes.clone().unwrap_or_default(),
            ]
        })
        .collect();

    render(RISK_PROFILE_HEADER, rows)
}

pub const CENTER_HEADER: &[&str] = &["name", "location", "capacity", "occupied", "active"];

pub fn evacuation_centers_csv(
    centers: &[EvacuationCenter],
    profiles: &[RiskProfile],
) -> anyhow::Result<String> {
    let mut sorted: Vec<&EvacuationCenter> = centers.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let rows = sorted
        .into_iter()
        .map(|c| {
            let occupied = profiles
                .iter()
                .filter(|p| p.center_id() == Some(c.id.as_str()))
                .count();
            vec![
                c.name.clone(),
                c.location.clone(),
                c.capacity.to_string(),
                occupied.to_string(),
                yes_no(c.active).into(),
            ]
        })
        .collect();

    render(CENTER_HEADER, rows)
}

pub const MISSING_HEADER: &[&str] = &[
    "resident",
    "event",
    "last_seen_location",
    "description",
    "reported_at",
    "status",
    "found_at",
];

/// Open reports first, then newest.
pub fn missing_persons_csv(
    reports: &[MissingPersonReport],
    events: &[DisasterEvent],
) -> anyhow::Result<String> {
    let event_names: HashMap<&str, &str> = events
        .iter()
        .map(|e| (e.id.as_str(), e.name.as_str()))
        .collect();

    let mut sorted: Vec<&MissingPersonReport> = reports.iter().collect();
    sorted.sort_by(|a, b| {
        b.is_open()
            .cmp(&a.is_open())
            .then_with(|| b.reported_at.cmp(&a.reported_at))
    });

    let rows = sorted
        .into_iter()
        .map(|m| {
            vec![
                m.resident_name.clone(),
                m.event_id
                    .as_deref()
                    .and_then(|id| event_names.get(id))
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
                m.last_seen_location.clone().unwrap_or_default(),
                m.description.clone().unwrap_or_default(),
                instant(&m.reported_at),
                m.status().to_string(),
                m.found_at.as_ref().map(instant).unwrap_or_default(),
            ]
        })
        .collect();

    render(MISSING_HEADER, rows)
}

/// Export entry points. Each checks the EXPORT grant on its module.
pub struct ExportService {
    store: Store,
}

impl ExportService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn residents(&self, session: &Session, as_of: NaiveDate) -> anyhow::Result<String> {
        let actor = authorize(session, Module::Residents, Action::Export)?;
        let csv = residents_csv(
            &self.store.all::<Resident>()?,
            &self.store.all::<Household>()?,
            as_of,
        )?;
        info!(export = "residents", actor = %actor.id, "export generated");
        Ok(csv)
    }

    pub fn households(&self, session: &Session) -> anyhow::Result<String> {
        let actor = authorize(session, Module::Households, Action::Export)?;
        let csv = households_csv(
            &self.store.all::<Household>()?,
            &self.store.all::<Resident>()?,
        )?;
        info!(export = "households", actor = %actor.id, "export generated");
        Ok(csv)
    }

    pub fn risk_profiles(&self, session: &Session) -> anyhow::Result<String> {
        let actor = authorize(session, Module::Disaster, Action::Export)?;
        let csv = risk_profiles_csv(
            &self.store.all::<RiskProfile>()?,
            &self.store.all::<EvacuationCenter>()?,
        )?;
        info!(export = "disaster-profiles", actor = %actor.id, "export generated");
        Ok(csv)
    }

    pub fn evacuation_centers(&self, session: &Session) -> anyhow::Result<String> {
        let actor = authorize(session, Module::Disaster, Action::Export)?;
        let csv = evacuation_centers_csv(
            &self.store.all::<EvacuationCenter>()?,
            &self.store.all::<RiskProfile>()?,
        )?;
        info!(export = "evacuation-centers", actor = %actor.id, "export generated");
        Ok(csv)
    }

    pub fn missing_persons(&self, session: &Session) -> anyhow::Result<String> {
        let actor = authorize(session, Module::Disaster, Action::Export)?;
        let csv = missing_persons_csv(
            &self.store.all::<MissingPersonReport>()?,
            &self.store.all::<DisasterEvent>()?,
        )?;
        info!(export = "missing-persons", actor = %actor.id, "export generated");
        Ok(csv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_the_file_and_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            attachment_header("residents", date),
            "attachment; filename=\"residents-2024-03-09.csv\""
        );
    }

    #[test]
    fn fields_with_commas_and_quotes_are_escaped() {
        let out = render(
            &["name", "note"],
            vec![vec!["Dela Cruz, Juan".into(), "said \"hi\"".into()]],
        )
        .unwrap();
        assert_eq!(out, "name,note\n\"Dela Cruz, Juan\",\"said \"\"hi\"\"\"\n");
    }

    #[test]
    fn empty_export_is_just_the_header() {
        let out = evacuation_centers_csv(&[], &[]).unwrap();
        assert_eq!(out, "name,location,capacity,occupied,active\n");
    }
}
