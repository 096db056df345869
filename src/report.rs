//! Read-only aggregates for the dashboard and the reports pages
//!
//! Every figure is recomputed from the stored records on each call. Only
//! ACTIVE residents and households are counted. Each report has a pure
//! builder taking plain slices, which is what the tests exercise, and a
//! [`ReportService`] method that loads the rows and checks the caller.
use super::auth::{Action, Module, Session, authorize};
use super::blotter::{BlotterCase, CaseStatus};
use super::budget::{self, BudgetPeriod, BudgetSummary};
use super::disaster::{DisasterEvent, EvacuationCenter, MissingPersonReport, RiskLevel, RiskProfile};
use super::document::{DocumentRequest, DocumentStatus};
use super::error::RecordError;
use super::household::{Household, HouseholdStatus};
use super::project::{Project, ProjectStatus};
use super::resident::{CivilStatus, Education, Employment, Resident, Sex};
use super::store::{Record, Store};
use super::utils::percentage;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One row of a breakdown table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub count: usize,
    pub percent: f64,
}

fn bucket(label: impl Into<String>, count: usize, total: usize) -> Bucket {
    Bucket {
        label: label.into(),
        count,
        percent: percentage(count, total),
    }
}

/// Count per label of a closed set, listing every label even at zero.
fn closed_breakdown<T, L: Copy + Eq>(
    rows: &[T],
    labels: &[L],
    name: impl Fn(&L) -> &'static str,
    key: impl Fn(&T) -> L,
) -> Vec<Bucket> {
    labels
        .iter()
        .map(|label| {
            let count = rows.iter().filter(|row| key(row) == *label).count();
            bucket(name(label), count, rows.len())
        })
        .collect()
}

/// Count per observed value, sorted by label.
fn open_breakdown<T>(rows: &[T], key: impl Fn(&T) -> &str) -> Vec<Bucket> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        *counts.entry(key(row)).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(label, count)| bucket(label, count, rows.len()))
        .collect()
}

/// Inclusive age ranges; `None` is open-ended.
pub const AGE_BRACKETS: &[(&str, u32, Option<u32>)] = &[
    ("0-5", 0, Some(5)),
    ("6-12", 6, Some(12)),
    ("13-17", 13, Some(17)),
    ("18-59", 18, Some(59)),
    ("60+", 60, None),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlagCounts {
    pub senior: usize,
    pub pwd: usize,
    pub solo_parent: usize,
    pub four_ps: usize,
    pub voter: usize,
    pub ofw: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationReport {
    pub as_of: NaiveDate,
    pub total: usize,
    pub by_sex: Vec<Bucket>,
    pub by_civil_status: Vec<Bucket>,
    pub by_purok: Vec<Bucket>,
    pub by_education: Vec<Bucket>,
    pub by_employment: Vec<Bucket>,
    pub by_age_bracket: Vec<Bucket>,
    pub flags: FlagCounts,
}

pub fn population_report(residents: &[Resident], as_of: NaiveDate) -> PopulationReport {
    let active: Vec<&Resident> = residents.iter().filter(|r| r.is_active()).collect();
    let total = active.len();

    let by_age_bracket = AGE_BRACKETS
        .iter()
        .map(|(label, min, max)| {
            let count = active
                .iter()
                .filter(|r| {
                    let age = r.age_on(as_of);
                    age >= *min && max.is_none_or(|max| age <= max)
                })
                .count();
            bucket(*label, count, total)
        })
        .collect();

    let flags = FlagCounts {
        senior: active.iter().filter(|r| r.is_senior_on(as_of)).count(),
        pwd: active.iter().filter(|r| r.is_pwd).count(),
        solo_parent: active.iter().filter(|r| r.is_solo_parent).count(),
        four_ps: active.iter().filter(|r| r.is_four_ps).count(),
        voter: active.iter().filter(|r| r.is_voter).count(),
        ofw: active.iter().filter(|r| r.is_ofw).count(),
    };

    PopulationReport {
        as_of,
        total,
        by_sex: closed_breakdown(&active, Sex::ALL, Sex::as_str, |r| r.sex),
        by_civil_status: closed_breakdown(&active, CivilStatus::ALL, CivilStatus::as_str, |r| {
            r.civil_status
        }),
        by_purok: open_breakdown(&active, |r| r.purok.as_str()),
        by_education: closed_breakdown(&active, Education::ALL, Education::as_str, |r| r.education),
        by_employment: closed_breakdown(&active, Employment::ALL, Employment::as_str, |r| {
            r.employment
        }),
        by_age_bracket,
        flags,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HouseholdReport {
    pub total: usize,
    pub by_purok: Vec<Bucket>,
    pub four_ps: usize,
    pub average_members: f64,
    pub total_monthly_income: u64,
    pub without_members: usize,
}

pub fn household_report(households: &[Household], residents: &[Resident]) -> HouseholdReport {
    let active: Vec<&Household> = households
        .iter()
        .filter(|h| h.status == HouseholdStatus::Active)
        .collect();

    let mut members: HashMap<&str, usize> = HashMap::new();
    for resident in residents.iter().filter(|r| r.is_active()) {
        if let Some(household) = resident.household_id.as_deref() {
            *members.entry(household).or_default() += 1;
        }
    }
    let member_count = |h: &Household| members.get(h.id.as_str()).copied().unwrap_or(0);
    let total_members: usize = active.iter().copied().map(member_count).sum();

    HouseholdReport {
        total: active.len(),
        by_purok: open_breakdown(&active, |h| h.purok.as_str()),
        four_ps: active.iter().filter(|h| h.is_four_ps).count(),
        average_members: ratio(total_members, active.len()),
        total_monthly_income: active
            .iter()
            .fold(0u64, |sum, h| sum.saturating_add(h.monthly_income)),
        without_members: active.iter().filter(|h| member_count(**h) == 0).count(),
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    percentage(numerator, denominator) / 100.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VulnerabilityCounts {
    pub senior: usize,
    pub pwd: usize,
    pub infant: usize,
    pub pregnant: usize,
    pub chronic_illness: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CenterOccupancy {
    pub center_id: String,
    pub name: String,
    pub capacity: u32,
    pub occupied: usize,
    pub utilization_percent: f64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisasterReport {
    pub profiles: usize,
    pub by_risk_level: Vec<Bucket>,
    pub vulnerability: VulnerabilityCounts,
    pub evacuated_households: usize,
    pub evacuated_residents: usize,
    pub centers: Vec<CenterOccupancy>,
    pub open_missing: usize,
    pub found_missing: usize,
    pub active_events: usize,
}

pub struct DisasterInputs<'a> {
    pub profiles: &'a [RiskProfile],
    pub centers: &'a [EvacuationCenter],
    pub events: &'a [DisasterEvent],
    pub missing: &'a [MissingPersonReport],
    pub residents: &'a [Resident],
}

pub fn disaster_report(inputs: &DisasterInputs<'_>) -> DisasterReport {
    let profiles = inputs.profiles;
    let evacuated: Vec<&RiskProfile> = profiles.iter().filter(|p| p.is_evacuated()).collect();

    let evacuated_residents = inputs
        .residents
        .iter()
        .filter(|r| r.is_active())
        .filter(|r| {
            r.household_id
                .as_deref()
                .is_some_and(|h| evacuated.iter().any(|p| p.household_id == h))
        })
        .count();

    let mut centers: Vec<CenterOccupancy> = inputs
        .centers
        .iter()
        .map(|center| {
            let occupied = evacuated
                .iter()
                .filter(|p| p.center_id() == Some(center.id.as_str()))
                .count();
            CenterOccupancy {
                center_id: center.id.clone(),
                name: center.name.clone(),
                capacity: center.capacity,
                occupied,
                utilization_percent: percentage(occupied, center.capacity as usize),
                active: center.active,
            }
        })
        .collect();
    centers.sort_by(|a, b| a.name.cmp(&b.name));

    let vulnerability = VulnerabilityCounts {
        senior: profiles.iter().filter(|p| p.vulnerability.has_senior).count(),
        pwd: profiles.iter().filter(|p| p.vulnerability.has_pwd).count(),
        infant: profiles.iter().filter(|p| p.vulnerability.has_infant).count(),
        pregnant: profiles.iter().filter(|p| p.vulnerability.has_pregnant).count(),
        chronic_illness: profiles
            .iter()
            .filter(|p| p.vulnerability.has_chronic_illness)
            .count(),
    };

    DisasterReport {
        profiles: profiles.len(),
        by_risk_level: closed_breakdown(profiles, RiskLevel::ALL, RiskLevel::as_str, |p| p.risk_level),
        vulnerability,
        evacuated_households: evacuated.len(),
        evacuated_residents,
        centers,
        open_missing: inputs.missing.iter().filter(|m| m.is_open()).count(),
        found_missing: inputs.missing.iter().filter(|m| !m.is_open()).count(),
        active_events: inputs.events.iter().filter(|e| e.is_active()).count(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardCounts {
    pub residents: usize,
    pub households: usize,
    pub documents: Vec<Bucket>,
    pub blotter: Vec<Bucket>,
    pub projects: Vec<Bucket>,
}

pub fn dashboard_counts(
    residents: &[Resident],
    households: &[Household],
    documents: &[DocumentRequest],
    cases: &[BlotterCase],
    projects: &[Project],
) -> DashboardCounts {
    DashboardCounts {
        residents: residents.iter().filter(|r| r.is_active()).count(),
        households: households
            .iter()
            .filter(|h| h.status == HouseholdStatus::Active)
            .count(),
        documents: closed_breakdown(documents, DocumentStatus::ALL, DocumentStatus::as_str, |d| d.status),
        blotter: closed_breakdown(cases, CaseStatus::ALL, CaseStatus::as_str, |c| c.status),
        projects: closed_breakdown(projects, ProjectStatus::ALL, ProjectStatus::as_str, |p| p.status),
    }
}

pub struct ReportService {
    store: Store,
}

impl ReportService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn population(&self, session: &Session, as_of: NaiveDate) -> anyhow::Result<PopulationReport> {
        authorize(session, Module::Reports, Action::View)?;
        Ok(population_report(&self.store.all::<Resident>()?, as_of))
    }

    pub fn households(&self, session: &Session) -> anyhow::Result<HouseholdReport> {
        authorize(session, Module::Reports, Action::View)?;
        Ok(household_report(
            &self.store.all::<Household>()?,
            &self.store.all::<Resident>()?,
        ))
    }

    pub fn disaster(&self, session: &Session) -> anyhow::Result<DisasterReport> {
        authorize(session, Module::Reports, Action::View)?;
        let profiles = self.store.all::<RiskProfile>()?;
        let centers = self.store.all::<EvacuationCenter>()?;
        let events = self.store.all::<DisasterEvent>()?;
        let missing = self.store.all::<MissingPersonReport>()?;
        let residents = self.store.all::<Resident>()?;

        Ok(disaster_report(&DisasterInputs {
            profiles: &profiles,
            centers: &centers,
            events: &events,
            missing: &missing,
            residents: &residents,
        }))
    }

    /// Budget summary of a year, readable by anyone with report access.
    pub fn budget(&self, session: &Session, year: i32) -> anyhow::Result<BudgetSummary> {
        authorize(session, Module::Reports, Action::View)?;
        let id = self
            .store
            .unique_owner(budget::YEAR_INDEX, &year.to_string())?
            .ok_or_else(|| RecordError::not_found(BudgetPeriod::KIND, &year.to_string()))?;
        budget::summary_of(&self.store, &self.store.require(&id)?)
    }

    /// Landing page counts. Every signed-in role may read them.
    pub fn dashboard(&self, session: &Session) -> anyhow::Result<DashboardCounts> {
        if session.actor().is_none() {
            return Err(RecordError::Unauthenticated.into());
        }
        Ok(dashboard_counts(
            &self.store.all::<Resident>()?,
            &self.store.all::<Household>()?,
            &self.store.all::<DocumentRequest>()?,
            &self.store.all::<BlotterCase>()?,
            &self.store.all::<Project>()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_population_has_zeroed_buckets() {
        let report = population_report(&[], NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(report.total, 0);
        assert_eq!(report.by_sex.len(), 2);
        assert!(report.by_sex.iter().all(|b| b.count == 0 && b.percent == 0.0));
        assert!(report.by_purok.is_empty());
        assert_eq!(report.by_age_bracket.len(), AGE_BRACKETS.len());
    }

    #[test]
    fn brackets_cover_every_age_once() {
        for age in 0..130u32 {
            let hits = AGE_BRACKETS
                .iter()
                .filter(|(_, min, max)| age >= *min && max.is_none_or(|max| age <= max))
                .count();
            assert_eq!(hits, 1, "age {age}");
        }
    }

    #[test]
    fn ratio_of_nothing_is_zero() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(7, 2), 3.5);
    }

    #[test]
    fn empty_disaster_report() {
        let report = disaster_report(&DisasterInputs {
            profiles: &[],
            centers: &[],
            events: &[],
            missing: &[],
            residents: &[],
        });
        assert_eq!(report.profiles, 0);
        assert_eq!(report.by_risk_level.len(), RiskLevel::ALL.len());
        assert!(report.centers.is_empty());
    }
}
