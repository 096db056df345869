//! Budget periods, allocations and the income/expense ledger
//!
//! Totals are never stored. [`summarize`] derives them from the allocation
//! and transaction rows every time a summary is asked for.
use super::auth::{Action, Module, Session, authorize};
use super::error::RecordError;
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

pub const YEAR_INDEX: &str = "budget_year";

labelled_enum! {
    pub enum BudgetStatus {
        Active = (0, "ACTIVE"),
        Approved = (1, "APPROVED"),
        Closed = (2, "CLOSED"),
    }
}

impl Lifecycle for BudgetStatus {
    const RECORD: &'static str = "Budget period";

    fn initial() -> Self {
        BudgetStatus::Active
    }

    fn targets(self) -> &'static [Self] {
        match self {
            BudgetStatus::Active => &[BudgetStatus::Approved, BudgetStatus::Closed],
            BudgetStatus::Approved => &[BudgetStatus::Closed],
            BudgetStatus::Closed => &[],
        }
    }

    fn label(self) -> &'static str {
        self.as_str()
    }
}

labelled_enum! {
    pub enum BudgetCategory {
        PersonnelServices = (0, "PERSONNEL_SERVICES"),
        MaintenanceAndOperating = (1, "MAINTENANCE_AND_OPERATING"),
        CapitalOutlay = (2, "CAPITAL_OUTLAY"),
        DevelopmentFund = (3, "DEVELOPMENT_FUND"),
        DisasterRiskReduction = (4, "DISASTER_RISK_REDUCTION"),
        GenderAndDevelopment = (5, "GENDER_AND_DEVELOPMENT"),
        SeniorCitizensAndPwd = (6, "SENIOR_CITIZENS_AND_PWD"),
        YouthCouncil = (7, "YOUTH_COUNCIL"),
        Other = (8, "OTHER"),
    }
}

labelled_enum! {
    pub enum Direction {
        Income = (0, "INCOME"),
        Expense = (1, "EXPENSE"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct BudgetPeriod {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub year: i32,
    #[n(2)]
    pub total_budget: u64, // centavos
    #[n(3)]
    pub status: BudgetStatus,
    #[n(4)]
    pub approved_at: Option<TimeStamp<Utc>>,
    #[n(5)]
    pub approved_by: Option<String>,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
    #[n(7)]
    pub created_by: String,
    #[n(8)]
    pub status_changed_at: Option<TimeStamp<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct Allocation {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub period_id: String,
    #[n(2)]
    pub category: BudgetCategory,
    #[n(3)]
    pub amount: u64,
    #[n(4)]
    pub description: Option<String>,
    #[n(5)]
    pub recorded_by: String,
    #[n(6)]
    pub recorded_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct LedgerTransaction {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub period_id: String,
    #[n(2)]
    pub category: BudgetCategory,
    #[n(3)]
    pub direction: Direction,
    #[n(4)]
    pub amount: u64,
    #[n(5)]
    pub description: String,
    #[n(6)]
    pub recorded_by: String,
    #[n(7)]
    pub recorded_at: TimeStamp<Utc>,
}

impl Record for BudgetPeriod {
    const KIND: &'static str = "budget_period";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Allocation {
    const KIND: &'static str = "budget_allocation";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for LedgerTransaction {
    const KIND: &'static str = "budget_transaction";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Listable for BudgetPeriod {
    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
    fn search_text(&self) -> String {
        self.year.to_string()
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
}

impl Listable for LedgerTransaction {
    fn status_label(&self) -> &'static str {
        self.direction.as_str()
    }
    fn category_label(&self) -> Option<&str> {
        Some(self.category.as_str())
    }
    fn search_text(&self) -> String {
        self.description.clone()
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.recorded_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryLine {
    pub category: BudgetCategory,
    pub allocated: u64,
    pub income: u64,
    pub expense: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSummary {
    pub period_id: String,
    pub year: i32,
    pub status: BudgetStatus,
    pub total_budget: u64,
    pub allocated: u64,
    pub income: u64,
    pub expense: u64,
    /// total + income - expense
    pub remaining: i64,
    /// total - allocated; negative when over-allocated
    pub unallocated: i64,
    pub utilization_percent: f64,
    pub by_category: Vec<CategoryLine>,
}

/// Derive the period summary. Every category is listed, zeros included.
pub fn summarize(
    period: &BudgetPeriod,
    allocations: &[Allocation],
    transactions: &[LedgerTransaction],
) -> BudgetSummary {
    let by_category: Vec<CategoryLine> = BudgetCategory::ALL
        .iter()
        .map(|category| CategoryLine {
            category: *category,
            allocated: clamp_sum(
                allocations
                    .iter()
                    .filter(|a| a.category == *category)
                    .map(|a| a.amount),
            ),
            income: clamp_sum(
                transactions
                    .iter()
                    .filter(|t| t.category == *category && t.direction == Direction::Income)
                    .map(|t| t.amount),
            ),
            expense: clamp_sum(
                transactions
                    .iter()
                    .filter(|t| t.category == *category && t.direction == Direction::Expense)
                    .map(|t| t.amount),
            ),
        })
        .collect();

    let allocated = clamp_sum(by_category.iter().map(|l| l.allocated));
    let income = clamp_sum(by_category.iter().map(|l| l.income));
    let expense = clamp_sum(by_category.iter().map(|l| l.expense));
    let total = period.total_budget as i128;

    BudgetSummary {
        period_id: period.id.clone(),
        year: period.year,
        status: period.status,
        total_budget: period.total_budget,
        allocated,
        income,
        expense,
        remaining: saturate(total + income as i128 - expense as i128),
        unallocated: saturate(total - allocated as i128),
        utilization_percent: utils::percentage(expense as usize, period.total_budget as usize),
        by_category,
    }
}

// Sums in u128 and pins at u64::MAX.
fn clamp_sum(amounts: impl Iterator<Item = u64>) -> u64 {
    let sum: u128 = amounts.map(u128::from).sum();
    sum.min(u64::MAX as u128) as u64
}

fn saturate(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

pub fn period_schema() -> Schema {
    Schema::new(&[
        Field::required("year", FieldKind::Integer { min: 2000, max: 2100 }),
        Field::required("total_budget", FieldKind::MONEY),
    ])
}

pub fn allocation_schema() -> Schema {
    Schema::new(&[
        Field::required("category", FieldKind::Choice(BudgetCategory::LABELS)),
        Field::required("amount", FieldKind::MONEY),
        Field::optional("description", FieldKind::Text),
    ])
}

pub fn transaction_schema() -> Schema {
    Schema::new(&[
        Field::required("category", FieldKind::Choice(BudgetCategory::LABELS)),
        Field::required("direction", FieldKind::Choice(Direction::LABELS)),
        Field::required("amount", FieldKind::MONEY),
        Field::required("description", FieldKind::Text),
    ])
}

pub fn transition_schema() -> Schema {
    Schema::new(&[Field::required(
        "status",
        FieldKind::Choice(BudgetStatus::LABELS),
    )])
}

pub struct BudgetService {
    store: Store,
}

impl BudgetService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Open the budget for a year. One period per year.
    pub fn open_period(&self, session: &Session, payload: &Value) -> anyhow::Result<BudgetPeriod> {
        let actor = authorize(session, Module::Budget, Action::Create)?;
        let input = period_schema().check(payload)?;

        let year = input.require_integer("year")? as i32;
        let period = BudgetPeriod {
            id: utils::new_uuid_to_bech32("budget_")?,
            year,
            total_budget: input.require_amount("total_budget")?,
            status: BudgetStatus::initial(),
            approved_at: None,
            approved_by: None,
            created_at: TimeStamp::new(),
            created_by: actor.id.clone(),
            status_changed_at: None,
        };

        self.store
            .insert_unique(YEAR_INDEX, &year.to_string(), &period)
            .map_err(|err| match RecordError::classify(&err) {
                Some(RecordError::Conflict(_)) => {
                    RecordError::Conflict(format!("a budget for {year} already exists")).into()
                }
                _ => err,
            })?;
        info!(period = %period.id, year, actor = %actor.id, "budget period opened");

        Ok(period)
    }

    pub fn get_period(&self, session: &Session, id: &str) -> anyhow::Result<BudgetPeriod> {
        authorize(session, Module::Budget, Action::View)?;
        self.store.require(id)
    }

    pub fn period_for_year(&self, session: &Session, year: i32) -> anyhow::Result<BudgetPeriod> {
        authorize(session, Module::Budget, Action::View)?;
        let owner = self
            .store
            .unique_owner(YEAR_INDEX, &year.to_string())?
            .ok_or_else(|| RecordError::not_found(BudgetPeriod::KIND, &year.to_string()))?;
        self.store.require(&owner)
    }

    pub fn list_periods(
        &self,
        session: &Session,
        query: &ListQuery,
    ) -> anyhow::Result<Listing<BudgetPeriod>> {
        authorize(session, Module::Budget, Action::View)?;
        Ok(query.apply(self.store.all()?))
    }

    // Closed periods take no more entries.
    fn open_for_entries(&self, period_id: &str) -> anyhow::Result<BudgetPeriod> {
        let period: BudgetPeriod = self.store.require(period_id)?;
        if period.status == BudgetStatus::Closed {
            return Err(RecordError::Conflict(format!("budget {} is closed", period.year)).into());
        }
        Ok(period)
    }

    pub fn allocate(
        &self,
        session: &Session,
        period_id: &str,
        payload: &Value,
    ) -> anyhow::Result<Allocation> {
        let actor = authorize(session, Module::Budget, Action::Create)?;
        let input = allocation_schema().check(payload)?;
        self.open_for_entries(period_id)?;

        let allocation = Allocation {
            id: utils::new_uuid_to_bech32("alloc_")?,
            period_id: period_id.to_string(),
            category: input.require_choice("category")?,
            amount: input.require_amount("amount")?,
            description: input.text("description"),
            recorded_by: actor.id.clone(),
            recorded_at: TimeStamp::new(),
        };

        self.store.put(&allocation)?;
        info!(
            period = %period_id,
            category = %allocation.category,
            amount = allocation.amount,
            actor = %actor.id,
            "budget allocated"
        );

        Ok(allocation)
    }

    pub fn record_transaction(
        &self,
        session: &Session,
        period_id: &str,
        payload: &Value,
    ) -> anyhow::Result<LedgerTransaction> {
        let actor = authorize(session, Module::Budget, Action::Create)?;
        let input = transaction_schema().check(payload)?;
        self.open_for_entries(period_id)?;

        let transaction = LedgerTransaction {
            id: utils::new_uuid_to_bech32("txn_")?,
            period_id: period_id.to_string(),
            category: input.require_choice("category")?,
            direction: input.require_choice("direction")?,
            amount: input.require_amount("amount")?,
            description: input.require_text("description")?,
            recorded_by: actor.id.clone(),
            recorded_at: TimeStamp::new(),
        };

        self.store.put(&transaction)?;
        info!(
            period = %period_id,
            direction = %transaction.direction,
            amount = transaction.amount,
            actor = %actor.id,
            "budget transaction recorded"
        );

        Ok(transaction)
    }

    pub fn allocations(&self, session: &Session, period_id: &str) -> anyhow::Result<Vec<Allocation>> {
        authorize(session, Module::Budget, Action::View)?;
        self.store.require::<BudgetPeriod>(period_id)?;
        Ok(self
            .store
            .all::<Allocation>()?
            .into_iter()
            .filter(|a| a.period_id == period_id)
            .collect())
    }

    pub fn transactions(
        &self,
        session: &Session,
        period_id: &str,
        query: &ListQuery,
    ) -> anyhow::Result<Listing<LedgerTransaction>> {
        authorize(session, Module::Budget, Action::View)?;
        self.store.require::<BudgetPeriod>(period_id)?;
        let rows = self
            .store
            .all::<LedgerTransaction>()?
            .into_iter()
            .filter(|t| t.period_id == period_id)
            .collect();
        Ok(query.apply(rows))
    }

    /// APPROVED needs the approve grant; CLOSED needs update.
    pub fn transition(
        &self,
        session: &Session,
        period_id: &str,
        payload: &Value,
    ) -> anyhow::Result<BudgetPeriod> {
        let actor = authorize(session, Module::Budget, Action::Update)?;
        let input = transition_schema().check(payload)?;
        let target: BudgetStatus = input.require_choice("status")?;
        if target == BudgetStatus::Approved {
            authorize(session, Module::Budget, Action::Approve)?;
        }
        let mut period: BudgetPeriod = self.store.require(period_id)?;

        let (from, to) = match plan_transition(period.status, target)? {
            Transition::Unchanged(status) => {
                debug!(period = %period.id, status = %status, "status unchanged");
                return Ok(period);
            }
            Transition::Advance { from, to } => (from, to),
        };

        let now = TimeStamp::new();
        if to == BudgetStatus::Approved {
            period.approved_at = Some(now.clone());
            period.approved_by = Some(actor.id.clone());
        }
        period.status = to;
        period.status_changed_at = Some(now.clone());

        let mut batch = Batch::default();
        Store::stage(&mut batch, &period)?;
        Witness::new(&period.id, &actor.id, now, from.as_str(), to.as_str()).stage(&mut batch)?;
        self.store.apply(batch)?;

        info!(period = %period.id, year = period.year, from = %from, to = %to, actor = %actor.id, "budget status changed");
        Ok(period)
    }

    pub fn summary(&self, session: &Session, period_id: &str) -> anyhow::Result<BudgetSummary> {
        authorize(session, Module::Budget, Action::View)?;
        let period: BudgetPeriod = self.store.require(period_id)?;
        summary_of(&self.store, &period)
    }

    pub fn history(&self, session: &Session, period_id: &str) -> anyhow::Result<Vec<Witness>> {
        authorize(session, Module::Budget, Action::View)?;
        self.store.require::<BudgetPeriod>(period_id)?;
        history::history(&self.store, period_id)
    }
}

pub(crate) fn summary_of(store: &Store, period: &BudgetPeriod) -> anyhow::Result<BudgetSummary> {
    let allocations: Vec<Allocation> = store
        .all::<Allocation>()?
        .into_iter()
        .filter(|a| a.period_id == period.id)
        .collect();
    let transactions: Vec<LedgerTransaction> = store
        .all::<LedgerTransaction>()?
        .into_iter()
        .filter(|t| t.period_id == period.id)
        .collect();

    Ok(summarize(period, &allocations, &transactions))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(total: u64) -> BudgetPeriod {
        BudgetPeriod {
            id: "budget_1".into(),
            year: 2024,
            total_budget: total,
            status: BudgetStatus::Active,
            approved_at: None,
            approved_by: None,
            created_at: TimeStamp::new(),
            created_by: "user_1".into(),
            status_changed_at: None,
        }
    }

    fn entry(category: BudgetCategory, direction: Direction, amount: u64) -> LedgerTransaction {
        LedgerTransaction {
            id: format!("txn_{amount}"),
            period_id: "budget_1".into(),
            category,
            direction,
            amount,
            description: "entry".into(),
            recorded_by: "user_1".into(),
            recorded_at: TimeStamp::new(),
        }
    }

    #[test]
    fn empty_period_summarizes_to_zeros() {
        let summary = summarize(&period(0), &[], &[]);
        assert_eq!(summary.remaining, 0);
        assert_eq!(summary.utilization_percent, 0.0);
        assert_eq!(summary.by_category.len(), BudgetCategory::ALL.len());
        assert!(summary.by_category.iter().all(|l| l.allocated == 0));
    }

    #[test]
    fn overspending_goes_negative() {
        let summary = summarize(
            &period(1_000),
            &[],
            &[entry(BudgetCategory::Other, Direction::Expense, 1_500)],
        );
        assert_eq!(summary.remaining, -500);
        assert_eq!(summary.utilization_percent, 150.0);
    }

    #[test]
    fn huge_entries_pin_instead_of_wrapping() {
        let entries = [
            entry(BudgetCategory::Other, Direction::Income, u64::MAX),
            entry(BudgetCategory::Other, Direction::Income, u64::MAX),
        ];
        let summary = summarize(&period(0), &[], &entries);
        assert_eq!(summary.income, u64::MAX);
        assert_eq!(summary.remaining, i64::MAX);
    }

    #[test]
    fn amounts_above_the_ceiling_are_rejected() {
        let errors = allocation_schema()
            .validate(&serde_json::json!({
                "category": "other",
                "amount": 100_000_000_000_000_000u64,
            }))
            .unwrap_err();
        assert_eq!(
            errors.get("amount"),
            Some(crate::error::FieldReason::OutOfRange)
        );
    }

    #[test]
    fn closed_is_terminal() {
        assert!(BudgetStatus::Closed.is_terminal());
        assert!(!BudgetStatus::Approved.can_reach(BudgetStatus::Active));
    }
}
