use barangay_records::{
    auth::{Actor, Role, Session},
    blotter::{BlotterService, CaseStatus},
    budget::BudgetService,
    certificate::{self, Letterhead, TextCanvas},
    disaster::{DisasterService, RiskProfile},
    document::{DocumentService, DocumentStatus},
    error::{RecordError, status_code_of},
    export::ExportService,
    health::HealthService,
    household::HouseholdService,
    official::OfficialService,
    project::{ProjectService, ProjectStatus},
    report::ReportService,
    resident::{Resident, ResidentService},
    sequence::{SequenceGenerator, parse_control_number},
    store::Store,
    types::{ListQuery, TimeStamp},
};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};

use tempfile::tempdir; // Use for test db cleanup.

fn session(role: Role) -> Session {
    Session::signed_in(Actor::new(
        &format!("user_{}", role.as_str().to_lowercase()),
        role.as_str(),
        role,
    ))
}

fn resident_payload(first: &str, last: &str) -> Value {
    json!({
        "first_name": first,
        "last_name": last,
        "sex": "female",
        "birth_date": "1990-05-01",
        "civil_status": "SINGLE",
        "purok": "Purok 2",
    })
}

fn register(store: &Store, first: &str, last: &str) -> anyhow::Result<Resident> {
    ResidentService::new(store.clone())
        .register(&session(Role::Secretary), &resident_payload(first, last))
}

fn is_conflict(err: &anyhow::Error) -> bool {
    matches!(RecordError::classify(err), Some(RecordError::Conflict(_)))
}

#[test]
fn document_moves_through_to_release() -> anyhow::Result<()> {
    // Sled locks its directory, so every test opens its own database.
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_document_release.db"))?;
    let secretary = session(Role::Secretary);

    let resident = register(&store, "Maria", "Santos")?;
    let documents = DocumentService::new(store.clone());
    let document = documents.request(
        &secretary,
        &json!({
            "resident_id": resident.id,
            "document_type": "barangay clearance",
            "purpose": "Employment",
            "fee": "50.00",
        }),
    )?;

    assert_eq!(document.status, DocumentStatus::Pending);
    assert_eq!(document.fee, 5_000);
    assert_eq!(document.resident_name, "Maria Santos");
    let (prefix, year, sequence) =
        parse_control_number(&document.control_number).expect("well formed control number");
    assert_eq!(prefix, "BC");
    assert_eq!(year, document.created_at.year());
    assert_eq!(sequence, 1);

    for status in ["PROCESSING", "READY", "RELEASED"] {
        documents.transition(&secretary, &document.id, &json!({ "status": status }))?;
    }

    let released = documents.get(&secretary, &document.id)?;
    assert_eq!(released.status, DocumentStatus::Released);
    assert_eq!(released.issued_by.as_deref(), Some("user_secretary"));
    assert!(released.issued_at.is_some());
    assert!(released.released_at.is_some());

    let history = documents.history(&secretary, &document.id)?;
    let moves: Vec<(&str, &str)> = history
        .iter()
        .map(|w| (w.from.as_str(), w.to.as_str()))
        .collect();
    assert_eq!(
        moves,
        vec![
            ("PENDING", "PROCESSING"),
            ("PROCESSING", "READY"),
            ("READY", "RELEASED")
        ]
    );

    // Released is terminal.
    let err = documents
        .transition(&secretary, &document.id, &json!({ "status": "CANCELLED" }))
        .unwrap_err();
    assert!(is_conflict(&err));
    assert_eq!(status_code_of(&err), 409);

    Ok(())
}

#[test]
fn rejection_needs_remarks() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_rejection.db"))?;
    let secretary = session(Role::Secretary);

    let resident = register(&store, "Pedro", "Reyes")?;
    let documents = DocumentService::new(store.clone());
    let document = documents.request(
        &secretary,
        &json!({
            "resident_id": resident.id,
            "document_type": "CERTIFICATE_OF_INDIGENCY",
            "purpose": "Medical assistance",
        }),
    )?;

    let err = documents
        .transition(&secretary, &document.id, &json!({ "status": "REJECTED" }))
        .unwrap_err();
    assert_eq!(status_code_of(&err), 400);
    assert_eq!(
        documents.get(&secretary, &document.id)?.status,
        DocumentStatus::Pending
    );

    let rejected = documents.transition(
        &secretary,
        &document.id,
        &json!({ "status": "REJECTED", "remarks": "Incomplete requirements" }),
    )?;
    assert_eq!(rejected.status, DocumentStatus::Rejected);
    assert_eq!(rejected.remarks.as_deref(), Some("Incomplete requirements"));

    let history = documents.history(&secretary, &document.id)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].note.as_deref(), Some("Incomplete requirements"));

    Ok(())
}

#[test]
fn naming_the_current_status_writes_nothing() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_unchanged.db"))?;
    let secretary = session(Role::Secretary);

    let resident = register(&store, "Ana", "Cruz")?;
    let documents = DocumentService::new(store.clone());
    let document = documents.request(
        &secretary,
        &json!({
            "resident_id": resident.id,
            "document_type": "CERTIFICATE_OF_RESIDENCY",
            "purpose": "School enrollment",
        }),
    )?;

    let same = documents.transition(&secretary, &document.id, &json!({ "status": "PENDING" }))?;
    assert_eq!(same, document);
    assert!(documents.history(&secretary, &document.id)?.is_empty());

    Ok(())
}

#[test]
fn first_hearing_starts_mediation_once() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_hearings.db"))?;
    let kagawad = session(Role::Kagawad);

    let blotter = BlotterService::new(store.clone());
    let case = blotter.file(
        &kagawad,
        &json!({
            "complainant": "Juan Dela Cruz",
            "respondent": "Jose Garcia",
            "incident_type": "noise",
            "incident_date": "2024-02-10",
            "incident_location": "Purok 3",
            "narrative": "Loud karaoke past midnight",
        }),
    )?;
    assert_eq!(case.status, CaseStatus::Filed);

    let (case, _) = blotter.schedule_hearing(
        &kagawad,
        &case.id,
        &json!({ "scheduled_at": "2024-02-15T09:00:00Z", "venue": "Barangay Hall" }),
    )?;
    assert_eq!(case.status, CaseStatus::UnderMediation);

    let (case, _) = blotter.schedule_hearing(
        &kagawad,
        &case.id,
        &json!({ "scheduled_at": "2024-02-22T09:00:00Z" }),
    )?;
    assert_eq!(case.status, CaseStatus::UnderMediation);

    assert_eq!(blotter.hearings(&kagawad, &case.id)?.len(), 2);
    let history = blotter.history(&kagawad, &case.id)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to, "UNDER_MEDIATION");

    // Settling needs a resolution, then the case takes no more hearings.
    let err = blotter
        .transition(&kagawad, &case.id, &json!({ "status": "SETTLED" }))
        .unwrap_err();
    assert_eq!(status_code_of(&err), 400);

    let settled = blotter.transition(
        &kagawad,
        &case.id,
        &json!({ "status": "SETTLED", "resolution": "Agreed on quiet hours" }),
    )?;
    assert_eq!(settled.resolved_by.as_deref(), Some("user_kagawad"));

    let err = blotter
        .schedule_hearing(
            &kagawad,
            &case.id,
            &json!({ "scheduled_at": "2024-03-01T09:00:00Z" }),
        )
        .unwrap_err();
    assert!(is_conflict(&err));

    Ok(())
}

#[test]
fn budget_summary_adds_up() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_budget.db"))?;
    let treasurer = session(Role::Treasurer);

    let budget = BudgetService::new(store.clone());
    let period = budget.open_period(&treasurer, &json!({ "year": 2024, "total_budget": 10_000 }))?;

    budget.allocate(
        &treasurer,
        &period.id,
        &json!({ "category": "PERSONNEL_SERVICES", "amount": 6_000 }),
    )?;
    budget.allocate(
        &treasurer,
        &period.id,
        &json!({ "category": "CAPITAL_OUTLAY", "amount": "4,000.00" }),
    )?;
    budget.record_transaction(
        &treasurer,
        &period.id,
        &json!({
            "category": "OTHER",
            "direction": "INCOME",
            "amount": 5_000,
            "description": "Provincial subsidy",
        }),
    )?;
    budget.record_transaction(
        &treasurer,
        &period.id,
        &json!({
            "category": "CAPITAL_OUTLAY",
            "direction": "EXPENSE",
            "amount": 3_000,
            "description": "Street lights",
        }),
    )?;

    let summary = budget.summary(&treasurer, &period.id)?;
    assert_eq!(summary.total_budget, 1_000_000);
    assert_eq!(summary.allocated, 1_000_000);
    assert_eq!(summary.unallocated, 0);
    assert_eq!(summary.income, 500_000);
    assert_eq!(summary.expense, 300_000);
    assert_eq!(summary.remaining, 1_200_000);
    assert_eq!(summary.utilization_percent, 30.0);

    // The same figures through the report surface.
    let report = ReportService::new(store.clone()).budget(&treasurer, 2024)?;
    assert_eq!(report.remaining, 1_200_000);

    // One period per year.
    let err = budget
        .open_period(&treasurer, &json!({ "year": 2024, "total_budget": 1 }))
        .unwrap_err();
    assert!(is_conflict(&err));
    assert_eq!(budget.period_for_year(&treasurer, 2024)?.id, period.id);

    Ok(())
}

#[test]
fn only_the_captain_approves_budgets() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_budget_approval.db"))?;
    let treasurer = session(Role::Treasurer);
    let captain = session(Role::Captain);

    let budget = BudgetService::new(store.clone());
    let period = budget.open_period(&treasurer, &json!({ "year": 2025, "total_budget": 500 }))?;

    let err = budget
        .transition(&treasurer, &period.id, &json!({ "status": "APPROVED" }))
        .unwrap_err();
    assert_eq!(status_code_of(&err), 403);

    let approved = budget.transition(&captain, &period.id, &json!({ "status": "APPROVED" }))?;
    assert_eq!(approved.approved_by.as_deref(), Some("user_captain"));

    let closed = budget.transition(&treasurer, &period.id, &json!({ "status": "CLOSED" }))?;
    let err = budget
        .allocate(
            &treasurer,
            &closed.id,
            &json!({ "category": "OTHER", "amount": 10 }),
        )
        .unwrap_err();
    assert!(is_conflict(&err));
    assert_eq!(budget.history(&captain, &period.id)?.len(), 2);

    Ok(())
}

#[test]
fn household_with_members_cannot_be_removed() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_household_guard.db"))?;
    let admin = session(Role::SuperAdmin);
    let secretary = session(Role::Secretary);

    let households = HouseholdService::new(store.clone());
    let household = households.create(
        &secretary,
        &json!({ "address": "12 Mabini St", "purok": "Purok 1", "monthly_income": 15_000 }),
    )?;
    assert!(household.household_number.starts_with("HH-"));

    let residents = ResidentService::new(store.clone());
    let mut payload = resident_payload("Luz", "Bautista");
    payload["household_id"] = json!(household.id);
    let member = residents.register(&secretary, &payload)?;

    let err = households.delete(&admin, &household.id).unwrap_err();
    assert!(matches!(
        RecordError::classify(&err),
        Some(RecordError::DependencyBlocked(_))
    ));
    let err = households.deactivate(&secretary, &household.id).unwrap_err();
    assert_eq!(status_code_of(&err), 409);

    // Secretaries never hard delete.
    let err = households.delete(&secretary, &household.id).unwrap_err();
    assert_eq!(status_code_of(&err), 403);

    // Refusals leave both rows exactly as they were.
    assert_eq!(households.get(&secretary, &household.id)?, household);
    assert_eq!(residents.get(&secretary, &member.id)?, member);

    residents.deactivate(&secretary, &member.id)?;
    households.delete(&admin, &household.id)?;
    assert_eq!(
        status_code_of(&households.get(&secretary, &household.id).unwrap_err()),
        404
    );

    Ok(())
}

#[test]
fn control_numbers_are_unique_across_threads() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_sequence.db"))?;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sequence = SequenceGenerator::new(store.clone());
            std::thread::spawn(move || {
                (0..25)
                    .map(|_| sequence.next("BC", 2024))
                    .collect::<anyhow::Result<Vec<String>>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        let numbers = handle.join().expect("worker panicked")?;
        for number in numbers {
            assert!(seen.insert(number));
        }
    }
    assert_eq!(seen.len(), 200);
    assert!(seen.contains("BC-2024-000200"));

    // Another year starts over.
    let sequence = SequenceGenerator::new(store);
    assert_eq!(sequence.next("BC", 2025)?, "BC-2025-000001");

    Ok(())
}

#[test]
fn anonymous_callers_are_turned_away() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_anonymous.db"))?;
    let anonymous = Session::anonymous();

    let err = ResidentService::new(store.clone())
        .list(&anonymous, &ListQuery::new())
        .unwrap_err();
    assert_eq!(status_code_of(&err), 401);

    let err = ReportService::new(store.clone())
        .dashboard(&anonymous)
        .unwrap_err();
    assert_eq!(status_code_of(&err), 401);

    // Any signed-in role sees the dashboard.
    let counts = ReportService::new(store).dashboard(&session(Role::HealthWorker))?;
    assert_eq!(counts.residents, 0);

    Ok(())
}

#[test]
fn missing_person_reports_open_and_close() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_missing.db"))?;
    let kagawad = session(Role::Kagawad);
    let resident = register(&store, "Rosa", "Mendoza")?;

    let disaster = DisasterService::new(store.clone());
    let event = disaster.start_event(&kagawad, &json!({ "name": "Typhoon Odette", "event_type": "TYPHOON" }))?;
    let payload = json!({ "resident_id": resident.id, "event_id": event.id, "last_seen_location": "River bank" });

    let report = disaster.report_missing(&kagawad, &payload)?;
    assert!(report.is_open());
    assert!(is_conflict(&disaster.report_missing(&kagawad, &payload).unwrap_err()));

    let found = disaster.mark_found(&kagawad, &report.id, &json!({}))?;
    assert_eq!(found.status(), "FOUND");
    assert!(is_conflict(
        &disaster.mark_found(&kagawad, &report.id, &json!({})).unwrap_err()
    ));

    // The claim was released with the found mark.
    let again = disaster.report_missing(&kagawad, &payload)?;
    assert_ne!(again.id, report.id);
    let open = disaster.list_missing(&kagawad, &ListQuery::new().with_status("open"))?;
    assert_eq!(open.total, 1);

    Ok(())
}

#[test]
fn evacuation_respects_center_capacity() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_evacuation.db"))?;
    let secretary = session(Role::Secretary);

    let households = HouseholdService::new(store.clone());
    let disaster = DisasterService::new(store.clone());
    let center = disaster.create_center(
        &secretary,
        &json!({ "name": "Covered Court", "location": "Purok 1", "capacity": 1 }),
    )?;

    let mut profiles = Vec::new();
    for address in ["1 Rizal St", "2 Rizal St"] {
        let household = households.create(&secretary, &json!({ "address": address, "purok": "Purok 1" }))?;
        profiles.push(disaster.create_profile(
            &secretary,
            &json!({ "household_id": household.id, "risk_level": "HIGH", "has_senior": true }),
        )?);
    }

    let duplicate = disaster
        .create_profile(
            &secretary,
            &json!({ "household_id": profiles[0].household_id, "risk_level": "LOW" }),
        )
        .unwrap_err();
    assert!(is_conflict(&duplicate));

    let evacuated = disaster.evacuate(&secretary, &profiles[0].id, &center.id)?;
    assert_eq!(evacuated.center_id(), Some(center.id.as_str()));
    // Re-evacuating to the same center is a no-op, not a second seat.
    disaster.evacuate(&secretary, &profiles[0].id, &center.id)?;

    let err = disaster
        .evacuate(&secretary, &profiles[1].id, &center.id)
        .unwrap_err();
    assert!(is_conflict(&err));

    let home = disaster.return_home(&secretary, &profiles[0].id)?;
    assert!(!home.is_evacuated());
    disaster.evacuate(&secretary, &profiles[1].id, &center.id)?;

    let report = ReportService::new(store.clone()).disaster(&secretary)?;
    assert_eq!(report.evacuated_households, 1);

    Ok(())
}

#[test]
fn completed_projects_are_final() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_projects.db"))?;
    let kagawad = session(Role::Kagawad);

    let projects = ProjectService::new(store.clone());
    let project = projects.create(
        &kagawad,
        &json!({
            "name": "Drainage upgrade",
            "budget": 250_000,
            "funding_source": "20% Development Fund",
            "start_date": "2024-01-15",
            "target_end_date": "2024-06-30",
        }),
    )?;
    assert_eq!(project.status, ProjectStatus::Planned);

    projects.transition(&kagawad, &project.id, &json!({ "status": "ONGOING" }))?;
    let (updated, _) = projects.post_update(
        &kagawad,
        &project.id,
        &json!({ "note": "Canals excavated", "progress_percent": 40 }),
    )?;
    assert_eq!(updated.progress_percent, 40);

    let done = projects.transition(&kagawad, &project.id, &json!({ "status": "COMPLETED" }))?;
    assert_eq!(done.progress_percent, 100);
    assert!(done.actual_end_date.is_some());

    let err = projects
        .transition(&kagawad, &project.id, &json!({ "status": "SUSPENDED" }))
        .unwrap_err();
    assert!(is_conflict(&err));
    assert!(is_conflict(
        &projects
            .post_update(&kagawad, &project.id, &json!({ "note": "late note" }))
            .unwrap_err()
    ));
    assert_eq!(projects.history(&kagawad, &project.id)?.len(), 2);

    Ok(())
}

#[test]
fn certificate_prints_only_when_ready() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_certificate.db"))?;
    let secretary = session(Role::Secretary);
    let letterhead = Letterhead {
        barangay: "San Roque".into(),
        municipality: "Tagum".into(),
        province: Some("Davao del Norte".into()),
    };

    let resident = register(&store, "Elena", "Villanueva")?;
    let documents = DocumentService::new(store.clone());
    let document = documents.request(
        &secretary,
        &json!({
            "resident_id": resident.id,
            "document_type": "CERTIFICATE_OF_RESIDENCY",
            "purpose": "bank account opening",
        }),
    )?;

    let err = certificate::print(
        &store,
        &secretary,
        &document.id,
        &mut TextCanvas::default(),
        &letterhead,
    )
    .unwrap_err();
    assert!(is_conflict(&err));

    documents.transition(&secretary, &document.id, &json!({ "status": "PROCESSING" }))?;
    documents.transition(&secretary, &document.id, &json!({ "status": "READY" }))?;

    let bytes = certificate::print(
        &store,
        &secretary,
        &document.id,
        &mut TextCanvas::default(),
        &letterhead,
    )?;
    let text = String::from_utf8(bytes)?;
    assert!(text.contains("Province of Davao del Norte"));
    assert!(text.contains("BARANGAY SAN ROQUE"));
    assert!(text.contains("CERTIFICATE OF RESIDENCY"));
    assert!(text.contains(&document.control_number));
    // No sitting captain, so the office signs.
    assert!(text.contains("PUNONG BARANGAY"));

    Ok(())
}

#[test]
fn exports_need_the_export_grant() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_exports.db"))?;
    register(&store, "Carlo", "Aquino")?;
    register(&store, "Bea", "Aquino")?;

    let exports = ExportService::new(store.clone());
    let today = TimeStamp::new().date_naive();

    let err = exports.residents(&session(Role::Staff), today).unwrap_err();
    assert_eq!(status_code_of(&err), 403);

    let csv = exports.residents(&session(Role::Secretary), today)?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("id,last_name,first_name"));
    // Sorted by surname, then given name.
    assert!(lines[1].contains("Aquino,Bea"));
    assert!(lines[2].contains("Aquino,Carlo"));

    Ok(())
}

#[test]
fn sitting_captain_signs_certificates() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_captain.db"))?;
    let secretary = session(Role::Secretary);
    let letterhead = Letterhead {
        barangay: "Poblacion".into(),
        municipality: "Carmen".into(),
        province: None,
    };

    let officials = OfficialService::new(store.clone());
    let former = officials.appoint(
        &secretary,
        &json!({ "full_name": "Ramon Lim", "position": "CAPTAIN", "term_start": "2018-07-01" }),
    )?;
    officials.end_term(&secretary, &former.id, &json!({ "term_end": "2023-11-30" }))?;
    assert!(is_conflict(
        &officials
            .end_term(&secretary, &former.id, &json!({}))
            .unwrap_err()
    ));
    officials.appoint(
        &secretary,
        &json!({ "full_name": "Teresita Gomez", "position": "captain", "term_start": "2023-12-01" }),
    )?;

    let sitting = officials.list(&secretary, &ListQuery::new().with_status("active"))?;
    assert_eq!(sitting.total, 1);

    let resident = register(&store, "Nilo", "Torres")?;
    let documents = DocumentService::new(store.clone());
    let document = documents.request(
        &secretary,
        &json!({
            "resident_id": resident.id,
            "document_type": "FIRST_TIME_JOBSEEKER",
            "purpose": "job application",
        }),
    )?;
    documents.transition(&secretary, &document.id, &json!({ "status": "PROCESSING" }))?;
    documents.transition(&secretary, &document.id, &json!({ "status": "READY" }))?;

    let text = String::from_utf8(certificate::print(
        &store,
        &secretary,
        &document.id,
        &mut TextCanvas::default(),
        &letterhead,
    )?)?;
    assert!(text.contains("TERESITA GOMEZ"));
    assert!(text.contains("Punong Barangay"));
    assert!(!text.contains("RAMON LIM"));
    assert!(!text.contains("Province of"));

    Ok(())
}

#[test]
fn health_records_belong_to_health_workers() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_health.db"))?;
    let worker = session(Role::HealthWorker);
    let resident = register(&store, "Joy", "Ramos")?;

    let health = HealthService::new(store.clone());
    let payload = json!({
        "resident_id": resident.id,
        "record_type": "PRENATAL",
        "description": "Second trimester checkup",
        "weight_kg": "58.25",
        "height_cm": 157,
    });

    let err = health.record(&session(Role::Secretary), &payload).unwrap_err();
    assert_eq!(status_code_of(&err), 403);

    let record = health.record(&worker, &payload)?;
    assert_eq!(record.weight_grams, Some(58_250));
    assert_eq!(record.height_mm, Some(1_570));
    assert_eq!(record.resident_name, "Joy Ramos");

    let prenatal = health.list(&worker, &ListQuery::new().with_category("prenatal"))?;
    assert_eq!(prenatal.total, 1);
    assert_eq!(health.for_resident(&worker, &resident.id)?.len(), 1);

    // Captains may read but not write.
    let captain = session(Role::Captain);
    health.get(&captain, &record.id)?;
    let err = health
        .update(&captain, &record.id, &json!({ "description": "edited" }))
        .unwrap_err();
    assert_eq!(status_code_of(&err), 403);

    Ok(())
}

#[test]
fn oversized_amounts_never_reach_the_ledger() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_budget_ceiling.db"))?;
    let treasurer = session(Role::Treasurer);

    let budget = BudgetService::new(store.clone());
    let period = budget.open_period(&treasurer, &json!({ "year": 2026, "total_budget": 1_000 }))?;
    let huge = json!({ "category": "OTHER", "amount": 100_000_000_000_000_000u64 });

    for _ in 0..2 {
        let err = budget.allocate(&treasurer, &period.id, &huge).unwrap_err();
        assert_eq!(status_code_of(&err), 400);
    }
    assert!(budget.allocations(&treasurer, &period.id)?.is_empty());

    let summary = budget.summary(&treasurer, &period.id)?;
    assert_eq!(summary.allocated, 0);
    assert_eq!(summary.remaining, 100_000);
    ReportService::new(store.clone()).budget(&treasurer, 2026)?;

    let resident = register(&store, "Ana", "Cruz")?;
    let err = HealthService::new(store.clone())
        .record(
            &session(Role::HealthWorker),
            &json!({
                "resident_id": resident.id,
                "record_type": "CHECKUP",
                "description": "weighing",
                "weight_kg": 1e17,
            }),
        )
        .unwrap_err();
    assert_eq!(status_code_of(&err), 400);

    Ok(())
}

#[test]
fn residents_with_live_records_are_kept() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_resident_guard.db"))?;
    let admin = session(Role::SuperAdmin);
    let kagawad = session(Role::Kagawad);
    let residents = ResidentService::new(store.clone());
    let disaster = DisasterService::new(store.clone());

    let missing = register(&store, "Lito", "Garcia")?;
    let event = disaster.start_event(&kagawad, &json!({ "name": "Flash flood", "event_type": "FLOOD" }))?;
    let report = disaster.report_missing(
        &kagawad,
        &json!({ "resident_id": missing.id, "event_id": event.id }),
    )?;

    let err = residents.delete(&admin, &missing.id).unwrap_err();
    assert!(matches!(
        RecordError::classify(&err),
        Some(RecordError::DependencyBlocked(_))
    ));
    assert_eq!(residents.get(&admin, &missing.id)?, missing);

    disaster.mark_found(&kagawad, &report.id, &json!({}))?;
    residents.delete(&admin, &missing.id)?;

    let requester = register(&store, "Nena", "Villanueva")?;
    let documents = DocumentService::new(store.clone());
    let document = documents.request(
        &session(Role::Secretary),
        &json!({
            "resident_id": requester.id,
            "document_type": "barangay clearance",
            "purpose": "Travel",
        }),
    )?;
    let err = residents.delete(&admin, &requester.id).unwrap_err();
    assert_eq!(status_code_of(&err), 409);

    documents.transition(
        &session(Role::Secretary),
        &document.id,
        &json!({ "status": "CANCELLED" }),
    )?;
    residents.delete(&admin, &requester.id)?;
    assert_eq!(
        status_code_of(&residents.get(&admin, &requester.id).unwrap_err()),
        404
    );

    Ok(())
}

#[test]
fn concurrent_evacuations_never_overfill_a_center() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Store::open(temp_dir.path().join("test_evacuation_race.db"))?;
    let secretary = session(Role::Secretary);

    let households = HouseholdService::new(store.clone());
    let disaster = DisasterService::new(store.clone());
    let center = disaster.create_center(
        &secretary,
        &json!({ "name": "Chapel", "location": "Purok 3", "capacity": 3 }),
    )?;

    let mut profiles: Vec<RiskProfile> = Vec::new();
    for n in 0..8 {
        let household = households.create(
            &secretary,
            &json!({ "address": format!("{n} Luna St"), "purok": "Purok 3" }),
        )?;
        profiles.push(disaster.create_profile(
            &secretary,
            &json!({ "household_id": household.id, "risk_level": "MEDIUM" }),
        )?);
    }

    let barrier = Arc::new(Barrier::new(profiles.len()));
    let handles: Vec<_> = profiles
        .iter()
        .map(|profile| {
            let disaster = DisasterService::new(store.clone());
            let barrier = Arc::clone(&barrier);
            let profile_id = profile.id.clone();
            let center_id = center.id.clone();
            std::thread::spawn(move || {
                barrier.wait();
                disaster
                    .evacuate(&session(Role::Secretary), &profile_id, &center_id)
                    .is_ok()
            })
        })
        .collect();

    let admitted = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker panicked"))
        .filter(|ok| *ok)
        .count();
    assert_eq!(admitted, 3);
    assert_eq!(store.seats(&center.id)?, 3);
    assert_eq!(
        ReportService::new(store.clone())
            .disaster(&secretary)?
            .evacuated_households,
        3
    );

    // Leaving frees the seat for someone else.
    let inside = disaster.list_profiles(&secretary, &ListQuery::new().with_status("evacuated"))?;
    disaster.return_home(&secretary, &inside.items[0].id)?;
    assert_eq!(store.seats(&center.id)?, 2);

    Ok(())
}
