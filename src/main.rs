//! barangay - read-only reports, exports and certificates

use barangay_records::{
    auth::{POLICY, Session},
    certificate::{self, TextCanvas},
    config::{Args, Command, ExportKind, ReportKind},
    error::status_code_of,
    export::{ExportService, attachment_header},
    report::ReportService,
    store::Store,
    types::TimeStamp,
};
use clap::Parser;
use std::io::Write;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("barangay_records={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(2);
    }

    if let Err(err) = run(&args) {
        error!(status = status_code_of(&err), "{err:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn open(args: &Args) -> anyhow::Result<(Store, Session)> {
    let store = Store::open(&args.db_path)?;
    info!(db = %args.db_path.display(), actor = %args.actor_id, "database opened");
    Ok((store, args.session()?))
}

fn run(args: &Args) -> anyhow::Result<()> {
    let today = TimeStamp::new().date_naive();

    match &args.command {
        Command::Policy => print_json(&POLICY),
        Command::Report { kind, year } => {
            let (store, session) = open(args)?;
            let reports = ReportService::new(store);
            match kind {
                ReportKind::Population => print_json(&reports.population(&session, today)?),
                ReportKind::Households => print_json(&reports.households(&session)?),
                ReportKind::Disaster => print_json(&reports.disaster(&session)?),
                ReportKind::Dashboard => print_json(&reports.dashboard(&session)?),
                ReportKind::Budget => {
                    let year = year.unwrap_or(TimeStamp::new().year());
                    print_json(&reports.budget(&session, year)?)
                }
            }
        }
        Command::Export { kind } => {
            let (store, session) = open(args)?;
            let exports = ExportService::new(store);
            let csv = match kind {
                ExportKind::Residents => exports.residents(&session, today)?,
                ExportKind::Households => exports.households(&session)?,
                ExportKind::DisasterProfiles => exports.risk_profiles(&session)?,
                ExportKind::EvacuationCenters => exports.evacuation_centers(&session)?,
                ExportKind::MissingPersons => exports.missing_persons(&session)?,
            };
            info!(disposition = %attachment_header(kind.file_stem(), today), "export ready");
            std::io::stdout().write_all(csv.as_bytes())?;
            Ok(())
        }
        Command::Certificate { document_id } => {
            let (store, session) = open(args)?;
            let mut canvas = TextCanvas::default();
            let bytes = certificate::print(
                &store,
                &session,
                document_id,
                &mut canvas,
                &args.letterhead(),
            )?;
            std::io::stdout().write_all(&bytes)?;
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
