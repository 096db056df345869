//! Command line and environment configuration
//!
//! Every flag has an environment fallback, and a `.env` file is read before
//! parsing.
use super::auth::{Actor, IdentityProvider, Role, Session, StaticIdentity};
use super::certificate::Letterhead;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Barangay records: reports, exports and certificates from the local database
#[derive(Parser, Debug, Clone)]
#[command(name = "barangay")]
#[command(about = "Reports, CSV exports and certificates for barangay records")]
pub struct Args {
    /// Path of the sled database directory
    #[arg(long, env = "BARANGAY_DB", default_value = "barangay.db")]
    pub db_path: PathBuf,

    /// Barangay name printed on certificates
    #[arg(long, env = "BARANGAY_NAME", default_value = "")]
    pub barangay_name: String,

    /// Municipality or city of the barangay
    #[arg(long, env = "BARANGAY_MUNICIPALITY", default_value = "")]
    pub municipality: String,

    /// Province, if it should appear on the letterhead
    #[arg(long, env = "BARANGAY_PROVINCE")]
    pub province: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Identity the command acts as
    #[arg(long, env = "BARANGAY_ACTOR_ID", default_value = "cli")]
    pub actor_id: String,

    #[arg(long, env = "BARANGAY_ACTOR_NAME", default_value = "Command line")]
    pub actor_name: String,

    /// Role label, e.g. SECRETARY or CAPTAIN
    #[arg(long, env = "BARANGAY_ACTOR_ROLE", default_value = "SECRETARY")]
    pub actor_role: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print a report as JSON
    Report {
        #[arg(value_enum)]
        kind: ReportKind,
        /// Budget year; defaults to the current year
        #[arg(long)]
        year: Option<i32>,
    },
    /// Print a CSV export
    Export {
        #[arg(value_enum)]
        kind: ExportKind,
    },
    /// Render a READY or RELEASED document as plain text
    Certificate { document_id: String },
    /// Print the role permission table as JSON
    Policy,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Population,
    Households,
    Disaster,
    Budget,
    Dashboard,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Residents,
    Households,
    DisasterProfiles,
    EvacuationCenters,
    MissingPersons,
}

impl ExportKind {
    /// Base of the suggested download name.
    pub fn file_stem(&self) -> &'static str {
        match self {
            ExportKind::Residents => "residents",
            ExportKind::Households => "households",
            ExportKind::DisasterProfiles => "disaster-profiles",
            ExportKind::EvacuationCenters => "evacuation-centers",
            ExportKind::MissingPersons => "missing-persons",
        }
    }
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.barangay_name.trim().is_empty() {
            return Err("BARANGAY_NAME is required".to_string());
        }
        if self.actor_role.parse::<Role>().is_err() {
            return Err(format!(
                "BARANGAY_ACTOR_ROLE `{}` is not one of {}",
                self.actor_role,
                Role::LABELS.join(", ")
            ));
        }
        Ok(())
    }

    pub fn session(&self) -> anyhow::Result<Session> {
        let role: Role = self.actor_role.parse()?;
        let identity = StaticIdentity(Some(Actor::new(&self.actor_id, &self.actor_name, role)));
        Ok(identity.session())
    }

    pub fn letterhead(&self) -> Letterhead {
        Letterhead {
            barangay: self.barangay_name.trim().to_string(),
            municipality: self.municipality.trim().to_string(),
            province: self.province.clone().filter(|p| !p.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["barangay", "--barangay-name", "San Roque"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn parses_subcommands() {
        let args = parse(&["export", "disaster-profiles"]);
        assert!(matches!(
            args.command,
            Command::Export {
                kind: ExportKind::DisasterProfiles
            }
        ));
        let args = parse(&["report", "budget", "--year", "2024"]);
        assert!(matches!(
            args.command,
            Command::Report {
                kind: ReportKind::Budget,
                year: Some(2024)
            }
        ));
    }

    #[test]
    fn role_must_be_known() {
        let args = parse(&["--actor-role", "mayor", "policy"]);
        assert!(args.validate().is_err());

        let args = parse(&["--actor-role", "health worker", "policy"]);
        assert!(args.validate().is_ok());
        assert_eq!(
            args.session().unwrap().actor().map(|a| a.role),
            Some(Role::HealthWorker)
        );
    }

    #[test]
    fn blank_barangay_name_is_rejected() {
        let args = Args::try_parse_from(["barangay", "--barangay-name", " ", "policy"]).unwrap();
        assert!(args.validate().is_err());
    }
}
