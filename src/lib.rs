//! Record lifecycle, numbering, authorization and reporting for barangay
//! profiling: residents, households, documents, blotter, budget, projects,
//! officials, health and disaster preparedness.

pub mod auth;
pub mod blotter;
pub mod budget;
pub mod certificate;
pub mod config;
pub mod disaster;
pub mod document;
pub mod error;
pub mod export;
pub mod health;
pub mod history;
pub mod household;
pub mod lifecycle;
pub mod official;
pub mod project;
pub mod report;
pub mod resident;
pub mod sequence;
pub mod store;
pub mod types;
pub mod utils;
pub mod validate;
