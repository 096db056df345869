//! Document and certificate requests
use super::auth::{Action, Module, Session, authorize};
use super::error::{FieldErrors, FieldReason, RecordError};
use super::history::{self, Witness};
use super::lifecycle::{Lifecycle, Transition, plan_transition};
use super::resident::Resident;
use super::sequence::SequenceGenerator;
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
    pub enum DocumentType {
        BarangayClearance = (0, "BARANGAY_CLEARANCE"),
        CertificateOfResidency = (1, "CERTIFICATE_OF_RESIDENCY"),
        CertificateOfIndigency = (2, "CERTIFICATE_OF_INDIGENCY"),
        BusinessClearance = (3, "BUSINESS_CLEARANCE"),
        FirstTimeJobseeker = (4, "FIRST_TIME_JOBSEEKER"),
    }
}

impl DocumentType {
    /// Control number prefix. Each type is numbered on its own.
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentType::BarangayClearance => "BC",
            DocumentType::CertificateOfResidency => "CR",
            DocumentType::CertificateOfIndigency => "CI",
            DocumentType::BusinessClearance => "BZ",
            DocumentType::FirstTimeJobseeker => "FJ",
        }
    }

    /// Heading printed on the certificate.
    pub fn title(&self) -> &'static str {
        match self {
            DocumentType::BarangayClearance => "BARANGAY CLEARANCE",
            DocumentType::CertificateOfResidency => "CERTIFICATE OF RESIDENCY",
            DocumentType::CertificateOfIndigency => "CERTIFICATE OF INDIGENCY",
            DocumentType::BusinessClearance => "BARANGAY BUSINESS CLEARANCE",
            DocumentType::FirstTimeJobseeker => "FIRST TIME JOBSEEKER CERTIFICATION",
        }
    }
}

labelled_enum! {
    pub enum DocumentStatus {
        Pending = (0, "PENDING"),
        Processing = (1, "PROCESSING"),
        Ready = (2, "READY"),
        Released = (3, "RELEASED"),
        Rejected = (4, "REJECTED"),
        Cancelled = (5, "CANCELLED"),
    }
}

impl Lifecycle for DocumentStatus {
    const RECORD: &'static str = "Document request";

    fn initial() -> Self {
        DocumentStatus::Pending
    }

    fn targets(self) -> &'static [Self] {
        use DocumentStatus::*;
        match self {
            Pending => &[Processing, Rejected, Cancelled],
            Processing => &[Ready, Rejected, Cancelled],
            Ready => &[Released, Rejected, Cancelled],
            Released | Rejected | Cancelled => &[],
        }
    }

    fn label(self) -> &'static str {
        self.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct DocumentRequest {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub control_number: String,
    #[n(2)]
    pub resident_id: String,
    #[n(3)]
    pub resident_name: String, // as registered when requested
    #[n(4)]
    pub document_type: DocumentType,
    #[n(5)]
    pub purpose: String,
    #[n(6)]
    pub fee: u64, // centavos
    #[n(7)]
    pub or_number: Option<String>,
    #[n(8)]
    pub status: DocumentStatus,
    #[n(9)]
    pub remarks: Option<String>,
    #[n(10)]
    pub created_at: TimeStamp<Utc>,
    #[n(11)]
    pub created_by: String,
    #[n(12)]
    pub status_changed_at: Option<TimeStamp<Utc>>,
    #[n(13)]
    pub issued_by: Option<String>,
    #[n(14)]
    pub issued_at: Option<TimeStamp<Utc>>,
    #[n(15)]
    pub released_at: Option<TimeStamp<Utc>>,
}

impl Record for DocumentRequest {
    const KIND: &'static str = "document";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Listable for DocumentRequest {
    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
    fn category_label(&self) -> Option<&str> {
        Some(self.document_type.as_str())
    }
    fn search_text(&self) -> String {
        format!(
            "{} {} {}",
            self.control_number, self.resident_name, self.purpose
        )
    }
    fn listed_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
}

pub fn request_schema() -> Schema {
    Schema::new(&[
        Field::required("resident_id", FieldKind::Text),
        Field::required("document_type", FieldKind::Choice(DocumentType::LABELS)),
        Field::required("purpose", FieldKind::Text),
        Field::optional("fee", FieldKind::MONEY),
        Field::optional("or_number", FieldKind::Text),
    ])
}

pub fn transition_schema() -> Schema {
    Schema::new(&[
        Field::required("status", FieldKind::Choice(DocumentStatus::LABELS)),
        Field::optional("remarks", FieldKind::Text),
        Field::optional("or_number", FieldKind::Text),
    ])
}

pub struct DocumentService {
    store: Store,
    sequence: SequenceGenerator,
}

impl DocumentService {
    pub fn new(store: Store) -> Self {
        Self {
            sequence: SequenceGenerator::new(store.clone()),
            store,
        }
    }

    /// File a new request. It starts PENDING with a fresh control number.
    pub fn request(&self, session: &Session, payload: &Value) -> anyhow::Result<DocumentRequest> {
        let actor = authorize(session, Module::Documents, Action::Create)?;
        let input = request_schema().check(payload)?;

        let resident: Resident = self.store.require(&input.require_text("resident_id")?)?;
        if !resident.is_active() {
            return Err(RecordError::Conflict(format!(
                "{} is not an active resident",
                resident.full_name()
            ))
            .into());
        }

        let document_type: DocumentType = input.require_choice("document_type")?;
        let created_at = TimeStamp::new();
        let document = DocumentRequest {
            id: utils::new_uuid_to_bech32("doc_")?,
            control_number: self.sequence.next(document_type.prefix(), created_at.year())?,
            resident_id: resident.id.clone(),
            resident_name: resident.full_name(),
            document_type,
            purpose: input.require_text("purpose")?,
            fee: input.amount("fee").unwrap_or(0),
            or_number: input.text("or_number"),
            status: DocumentStatus::initial(),
            remarks: None,
            created_at,
            created_by: actor.id.clone(),
            status_changed_at: None,
            issued_by: None,
            issued_at: None,
            released_at: None,
        };

        self.store.put(&document)?;
        info!(
            document = %document.id,
            control_number = %document.control_number,
            actor = %actor.id,
            "document requested"
        );

        Ok(document)
    }

    pub fn get(&self, session: &Session, id: &str) -> anyhow::Result<DocumentRequest> {
        authorize(session, Module::Documents, Action::View)?;
        self.store.require(id)
    }

    pub fn list(
        &self,
        session: &Session,
        query: &ListQuery,
    ) -> anyhow::Result<Listing<DocumentRequest>> {
        authorize(session, Module::Documents, Action::View)?;
        Ok(query.apply(self.store.all()?))
    }

    /// Move a request to the named status.
    ///
    /// READY records who issued it, RELEASED stamps the release time and
    /// REJECTED needs remarks. Naming the current status changes nothing.
    pub fn transition(
        &self,
        session: &Session,
        id: &str,
        payload: &Value,
    ) -> anyhow::Result<DocumentRequest> {
        let actor = authorize(session, Module::Documents, Action::Update)?;
        let input = transition_schema().check(payload)?;
        let mut document: DocumentRequest = self.store.require(id)?;

        let target: DocumentStatus = input.require_choice("status")?;
        let (from, to) = match plan_transition(document.status, target)? {
            Transition::Unchanged(status) => {
                debug!(document = %document.id, status = %status, "status unchanged");
                return Ok(document);
            }
            Transition::Advance { from, to } => (from, to),
        };

        let remarks = input.text("remarks");
        if to == DocumentStatus::Rejected && remarks.is_none() {
            return Err(RecordError::ValidationFailed(FieldErrors::single(
                "remarks",
                FieldReason::Required,
            ))
            .into());
        }

        let now = TimeStamp::new();
        match to {
            DocumentStatus::Ready => {
                document.issued_by = Some(actor.id.clone());
                document.issued_at = Some(now.clone());
            }
            DocumentStatus::Released => document.released_at = Some(now.clone()),
            _ => {}
        }
        if remarks.is_some() {
            document.remarks = remarks.clone();
        }
        if let Some(or_number) = input.text("or_number") {
            document.or_number = Some(or_number);
        }
        document.status = to;
        document.status_changed_at = Some(now.clone());

        let mut batch = Batch::default();
        Store::stage(&mut batch, &document)?;
        Witness::new(&document.id, &actor.id, now, from.as_str(), to.as_str())
            .with_note(remarks)
            .stage(&mut batch)?;
        self.store.apply(batch)?;

        info!(
            document = %document.id,
            control_number = %document.control_number,
            from = %from,
            to = %to,
            actor = %actor.id,
            "document status changed"
        );

        Ok(document)
    }

    pub fn history(&self, session: &Session, id: &str) -> anyhow::Result<Vec<Witness>> {
        authorize(session, Module::Documents, Action::View)?;
        self.store.require::<DocumentRequest>(id)?;
        history::history(&self.store, id)
    }
}
