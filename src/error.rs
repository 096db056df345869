use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Failures a caller can act on. Anything else coming out of a service is an
/// infrastructure error from the store or a codec and maps to a 500.
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("No active session")]
    Unauthenticated,
    #[error("Role {role} may not {action} {module}")]
    Unauthorized {
        role: &'static str,
        module: &'static str,
        action: &'static str,
    },
    #[error("Validation failed: {0}")]
    ValidationFailed(FieldErrors),
    #[error("{kind} `{id}` was not found")]
    NotFound { kind: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    DependencyBlocked(String),
}

impl RecordError {
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        RecordError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// The HTTP status a request surface reports for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            RecordError::Unauthenticated => 401,
            RecordError::Unauthorized { .. } => 403,
            RecordError::ValidationFailed(_) => 400,
            RecordError::NotFound { .. } => 404,
            RecordError::Conflict(_) | RecordError::DependencyBlocked(_) => 409,
        }
    }

    /// Finds the domain error inside an `anyhow` chain, if there is one.
    pub fn classify(err: &anyhow::Error) -> Option<&RecordError> {
        err.downcast_ref::<RecordError>()
    }
}

/// Status for any service error, domain or not.
pub fn status_code_of(err: &anyhow::Error) -> u16 {
    RecordError::classify(err).map_or(500, RecordError::status_code)
}

/// Machine readable reason a single field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldReason {
    Required,
    Empty,
    NotANumber,
    OutOfRange,
    Negative,
    NotInSet,
    NotABoolean,
    InvalidDate,
    WrongType,
}

impl FieldReason {
    pub fn code(&self) -> &'static str {
        match self {
            FieldReason::Required => "required",
            FieldReason::Empty => "empty",
            FieldReason::NotANumber => "not_a_number",
            FieldReason::OutOfRange => "out_of_range",
            FieldReason::Negative => "negative",
            FieldReason::NotInSet => "not_in_set",
            FieldReason::NotABoolean => "not_a_boolean",
            FieldReason::InvalidDate => "invalid_date",
            FieldReason::WrongType => "wrong_type",
        }
    }
}

/// Every rejected field of one payload, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, FieldReason>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn single(field: &str, reason: FieldReason) -> Self {
        let mut errors = Self::new();
        errors.insert(field, reason);
        errors
    }
    pub fn insert(&mut self, field: &str, reason: FieldReason) {
        self.0.insert(field.to_string(), reason);
    }
    pub fn get(&self, field: &str) -> Option<FieldReason> {
        self.0.get(field).copied()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, reason)| format!("{field}: {}", reason.code()))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

impl From<FieldErrors> for RecordError {
    fn from(value: FieldErrors) -> Self {
        RecordError::ValidationFailed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_domain_errors_through_anyhow() {
        let err: anyhow::Error = RecordError::Conflict("already found".into()).into();
        assert_eq!(status_code_of(&err), 409);

        let err = anyhow::anyhow!("disk on fire");
        assert_eq!(status_code_of(&err), 500);
        assert!(RecordError::classify(&err).is_none());
    }

    #[test]
    fn field_errors_serialize_as_a_map() {
        let mut errors = FieldErrors::single("purpose", FieldReason::Empty);
        errors.insert("status", FieldReason::NotInSet);

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["purpose"], "empty");
        assert_eq!(json["status"], "not_in_set");
        assert_eq!(errors.to_string(), "purpose: empty, status: not_in_set");
    }
}
