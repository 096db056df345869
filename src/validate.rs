//! Schema validation for untrusted JSON payloads
//!
//! Every create and update passes its payload through a [`Schema`] before any
//! record is touched. Validation is pure and reports every violated field at
//! once so a form can highlight all of them in one round trip.
use super::error::{FieldErrors, FieldReason, RecordError};
use super::types::{TimeStamp, normalize_label};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Ceiling for money fields: one trillion pesos, in centavos.
pub const MAX_AMOUNT: u64 = 100_000_000_000_000;

impl FieldKind {
    /// A money field bounded by [`MAX_AMOUNT`].
    pub const MONEY: FieldKind = FieldKind::Amount { max: MAX_AMOUNT };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Non-empty string after trimming. Numbers are accepted and stringified.
    Text,
    /// Whole number within `min..=max`, from a JSON number or numeric string.
    Integer { min: i64, max: i64 },
    /// Non-negative pesos with at most two decimals, stored as centavos.
    /// `max` is in centavos.
    Amount { max: u64 },
    /// One label out of a closed set.
    Choice(&'static [&'static str]),
    Flag,
    /// `YYYY-MM-DD` or RFC 3339.
    Date,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl Field {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }
    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Amount(u64),
    Choice(&'static str),
    Flag(bool),
    Date(TimeStamp<Utc>),
}

/// A payload that satisfied its schema. Only declared fields survive.
#[derive(Debug, Clone, Default)]
pub struct Validated {
    values: BTreeMap<&'static str, FieldValue>,
}

impl Schema {
    pub fn new(fields: &[Field]) -> Self {
        Self {
            fields: fields.to_vec(),
        }
    }

    /// Same fields, none required. Used for partial updates.
    pub fn partial(&self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|f| Field::optional(f.name, f.kind))
                .collect(),
        }
    }

    pub fn validate(&self, payload: &Value) -> Result<Validated, FieldErrors> {
        let Some(object) = payload.as_object() else {
            return Err(FieldErrors::single("_payload", FieldReason::WrongType));
        };

        let mut errors = FieldErrors::new();
        let mut values = BTreeMap::new();

        for field in &self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors.insert(field.name, FieldReason::Required);
                    }
                }
                Some(raw) => match coerce(field.kind, raw) {
                    Ok(Some(value)) => {
                        values.insert(field.name, value);
                    }
                    // blank optional input is treated as absent
                    Ok(None) if !field.required => {}
                    Ok(None) => errors.insert(field.name, FieldReason::Empty),
                    Err(reason) => errors.insert(field.name, reason),
                },
            }
        }

        if errors.is_empty() {
            Ok(Validated { values })
        } else {
            Err(errors)
        }
    }

    /// [`Schema::validate`] with the failure lifted into the service error type.
    pub fn check(&self, payload: &Value) -> anyhow::Result<Validated> {
        self.validate(payload)
            .map_err(|errors| RecordError::ValidationFailed(errors).into())
    }
}

// Ok(None) means the input was blank.
fn coerce(kind: FieldKind, raw: &Value) -> Result<Option<FieldValue>, FieldReason> {
    match kind {
        FieldKind::Text => {
            let text = match raw {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => return Err(FieldReason::WrongType),
            };
            Ok((!text.is_empty()).then_some(FieldValue::Text(text)))
        }
        FieldKind::Integer { min, max } => {
            let Some(number) = integer_of(raw)? else {
                return Ok(None);
            };
            if number < min || number > max {
                return Err(FieldReason::OutOfRange);
            }
            Ok(Some(FieldValue::Integer(number)))
        }
        FieldKind::Amount { max } => match amount_of(raw)? {
            Some(amount) if amount > max => Err(FieldReason::OutOfRange),
            amount => Ok(amount.map(FieldValue::Amount)),
        },
        FieldKind::Choice(labels) => {
            let Value::String(s) = raw else {
                return Err(FieldReason::WrongType);
            };
            if s.trim().is_empty() {
                return Ok(None);
            }
            let normalized = normalize_label(s);
            labels
                .iter()
                .find(|label| **label == normalized)
                .map(|label| Some(FieldValue::Choice(*label)))
                .ok_or(FieldReason::NotInSet)
        }
        FieldKind::Flag => match raw {
            Value::Bool(b) => Ok(Some(FieldValue::Flag(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Some(FieldValue::Flag(false))),
                Some(1) => Ok(Some(FieldValue::Flag(true))),
                _ => Err(FieldReason::NotABoolean),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "" => Ok(None),
                "true" | "yes" | "1" | "on" => Ok(Some(FieldValue::Flag(true))),
                "false" | "no" | "0" | "off" => Ok(Some(FieldValue::Flag(false))),
                _ => Err(FieldReason::NotABoolean),
            },
            _ => Err(FieldReason::NotABoolean),
        },
        FieldKind::Date => {
            let Value::String(s) = raw else {
                return Err(FieldReason::WrongType);
            };
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Ok(Some(FieldValue::Date(TimeStamp::from_date(date))));
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| Some(FieldValue::Date(dt.with_timezone(&Utc).into())))
                .map_err(|_| FieldReason::InvalidDate)
        }
    }
}

fn integer_of(raw: &Value) -> Result<Option<i64>, FieldReason> {
    match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
                Some(_) => Err(FieldReason::NotANumber),
                None => Err(FieldReason::OutOfRange),
            }
        }
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| FieldReason::NotANumber),
        _ => Err(FieldReason::NotANumber),
    }
}

fn amount_of(raw: &Value) -> Result<Option<u64>, FieldReason> {
    match raw {
        Value::Number(n) => {
            if let Some(whole) = n.as_u64() {
                return whole
                    .checked_mul(100)
                    .map(Some)
                    .ok_or(FieldReason::OutOfRange);
            }
            let f = n.as_f64().ok_or(FieldReason::NotANumber)?;
            if f < 0.0 {
                return Err(FieldReason::Negative);
            }
            let centavos = (f * 100.0).round();
            if centavos >= u64::MAX as f64 {
                return Err(FieldReason::OutOfRange);
            }
            Ok(Some(centavos as u64))
        }
        Value::String(s) => {
            let s = s.trim().replace(',', "");
            if s.is_empty() {
                return Ok(None);
            }
            if s.starts_with('-') {
                return Err(FieldReason::Negative);
            }
            parse_centavos(&s).map(Some)
        }
        _ => Err(FieldReason::NotANumber),
    }
}

fn parse_centavos(s: &str) -> Result<u64, FieldReason> {
    let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
    let digits = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
    if !digits(whole) || (!fraction.is_empty() && !digits(fraction)) || fraction.len() > 2 {
        return Err(FieldReason::NotANumber);
    }
    let whole: u64 = whole.parse().map_err(|_| FieldReason::OutOfRange)?;
    let cents: u64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<u64>().map_err(|_| FieldReason::NotANumber)? * 10,
        _ => fraction.parse().map_err(|_| FieldReason::NotANumber)?,
    };
    whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(cents))
        .ok_or(FieldReason::OutOfRange)
}

impl Validated {
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn text(&self, name: &str) -> Option<String> {
        match self.values.get(name) {
            Some(FieldValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(FieldValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }
    pub fn amount(&self, name: &str) -> Option<u64> {
        match self.values.get(name) {
            Some(FieldValue::Amount(a)) => Some(*a),
            _ => None,
        }
    }
    pub fn choice<E: FromStr>(&self, name: &str) -> Option<E> {
        match self.values.get(name) {
            Some(FieldValue::Choice(label)) => label.parse().ok(),
            _ => None,
        }
    }
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(FieldValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }
    pub fn date(&self, name: &str) -> Option<TimeStamp<Utc>> {
        match self.values.get(name) {
            Some(FieldValue::Date(d)) => Some(d.clone()),
            _ => None,
        }
    }

    // The require_* accessors back up fields a schema already marks as
    // required, so a miss means the schema and the caller disagree.
    pub fn require_text(&self, name: &str) -> anyhow::Result<String> {
        self.text(name).ok_or_else(|| missing(name))
    }
    pub fn require_amount(&self, name: &str) -> anyhow::Result<u64> {
        self.amount(name).ok_or_else(|| missing(name))
    }
    pub fn require_integer(&self, name: &str) -> anyhow::Result<i64> {
        self.integer(name).ok_or_else(|| missing(name))
    }
    pub fn require_choice<E: FromStr>(&self, name: &str) -> anyhow::Result<E> {
        self.choice(name).ok_or_else(|| missing(name))
    }
    pub fn require_date(&self, name: &str) -> anyhow::Result<TimeStamp<Utc>> {
        self.date(name).ok_or_else(|| missing(name))
    }
}

fn missing(name: &str) -> anyhow::Error {
    RecordError::ValidationFailed(FieldErrors::single(name, FieldReason::Required)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SEXES: &[&str] = &["MALE", "FEMALE"];

    fn schema() -> Schema {
        Schema::new(&[
            Field::required("first_name", FieldKind::Text),
            Field::required("sex", FieldKind::Choice(SEXES)),
            Field::optional("age", FieldKind::Integer { min: 0, max: 150 }),
            Field::optional("fee", FieldKind::MONEY),
            Field::optional("voter", FieldKind::Flag),
            Field::optional("birth_date", FieldKind::Date),
        ])
    }

    #[test]
    fn accepts_and_coerces() {
        let payload = json!({
            "first_name": "  Maria ",
            "sex": "female",
            "age": "34",
            "fee": "50.5",
            "voter": "yes",
            "birth_date": "1990-02-14",
            "unknown": "ignored",
        });
        let valid = schema().validate(&payload).unwrap();

        assert_eq!(valid.text("first_name").as_deref(), Some("Maria"));
        assert_eq!(valid.integer("age"), Some(34));
        assert_eq!(valid.amount("fee"), Some(5_050));
        assert_eq!(valid.flag("voter"), Some(true));
        assert_eq!(valid.date("birth_date").unwrap().year(), 1990);
        assert!(!valid.contains("unknown"));
    }

    #[test]
    fn reports_every_violation() {
        let payload = json!({
            "first_name": "   ",
            "sex": "other",
            "age": 200,
            "fee": -1,
            "voter": "maybe",
            "birth_date": "14/02/1990",
        });
        let errors = schema().validate(&payload).unwrap_err();

        assert_eq!(errors.len(), 6);
        assert_eq!(errors.get("first_name"), Some(FieldReason::Empty));
        assert_eq!(errors.get("sex"), Some(FieldReason::NotInSet));
        assert_eq!(errors.get("age"), Some(FieldReason::OutOfRange));
        assert_eq!(errors.get("fee"), Some(FieldReason::Negative));
        assert_eq!(errors.get("voter"), Some(FieldReason::NotABoolean));
        assert_eq!(errors.get("birth_date"), Some(FieldReason::InvalidDate));
    }

    #[test]
    fn missing_and_null_are_required_failures() {
        let errors = schema().validate(&json!({ "sex": null })).unwrap_err();
        assert_eq!(errors.get("first_name"), Some(FieldReason::Required));
        assert_eq!(errors.get("sex"), Some(FieldReason::Required));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let errors = schema().validate(&json!(["Maria"])).unwrap_err();
        assert_eq!(errors.get("_payload"), Some(FieldReason::WrongType));
    }

    #[test]
    fn partial_schema_allows_sparse_updates() {
        let valid = schema().partial().validate(&json!({ "age": 40 })).unwrap();
        assert_eq!(valid.integer("age"), Some(40));
        assert!(valid.text("first_name").is_none());
    }

    #[test]
    fn amounts_reject_excess_precision() {
        let errors = schema().validate(&json!({
            "first_name": "Ana", "sex": "FEMALE", "fee": "1.005"
        }));
        assert_eq!(errors.unwrap_err().get("fee"), Some(FieldReason::NotANumber));
    }

    #[test]
    fn check_wraps_validation_failures() {
        let err = schema().check(&json!({})).unwrap_err();
        assert_eq!(crate::error::status_code_of(&err), 400);
    }
}
