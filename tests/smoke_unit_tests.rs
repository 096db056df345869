//! Smoke screen unit tests for the record components
//!
//! Unit tests that span the codebase, testing behavior in isolation from the
//! integration scenarios. Mostly happy-path.

use barangay_records::{
    auth::{Action, Module, Role, allowed, allowed_path, module_for_path},
    error::{FieldReason, RecordError, status_code_of},
    history::Witness,
    sequence::{format_control_number, parse_control_number},
    types::{ListQuery, TimeStamp},
    utils::{format_centavos, new_uuid_to_bech32, percentage},
    validate::{Field, FieldKind, Schema},
};
use serde_json::json;

// UTILS MODULE TESTS
mod utils_tests {
    use super::*;

    /// Ids carry their record prefix as the bech32 human-readable part
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let id = new_uuid_to_bech32("res_").unwrap();
        assert!(id.starts_with("res_1"));
        assert!(id.len() > 10);
    }

    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn ids_do_not_repeat() {
        let a = new_uuid_to_bech32("doc_").unwrap();
        let b = new_uuid_to_bech32("doc_").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn percentages_round_to_two_places() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn centavos_print_as_pesos() {
        assert_eq!(format_centavos(123_456), "1234.56");
        assert_eq!(format_centavos(5), "0.05");
    }
}

// SEQUENCE MODULE TESTS
mod sequence_tests {
    use super::*;

    #[test]
    fn control_numbers_round_trip() {
        let number = format_control_number("HH", 2024, 42);
        assert_eq!(number, "HH-2024-000042");
        assert_eq!(
            parse_control_number(&number),
            Some(("HH".to_string(), 2024, 42))
        );
    }

    #[test]
    fn malformed_numbers_do_not_parse() {
        assert_eq!(parse_control_number("BC-24-000001"), None);
        assert_eq!(parse_control_number("2024-000001"), None);
        assert_eq!(parse_control_number("BC-2024-1"), None);
    }
}

// AUTH MODULE TESTS
mod auth_tests {
    use super::*;

    #[test]
    fn pages_follow_view_grants() {
        assert!(allowed_path(Role::HealthWorker, "/health/records"));
        assert!(!allowed_path(Role::HealthWorker, "/budget"));
        assert!(allowed_path(Role::Staff, "/api/residents?page=2"));
        assert!(allowed_path(Role::Staff, "/dashboard"));
        assert!(!allowed_path(Role::Staff, "/unknown"));
    }

    #[test]
    fn route_prefixes_match_whole_segments() {
        assert_eq!(module_for_path("/blotter/12"), Some(Module::Blotter));
        assert_eq!(module_for_path("/blotters"), None);
    }

    #[test]
    fn nobody_but_super_admin_deletes() {
        for role in Role::ALL.iter().filter(|r| **r != Role::SuperAdmin) {
            assert!(!allowed(*role, Module::Residents, Action::Delete));
            assert!(!allowed(*role, Module::Households, Action::Delete));
        }
        assert!(allowed(Role::SuperAdmin, Module::Residents, Action::Delete));
    }

    #[test]
    fn roles_parse_from_loose_labels() {
        assert_eq!("health worker".parse::<Role>(), Ok(Role::HealthWorker));
        assert_eq!("Super-Admin".parse::<Role>(), Ok(Role::SuperAdmin));
        assert!("mayor".parse::<Role>().is_err());
    }
}

// VALIDATE MODULE TESTS
mod validate_tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(&[
            Field::required("name", FieldKind::Text),
            Field::optional("fee", FieldKind::MONEY),
            Field::optional("age", FieldKind::Integer { min: 0, max: 150 }),
        ])
    }

    #[test]
    fn accepts_clean_input() {
        let input = schema()
            .validate(&json!({ "name": " Liza ", "fee": "1,250.5", "age": "31" }))
            .unwrap();
        assert_eq!(input.text("name").as_deref(), Some("Liza"));
        assert_eq!(input.amount("fee"), Some(125_050));
        assert_eq!(input.integer("age"), Some(31));
    }

    #[test]
    fn reports_every_bad_field() {
        let errors = schema()
            .validate(&json!({ "fee": "-5", "age": 200 }))
            .unwrap_err();
        assert_eq!(errors.get("name"), Some(FieldReason::Required));
        assert_eq!(errors.get("fee"), Some(FieldReason::Negative));
        assert_eq!(errors.get("age"), Some(FieldReason::OutOfRange));
    }

    #[test]
    fn failures_map_to_bad_request() {
        let err = schema().check(&json!({})).unwrap_err();
        assert!(matches!(
            RecordError::classify(&err),
            Some(RecordError::ValidationFailed(_))
        ));
        assert_eq!(status_code_of(&err), 400);
    }
}

// HISTORY MODULE TESTS
mod history_tests {
    use super::*;

    #[test]
    fn witness_key_changes_with_content() {
        let at = TimeStamp::new_with(2024, 1, 1, 0, 0, 0);
        let a = Witness::new("doc_1", "user_1", at.clone(), "PENDING", "READY");
        let b = Witness::new("doc_1", "user_1", at, "PENDING", "REJECTED");
        assert_ne!(a.build().unwrap().0, b.build().unwrap().0);
    }
}

// TYPES MODULE TESTS
mod types_tests {
    use super::*;

    #[test]
    fn list_query_builders_set_filters() {
        let query = ListQuery::new()
            .with_status("pending")
            .with_search("santos")
            .with_page(2, 10);
        assert_eq!(query.status.as_deref(), Some("pending"));
        assert_eq!(query.search.as_deref(), Some("santos"));
        assert_eq!((query.page, query.per_page), (Some(2), Some(10)));
    }

    #[test]
    fn timestamps_order_chronologically() {
        let earlier = TimeStamp::new_with(2023, 12, 31, 23, 59, 59);
        let later = TimeStamp::new_with(2024, 1, 1, 0, 0, 0);
        assert!(earlier < later);
        assert_eq!(later.year(), 2024);
    }
}
