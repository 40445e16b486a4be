//! Unit tests for the named field-update allowlist.

use dealflow::models::project::{Complexity, ProjectUpdate};
use dealflow::AppError;
use serde_json::json;

#[test]
fn state_column_is_not_updatable() {
    let err = ProjectUpdate::from_named("current_state", json!("closed")).unwrap_err();
    assert!(matches!(err, AppError::FieldNotAllowed(_)));
}

#[test]
fn unknown_field_is_rejected() {
    let err = ProjectUpdate::from_named("created_at", json!("2026-01-01")).unwrap_err();
    assert!(matches!(err, AppError::FieldNotAllowed(_)));
}

#[test]
fn allowed_fields_build_typed_updates() {
    assert_eq!(
        ProjectUpdate::from_named("title", json!("New title")).unwrap(),
        ProjectUpdate::Title("New title".to_string())
    );
    assert_eq!(
        ProjectUpdate::from_named("quoted_price", json!(1200.0)).unwrap(),
        ProjectUpdate::QuotedPrice(1200.0)
    );
    assert_eq!(
        ProjectUpdate::from_named("is_scam", json!(true)).unwrap(),
        ProjectUpdate::IsScam(true)
    );
    assert_eq!(
        ProjectUpdate::from_named("complexity", json!("small")).unwrap(),
        ProjectUpdate::Complexity(Complexity::Small)
    );
    assert_eq!(
        ProjectUpdate::from_named("tech_stack", json!(["rust", "sqlite"])).unwrap(),
        ProjectUpdate::TechStack(vec!["rust".to_string(), "sqlite".to_string()])
    );
}

#[test]
fn wrong_value_shape_is_rejected() {
    assert!(ProjectUpdate::from_named("quoted_price", json!("a lot")).is_err());
    assert!(ProjectUpdate::from_named("is_scam", json!("yes")).is_err());
    assert!(ProjectUpdate::from_named("complexity", json!("gigantic")).is_err());
}
