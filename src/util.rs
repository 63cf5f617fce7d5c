//! Small utility helpers used across modules.

use uuid::Uuid;

use crate::error::ApiError;

/// Generate a fresh entity id (UUID v4, lowercase hyphenated).
pub fn new_id() -> String {
  Uuid::new_v4().to_string()
}

/// True if the string has the shape of an entity id.
/// Well-formedness is checked before any lookup so malformed ids fail with
/// 400, never 404.
pub fn is_well_formed_id(s: &str) -> bool {
  Uuid::parse_str(s).is_ok()
}

/// Reject malformed ids with a ValidationError naming the offending field.
pub fn require_well_formed_id(field: &str, s: &str) -> Result<(), ApiError> {
  if is_well_formed_id(s) {
    Ok(())
  } else {
    Err(ApiError::Validation(format!("{} is not a valid id: {}", field, s)))
  }
}

/// Require a finite number (rejects NaN/inf smuggled in via JSON floats).
pub fn require_finite(field: &str, v: f64) -> Result<f64, ApiError> {
  if v.is_finite() {
    Ok(v)
  } else {
    Err(ApiError::Validation(format!("{} must be a finite number", field)))
  }
}

/// Extract a numeric field from a loosely-typed JSON value.
/// Used where the contract demands 400 (not a body-rejection 422) when a
/// client sends e.g. a string where a number belongs.
pub fn require_number(field: &str, v: &serde_json::Value) -> Result<f64, ApiError> {
  v.as_f64()
    .ok_or_else(|| ApiError::Validation(format!("{} must be a number", field)))
    .and_then(|n| require_finite(field, n))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn uuid_ids_are_well_formed() {
    assert!(is_well_formed_id(&new_id()));
    assert!(!is_well_formed_id("invalidMetricId"));
    assert!(!is_well_formed_id(""));
  }

  #[test]
  fn require_number_rejects_strings() {
    let v = serde_json::json!("not-a-number");
    assert!(matches!(
      require_number("rewardIncrementValue", &v),
      Err(ApiError::Validation(_))
    ));
    let v = serde_json::json!(42.5);
    assert_eq!(require_number("x", &v).unwrap(), 42.5);
  }
}
