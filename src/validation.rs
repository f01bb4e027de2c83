// 📐 Field validation for incoming payloads
// Collects every problem in one pass so callers get field-level detail

use crate::error::{Result, SipmsError};
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// FIELD ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for FieldError {}

/// Group errors by field name, the shape API clients receive.
pub fn group_by_field(errors: &[FieldError]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for err in errors {
        grouped
            .entry(err.field.clone())
            .or_default()
            .push(err.message.clone());
    }
    grouped
}

// ============================================================================
// VALIDATOR
// ============================================================================

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Validator { errors: Vec::new() }
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Required text: present and not blank
    pub fn required(&mut self, field: &str, value: Option<&str>) {
        match value {
            Some(v) if !v.trim().is_empty() => {}
            _ => self.push(field, "This field is required"),
        }
    }

    pub fn max_len(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(v) = value {
            if v.chars().count() > max {
                self.push(
                    field,
                    format!("Ensure this field has no more than {} characters", max),
                );
            }
        }
    }

    /// Non-negative whole count that must fit the stored column.
    pub fn count(&mut self, field: &str, value: Option<i64>) -> Option<u32> {
        let v = value?;
        match u32::try_from(v) {
            Ok(count) => Some(count),
            Err(_) if v < 0 => {
                self.push(field, format!("Must be zero or greater, got {}", v));
                None
            }
            Err(_) => {
                self.push(field, format!("Must be at most {}, got {}", u32::MAX, v));
                None
            }
        }
    }

    pub fn non_negative_amount(&mut self, field: &str, value: Option<f64>) {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                self.push(field, format!("Must be a non-negative amount, got {}", v));
            }
        }
    }

    pub fn in_range(&mut self, field: &str, value: Option<i64>, min: i64, max: i64) {
        if let Some(v) = value {
            if v < min || v > max {
                self.push(field, format!("Must be between {} and {}, got {}", min, max, v));
            }
        }
    }

    /// Loose email shape check: one '@' with text on both sides and a dot in the domain
    pub fn email(&mut self, field: &str, value: Option<&str>) {
        let Some(v) = value else { return };
        if v.is_empty() {
            return;
        }
        let valid = match v.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid {
            self.push(field, "Enter a valid email address");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(SipmsError::Validation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_all_errors() {
        let mut v = Validator::new();
        v.required("name", Some("   "));
        v.count("student_population", Some(-4));
        v.in_range("progress_percentage", Some(120), 0, 100);
        v.email("email", Some("not-an-email"));

        match v.finish() {
            Err(SipmsError::Validation(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(
                    fields,
                    vec!["name", "student_population", "progress_percentage", "email"]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_absent_optional_values_pass() {
        let mut v = Validator::new();
        v.count("number_of_rooms", None);
        v.email("email", None);
        v.email("email", Some(""));
        v.max_len("phone", None, 20);

        assert!(v.is_empty());
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_count_conversion() {
        let mut v = Validator::new();
        assert_eq!(v.count("number_of_rooms", Some(12)), Some(12));
        assert_eq!(v.count("number_of_rooms", None), None);
        assert!(v.is_empty());

        assert_eq!(v.count("student_population", Some(-1)), None);
        assert_eq!(v.count("student_population", Some(i64::from(u32::MAX) + 1)), None);
        assert!(matches!(v.finish(), Err(SipmsError::Validation(errors)) if errors.len() == 2));
    }

    #[test]
    fn test_email_shapes() {
        let mut ok = Validator::new();
        ok.email("email", Some("head@school.rw"));
        assert!(ok.is_empty());

        for bad in ["@school.rw", "head@", "head@school", "a@b@c.rw", "head@.rw"] {
            let mut v = Validator::new();
            v.email("email", Some(bad));
            assert!(!v.is_empty(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_group_by_field() {
        let errors = vec![
            FieldError::new("document", "This field is required"),
            FieldError::new("location", "This field is required"),
            FieldError::new("document", "File size cannot exceed 10MB"),
        ];

        let grouped = group_by_field(&errors);
        assert_eq!(grouped["document"].len(), 2);
        assert_eq!(grouped["location"], vec!["This field is required".to_string()]);
    }
}
