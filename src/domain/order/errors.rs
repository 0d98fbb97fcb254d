use std::fmt;

// ============================================================================
// Order Validation Errors
// ============================================================================

/// Diagnostic code attached to a single field violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationCode {
    Missing,
    OutOfRange,
    BadFormat,
    BadLength,
    NotAllowed,
    Duplicate,
}

impl ViolationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationCode::Missing => "missing",
            ViolationCode::OutOfRange => "out_of_range",
            ViolationCode::BadFormat => "bad_format",
            ViolationCode::BadLength => "bad_length",
            ViolationCode::NotAllowed => "not_allowed",
            ViolationCode::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldViolation {
    /// Dotted path into the order, e.g. `delivery.phone` or `items[2].price`.
    pub field: String,
    pub code: ViolationCode,
    pub detail: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.code, self.detail)
    }
}

/// Every constraint an order failed, in table order.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("order failed validation on {} field(s): {}", .violations.len(), summarize(.violations))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn has_violation(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    pub fn code_for(&self, field: &str) -> Option<ViolationCode> {
        self.violations
            .iter()
            .find(|v| v.field == field)
            .map(|v| v.code)
    }
}

/// Why an inbound payload could not become an [`Order`](super::Order).
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed order payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Invalid(ValidationError),
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}={}", v.field, v.code))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_lists_fields() {
        let err = ValidationError {
            violations: vec![
                FieldViolation {
                    field: "order_uid".to_string(),
                    code: ViolationCode::Missing,
                    detail: "value is required".to_string(),
                },
                FieldViolation {
                    field: "items".to_string(),
                    code: ViolationCode::Missing,
                    detail: "at least one item is required".to_string(),
                },
            ],
        };

        assert_eq!(
            err.to_string(),
            "order failed validation on 2 field(s): order_uid=missing, items=missing"
        );
        assert_eq!(err.code_for("items"), Some(ViolationCode::Missing));
        assert!(!err.has_violation("locale"));
    }
}
