use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use super::errors::{FieldViolation, PayloadError, ValidationError, ViolationCode};
use super::value_objects::{Currency, Item, Order};

// ============================================================================
// Order Validator
// ============================================================================
//
// Constraints are declared as static tables of (field path, accessor, rules)
// and evaluated by one routine that collects every violation. Rules other
// than `Required` are skipped for empty values, so optional fields only need
// to omit `Required`.
//
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TextRule {
    Required,
    Uuid,
    Length { min: usize, max: usize },
    ExactLength(usize),
    Digits,
    Alphanumeric,
    Email,
    Currency,
}

#[derive(Debug, Clone, Copy)]
enum NumberRule {
    NonNegative,
    Range { min: f64, max: f64 },
}

struct TextField<T> {
    path: &'static str,
    get: fn(&T) -> &str,
    rules: &'static [TextRule],
}

struct NumberField<T> {
    path: &'static str,
    get: fn(&T) -> f64,
    rules: &'static [NumberRule],
}

static ORDER_TEXT: &[TextField<Order>] = &[
    TextField { path: "order_uid", get: |o| o.order_uid.as_str(), rules: &[TextRule::Required, TextRule::Uuid] },
    TextField { path: "track_number", get: |o| o.track_number.as_str(), rules: &[TextRule::Required] },
    TextField { path: "entry", get: |o| o.entry.as_str(), rules: &[TextRule::Required] },
    TextField { path: "locale", get: |o| o.locale.as_str(), rules: &[TextRule::Required, TextRule::Length { min: 2, max: 5 }] },
    TextField { path: "internal_signature", get: |o| o.internal_signature.as_str(), rules: &[TextRule::Required] },
    TextField { path: "customer_id", get: |o| o.customer_id.as_str(), rules: &[TextRule::Required] },
    TextField { path: "delivery_service", get: |o| o.delivery_service.as_str(), rules: &[TextRule::Required] },
    TextField { path: "shardkey", get: |o| o.shardkey.as_str(), rules: &[TextRule::Required] },
    TextField { path: "oof_shard", get: |o| o.oof_shard.as_str(), rules: &[TextRule::Required] },
    TextField { path: "delivery.name", get: |o| o.delivery.name.as_str(), rules: &[TextRule::Required, TextRule::Length { min: 3, max: 100 }] },
    TextField { path: "delivery.phone", get: |o| o.delivery.phone.as_str(), rules: &[TextRule::Required, TextRule::Digits, TextRule::ExactLength(11)] },
    TextField { path: "delivery.zip", get: |o| o.delivery.zip.as_str(), rules: &[TextRule::Required, TextRule::Alphanumeric, TextRule::Length { min: 1, max: 10 }] },
    TextField { path: "delivery.city", get: |o| o.delivery.city.as_str(), rules: &[TextRule::Required, TextRule::Length { min: 3, max: 100 }] },
    TextField { path: "delivery.address", get: |o| o.delivery.address.as_str(), rules: &[TextRule::Required, TextRule::Length { min: 5, max: 255 }] },
    TextField { path: "delivery.region", get: |o| o.delivery.region.as_str(), rules: &[TextRule::Required, TextRule::Length { min: 3, max: 100 }] },
    TextField { path: "delivery.email", get: |o| o.delivery.email.as_deref().unwrap_or(""), rules: &[TextRule::Email] },
    TextField { path: "payment.transaction", get: |o| o.payment.transaction.as_str(), rules: &[TextRule::Required] },
    TextField { path: "payment.request_id", get: |o| o.payment.request_id.as_str(), rules: &[TextRule::Required] },
    TextField { path: "payment.currency", get: |o| o.payment.currency.as_str(), rules: &[TextRule::Required, TextRule::Currency] },
    TextField { path: "payment.provider", get: |o| o.payment.provider.as_str(), rules: &[TextRule::Required] },
    TextField { path: "payment.bank", get: |o| o.payment.bank.as_str(), rules: &[TextRule::Required] },
];

static ORDER_NUMBERS: &[NumberField<Order>] = &[
    NumberField { path: "sm_id", get: |o| o.sm_id as f64, rules: &[NumberRule::NonNegative] },
    NumberField { path: "payment.amount", get: |o| o.payment.amount, rules: &[NumberRule::NonNegative] },
    NumberField { path: "payment.payment_dt", get: |o| o.payment.payment_dt as f64, rules: &[NumberRule::NonNegative] },
    NumberField { path: "payment.delivery_cost", get: |o| o.payment.delivery_cost, rules: &[NumberRule::NonNegative] },
    NumberField { path: "payment.goods_total", get: |o| o.payment.goods_total as f64, rules: &[NumberRule::NonNegative] },
    NumberField { path: "payment.custom_fee", get: |o| o.payment.custom_fee, rules: &[NumberRule::NonNegative] },
];

static ITEM_TEXT: &[TextField<Item>] = &[
    TextField { path: "track_number", get: |i| i.track_number.as_str(), rules: &[TextRule::Required] },
    TextField { path: "rid", get: |i| i.rid.as_str(), rules: &[TextRule::Required] },
    TextField { path: "name", get: |i| i.name.as_str(), rules: &[TextRule::Required, TextRule::Length { min: 1, max: 255 }] },
    TextField { path: "size", get: |i| i.size.as_str(), rules: &[TextRule::Required, TextRule::Length { min: 1, max: 10 }] },
    TextField { path: "brand", get: |i| i.brand.as_str(), rules: &[TextRule::Required, TextRule::Length { min: 1, max: 100 }] },
];

static ITEM_NUMBERS: &[NumberField<Item>] = &[
    NumberField { path: "chrt_id", get: |i| i.chrt_id as f64, rules: &[NumberRule::NonNegative] },
    NumberField { path: "price", get: |i| i.price, rules: &[NumberRule::NonNegative] },
    NumberField { path: "sale", get: |i| i.sale, rules: &[NumberRule::Range { min: 0.0, max: 100.0 }] },
    NumberField { path: "total_price", get: |i| i.total_price, rules: &[NumberRule::NonNegative] },
    NumberField { path: "nm_id", get: |i| i.nm_id as f64, rules: &[NumberRule::NonNegative] },
    NumberField { path: "status", get: |i| i.status as f64, rules: &[NumberRule::Range { min: 0.0, max: 100.0 }] },
];

/// Decode a raw JSON payload and check it against every order constraint.
pub fn validate(payload: &[u8]) -> Result<Order, PayloadError> {
    let order: Order = serde_json::from_slice(payload).map_err(PayloadError::Decode)?;
    check(&order).map_err(PayloadError::Invalid)?;
    Ok(order)
}

/// Check an already-decoded order. Returns all violations, not just the first.
pub fn check(order: &Order) -> Result<(), ValidationError> {
    let mut violations = Vec::new();

    check_text(order, ORDER_TEXT, "", &mut violations);
    check_numbers(order, ORDER_NUMBERS, "", &mut violations);

    // Zero times from other encoders (year 1, the Unix epoch) mean unset.
    if order.date_created <= DateTime::<Utc>::default() {
        violations.push(violation("date_created", ViolationCode::Missing, "value is required"));
    }

    if order.items.is_empty() {
        violations.push(violation("items", ViolationCode::Missing, "at least one item is required"));
    }

    let mut seen_chrt_ids = HashSet::with_capacity(order.items.len());
    for (index, item) in order.items.iter().enumerate() {
        let prefix = format!("items[{index}].");
        check_text(item, ITEM_TEXT, &prefix, &mut violations);
        check_numbers(item, ITEM_NUMBERS, &prefix, &mut violations);

        if !seen_chrt_ids.insert(item.chrt_id) {
            violations.push(violation(
                &format!("{prefix}chrt_id"),
                ViolationCode::Duplicate,
                &format!("chrt_id {} appears more than once", item.chrt_id),
            ));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

fn check_text<T>(target: &T, fields: &[TextField<T>], prefix: &str, out: &mut Vec<FieldViolation>) {
    for field in fields {
        let value = (field.get)(target);
        for rule in field.rules {
            if let Some((code, detail)) = apply_text_rule(*rule, value) {
                out.push(violation(&format!("{prefix}{}", field.path), code, &detail));
                // One diagnostic per field is enough to act on.
                break;
            }
        }
    }
}

fn check_numbers<T>(target: &T, fields: &[NumberField<T>], prefix: &str, out: &mut Vec<FieldViolation>) {
    for field in fields {
        let value = (field.get)(target);
        for rule in field.rules {
            if let Some(detail) = apply_number_rule(*rule, value) {
                out.push(violation(&format!("{prefix}{}", field.path), ViolationCode::OutOfRange, &detail));
                break;
            }
        }
    }
}

fn apply_text_rule(rule: TextRule, value: &str) -> Option<(ViolationCode, String)> {
    if value.is_empty() {
        return match rule {
            TextRule::Required => Some((ViolationCode::Missing, "value is required".to_string())),
            _ => None,
        };
    }

    let chars = value.chars().count();
    match rule {
        TextRule::Required => None,
        TextRule::Uuid => Uuid::parse_str(value)
            .is_err()
            .then(|| (ViolationCode::BadFormat, format!("'{value}' is not a UUID"))),
        TextRule::Length { min, max } => (chars < min || chars > max).then(|| {
            (ViolationCode::BadLength, format!("length {chars} not in {min}..={max}"))
        }),
        TextRule::ExactLength(len) => (chars != len)
            .then(|| (ViolationCode::BadLength, format!("length {chars}, expected {len}"))),
        TextRule::Digits => (!value.chars().all(|c| c.is_ascii_digit()))
            .then(|| (ViolationCode::BadFormat, "only digits are allowed".to_string())),
        TextRule::Alphanumeric => (!value.chars().all(|c| c.is_ascii_alphanumeric()))
            .then(|| (ViolationCode::BadFormat, "only letters and digits are allowed".to_string())),
        TextRule::Email => (!looks_like_email(value))
            .then(|| (ViolationCode::BadFormat, format!("'{value}' is not an email address"))),
        TextRule::Currency => value.parse::<Currency>().err().map(|e| (ViolationCode::NotAllowed, e)),
    }
}

fn apply_number_rule(rule: NumberRule, value: f64) -> Option<String> {
    match rule {
        NumberRule::NonNegative => (value.is_nan() || value < 0.0).then(|| format!("{value} is negative")),
        NumberRule::Range { min, max } => {
            (value.is_nan() || value < min || value > max).then(|| format!("{value} not in {min}..={max}"))
        }
    }
}

fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

fn violation(field: &str, code: ViolationCode, detail: &str) -> FieldViolation {
    FieldViolation {
        field: field.to_string(),
        code,
        detail: detail.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::valid_order;
    use super::*;

    const UID: &str = "b563feb7-b2b8-4b6e-9f1d-6b1e2c3d4e5f";

    #[test]
    fn test_valid_order_passes() {
        assert!(check(&valid_order(UID)).is_ok());
    }

    #[test]
    fn test_validate_decodes_payload() {
        let payload = serde_json::to_vec(&valid_order(UID)).unwrap();
        let order = validate(&payload).unwrap();
        assert_eq!(order.order_uid, UID);
        assert_eq!(order.items.len(), 1);
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let err = validate(b"{not json").unwrap_err();
        assert!(matches!(err, PayloadError::Decode(_)));

        let err = validate(br#"{"order_uid": 42}"#).unwrap_err();
        assert!(matches!(err, PayloadError::Decode(_)));
    }

    #[test]
    fn test_empty_uid_and_items_are_reported_together() {
        let mut order = valid_order(UID);
        order.order_uid.clear();
        order.items.clear();

        let err = check(&order).unwrap_err();
        assert_eq!(err.code_for("order_uid"), Some(ViolationCode::Missing));
        assert_eq!(err.code_for("items"), Some(ViolationCode::Missing));
    }

    #[test]
    fn test_non_uuid_uid_is_bad_format() {
        let err = check(&valid_order("not-a-uuid")).unwrap_err();
        assert_eq!(err.code_for("order_uid"), Some(ViolationCode::BadFormat));
        assert_eq!(err.violations.len(), 1);
    }

    #[test]
    fn test_missing_fields_in_payload_are_validation_errors() {
        let err = validate(br#"{"order_uid": "b563feb7-b2b8-4b6e-9f1d-6b1e2c3d4e5f"}"#).unwrap_err();
        let PayloadError::Invalid(err) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(err.code_for("track_number"), Some(ViolationCode::Missing));
        assert_eq!(err.code_for("date_created"), Some(ViolationCode::Missing));
        assert_eq!(err.code_for("delivery.phone"), Some(ViolationCode::Missing));
        assert_eq!(err.code_for("payment.currency"), Some(ViolationCode::Missing));
        assert!(!err.has_violation("delivery.email"));
    }

    #[test]
    fn test_null_fields_are_validation_errors() {
        let payload = br#"{"order_uid": null, "delivery": null, "items": null, "date_created": null}"#;

        let PayloadError::Invalid(err) = validate(payload).unwrap_err() else {
            panic!("null fields should reach the validator");
        };
        assert_eq!(err.code_for("order_uid"), Some(ViolationCode::Missing));
        assert_eq!(err.code_for("delivery.name"), Some(ViolationCode::Missing));
        assert_eq!(err.code_for("items"), Some(ViolationCode::Missing));
        assert_eq!(err.code_for("date_created"), Some(ViolationCode::Missing));
    }

    #[test]
    fn test_zero_time_date_created_is_missing() {
        let mut payload = serde_json::to_value(valid_order(UID)).unwrap();
        payload["date_created"] = "0001-01-01T00:00:00Z".into();

        let PayloadError::Invalid(err) = validate(payload.to_string().as_bytes()).unwrap_err() else {
            panic!("zero time should reach the validator");
        };
        assert_eq!(err.code_for("date_created"), Some(ViolationCode::Missing));
        assert_eq!(err.violations.len(), 1);

        payload["date_created"] = "1970-01-01T00:00:00Z".into();
        assert!(validate(payload.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_delivery_constraints() {
        let mut order = valid_order(UID);
        order.delivery.phone = "+9720000000".to_string();
        order.delivery.zip = "26-398".to_string();
        order.delivery.name = "Al".to_string();
        order.delivery.email = Some("not-an-email".to_string());

        let err = check(&order).unwrap_err();
        assert_eq!(err.code_for("delivery.phone"), Some(ViolationCode::BadFormat));
        assert_eq!(err.code_for("delivery.zip"), Some(ViolationCode::BadFormat));
        assert_eq!(err.code_for("delivery.name"), Some(ViolationCode::BadLength));
        assert_eq!(err.code_for("delivery.email"), Some(ViolationCode::BadFormat));
    }

    #[test]
    fn test_email_is_optional() {
        let mut order = valid_order(UID);
        order.delivery.email = None;
        assert!(check(&order).is_ok());
    }

    #[test]
    fn test_currency_must_be_allowed() {
        let mut order = valid_order(UID);
        order.payment.currency = "GBP".to_string();

        let err = check(&order).unwrap_err();
        assert_eq!(err.code_for("payment.currency"), Some(ViolationCode::NotAllowed));
    }

    #[test]
    fn test_negative_amounts_are_out_of_range() {
        let mut order = valid_order(UID);
        order.payment.amount = -1.0;
        order.sm_id = -5;

        let err = check(&order).unwrap_err();
        assert_eq!(err.code_for("payment.amount"), Some(ViolationCode::OutOfRange));
        assert_eq!(err.code_for("sm_id"), Some(ViolationCode::OutOfRange));
    }

    #[test]
    fn test_item_paths_carry_index() {
        let mut order = valid_order(UID);
        let mut second = order.items[0].clone();
        second.chrt_id = 1;
        second.sale = 120.0;
        second.status = -1;
        order.items.push(second);

        let err = check(&order).unwrap_err();
        assert_eq!(err.code_for("items[1].sale"), Some(ViolationCode::OutOfRange));
        assert_eq!(err.code_for("items[1].status"), Some(ViolationCode::OutOfRange));
        assert!(!err.has_violation("items[0].sale"));
    }

    #[test]
    fn test_duplicate_chrt_id_is_rejected() {
        let mut order = valid_order(UID);
        let duplicate = order.items[0].clone();
        order.items.push(duplicate);

        let err = check(&order).unwrap_err();
        assert_eq!(err.code_for("items[1].chrt_id"), Some(ViolationCode::Duplicate));
    }

    #[test]
    fn test_lengths_count_characters_not_bytes() {
        let mut order = valid_order(UID);
        order.delivery.city = "Москва".to_string();
        assert!(check(&order).is_ok());
    }
}
