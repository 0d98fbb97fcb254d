use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Order Value Objects
// ============================================================================
//
// The JSON shape of these types is the wire contract for both the inbound
// order stream and the read API. Every container is `#[serde(default)]` so a
// field absent from the payload, or sent as `null`, decodes to its empty value
// and is reported by the validator as `missing` instead of failing the decode.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Order {
    #[serde(deserialize_with = "null_as_default")]
    pub order_uid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub track_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub entry: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery: Delivery,
    #[serde(deserialize_with = "null_as_default")]
    pub payment: Payment,
    #[serde(deserialize_with = "null_as_default")]
    pub items: Vec<Item>,
    #[serde(deserialize_with = "null_as_default")]
    pub locale: String,
    #[serde(deserialize_with = "null_as_default")]
    pub internal_signature: String,
    #[serde(deserialize_with = "null_as_default")]
    pub customer_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery_service: String,
    #[serde(deserialize_with = "null_as_default")]
    pub shardkey: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sm_id: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub date_created: DateTime<Utc>,
    #[serde(deserialize_with = "null_as_default")]
    pub oof_shard: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Delivery {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(deserialize_with = "null_as_default")]
    pub zip: String,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Payment {
    #[serde(deserialize_with = "null_as_default")]
    pub transaction: String,
    #[serde(deserialize_with = "null_as_default")]
    pub request_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub provider: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub payment_dt: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub bank: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery_cost: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub goods_total: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub custom_fee: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Item {
    #[serde(deserialize_with = "null_as_default")]
    pub chrt_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub track_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub price: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub rid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sale: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub size: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_price: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub nm_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub brand: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: i32,
}

impl Order {
    /// Cache and store key.
    pub fn key(&self) -> &str {
        &self.order_uid
    }
}

/// Treat an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Currencies accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Usd,
    Rub,
    Eur,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Rub, Currency::Eur];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Rub => "RUB",
            Currency::Eur => "EUR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|c| c.code() == s)
            .ok_or_else(|| format!("unsupported currency: {s}"))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_decode_to_empty_values() {
        let order: Order = serde_json::from_str(r#"{"order_uid": "abc"}"#).unwrap();

        assert_eq!(order.order_uid, "abc");
        assert!(order.items.is_empty());
        assert!(order.delivery.email.is_none());
        assert_eq!(order.date_created, DateTime::<Utc>::default());
    }

    #[test]
    fn test_order_json_uses_wire_field_names() {
        let order = Order {
            order_uid: "uid".to_string(),
            items: vec![Item {
                chrt_id: 9934930,
                ..Default::default()
            }],
            ..Default::default()
        };

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["order_uid"], "uid");
        assert_eq!(json["items"][0]["chrt_id"], 9934930);
        assert!(json["delivery"].get("email").is_none());
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!("USD".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!("RUB".parse::<Currency>().unwrap(), Currency::Rub);
        assert!("usd".parse::<Currency>().is_err());
        assert!("GBP".parse::<Currency>().is_err());
    }

    #[test]
    fn test_currency_display_matches_code() {
        assert_eq!(Currency::Eur.to_string(), "EUR");
    }

    #[test]
    fn test_null_fields_decode_to_empty_values() {
        let order: Order = serde_json::from_str(
            r#"{"order_uid": null, "delivery": null, "items": null, "sm_id": null,
                "payment": {"transaction": null, "amount": null}}"#,
        )
        .unwrap();

        assert_eq!(order.order_uid, "");
        assert_eq!(order.delivery, Delivery::default());
        assert!(order.items.is_empty());
        assert_eq!(order.sm_id, 0);
        assert_eq!(order.payment.transaction, "");
        assert_eq!(order.payment.amount, 0.0);
    }
}
