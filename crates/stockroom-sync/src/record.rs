//! # Remote Records
//!
//! Typed shapes of the JSON stored under `/products`, `/sales` and `/users`.
//!
//! ## Decoding Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  id            payload "id" (number or numeric string), else path key   │
//! │  required      products: name (non-empty string)                        │
//! │                sales:    product_id (integer)                           │
//! │  numeric       must be JSON numbers when present; missing/null → 0      │
//! │  last_updated  number, numeric string or ISO-8601 → epoch; else 0       │
//! │  anything else → SyncError::MalformedRecord (quarantined, never coerced)│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A record with `last_updated = 0` decodes fine but can never win a merge.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stockroom_core::timestamp::to_epoch;
use stockroom_core::validation::validate_product_name;
use stockroom_core::{Product, Role, Sale, User};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Field Readers
// =============================================================================

/// Borrowed view of one remote JSON object plus the path used in errors.
struct Fields<'a> {
    path: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(path: &'a str, value: &'a Value) -> SyncResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| SyncError::malformed(path, "record is not an object"))?;
        Ok(Fields { path, map })
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        self.map.get(field).filter(|v| !v.is_null())
    }

    fn error(&self, reason: impl Into<String>) -> SyncError {
        SyncError::malformed(self.path, reason)
    }

    /// Record id from the payload, falling back to the path key.
    fn id(&self, key: Option<&str>) -> SyncResult<i64> {
        if let Some(value) = self.present("id") {
            return match value {
                Value::Number(_) => as_integer(value),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
            .ok_or_else(|| self.error("field 'id' must be an integer"));
        }

        key.and_then(|k| k.trim().parse().ok())
            .ok_or_else(|| self.error("record has no integer id"))
    }

    fn required_string(&self, field: &str) -> SyncResult<String> {
        match self.present(field) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(self.error(format!("field '{field}' must be a string"))),
            None => Err(self.error(format!("missing required field '{field}'"))),
        }
    }

    fn optional_string(&self, field: &str) -> SyncResult<Option<String>> {
        match self.present(field) {
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.error(format!("field '{field}' must be a string"))),
            None => Ok(None),
        }
    }

    fn required_integer(&self, field: &str) -> SyncResult<i64> {
        match self.present(field) {
            Some(value) => {
                as_integer(value).ok_or_else(|| self.error(format!("field '{field}' must be an integer")))
            }
            None => Err(self.error(format!("missing required field '{field}'"))),
        }
    }

    fn optional_integer(&self, field: &str) -> SyncResult<Option<i64>> {
        self.present(field)
            .map(|value| {
                as_integer(value).ok_or_else(|| self.error(format!("field '{field}' must be an integer")))
            })
            .transpose()
    }

    fn integer_or_zero(&self, field: &str) -> SyncResult<i64> {
        Ok(self.optional_integer(field)?.unwrap_or(0))
    }

    fn number_or_zero(&self, field: &str) -> SyncResult<f64> {
        match self.present(field) {
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| self.error(format!("field '{field}' is out of range"))),
            Some(_) => Err(self.error(format!("field '{field}' must be a number"))),
            None => Ok(0.0),
        }
    }

    fn last_updated(&self) -> f64 {
        to_epoch(self.map.get("last_updated"))
    }
}

/// Integer value of a JSON number; `3.0` is accepted, `3.5` is not.
fn as_integer(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

// =============================================================================
// Product
// =============================================================================

/// A product as stored at `/products/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub quantity: i64,
    pub price: f64,
    pub cost_price: f64,
    pub last_updated: f64,
}

impl ProductRecord {
    /// Decodes the JSON found at `path`; `key` is the last path segment.
    pub fn decode(path: &str, key: Option<&str>, value: &Value) -> SyncResult<Self> {
        let fields = Fields::new(path, value)?;

        let name = fields.required_string("name")?;
        validate_product_name(&name).map_err(|e| fields.error(e.to_string()))?;

        let quantity = fields.integer_or_zero("quantity")?;
        if quantity < 0 {
            return Err(fields.error("field 'quantity' must not be negative"));
        }

        Ok(ProductRecord {
            id: fields.id(key)?,
            name,
            category: fields.optional_string("category")?,
            quantity,
            price: fields.number_or_zero("price")?,
            cost_price: fields.number_or_zero("cost_price")?,
            last_updated: fields.last_updated(),
        })
    }
}

impl From<&Product> for ProductRecord {
    fn from(p: &Product) -> Self {
        ProductRecord {
            id: p.id,
            name: p.name.clone(),
            category: p.category.clone(),
            quantity: p.quantity,
            price: p.price,
            cost_price: p.cost_price,
            last_updated: p.last_updated,
        }
    }
}

impl From<ProductRecord> for Product {
    fn from(r: ProductRecord) -> Self {
        Product {
            id: r.id,
            name: r.name,
            category: r.category,
            quantity: r.quantity,
            price: r.price,
            cost_price: r.cost_price,
            last_updated: r.last_updated,
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A sale as stored at `/sales/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: i64,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub quantity_sold: i64,
    pub total_price: f64,
    pub profit: f64,
    pub timestamp: String,
    pub transaction_id: Option<i64>,
    pub last_updated: f64,
}

impl SaleRecord {
    /// Decodes the JSON found at `path`; `key` is the last path segment.
    pub fn decode(path: &str, key: Option<&str>, value: &Value) -> SyncResult<Self> {
        let fields = Fields::new(path, value)?;

        Ok(SaleRecord {
            id: fields.id(key)?,
            product_id: fields.required_integer("product_id")?,
            product_name: fields.optional_string("product_name")?,
            quantity_sold: fields.integer_or_zero("quantity_sold")?,
            total_price: fields.number_or_zero("total_price")?,
            profit: fields.number_or_zero("profit")?,
            timestamp: fields.optional_string("timestamp")?.unwrap_or_default(),
            transaction_id: fields.optional_integer("transaction_id")?,
            last_updated: fields.last_updated(),
        })
    }
}

impl From<&Sale> for SaleRecord {
    fn from(s: &Sale) -> Self {
        SaleRecord {
            id: s.id,
            product_id: s.product_id,
            product_name: s.product_name.clone(),
            quantity_sold: s.quantity_sold,
            total_price: s.total_price,
            profit: s.profit,
            timestamp: s.timestamp.clone(),
            transaction_id: s.transaction_id,
            last_updated: s.last_updated,
        }
    }
}

impl From<SaleRecord> for Sale {
    fn from(r: SaleRecord) -> Self {
        Sale {
            id: r.id,
            product_id: r.product_id,
            product_name: r.product_name,
            quantity_sold: r.quantity_sold,
            total_price: r.total_price,
            profit: r.profit,
            timestamp: r.timestamp,
            transaction_id: r.transaction_id,
            last_updated: r.last_updated,
        }
    }
}

// =============================================================================
// User
// =============================================================================

/// Staff directory entry at `/users/{uid}`. Never carries a password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub username: String,
    pub role: Role,
}

impl UserRecord {
    pub fn new(user: &User, email: Option<String>) -> Self {
        UserRecord {
            email,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_product_full_payload() {
        let value = json!({
            "id": 14, "name": "Rice", "category": "Grains",
            "quantity": 7, "price": 100.0, "cost_price": 60,
            "last_updated": 1718000000.5
        });
        let record = ProductRecord::decode("/products/14", Some("14"), &value).unwrap();
        assert_eq!(
            record,
            ProductRecord {
                id: 14,
                name: "Rice".into(),
                category: Some("Grains".into()),
                quantity: 7,
                price: 100.0,
                cost_price: 60.0,
                last_updated: 1718000000.5,
            }
        );
    }

    #[test]
    fn test_product_defaults_and_key_id() {
        let value = json!({"name": "Beans", "category": null});
        let record = ProductRecord::decode("/products/3", Some("3"), &value).unwrap();
        assert_eq!(record.id, 3);
        assert_eq!(record.category, None);
        assert_eq!(record.quantity, 0);
        assert_eq!(record.price, 0.0);
        assert_eq!(record.last_updated, 0.0);
    }

    #[test]
    fn test_string_id_and_iso_timestamp() {
        let value = json!({"id": "21", "name": "Milk", "last_updated": "2024-06-10T06:13:20Z"});
        let record = ProductRecord::decode("/products/x", None, &value).unwrap();
        assert_eq!(record.id, 21);
        assert_eq!(record.last_updated, 1718000000.0);
    }

    #[test]
    fn test_malformed_products_are_rejected() {
        let cases = [
            json!("just a string"),
            json!({"quantity": 3}),
            json!({"name": 42}),
            json!({"name": "   "}),
            json!({"name": "Rice", "price": "cheap"}),
            json!({"name": "Rice", "quantity": 2.5}),
            json!({"name": "Rice", "quantity": -1}),
            json!({"name": "Rice", "id": true}),
        ];
        for value in cases {
            let err = ProductRecord::decode("/products/1", Some("1"), &value).unwrap_err();
            assert!(err.is_malformed(), "{value} should be malformed, got {err}");
        }

        let err = ProductRecord::decode("/products/abc", Some("abc"), &json!({"name": "Rice"}))
            .unwrap_err();
        assert!(err.to_string().contains("/products/abc"));
    }

    #[test]
    fn test_sale_decode() {
        let value = json!({
            "product_id": 1, "product_name": "Rice", "quantity_sold": 3,
            "total_price": 300.0, "profit": 120.0,
            "timestamp": "2024-06-10T07:13:20", "transaction_id": null,
            "last_updated": 50
        });
        let record = SaleRecord::decode("/sales/9", Some("9"), &value).unwrap();
        assert_eq!(record.id, 9);
        assert_eq!(record.product_id, 1);
        assert_eq!(record.transaction_id, None);
        assert_eq!(record.last_updated, 50.0);

        let sale = Sale::from(record.clone());
        assert_eq!(SaleRecord::from(&sale), record);
    }

    #[test]
    fn test_sale_requires_product_id() {
        for value in [json!({"quantity_sold": 1}), json!({"product_id": "one"})] {
            assert!(SaleRecord::decode("/sales/1", Some("1"), &value)
                .unwrap_err()
                .is_malformed());
        }
    }

    #[test]
    fn test_product_serializes_to_remote_shape() {
        let record = ProductRecord {
            id: 1,
            name: "Rice".into(),
            category: None,
            quantity: 7,
            price: 100.0,
            cost_price: 60.0,
            last_updated: 10.0,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["category"], Value::Null);
        assert_eq!(ProductRecord::decode("/products/1", Some("1"), &value).unwrap(), record);
    }

    #[test]
    fn test_user_record_has_no_password() {
        let user = User {
            id: 1,
            uid: "u-1".into(),
            username: "cashier1".into(),
            role: Role::Staff,
        };
        let value = serde_json::to_value(UserRecord::new(&user, None)).unwrap();
        assert_eq!(value, json!({"username": "cashier1", "role": "staff"}));
    }
}
