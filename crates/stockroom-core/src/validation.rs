//! # Validation Module
//!
//! Input checks run before any mutation reaches the database.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: CLI parsing (clap)                                           │
//! │  └── Type checks: numbers are numbers                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── names, quantities, prices, credentials                            │
//! │  └── rejects before the repository is called                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE(username)                                       │
//! │  └── guarded stock decrement (quantity >= ?)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::validation::{validate_product_name, validate_sale_quantity};
//!
//! assert!(validate_product_name("Rice 5kg").is_ok());
//! assert!(validate_sale_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::{NewProduct, ProductUpdate};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_LEN: usize = 200;
const MAX_CATEGORY_LEN: usize = 100;
const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;
const PASSWORD_MIN: usize = 6;

/// Largest stock level, sale quantity or restock amount accepted.
pub const MAX_QUANTITY: i64 = 1_000_000_000;

/// Largest price or cost price accepted, in major units.
pub const MAX_PRICE: f64 = 1_000_000_000.0;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name: required, at most 200 characters.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Trims a category; blank becomes `None` (shown as "No Category").
pub fn normalize_category(category: Option<&str>) -> ValidationResult<Option<String>> {
    match category.map(str::trim) {
        None | Some("") => Ok(None),
        Some(c) if c.chars().count() > MAX_CATEGORY_LEN => Err(ValidationError::TooLong {
            field: "category".to_string(),
            max: MAX_CATEGORY_LEN,
        }),
        Some(c) => Ok(Some(c.to_string())),
    }
}

/// Validates a username: 3 to 32 characters, no whitespace.
pub fn validate_username(username: &str) -> ValidationResult<()> {
    let len = username.chars().count();

    if username.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "username".to_string(),
        });
    }

    if len < USERNAME_MIN {
        return Err(ValidationError::TooShort {
            field: "username".to_string(),
            min: USERNAME_MIN,
        });
    }

    if len > USERNAME_MAX {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: USERNAME_MAX,
        });
    }

    if username.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

/// Validates a new password: at least 6 characters.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.is_empty() {
        return Err(ValidationError::Required {
            field: "password".to_string(),
        });
    }

    if password.chars().count() < PASSWORD_MIN {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: PASSWORD_MIN,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

fn quantity_too_large(field: &str, min: i64) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min,
        max: MAX_QUANTITY,
    }
}

/// Validates a stock level (zero allowed, at most [`MAX_QUANTITY`]).
pub fn validate_stock_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "quantity".to_string(),
        });
    }
    if quantity > MAX_QUANTITY {
        return Err(quantity_too_large("quantity", 0));
    }
    Ok(())
}

/// Validates the quantity of a sale line.
pub fn validate_sale_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if quantity > MAX_QUANTITY {
        return Err(quantity_too_large("quantity", 1));
    }
    Ok(())
}

/// Validates a restock amount.
pub fn validate_restock_amount(amount: i64) -> ValidationResult<()> {
    if amount <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }
    if amount > MAX_QUANTITY {
        return Err(quantity_too_large("amount", 1));
    }
    Ok(())
}

/// Validates a price or cost price: finite, not negative, at most
/// [`MAX_PRICE`].
pub fn validate_price(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a finite number".to_string(),
        });
    }
    if value < 0.0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    if value > MAX_PRICE {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PRICE as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates and normalizes a new product.
pub fn validate_new_product(input: &NewProduct) -> ValidationResult<NewProduct> {
    validate_product_name(&input.name)?;
    validate_stock_quantity(input.quantity)?;
    validate_price("price", input.price)?;
    validate_price("cost_price", input.cost_price)?;

    Ok(NewProduct {
        name: input.name.trim().to_string(),
        category: normalize_category(input.category.as_deref())?,
        quantity: input.quantity,
        price: input.price,
        cost_price: input.cost_price,
    })
}

/// Validates and normalizes a product update.
pub fn validate_product_update(input: &ProductUpdate) -> ValidationResult<ProductUpdate> {
    validate_product_name(&input.name)?;
    validate_stock_quantity(input.quantity)?;
    validate_price("price", input.price)?;
    validate_price("cost_price", input.cost_price)?;

    Ok(ProductUpdate {
        name: input.name.trim().to_string(),
        category: normalize_category(input.category.as_deref())?,
        quantity: input.quantity,
        price: input.price,
        cost_price: input.cost_price,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_name() {
        assert!(validate_product_name("Rice 5kg").is_ok());
        assert!(matches!(
            validate_product_name("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_product_name(&"x".repeat(201)),
            Err(ValidationError::TooLong { max: 200, .. })
        ));
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category(None).unwrap(), None);
        assert_eq!(normalize_category(Some("  ")).unwrap(), None);
        assert_eq!(
            normalize_category(Some(" Drinks ")).unwrap(),
            Some("Drinks".to_string())
        );
    }

    #[test]
    fn test_username() {
        assert!(validate_username("cashier1").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("two words").is_err());
        assert!(validate_username(&"u".repeat(33)).is_err());
        assert!(validate_username("").is_err());
    }

    #[test]
    fn test_password() {
        assert!(validate_password("secret1").is_ok());
        assert!(validate_password("abc").is_err());
        assert!(validate_password("").is_err());
    }

    #[test]
    fn test_quantities() {
        assert!(validate_stock_quantity(0).is_ok());
        assert!(validate_stock_quantity(-1).is_err());
        assert!(validate_sale_quantity(1).is_ok());
        assert!(validate_sale_quantity(0).is_err());
        assert!(validate_restock_amount(-3).is_err());
    }

    #[test]
    fn test_upper_bounds() {
        assert!(validate_stock_quantity(MAX_QUANTITY).is_ok());
        assert!(matches!(
            validate_stock_quantity(MAX_QUANTITY + 1),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(validate_sale_quantity(10_000_000_000).is_err());
        assert!(validate_restock_amount(i64::MAX).is_err());

        assert!(validate_price("price", MAX_PRICE).is_ok());
        let err = validate_price("cost_price", 1e12).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cost_price must be between 0 and 1000000000"
        );
    }

    #[test]
    fn test_price() {
        assert!(validate_price("price", 0.0).is_ok());
        assert!(validate_price("price", 19.99).is_ok());
        assert!(validate_price("price", -1.0).is_err());
        assert!(validate_price("price", f64::NAN).is_err());
    }

    #[test]
    fn test_validate_new_product_normalizes() {
        let input = NewProduct {
            name: "  Milk 1L ".to_string(),
            category: Some("".to_string()),
            quantity: 12,
            price: 3.5,
            cost_price: 2.0,
        };
        let out = validate_new_product(&input).unwrap();
        assert_eq!(out.name, "Milk 1L");
        assert_eq!(out.category, None);

        let bad = NewProduct {
            quantity: -1,
            ..input
        };
        assert!(validate_new_product(&bad).is_err());
    }
}
