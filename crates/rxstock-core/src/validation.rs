//! # Validation Module
//!
//! Input validation for sale, batch and settings requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handlers (outside this workspace)                       │
//! │  └── Deserialization into request types                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE, before any unit of work begins                  │
//! │  ├── quantities positive, amounts non-negative                         │
//! │  └── barcodes present, descriptions bounded, dates well formed         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite CHECK constraints                                     │
//! │  └── quantity >= 0, usage qty > 0, status in allowed set               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use rxstock_core::validation::{validate_barcode, validate_quantity};
//!
//! validate_barcode("8901234567890").unwrap();
//! assert!(validate_quantity(0).is_err());
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::types::{BatchUpdate, SaleLine};
use crate::{MAX_BARCODE_LENGTH, MAX_DESCRIPTION_LENGTH, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Date format accepted for expiry dates.
pub const EXPIRY_DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product barcode.
///
/// ## Rules
/// - Must not be empty or whitespace
/// - At most [`MAX_BARCODE_LENGTH`] characters
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();

    if barcode.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if barcode.chars().count() > MAX_BARCODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: MAX_BARCODE_LENGTH,
        });
    }

    Ok(())
}

/// Normalizes a free-text sale description.
///
/// Blank text becomes `None`; anything over [`MAX_DESCRIPTION_LENGTH`]
/// characters is rejected.
pub fn normalize_description(description: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(text) = description.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    if text.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: MAX_DESCRIPTION_LENGTH,
        });
    }

    Ok(Some(text.to_string()))
}

/// Parses an expiry date in `YYYY-MM-DD` form.
pub fn parse_expiry_date(raw: &str) -> ValidationResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), EXPIRY_DATE_FORMAT).map_err(|e| {
        ValidationError::InvalidFormat {
            field: "expiry_date".to_string(),
            reason: e.to_string(),
        }
    })
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a consumed or received quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Cannot exceed [`MAX_ITEM_QUANTITY`]
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates cash tendered. Zero is allowed (fully discounted sale).
pub fn validate_amount_given(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: "amount_given".to_string(),
        });
    }

    Ok(())
}

/// Validates a shelf price in cents. Zero is allowed (free sample).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: "price".to_string(),
        });
    }

    Ok(())
}

/// Validates pharmacy alert settings.
pub fn validate_alert_settings(low_stock_threshold: i64, expiry_alert_days: i64) -> ValidationResult<()> {
    if low_stock_threshold < 0 {
        return Err(ValidationError::Negative {
            field: "low_stock_threshold".to_string(),
        });
    }

    if !(1..=365).contains(&expiry_alert_days) {
        return Err(ValidationError::OutOfRange {
            field: "expiry_alert_days".to_string(),
            min: 1,
            max: 365,
        });
    }

    Ok(())
}

// =============================================================================
// Request Validators
// =============================================================================

/// Validates the items of a sale or sale edit.
///
/// ## Rules
/// - At least one line
/// - Every line has a barcode and a positive quantity
pub fn validate_sale_lines(lines: &[SaleLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    for line in lines {
        validate_barcode(&line.barcode)?;
        validate_quantity(line.quantity)?;
    }

    Ok(())
}

/// Rejects batch edits that carry no change.
pub fn validate_batch_update(update: &BatchUpdate) -> ValidationResult<()> {
    if update.is_empty() {
        return Err(ValidationError::NoChanges);
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("8901234567890").is_ok());
        assert!(validate_barcode("   ").is_err());
        assert!(validate_barcode(&"9".repeat(MAX_BARCODE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_normalize_description() {
        assert_eq!(normalize_description(None).unwrap(), None);
        assert_eq!(normalize_description(Some("  ")).unwrap(), None);
        assert_eq!(
            normalize_description(Some(" walk-in ")).unwrap(),
            Some("walk-in".to_string())
        );
        let long = "x".repeat(MAX_DESCRIPTION_LENGTH + 1);
        assert!(matches!(
            normalize_description(Some(&long)),
            Err(ValidationError::TooLong { max: 2000, .. })
        ));
    }

    #[test]
    fn test_parse_expiry_date() {
        let date = parse_expiry_date("2027-01-31").unwrap();
        assert_eq!(date.to_string(), "2027-01-31");
        assert!(parse_expiry_date("31/01/2027").is_err());
        assert!(parse_expiry_date("2027-02-30").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-4).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_sale_lines() {
        assert!(validate_sale_lines(&[]).is_err());
        assert!(validate_sale_lines(&[SaleLine::new("A", 2)]).is_ok());
        assert!(validate_sale_lines(&[SaleLine::new("A", 2), SaleLine::new("", 1)]).is_err());
        assert!(validate_sale_lines(&[SaleLine::new("A", 0)]).is_err());
    }

    #[test]
    fn test_validate_amounts_and_settings() {
        assert!(validate_amount_given(0).is_ok());
        assert!(validate_amount_given(-1).is_err());
        assert!(validate_price_cents(-1).is_err());
        assert!(validate_alert_settings(10, 30).is_ok());
        assert!(validate_alert_settings(-1, 30).is_err());
        assert!(validate_alert_settings(10, 0).is_err());
    }

    #[test]
    fn test_empty_batch_update_rejected() {
        assert!(matches!(
            validate_batch_update(&BatchUpdate::default()),
            Err(ValidationError::NoChanges)
        ));
    }
}
