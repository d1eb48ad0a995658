//! # Validation Module
//!
//! Checks run on sales and credits before anything touches the queue.
//!
//! A record that reaches the queue is submitted as-is, possibly hours later.
//! Rejecting it there would strand it, so reject it here.
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_amount, validate_quantity};
//!
//! assert!(validate_quantity(5).is_ok());
//! assert!(validate_amount("unit_price", -1).is_err());
//! assert!(validate_amount("unit_price", i64::MAX / 100).is_err());
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{NewCredit, NewSale};
use crate::{MAX_AMOUNT_CENTS, MAX_LINE_QUANTITY, MAX_SALE_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a credit customer's name.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_customer_name;
///
/// assert!(validate_customer_name("Amina Yusuf").is_ok());
/// assert!(validate_customer_name("   ").is_err());
/// ```
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "customer_name".to_string(),
        });
    }

    if name.chars().count() > 120 {
        return Err(ValidationError::TooLong {
            field: "customer_name".to_string(),
            max: 120,
        });
    }

    Ok(())
}

/// Validates an optional phone number.
///
/// Accepts digits with an optional leading `+` and spaces or hyphens as
/// separators. At least 7 digits are required.
pub fn validate_phone_number(phone: &str) -> ValidationResult<()> {
    let phone = phone.trim();
    let body = phone.strip_prefix('+').unwrap_or(phone);

    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "phone_number".to_string(),
            reason: "must contain only digits, spaces and hyphens".to_string(),
        });
    }

    let digits = body.chars().filter(char::is_ascii_digit).count();
    if !(7..=15).contains(&digits) {
        return Err(ValidationError::InvalidFormat {
            field: "phone_number".to_string(),
            reason: "must have between 7 and 15 digits".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity (1 to `MAX_LINE_QUANTITY`).
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if !(1..=MAX_LINE_QUANTITY).contains(&qty) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a money amount in cents (0 to `MAX_AMOUNT_CENTS`).
pub fn validate_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }
    Ok(())
}

// =============================================================================
// Record Validators
// =============================================================================

/// Validates a sale before it is queued.
pub fn validate_new_sale(sale: &NewSale) -> CoreResult<()> {
    if sale.worker_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "worker_id".to_string(),
        }
        .into());
    }

    if sale.items.is_empty() {
        return Err(CoreError::EmptySale);
    }

    if sale.items.len() > MAX_SALE_LINES {
        return Err(CoreError::TooManyLines {
            max: MAX_SALE_LINES,
        });
    }

    for line in &sale.items {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "product_id".to_string(),
            }
            .into());
        }
        validate_quantity(line.quantity)?;
        validate_amount("unit_price", line.unit_price_cents)?;
        validate_amount("cost_price", line.cost_price_cents)?;
    }

    if sale.amount_paid_cents < 0 {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "amount paid cannot be negative".to_string(),
        });
    }
    validate_amount("amount_paid", sale.amount_paid_cents)?;

    Ok(())
}

/// Validates a credit before it is queued.
pub fn validate_new_credit(credit: &NewCredit) -> CoreResult<()> {
    validate_customer_name(&credit.customer_name)?;

    if let Some(phone) = &credit.phone_number {
        validate_phone_number(phone)?;
    }

    if credit.total_owed_cents <= 0 {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "amount owed must be positive".to_string(),
        });
    }
    validate_amount("total_owed", credit.total_owed_cents)?;

    validate_amount("amount_paid", credit.amount_paid_cents)?;

    if credit.amount_paid_cents > credit.total_owed_cents {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "amount paid exceeds amount owed".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
