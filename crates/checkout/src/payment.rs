//! Payment credential format checks.
//!
//! Nothing here authorizes a charge; it only rejects input that could never be
//! valid before the external authorizer is called.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::billing::FieldErrors;

/// Raw card form as submitted.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PaymentForm {
    pub cardholder: String,
    pub card_number: String,
    /// `MM/YY`.
    pub expiry: String,
    pub cvc: String,
}

impl core::fmt::Debug for PaymentForm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PaymentForm")
            .field("cardholder", &self.cardholder)
            .field("card_number", &"***")
            .field("expiry", &self.expiry)
            .field("cvc", &"***")
            .finish()
    }
}

/// Well-formed payment credential, ready for the authorizer.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct PaymentDetails {
    pub cardholder: String,
    /// Digits only.
    pub card_number: String,
    pub exp_month: u32,
    /// Four-digit year.
    pub exp_year: i32,
    pub cvc: String,
}

impl PaymentDetails {
    pub fn last4(&self) -> &str {
        let n = self.card_number.len();
        &self.card_number[n.saturating_sub(4)..]
    }
}

impl core::fmt::Debug for PaymentDetails {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PaymentDetails")
            .field("cardholder", &self.cardholder)
            .field("last4", &self.last4())
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .finish_non_exhaustive()
    }
}

impl PaymentForm {
    /// Check the card's format against `today` (expiry is inclusive of its month).
    pub fn validate(&self, today: NaiveDate) -> Result<PaymentDetails, FieldErrors> {
        let mut errors = FieldErrors::new();

        let cardholder = self.cardholder.trim();
        if cardholder.is_empty() {
            errors.push("cardholder", "is required");
        }

        let digits: String = self
            .card_number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect();
        if digits.is_empty() {
            errors.push("card_number", "is required");
        } else if !digits.chars().all(|c| c.is_ascii_digit()) {
            errors.push("card_number", "must contain only digits");
        } else if !(12..=19).contains(&digits.len()) {
            errors.push("card_number", "must be 12 to 19 digits");
        } else if !luhn_valid(&digits) {
            errors.push("card_number", "failed the checksum");
        }

        let expiry = parse_expiry(self.expiry.trim());
        match expiry {
            None => errors.push("expiry", "must be MM/YY"),
            Some((month, year)) => {
                if (year, month) < (today.year(), today.month()) {
                    errors.push("expiry", "card has expired");
                }
            }
        }

        let cvc = self.cvc.trim();
        if !(3..=4).contains(&cvc.len()) || !cvc.chars().all(|c| c.is_ascii_digit()) {
            errors.push("cvc", "must be 3 or 4 digits");
        }

        let (exp_month, exp_year) = expiry.unwrap_or((0, 0));
        errors.into_result(PaymentDetails {
            cardholder: cardholder.to_string(),
            card_number: digits,
            exp_month,
            exp_year,
            cvc: cvc.to_string(),
        })
    }
}

/// `MM/YY` → `(month, 20YY)`.
fn parse_expiry(raw: &str) -> Option<(u32, i32)> {
    let (mm, yy) = raw.split_once('/')?;
    if mm.len() != 2 || yy.len() != 2 {
        return None;
    }
    let month: u32 = mm.parse().ok()?;
    let year: i32 = yy.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((month, 2000 + year))
}

fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(mut d) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}
