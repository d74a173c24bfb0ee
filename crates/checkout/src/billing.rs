use serde::{Deserialize, Serialize};

use rdpstore_provisioning::BillingContact;

/// One failed form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// All field errors of a form submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// `Ok(value)` when no error was collected.
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl core::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        for e in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
            first = false;
        }
        Ok(())
    }
}

/// Raw billing form as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingForm {
    pub full_name: String,
    pub email: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl BillingForm {
    /// Validate every field and return all failures at once.
    pub fn validate(&self) -> Result<BillingContact, FieldErrors> {
        let mut errors = FieldErrors::new();

        let full_name = self.full_name.trim();
        if full_name.is_empty() {
            errors.push("full_name", "is required");
        } else if full_name.chars().count() > 120 {
            errors.push("full_name", "must be at most 120 characters");
        }

        let email = self.email.trim();
        if email.is_empty() {
            errors.push("email", "is required");
        } else if !is_plausible_email(email) {
            errors.push("email", "is not a valid address");
        }

        let address = self.address_line1.trim();
        if address.is_empty() {
            errors.push("address_line1", "is required");
        }

        let city = self.city.trim();
        if city.is_empty() {
            errors.push("city", "is required");
        }

        let postal_code = self.postal_code.trim();
        if postal_code.is_empty() {
            errors.push("postal_code", "is required");
        } else if postal_code.len() > 12
            || !postal_code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-')
        {
            errors.push("postal_code", "is not a valid postal code");
        }

        let country = self.country.trim().to_ascii_uppercase();
        if country.is_empty() {
            errors.push("country", "is required");
        } else if country.len() != 2 || !country.chars().all(|c| c.is_ascii_uppercase()) {
            errors.push("country", "must be a two-letter ISO country code");
        }

        let phone = non_empty(self.phone.as_deref());
        if let Some(p) = phone {
            let digits = p.chars().filter(char::is_ascii_digit).count();
            let allowed = p
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
            if !allowed || !(7..=15).contains(&digits) {
                errors.push("phone", "is not a valid phone number");
            }
        }

        let contact = BillingContact {
            full_name: full_name.to_string(),
            email: email.to_ascii_lowercase(),
            address_line1: address.to_string(),
            address_line2: non_empty(self.address_line2.as_deref()).map(str::to_string),
            city: city.to_string(),
            postal_code: postal_code.to_string(),
            country,
            phone: phone.map(str::to_string),
        };
        errors.into_result(contact)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> BillingForm {
        BillingForm {
            full_name: "Ada Lovelace".to_string(),
            email: "Ada@Example.com".to_string(),
            address_line1: "12 Analytical St".to_string(),
            address_line2: Some("  ".to_string()),
            city: "London".to_string(),
            postal_code: "N1 9GU".to_string(),
            country: "gb".to_string(),
            phone: Some("+44 20 7946 0958".to_string()),
        }
    }

    #[test]
    fn valid_form_normalizes_contact() {
        let contact = valid_form().validate().unwrap();
        assert_eq!(contact.email, "ada@example.com");
        assert_eq!(contact.country, "GB");
        assert_eq!(contact.address_line2, None);
        assert_eq!(contact.phone.as_deref(), Some("+44 20 7946 0958"));
    }

    #[test]
    fn all_field_errors_are_reported_together() {
        let errors = BillingForm::default().validate().unwrap_err();
        for field in ["full_name", "email", "address_line1", "city", "postal_code", "country"] {
            assert!(errors.has(field), "missing error for {field}");
        }
        assert_eq!(errors.len(), 6);
    }

    #[test]
    fn malformed_fields_are_flagged() {
        let mut form = valid_form();
        form.email = "ada@localhost".to_string();
        form.country = "GBR".to_string();
        form.phone = Some("call me".to_string());

        let errors = form.validate().unwrap_err();
        assert!(errors.has("email"));
        assert!(errors.has("country"));
        assert!(errors.has("phone"));
        assert!(!errors.has("city"));
    }

    #[test]
    fn display_joins_errors() {
        let mut errors = FieldErrors::new();
        errors.push("email", "is required");
        errors.push("city", "is required");
        assert_eq!(errors.to_string(), "email: is required; city: is required");
    }
}
