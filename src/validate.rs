//! Form validation for customer and staff records.
//!
//! Validation is pure and synchronous: callers re-run it on every submit and refuse to touch the
//! network while any field error is present.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{CustomerForm, StaffForm};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+@\S+\.\S+").expect("email pattern"));
static IPV4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)$")
        .expect("ipv4 pattern")
});

/// A finite decimal amount. `NaN` and the infinities parse as `f64` but are not amounts.
pub fn parse_amount(raw: &str) -> Option<f64> { raw.trim().parse::<f64>().ok().filter(|v| v.is_finite()) }

pub const MIN_PHONE_DIGITS: usize = 10;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Per-field error messages, keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.0.insert(field.to_string(), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool { self.0.contains_key(field) }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(())` when empty, otherwise the errors wrapped as a validation failure.
    pub fn into_result(self) -> crate::error::AppResult<()> {
        if self.is_empty() { Ok(()) } else { Err(crate::error::AppError::validation(self)) }
    }
}

/// Whether a staff form is creating a new account or editing an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit,
}

pub fn is_valid_email(email: &str) -> bool { EMAIL_RE.is_match(email) }

pub fn is_valid_ipv4(ip: &str) -> bool { IPV4_RE.is_match(ip) }

fn is_valid_phone(phone: &str) -> bool {
    phone.chars().count() >= MIN_PHONE_DIGITS && phone.chars().all(|c| c.is_ascii_digit())
}

pub fn validate_customer(form: &CustomerForm, today: NaiveDate) -> FieldErrors {
    let mut errors = FieldErrors::default();

    if form.name.trim().is_empty() {
        errors.insert("name", "Name is required");
    }

    if form.phone.trim().is_empty() {
        errors.insert("phone", "Phone is required");
    } else if !is_valid_phone(&form.phone) {
        errors.insert("phone", "Phone number should be at least 10 digits");
    }

    if form.email.trim().is_empty() {
        errors.insert("email", "Email is required");
    } else if !is_valid_email(&form.email) {
        errors.insert("email", "Email is invalid");
    }

    if parse_amount(&form.balance).is_none() {
        errors.insert("balance", "Balance must be a number");
    }

    if !is_valid_ipv4(&form.router_ip_address) {
        errors.insert("router_ip_address", "Invalid IP address");
    }

    if form.bandwidth.trim().is_empty() {
        errors.insert("bandwidth", "Bandwidth is required");
    } else if form.bandwidth.trim().parse::<i64>().is_err() {
        errors.insert("bandwidth", "Bandwidth must be a number");
    }

    if form.subscription_amount.trim().is_empty() {
        errors.insert("subscription_amount", "Subscription amount is required");
    } else if parse_amount(&form.subscription_amount).is_none() {
        errors.insert("subscription_amount", "Subscription amount must be a number");
    }

    if form.start_date.trim().is_empty() {
        errors.insert("start_date", "Start date is required");
    }

    let last_payment = form.last_payment_date.trim();
    if !last_payment.is_empty() {
        match NaiveDate::parse_from_str(last_payment, "%Y-%m-%d") {
            Ok(d) if d > today => errors.insert("last_payment_date", "Last payment date cannot be in the future"),
            Ok(_) => {}
            Err(_) => errors.insert("last_payment_date", "Last payment date is invalid"),
        }
    }

    errors
}

pub fn validate_staff(form: &StaffForm, mode: FormMode) -> FieldErrors {
    let mut errors = FieldErrors::default();
    if form.username.is_empty() {
        errors.insert("username", "Username is required");
    }
    if form.email.is_empty() {
        errors.insert("email", "Email is required");
    }
    if mode == FormMode::Create {
        if form.password.chars().count() < MIN_PASSWORD_LEN {
            errors.insert("password", "Password must be at least 8 characters long");
        }
        if form.password != form.confirm_password {
            errors.insert("confirm_password", "Passwords do not match");
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 6, 15).unwrap() }

    fn good_customer() -> CustomerForm {
        CustomerForm {
            name: "Jane Wanjiru".into(),
            phone: "0712345678".into(),
            email: "jane@example.com".into(),
            balance: "0".into(),
            router_ip_address: "192.168.88.1".into(),
            bandwidth: "10".into(),
            subscription_amount: "2500.50".into(),
            start_date: "2024-01-01".into(),
            last_payment_date: "2024-06-01".into(),
        }
    }

    #[test]
    fn valid_customer_has_no_errors() {
        assert!(validate_customer(&good_customer(), today()).is_empty());
    }

    #[test]
    fn short_phone_is_rejected() {
        let form = CustomerForm { phone: "12345".into(), ..good_customer() };
        let errs = validate_customer(&form, today());
        assert_eq!(errs.get("phone"), Some("Phone number should be at least 10 digits"));
        assert_eq!(errs.len(), 1);
    }

    #[test]
    fn phone_with_separators_is_rejected() {
        let form = CustomerForm { phone: "0712-345-678".into(), ..good_customer() };
        assert!(validate_customer(&form, today()).contains("phone"));
    }

    #[test]
    fn out_of_range_octet_fails_ip_check() {
        let form = CustomerForm { router_ip_address: "999.1.1.1".into(), ..good_customer() };
        assert_eq!(validate_customer(&form, today()).get("router_ip_address"), Some("Invalid IP address"));
        assert!(is_valid_ipv4("255.255.255.0"));
        assert!(is_valid_ipv4("10.0.0.1"));
        assert!(!is_valid_ipv4("10.0.0"));
        assert!(!is_valid_ipv4("256.0.0.1"));
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("no-at-sign.com"));
        let form = CustomerForm { email: "   ".into(), ..good_customer() };
        assert_eq!(validate_customer(&form, today()).get("email"), Some("Email is required"));
    }

    #[test]
    fn numeric_fields() {
        let form = CustomerForm {
            balance: "abc".into(),
            bandwidth: "fast".into(),
            subscription_amount: "".into(),
            ..good_customer()
        };
        let errs = validate_customer(&form, today());
        assert_eq!(errs.get("balance"), Some("Balance must be a number"));
        assert_eq!(errs.get("bandwidth"), Some("Bandwidth must be a number"));
        assert_eq!(errs.get("subscription_amount"), Some("Subscription amount is required"));
    }

    #[test]
    fn non_finite_amounts_are_not_numbers() {
        for raw in ["NaN", "inf", "-infinity"] {
            let form = CustomerForm { balance: raw.into(), subscription_amount: raw.into(), ..good_customer() };
            let errs = validate_customer(&form, today());
            assert_eq!(errs.get("balance"), Some("Balance must be a number"), "{raw}");
            assert_eq!(errs.get("subscription_amount"), Some("Subscription amount must be a number"), "{raw}");
        }
        assert_eq!(parse_amount(" -12.5 "), Some(-12.5));
    }

    #[test]
    fn last_payment_date_cannot_be_in_future() {
        let form = CustomerForm { last_payment_date: "2024-06-16".into(), ..good_customer() };
        assert_eq!(
            validate_customer(&form, today()).get("last_payment_date"),
            Some("Last payment date cannot be in the future")
        );
        let same_day = CustomerForm { last_payment_date: "2024-06-15".into(), ..good_customer() };
        assert!(validate_customer(&same_day, today()).is_empty());
        let blank = CustomerForm { last_payment_date: "".into(), ..good_customer() };
        assert!(validate_customer(&blank, today()).is_empty());
    }

    #[test]
    fn missing_required_customer_fields() {
        let errs = validate_customer(&CustomerForm::default(), today());
        for field in ["name", "phone", "email", "bandwidth", "subscription_amount", "start_date"] {
            assert!(errs.contains(field), "expected error for {field}");
        }
        // default router address and zero balance are acceptable
        assert!(!errs.contains("router_ip_address"));
        assert!(!errs.contains("balance"));
    }

    #[test]
    fn staff_create_requires_matching_long_password() {
        let form = StaffForm {
            username: "ops1".into(),
            email: "ops1@example.com".into(),
            password: "short".into(),
            confirm_password: "shorter".into(),
            ..StaffForm::default()
        };
        let errs = validate_staff(&form, FormMode::Create);
        assert_eq!(errs.get("password"), Some("Password must be at least 8 characters long"));
        assert_eq!(errs.get("confirm_password"), Some("Passwords do not match"));
    }

    #[test]
    fn staff_edit_skips_password_rules() {
        let form = StaffForm { username: "ops1".into(), email: "ops1@example.com".into(), ..StaffForm::default() };
        assert!(validate_staff(&form, FormMode::Edit).is_empty());
        let blank = StaffForm::default();
        let errs = validate_staff(&blank, FormMode::Edit);
        assert_eq!(errs.get("username"), Some("Username is required"));
        assert_eq!(errs.get("email"), Some("Email is required"));
    }

    #[test]
    fn into_result_wraps_errors() {
        assert!(FieldErrors::default().into_result().is_ok());
        let mut f = FieldErrors::default();
        f.insert("name", "Name is required");
        let err = f.into_result().unwrap_err();
        assert_eq!(err.code_str(), "validation_failed");
    }
}
