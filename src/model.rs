//! Records exchanged with the REST backend and the role store, plus the editable form shapes.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};
use crate::identity::Role;
use crate::validate::{parse_amount, FieldErrors};

pub const DEFAULT_ROUTER_IP: &str = "192.168.88.1";

pub type CustomerId = i64;
pub type StaffId = i64;

// The backend serialises decimals as strings; accept either shape.
fn de_lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn de_lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    #[serde(default)]
    pub router_ip_address: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub bandwidth: Option<i64>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub subscription_amount: Option<f64>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub last_payment_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    #[serde(default)]
    pub db_id: Option<CustomerId>,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub balance: Option<f64>,
    #[serde(default)]
    pub router_ip_address: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

impl Customer {
    pub fn primary_subscription(&self) -> Option<&Subscription> { self.subscriptions.first() }
}

/// Normalise an ISO date or timestamp to `YYYY-MM-DD`; anything unparseable becomes empty.
pub fn date_only(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else { return String::new(); };
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.format("%Y-%m-%d").to_string();
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.date_naive().format("%Y-%m-%d").to_string();
    }
    String::new()
}

/// Editable customer form. Every field is text, as typed by the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerForm {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub balance: String,
    pub router_ip_address: String,
    pub bandwidth: String,
    pub subscription_amount: String,
    pub start_date: String,
    pub last_payment_date: String,
}

impl Default for CustomerForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            phone: String::new(),
            email: String::new(),
            balance: "0".into(),
            router_ip_address: DEFAULT_ROUTER_IP.into(),
            bandwidth: String::new(),
            subscription_amount: String::new(),
            start_date: String::new(),
            last_payment_date: String::new(),
        }
    }
}

impl CustomerForm {
    /// Prefill from an existing record, taking subscription fields from the first subscription.
    pub fn from_customer(c: &Customer) -> Self {
        let sub = c.primary_subscription();
        Self {
            name: c.name.clone(),
            phone: c.phone.clone(),
            email: c.email.clone(),
            balance: c.balance.unwrap_or(0.0).to_string(),
            router_ip_address: c.router_ip_address.clone().unwrap_or_else(|| DEFAULT_ROUTER_IP.into()),
            bandwidth: sub.and_then(|s| s.bandwidth).map(|b| b.to_string()).unwrap_or_default(),
            subscription_amount: sub.and_then(|s| s.subscription_amount).map(|a| a.to_string()).unwrap_or_default(),
            start_date: sub.and_then(|s| s.start_date.clone()).unwrap_or_default(),
            last_payment_date: date_only(sub.and_then(|s| s.last_payment_date.as_deref())),
        }
    }
}

/// Wire shape for customer create/update, with numeric fields coerced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerPayload {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub balance: f64,
    pub router_ip_address: String,
    pub bandwidth: i64,
    pub subscription_amount: f64,
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_date: Option<String>,
}

impl TryFrom<&CustomerForm> for CustomerPayload {
    type Error = AppError;

    fn try_from(form: &CustomerForm) -> AppResult<Self> {
        let mut errors = FieldErrors::default();
        let balance = parse_amount(&form.balance).or_else(|| {
            errors.insert("balance", "Balance must be a number");
            None
        });
        let bandwidth = form.bandwidth.trim().parse::<i64>().map_err(|_| errors.insert("bandwidth", "Bandwidth must be a number")).ok();
        let amount = parse_amount(&form.subscription_amount).or_else(|| {
            errors.insert("subscription_amount", "Subscription amount must be a number");
            None
        });
        let (Some(balance), Some(bandwidth), Some(subscription_amount)) = (balance, bandwidth, amount) else {
            return Err(AppError::validation(errors));
        };
        let last_payment = form.last_payment_date.trim();
        Ok(Self {
            name: form.name.trim().to_string(),
            phone: form.phone.clone(),
            email: form.email.trim().to_string(),
            balance,
            router_ip_address: form.router_ip_address.clone(),
            bandwidth,
            subscription_amount,
            start_date: form.start_date.trim().to_string(),
            last_payment_date: (!last_payment.is_empty()).then(|| last_payment.to_string()),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaffMember {
    pub id: StaffId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_staff: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffForm {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub password: String,
    pub confirm_password: String,
}

impl Default for StaffForm {
    fn default() -> Self {
        Self {
            username: String::new(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_superuser: false,
            is_staff: true,
            password: String::new(),
            confirm_password: String::new(),
        }
    }
}

impl StaffForm {
    pub fn from_member(m: &StaffMember) -> Self {
        Self {
            username: m.username.clone(),
            email: m.email.clone(),
            first_name: m.first_name.clone(),
            last_name: m.last_name.clone(),
            is_superuser: m.is_superuser,
            is_staff: m.is_staff,
            ..Self::default()
        }
    }

    /// Superusers are admins in the role store; everyone else is a plain user.
    pub fn role(&self) -> Role {
        if self.is_superuser { Role::Admin } else { Role::User }
    }
}

/// Wire shape for staff create/update. The confirmation field never leaves the form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaffPayload {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl StaffPayload {
    pub fn for_create(form: &StaffForm) -> Self {
        Self { password: Some(form.password.clone()), ..Self::for_update(form) }
    }

    pub fn for_update(form: &StaffForm) -> Self {
        Self {
            username: form.username.clone(),
            email: form.email.clone(),
            first_name: form.first_name.clone(),
            last_name: form.last_name.clone(),
            is_superuser: form.is_superuser,
            is_staff: form.is_staff,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Role document stored under the identity account's identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleRecord {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Credential token of the account, kept so the account can be deleted later.
    #[serde(default, rename = "idToken")]
    pub id_token: Option<String>,
}

impl RoleRecord {
    pub fn for_staff(form: &StaffForm, id_token: Option<String>) -> Self {
        Self {
            username: form.username.clone(),
            email: form.email.clone(),
            first_name: form.first_name.clone(),
            last_name: form.last_name.clone(),
            role: Some(form.role().as_str().to_string()),
            id_token,
        }
    }

    /// Absent or blank tags resolve to no role.
    pub fn role(&self) -> Option<Role> {
        self.role.as_deref().map(str::trim).filter(|r| !r.is_empty()).map(Role::from)
    }

    /// Overwrite profile fields and role from the form, keeping the stored credential token.
    pub fn merged_with(&self, form: &StaffForm) -> Self {
        Self::for_staff(form, self.id_token.clone())
    }
}
