//! Form handling for the public pages.
//!
//! A [`FormGroup`] holds the raw field values a client submitted together
//! with the rules for each field. Controllers in the submodules drive the
//! submission lifecycle on top of it.

pub mod auth;
pub mod beneficiary;
pub mod donor;


use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{FieldErrors, ReliefError};

pub use auth::{LoginForm, SignupForm};
pub use beneficiary::{BeneficiaryAttachments, BeneficiaryForm};
pub use donor::DonorForm;

/// Where a successful submission sends the visitor.
pub const AFTER_SUBMIT: &str = "/";

/// Coarse lifecycle shown next to a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum FormState {
    Idle,
    Submitting,
    Success,
    Error(String),
}

/// Returned by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitted {
    pub id: String,
    pub redirect_to: String,
    pub redirect_after_ms: u64,
}

impl Submitted {
    pub fn new(id: String, delay: Duration) -> Self {
        Self {
            id,
            redirect_to: AFTER_SUBMIT.to_string(),
            redirect_after_ms: delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Rule {
    Required,
    /// Checkbox that must be ticked.
    RequiredTrue,
    Email,
    Pattern(&'static str),
    Min(f64),
    /// Non-negative whole number no larger than the bound.
    Integer(u64),
    MinLength(usize),
    /// `YYYY-MM-DD`.
    Date,
    OneOf(&'static [&'static str]),
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A non-negative whole number, from a JSON number or a numeric string.
pub(crate) fn whole_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Rule {
    /// `None` when the value passes. Only `Required` and `RequiredTrue`
    /// reject a blank value; the other rules skip it.
    fn check(&self, value: Option<&Value>) -> Option<String> {
        match self {
            Rule::Required => is_blank(value).then(|| "This field is required.".to_string()),
            Rule::RequiredTrue => {
                (value.and_then(Value::as_bool) != Some(true)).then(|| "This box must be ticked.".to_string())
            }
            _ if is_blank(value) => None,
            Rule::Email => {
                let ok = value.and_then(Value::as_str).is_some_and(|s| email_pattern().is_match(s.trim()));
                (!ok).then(|| "Enter a valid email address.".to_string())
            }
            Rule::Pattern(pattern) => {
                let ok = value
                    .and_then(Value::as_str)
                    .is_some_and(|s| Regex::new(pattern).is_ok_and(|re| re.is_match(s.trim())));
                (!ok).then(|| "The value has the wrong format.".to_string())
            }
            Rule::Min(min) => match value.and_then(as_number) {
                Some(n) if n >= *min => None,
                Some(_) => Some(format!("Must be at least {min}.")),
                None => Some("Must be a number.".to_string()),
            },
            Rule::Integer(max) => match value.and_then(whole_number) {
                Some(n) if n <= *max => None,
                Some(_) => Some(format!("Must be at most {max}.")),
                None => Some("Must be a whole number.".to_string()),
            },
            Rule::MinLength(len) => {
                let ok = value.and_then(Value::as_str).is_some_and(|s| s.chars().count() >= *len);
                (!ok).then(|| format!("Must be at least {len} characters."))
            }
            Rule::Date => {
                let ok = value
                    .and_then(Value::as_str)
                    .is_some_and(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok());
                (!ok).then(|| "Enter a date as YYYY-MM-DD.".to_string())
            }
            Rule::OneOf(options) => {
                let ok = value.and_then(Value::as_str).is_some_and(|s| options.contains(&s));
                (!ok).then(|| format!("Choose one of: {}.", options.join(", ")))
            }
        }
    }
}

/// Field values plus per-field rules, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FormGroup {
    values: Map<String, Value>,
    rules: Vec<(String, Vec<Rule>)>,
    touched: BTreeSet<String>,
}

impl FormGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field with its initial value.
    pub fn control(mut self, name: &str, initial: Value, rules: Vec<Rule>) -> Self {
        self.values.insert(name.to_string(), initial);
        self.rules.push((name.to_string(), rules));
        self
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str_value(&self, name: &str) -> &str {
        self.values.get(name).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn bool_value(&self, name: &str) -> bool {
        self.values.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Set a declared field, marking it touched. Unknown fields are ignored.
    pub fn set_value(&mut self, name: &str, value: Value) -> bool {
        if !self.rules.iter().any(|(field, _)| field == name) {
            return false;
        }
        self.values.insert(name.to_string(), value);
        self.touched.insert(name.to_string());
        true
    }

    pub fn set_rules(&mut self, name: &str, rules: Vec<Rule>) {
        if let Some((_, existing)) = self.rules.iter_mut().find(|(field, _)| field == name) {
            *existing = rules;
        }
    }

    pub fn mark_all_as_touched(&mut self) {
        self.touched = self.rules.iter().map(|(field, _)| field.clone()).collect();
    }

    pub fn is_touched(&self, name: &str) -> bool {
        self.touched.contains(name)
    }

    fn field_errors(&self, name: &str, rules: &[Rule]) -> Vec<String> {
        let value = self.values.get(name);
        rules.iter().filter_map(|rule| rule.check(value)).collect()
    }

    pub fn errors(&self) -> FieldErrors {
        self.rules
            .iter()
            .filter_map(|(name, rules)| {
                let messages = self.field_errors(name, rules);
                (!messages.is_empty()).then(|| (name.clone(), messages))
            })
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }

    /// Invalid and already touched, i.e. worth flagging to the user.
    pub fn is_invalid(&self, name: &str) -> bool {
        self.is_touched(name)
            && self
                .rules
                .iter()
                .find(|(field, _)| field == name)
                .is_some_and(|(_, rules)| !self.field_errors(name, rules).is_empty())
    }

    /// Marks everything touched and returns the errors when invalid.
    pub fn validate(&mut self) -> Result<(), ReliefError> {
        let errors = self.errors();
        if errors.is_empty() {
            return Ok(());
        }
        self.mark_all_as_touched();
        Err(ReliefError::Validation(errors))
    }
}
