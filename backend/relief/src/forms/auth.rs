//! Login and sign-up forms on the home page.

use serde_json::{json, Map, Value};
use tracing::warn;

use super::{FormGroup, FormState, Rule};
use crate::auth::{password::MIN_PASSWORD_LEN, AuthService, UserRecord};
use crate::errors::{ReliefError, Result};

fn finish(state: &mut FormState, result: Result<UserRecord>) -> Result<UserRecord> {
    match &result {
        Ok(_) => *state = FormState::Success,
        Err(e) => {
            warn!("authentication failed: {e}");
            *state = FormState::Error(e.to_string());
        }
    }
    result
}

pub struct LoginForm {
    group: FormGroup,
    state: FormState,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginForm {
    pub fn new() -> Self {
        let group = FormGroup::new()
            .control("email", json!(""), vec![Rule::Required, Rule::Email])
            .control(
                "password",
                json!(""),
                vec![Rule::Required, Rule::MinLength(MIN_PASSWORD_LEN)],
            );
        Self {
            group,
            state: FormState::Idle,
        }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn patch_values(&mut self, values: &Map<String, Value>) {
        for (field, value) in values {
            self.group.set_value(field, value.clone());
        }
    }

    pub async fn submit(&mut self, auth: &AuthService) -> Result<UserRecord> {
        self.group.validate()?;
        self.state = FormState::Submitting;
        let result = auth
            .sign_in(self.group.str_value("email"), self.group.str_value("password"))
            .await;
        finish(&mut self.state, result)
    }
}

pub struct SignupForm {
    group: FormGroup,
    state: FormState,
}

impl Default for SignupForm {
    fn default() -> Self {
        Self::new()
    }
}

impl SignupForm {
    pub fn new() -> Self {
        let group = FormGroup::new()
            .control("name", json!(""), vec![Rule::Required])
            .control("email", json!(""), vec![Rule::Required, Rule::Email])
            .control(
                "password",
                json!(""),
                vec![Rule::Required, Rule::MinLength(MIN_PASSWORD_LEN)],
            )
            .control("confirmPassword", json!(""), vec![Rule::Required]);
        Self {
            group,
            state: FormState::Idle,
        }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn patch_values(&mut self, values: &Map<String, Value>) {
        for (field, value) in values {
            self.group.set_value(field, value.clone());
        }
    }

    pub async fn submit(&mut self, auth: &AuthService) -> Result<UserRecord> {
        self.group.validate()?;
        if self.group.str_value("password") != self.group.str_value("confirmPassword") {
            let err = ReliefError::field("confirmPassword", "Passwords do not match");
            self.state = FormState::Error(err.to_string());
            return Err(err);
        }
        self.state = FormState::Submitting;
        let result = auth
            .sign_up(
                self.group.str_value("email"),
                self.group.str_value("password"),
                Some(self.group.str_value("name")),
            )
            .await;
        finish(&mut self.state, result)
    }
}
