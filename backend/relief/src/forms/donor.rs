//! The "offer support" form.

use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use super::{is_blank, whole_number, FormGroup, FormState, Rule, Submitted};
use crate::errors::{ReliefError, Result};
use crate::models::{DonorType, NewDonor, SupportType};
use crate::persistence::PersistenceService;

const PHONE_PATTERN: &str = "^0[0-9]{9}$";

/// One checkbox per support type.
const SUPPORT_CHECKBOXES: [(&str, SupportType); 5] = [
    ("supportTypeFundFull", SupportType::FundFullHouse),
    ("supportTypeFundPart", SupportType::FundPartOfHouse),
    ("supportTypeMaterials", SupportType::ProvideMaterials),
    ("supportTypeLabour", SupportType::ProvideLabour),
    ("supportTypeLand", SupportType::ProvideLand),
];

pub struct DonorForm {
    group: FormGroup,
    state: FormState,
    persistence: PersistenceService,
    redirect_delay: Duration,
}

impl DonorForm {
    pub fn new(persistence: PersistenceService, redirect_delay: Duration) -> Self {
        let mut group = FormGroup::new()
            .control(
                "donorType",
                json!("Individual"),
                vec![Rule::Required, Rule::OneOf(&["Individual", "Organisation"])],
            )
            .control("name", json!(""), vec![Rule::Required])
            .control("contactPerson", json!(""), vec![])
            .control("phone", json!(""), vec![Rule::Required, Rule::Pattern(PHONE_PATTERN)])
            .control("email", json!(""), vec![Rule::Required, Rule::Email])
            .control("country", json!(""), vec![Rule::Required]);
        for (field, _) in SUPPORT_CHECKBOXES {
            group = group.control(field, json!(false), vec![]);
        }
        let group = group
            .control("budget", json!(0), vec![Rule::Min(0.0), Rule::Integer(u64::MAX)])
            .control("preferredDistrict", json!("Any"), vec![])
            .control("timeframe", json!("1-3 months"), vec![Rule::Required])
            .control("displayName", json!(false), vec![Rule::Required])
            .control("wantsUpdates", json!(true), vec![Rule::Required]);

        Self {
            group,
            state: FormState::Idle,
            persistence,
            redirect_delay,
        }
    }

    pub fn group(&self) -> &FormGroup {
        &self.group
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    /// Changing the donor type re-evaluates whether a contact person is needed.
    pub fn set_value(&mut self, field: &str, value: Value) -> bool {
        let known = self.group.set_value(field, value);
        if known && field == "donorType" {
            let rules = if self.group.str_value("donorType") == "Organisation" {
                vec![Rule::Required]
            } else {
                vec![]
            };
            self.group.set_rules("contactPerson", rules);
        }
        known
    }

    pub fn patch_values(&mut self, values: &Map<String, Value>) {
        for (field, value) in values {
            self.set_value(field, value.clone());
        }
    }

    pub fn selected_support_types(&self) -> Vec<SupportType> {
        SUPPORT_CHECKBOXES
            .iter()
            .filter(|(field, _)| self.group.bool_value(field))
            .map(|(_, support)| *support)
            .collect()
    }

    fn donor(&self) -> Result<NewDonor> {
        let g = &self.group;
        let donor_type: DonorType = serde_json::from_value(json!(g.str_value("donorType")))?;
        // A blank budget means no amount pledged.
        let budget = match g.value("budget") {
            Some(b) if !is_blank(Some(b)) => {
                whole_number(b).ok_or_else(|| ReliefError::field("budget", "Must be a whole number."))?
            }
            _ => 0,
        };
        Ok(NewDonor {
            donor_type,
            name: g.str_value("name").trim().to_string(),
            contact_person: g.str_value("contactPerson").trim().to_string(),
            phone: g.str_value("phone").trim().to_string(),
            email: g.str_value("email").trim().to_string(),
            country: g.str_value("country").trim().to_string(),
            support_type: self.selected_support_types(),
            budget,
            preferred_district: g.str_value("preferredDistrict").to_string(),
            timeframe: g.str_value("timeframe").to_string(),
            display_name: g.bool_value("displayName"),
            wants_updates: g.bool_value("wantsUpdates"),
        })
    }

    pub async fn submit(&mut self) -> Result<Submitted> {
        if let Err(e) = self.group.validate() {
            warn!("donor registration rejected by validation");
            return Err(e);
        }

        self.state = FormState::Submitting;
        let result = match self.donor() {
            Ok(donor) => self.persistence.create_donor(&donor).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(id) => {
                self.state = FormState::Success;
                info!(%id, "donor registered");
                Ok(Submitted::new(id, self.redirect_delay))
            }
            Err(e) => {
                error!("donor registration failed: {e}");
                self.state = FormState::Error(e.to_string());
                Err(e)
            }
        }
    }
}
