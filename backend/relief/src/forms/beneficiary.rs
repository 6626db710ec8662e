//! The "apply for help" form.

use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use super::{whole_number, FormGroup, FormState, Rule, Submitted};
use crate::errors::{ReliefError, Result};
use crate::models::NewBeneficiaryApplication;
use crate::persistence::PersistenceService;
use crate::storage::{StorageService, UploadFile};

const PHONE_PATTERN: &str = "^0[0-9]{9}$";
const CONSENT_FIELDS: [&str; 2] = ["consentData", "consentTruth"];
const PHOTO_DOCUMENT_TYPE: &str = "photos";

/// Files submitted with an application.
#[derive(Debug, Clone, Default)]
pub struct BeneficiaryAttachments {
    pub photos: Vec<UploadFile>,
    /// `(documentType, file)` pairs, e.g. `("nic", ...)`.
    pub documents: Vec<(String, UploadFile)>,
}

impl BeneficiaryAttachments {
    pub fn is_empty(&self) -> bool {
        self.photos.is_empty() && self.documents.is_empty()
    }
}

pub struct BeneficiaryForm {
    group: FormGroup,
    state: FormState,
    persistence: PersistenceService,
    storage: StorageService,
    redirect_delay: Duration,
}

impl BeneficiaryForm {
    pub fn new(persistence: PersistenceService, storage: StorageService, redirect_delay: Duration) -> Self {
        let group = FormGroup::new()
            .control("fullName", json!(""), vec![Rule::Required])
            .control("nic", json!(""), vec![Rule::Required])
            .control("phone", json!(""), vec![Rule::Required, Rule::Pattern(PHONE_PATTERN)])
            .control("email", json!(""), vec![Rule::Email])
            .control("addressBefore", json!(""), vec![Rule::Required])
            .control("currentAddress", json!(""), vec![Rule::Required])
            .control(
                "disasterType",
                json!("Flood"),
                vec![Rule::Required, Rule::OneOf(&["Flood", "Landslide", "Other"])],
            )
            .control("disasterDate", json!(""), vec![Rule::Required, Rule::Date])
            .control("district", json!(""), vec![Rule::Required])
            .control("gnDivision", json!(""), vec![Rule::Required])
            .control("description", json!(""), vec![Rule::Required])
            .control(
                "damageLevel",
                json!("Fully Destroyed"),
                vec![Rule::Required, Rule::OneOf(&["Fully Destroyed", "Partially Damaged"])],
            )
            .control(
                "familyMembers",
                json!(1),
                vec![Rule::Required, Rule::Min(1.0), Rule::Integer(u32::MAX.into())],
            )
            .control("familyComposition", json!(""), vec![Rule::Required])
            .control("monthlyIncome", json!("< LKR 30,000"), vec![Rule::Required])
            .control("hasLandDeed", json!(false), vec![Rule::Required])
            .control(CONSENT_FIELDS[0], json!(false), vec![Rule::RequiredTrue])
            .control(CONSENT_FIELDS[1], json!(false), vec![Rule::RequiredTrue]);

        Self {
            group,
            state: FormState::Idle,
            persistence,
            storage,
            redirect_delay,
        }
    }

    pub fn group(&self) -> &FormGroup {
        &self.group
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn set_value(&mut self, field: &str, value: Value) -> bool {
        self.group.set_value(field, value)
    }

    /// Apply every known field of a submitted body.
    pub fn patch_values(&mut self, values: &Map<String, Value>) {
        for (field, value) in values {
            self.group.set_value(field, value.clone());
        }
    }

    fn application(&self) -> Result<NewBeneficiaryApplication> {
        let mut body = self.group.values().clone();
        for field in CONSENT_FIELDS {
            body.remove(field);
        }
        if body.get("email").and_then(Value::as_str).is_some_and(|e| e.trim().is_empty()) {
            body.remove("email");
        }
        // Numeric fields may arrive as strings from an HTML form.
        let members = body
            .get("familyMembers")
            .and_then(whole_number)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ReliefError::field("familyMembers", "Must be a whole number."))?;
        body.insert("familyMembers".to_string(), json!(members));
        Ok(serde_json::from_value(Value::Object(body))?)
    }

    /// Validate, store the application, then upload its files and record
    /// their URLs. A failed upload leaves the stored record without files.
    pub async fn submit(&mut self, attachments: BeneficiaryAttachments) -> Result<Submitted> {
        if let Err(e) = self.group.validate() {
            warn!("beneficiary application rejected by validation");
            return Err(e);
        }

        self.state = FormState::Submitting;
        match self.store(attachments).await {
            Ok(id) => {
                self.state = FormState::Success;
                info!(%id, "beneficiary application submitted");
                Ok(Submitted::new(id, self.redirect_delay))
            }
            Err(e) => {
                error!("beneficiary application failed: {e}");
                self.state = FormState::Error(e.to_string());
                Err(e)
            }
        }
    }

    async fn store(&self, attachments: BeneficiaryAttachments) -> Result<String> {
        let application = self.application()?;
        let id = self.persistence.create_beneficiary_application(&application).await?;
        if attachments.is_empty() {
            return Ok(id);
        }

        let photos: Vec<(String, UploadFile)> = attachments
            .photos
            .into_iter()
            .map(|photo| (PHOTO_DOCUMENT_TYPE.to_string(), photo))
            .collect();
        let (photos, documents) = tokio::try_join!(
            self.storage.upload_beneficiary_documents(&id, &photos),
            self.storage.upload_beneficiary_documents(&id, &attachments.documents),
        )?;

        let photo_urls: Vec<String> = photos.into_iter().map(|p| p.url).collect();
        let document_urls: Vec<String> = documents.into_iter().map(|d| d.url).collect();
        self.persistence
            .attach_application_files(&id, &photo_urls, &document_urls)
            .await?;
        Ok(id)
    }
}
