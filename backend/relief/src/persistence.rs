//! Generic persistence service over a [`DocumentStore`], plus the
//! application-specific helpers built on top of it.

use std::sync::Arc;

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::errors::{ReliefError, Result};
use crate::models::{
    ApplicationStatus, BeneficiaryApplication, Donor, DonorStatus, NewBeneficiaryApplication,
    NewDonor, PledgeStatus, Statistics, BENEFICIARIES, DONORS, PLEDGES,
};
use crate::store::{Document, DocumentStore, QueryConstraint};
use crate::subscription::Subscription;

#[derive(Clone)]
pub struct PersistenceService {
    store: Arc<dyn DocumentStore>,
}

impl PersistenceService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    // ─────────────────────────────────────────────────────────
    // Generic CRUD
    // ─────────────────────────────────────────────────────────

    /// Insert a new record under a generated identifier, stamping
    /// `createdAt` and `updatedAt`.
    pub async fn create<T: Serialize + ?Sized>(&self, collection: &str, data: &T) -> Result<String> {
        let mut body = to_object(data)?;
        body.remove("id");
        let now = serde_json::to_value(Utc::now())?;
        body.insert("createdAt".to_string(), now.clone());
        body.insert("updatedAt".to_string(), now);

        let id = Uuid::new_v4().simple().to_string();
        self.store.put(collection, &id, body).await?;
        info!(collection, %id, "record created");
        Ok(id)
    }

    pub async fn get_by_id<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.store
            .get(collection, id)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn get_all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.store
            .list(collection)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn query_documents<T: DeserializeOwned>(
        &self,
        collection: &str,
        constraints: &[QueryConstraint],
    ) -> Result<Vec<T>> {
        self.store
            .query(collection, constraints)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Merge `partial` into an existing record and refresh `updatedAt`.
    pub async fn update<T: Serialize + ?Sized>(&self, collection: &str, id: &str, partial: &T) -> Result<()> {
        let mut fields = to_object(partial)?;
        fields.remove("id");
        fields.remove("createdAt");
        fields.insert("updatedAt".to_string(), serde_json::to_value(Utc::now())?);

        if !self.store.patch(collection, id, fields).await? {
            return Err(ReliefError::not_found(collection, id));
        }
        Ok(())
    }

    /// Remove a record. Deleting an absent record is not an error.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        if self.store.delete(collection, id).await? {
            info!(collection, %id, "record deleted");
        }
        Ok(())
    }

    /// Emits the record (or `None` once it is gone) now and after every change to it.
    pub fn on_document_change<T>(&self, collection: &str, id: &str) -> Subscription<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (collection, id) = (collection.to_string(), id.to_string());
        let this = self.clone();
        let (c, i) = (collection.clone(), id.clone());
        Subscription::spawn(
            self.store.clone(),
            move |ev| ev.collection == c && ev.id == i,
            move || {
                let (this, collection, id) = (this.clone(), collection.clone(), id.clone());
                async move { this.get_by_id::<T>(&collection, &id).await }
            },
        )
    }

    /// Emits the query result now and after every change to the collection.
    pub fn on_collection_change<T>(
        &self,
        collection: &str,
        constraints: Vec<QueryConstraint>,
    ) -> Subscription<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let collection = collection.to_string();
        let this = self.clone();
        let c = collection.clone();
        let constraints = Arc::new(constraints);
        Subscription::spawn(
            self.store.clone(),
            move |ev| ev.collection == c,
            move || {
                let (this, collection, constraints) =
                    (this.clone(), collection.clone(), constraints.clone());
                async move { this.query_documents::<T>(&collection, &constraints).await }
            },
        )
    }

    // ─────────────────────────────────────────────────────────
    // Beneficiary applications
    // ─────────────────────────────────────────────────────────

    /// New applications always start `pending` with a zero priority score.
    pub async fn create_beneficiary_application(&self, data: &NewBeneficiaryApplication) -> Result<String> {
        let mut body = to_object(data)?;
        body.insert("status".to_string(), json!(ApplicationStatus::Pending));
        body.insert("priorityScore".to_string(), json!(0));
        body.insert("photos".to_string(), json!([]));
        body.insert("documents".to_string(), json!([]));
        self.create(BENEFICIARIES, &body).await
    }

    /// Record the download URLs of an application's uploaded attachments.
    pub async fn attach_application_files(
        &self,
        id: &str,
        photos: &[String],
        documents: &[String],
    ) -> Result<()> {
        self.update(BENEFICIARIES, id, &json!({ "photos": photos, "documents": documents }))
            .await
    }

    pub async fn update_application_status(
        &self,
        id: &str,
        status: ApplicationStatus,
        notes: Option<&str>,
    ) -> Result<()> {
        let current: BeneficiaryApplication = self
            .get_by_id(BENEFICIARIES, id)
            .await?
            .ok_or_else(|| ReliefError::not_found(BENEFICIARIES, id))?;
        if !current.status.can_transition_to(status) {
            return Err(ReliefError::InvalidTransition {
                from: current.status.label().to_string(),
                to: status.label().to_string(),
            });
        }

        let mut fields = Map::new();
        fields.insert("status".to_string(), json!(status));
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            fields.insert("adminNotes".to_string(), json!(notes));
        }
        self.update(BENEFICIARIES, id, &fields).await?;
        info!(%id, from = %current.status, to = %status, "application status changed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Donors and pledges
    // ─────────────────────────────────────────────────────────

    pub async fn create_donor(&self, data: &NewDonor) -> Result<String> {
        let mut body = to_object(data)?;
        body.insert("status".to_string(), json!(DonorStatus::Registered));
        body.insert("totalPledges".to_string(), json!(0));
        body.insert("activePledges".to_string(), json!(0));
        self.create(DONORS, &body).await
    }

    pub async fn update_donor_status(&self, id: &str, status: DonorStatus) -> Result<()> {
        let current: Donor = self
            .get_by_id(DONORS, id)
            .await?
            .ok_or_else(|| ReliefError::not_found(DONORS, id))?;
        if !current.status.can_transition_to(status) {
            return Err(ReliefError::InvalidTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }
        self.update(DONORS, id, &json!({ "status": status })).await
    }

    /// Neither the donor nor the application is looked up; the pledge only
    /// carries their identifiers.
    pub async fn create_pledge(&self, donor_id: &str, beneficiary_id: &str, amount: u64) -> Result<String> {
        if donor_id.trim().is_empty() {
            return Err(ReliefError::field("donorId", "Donor is required."));
        }
        if beneficiary_id.trim().is_empty() {
            return Err(ReliefError::field("beneficiaryId", "Beneficiary is required."));
        }
        if amount == 0 {
            return Err(ReliefError::field("amount", "Amount must be greater than zero."));
        }
        self.create(
            PLEDGES,
            &json!({
                "donorId": donor_id,
                "beneficiaryId": beneficiary_id,
                "amount": amount,
                "status": PledgeStatus::Pending,
            }),
        )
        .await
    }

    /// Counts derived by scanning all three collections in full.
    pub async fn get_statistics(&self) -> Result<Statistics> {
        let (beneficiaries, donors, pledges) = tokio::try_join!(
            self.store.list(BENEFICIARIES),
            self.store.list(DONORS),
            self.store.list(PLEDGES),
        )?;

        let status_of = |doc: &Document| {
            doc.data
                .get("status")
                .and_then(|s| serde_json::from_value::<ApplicationStatus>(s.clone()).ok())
        };

        Ok(Statistics {
            total_beneficiaries: beneficiaries.len(),
            total_donors: donors.len(),
            total_pledges: pledges.len(),
            pending_applications: beneficiaries
                .iter()
                .filter(|b| status_of(b) == Some(ApplicationStatus::Pending))
                .count(),
            approved_applications: beneficiaries
                .iter()
                .filter(|b| status_of(b) == Some(ApplicationStatus::Approved))
                .count(),
        })
    }
}

fn to_object<T: Serialize + ?Sized>(data: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(data)? {
        Value::Object(map) => Ok(map),
        other => Err(ReliefError::Storage(format!(
            "records must serialize to a JSON object, got {other}"
        ))),
    }
}

fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(serde_json::from_value(doc.into_value())?)
}

#[cfg(test)]
mod test_persistence;
