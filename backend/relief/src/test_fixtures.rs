//! Shared fixtures for the in-crate test modules.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::models::{DamageLevel, DisasterType, DonorType, NewBeneficiaryApplication, NewDonor, SupportType};
use crate::persistence::PersistenceService;
use crate::store::MemoryDocumentStore;

pub fn memory_persistence() -> PersistenceService {
    PersistenceService::new(Arc::new(MemoryDocumentStore::new()))
}

pub fn sample_application() -> NewBeneficiaryApplication {
    NewBeneficiaryApplication {
        full_name: "Sunil Fernando".to_string(),
        nic: "199012345678".to_string(),
        phone: "0779876543".to_string(),
        email: Some("sunil@example.lk".to_string()),
        address_before: "12, River Rd, Kalutara".to_string(),
        current_address: "Temple hall, Kalutara".to_string(),
        disaster_type: DisasterType::Flood,
        disaster_date: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
        district: "Kalutara".to_string(),
        gn_division: "Div-12".to_string(),
        description: "Ground floor washed away.".to_string(),
        damage_level: DamageLevel::FullyDestroyed,
        family_members: 5,
        family_composition: "2 adults, 3 children".to_string(),
        monthly_income: "< LKR 30,000".to_string(),
        has_land_deed: true,
    }
}

pub fn sample_donor(donor_type: DonorType, contact_person: &str) -> NewDonor {
    NewDonor {
        donor_type,
        name: "Helping Hands".to_string(),
        contact_person: contact_person.to_string(),
        phone: "0112223334".to_string(),
        email: "give@helping.org".to_string(),
        country: "Sri Lanka".to_string(),
        support_type: vec![SupportType::ProvideMaterials, SupportType::ProvideLabour],
        budget: 250_000,
        preferred_district: "Any".to_string(),
        timeframe: "1-3 months".to_string(),
        display_name: false,
        wants_updates: true,
    }
}

/// Wraps a real blob store and fails every write whose path contains `fail_on`.
pub struct FlakyBlobStore {
    pub inner: crate::storage::FsBlobStore,
    pub fail_on: String,
}

#[async_trait::async_trait]
impl crate::storage::BlobStore for FlakyBlobStore {
    async fn put(
        &self,
        path: &str,
        data: &[u8],
        on_progress: &mut (dyn FnMut(u64) + Send),
    ) -> crate::errors::Result<()> {
        if path.contains(&self.fail_on) {
            on_progress(data.len() as u64 / 2);
            return Err(crate::errors::ReliefError::Storage("connection reset".to_string()));
        }
        self.inner.put(path, data, on_progress).await
    }

    async fn get(&self, path: &str) -> crate::errors::Result<Option<Vec<u8>>> {
        self.inner.get(path).await
    }

    async fn exists(&self, path: &str) -> crate::errors::Result<bool> {
        self.inner.exists(path).await
    }

    async fn delete(&self, path: &str) -> crate::errors::Result<()> {
        self.inner.delete(path).await
    }

    async fn list(&self, prefix: &str) -> crate::errors::Result<Vec<String>> {
        self.inner.list(prefix).await
    }
}

pub fn file(name: &str, len: usize) -> crate::storage::UploadFile {
    crate::storage::UploadFile {
        name: name.to_string(),
        bytes: vec![7u8; len],
    }
}
