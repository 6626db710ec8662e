//! Demo records for a fresh install.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::errors::{ReliefError, Result};
use crate::models::{
    ApplicationStatus, BeneficiaryApplication, DamageLevel, DisasterType, Donor, DonorStatus, DonorType,
    NewBeneficiaryApplication, NewDonor, SupportType, BENEFICIARIES, DONORS,
};
use crate::persistence::PersistenceService;

fn date(y: i32, m: u32, d: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| ReliefError::Config(format!("bad demo date {y}-{m}-{d}")))
}

fn demo_applications() -> Result<Vec<BeneficiaryApplication>> {
    Ok(vec![
        BeneficiaryApplication {
            id: "APP-001".to_string(),
            details: NewBeneficiaryApplication {
                full_name: "Kamal Perera".to_string(),
                nic: "198512345V".to_string(),
                phone: "0771234567".to_string(),
                email: None,
                address_before: "123, Main St, Ratnapura".to_string(),
                current_address: "Community Hall, Ratnapura".to_string(),
                disaster_type: DisasterType::Flood,
                disaster_date: date(2024, 5, 15)?,
                district: "Ratnapura".to_string(),
                gn_division: "Div-01".to_string(),
                description: "House was completely submerged and collapsed.".to_string(),
                damage_level: DamageLevel::FullyDestroyed,
                family_members: 4,
                family_composition: "2 adults, 2 children (ages 5, 8)".to_string(),
                monthly_income: "LKR 30,000 - 50,000".to_string(),
                has_land_deed: true,
            },
            status: ApplicationStatus::Pending,
            priority_score: 85,
            photos: vec![],
            documents: vec![],
            admin_notes: None,
            created_at: None,
            updated_at: None,
        },
        BeneficiaryApplication {
            id: "APP-002".to_string(),
            details: NewBeneficiaryApplication {
                full_name: "Nimala Silva".to_string(),
                nic: "197023456V".to_string(),
                phone: "0712345678".to_string(),
                email: None,
                address_before: "45, Hillside Rd, Kandy".to_string(),
                current_address: "Relative's house, Kandy".to_string(),
                disaster_type: DisasterType::Landslide,
                disaster_date: date(2024, 5, 20)?,
                district: "Kandy".to_string(),
                gn_division: "Div-05".to_string(),
                description: "Back wall of the house collapsed due to landslide.".to_string(),
                damage_level: DamageLevel::PartiallyDamaged,
                family_members: 3,
                family_composition: "1 adult, 2 elderly parents".to_string(),
                monthly_income: "< LKR 30,000".to_string(),
                has_land_deed: false,
            },
            status: ApplicationStatus::Approved,
            priority_score: 92,
            photos: vec![],
            documents: vec![],
            admin_notes: None,
            created_at: None,
            updated_at: None,
        },
    ])
}

fn demo_donor() -> Donor {
    Donor {
        id: "DON-001".to_string(),
        details: NewDonor {
            donor_type: DonorType::Organisation,
            name: "Global Aid Foundation".to_string(),
            contact_person: "John Doe".to_string(),
            phone: "0112345678".to_string(),
            email: "contact@globalaid.org".to_string(),
            country: "USA".to_string(),
            support_type: vec![SupportType::FundFullHouse],
            budget: 5_000_000,
            preferred_district: "Any".to_string(),
            timeframe: "Immediately".to_string(),
            display_name: true,
            wants_updates: true,
        },
        status: DonorStatus::Verified,
        total_pledges: 0,
        active_pledges: 0,
        created_at: None,
        updated_at: None,
    }
}

/// Stores a record under its own fixed identifier.
async fn put_fixed<T: Serialize>(persistence: &PersistenceService, collection: &str, id: &str, record: &T) -> Result<()> {
    let Value::Object(mut body) = serde_json::to_value(record)? else {
        return Err(ReliefError::field("body", "demo record must be an object"));
    };
    body.remove("id");
    let now = serde_json::to_value(Utc::now())?;
    body.insert("createdAt".to_string(), now.clone());
    body.insert("updatedAt".to_string(), now);
    persistence.store().put(collection, id, body).await
}

/// Inserts the demo records when no application exists yet.
/// Returns whether anything was written.
pub async fn seed_demo_data(persistence: &PersistenceService) -> Result<bool> {
    if !persistence.store().list(BENEFICIARIES).await?.is_empty() {
        return Ok(false);
    }
    for application in demo_applications()? {
        put_fixed(persistence, BENEFICIARIES, &application.id, &application).await?;
    }
    let donor = demo_donor();
    put_fixed(persistence, DONORS, &donor.id, &donor).await?;
    info!("demo data seeded");
    Ok(true)
}
