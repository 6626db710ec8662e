//! Record shapes shared by the persistence layer, the forms and the dashboard.
//!
//! Every record is stored as a JSON document in one of the three collections
//! below. Field names use camelCase on the wire so existing clients of the
//! document store keep working.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const BENEFICIARIES: &str = "beneficiaries";
pub const DONORS: &str = "donors";
pub const PLEDGES: &str = "pledges";

// ─────────────────────────────────────────────────────────
// Beneficiary applications
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisasterType {
    Flood,
    Landslide,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageLevel {
    #[serde(rename = "Fully Destroyed")]
    FullyDestroyed,
    #[serde(rename = "Partially Damaged")]
    PartiallyDamaged,
}

/// Workflow position of an application. Only administrators move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "Under Verification")]
    UnderVerification,
    #[serde(alias = "Approved")]
    Approved,
    #[serde(alias = "Rejected")]
    Rejected,
    #[serde(alias = "House In Progress")]
    HouseInProgress,
    #[serde(alias = "Completed")]
    Completed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderVerification => "under_verification",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::HouseInProgress => "house_in_progress",
            Self::Completed => "completed",
        }
    }

    /// Human-readable label, as shown to administrators.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::UnderVerification => "Under Verification",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::HouseInProgress => "House In Progress",
            Self::Completed => "Completed",
        }
    }

    /// Whether an administrator may move an application from `self` to `next`.
    ///
    /// Re-applying the current status is always allowed (it only refreshes
    /// notes and the update timestamp). `Rejected` and `Completed` are final.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, UnderVerification | Approved | Rejected)
                | (UnderVerification, Pending | Approved | Rejected)
                | (Approved, HouseInProgress | Rejected)
                | (HouseInProgress, Completed)
        )
    }

    /// Dashboard tab the status is listed under.
    pub fn bucket(&self) -> StatusBucket {
        match self {
            Self::Pending | Self::UnderVerification => StatusBucket::Pending,
            Self::Approved | Self::HouseInProgress | Self::Completed => StatusBucket::Approved,
            Self::Rejected => StatusBucket::Rejected,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBucket {
    Pending,
    Approved,
    Rejected,
}

/// Applicant-supplied fields. `id`, `status`, `priorityScore` and the
/// attachment lists are assigned by the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBeneficiaryApplication {
    pub full_name: String,
    pub nic: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub address_before: String,
    pub current_address: String,
    pub disaster_type: DisasterType,
    pub disaster_date: NaiveDate,
    pub district: String,
    pub gn_division: String,
    pub description: String,
    pub damage_level: DamageLevel,
    pub family_members: u32,
    pub family_composition: String,
    pub monthly_income: String,
    pub has_land_deed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeneficiaryApplication {
    pub id: String,
    #[serde(flatten)]
    pub details: NewBeneficiaryApplication,
    pub status: ApplicationStatus,
    pub priority_score: u32,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────
// Donors
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DonorType {
    Individual,
    Organisation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportType {
    #[serde(rename = "Fund Full House")]
    FundFullHouse,
    #[serde(rename = "Fund Part of House")]
    FundPartOfHouse,
    #[serde(rename = "Provide Materials")]
    ProvideMaterials,
    #[serde(rename = "Provide Labour")]
    ProvideLabour,
    #[serde(rename = "Provide Land")]
    ProvideLand,
}

impl SupportType {
    pub const ALL: [SupportType; 5] = [
        Self::FundFullHouse,
        Self::FundPartOfHouse,
        Self::ProvideMaterials,
        Self::ProvideLabour,
        Self::ProvideLand,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonorStatus {
    #[serde(alias = "Registered")]
    Registered,
    #[serde(alias = "Verified")]
    Verified,
    #[serde(alias = "Active")]
    Active,
    #[serde(alias = "Completed")]
    Completed,
}

impl DonorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Verified => "verified",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Donors only move forward, one step at a time.
    pub fn can_transition_to(&self, next: DonorStatus) -> bool {
        use DonorStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Registered, Verified) | (Verified, Active) | (Active, Completed)
            )
    }
}

impl fmt::Display for DonorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDonor {
    pub donor_type: DonorType,
    pub name: String,
    #[serde(default)]
    pub contact_person: String,
    pub phone: String,
    pub email: String,
    pub country: String,
    pub support_type: Vec<SupportType>,
    pub budget: u64,
    pub preferred_district: String,
    pub timeframe: String,
    pub display_name: bool,
    pub wants_updates: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donor {
    pub id: String,
    #[serde(flatten)]
    pub details: NewDonor,
    pub status: DonorStatus,
    #[serde(default)]
    pub total_pledges: u32,
    #[serde(default)]
    pub active_pledges: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────
// Pledges
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PledgeStatus {
    Pending,
    Confirmed,
    Fulfilled,
    Cancelled,
}

/// Links a donor to an application by identifier only; neither side is
/// checked for existence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pledge {
    pub id: String,
    pub donor_id: String,
    pub beneficiary_id: String,
    pub amount: u64,
    pub status: PledgeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_beneficiaries: usize,
    pub total_donors: usize,
    pub total_pledges: usize,
    pub pending_applications: usize,
    pub approved_applications: usize,
}
