//! Admin dashboard: statistics, applications by workflow bucket, donors.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::{ReliefError, Result};
use crate::models::{ApplicationStatus, BeneficiaryApplication, Donor, Statistics, StatusBucket, BENEFICIARIES, DONORS};
use crate::persistence::PersistenceService;
use crate::store::{Direction, QueryConstraint};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminTab {
    #[default]
    Pending,
    Approved,
    Rejected,
    Donors,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub statistics: Statistics,
    pub pending: Vec<BeneficiaryApplication>,
    pub approved: Vec<BeneficiaryApplication>,
    pub rejected: Vec<BeneficiaryApplication>,
    pub donors: Vec<Donor>,
}

impl DashboardData {
    pub fn application(&self, id: &str) -> Option<&BeneficiaryApplication> {
        self.pending
            .iter()
            .chain(&self.approved)
            .chain(&self.rejected)
            .find(|a| a.id == id)
    }
}

pub struct AdminDashboard {
    persistence: PersistenceService,
    data: DashboardData,
    active_tab: AdminTab,
    selected: Option<String>,
}

impl AdminDashboard {
    pub fn new(persistence: PersistenceService) -> Self {
        Self {
            persistence,
            data: DashboardData::default(),
            active_tab: AdminTab::default(),
            selected: None,
        }
    }

    /// Fetch everything afresh. Applications are newest first.
    pub async fn load(&mut self) -> Result<&DashboardData> {
        let newest_first = [QueryConstraint::order_by("createdAt", Direction::Desc)];
        let (statistics, applications, donors) = tokio::try_join!(
            self.persistence.get_statistics(),
            self.persistence
                .query_documents::<BeneficiaryApplication>(BENEFICIARIES, &newest_first),
            self.persistence.query_documents::<Donor>(DONORS, &newest_first),
        )
        .inspect_err(|e| error!("dashboard load failed: {e}"))?;

        let mut data = DashboardData {
            statistics,
            donors,
            ..Default::default()
        };
        for application in applications {
            match application.status.bucket() {
                StatusBucket::Pending => data.pending.push(application),
                StatusBucket::Approved => data.approved.push(application),
                StatusBucket::Rejected => data.rejected.push(application),
            }
        }
        self.data = data;

        // Drop a selection whose record disappeared.
        if let Some(id) = &self.selected {
            if self.data.application(id).is_none() {
                self.selected = None;
            }
        }
        Ok(&self.data)
    }

    pub fn data(&self) -> &DashboardData {
        &self.data
    }

    pub fn active_tab(&self) -> AdminTab {
        self.active_tab
    }

    pub fn change_tab(&mut self, tab: AdminTab) {
        self.active_tab = tab;
        self.selected = None;
    }

    pub fn select(&mut self, id: &str) -> Result<&BeneficiaryApplication> {
        let application = self
            .data
            .application(id)
            .ok_or_else(|| ReliefError::not_found(BENEFICIARIES, id))?;
        self.selected = Some(application.id.clone());
        Ok(application)
    }

    pub fn selected(&self) -> Option<&BeneficiaryApplication> {
        self.selected.as_deref().and_then(|id| self.data.application(id))
    }

    pub fn close_detail(&mut self) {
        self.selected = None;
    }

    /// Persist the change, then reload the whole dataset.
    pub async fn update_status(&mut self, id: &str, status: ApplicationStatus, notes: Option<&str>) -> Result<()> {
        self.persistence
            .update_application_status(id, status, notes)
            .await
            .inspect_err(|e| error!(%id, "status update failed: {e}"))?;
        info!(%id, %status, "dashboard status update");
        self.load().await?;
        Ok(())
    }

    pub async fn approve(&mut self, id: &str, notes: Option<&str>) -> Result<()> {
        self.update_status(id, ApplicationStatus::Approved, notes).await
    }

    pub async fn reject(&mut self, id: &str, notes: Option<&str>) -> Result<()> {
        self.update_status(id, ApplicationStatus::Rejected, notes).await
    }
}
