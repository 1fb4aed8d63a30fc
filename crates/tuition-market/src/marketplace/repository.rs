use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, ApplicationPatch, ApplicationStatus, Payment, PaymentId, Tuition,
    TuitionId, TuitionPatch, TuitionStatus, UserId,
};

/// Equality filter over tuition listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TuitionFilter {
    pub status: Option<TuitionStatus>,
    pub subject: Option<String>,
    pub class_level: Option<String>,
    pub location: Option<String>,
    pub student_id: Option<UserId>,
}

impl TuitionFilter {
    pub fn matches(&self, tuition: &Tuition) -> bool {
        self.status.map_or(true, |status| tuition.status == status)
            && self
                .subject
                .as_ref()
                .map_or(true, |subject| &tuition.subject == subject)
            && self
                .class_level
                .as_ref()
                .map_or(true, |class_level| &tuition.class_level == class_level)
            && self
                .location
                .as_ref()
                .map_or(true, |location| &tuition.location == location)
            && self
                .student_id
                .as_ref()
                .map_or(true, |student| &tuition.student_id == student)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Pagination request over the tuition board; sorting is by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
    pub order: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            order: SortOrder::Desc,
        }
    }
}

/// One page of listings plus the bookkeeping the board UI needs.
#[derive(Debug, Clone, Serialize)]
pub struct TuitionPage {
    pub tuitions: Vec<Tuition>,
    pub total_pages: usize,
    pub current_page: usize,
    pub total: usize,
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for tuition listings so services can be exercised in isolation.
pub trait TuitionRepository: Send + Sync {
    fn insert_tuition(&self, tuition: Tuition) -> Result<Tuition, StoreError>;
    fn fetch_tuition(&self, id: &TuitionId) -> Result<Option<Tuition>, StoreError>;
    /// Merges the provided fields into the stored record.
    fn update_tuition(&self, id: &TuitionId, patch: &TuitionPatch) -> Result<(), StoreError>;
    fn set_tuition_status(&self, id: &TuitionId, status: TuitionStatus) -> Result<(), StoreError>;
    fn delete_tuition(&self, id: &TuitionId) -> Result<(), StoreError>;
    fn list_tuitions(&self, filter: &TuitionFilter) -> Result<Vec<Tuition>, StoreError>;
    fn list_tuition_page(&self, request: PageRequest) -> Result<TuitionPage, StoreError>;
}

/// Storage abstraction for tutor applications.
///
/// `insert_application` must enforce at-most-one application per
/// (tutor, tuition) pair as part of the commit itself, returning
/// [`StoreError::Conflict`] for a duplicate. A service-level pre-check is
/// not sufficient: two racing inserts must still resolve to one winner.
///
/// The mutating operations take the status the caller observed and
/// compare-and-set inside the commit, returning [`StoreError::Conflict`]
/// when the stored status has moved on. A reject racing a settlement must
/// lose: once `settle` flips a bid to `Approved`, no stale write may
/// overwrite it.
pub trait ApplicationRepository: Send + Sync {
    fn insert_application(&self, application: Application) -> Result<Application, StoreError>;
    fn fetch_application(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError>;
    fn update_application(
        &self,
        id: &ApplicationId,
        patch: &ApplicationPatch,
        expected: ApplicationStatus,
    ) -> Result<(), StoreError>;
    fn set_application_status(
        &self,
        id: &ApplicationId,
        expected: ApplicationStatus,
        next: ApplicationStatus,
    ) -> Result<(), StoreError>;
    fn delete_application(
        &self,
        id: &ApplicationId,
        expected: ApplicationStatus,
    ) -> Result<(), StoreError>;
    fn list_applications_for_tuition(
        &self,
        tuition_id: &TuitionId,
    ) -> Result<Vec<Application>, StoreError>;
    fn list_applications_for_tutor(&self, tutor_id: &UserId)
        -> Result<Vec<Application>, StoreError>;
}

/// Append-only payment ledger.
///
/// `record_payment` must enforce transaction-id uniqueness inside the
/// commit, returning [`StoreError::Conflict`] on a replayed id so a
/// retried confirmation cannot double-record.
pub trait PaymentLedger: Send + Sync {
    fn record_payment(&self, payment: Payment) -> Result<Payment, StoreError>;
    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError>;
    fn list_payments_for_student(&self, student_id: &UserId) -> Result<Vec<Payment>, StoreError>;
    fn list_payments_for_tutor(&self, tutor_id: &UserId) -> Result<Vec<Payment>, StoreError>;
    fn list_all_payments(&self) -> Result<Vec<Payment>, StoreError>;
    /// Sum of completed amounts for the tutor; 0.0 when none exist.
    fn revenue_for_tutor(&self, tutor_id: &UserId) -> Result<f64, StoreError>;
    fn total_revenue(&self) -> Result<f64, StoreError>;
    fn transaction_count(&self) -> Result<usize, StoreError>;
}

/// Unit of work binding a payment record to an application approval.
///
/// The two writes land as one commit or not at all: a completed payment
/// without an approved application (or the reverse) must be unobservable.
/// Implementations fail with [`StoreError::NotFound`] for a missing
/// application, [`StoreError::Conflict`] for a non-pending application or
/// a replayed transaction id, leaving no side effects in either case.
pub trait SettlementStore: Send + Sync {
    fn settle(&self, application_id: &ApplicationId, payment: Payment)
        -> Result<Payment, StoreError>;
}
