//! Tuition marketplace core: listing moderation, tutor applications, and
//! payment settlement.
//!
//! The lifecycle rules live in three service facades over storage traits so
//! every invariant can be exercised without a real backend: listings are
//! admin-moderated before they accept bids, bids are processed exactly once,
//! and an approval only ever lands together with its payment record.

pub mod applications;
pub mod domain;
pub mod repository;
pub mod router;
pub mod settlement;
pub mod tuitions;

#[cfg(test)]
mod tests;

pub use applications::ApplicationService;
pub use domain::{
    Actor, Application, ApplicationDraft, ApplicationId, ApplicationPatch, ApplicationStatus,
    Payment, PaymentId, PaymentStatus, Role, Tuition, TuitionDraft, TuitionId, TuitionPatch,
    TuitionStatus, UserId,
};
pub use repository::{
    ApplicationRepository, PageRequest, PaymentLedger, SettlementStore, SortOrder, StoreError,
    TuitionFilter, TuitionPage, TuitionRepository,
};
pub use router::{marketplace_router, MarketplaceServices};
pub use settlement::{
    ConfirmRequest, GatewayError, IntentReceipt, PaymentGateway, PlatformAnalytics, RevenueReport,
    SettlementService, VerifiedTransaction,
};
pub use tuitions::TuitionService;

/// Failure taxonomy shared by every marketplace operation. Business branches
/// like a duplicate bid or an already-processed application are modeled
/// outcomes here, not panics or opaque 500s.
#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("store unavailable: {0}")]
    Store(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
