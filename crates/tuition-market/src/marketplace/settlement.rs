use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    Actor, Application, ApplicationId, ApplicationStatus, Payment, PaymentId, PaymentStatus, Role,
    TuitionId, TuitionStatus, UserId,
};
use super::repository::{
    ApplicationRepository, PaymentLedger, SettlementStore, StoreError, TuitionFilter,
    TuitionRepository,
};
use super::tuitions::require_positive_amount;
use super::MarketplaceError;

static PAYMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_payment_id() -> PaymentId {
    let id = PAYMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PaymentId(format!("pay-{id:06}"))
}

/// Receipt handed back to the client so it can drive the gateway's
/// client-side confirmation flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentReceipt {
    pub client_secret: String,
    pub intent_id: String,
}

/// Gateway's server-side view of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedTransaction {
    pub transaction_id: String,
    pub amount: f64,
}

/// External payment gateway collaborator. The coordinator never treats a
/// client-relayed transaction id as proof on its own; `verify` re-checks it
/// against the gateway before anything is recorded.
pub trait PaymentGateway: Send + Sync {
    fn create_intent(
        &self,
        amount: f64,
        currency: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<IntentReceipt, GatewayError>;
    fn verify(&self, transaction_id: &str) -> Result<VerifiedTransaction, GatewayError>;
}

/// Gateway failure modes.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Confirmation request relayed by the paying student after the gateway's
/// client-side flow succeeds. Tuition and tutor ids are optional echoes used
/// purely for cross-checking; the application record is the source of truth.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmRequest {
    pub application_id: ApplicationId,
    #[serde(default)]
    pub tuition_id: Option<TuitionId>,
    #[serde(default)]
    pub tutor_id: Option<UserId>,
    pub amount: f64,
    pub transaction_id: String,
}

/// Tutor-facing revenue summary.
#[derive(Debug, Clone, Serialize)]
pub struct RevenueReport {
    pub total_revenue: f64,
    pub total_transactions: usize,
    pub payments: Vec<Payment>,
}

/// Admin platform snapshot: listing counts by status plus ledger totals.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformAnalytics {
    pub tuitions: TuitionCounts,
    pub total_revenue: f64,
    pub total_transactions: usize,
    pub recent_payments: Vec<Payment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TuitionCounts {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// Binds an external payment confirmation to an application approval as one
/// logical unit of work, and answers the ledger's read queries.
pub struct SettlementService<S, G> {
    store: Arc<S>,
    gateway: Arc<G>,
}

impl<S, G> SettlementService<S, G>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(store: Arc<S>, gateway: Arc<G>) -> Self {
        Self { store, gateway }
    }

    /// Open a payment intent with the gateway on behalf of the paying student.
    pub fn create_intent(
        &self,
        actor: &Actor,
        amount: f64,
    ) -> Result<IntentReceipt, MarketplaceError> {
        match actor.role {
            Role::Student => {}
            Role::Tutor | Role::Admin => {
                return Err(MarketplaceError::Forbidden("only students can pay"))
            }
        }
        require_positive_amount(amount, "amount")?;

        let mut metadata = BTreeMap::new();
        metadata.insert("student_id".to_string(), actor.id.0.clone());
        Ok(self.gateway.create_intent(amount, "bdt", metadata)?)
    }

    /// Settle a confirmed payment: verify the transaction with the gateway,
    /// then record the payment and approve the application atomically.
    pub fn confirm(
        &self,
        actor: &Actor,
        request: ConfirmRequest,
    ) -> Result<Payment, MarketplaceError> {
        match actor.role {
            Role::Student => {}
            Role::Tutor | Role::Admin => {
                return Err(MarketplaceError::Forbidden("only students can pay"))
            }
        }
        require_positive_amount(request.amount, "amount")?;
        if request.transaction_id.trim().is_empty() {
            return Err(MarketplaceError::Validation(
                "transactionId is required".to_string(),
            ));
        }

        let application = self
            .store
            .fetch_application(&request.application_id)?
            .ok_or(MarketplaceError::NotFound("application"))?;

        self.cross_check(&request, &application)?;

        let tuition = self
            .store
            .fetch_tuition(&application.tuition_id)?
            .ok_or(MarketplaceError::NotFound("tuition"))?;
        if tuition.student_id != actor.id {
            return Err(MarketplaceError::Forbidden(
                "you can only pay for applications on your own tuitions",
            ));
        }

        match application.status {
            ApplicationStatus::Pending => {}
            ApplicationStatus::Approved | ApplicationStatus::Rejected => {
                return Err(MarketplaceError::InvalidState(
                    "application has already been processed".to_string(),
                ))
            }
        }

        let verified = self.gateway.verify(&request.transaction_id)?;
        if (verified.amount - request.amount).abs() > f64::EPSILON * request.amount.abs() {
            warn!(
                transaction = %request.transaction_id,
                claimed = request.amount,
                verified = verified.amount,
                "settlement amount mismatch"
            );
            return Err(MarketplaceError::Validation(
                "amount does not match the verified transaction".to_string(),
            ));
        }

        let payment = Payment {
            id: next_payment_id(),
            student_id: actor.id.clone(),
            tutor_id: application.tutor_id.clone(),
            tuition_id: application.tuition_id.clone(),
            amount: request.amount,
            transaction_id: verified.transaction_id,
            status: PaymentStatus::Completed,
            recorded_at: Utc::now(),
        };

        let recorded = match self.store.settle(&application.id, payment) {
            Ok(recorded) => recorded,
            Err(StoreError::Conflict) => {
                return Err(MarketplaceError::Conflict(
                    "transaction has already been settled".to_string(),
                ))
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            payment = %recorded.id.0,
            application = %application.id.0,
            transaction = %recorded.transaction_id,
            "payment settled and application approved"
        );
        Ok(recorded)
    }

    pub fn history_for_student(&self, actor: &Actor) -> Result<Vec<Payment>, MarketplaceError> {
        Ok(self.store.list_payments_for_student(&actor.id)?)
    }

    pub fn revenue_for_tutor(&self, actor: &Actor) -> Result<RevenueReport, MarketplaceError> {
        let payments = self.store.list_payments_for_tutor(&actor.id)?;
        let total_revenue = self.store.revenue_for_tutor(&actor.id)?;
        Ok(RevenueReport {
            total_revenue,
            total_transactions: payments.len(),
            payments,
        })
    }

    pub fn list_all(&self, actor: &Actor) -> Result<Vec<Payment>, MarketplaceError> {
        match actor.role {
            Role::Admin => Ok(self.store.list_all_payments()?),
            Role::Student | Role::Tutor => {
                Err(MarketplaceError::Forbidden("admin access required"))
            }
        }
    }

    /// Visible to either party of the payment, or an admin.
    pub fn get(&self, id: &PaymentId, actor: &Actor) -> Result<Payment, MarketplaceError> {
        let payment = self
            .store
            .fetch_payment(id)?
            .ok_or(MarketplaceError::NotFound("payment"))?;

        let permitted = match actor.role {
            Role::Admin => true,
            Role::Student => payment.student_id == actor.id,
            Role::Tutor => payment.tutor_id == actor.id,
        };
        if !permitted {
            return Err(MarketplaceError::Forbidden("access denied"));
        }
        Ok(payment)
    }

    pub fn platform_analytics(&self, actor: &Actor) -> Result<PlatformAnalytics, MarketplaceError> {
        match actor.role {
            Role::Admin => {}
            Role::Student | Role::Tutor => {
                return Err(MarketplaceError::Forbidden("admin access required"))
            }
        }

        let tuitions = self.store.list_tuitions(&TuitionFilter::default())?;
        let count_with =
            |status: TuitionStatus| tuitions.iter().filter(|t| t.status == status).count();
        let counts = TuitionCounts {
            total: tuitions.len(),
            pending: count_with(TuitionStatus::Pending),
            approved: count_with(TuitionStatus::Approved),
            rejected: count_with(TuitionStatus::Rejected),
        };

        let mut recent_payments = self.store.list_all_payments()?;
        recent_payments.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        recent_payments.truncate(10);

        Ok(PlatformAnalytics {
            tuitions: counts,
            total_revenue: self.store.total_revenue()?,
            total_transactions: self.store.transaction_count()?,
            recent_payments,
        })
    }

    fn cross_check(
        &self,
        request: &ConfirmRequest,
        application: &Application,
    ) -> Result<(), MarketplaceError> {
        if let Some(tuition_id) = &request.tuition_id {
            if tuition_id != &application.tuition_id {
                return Err(MarketplaceError::Validation(
                    "tuition does not match the application".to_string(),
                ));
            }
        }
        if let Some(tutor_id) = &request.tutor_id {
            if tutor_id != &application.tutor_id {
                return Err(MarketplaceError::Validation(
                    "tutor does not match the application".to_string(),
                ));
            }
        }
        Ok(())
    }
}
