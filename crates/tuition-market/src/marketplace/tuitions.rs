use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::domain::{
    Actor, Role, Tuition, TuitionDraft, TuitionId, TuitionPatch, TuitionStatus,
};
use super::repository::{PageRequest, StoreError, TuitionFilter, TuitionPage, TuitionRepository};
use super::MarketplaceError;
use crate::config::PolicyConfig;

static TUITION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_tuition_id() -> TuitionId {
    let id = TUITION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    TuitionId(format!("tui-{id:06}"))
}

pub(super) fn require_field(value: &str, name: &'static str) -> Result<(), MarketplaceError> {
    if value.trim().is_empty() {
        return Err(MarketplaceError::Validation(format!("{name} is required")));
    }
    Ok(())
}

pub(super) fn require_positive_amount(
    value: f64,
    name: &'static str,
) -> Result<(), MarketplaceError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(MarketplaceError::Validation(format!(
            "{name} must be a positive number"
        )));
    }
    Ok(())
}

/// Owns the tuition listing lifecycle: creation, edits, deletion, and the
/// admin-gated moderation transition.
pub struct TuitionService<S> {
    store: Arc<S>,
    policy: PolicyConfig,
}

impl<S> TuitionService<S>
where
    S: TuitionRepository + 'static,
{
    pub fn new(store: Arc<S>, policy: PolicyConfig) -> Self {
        Self { store, policy }
    }

    /// Post a new listing. Always starts `Pending` until an admin moderates it.
    pub fn create(&self, actor: &Actor, draft: TuitionDraft) -> Result<Tuition, MarketplaceError> {
        match actor.role {
            Role::Student => {}
            Role::Tutor | Role::Admin => {
                return Err(MarketplaceError::Forbidden(
                    "only students can post tuitions",
                ))
            }
        }

        require_field(&draft.subject, "subject")?;
        require_field(&draft.class_level, "class")?;
        require_field(&draft.location, "location")?;
        require_positive_amount(draft.budget, "budget")?;

        let tuition = Tuition {
            id: next_tuition_id(),
            student_id: actor.id.clone(),
            subject: draft.subject,
            class_level: draft.class_level,
            location: draft.location,
            budget: draft.budget,
            description: draft.description,
            status: TuitionStatus::Pending,
            created_at: Utc::now(),
        };

        let stored = self.store.insert_tuition(tuition)?;
        info!(tuition = %stored.id.0, student = %stored.student_id.0, "tuition posted");
        Ok(stored)
    }

    pub fn get(&self, id: &TuitionId) -> Result<Tuition, MarketplaceError> {
        self.store
            .fetch_tuition(id)?
            .ok_or(MarketplaceError::NotFound("tuition"))
    }

    pub fn list(&self, filter: &TuitionFilter) -> Result<Vec<Tuition>, MarketplaceError> {
        Ok(self.store.list_tuitions(filter)?)
    }

    pub fn list_page(&self, request: PageRequest) -> Result<TuitionPage, MarketplaceError> {
        Ok(self.store.list_tuition_page(request)?)
    }

    pub fn list_for_student(&self, actor: &Actor) -> Result<Vec<Tuition>, MarketplaceError> {
        let filter = TuitionFilter {
            student_id: Some(actor.id.clone()),
            ..TuitionFilter::default()
        };
        Ok(self.store.list_tuitions(&filter)?)
    }

    /// Merge the provided fields into the caller's own listing.
    pub fn update(
        &self,
        id: &TuitionId,
        actor: &Actor,
        patch: TuitionPatch,
    ) -> Result<Tuition, MarketplaceError> {
        let tuition = self.get(id)?;
        if tuition.student_id != actor.id {
            return Err(MarketplaceError::Forbidden(
                "you can only update your own tuitions",
            ));
        }

        if let Some(budget) = patch.budget {
            require_positive_amount(budget, "budget")?;
        }
        if patch.is_empty() {
            return Ok(tuition);
        }

        self.store.update_tuition(id, &patch)?;
        self.get(id)
    }

    /// Remove the caller's own listing. Applications already filed against it
    /// are left in place (no cascade), matching the board's historical behavior.
    pub fn delete(&self, id: &TuitionId, actor: &Actor) -> Result<(), MarketplaceError> {
        let tuition = self.get(id)?;
        if tuition.student_id != actor.id {
            return Err(MarketplaceError::Forbidden(
                "you can only delete your own tuitions",
            ));
        }

        self.store.delete_tuition(id)?;
        info!(tuition = %id.0, "tuition deleted");
        Ok(())
    }

    /// Admin moderation. When the terminal-status lock policy is on, an
    /// already approved or rejected listing cannot be re-moderated.
    pub fn set_status(
        &self,
        id: &TuitionId,
        actor: &Actor,
        status: TuitionStatus,
    ) -> Result<Tuition, MarketplaceError> {
        match actor.role {
            Role::Admin => {}
            Role::Student | Role::Tutor => {
                return Err(MarketplaceError::Forbidden(
                    "only admins can moderate tuitions",
                ))
            }
        }

        let tuition = self.get(id)?;
        if self.policy.lock_terminal_tuition_status && tuition.status.is_terminal() {
            return Err(MarketplaceError::InvalidState(format!(
                "tuition is already {}",
                tuition.status.label()
            )));
        }

        self.store.set_tuition_status(id, status)?;
        info!(tuition = %id.0, status = status.label(), "tuition moderated");
        self.get(id)
    }
}

impl From<StoreError> for MarketplaceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => MarketplaceError::NotFound("record"),
            StoreError::Conflict => MarketplaceError::Conflict("record already exists".to_string()),
            StoreError::Unavailable(detail) => MarketplaceError::Store(detail),
        }
    }
}
