use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::domain::{
    Actor, Application, ApplicationDraft, ApplicationId, ApplicationPatch, ApplicationStatus,
    Role, TuitionId, TuitionStatus,
};
use super::repository::{ApplicationRepository, StoreError, TuitionRepository};
use super::tuitions::{require_field, require_positive_amount};
use super::MarketplaceError;

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

/// Owns the tutor application lifecycle: creation against an approved
/// listing, edits and withdrawal while pending, and the student's reject
/// decision. Approval is never direct; it arrives through settlement.
pub struct ApplicationService<S> {
    store: Arc<S>,
}

impl<S> ApplicationService<S>
where
    S: ApplicationRepository + TuitionRepository + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// File a bid on a listing. Only approved listings accept bids, and a
    /// tutor gets at most one bid per listing; the store's insert enforces the
    /// pair uniqueness even when two submissions race.
    pub fn apply(
        &self,
        actor: &Actor,
        draft: ApplicationDraft,
    ) -> Result<Application, MarketplaceError> {
        match actor.role {
            Role::Tutor => {}
            Role::Student | Role::Admin => {
                return Err(MarketplaceError::Forbidden("only tutors can apply"))
            }
        }

        require_field(&draft.qualifications, "qualifications")?;
        require_field(&draft.experience, "experience")?;
        require_positive_amount(draft.expected_salary, "expectedSalary")?;

        let tuition = self
            .store
            .fetch_tuition(&draft.tuition_id)?
            .ok_or(MarketplaceError::NotFound("tuition"))?;

        match tuition.status {
            TuitionStatus::Approved => {}
            TuitionStatus::Pending | TuitionStatus::Rejected => {
                return Err(MarketplaceError::InvalidState(
                    "only approved tuitions accept applications".to_string(),
                ))
            }
        }

        // Friendlier message than the store's conflict; the insert below is
        // still the authoritative duplicate check.
        let existing = self.store.list_applications_for_tutor(&actor.id)?;
        if existing
            .iter()
            .any(|application| application.tuition_id == draft.tuition_id)
        {
            return Err(MarketplaceError::Conflict(
                "you have already applied to this tuition".to_string(),
            ));
        }

        let application = Application {
            id: next_application_id(),
            tuition_id: draft.tuition_id,
            tutor_id: actor.id.clone(),
            qualifications: draft.qualifications,
            experience: draft.experience,
            expected_salary: draft.expected_salary,
            status: ApplicationStatus::Pending,
            created_at: Utc::now(),
        };

        let stored = match self.store.insert_application(application) {
            Ok(stored) => stored,
            Err(StoreError::Conflict) => {
                return Err(MarketplaceError::Conflict(
                    "you have already applied to this tuition".to_string(),
                ))
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            application = %stored.id.0,
            tuition = %stored.tuition_id.0,
            tutor = %stored.tutor_id.0,
            "application submitted"
        );
        Ok(stored)
    }

    /// All bids on one listing, visible only to the student who owns it.
    pub fn list_for_tuition(
        &self,
        tuition_id: &TuitionId,
        actor: &Actor,
    ) -> Result<Vec<Application>, MarketplaceError> {
        let tuition = self
            .store
            .fetch_tuition(tuition_id)?
            .ok_or(MarketplaceError::NotFound("tuition"))?;
        if tuition.student_id != actor.id {
            return Err(MarketplaceError::Forbidden(
                "you can only view applications for your own tuitions",
            ));
        }

        Ok(self.store.list_applications_for_tuition(tuition_id)?)
    }

    pub fn list_for_tutor(&self, actor: &Actor) -> Result<Vec<Application>, MarketplaceError> {
        Ok(self.store.list_applications_for_tutor(&actor.id)?)
    }

    /// Visible to the applying tutor or the student who owns the target listing.
    pub fn get(
        &self,
        id: &ApplicationId,
        actor: &Actor,
    ) -> Result<Application, MarketplaceError> {
        let application = self.fetch(id)?;
        if application.tutor_id == actor.id {
            return Ok(application);
        }

        let tuition = self.store.fetch_tuition(&application.tuition_id)?;
        match tuition {
            Some(tuition) if tuition.student_id == actor.id => Ok(application),
            _ => Err(MarketplaceError::Forbidden("access denied")),
        }
    }

    /// Merge the provided fields; only the owning tutor, only while pending.
    pub fn update(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        patch: ApplicationPatch,
    ) -> Result<Application, MarketplaceError> {
        let application = self.fetch(id)?;
        self.guard_pending_owner(&application, actor, "update")?;

        if let Some(expected_salary) = patch.expected_salary {
            require_positive_amount(expected_salary, "expectedSalary")?;
        }
        if patch.is_empty() {
            return Ok(application);
        }

        // Compare-and-set: the store rechecks Pending inside its commit, so
        // an edit racing a settlement cannot land on an approved bid.
        match self
            .store
            .update_application(id, &patch, ApplicationStatus::Pending)
        {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                return Err(MarketplaceError::InvalidState(
                    "you can only update pending applications".to_string(),
                ))
            }
            Err(err) => return Err(err.into()),
        }
        self.fetch(id)
    }

    /// Withdraw a pending bid; same dual guard as `update`.
    pub fn delete(&self, id: &ApplicationId, actor: &Actor) -> Result<(), MarketplaceError> {
        let application = self.fetch(id)?;
        self.guard_pending_owner(&application, actor, "delete")?;

        match self
            .store
            .delete_application(id, ApplicationStatus::Pending)
        {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                return Err(MarketplaceError::InvalidState(
                    "you can only delete pending applications".to_string(),
                ))
            }
            Err(err) => return Err(err.into()),
        }
        info!(application = %id.0, "application withdrawn");
        Ok(())
    }

    /// The tuition owner's terminal reject decision. Processed-once: a bid
    /// that already left `Pending` cannot transition again.
    pub fn reject(
        &self,
        id: &ApplicationId,
        actor: &Actor,
    ) -> Result<Application, MarketplaceError> {
        let application = self.fetch(id)?;
        let tuition = self
            .store
            .fetch_tuition(&application.tuition_id)?
            .ok_or(MarketplaceError::NotFound("tuition"))?;
        if tuition.student_id != actor.id {
            return Err(MarketplaceError::Forbidden(
                "you can only reject applications for your own tuitions",
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

        // The store rechecks Pending inside its commit; a reject racing a
        // settlement loses instead of overwriting the approval.
        match self.store.set_application_status(
            id,
            ApplicationStatus::Pending,
            ApplicationStatus::Rejected,
        ) {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                return Err(MarketplaceError::InvalidState(
                    "application has already been processed".to_string(),
                ))
            }
            Err(err) => return Err(err.into()),
        }
        info!(application = %id.0, "application rejected");
        self.fetch(id)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Application, MarketplaceError> {
        self.store
            .fetch_application(id)?
            .ok_or(MarketplaceError::NotFound("application"))
    }

    fn guard_pending_owner(
        &self,
        application: &Application,
        actor: &Actor,
        verb: &str,
    ) -> Result<(), MarketplaceError> {
        if application.tutor_id != actor.id {
            return Err(MarketplaceError::Forbidden(
                "you can only modify your own applications",
            ));
        }
        match application.status {
            ApplicationStatus::Pending => Ok(()),
            ApplicationStatus::Approved | ApplicationStatus::Rejected => Err(
                MarketplaceError::InvalidState(format!("you can only {verb} pending applications")),
            ),
        }
    }
}
