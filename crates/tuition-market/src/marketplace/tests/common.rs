use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::config::PolicyConfig;
use crate::marketplace::domain::{
    Actor, Application, ApplicationDraft, ApplicationId, ApplicationPatch, ApplicationStatus,
    Payment, PaymentId, Role, Tuition, TuitionDraft, TuitionId, TuitionPatch, TuitionStatus,
    UserId,
};
use crate::marketplace::repository::{
    ApplicationRepository, PageRequest, PaymentLedger, SettlementStore, SortOrder, StoreError,
    TuitionFilter, TuitionPage, TuitionRepository,
};
use crate::marketplace::settlement::{
    GatewayError, IntentReceipt, PaymentGateway, SettlementService, VerifiedTransaction,
};
use crate::marketplace::{ApplicationService, TuitionService};

pub(super) fn student() -> Actor {
    Actor {
        id: UserId("student-1".to_string()),
        role: Role::Student,
    }
}

pub(super) fn other_student() -> Actor {
    Actor {
        id: UserId("student-2".to_string()),
        role: Role::Student,
    }
}

pub(super) fn tutor() -> Actor {
    Actor {
        id: UserId("tutor-1".to_string()),
        role: Role::Tutor,
    }
}

pub(super) fn other_tutor() -> Actor {
    Actor {
        id: UserId("tutor-2".to_string()),
        role: Role::Tutor,
    }
}

pub(super) fn admin() -> Actor {
    Actor {
        id: UserId("admin-1".to_string()),
        role: Role::Admin,
    }
}

pub(super) fn tuition_draft() -> TuitionDraft {
    TuitionDraft {
        subject: "Math".to_string(),
        class_level: "Class 10".to_string(),
        location: "Dhaka".to_string(),
        budget: 5000.0,
        description: "Algebra and geometry, three days a week".to_string(),
    }
}

pub(super) fn application_draft(tuition_id: TuitionId) -> ApplicationDraft {
    ApplicationDraft {
        tuition_id,
        qualifications: "BSc in Mathematics".to_string(),
        experience: "4 years of home tutoring".to_string(),
        expected_salary: 4000.0,
    }
}

#[derive(Default)]
struct StoreState {
    tuitions: HashMap<TuitionId, Tuition>,
    applications: HashMap<ApplicationId, Application>,
    payments: HashMap<PaymentId, Payment>,
}

/// All three collections behind one mutex so `settle` and the uniqueness
/// checks are single-commit, the way a real backend's transaction would be.
#[derive(Default)]
pub(super) struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub(super) fn payment_count(&self) -> usize {
        self.state.lock().expect("store mutex poisoned").payments.len()
    }
}

fn merge_tuition(tuition: &mut Tuition, patch: &TuitionPatch) {
    if let Some(subject) = &patch.subject {
        tuition.subject = subject.clone();
    }
    if let Some(class_level) = &patch.class_level {
        tuition.class_level = class_level.clone();
    }
    if let Some(location) = &patch.location {
        tuition.location = location.clone();
    }
    if let Some(budget) = patch.budget {
        tuition.budget = budget;
    }
    if let Some(description) = &patch.description {
        tuition.description = description.clone();
    }
}

fn merge_application(application: &mut Application, patch: &ApplicationPatch) {
    if let Some(qualifications) = &patch.qualifications {
        application.qualifications = qualifications.clone();
    }
    if let Some(experience) = &patch.experience {
        application.experience = experience.clone();
    }
    if let Some(expected_salary) = patch.expected_salary {
        application.expected_salary = expected_salary;
    }
}

impl TuitionRepository for MemoryStore {
    fn insert_tuition(&self, tuition: Tuition) -> Result<Tuition, StoreError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        if guard.tuitions.contains_key(&tuition.id) {
            return Err(StoreError::Conflict);
        }
        guard.tuitions.insert(tuition.id.clone(), tuition.clone());
        Ok(tuition)
    }

    fn fetch_tuition(&self, id: &TuitionId) -> Result<Option<Tuition>, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard.tuitions.get(id).cloned())
    }

    fn update_tuition(&self, id: &TuitionId, patch: &TuitionPatch) -> Result<(), StoreError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        let tuition = guard.tuitions.get_mut(id).ok_or(StoreError::NotFound)?;
        merge_tuition(tuition, patch);
        Ok(())
    }

    fn set_tuition_status(&self, id: &TuitionId, status: TuitionStatus) -> Result<(), StoreError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        let tuition = guard.tuitions.get_mut(id).ok_or(StoreError::NotFound)?;
        tuition.status = status;
        Ok(())
    }

    fn delete_tuition(&self, id: &TuitionId) -> Result<(), StoreError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        guard.tuitions.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn list_tuitions(&self, filter: &TuitionFilter) -> Result<Vec<Tuition>, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard
            .tuitions
            .values()
            .filter(|tuition| filter.matches(tuition))
            .cloned()
            .collect())
    }

    fn list_tuition_page(&self, request: PageRequest) -> Result<TuitionPage, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        let mut tuitions: Vec<Tuition> = guard.tuitions.values().cloned().collect();
        tuitions.sort_by(|a, b| match request.order {
            SortOrder::Asc => a.created_at.cmp(&b.created_at),
            SortOrder::Desc => b.created_at.cmp(&a.created_at),
        });

        let total = tuitions.len();
        let total_pages = total.div_ceil(request.limit.max(1));
        let start = request.page.saturating_sub(1).saturating_mul(request.limit);
        let page: Vec<Tuition> = tuitions.into_iter().skip(start).take(request.limit).collect();

        Ok(TuitionPage {
            tuitions: page,
            total_pages,
            current_page: request.page,
            total,
        })
    }
}

impl ApplicationRepository for MemoryStore {
    fn insert_application(&self, application: Application) -> Result<Application, StoreError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        let duplicate = guard.applications.values().any(|existing| {
            existing.tutor_id == application.tutor_id
                && existing.tuition_id == application.tuition_id
        });
        if duplicate || guard.applications.contains_key(&application.id) {
            return Err(StoreError::Conflict);
        }
        guard
            .applications
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn fetch_application(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard.applications.get(id).cloned())
    }

    fn update_application(
        &self,
        id: &ApplicationId,
        patch: &ApplicationPatch,
        expected: ApplicationStatus,
    ) -> Result<(), StoreError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        let application = guard.applications.get_mut(id).ok_or(StoreError::NotFound)?;
        if application.status != expected {
            return Err(StoreError::Conflict);
        }
        merge_application(application, patch);
        Ok(())
    }

    fn set_application_status(
        &self,
        id: &ApplicationId,
        expected: ApplicationStatus,
        next: ApplicationStatus,
    ) -> Result<(), StoreError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        let application = guard.applications.get_mut(id).ok_or(StoreError::NotFound)?;
        if application.status != expected {
            return Err(StoreError::Conflict);
        }
        application.status = next;
        Ok(())
    }

    fn delete_application(
        &self,
        id: &ApplicationId,
        expected: ApplicationStatus,
    ) -> Result<(), StoreError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        match guard.applications.get(id) {
            Some(application) if application.status != expected => Err(StoreError::Conflict),
            Some(_) => {
                guard.applications.remove(id);
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn list_applications_for_tuition(
        &self,
        tuition_id: &TuitionId,
    ) -> Result<Vec<Application>, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard
            .applications
            .values()
            .filter(|application| &application.tuition_id == tuition_id)
            .cloned()
            .collect())
    }

    fn list_applications_for_tutor(
        &self,
        tutor_id: &UserId,
    ) -> Result<Vec<Application>, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard
            .applications
            .values()
            .filter(|application| &application.tutor_id == tutor_id)
            .cloned()
            .collect())
    }
}

impl PaymentLedger for MemoryStore {
    fn record_payment(&self, payment: Payment) -> Result<Payment, StoreError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        let replayed = guard
            .payments
            .values()
            .any(|existing| existing.transaction_id == payment.transaction_id);
        if replayed || guard.payments.contains_key(&payment.id) {
            return Err(StoreError::Conflict);
        }
        guard.payments.insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard.payments.get(id).cloned())
    }

    fn list_payments_for_student(&self, student_id: &UserId) -> Result<Vec<Payment>, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard
            .payments
            .values()
            .filter(|payment| &payment.student_id == student_id)
            .cloned()
            .collect())
    }

    fn list_payments_for_tutor(&self, tutor_id: &UserId) -> Result<Vec<Payment>, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard
            .payments
            .values()
            .filter(|payment| &payment.tutor_id == tutor_id)
            .cloned()
            .collect())
    }

    fn list_all_payments(&self) -> Result<Vec<Payment>, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard.payments.values().cloned().collect())
    }

    fn revenue_for_tutor(&self, tutor_id: &UserId) -> Result<f64, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard
            .payments
            .values()
            .filter(|payment| {
                &payment.tutor_id == tutor_id
                    && payment.status == crate::marketplace::PaymentStatus::Completed
            })
            .map(|payment| payment.amount)
            .sum())
    }

    fn total_revenue(&self) -> Result<f64, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard
            .payments
            .values()
            .filter(|payment| payment.status == crate::marketplace::PaymentStatus::Completed)
            .map(|payment| payment.amount)
            .sum())
    }

    fn transaction_count(&self) -> Result<usize, StoreError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard.payments.len())
    }
}

impl SettlementStore for MemoryStore {
    fn settle(
        &self,
        application_id: &ApplicationId,
        payment: Payment,
    ) -> Result<Payment, StoreError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");

        let replayed = guard
            .payments
            .values()
            .any(|existing| existing.transaction_id == payment.transaction_id);
        if replayed {
            return Err(StoreError::Conflict);
        }

        let application = guard
            .applications
            .get(application_id)
            .ok_or(StoreError::NotFound)?;
        if application.status != ApplicationStatus::Pending {
            return Err(StoreError::Conflict);
        }

        guard.payments.insert(payment.id.clone(), payment.clone());
        if let Some(application) = guard.applications.get_mut(application_id) {
            application.status = ApplicationStatus::Approved;
        }
        Ok(payment)
    }
}

/// Gateway double: transactions registered through `allow` verify with the
/// given amount, everything else is rejected.
#[derive(Default)]
pub(super) struct MockGateway {
    transactions: Mutex<HashMap<String, f64>>,
    verify_calls: Mutex<Vec<String>>,
}

impl MockGateway {
    pub(super) fn allow(&self, transaction_id: &str, amount: f64) {
        self.transactions
            .lock()
            .expect("gateway mutex poisoned")
            .insert(transaction_id.to_string(), amount);
    }

    pub(super) fn verify_calls(&self) -> Vec<String> {
        self.verify_calls
            .lock()
            .expect("gateway mutex poisoned")
            .clone()
    }
}

impl PaymentGateway for MockGateway {
    fn create_intent(
        &self,
        amount: f64,
        currency: &str,
        _metadata: BTreeMap<String, String>,
    ) -> Result<IntentReceipt, GatewayError> {
        Ok(IntentReceipt {
            client_secret: format!("secret_{currency}_{amount}"),
            intent_id: "pi_test".to_string(),
        })
    }

    fn verify(&self, transaction_id: &str) -> Result<VerifiedTransaction, GatewayError> {
        self.verify_calls
            .lock()
            .expect("gateway mutex poisoned")
            .push(transaction_id.to_string());
        let transactions = self.transactions.lock().expect("gateway mutex poisoned");
        match transactions.get(transaction_id) {
            Some(amount) => Ok(VerifiedTransaction {
                transaction_id: transaction_id.to_string(),
                amount: *amount,
            }),
            None => Err(GatewayError::Rejected(format!(
                "unknown transaction {transaction_id}"
            ))),
        }
    }
}

pub(super) struct Fixture {
    pub(super) tuitions: TuitionService<MemoryStore>,
    pub(super) applications: ApplicationService<MemoryStore>,
    pub(super) settlement: SettlementService<MemoryStore, MockGateway>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) gateway: Arc<MockGateway>,
}

pub(super) fn fixture() -> Fixture {
    fixture_with_policy(PolicyConfig::default())
}

pub(super) fn fixture_with_policy(policy: PolicyConfig) -> Fixture {
    let store = Arc::new(MemoryStore::default());
    let gateway = Arc::new(MockGateway::default());
    Fixture {
        tuitions: TuitionService::new(store.clone(), policy),
        applications: ApplicationService::new(store.clone()),
        settlement: SettlementService::new(store.clone(), gateway.clone()),
        store,
        gateway,
    }
}

/// Create a tuition as the fixture student and approve it as the admin.
pub(super) fn approved_tuition(fix: &Fixture) -> TuitionId {
    let tuition = fix
        .tuitions
        .create(&student(), tuition_draft())
        .expect("tuition created");
    fix.tuitions
        .set_status(&tuition.id, &admin(), TuitionStatus::Approved)
        .expect("tuition approved");
    tuition.id
}
