use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tuition_market::marketplace::{
    Application, ApplicationId, ApplicationPatch, ApplicationRepository, ApplicationStatus,
    GatewayError, IntentReceipt, PageRequest, Payment, PaymentGateway, PaymentId, PaymentLedger,
    PaymentStatus, SettlementStore, SortOrder, StoreError, Tuition, TuitionFilter, TuitionId,
    TuitionPage, TuitionPatch, TuitionRepository, TuitionStatus, UserId, VerifiedTransaction,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct MarketplaceState {
    tuitions: HashMap<TuitionId, Tuition>,
    applications: HashMap<ApplicationId, Application>,
    payments: HashMap<PaymentId, Payment>,
}

/// All three collections live behind one mutex so `settle` and the
/// uniqueness checks commit as a single unit.
#[derive(Default)]
pub(crate) struct InMemoryMarketplaceStore {
    state: Mutex<MarketplaceState>,
}

impl InMemoryMarketplaceStore {
    fn lock(&self) -> Result<MutexGuard<'_, MarketplaceState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl TuitionRepository for InMemoryMarketplaceStore {
    fn insert_tuition(&self, tuition: Tuition) -> Result<Tuition, StoreError> {
        let mut guard = self.lock()?;
        if guard.tuitions.contains_key(&tuition.id) {
            return Err(StoreError::Conflict);
        }
        guard.tuitions.insert(tuition.id.clone(), tuition.clone());
        Ok(tuition)
    }

    fn fetch_tuition(&self, id: &TuitionId) -> Result<Option<Tuition>, StoreError> {
        Ok(self.lock()?.tuitions.get(id).cloned())
    }

    fn update_tuition(&self, id: &TuitionId, patch: &TuitionPatch) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tuition = guard.tuitions.get_mut(id).ok_or(StoreError::NotFound)?;
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
        Ok(())
    }

    fn set_tuition_status(&self, id: &TuitionId, status: TuitionStatus) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tuition = guard.tuitions.get_mut(id).ok_or(StoreError::NotFound)?;
        tuition.status = status;
        Ok(())
    }

    fn delete_tuition(&self, id: &TuitionId) -> Result<(), StoreError> {
        self.lock()?
            .tuitions
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn list_tuitions(&self, filter: &TuitionFilter) -> Result<Vec<Tuition>, StoreError> {
        let guard = self.lock()?;
        let mut tuitions: Vec<Tuition> = guard
            .tuitions
            .values()
            .filter(|tuition| filter.matches(tuition))
            .cloned()
            .collect();
        tuitions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tuitions)
    }

    fn list_tuition_page(&self, request: PageRequest) -> Result<TuitionPage, StoreError> {
        let guard = self.lock()?;
        let mut tuitions: Vec<Tuition> = guard.tuitions.values().cloned().collect();
        tuitions.sort_by(|a, b| match request.order {
            SortOrder::Asc => a.created_at.cmp(&b.created_at),
            SortOrder::Desc => b.created_at.cmp(&a.created_at),
        });
        let total = tuitions.len();
        let limit = request.limit.max(1);
        let total_pages = total.div_ceil(limit);
        let start = request.page.saturating_sub(1).saturating_mul(limit);
        let page = tuitions.into_iter().skip(start).take(limit).collect();
        Ok(TuitionPage {
            tuitions: page,
            total_pages,
            current_page: request.page,
            total,
        })
    }
}

impl ApplicationRepository for InMemoryMarketplaceStore {
    fn insert_application(&self, application: Application) -> Result<Application, StoreError> {
        let mut guard = self.lock()?;
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
        Ok(self.lock()?.applications.get(id).cloned())
    }

    fn update_application(
        &self,
        id: &ApplicationId,
        patch: &ApplicationPatch,
        expected: ApplicationStatus,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let application = guard.applications.get_mut(id).ok_or(StoreError::NotFound)?;
        if application.status != expected {
            return Err(StoreError::Conflict);
        }
        if let Some(qualifications) = &patch.qualifications {
            application.qualifications = qualifications.clone();
        }
        if let Some(experience) = &patch.experience {
            application.experience = experience.clone();
        }
        if let Some(expected_salary) = patch.expected_salary {
            application.expected_salary = expected_salary;
        }
        Ok(())
    }

    fn set_application_status(
        &self,
        id: &ApplicationId,
        expected: ApplicationStatus,
        next: ApplicationStatus,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
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
        let mut guard = self.lock()?;
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
        let guard = self.lock()?;
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
        let guard = self.lock()?;
        Ok(guard
            .applications
            .values()
            .filter(|application| &application.tutor_id == tutor_id)
            .cloned()
            .collect())
    }
}

impl PaymentLedger for InMemoryMarketplaceStore {
    fn record_payment(&self, payment: Payment) -> Result<Payment, StoreError> {
        let mut guard = self.lock()?;
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
        Ok(self.lock()?.payments.get(id).cloned())
    }

    fn list_payments_for_student(&self, student_id: &UserId) -> Result<Vec<Payment>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .payments
            .values()
            .filter(|payment| &payment.student_id == student_id)
            .cloned()
            .collect())
    }

    fn list_payments_for_tutor(&self, tutor_id: &UserId) -> Result<Vec<Payment>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .payments
            .values()
            .filter(|payment| &payment.tutor_id == tutor_id)
            .cloned()
            .collect())
    }

    fn list_all_payments(&self) -> Result<Vec<Payment>, StoreError> {
        Ok(self.lock()?.payments.values().cloned().collect())
    }

    fn revenue_for_tutor(&self, tutor_id: &UserId) -> Result<f64, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .payments
            .values()
            .filter(|payment| {
                &payment.tutor_id == tutor_id && payment.status == PaymentStatus::Completed
            })
            .map(|payment| payment.amount)
            .sum())
    }

    fn total_revenue(&self) -> Result<f64, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .payments
            .values()
            .filter(|payment| payment.status == PaymentStatus::Completed)
            .map(|payment| payment.amount)
            .sum())
    }

    fn transaction_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.payments.len())
    }
}

impl SettlementStore for InMemoryMarketplaceStore {
    fn settle(
        &self,
        application_id: &ApplicationId,
        payment: Payment,
    ) -> Result<Payment, StoreError> {
        let mut guard = self.lock()?;
        let replayed = guard
            .payments
            .values()
            .any(|existing| existing.transaction_id == payment.transaction_id);
        if replayed {
            return Err(StoreError::Conflict);
        }
        {
            let application = guard
                .applications
                .get(application_id)
                .ok_or(StoreError::NotFound)?;
            if application.status != ApplicationStatus::Pending {
                return Err(StoreError::Conflict);
            }
        }
        guard.payments.insert(payment.id.clone(), payment.clone());
        if let Some(application) = guard.applications.get_mut(application_id) {
            application.status = ApplicationStatus::Approved;
        }
        Ok(payment)
    }
}

/// Gateway adapter backed by the process itself: every intent it opens
/// becomes a verifiable transaction, so the confirm flow works end to end
/// without an external provider.
#[derive(Default)]
pub(crate) struct InMemoryPaymentGateway {
    sequence: AtomicU64,
    transactions: Mutex<HashMap<String, f64>>,
}

impl InMemoryPaymentGateway {
    fn record(&self, transaction_id: &str, amount: f64) -> Result<(), GatewayError> {
        self.transactions
            .lock()
            .map_err(|_| GatewayError::Unavailable("gateway mutex poisoned".to_string()))?
            .insert(transaction_id.to_string(), amount);
        Ok(())
    }
}

impl PaymentGateway for InMemoryPaymentGateway {
    fn create_intent(
        &self,
        amount: f64,
        currency: &str,
        _metadata: BTreeMap<String, String>,
    ) -> Result<IntentReceipt, GatewayError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let intent_id = format!("pi_{sequence:06}");
        self.record(&intent_id, amount)?;
        Ok(IntentReceipt {
            client_secret: format!("{intent_id}_secret_{currency}"),
            intent_id,
        })
    }

    fn verify(&self, transaction_id: &str) -> Result<VerifiedTransaction, GatewayError> {
        let transactions = self
            .transactions
            .lock()
            .map_err(|_| GatewayError::Unavailable("gateway mutex poisoned".to_string()))?;
        transactions
            .get(transaction_id)
            .map(|amount| VerifiedTransaction {
                transaction_id: transaction_id.to_string(),
                amount: *amount,
            })
            .ok_or_else(|| GatewayError::Rejected(format!("unknown transaction {transaction_id}")))
    }
}
