use crate::infra::{InMemoryMarketplaceStore, InMemoryPaymentGateway};
use clap::Args;
use std::sync::Arc;
use tuition_market::config::PolicyConfig;
use tuition_market::error::AppError;
use tuition_market::marketplace::{
    Actor, ApplicationDraft, ApplicationPatch, ApplicationService, ConfirmRequest,
    MarketplaceError, Role, SettlementService, TuitionDraft, TuitionService, TuitionStatus, UserId,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Subject for the demo listing
    #[arg(long, default_value = "Math")]
    pub(crate) subject: String,
    /// Class level for the demo listing
    #[arg(long, default_value = "Class 10")]
    pub(crate) class_level: String,
    /// Location for the demo listing
    #[arg(long, default_value = "Dhaka")]
    pub(crate) location: String,
    /// Monthly budget the student offers
    #[arg(long, default_value_t = 5000.0)]
    pub(crate) budget: f64,
    /// Monthly salary the tutor bids
    #[arg(long, default_value_t = 4000.0)]
    pub(crate) expected_salary: f64,
}

/// Walks the full marketplace lifecycle against in-process adapters:
/// post, moderate, bid, duplicate refusal, settle, and the
/// post-settlement edit refusal.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(InMemoryMarketplaceStore::default());
    let gateway = Arc::new(InMemoryPaymentGateway::default());
    let tuitions = TuitionService::new(store.clone(), PolicyConfig::default());
    let applications = ApplicationService::new(store.clone());
    let settlement = SettlementService::new(store, gateway);

    let student = Actor {
        id: UserId("student-demo".to_string()),
        role: Role::Student,
    };
    let tutor = Actor {
        id: UserId("tutor-demo".to_string()),
        role: Role::Tutor,
    };
    let admin = Actor {
        id: UserId("admin-demo".to_string()),
        role: Role::Admin,
    };

    println!("Tuition marketplace demo");
    println!("========================");

    let tuition = tuitions.create(
        &student,
        TuitionDraft {
            subject: args.subject,
            class_level: args.class_level,
            location: args.location,
            budget: args.budget,
            description: "Demo listing".to_string(),
        },
    )?;
    println!(
        "1. {} posted {} ({} / {}) at {} BDT -> status {}",
        student.id.0,
        tuition.id.0,
        tuition.subject,
        tuition.class_level,
        tuition.budget,
        tuition.status.label()
    );

    let tuition = tuitions.set_status(&tuition.id, &admin, TuitionStatus::Approved)?;
    println!(
        "2. {} approved the listing -> status {}",
        admin.id.0,
        tuition.status.label()
    );

    let application = applications.apply(
        &tutor,
        ApplicationDraft {
            tuition_id: tuition.id.clone(),
            qualifications: "BSc in Mathematics".to_string(),
            experience: "4 years of home tutoring".to_string(),
            expected_salary: args.expected_salary,
        },
    )?;
    println!(
        "3. {} applied as {} for {} BDT -> status {}",
        tutor.id.0,
        application.id.0,
        application.expected_salary,
        application.status.label()
    );

    match applications.apply(
        &tutor,
        ApplicationDraft {
            tuition_id: tuition.id.clone(),
            qualifications: "BSc in Mathematics".to_string(),
            experience: "4 years of home tutoring".to_string(),
            expected_salary: args.expected_salary,
        },
    ) {
        Err(MarketplaceError::Conflict(reason)) => {
            println!("4. second bid from the same tutor refused: {reason}");
        }
        Ok(_) => println!("4. unexpected: duplicate bid accepted"),
        Err(err) => println!("4. unexpected refusal: {err}"),
    }

    let receipt = settlement.create_intent(&student, application.expected_salary)?;
    println!("5. payment intent {} opened with the gateway", receipt.intent_id);

    let payment = settlement.confirm(
        &student,
        ConfirmRequest {
            application_id: application.id.clone(),
            tuition_id: Some(tuition.id.clone()),
            tutor_id: Some(tutor.id.clone()),
            amount: application.expected_salary,
            transaction_id: receipt.intent_id,
        },
    )?;
    println!(
        "6. payment {} settled ({} BDT, transaction {})",
        payment.id.0, payment.amount, payment.transaction_id
    );

    let application = applications.get(&application.id, &tutor)?;
    println!(
        "7. application {} is now {}",
        application.id.0,
        application.status.label()
    );

    match applications.update(
        &application.id,
        &tutor,
        ApplicationPatch {
            expected_salary: Some(args.expected_salary + 500.0),
            ..ApplicationPatch::default()
        },
    ) {
        Err(MarketplaceError::InvalidState(reason)) => {
            println!("8. post-settlement edit refused: {reason}");
        }
        Ok(_) => println!("8. unexpected: settled application accepted an edit"),
        Err(err) => println!("8. unexpected refusal: {err}"),
    }

    let report = settlement.revenue_for_tutor(&tutor)?;
    println!(
        "9. tutor revenue: {} BDT across {} transaction(s)",
        report.total_revenue, report.total_transactions
    );

    Ok(())
}
