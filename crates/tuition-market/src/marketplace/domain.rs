use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for tuition listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuitionId(pub String);

/// Identifier wrapper for tutor applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for settlement ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub String);

/// Identifier issued by the upstream identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Closed role taxonomy; every authorization site matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Tutor,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "tutor" => Some(Self::Tutor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Tutor => "tutor",
            Role::Admin => "admin",
        }
    }
}

/// Authenticated caller, produced by the identity collaborator and trusted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

/// Moderation state of a tuition listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuitionStatus {
    Pending,
    Approved,
    Rejected,
}

impl TuitionStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            TuitionStatus::Pending => "pending",
            TuitionStatus::Approved => "approved",
            TuitionStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, TuitionStatus::Approved | TuitionStatus::Rejected)
    }
}

/// Lifecycle state of a tutor application. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

/// Settlement state of a ledger entry. Only `Completed` is ever produced today;
/// `Pending`/`Failed` exist for gateway flows that settle asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Pending,
    Failed,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// A teaching-opportunity listing posted by a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuition {
    pub id: TuitionId,
    pub student_id: UserId,
    pub subject: String,
    pub class_level: String,
    pub location: String,
    pub budget: f64,
    pub description: String,
    pub status: TuitionStatus,
    pub created_at: DateTime<Utc>,
}

/// A tutor's bid on an approved tuition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub tuition_id: TuitionId,
    pub tutor_id: UserId,
    pub qualifications: String,
    pub experience: String,
    pub expected_salary: f64,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
}

/// Append-only ledger entry recorded when a settlement completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub student_id: UserId,
    pub tutor_id: UserId,
    pub tuition_id: TuitionId,
    pub amount: f64,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub recorded_at: DateTime<Utc>,
}

/// Fields a student supplies when posting a tuition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuitionDraft {
    pub subject: String,
    pub class_level: String,
    pub location: String,
    pub budget: f64,
    #[serde(default)]
    pub description: String,
}

/// Partial tuition edit; only provided fields are merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TuitionPatch {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub class_level: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TuitionPatch {
    pub fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.class_level.is_none()
            && self.location.is_none()
            && self.budget.is_none()
            && self.description.is_none()
    }
}

/// Fields a tutor supplies when applying to a tuition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    pub tuition_id: TuitionId,
    pub qualifications: String,
    pub experience: String,
    pub expected_salary: f64,
}

/// Partial application edit; only provided fields are merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationPatch {
    #[serde(default)]
    pub qualifications: Option<String>,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub expected_salary: Option<f64>,
}

impl ApplicationPatch {
    pub fn is_empty(&self) -> bool {
        self.qualifications.is_none()
            && self.experience.is_none()
            && self.expected_salary.is_none()
    }
}
