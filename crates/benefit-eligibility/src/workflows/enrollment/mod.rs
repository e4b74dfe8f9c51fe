//! Eligibility determination, enrollment reconciliation, and renewal
//! tracking for income-qualified benefit programs.
//!
//! The evaluator and reconciler are pure functions over the catalog and a
//! household snapshot; [`EnrollmentService`] is the only component that
//! writes household records.

pub mod catalog;
pub mod domain;
pub mod evaluation;
pub mod reconcile;
pub mod renewal;
pub mod repository;
pub mod router;
pub mod service;
pub mod snapshot;
pub mod verification;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogError, CatalogImportError, CatalogImporter, ProgramCatalog};
pub use domain::{
    AddressAttribute, AddressAttributes, AddressRequirements, ApplicationStep, ContactInfo,
    EligibilityAddress, EligibilityCategory, EligibilityCategoryId, EligibilityDocument,
    EligibilityResult, Enrollment, EnrollmentStatus, HouseholdId, HouseholdMember,
    HouseholdProfile, HouseholdRecord, IqProgram, ProgramId, RawAddress, RenewalInterval,
    RenewalProgress, Tenure,
};
pub use evaluation::{IneligibilityReason, ProgramAssessment};
pub use reconcile::{
    BlockedProgram, EnrollmentConflict, ReconcileMode, ReconciliationPlan, RenewalSummary,
};
pub use renewal::{RenewalPolicy, RenewalScheduler, SweepReport};
pub use repository::{
    AddressLookup, AddressValidationError, AddressValidator, HouseholdRepository,
    NotificationStatus, Notifier, NotifyError, RenewalNotice, RepositoryError, ValidatedAddress,
};
pub use router::enrollment_router;
pub use service::{
    DashboardView, EnrollmentService, EnrollmentServiceError, FinalizeOutcome, ProgramCard,
    ProgramResyncCounts, RenewalOutcome,
};
pub use snapshot::HouseholdSnapshot;
pub use verification::VerificationQueue;
