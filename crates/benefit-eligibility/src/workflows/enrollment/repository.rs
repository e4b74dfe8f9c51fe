use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{HouseholdId, HouseholdRecord, RawAddress};

/// Storage abstraction for household aggregates.
///
/// `commit` is the only write path for an existing household: it must store
/// the whole record atomically and reject a record whose `revision` no longer
/// matches the stored one.
pub trait HouseholdRepository: Send + Sync {
    fn insert(&self, record: HouseholdRecord) -> Result<HouseholdRecord, RepositoryError>;
    fn fetch(&self, id: &HouseholdId) -> Result<Option<HouseholdRecord>, RepositoryError>;
    fn list(&self) -> Result<Vec<HouseholdRecord>, RepositoryError>;
    /// Returns the stored record with its revision incremented.
    fn commit(&self, record: HouseholdRecord) -> Result<HouseholdRecord, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("household {household} was modified concurrently (expected revision {expected}, found {found})")]
    StaleRevision {
        household: HouseholdId,
        expected: u64,
        found: u64,
    },
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound delivery of renewal reminders (e-mail, SMS).
pub trait Notifier: Send + Sync {
    /// `Ok` only once the transport has confirmed acceptance.
    fn notify(&self, notice: RenewalNotice) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalNotice {
    pub template: String,
    pub household_id: HouseholdId,
    pub recipient: String,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification rejected with status {0}")]
    Rejected(u16),
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Normalizes an address and reports the service-area attributes for it.
pub trait AddressValidator: Send + Sync {
    fn validate(&self, address: &RawAddress) -> Result<AddressLookup, AddressValidationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedAddress {
    pub components: RawAddress,
    pub is_in_gma: bool,
    pub has_connexion: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AddressLookup {
    Found(ValidatedAddress),
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum AddressValidationError {
    #[error("address validation unavailable: {0}")]
    Unavailable(String),
}

/// Notification bookkeeping exposed to staff tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationStatus {
    pub household_id: HouseholdId,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub last_action_notification_at: Option<DateTime<Utc>>,
}

impl From<&HouseholdRecord> for NotificationStatus {
    fn from(record: &HouseholdRecord) -> Self {
        Self {
            household_id: record.id.clone(),
            last_completed_at: record.last_completed_at,
            last_action_notification_at: record.last_action_notification_at,
        }
    }
}
