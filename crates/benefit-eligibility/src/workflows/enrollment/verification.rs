use serde::{Deserialize, Serialize};

use super::catalog::ProgramCatalog;
use super::domain::HouseholdRecord;

/// Staff work queues for income verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationQueue {
    /// Ready for review and not waiting on the household.
    New,
    /// Ready for review but waiting on a reply from the household.
    Hold,
    All,
    /// Income already verified.
    Done,
}

impl VerificationQueue {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "hold" => Some(Self::Hold),
            "all" => Some(Self::All),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Whether staff can verify this household's income now.
pub fn awaiting_income_verification(record: &HouseholdRecord, catalog: &ProgramCatalog) -> bool {
    !record.is_archived
        && !record.is_income_verified
        && is_completed(record)
        && documents_ready(record, catalog)
        && identification_ready(record)
}

pub fn in_queue(record: &HouseholdRecord, catalog: &ProgramCatalog, queue: VerificationQueue) -> bool {
    match queue {
        VerificationQueue::New => {
            awaiting_income_verification(record, catalog) && !record.awaiting_user_response
        }
        VerificationQueue::Hold => {
            awaiting_income_verification(record, catalog) && record.awaiting_user_response
        }
        VerificationQueue::All => awaiting_income_verification(record, catalog),
        VerificationQueue::Done => record.is_income_verified,
    }
}

pub fn filter_queue<'a, I>(
    records: I,
    catalog: &ProgramCatalog,
    queue: VerificationQueue,
) -> Vec<&'a HouseholdRecord>
where
    I: IntoIterator<Item = &'a HouseholdRecord>,
{
    records
        .into_iter()
        .filter(|record| in_queue(record, catalog, queue))
        .collect()
}

fn is_completed(record: &HouseholdRecord) -> bool {
    record.last_completed_at.is_some() && record.renewal_progress.is_none()
}

// At least one document in an active category, and none of those missing.
fn documents_ready(record: &HouseholdRecord, catalog: &ProgramCatalog) -> bool {
    let mut active = record
        .documents
        .iter()
        .filter(|document| {
            catalog
                .category(&document.category)
                .map(|category| category.is_active)
                .unwrap_or(false)
        })
        .peekable();

    active.peek().is_some() && active.all(|document| document.is_uploaded())
}

fn identification_ready(record: &HouseholdRecord) -> bool {
    !record.members.is_empty() && record.members.iter().all(|member| member.has_identification())
}
