use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::catalog::ProgramCatalog;
use super::domain::{AddressAttributes, EligibilityDocument, HouseholdId, HouseholdRecord};

/// Eligibility-relevant view of a household, derived from its documents and
/// validated address. Never stored; rebuilt whenever it is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdSnapshot {
    pub household_id: HouseholdId,
    /// Income as a fraction of area median income; `None` until every
    /// selected eligibility document has been uploaded.
    pub income_ratio: Option<Decimal>,
    pub attributes: AddressAttributes,
}

impl HouseholdSnapshot {
    pub fn from_record(record: &HouseholdRecord, catalog: &ProgramCatalog) -> Self {
        let attributes = record
            .address
            .as_ref()
            .map(|address| address.known_attributes())
            .unwrap_or_else(AddressAttributes::unknown);

        Self {
            household_id: record.id.clone(),
            income_ratio: income_ratio(&record.documents, catalog),
            attributes,
        }
    }

    /// Substitute a proposed income ratio, e.g. to preview a staff edit.
    pub fn with_income_ratio(mut self, income_ratio: Option<Decimal>) -> Self {
        self.income_ratio = income_ratio;
        self
    }
}

/// Lowest `ami_threshold` among the household's uploaded eligibility
/// documents. Undefined when nothing is selected, when any selected document
/// is still missing its upload, or when a category is unknown to the catalog.
pub fn income_ratio(documents: &[EligibilityDocument], catalog: &ProgramCatalog) -> Option<Decimal> {
    if documents.is_empty() || documents.iter().any(|document| !document.is_uploaded()) {
        return None;
    }

    let mut lowest: Option<Decimal> = None;
    for document in documents {
        let threshold = catalog.category(&document.category)?.ami_threshold;
        lowest = Some(match lowest {
            Some(current) if current <= threshold => current,
            _ => threshold,
        });
    }
    lowest
}
