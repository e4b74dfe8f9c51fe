use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::super::domain::AddressAttribute;

/// Why a household does not qualify for a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IneligibilityReason {
    ProgramInactive,
    IncomeUnknown,
    IncomeAboveThreshold { income_ratio: Decimal, threshold: Decimal },
    AddressAttributeUnknown { attribute: AddressAttribute },
    AddressAttributeUnmet { attribute: AddressAttribute },
}

impl IneligibilityReason {
    pub fn summary(&self) -> String {
        match self {
            IneligibilityReason::ProgramInactive => "program is no longer active".to_string(),
            IneligibilityReason::IncomeUnknown => {
                "income has not been established from eligibility documents".to_string()
            }
            IneligibilityReason::IncomeAboveThreshold {
                income_ratio,
                threshold,
            } => format!(
                "income ratio {} exceeds program threshold {}",
                income_ratio, threshold
            ),
            IneligibilityReason::AddressAttributeUnknown { attribute } => {
                format!("address has not been validated for {}", attribute.label())
            }
            IneligibilityReason::AddressAttributeUnmet { attribute } => {
                format!("address does not satisfy {}", attribute.label())
            }
        }
    }
}
