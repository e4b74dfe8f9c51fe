mod policy;
mod rules;

pub use policy::IneligibilityReason;

use serde::{Deserialize, Serialize};

use super::catalog::ProgramCatalog;
use super::domain::{IqProgram, ProgramId};
use super::snapshot::HouseholdSnapshot;

/// Per-program verdict with the reasons a household falls short, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramAssessment {
    pub program: ProgramId,
    pub reasons: Vec<IneligibilityReason>,
}

impl ProgramAssessment {
    pub fn is_eligible(&self) -> bool {
        self.reasons.is_empty()
    }
}

pub fn assess(program: &IqProgram, snapshot: &HouseholdSnapshot) -> ProgramAssessment {
    ProgramAssessment {
        program: program.id.clone(),
        reasons: rules::assess_program(program, snapshot),
    }
}

/// Programs the household qualifies for, in input order. Callers that
/// present the result sort it themselves.
pub fn eligible_programs<'a, I>(programs: I, snapshot: &HouseholdSnapshot) -> Vec<&'a IqProgram>
where
    I: IntoIterator<Item = &'a IqProgram>,
{
    programs
        .into_iter()
        .filter(|program| rules::assess_program(program, snapshot).is_empty())
        .collect()
}

pub fn eligible_in_catalog<'a>(
    catalog: &'a ProgramCatalog,
    snapshot: &HouseholdSnapshot,
) -> Vec<&'a IqProgram> {
    eligible_programs(catalog.programs(), snapshot)
}
