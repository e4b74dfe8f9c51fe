use super::super::domain::IqProgram;
use super::super::snapshot::HouseholdSnapshot;
use super::IneligibilityReason;

pub(crate) fn assess_program(
    program: &IqProgram,
    snapshot: &HouseholdSnapshot,
) -> Vec<IneligibilityReason> {
    let mut reasons = Vec::new();

    if !program.is_active {
        reasons.push(IneligibilityReason::ProgramInactive);
    }

    match snapshot.income_ratio {
        Some(ratio) if ratio <= program.ami_threshold => {}
        Some(ratio) => reasons.push(IneligibilityReason::IncomeAboveThreshold {
            income_ratio: ratio,
            threshold: program.ami_threshold,
        }),
        None => reasons.push(IneligibilityReason::IncomeUnknown),
    }

    // No requirements means any address qualifies.
    for attribute in program.requirements.required() {
        if snapshot.attributes.satisfies(attribute) {
            continue;
        }
        reasons.push(match snapshot.attributes.get(attribute) {
            Some(_) => IneligibilityReason::AddressAttributeUnmet { attribute },
            None => IneligibilityReason::AddressAttributeUnknown { attribute },
        });
    }

    reasons
}
