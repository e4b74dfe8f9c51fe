//! Enrollment reconciliation: turns the evaluator's verdict into a set of
//! enrollment creations and removals for one household.
//!
//! Planning is pure. The caller applies a plan to a copy of the household
//! record and commits it in one repository call, so a plan is either fully
//! applied or not applied at all.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::ProgramCatalog;
use super::domain::{Enrollment, HouseholdId, IqProgram, ProgramId};
use super::evaluation::{self, IneligibilityReason};
use super::snapshot::HouseholdSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    Standard,
    Renewal,
}

/// Previously held programs sorted by whether they survived a renewal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalSummary {
    pub renewal_eligible: Vec<String>,
    pub renewal_ineligible: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub mode: ReconcileMode,
    pub create: Vec<Enrollment>,
    pub remove: Vec<ProgramId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal: Option<RenewalSummary>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.remove.is_empty()
    }

    /// Removals are applied before creations so a renewal can reset and
    /// re-create the same program.
    pub fn apply_to(&self, enrollments: &mut Vec<Enrollment>) {
        enrollments.retain(|enrollment| !self.remove.contains(&enrollment.program));
        enrollments.extend(self.create.iter().cloned());
    }
}

/// An enrolled program the household would no longer qualify for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedProgram {
    pub program: ProgramId,
    pub reasons: Vec<IneligibilityReason>,
}

/// Raised instead of revoking active benefits; staff must resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentConflict {
    pub household: HouseholdId,
    pub programs: Vec<BlockedProgram>,
}

impl fmt::Display for EnrollmentConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "household {} is enrolled in {} but would no longer be eligible",
            self.household.0,
            self.programs
                .iter()
                .map(|blocked| {
                    let reasons = blocked
                        .reasons
                        .iter()
                        .map(IneligibilityReason::summary)
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{} ({})", blocked.program.0, reasons)
                })
                .collect::<Vec<_>>()
                .join("; ")
        )
    }
}

impl std::error::Error for EnrollmentConflict {}

pub fn plan(
    catalog: &ProgramCatalog,
    snapshot: &HouseholdSnapshot,
    existing: &[Enrollment],
    mode: ReconcileMode,
    now: DateTime<Utc>,
) -> Result<ReconciliationPlan, EnrollmentConflict> {
    let eligible: BTreeSet<&ProgramId> = evaluation::eligible_in_catalog(catalog, snapshot)
        .into_iter()
        .map(|program| &program.id)
        .collect();

    let blocked: Vec<BlockedProgram> = existing
        .iter()
        .filter(|enrollment| enrollment.is_enrolled && !eligible.contains(&enrollment.program))
        .map(|enrollment| BlockedProgram {
            program: enrollment.program.clone(),
            reasons: reasons_for(catalog, &enrollment.program, snapshot),
        })
        .collect();

    if !blocked.is_empty() {
        return Err(EnrollmentConflict {
            household: snapshot.household_id.clone(),
            programs: blocked,
        });
    }

    match mode {
        ReconcileMode::Standard => Ok(standard_plan(catalog, &eligible, existing, now)),
        ReconcileMode::Renewal => Ok(renewal_plan(catalog, &eligible, existing, now)),
    }
}

fn standard_plan(
    catalog: &ProgramCatalog,
    eligible: &BTreeSet<&ProgramId>,
    existing: &[Enrollment],
    now: DateTime<Utc>,
) -> ReconciliationPlan {
    let remove = existing
        .iter()
        .filter(|enrollment| !eligible.contains(&enrollment.program))
        .map(|enrollment| enrollment.program.clone())
        .collect();

    let held: BTreeSet<&ProgramId> = existing.iter().map(|enrollment| &enrollment.program).collect();
    let create = auto_apply(catalog, eligible, &held, now);

    ReconciliationPlan {
        mode: ReconcileMode::Standard,
        create,
        remove,
        renewal: None,
    }
}

fn renewal_plan(
    catalog: &ProgramCatalog,
    eligible: &BTreeSet<&ProgramId>,
    existing: &[Enrollment],
    now: DateTime<Utc>,
) -> ReconciliationPlan {
    let (lifetime, renewing): (Vec<&Enrollment>, Vec<&Enrollment>) = existing
        .iter()
        .partition(|enrollment| {
            catalog
                .program(&enrollment.program)
                .map(IqProgram::is_lifetime)
                .unwrap_or(false)
        });

    let mut remove: Vec<ProgramId> = renewing
        .iter()
        .map(|enrollment| enrollment.program.clone())
        .collect();
    remove.extend(
        lifetime
            .iter()
            .filter(|enrollment| !eligible.contains(&enrollment.program))
            .map(|enrollment| enrollment.program.clone()),
    );

    let mut summary = RenewalSummary::default();
    let mut create = Vec::new();
    for enrollment in &renewing {
        let name = friendly_name(catalog, &enrollment.program);
        if eligible.contains(&enrollment.program) {
            summary.renewal_eligible.push(name);
            create.push(Enrollment::pending(enrollment.program.clone(), now));
        } else {
            summary.renewal_ineligible.push(name);
        }
    }
    summary.renewal_eligible.sort();
    summary.renewal_ineligible.sort();

    let held: BTreeSet<&ProgramId> = existing.iter().map(|enrollment| &enrollment.program).collect();
    create.extend(auto_apply(catalog, eligible, &held, now));

    ReconciliationPlan {
        mode: ReconcileMode::Renewal,
        create,
        remove,
        renewal: Some(summary),
    }
}

fn auto_apply(
    catalog: &ProgramCatalog,
    eligible: &BTreeSet<&ProgramId>,
    held: &BTreeSet<&ProgramId>,
    now: DateTime<Utc>,
) -> Vec<Enrollment> {
    eligible
        .iter()
        .filter(|id| !held.contains(*id))
        .filter_map(|id| catalog.program(id))
        .filter(|program| program.enable_autoapply)
        .map(|program| Enrollment::pending(program.id.clone(), now))
        .collect()
}

fn reasons_for(
    catalog: &ProgramCatalog,
    program: &ProgramId,
    snapshot: &HouseholdSnapshot,
) -> Vec<IneligibilityReason> {
    match catalog.program(program) {
        Some(program) => evaluation::assess(program, snapshot).reasons,
        None => vec![IneligibilityReason::ProgramInactive],
    }
}

fn friendly_name(catalog: &ProgramCatalog, program: &ProgramId) -> String {
    catalog
        .program(program)
        .map(|program| program.friendly_name.clone())
        .unwrap_or_else(|| program.0.clone())
}

/// Outcome of re-checking one household against one edited program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramResync {
    Apply(Enrollment),
    Remove,
    /// Enrolled households are left alone regardless of eligibility.
    IgnoreEnrolled,
    Unchanged,
}

pub fn resync_program(
    program: &IqProgram,
    snapshot: &HouseholdSnapshot,
    existing: Option<&Enrollment>,
    now: DateTime<Utc>,
) -> ProgramResync {
    // Households without established income have nothing to re-check yet.
    if snapshot.income_ratio.is_none() {
        return ProgramResync::Unchanged;
    }

    let eligible = evaluation::assess(program, snapshot).is_eligible();
    match existing {
        Some(enrollment) if enrollment.is_enrolled => ProgramResync::IgnoreEnrolled,
        Some(_) if !eligible => ProgramResync::Remove,
        Some(_) => ProgramResync::Unchanged,
        None if eligible && program.enable_autoapply => {
            ProgramResync::Apply(Enrollment::pending(program.id.clone(), now))
        }
        None => ProgramResync::Unchanged,
    }
}
