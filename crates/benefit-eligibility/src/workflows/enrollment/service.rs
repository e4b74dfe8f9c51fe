use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::catalog::{CatalogError, ProgramCatalog};
use super::domain::{
    AddressAttributes, ApplicationStep, ContactInfo, EligibilityAddress, EligibilityCategoryId,
    EligibilityDocument, EligibilityResult, Enrollment, EnrollmentStatus, HouseholdId,
    HouseholdMember, HouseholdProfile, HouseholdRecord, IqProgram, ProgramId, RawAddress,
    RenewalProgress,
};
use super::evaluation::{self, IneligibilityReason};
use super::reconcile::{
    self, EnrollmentConflict, ProgramResync, ReconcileMode, ReconciliationPlan, RenewalSummary,
};
use super::renewal::{self, RenewalPolicy, RenewalScheduler, SweepReport};
use super::repository::{
    AddressLookup, AddressValidationError, AddressValidator, HouseholdRepository,
    NotificationStatus, Notifier, RepositoryError,
};
use super::snapshot::{self, HouseholdSnapshot};
use super::verification::{self, VerificationQueue};

/// Writes retried after losing an optimistic-concurrency race.
const COMMIT_ATTEMPTS: usize = 3;

/// Service composing the catalog, household repository, notifier, and
/// address validator. Every change to a household is made on a copy of the
/// record and stored with a single commit.
pub struct EnrollmentService<R, N, V> {
    repository: Arc<R>,
    addresses: Arc<V>,
    catalog: RwLock<Arc<ProgramCatalog>>,
    scheduler: RenewalScheduler<R, N>,
}

static HOUSEHOLD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_household_id() -> HouseholdId {
    let id = HOUSEHOLD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    HouseholdId(format!("hh-{id:06}"))
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeOutcome {
    pub household: HouseholdRecord,
    pub plan: ReconciliationPlan,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewalOutcome {
    pub household: HouseholdRecord,
    pub plan: ReconciliationPlan,
    pub summary: RenewalSummary,
}

/// Household-facing view of every program it holds or can apply for.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub household_id: HouseholdId,
    pub next_step: ApplicationStep,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_step: Option<ApplicationStep>,
    pub needs_renewal: bool,
    pub renew_now_enabled: bool,
    pub programs: Vec<ProgramCard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramCard {
    pub status: EnrollmentStatus,
    pub status_label: &'static str,
    pub button_text: &'static str,
    pub result: EligibilityResult,
}

impl ProgramCard {
    fn new(result: EligibilityResult, needs_renewal: bool) -> Self {
        let status = result.status(needs_renewal);
        Self {
            status,
            status_label: status.label(),
            button_text: status.button_text(),
            result,
        }
    }
}

/// Households touched when a program definition changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgramResyncCounts {
    pub applied: usize,
    pub removed: usize,
    pub ignored: usize,
}

impl<R, N, V> EnrollmentService<R, N, V>
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<N>,
        addresses: Arc<V>,
        catalog: ProgramCatalog,
        policy: RenewalPolicy,
    ) -> Self {
        let scheduler = RenewalScheduler::new(Arc::clone(&repository), notifier, policy);
        Self {
            repository,
            addresses,
            catalog: RwLock::new(Arc::new(catalog)),
            scheduler,
        }
    }

    pub fn catalog(&self) -> Arc<ProgramCatalog> {
        let guard = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn policy(&self) -> &RenewalPolicy {
        self.scheduler.policy()
    }

    /// Shared by every sweep entry point so overlapping sweeps run one at a
    /// time.
    pub fn scheduler(&self) -> &RenewalScheduler<R, N> {
        &self.scheduler
    }

    pub fn register(&self, contact: ContactInfo) -> Result<HouseholdRecord, EnrollmentServiceError> {
        if !contact.email.contains('@') {
            return Err(EnrollmentServiceError::Validation(
                "a contact e-mail address is required".to_string(),
            ));
        }

        let record = HouseholdRecord::new(next_household_id(), contact);
        let stored = self.repository.insert(record)?;
        info!(household = %stored.id, "household registered");
        Ok(stored)
    }

    pub fn household(&self, id: &HouseholdId) -> Result<HouseholdRecord, EnrollmentServiceError> {
        self.load(id)
    }

    /// Validate and store the eligibility address. An address the validator
    /// cannot find is kept unverified, which leaves every attribute unknown.
    pub fn record_address(
        &self,
        id: &HouseholdId,
        address: RawAddress,
    ) -> Result<HouseholdRecord, EnrollmentServiceError> {
        let lookup = self.addresses.validate(&address)?;
        let eligibility_address = match lookup {
            AddressLookup::Found(validated) => EligibilityAddress {
                components: validated.components,
                attributes: AddressAttributes {
                    is_in_gma: Some(validated.is_in_gma),
                    is_city_covered: Some(validated.is_in_gma),
                    has_connexion: validated.has_connexion,
                },
                is_verified: true,
            },
            AddressLookup::NotFound => {
                debug!(household = %id, "address not found by validator");
                EligibilityAddress {
                    components: address,
                    attributes: AddressAttributes::unknown(),
                    is_verified: false,
                }
            }
        };

        let (record, ()) = self.update(id, |record, _| {
            record.address = Some(eligibility_address.clone());
            Ok(())
        })?;
        Ok(record)
    }

    /// Staff override for addresses outside the service map but covered by
    /// the city.
    pub fn set_city_coverage(
        &self,
        id: &HouseholdId,
        is_city_covered: bool,
    ) -> Result<HouseholdRecord, EnrollmentServiceError> {
        let (record, ()) = self.update(id, |record, _| match record.address.as_mut() {
            Some(address) if address.is_verified => {
                address.attributes.is_city_covered = Some(is_city_covered);
                Ok(())
            }
            _ => Err(EnrollmentServiceError::Validation(
                "address has not been verified".to_string(),
            )),
        })?;
        Ok(record)
    }

    pub fn record_profile(
        &self,
        id: &HouseholdId,
        profile: HouseholdProfile,
    ) -> Result<HouseholdRecord, EnrollmentServiceError> {
        if profile.persons_in_household == 0 {
            return Err(EnrollmentServiceError::Validation(
                "a household has at least one person".to_string(),
            ));
        }
        let (record, ()) = self.update(id, |record, _| {
            record.profile = Some(profile);
            Ok(())
        })?;
        Ok(record)
    }

    pub fn record_members(
        &self,
        id: &HouseholdId,
        members: Vec<HouseholdMember>,
    ) -> Result<HouseholdRecord, EnrollmentServiceError> {
        if members.is_empty() || members.iter().any(|member| member.name.trim().is_empty()) {
            return Err(EnrollmentServiceError::Validation(
                "every household member needs a name".to_string(),
            ));
        }
        let (record, ()) = self.update(id, |record, _| {
            record.members = members.clone();
            Ok(())
        })?;
        Ok(record)
    }

    /// Select the eligibility document categories the household will upload.
    /// Uploads already made for a category that stays selected are kept.
    pub fn select_documents(
        &self,
        id: &HouseholdId,
        categories: Vec<EligibilityCategoryId>,
    ) -> Result<HouseholdRecord, EnrollmentServiceError> {
        if categories.is_empty() {
            return Err(EnrollmentServiceError::Validation(
                "select at least one eligibility document".to_string(),
            ));
        }

        let (record, ()) = self.update(id, |record, catalog| {
            let mut documents: Vec<EligibilityDocument> = Vec::with_capacity(categories.len());
            for category in &categories {
                match catalog.category(category) {
                    Some(entry) if entry.is_active => {}
                    _ => {
                        return Err(EnrollmentServiceError::Validation(format!(
                            "unknown eligibility document '{}'",
                            category.0
                        )))
                    }
                }
                if documents.iter().any(|document| &document.category == category) {
                    continue;
                }
                let existing = record
                    .documents
                    .iter()
                    .find(|document| &document.category == category)
                    .cloned();
                documents
                    .push(existing.unwrap_or_else(|| EligibilityDocument::selected(category.clone())));
            }
            record.documents = documents;
            Ok(())
        })?;
        Ok(record)
    }

    pub fn record_upload(
        &self,
        id: &HouseholdId,
        category: &EligibilityCategoryId,
        document_path: String,
    ) -> Result<HouseholdRecord, EnrollmentServiceError> {
        if document_path.trim().is_empty() {
            return Err(EnrollmentServiceError::Validation(
                "document path must not be empty".to_string(),
            ));
        }

        let (record, ()) = self.update(id, |record, _| {
            let document = record
                .documents
                .iter_mut()
                .find(|document| &document.category == category)
                .ok_or_else(|| {
                    EnrollmentServiceError::Validation(format!(
                        "eligibility document '{}' was not selected",
                        category.0
                    ))
                })?;
            document.document_path = Some(document_path.clone());
            Ok(())
        })?;
        Ok(record)
    }

    /// Complete an application: reconcile enrollments and stamp completion.
    pub fn finalize_application(
        &self,
        id: &HouseholdId,
        now: DateTime<Utc>,
    ) -> Result<FinalizeOutcome, EnrollmentServiceError> {
        let (household, plan) = self.update(id, |record, catalog| {
            if record.renewal_progress.is_some() {
                return Err(EnrollmentServiceError::RenewalInProgress);
            }
            ensure_complete(record)?;
            let plan = reconcile_record(record, catalog, ReconcileMode::Standard, now)?;
            record.last_completed_at = Some(now);
            Ok(plan)
        })?;

        info!(
            household = %household.id,
            created = plan.create.len(),
            removed = plan.remove.len(),
            "application finalized"
        );
        Ok(FinalizeOutcome { household, plan })
    }

    /// Record a renewal page as completed, starting the renewal if needed.
    pub fn record_renewal_step(
        &self,
        id: &HouseholdId,
        step: ApplicationStep,
    ) -> Result<RenewalProgress, EnrollmentServiceError> {
        if !ApplicationStep::RENEWAL_STEPS.contains(&step) {
            return Err(EnrollmentServiceError::Validation(format!(
                "'{}' is not a renewal step",
                step.label()
            )));
        }

        let (_, progress) = self.update(id, |record, _| {
            if record.last_completed_at.is_none() {
                return Err(EnrollmentServiceError::NotFinalized);
            }
            let progress = record
                .renewal_progress
                .get_or_insert_with(RenewalProgress::default);
            progress.record(step);
            Ok(progress.clone())
        })?;
        Ok(progress)
    }

    /// Finish a renewal: reset renewable enrollments and re-apply to the
    /// ones the household still qualifies for.
    pub fn renew_application(
        &self,
        id: &HouseholdId,
        now: DateTime<Utc>,
    ) -> Result<RenewalOutcome, EnrollmentServiceError> {
        let (household, plan) = self.update(id, |record, catalog| {
            let progress = record
                .renewal_progress
                .as_ref()
                .ok_or(EnrollmentServiceError::NoRenewalInProgress)?;
            if let Some(next_step) = progress.next_step() {
                return Err(EnrollmentServiceError::IncompleteApplication { next_step });
            }
            ensure_complete(record)?;

            let plan = reconcile_record(record, catalog, ReconcileMode::Renewal, now)?;
            record.is_income_verified = false;
            record.last_completed_at = Some(now);
            record.renewal_progress = None;
            Ok(plan)
        })?;

        let summary = plan.renewal.clone().unwrap_or_default();
        info!(
            household = %household.id,
            renewed = summary.renewal_eligible.len(),
            lapsed = summary.renewal_ineligible.len(),
            "renewal completed"
        );
        Ok(RenewalOutcome {
            household,
            plan,
            summary,
        })
    }

    /// Apply to a single eligible program that was not auto-applied.
    pub fn quick_apply(
        &self,
        id: &HouseholdId,
        program: &ProgramId,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, EnrollmentServiceError> {
        let (_, enrollment) = self.update(id, |record, catalog| {
            let entry = catalog
                .program(program)
                .ok_or_else(|| CatalogError::UnknownProgram(program.0.clone()))?;
            if record.enrollment(program).is_some() {
                return Err(EnrollmentServiceError::AlreadyApplied(program.0.clone()));
            }

            let snapshot = HouseholdSnapshot::from_record(record, catalog);
            let assessment = evaluation::assess(entry, &snapshot);
            if !assessment.is_eligible() {
                return Err(EnrollmentServiceError::NotEligible {
                    program: program.0.clone(),
                    reasons: assessment.reasons,
                });
            }

            let enrollment = Enrollment::pending(program.clone(), now);
            record.enrollments.push(enrollment.clone());
            Ok(enrollment)
        })?;

        info!(household = %id, program = %program.0, "applied to program");
        Ok(enrollment)
    }

    /// Staff confirmation that the household is enrolled.
    pub fn mark_enrolled(
        &self,
        id: &HouseholdId,
        program: &ProgramId,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, EnrollmentServiceError> {
        let (_, enrollment) = self.update(id, |record, _| {
            let enrollment = record
                .enrollment_mut(program)
                .ok_or_else(|| EnrollmentServiceError::EnrollmentNotFound(program.0.clone()))?;
            if !enrollment.is_enrolled {
                enrollment.is_enrolled = true;
                enrollment.enrolled_at = Some(now);
            }
            Ok(enrollment.clone())
        })?;
        Ok(enrollment)
    }

    pub fn verify_income(
        &self,
        id: &HouseholdId,
        verified: bool,
    ) -> Result<HouseholdRecord, EnrollmentServiceError> {
        let (record, ()) = self.update(id, |record, _| {
            record.is_income_verified = verified;
            if verified {
                record.awaiting_user_response = false;
            }
            Ok(())
        })?;
        Ok(record)
    }

    pub fn set_awaiting_response(
        &self,
        id: &HouseholdId,
        awaiting: bool,
    ) -> Result<HouseholdRecord, EnrollmentServiceError> {
        let (record, ()) = self.update(id, |record, _| {
            record.awaiting_user_response = awaiting;
            Ok(())
        })?;
        Ok(record)
    }

    /// Staff edit of the household's eligibility documents. For completed
    /// applications the edit and the resulting reconciliation are stored
    /// together; a conflict rejects both.
    pub fn replace_documents(
        &self,
        id: &HouseholdId,
        documents: Vec<EligibilityDocument>,
        now: DateTime<Utc>,
    ) -> Result<Option<ReconciliationPlan>, EnrollmentServiceError> {
        let (_, plan) = self.update(id, |record, catalog| {
            if let Some(unknown) = documents
                .iter()
                .find(|document| catalog.category(&document.category).is_none())
            {
                return Err(EnrollmentServiceError::Validation(format!(
                    "unknown eligibility document '{}'",
                    unknown.category.0
                )));
            }

            record.documents = documents.clone();
            if record.last_completed_at.is_none() {
                return Ok(None);
            }
            reconcile_record(record, catalog, ReconcileMode::Standard, now).map(Some)
        })?;
        Ok(plan)
    }

    /// Reconciliation a staff document edit would cause, computed without
    /// storing anything. Enrolled programs the edit would revoke come back as
    /// a conflict.
    pub fn preview_documents(
        &self,
        id: &HouseholdId,
        documents: &[EligibilityDocument],
        now: DateTime<Utc>,
    ) -> Result<ReconciliationPlan, EnrollmentServiceError> {
        let record = self.load(id)?;
        if record.last_completed_at.is_none() {
            return Err(EnrollmentServiceError::NotFinalized);
        }
        let catalog = self.catalog();
        if let Some(unknown) = documents
            .iter()
            .find(|document| catalog.category(&document.category).is_none())
        {
            return Err(EnrollmentServiceError::Validation(format!(
                "unknown eligibility document '{}'",
                unknown.category.0
            )));
        }
        let proposed = snapshot::income_ratio(documents, &catalog);
        let snapshot = HouseholdSnapshot::from_record(&record, &catalog).with_income_ratio(proposed);
        Ok(reconcile::plan(
            &catalog,
            &snapshot,
            &record.enrollments,
            ReconcileMode::Standard,
            now,
        )?)
    }

    /// Re-run standard reconciliation without touching completion times.
    /// Running it twice in a row leaves the second plan empty.
    pub fn reconcile(
        &self,
        id: &HouseholdId,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationPlan, EnrollmentServiceError> {
        let (_, plan) = self.update(id, |record, catalog| {
            if record.last_completed_at.is_none() {
                return Err(EnrollmentServiceError::NotFinalized);
            }
            reconcile_record(record, catalog, ReconcileMode::Standard, now)
        })?;
        Ok(plan)
    }

    pub fn dashboard(
        &self,
        id: &HouseholdId,
        now: DateTime<Utc>,
    ) -> Result<DashboardView, EnrollmentServiceError> {
        let record = self.load(id)?;
        let catalog = self.catalog();
        let interval = catalog.shortest_renewal_interval();
        let needs_renewal = renewal::needs_renewal(record.last_completed_at, interval, now);

        let mut results: Vec<EligibilityResult> = record
            .enrollments
            .iter()
            .filter_map(|enrollment| {
                catalog
                    .program(&enrollment.program)
                    .filter(|program| program.is_active)
                    .map(|program| EligibilityResult::Applied {
                        program: program.clone(),
                        enrollment: enrollment.clone(),
                    })
            })
            .collect();

        let snapshot = HouseholdSnapshot::from_record(&record, &catalog);
        results.extend(
            evaluation::eligible_in_catalog(&catalog, &snapshot)
                .into_iter()
                .filter(|program| record.enrollment(&program.id).is_none())
                .map(|program| EligibilityResult::Eligible(program.clone())),
        );
        results.sort_by(|left, right| left.program().friendly_name.cmp(&right.program().friendly_name));

        Ok(DashboardView {
            household_id: record.id.clone(),
            next_step: record.next_step(),
            renewal_step: record
                .renewal_progress
                .as_ref()
                .and_then(RenewalProgress::next_step),
            needs_renewal,
            renew_now_enabled: renewal::renew_now_enabled(
                self.scheduler.policy(),
                record.last_completed_at,
                interval,
                now,
            ),
            programs: results
                .into_iter()
                .map(|result| ProgramCard::new(result, needs_renewal))
                .collect(),
        })
    }

    pub fn add_program(
        &self,
        program: IqProgram,
        now: DateTime<Utc>,
    ) -> Result<ProgramResyncCounts, EnrollmentServiceError> {
        let id = program.id.clone();
        self.edit_catalog(|catalog| catalog.insert_program(program))?;
        self.resync_program(&id, now)
    }

    /// Replace a program definition and bring every completed household in
    /// line with it. Enrolled households are never touched.
    pub fn update_program(
        &self,
        program: IqProgram,
        now: DateTime<Utc>,
    ) -> Result<ProgramResyncCounts, EnrollmentServiceError> {
        let id = program.id.clone();
        self.edit_catalog(|catalog| catalog.update_program(program))?;
        self.resync_program(&id, now)
    }

    /// Delete a program nobody is enrolled in, dropping pending applications.
    pub fn remove_program(&self, program: &ProgramId) -> Result<IqProgram, EnrollmentServiceError> {
        let households = self.repository.list()?;
        let enrolled = households
            .iter()
            .filter(|record| {
                record
                    .enrollment(program)
                    .map(|enrollment| enrollment.is_enrolled)
                    .unwrap_or(false)
            })
            .count();
        if enrolled > 0 {
            warn!(program = %program.0, enrolled, "refusing to remove program with enrollments");
            return Err(CatalogError::ProgramHasEnrollments {
                program: program.0.clone(),
                households: enrolled,
            }
            .into());
        }

        let removed = self.edit_catalog(|catalog| catalog.remove_program(program))?;
        for household in households
            .iter()
            .filter(|record| record.enrollment(program).is_some())
        {
            self.update(&household.id, |record, _| {
                record
                    .enrollments
                    .retain(|enrollment| &enrollment.program != program);
                Ok(())
            })?;
        }

        info!(program = %program.0, "program removed from catalog");
        Ok(removed)
    }

    pub fn verification_queue(
        &self,
        queue: VerificationQueue,
    ) -> Result<Vec<HouseholdRecord>, EnrollmentServiceError> {
        let catalog = self.catalog();
        let households = self.repository.list()?;
        Ok(verification::filter_queue(&households, &catalog, queue)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn sweep_renewals(&self, now: DateTime<Utc>) -> Result<SweepReport, EnrollmentServiceError> {
        let catalog = self.catalog();
        Ok(self.scheduler().sweep(&catalog, now)?)
    }

    pub fn notification_statuses(&self) -> Result<Vec<NotificationStatus>, EnrollmentServiceError> {
        Ok(self.scheduler().notification_statuses()?)
    }

    fn load(&self, id: &HouseholdId) -> Result<HouseholdRecord, EnrollmentServiceError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| EnrollmentServiceError::HouseholdNotFound(id.clone()))
    }

    /// Apply `change` to a copy of the stored record and commit it. A stale
    /// revision reloads the record and replays the change.
    fn update<T, F>(
        &self,
        id: &HouseholdId,
        mut change: F,
    ) -> Result<(HouseholdRecord, T), EnrollmentServiceError>
    where
        F: FnMut(&mut HouseholdRecord, &ProgramCatalog) -> Result<T, EnrollmentServiceError>,
    {
        let catalog = self.catalog();
        let mut attempt = 1;
        loop {
            let current = self.load(id)?;
            let mut draft = current.clone();
            let output = change(&mut draft, &catalog)?;
            if draft == current {
                return Ok((current, output));
            }

            match self.repository.commit(draft) {
                Ok(stored) => return Ok((stored, output)),
                Err(RepositoryError::StaleRevision { .. }) if attempt < COMMIT_ATTEMPTS => {
                    debug!(household = %id, attempt, "retrying stale household commit");
                    attempt += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn edit_catalog<T, F>(&self, edit: F) -> Result<T, EnrollmentServiceError>
    where
        F: FnOnce(&mut ProgramCatalog) -> Result<T, CatalogError>,
    {
        let mut guard = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = ProgramCatalog::clone(&guard);
        let output = edit(&mut next)?;
        *guard = Arc::new(next);
        Ok(output)
    }

    fn resync_program(
        &self,
        program: &ProgramId,
        now: DateTime<Utc>,
    ) -> Result<ProgramResyncCounts, EnrollmentServiceError> {
        let catalog = self.catalog();
        let entry = catalog
            .program(program)
            .ok_or_else(|| CatalogError::UnknownProgram(program.0.clone()))?;

        let mut counts = ProgramResyncCounts::default();
        for household in self.repository.list()? {
            if household.is_archived || household.last_completed_at.is_none() {
                continue;
            }

            let (_, action) = self.update(&household.id, |record, catalog| {
                let snapshot = HouseholdSnapshot::from_record(record, catalog);
                let action = reconcile::resync_program(
                    entry,
                    &snapshot,
                    record.enrollment(program),
                    now,
                );
                match &action {
                    ProgramResync::Apply(enrollment) => record.enrollments.push(enrollment.clone()),
                    ProgramResync::Remove => record
                        .enrollments
                        .retain(|enrollment| &enrollment.program != program),
                    ProgramResync::IgnoreEnrolled | ProgramResync::Unchanged => {}
                }
                Ok(action)
            })?;

            match action {
                ProgramResync::Apply(_) => counts.applied += 1,
                ProgramResync::Remove => counts.removed += 1,
                ProgramResync::IgnoreEnrolled => counts.ignored += 1,
                ProgramResync::Unchanged => {}
            }
        }

        info!(
            program = %program.0,
            applied = counts.applied,
            removed = counts.removed,
            ignored = counts.ignored,
            "program households resynchronized"
        );
        Ok(counts)
    }
}

fn ensure_complete(record: &HouseholdRecord) -> Result<(), EnrollmentServiceError> {
    match record.next_step() {
        ApplicationStep::Dashboard => Ok(()),
        next_step => Err(EnrollmentServiceError::IncompleteApplication { next_step }),
    }
}

fn reconcile_record(
    record: &mut HouseholdRecord,
    catalog: &ProgramCatalog,
    mode: ReconcileMode,
    now: DateTime<Utc>,
) -> Result<ReconciliationPlan, EnrollmentServiceError> {
    let snapshot = HouseholdSnapshot::from_record(record, catalog);
    let plan = reconcile::plan(catalog, &snapshot, &record.enrollments, mode, now).map_err(
        |conflict| {
            warn!(household = %record.id, %conflict, "reconciliation blocked");
            conflict
        },
    )?;
    for enrollment in &plan.create {
        debug!(household = %record.id, program = %enrollment.program.0, "auto-applied");
    }
    plan.apply_to(&mut record.enrollments);
    Ok(plan)
}

/// Error raised by the enrollment service.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentServiceError {
    #[error(transparent)]
    Conflict(#[from] EnrollmentConflict),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    AddressValidation(#[from] AddressValidationError),
    #[error("household {0} not found")]
    HouseholdNotFound(HouseholdId),
    #[error("application is incomplete; next step is {}", .next_step.label())]
    IncompleteApplication { next_step: ApplicationStep },
    #[error("household has not completed an application")]
    NotFinalized,
    #[error("a renewal is in progress")]
    RenewalInProgress,
    #[error("no renewal is in progress")]
    NoRenewalInProgress,
    #[error("household is not eligible for '{program}'")]
    NotEligible {
        program: String,
        reasons: Vec<IneligibilityReason>,
    },
    #[error("household already applied to '{0}'")]
    AlreadyApplied(String),
    #[error("household has no application for '{0}'")]
    EnrollmentNotFound(String),
    #[error("{0}")]
    Validation(String),
}
