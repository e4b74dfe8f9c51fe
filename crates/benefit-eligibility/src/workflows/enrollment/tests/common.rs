use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::workflows::enrollment::catalog::ProgramCatalog;
use crate::workflows::enrollment::domain::{
    AddressAttributes, AddressRequirements, ContactInfo, EligibilityCategory,
    EligibilityCategoryId, Enrollment, HouseholdId, HouseholdMember, HouseholdProfile,
    HouseholdRecord, IqProgram, ProgramId, RawAddress, RenewalInterval, Tenure,
};
use crate::workflows::enrollment::renewal::RenewalPolicy;
use crate::workflows::enrollment::repository::{
    AddressLookup, AddressValidationError, AddressValidator, HouseholdRepository, Notifier,
    NotifyError, RenewalNotice, RepositoryError, ValidatedAddress,
};
use crate::workflows::enrollment::snapshot::HouseholdSnapshot;
use crate::workflows::enrollment::{enrollment_router, EnrollmentService};

pub(super) type TestService = EnrollmentService<MemoryRepository, MemoryNotifier, StaticAddressValidator>;

pub(super) fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn ratio(raw: &str) -> Decimal {
    Decimal::from_str(raw).expect("valid decimal")
}

pub(super) fn gma_only() -> AddressRequirements {
    AddressRequirements {
        requires_is_in_gma: true,
        ..AddressRequirements::default()
    }
}

pub(super) fn program(
    name: &str,
    threshold: &str,
    requirements: AddressRequirements,
    autoapply: bool,
    renewal_years: Option<u32>,
) -> IqProgram {
    IqProgram {
        id: ProgramId(name.to_string()),
        friendly_name: friendly(name),
        friendly_category: "Utilities".to_string(),
        friendly_description: format!("{name} discount"),
        friendly_supplemental_info: String::new(),
        learn_more_link: format!("https://example.org/programs/{name}"),
        friendly_eligibility_review_period: "Estimated review: 2 weeks".to_string(),
        ami_threshold: ratio(threshold),
        requirements,
        is_active: true,
        renewal_interval: renewal_years.map(RenewalInterval),
        enable_autoapply: autoapply,
    }
}

fn friendly(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(super) fn category(name: &str, threshold: &str) -> EligibilityCategory {
    EligibilityCategory {
        id: EligibilityCategoryId(name.to_string()),
        friendly_name: friendly(name),
        ami_threshold: ratio(threshold),
        is_active: true,
    }
}

/// Catalog used across the service tests:
/// - `grocery`: 0.6, in GMA, auto-apply, yearly renewal
/// - `connexion`: 0.6, in GMA and Connexion, manual apply, yearly renewal
/// - `recreation`: 0.3, city covered, auto-apply, two-year renewal
/// - `spin`: 0.3, in GMA, auto-apply, lifetime
pub(super) fn catalog() -> ProgramCatalog {
    ProgramCatalog::with_entries(
        vec![
            program("grocery", "0.60", gma_only(), true, Some(1)),
            program(
                "connexion",
                "0.60",
                AddressRequirements {
                    requires_is_in_gma: true,
                    requires_has_connexion: true,
                    ..AddressRequirements::default()
                },
                false,
                Some(1),
            ),
            program(
                "recreation",
                "0.30",
                AddressRequirements {
                    requires_is_city_covered: true,
                    ..AddressRequirements::default()
                },
                true,
                Some(2),
            ),
            program("spin", "0.30", gma_only(), true, None),
        ],
        vec![
            category("snap", "0.30"),
            category("medicaid", "0.60"),
            category("ebb", "0.70"),
        ],
    )
    .expect("valid catalog")
}

pub(super) fn attributes(in_gma: bool, connexion: bool) -> AddressAttributes {
    AddressAttributes {
        is_in_gma: Some(in_gma),
        is_city_covered: Some(in_gma),
        has_connexion: Some(connexion),
    }
}

pub(super) fn snapshot(income_ratio: Option<&str>, attributes: AddressAttributes) -> HouseholdSnapshot {
    HouseholdSnapshot {
        household_id: HouseholdId("hh-test".to_string()),
        income_ratio: income_ratio.map(ratio),
        attributes,
    }
}

pub(super) fn pending(name: &str) -> Enrollment {
    Enrollment::pending(ProgramId(name.to_string()), at(2024, 1, 15))
}

pub(super) fn enrolled(name: &str) -> Enrollment {
    Enrollment {
        program: ProgramId(name.to_string()),
        applied_at: at(2024, 1, 15),
        enrolled_at: Some(at(2024, 2, 1)),
        is_enrolled: true,
    }
}

pub(super) fn pid(name: &str) -> ProgramId {
    ProgramId(name.to_string())
}

pub(super) fn contact() -> ContactInfo {
    ContactInfo {
        email: "resident@example.org".to_string(),
        phone: Some("970-555-0142".to_string()),
    }
}

pub(super) fn in_area_address() -> RawAddress {
    RawAddress {
        address1: "300 Laporte Ave".to_string(),
        address2: String::new(),
        city: "Fort Collins".to_string(),
        state: "CO".to_string(),
        zip_code: "80521".to_string(),
    }
}

pub(super) fn out_of_area_address() -> RawAddress {
    RawAddress {
        address1: "1 Main St".to_string(),
        address2: String::new(),
        city: "Loveland".to_string(),
        state: "CO".to_string(),
        zip_code: "80537".to_string(),
    }
}

pub(super) fn members() -> Vec<HouseholdMember> {
    vec![HouseholdMember {
        name: "Alex Rivera".to_string(),
        birthdate: NaiveDate::from_ymd_opt(1988, 4, 2).expect("valid date"),
        identification_path: Some("ids/alex.pdf".to_string()),
    }]
}

pub(super) fn profile() -> HouseholdProfile {
    HouseholdProfile {
        persons_in_household: 1,
        tenure: Tenure::Rent,
    }
}

pub(super) fn record_with(
    id: &str,
    completed_at: Option<DateTime<Utc>>,
    enrollments: Vec<Enrollment>,
) -> HouseholdRecord {
    let mut record = HouseholdRecord::new(HouseholdId(id.to_string()), contact());
    record.last_completed_at = completed_at;
    record.enrollments = enrollments;
    record.members = members();
    record
}

pub(super) fn build_service() -> (TestService, Arc<MemoryRepository>, Arc<MemoryNotifier>) {
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let service = EnrollmentService::new(
        repository.clone(),
        notifier.clone(),
        Arc::new(StaticAddressValidator::default()),
        catalog(),
        RenewalPolicy::default(),
    );
    (service, repository, notifier)
}

/// Walk a household through every wizard page with the given documents
/// uploaded, leaving it ready to finalize.
pub(super) fn prepared_household(
    service: &TestService,
    address: RawAddress,
    documents: &[&str],
) -> HouseholdId {
    let household = service.register(contact()).expect("register household");
    let id = household.id;
    service
        .record_address(&id, address)
        .expect("record address");
    service.record_profile(&id, profile()).expect("record profile");
    service.record_members(&id, members()).expect("record members");
    service
        .select_documents(
            &id,
            documents
                .iter()
                .map(|name| EligibilityCategoryId(name.to_string()))
                .collect(),
        )
        .expect("select documents");
    for name in documents {
        service
            .record_upload(
                &id,
                &EligibilityCategoryId(name.to_string()),
                format!("{}/{name}.pdf", id.0),
            )
            .expect("record upload");
    }
    id
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<HouseholdId, HouseholdRecord>>>,
}

impl MemoryRepository {
    pub(super) fn get(&self, id: &HouseholdId) -> HouseholdRecord {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned()
            .expect("record present")
    }

    pub(super) fn put(&self, record: HouseholdRecord) {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .insert(record.id.clone(), record);
    }
}

impl HouseholdRepository for MemoryRepository {
    fn insert(&self, record: HouseholdRecord) -> Result<HouseholdRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &HouseholdId) -> Result<Option<HouseholdRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<HouseholdRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut records: Vec<HouseholdRecord> = guard.values().cloned().collect();
        records.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(records)
    }

    fn commit(&self, mut record: HouseholdRecord) -> Result<HouseholdRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let stored = guard.get(&record.id).ok_or(RepositoryError::NotFound)?;
        if stored.revision != record.revision {
            return Err(RepositoryError::StaleRevision {
                household: record.id.clone(),
                expected: record.revision,
                found: stored.revision,
            });
        }
        record.revision += 1;
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }
}

/// Bumps the stored revision the first `races` times a commit is attempted,
/// simulating a concurrent writer.
pub(super) struct RacingRepository {
    pub(super) inner: MemoryRepository,
    pub(super) races: AtomicUsize,
}

impl HouseholdRepository for RacingRepository {
    fn insert(&self, record: HouseholdRecord) -> Result<HouseholdRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn fetch(&self, id: &HouseholdId) -> Result<Option<HouseholdRecord>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<HouseholdRecord>, RepositoryError> {
        self.inner.list()
    }

    fn commit(&self, record: HouseholdRecord) -> Result<HouseholdRecord, RepositoryError> {
        if self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            let mut concurrent = self.inner.get(&record.id);
            concurrent.contact.phone = Some("970-555-0199".to_string());
            self.inner.commit(concurrent)?;
        }
        self.inner.commit(record)
    }
}

pub(super) struct UnavailableRepository;

impl HouseholdRepository for UnavailableRepository {
    fn insert(&self, _record: HouseholdRecord) -> Result<HouseholdRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &HouseholdId) -> Result<Option<HouseholdRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<HouseholdRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn commit(&self, _record: HouseholdRecord) -> Result<HouseholdRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    notices: Mutex<Vec<RenewalNotice>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub(super) fn notices(&self) -> Vec<RenewalNotice> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: RenewalNotice) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected(503));
        }
        self.notices
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

/// Resolves Fort Collins addresses inside the service area; everything else
/// is reported as not found.
#[derive(Default)]
pub(super) struct StaticAddressValidator;

impl AddressValidator for StaticAddressValidator {
    fn validate(&self, address: &RawAddress) -> Result<AddressLookup, AddressValidationError> {
        if !address.city.eq_ignore_ascii_case("fort collins") {
            return Ok(AddressLookup::NotFound);
        }
        Ok(AddressLookup::Found(ValidatedAddress {
            components: RawAddress {
                address1: address.address1.to_uppercase(),
                address2: address.address2.to_uppercase(),
                city: address.city.to_uppercase(),
                state: address.state.to_uppercase(),
                zip_code: address.zip_code.clone(),
            },
            is_in_gma: true,
            has_connexion: Some(true),
        }))
    }
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    enrollment_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
