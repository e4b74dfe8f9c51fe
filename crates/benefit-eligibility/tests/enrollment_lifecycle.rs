use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use benefit_eligibility::workflows::enrollment::{
    AddressLookup, AddressValidationError, AddressValidator, ApplicationStep, CatalogImporter,
    ContactInfo, EligibilityCategoryId, EnrollmentService, EnrollmentStatus, HouseholdId,
    HouseholdMember, HouseholdProfile, HouseholdRecord, HouseholdRepository, Notifier,
    NotifyError, ProgramCatalog, ProgramId, RawAddress, RenewalNotice, RenewalPolicy,
    RepositoryError, Tenure, ValidatedAddress, VerificationQueue,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

const PROGRAMS: &str = "program_name,friendly_name,ami_threshold,is_active,enable_autoapply,requires_is_in_gma,requires_is_city_covered,requires_has_connexion,renewal_interval_year\n\
grocery,Grocery Rebate,0.60,true,true,true,false,false,1\n\
connexion,Reduced-Rate Connexion,0.60,true,false,true,false,true,1\n\
recreation,Recreation Reduced Fee,0.30,true,true,false,true,false,2\n\
spin,Spin E-Bike Discount,0.30,true,true,true,false,false,\n";

const CATEGORIES: &str = "program_name,friendly_name,ami_threshold,is_active\n\
snap,SNAP,0.30,true\n\
medicaid,Medicaid,0.60,true\n\
ebb,Emergency Broadband Benefit,0.70,false\n";

#[derive(Default)]
struct InMemoryHouseholds {
    records: Mutex<HashMap<HouseholdId, HouseholdRecord>>,
}

impl HouseholdRepository for InMemoryHouseholds {
    fn insert(&self, record: HouseholdRecord) -> Result<HouseholdRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("households mutex");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &HouseholdId) -> Result<Option<HouseholdRecord>, RepositoryError> {
        Ok(self.records.lock().expect("households mutex").get(id).cloned())
    }

    fn list(&self) -> Result<Vec<HouseholdRecord>, RepositoryError> {
        let guard = self.records.lock().expect("households mutex");
        let mut records: Vec<HouseholdRecord> = guard.values().cloned().collect();
        records.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(records)
    }

    fn commit(&self, mut record: HouseholdRecord) -> Result<HouseholdRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("households mutex");
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

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<RenewalNotice>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: RenewalNotice) -> Result<(), NotifyError> {
        self.sent.lock().expect("notifier mutex").push(notice);
        Ok(())
    }
}

struct ServiceAreaValidator;

impl AddressValidator for ServiceAreaValidator {
    fn validate(&self, address: &RawAddress) -> Result<AddressLookup, AddressValidationError> {
        Ok(AddressLookup::Found(ValidatedAddress {
            components: address.clone(),
            is_in_gma: address.zip_code.starts_with("805"),
            has_connexion: Some(true),
        }))
    }
}

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

fn import_catalog() -> ProgramCatalog {
    CatalogImporter::from_readers(
        Cursor::new(PROGRAMS.as_bytes()),
        Cursor::new(CATEGORIES.as_bytes()),
    )
    .expect("catalog imports")
}

fn build() -> (
    EnrollmentService<InMemoryHouseholds, RecordingNotifier, ServiceAreaValidator>,
    Arc<RecordingNotifier>,
) {
    let notifier = Arc::new(RecordingNotifier::default());
    let service = EnrollmentService::new(
        Arc::new(InMemoryHouseholds::default()),
        notifier.clone(),
        Arc::new(ServiceAreaValidator),
        import_catalog(),
        RenewalPolicy::default(),
    );
    (service, notifier)
}

fn apply(
    service: &EnrollmentService<InMemoryHouseholds, RecordingNotifier, ServiceAreaValidator>,
    zip_code: &str,
    document: &str,
) -> HouseholdId {
    let id = service
        .register(ContactInfo {
            email: "applicant@example.org".to_string(),
            phone: None,
        })
        .expect("registered")
        .id;
    service
        .record_address(
            &id,
            RawAddress {
                address1: "215 N Mason St".to_string(),
                address2: String::new(),
                city: "Fort Collins".to_string(),
                state: "CO".to_string(),
                zip_code: zip_code.to_string(),
            },
        )
        .expect("address recorded");
    service
        .record_profile(
            &id,
            HouseholdProfile {
                persons_in_household: 2,
                tenure: Tenure::Own,
            },
        )
        .expect("profile recorded");
    service
        .record_members(
            &id,
            vec![
                HouseholdMember {
                    name: "Sam Ortiz".to_string(),
                    birthdate: NaiveDate::from_ymd_opt(1979, 8, 14).expect("valid date"),
                    identification_path: Some("ids/sam.pdf".to_string()),
                },
                HouseholdMember {
                    name: "Jo Ortiz".to_string(),
                    birthdate: NaiveDate::from_ymd_opt(2012, 1, 3).expect("valid date"),
                    identification_path: Some("ids/jo.pdf".to_string()),
                },
            ],
        )
        .expect("members recorded");
    let category = EligibilityCategoryId(document.to_string());
    service
        .select_documents(&id, vec![category.clone()])
        .expect("documents selected");
    service
        .record_upload(&id, &category, format!("uploads/{document}.pdf"))
        .expect("document uploaded");
    id
}

#[test]
fn household_moves_from_application_through_renewal() {
    let (service, notifier) = build();
    let id = apply(&service, "80521", "snap");

    let finalized = service
        .finalize_application(&id, at(2024, 2, 10))
        .expect("application finalized");
    let mut created: Vec<&str> = finalized
        .plan
        .create
        .iter()
        .map(|enrollment| enrollment.program.0.as_str())
        .collect();
    created.sort();
    assert_eq!(created, vec!["grocery", "recreation", "spin"]);

    service
        .quick_apply(&id, &ProgramId("connexion".to_string()), at(2024, 2, 11))
        .expect("manual application");
    service
        .mark_enrolled(&id, &ProgramId("grocery".to_string()), at(2024, 2, 20))
        .expect("grocery enrolled");
    service
        .mark_enrolled(&id, &ProgramId("spin".to_string()), at(2024, 2, 20))
        .expect("spin enrolled");

    let queued = service
        .verification_queue(VerificationQueue::New)
        .expect("queue loads");
    assert_eq!(queued.len(), 1);
    service.verify_income(&id, true).expect("income verified");

    let early = service.dashboard(&id, at(2024, 12, 1)).expect("dashboard");
    assert!(!early.needs_renewal);

    let due = service.dashboard(&id, at(2025, 2, 11)).expect("dashboard");
    assert!(due.needs_renewal);
    let grocery = due
        .programs
        .iter()
        .find(|card| card.result.program().id.0 == "grocery")
        .expect("grocery card");
    assert_eq!(grocery.status, EnrollmentStatus::Renewal);

    let sweep = service.sweep_renewals(at(2025, 2, 11)).expect("sweep");
    assert_eq!(sweep.notified, vec![id.clone()]);
    let repeat = service.sweep_renewals(at(2025, 2, 25)).expect("sweep");
    assert_eq!(repeat.buffered, 1);
    assert_eq!(notifier.sent.lock().expect("notifier mutex").len(), 1);

    for step in ApplicationStep::RENEWAL_STEPS {
        service
            .record_renewal_step(&id, step)
            .expect("renewal step recorded");
    }
    let renewed = service
        .renew_application(&id, at(2025, 2, 26))
        .expect("renewal completes");

    assert_eq!(
        renewed.summary.renewal_eligible,
        vec![
            "Grocery Rebate".to_string(),
            "Recreation Reduced Fee".to_string(),
            "Reduced-Rate Connexion".to_string(),
        ]
    );
    assert!(renewed.summary.renewal_ineligible.is_empty());
    assert_eq!(renewed.household.last_completed_at, Some(at(2025, 2, 26)));
    assert!(!renewed.household.is_income_verified);
    let spin = renewed
        .household
        .enrollment(&ProgramId("spin".to_string()))
        .expect("lifetime enrollment kept");
    assert!(spin.is_enrolled);
    let grocery = renewed
        .household
        .enrollment(&ProgramId("grocery".to_string()))
        .expect("grocery re-applied");
    assert!(!grocery.is_enrolled);

    let after = service.dashboard(&id, at(2025, 3, 1)).expect("dashboard");
    assert!(!after.needs_renewal);
    assert_eq!(
        service
            .verification_queue(VerificationQueue::New)
            .expect("queue loads")
            .len(),
        1
    );
}

#[test]
fn household_outside_service_area_sees_no_programs() {
    let (service, _) = build();
    let id = apply(&service, "80601", "snap");

    let outcome = service
        .finalize_application(&id, at(2024, 5, 1))
        .expect("application finalized");
    assert!(outcome.plan.create.is_empty());

    let view = service.dashboard(&id, at(2024, 5, 2)).expect("dashboard");
    assert!(view.programs.is_empty());
}

#[test]
fn inactive_document_category_cannot_be_selected() {
    let (service, _) = build();
    let id = service
        .register(ContactInfo {
            email: "applicant@example.org".to_string(),
            phone: None,
        })
        .expect("registered")
        .id;

    let result = service.select_documents(&id, vec![EligibilityCategoryId("ebb".to_string())]);

    assert!(result.is_err());
}
