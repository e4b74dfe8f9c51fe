use benefit_eligibility::error::AppError;
use benefit_eligibility::workflows::enrollment::{
    AddressLookup, AddressRequirements, AddressValidationError, AddressValidator,
    CatalogImporter, EligibilityCategory, EligibilityCategoryId, HouseholdId, HouseholdRecord,
    HouseholdRepository, IqProgram, Notifier, NotifyError, ProgramCatalog, ProgramId, RawAddress,
    RenewalInterval, RenewalNotice, RepositoryError, ValidatedAddress,
};
use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryHouseholdRepository {
    records: Arc<Mutex<HashMap<HouseholdId, HouseholdRecord>>>,
}

impl InMemoryHouseholdRepository {
    /// Seed the store with previously exported households, keeping their
    /// revisions.
    pub(crate) fn with_records(records: Vec<HouseholdRecord>) -> Self {
        let repository = Self::default();
        {
            let mut guard = repository.records.lock().expect("repository mutex poisoned");
            for record in records {
                guard.insert(record.id.clone(), record);
            }
        }
        repository
    }
}

impl HouseholdRepository for InMemoryHouseholdRepository {
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

/// Writes renewal notices to the log and keeps them for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier {
    sent: Arc<Mutex<Vec<RenewalNotice>>>,
}

impl LoggingNotifier {
    pub(crate) fn sent(&self) -> Vec<RenewalNotice> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for LoggingNotifier {
    fn notify(&self, notice: RenewalNotice) -> Result<(), NotifyError> {
        info!(
            household = %notice.household_id,
            template = %notice.template,
            recipient = %notice.recipient,
            "renewal notice dispatched"
        );
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

/// Resolves addresses by ZIP code against the service-area and Connexion
/// coverage lists. Malformed ZIP codes are reported as not found.
#[derive(Debug, Clone)]
pub(crate) struct ZipCodeAddressValidator {
    service_area: BTreeSet<String>,
    connexion_area: BTreeSet<String>,
}

impl Default for ZipCodeAddressValidator {
    fn default() -> Self {
        Self {
            service_area: ["80521", "80524", "80525", "80526", "80528"]
                .into_iter()
                .map(String::from)
                .collect(),
            connexion_area: ["80521", "80524", "80525"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl AddressValidator for ZipCodeAddressValidator {
    fn validate(&self, address: &RawAddress) -> Result<AddressLookup, AddressValidationError> {
        let zip_code: String = address.zip_code.trim().chars().take(5).collect();
        if zip_code.len() != 5 || !zip_code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(AddressLookup::NotFound);
        }

        let is_in_gma = self.service_area.contains(&zip_code);
        let has_connexion = is_in_gma.then(|| self.connexion_area.contains(&zip_code));
        Ok(AddressLookup::Found(ValidatedAddress {
            components: RawAddress {
                address1: address.address1.trim().to_uppercase(),
                address2: address.address2.trim().to_uppercase(),
                city: address.city.trim().to_uppercase(),
                state: address.state.trim().to_uppercase(),
                zip_code,
            },
            is_in_gma,
            has_connexion,
        }))
    }
}

/// Load the catalog from CSV exports when both paths are given, otherwise use
/// the built-in catalog.
pub(crate) fn load_catalog(
    programs_csv: Option<PathBuf>,
    categories_csv: Option<PathBuf>,
) -> Result<ProgramCatalog, AppError> {
    match (programs_csv, categories_csv) {
        (Some(programs), Some(categories)) => {
            let catalog = CatalogImporter::from_paths(&programs, &categories)?;
            info!(
                programs = %programs.display(),
                categories = %categories.display(),
                "catalog imported"
            );
            Ok(catalog)
        }
        _ => default_catalog(),
    }
}

pub(crate) fn default_catalog() -> Result<ProgramCatalog, AppError> {
    let in_gma = AddressRequirements {
        requires_is_in_gma: true,
        ..AddressRequirements::default()
    };
    let programs = vec![
        program(
            "grocery",
            "Grocery Tax Rebate",
            "Food",
            Decimal::new(60, 2),
            in_gma,
            Some(1),
            true,
        ),
        program(
            "connexion",
            "Reduced-Rate Connexion",
            "Internet",
            Decimal::new(60, 2),
            AddressRequirements {
                requires_is_in_gma: true,
                requires_has_connexion: true,
                ..AddressRequirements::default()
            },
            Some(1),
            false,
        ),
        program(
            "recreation",
            "Recreation Reduced Fee",
            "Recreation",
            Decimal::new(30, 2),
            AddressRequirements {
                requires_is_city_covered: true,
                ..AddressRequirements::default()
            },
            Some(2),
            true,
        ),
        program(
            "spin",
            "Spin E-Bike Discount",
            "Transportation",
            Decimal::new(30, 2),
            in_gma,
            None,
            true,
        ),
    ];
    let categories = vec![
        category("snap", "Supplemental Nutrition Assistance Program (SNAP)", 30),
        category("medicaid", "Medicaid", 60),
        category("chp", "Child Health Plan Plus (CHP+)", 60),
        category("ebb", "Emergency Broadband Benefit", 70),
    ];

    ProgramCatalog::with_entries(programs, categories).map_err(|err| AppError::Catalog(err.into()))
}

fn program(
    name: &str,
    friendly_name: &str,
    friendly_category: &str,
    ami_threshold: Decimal,
    requirements: AddressRequirements,
    renewal_years: Option<u32>,
    enable_autoapply: bool,
) -> IqProgram {
    IqProgram {
        id: ProgramId(name.to_string()),
        friendly_name: friendly_name.to_string(),
        friendly_category: friendly_category.to_string(),
        friendly_description: String::new(),
        friendly_supplemental_info: String::new(),
        learn_more_link: String::new(),
        friendly_eligibility_review_period: "Estimated Eligibility Review Time: 2 weeks"
            .to_string(),
        ami_threshold,
        requirements,
        is_active: true,
        renewal_interval: renewal_years.map(RenewalInterval),
        enable_autoapply,
    }
}

fn category(name: &str, friendly_name: &str, threshold_percent: i64) -> EligibilityCategory {
    EligibilityCategory {
        id: EligibilityCategoryId(name.to_string()),
        friendly_name: friendly_name.to_string(),
        ami_threshold: Decimal::new(threshold_percent, 2),
        is_active: true,
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Noon UTC on the given date, or the current instant.
pub(crate) fn instant(date: Option<NaiveDate>) -> DateTime<Utc> {
    date.and_then(|date| date.and_hms_opt(12, 0, 0))
        .map(|moment| moment.and_utc())
        .unwrap_or_else(Utc::now)
}
