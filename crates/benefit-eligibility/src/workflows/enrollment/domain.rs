use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for registered households.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HouseholdId(pub String);

impl fmt::Display for HouseholdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Program reference name within the platform (lowercase, no spaces).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub String);

/// Reference name of an eligibility document category (e.g. SNAP, Medicaid).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EligibilityCategoryId(pub String);

/// Service-area attributes reported by address validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressAttribute {
    IsInGma,
    IsCityCovered,
    HasConnexion,
}

impl AddressAttribute {
    pub const ALL: [AddressAttribute; 3] = [
        AddressAttribute::IsInGma,
        AddressAttribute::IsCityCovered,
        AddressAttribute::HasConnexion,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            AddressAttribute::IsInGma => "is_in_gma",
            AddressAttribute::IsCityCovered => "is_city_covered",
            AddressAttribute::HasConnexion => "has_connexion",
        }
    }
}

/// Address attributes a program requires. A `false` flag places no restriction
/// on the corresponding attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddressRequirements {
    #[serde(default)]
    pub requires_is_in_gma: bool,
    #[serde(default)]
    pub requires_is_city_covered: bool,
    #[serde(default)]
    pub requires_has_connexion: bool,
}

impl AddressRequirements {
    pub fn requires(&self, attribute: AddressAttribute) -> bool {
        match attribute {
            AddressAttribute::IsInGma => self.requires_is_in_gma,
            AddressAttribute::IsCityCovered => self.requires_is_city_covered,
            AddressAttribute::HasConnexion => self.requires_has_connexion,
        }
    }

    pub fn required(&self) -> impl Iterator<Item = AddressAttribute> + '_ {
        AddressAttribute::ALL
            .into_iter()
            .filter(move |attribute| self.requires(*attribute))
    }

    pub fn is_empty(&self) -> bool {
        self.required().next().is_none()
    }
}

/// Tri-state address attributes; `None` means the attribute is not known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddressAttributes {
    pub is_in_gma: Option<bool>,
    pub is_city_covered: Option<bool>,
    pub has_connexion: Option<bool>,
}

impl AddressAttributes {
    pub const fn unknown() -> Self {
        Self {
            is_in_gma: None,
            is_city_covered: None,
            has_connexion: None,
        }
    }

    pub fn get(&self, attribute: AddressAttribute) -> Option<bool> {
        match attribute {
            AddressAttribute::IsInGma => self.is_in_gma,
            AddressAttribute::IsCityCovered => self.is_city_covered,
            AddressAttribute::HasConnexion => self.has_connexion,
        }
    }

    /// Only an explicit `true` satisfies a requirement.
    pub fn satisfies(&self, attribute: AddressAttribute) -> bool {
        self.get(attribute) == Some(true)
    }
}

/// Address as entered by the household.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAddress {
    pub address1: String,
    #[serde(default)]
    pub address2: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

/// The household's eligibility address along with its validation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityAddress {
    pub components: RawAddress,
    pub attributes: AddressAttributes,
    pub is_verified: bool,
}

impl EligibilityAddress {
    /// Attributes usable for eligibility; an unverified address reports nothing.
    pub fn known_attributes(&self) -> AddressAttributes {
        if self.is_verified {
            self.attributes
        } else {
            AddressAttributes::unknown()
        }
    }
}

/// Renewal cadence in whole years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenewalInterval(pub u32);

impl RenewalInterval {
    pub const fn years(self) -> u32 {
        self.0
    }

    pub fn after(self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        instant.checked_add_months(Months::new(self.0.saturating_mul(12)))
    }
}

/// Catalog entry for an income-qualified benefit program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IqProgram {
    pub id: ProgramId,
    pub friendly_name: String,
    #[serde(default)]
    pub friendly_category: String,
    #[serde(default)]
    pub friendly_description: String,
    #[serde(default)]
    pub friendly_supplemental_info: String,
    #[serde(default)]
    pub learn_more_link: String,
    #[serde(default)]
    pub friendly_eligibility_review_period: String,
    pub ami_threshold: Decimal,
    #[serde(flatten)]
    pub requirements: AddressRequirements,
    pub is_active: bool,
    #[serde(default)]
    pub renewal_interval: Option<RenewalInterval>,
    #[serde(default)]
    pub enable_autoapply: bool,
}

impl IqProgram {
    pub fn is_lifetime(&self) -> bool {
        self.renewal_interval.is_none()
    }
}

/// Proof-of-eligibility document category and the income ceiling it implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityCategory {
    pub id: EligibilityCategoryId,
    pub friendly_name: String,
    pub ami_threshold: Decimal,
    pub is_active: bool,
}

/// A document category selected by the household and its upload, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityDocument {
    pub category: EligibilityCategoryId,
    #[serde(default)]
    pub document_path: Option<String>,
}

impl EligibilityDocument {
    pub fn selected(category: EligibilityCategoryId) -> Self {
        Self {
            category,
            document_path: None,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.document_path
            .as_deref()
            .map(|path| !path.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdMember {
    pub name: String,
    pub birthdate: NaiveDate,
    #[serde(default)]
    pub identification_path: Option<String>,
}

impl HouseholdMember {
    pub fn has_identification(&self) -> bool {
        self.identification_path
            .as_deref()
            .map(|path| !path.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tenure {
    Rent,
    Own,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdProfile {
    pub persons_in_household: u8,
    pub tenure: Tenure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// A household's application to (and possibly enrollment in) one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub program: ProgramId,
    pub applied_at: DateTime<Utc>,
    pub enrolled_at: Option<DateTime<Utc>>,
    pub is_enrolled: bool,
}

impl Enrollment {
    pub fn pending(program: ProgramId, applied_at: DateTime<Utc>) -> Self {
        Self {
            program,
            applied_at,
            enrolled_at: None,
            is_enrolled: false,
        }
    }
}

/// Lifecycle status shown to a household for one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Available,
    Pending,
    Active,
    Renewal,
}

impl EnrollmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EnrollmentStatus::Available => "",
            EnrollmentStatus::Pending => "PENDING",
            EnrollmentStatus::Active => "ACTIVE",
            EnrollmentStatus::Renewal => "RENEWAL",
        }
    }

    pub const fn button_text(self) -> &'static str {
        match self {
            EnrollmentStatus::Available => "Apply Now",
            EnrollmentStatus::Pending => "Applied",
            EnrollmentStatus::Active => "Enrolled!",
            EnrollmentStatus::Renewal => "Renew",
        }
    }
}

/// A program presented to a household: either available to apply for, or
/// already applied for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EligibilityResult {
    Eligible(IqProgram),
    Applied {
        program: IqProgram,
        enrollment: Enrollment,
    },
}

impl EligibilityResult {
    pub fn program(&self) -> &IqProgram {
        match self {
            EligibilityResult::Eligible(program) => program,
            EligibilityResult::Applied { program, .. } => program,
        }
    }

    /// Pending applications are never shown as due for renewal, and lifetime
    /// programs never renew.
    pub fn status(&self, needs_renewal: bool) -> EnrollmentStatus {
        match self {
            EligibilityResult::Eligible(_) => EnrollmentStatus::Available,
            EligibilityResult::Applied { enrollment, .. } if !enrollment.is_enrolled => {
                EnrollmentStatus::Pending
            }
            EligibilityResult::Applied { program, .. }
                if needs_renewal && !program.is_lifetime() =>
            {
                EnrollmentStatus::Renewal
            }
            EligibilityResult::Applied { .. } => EnrollmentStatus::Active,
        }
    }
}

/// Pages of the application wizard, in the order they must be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStep {
    Address,
    Household,
    HouseholdMembers,
    Programs,
    Files,
    Dashboard,
}

impl ApplicationStep {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStep::Address => "address",
            ApplicationStep::Household => "household",
            ApplicationStep::HouseholdMembers => "household_members",
            ApplicationStep::Programs => "programs",
            ApplicationStep::Files => "files",
            ApplicationStep::Dashboard => "dashboard",
        }
    }

    /// Steps a household re-submits during a renewal.
    pub const RENEWAL_STEPS: [ApplicationStep; 5] = [
        ApplicationStep::Address,
        ApplicationStep::Household,
        ApplicationStep::HouseholdMembers,
        ApplicationStep::Programs,
        ApplicationStep::Files,
    ];
}

/// Steps completed during an in-progress renewal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenewalProgress {
    pub completed: BTreeSet<ApplicationStep>,
}

impl RenewalProgress {
    pub fn record(&mut self, step: ApplicationStep) {
        self.completed.insert(step);
    }

    /// First renewal step not yet completed; `None` once all are done.
    pub fn next_step(&self) -> Option<ApplicationStep> {
        ApplicationStep::RENEWAL_STEPS
            .into_iter()
            .find(|step| !self.completed.contains(step))
    }
}

/// Persisted aggregate for one household.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdRecord {
    pub id: HouseholdId,
    pub contact: ContactInfo,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub address: Option<EligibilityAddress>,
    #[serde(default)]
    pub profile: Option<HouseholdProfile>,
    #[serde(default)]
    pub members: Vec<HouseholdMember>,
    #[serde(default)]
    pub documents: Vec<EligibilityDocument>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
    #[serde(default)]
    pub is_income_verified: bool,
    #[serde(default)]
    pub awaiting_user_response: bool,
    #[serde(default)]
    pub last_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_action_notification_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub renewal_progress: Option<RenewalProgress>,
    /// Incremented by the repository on every commit.
    #[serde(default)]
    pub revision: u64,
}

impl HouseholdRecord {
    pub fn new(id: HouseholdId, contact: ContactInfo) -> Self {
        Self {
            id,
            contact,
            is_archived: false,
            address: None,
            profile: None,
            members: Vec::new(),
            documents: Vec::new(),
            enrollments: Vec::new(),
            is_income_verified: false,
            awaiting_user_response: false,
            last_completed_at: None,
            last_action_notification_at: None,
            renewal_progress: None,
            revision: 0,
        }
    }

    pub fn enrollment(&self, program: &ProgramId) -> Option<&Enrollment> {
        self.enrollments
            .iter()
            .find(|enrollment| &enrollment.program == program)
    }

    pub fn enrollment_mut(&mut self, program: &ProgramId) -> Option<&mut Enrollment> {
        self.enrollments
            .iter_mut()
            .find(|enrollment| &enrollment.program == program)
    }

    pub fn has_pending_uploads(&self) -> bool {
        self.documents.iter().any(|document| !document.is_uploaded())
    }

    /// Next wizard page the household must complete.
    pub fn next_step(&self) -> ApplicationStep {
        if self.address.is_none() {
            ApplicationStep::Address
        } else if self.profile.is_none() {
            ApplicationStep::Household
        } else if self.members.is_empty() {
            ApplicationStep::HouseholdMembers
        } else if self.documents.is_empty() {
            ApplicationStep::Programs
        } else if self.has_pending_uploads() {
            ApplicationStep::Files
        } else {
            ApplicationStep::Dashboard
        }
    }
}
