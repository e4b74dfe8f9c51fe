mod import;

pub use import::{CatalogImportError, CatalogImporter};

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{
    EligibilityCategory, EligibilityCategoryId, IqProgram, ProgramId, RenewalInterval,
};

/// Configuration errors rejected when the catalog is edited.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("program name '{0}' must be lowercase with no spaces")]
    InvalidProgramName(String),
    #[error("ami threshold for '{name}' must be between 0 and 1 (found {threshold})")]
    ThresholdOutOfRange { name: String, threshold: Decimal },
    #[error("program '{0}' must require at least one address attribute")]
    MissingAddressRequirement(String),
    #[error("renewal interval for '{0}' must be at least one year")]
    InvalidRenewalInterval(String),
    #[error("'{0}' already exists in the catalog")]
    Duplicate(String),
    #[error("program '{0}' is not in the catalog")]
    UnknownProgram(String),
    #[error("program '{program}' has {households} enrolled household(s); deactivate it instead")]
    ProgramHasEnrollments { program: String, households: usize },
}

/// Reference data consulted by the evaluator: benefit programs and the
/// eligibility document categories that establish household income.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramCatalog {
    programs: BTreeMap<ProgramId, IqProgram>,
    categories: BTreeMap<EligibilityCategoryId, EligibilityCategory>,
}

impl ProgramCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(
        programs: impl IntoIterator<Item = IqProgram>,
        categories: impl IntoIterator<Item = EligibilityCategory>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for program in programs {
            catalog.insert_program(program)?;
        }
        for category in categories {
            catalog.insert_category(category)?;
        }
        Ok(catalog)
    }

    pub fn insert_program(&mut self, program: IqProgram) -> Result<(), CatalogError> {
        validate_program(&program)?;
        if self.programs.contains_key(&program.id) {
            return Err(CatalogError::Duplicate(program.id.0));
        }
        self.programs.insert(program.id.clone(), program);
        Ok(())
    }

    /// Replace an existing program definition.
    pub fn update_program(&mut self, program: IqProgram) -> Result<(), CatalogError> {
        validate_program(&program)?;
        match self.programs.get_mut(&program.id) {
            Some(existing) => {
                *existing = program;
                Ok(())
            }
            None => Err(CatalogError::UnknownProgram(program.id.0)),
        }
    }

    pub(crate) fn remove_program(&mut self, id: &ProgramId) -> Result<IqProgram, CatalogError> {
        self.programs
            .remove(id)
            .ok_or_else(|| CatalogError::UnknownProgram(id.0.clone()))
    }

    pub fn insert_category(&mut self, category: EligibilityCategory) -> Result<(), CatalogError> {
        check_threshold(&category.id.0, category.ami_threshold)?;
        if self.categories.contains_key(&category.id) {
            return Err(CatalogError::Duplicate(category.id.0));
        }
        self.categories.insert(category.id.clone(), category);
        Ok(())
    }

    pub fn program(&self, id: &ProgramId) -> Option<&IqProgram> {
        self.programs.get(id)
    }

    pub fn programs(&self) -> impl Iterator<Item = &IqProgram> {
        self.programs.values()
    }

    pub fn active_programs(&self) -> impl Iterator<Item = &IqProgram> {
        self.programs.values().filter(|program| program.is_active)
    }

    pub fn category(&self, id: &EligibilityCategoryId) -> Option<&EligibilityCategory> {
        self.categories.get(id)
    }

    pub fn categories(&self) -> impl Iterator<Item = &EligibilityCategory> {
        self.categories.values()
    }

    /// Shortest renewal cadence among active, non-lifetime programs. `None`
    /// when every active program is lifetime, in which case nobody renews.
    pub fn shortest_renewal_interval(&self) -> Option<RenewalInterval> {
        self.active_programs()
            .filter_map(|program| program.renewal_interval)
            .min()
    }
}

pub fn validate_program(program: &IqProgram) -> Result<(), CatalogError> {
    let name = &program.id.0;
    if name.is_empty()
        || name.chars().any(|c| c.is_whitespace() || c.is_uppercase())
    {
        return Err(CatalogError::InvalidProgramName(name.clone()));
    }

    check_threshold(name, program.ami_threshold)?;

    if program.requirements.is_empty() {
        return Err(CatalogError::MissingAddressRequirement(name.clone()));
    }

    if matches!(program.renewal_interval, Some(RenewalInterval(0))) {
        return Err(CatalogError::InvalidRenewalInterval(name.clone()));
    }

    Ok(())
}

fn check_threshold(name: &str, threshold: Decimal) -> Result<(), CatalogError> {
    if threshold < Decimal::ZERO || threshold > Decimal::ONE {
        return Err(CatalogError::ThresholdOutOfRange {
            name: name.to_string(),
            threshold,
        });
    }
    Ok(())
}
