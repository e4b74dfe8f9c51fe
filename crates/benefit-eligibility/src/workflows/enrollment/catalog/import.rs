use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use super::{CatalogError, ProgramCatalog};
use crate::workflows::enrollment::domain::{
    AddressRequirements, EligibilityCategory, EligibilityCategoryId, IqProgram, ProgramId,
    RenewalInterval,
};

#[derive(Debug, thiserror::Error)]
pub enum CatalogImportError {
    #[error("failed to read catalog export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: invalid {field} value '{value}'")]
    InvalidField {
        line: u64,
        field: &'static str,
        value: String,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Builds a [`ProgramCatalog`] from the reference-table CSV exports.
pub struct CatalogImporter;

impl CatalogImporter {
    pub fn from_paths<P: AsRef<Path>, Q: AsRef<Path>>(
        programs: P,
        categories: Q,
    ) -> Result<ProgramCatalog, CatalogImportError> {
        let programs = std::fs::File::open(programs)?;
        let categories = std::fs::File::open(categories)?;
        Self::from_readers(programs, categories)
    }

    pub fn from_readers<R: Read, S: Read>(
        programs: R,
        categories: S,
    ) -> Result<ProgramCatalog, CatalogImportError> {
        let mut catalog = ProgramCatalog::new();
        for program in parse_programs(programs)? {
            catalog.insert_program(program)?;
        }
        for category in parse_categories(categories)? {
            catalog.insert_category(category)?;
        }
        Ok(catalog)
    }
}

#[derive(Debug, Deserialize)]
struct ProgramRow {
    program_name: String,
    friendly_name: String,
    #[serde(default)]
    friendly_category: String,
    #[serde(default)]
    friendly_description: String,
    #[serde(default)]
    friendly_supplemental_info: String,
    #[serde(default)]
    learn_more_link: String,
    #[serde(default)]
    friendly_eligibility_review_period: String,
    ami_threshold: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    is_active: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    enable_autoapply: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    requires_is_in_gma: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    requires_is_city_covered: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    requires_has_connexion: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    renewal_interval_year: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryRow {
    program_name: String,
    friendly_name: String,
    ami_threshold: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    is_active: Option<String>,
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn parse_programs<R: Read>(reader: R) -> Result<Vec<IqProgram>, CatalogImportError> {
    let mut programs = Vec::new();
    let mut reader = csv_reader(reader);
    let headers = reader.headers()?.clone();
    for record in reader.records() {
        let record = record?;
        let line = file_line(&record);
        let row: ProgramRow = record.deserialize(Some(&headers))?;

        let renewal_interval = match row.renewal_interval_year.as_deref() {
            Some(raw) => Some(RenewalInterval(raw.parse::<u32>().map_err(|_| {
                CatalogImportError::InvalidField {
                    line,
                    field: "renewal_interval_year",
                    value: raw.to_string(),
                }
            })?)),
            None => None,
        };

        programs.push(IqProgram {
            id: ProgramId(row.program_name),
            friendly_name: row.friendly_name,
            friendly_category: row.friendly_category,
            friendly_description: row.friendly_description,
            friendly_supplemental_info: row.friendly_supplemental_info,
            learn_more_link: row.learn_more_link,
            friendly_eligibility_review_period: row.friendly_eligibility_review_period,
            ami_threshold: parse_decimal(line, &row.ami_threshold)?,
            requirements: AddressRequirements {
                requires_is_in_gma: parse_flag(line, "requires_is_in_gma", row.requires_is_in_gma, false)?,
                requires_is_city_covered: parse_flag(
                    line,
                    "requires_is_city_covered",
                    row.requires_is_city_covered,
                    false,
                )?,
                requires_has_connexion: parse_flag(
                    line,
                    "requires_has_connexion",
                    row.requires_has_connexion,
                    false,
                )?,
            },
            is_active: parse_flag(line, "is_active", row.is_active, true)?,
            renewal_interval,
            enable_autoapply: parse_flag(line, "enable_autoapply", row.enable_autoapply, false)?,
        });
    }
    Ok(programs)
}

fn parse_categories<R: Read>(reader: R) -> Result<Vec<EligibilityCategory>, CatalogImportError> {
    let mut categories = Vec::new();
    let mut reader = csv_reader(reader);
    let headers = reader.headers()?.clone();
    for record in reader.records() {
        let record = record?;
        let line = file_line(&record);
        let row: CategoryRow = record.deserialize(Some(&headers))?;
        categories.push(EligibilityCategory {
            id: EligibilityCategoryId(row.program_name),
            friendly_name: row.friendly_name,
            ami_threshold: parse_decimal(line, &row.ami_threshold)?,
            is_active: parse_flag(line, "is_active", row.is_active, true)?,
        });
    }
    Ok(categories)
}

/// Line in the export where the record starts; the header is line 1.
fn file_line(record: &csv::StringRecord) -> u64 {
    record.position().map(csv::Position::line).unwrap_or_default()
}

fn parse_decimal(line: u64, raw: &str) -> Result<Decimal, CatalogImportError> {
    Decimal::from_str(raw.trim()).map_err(|_| CatalogImportError::InvalidField {
        line,
        field: "ami_threshold",
        value: raw.to_string(),
    })
}

fn parse_flag(
    line: u64,
    field: &'static str,
    raw: Option<String>,
    default: bool,
) -> Result<bool, CatalogImportError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "1" => Ok(true),
        "false" | "f" | "no" | "0" => Ok(false),
        _ => Err(CatalogImportError::InvalidField {
            line,
            field,
            value: raw,
        }),
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
