use crate::cli::CatalogArgs;
use crate::infra::{
    instant, load_catalog, InMemoryHouseholdRepository, LoggingNotifier, ZipCodeAddressValidator,
};
use benefit_eligibility::config::AppConfig;
use benefit_eligibility::error::AppError;
use benefit_eligibility::workflows::enrollment::{
    ApplicationStep, ContactInfo, DashboardView, EligibilityCategoryId, EnrollmentService,
    EnrollmentServiceError, HouseholdMember, HouseholdProfile, HouseholdRecord,
    HouseholdRepository, RawAddress, RenewalPolicy, SweepReport, Tenure, VerificationQueue,
};
use chrono::{Duration, NaiveDate};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

type DemoService =
    EnrollmentService<InMemoryHouseholdRepository, LoggingNotifier, ZipCodeAddressValidator>;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Application date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// ZIP code of the sample household's address
    #[arg(long, default_value = "80521")]
    pub(crate) zip_code: String,
    /// Eligibility document category the household uploads
    #[arg(long, default_value = "snap")]
    pub(crate) document: String,
    #[command(flatten)]
    pub(crate) catalog: CatalogArgs,
}

#[derive(Args, Debug)]
pub(crate) struct SweepArgs {
    /// JSON array of exported household records, rewritten with the new
    /// reminder timestamps unless --output is given
    #[arg(long)]
    pub(crate) households: PathBuf,
    /// Write the updated household records here instead
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
    /// Evaluate the sweep as of this date (defaults to now)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    #[command(flatten)]
    pub(crate) catalog: CatalogArgs,
}

pub(crate) fn run_sweep(args: SweepArgs) -> Result<(), AppError> {
    let SweepArgs {
        households,
        output,
        today,
        catalog,
    } = args;

    let config = AppConfig::load()?;
    let catalog = load_catalog(catalog.programs_csv, catalog.categories_csv)?;
    let raw = std::fs::read_to_string(&households)?;
    let records: Vec<HouseholdRecord> = serde_json::from_str(&raw).map_err(std::io::Error::from)?;
    let repository = Arc::new(InMemoryHouseholdRepository::with_records(records));
    let notifier = Arc::new(LoggingNotifier::default());
    let service = EnrollmentService::new(
        repository.clone(),
        notifier.clone(),
        Arc::new(ZipCodeAddressValidator::default()),
        catalog,
        config.renewal.policy(),
    );

    let now = instant(today);
    let report = service.sweep_renewals(now)?;
    println!("Renewal sweep as of {}", now.date_naive());
    render_sweep(&report);
    for notice in notifier.sent() {
        println!(
            "  - {} -> {} ({})",
            notice.household_id,
            notice.recipient,
            notice
                .details
                .get("renewal_due_on")
                .map(String::as_str)
                .unwrap_or("due date unknown")
        );
    }

    let destination = output.unwrap_or(households);
    let updated = repository.list().map_err(EnrollmentServiceError::from)?;
    let encoded = serde_json::to_string_pretty(&updated).map_err(std::io::Error::from)?;
    std::fs::write(&destination, encoded)?;
    println!("Saved {} household(s) to {}", updated.len(), destination.display());
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        zip_code,
        document,
        catalog,
    } = args;

    let catalog = load_catalog(catalog.programs_csv, catalog.categories_csv)?;
    let interval = catalog.shortest_renewal_interval();
    let notifier = Arc::new(LoggingNotifier::default());
    let service: DemoService = EnrollmentService::new(
        Arc::new(InMemoryHouseholdRepository::default()),
        notifier.clone(),
        Arc::new(ZipCodeAddressValidator::default()),
        catalog,
        RenewalPolicy::default(),
    );

    let applied_at = instant(today);
    println!("Benefit eligibility demo");
    println!("Application date: {}", applied_at.date_naive());

    let household = service.register(ContactInfo {
        email: "resident@example.org".to_string(),
        phone: Some("970-555-0142".to_string()),
    })?;
    let id = household.id;
    let stored = service.record_address(
        &id,
        RawAddress {
            address1: "300 Laporte Ave".to_string(),
            address2: String::new(),
            city: "Fort Collins".to_string(),
            state: "CO".to_string(),
            zip_code,
        },
    )?;
    if let Some(address) = &stored.address {
        println!(
            "- Address {} verified={} in_gma={:?} connexion={:?}",
            address.components.zip_code,
            address.is_verified,
            address.attributes.is_in_gma,
            address.attributes.has_connexion
        );
    }

    service.record_profile(
        &id,
        HouseholdProfile {
            persons_in_household: 3,
            tenure: Tenure::Rent,
        },
    )?;
    service.record_members(&id, demo_members())?;
    let category = EligibilityCategoryId(document);
    service.select_documents(&id, vec![category.clone()])?;
    service.record_upload(&id, &category, format!("{id}/{}.pdf", category.0))?;

    let finalized = match service.finalize_application(&id, applied_at) {
        Ok(outcome) => outcome,
        Err(err) => {
            println!("  Application could not be finalized: {err}");
            return Ok(());
        }
    };
    println!(
        "- Finalized {}: {} program(s) auto-applied",
        id,
        finalized.plan.create.len()
    );
    render_dashboard(&service.dashboard(&id, applied_at)?);

    let first_pending = finalized
        .plan
        .create
        .first()
        .map(|enrollment| enrollment.program.clone());
    if let Some(program) = first_pending {
        service.mark_enrolled(&id, &program, applied_at + Duration::days(14))?;
        println!("- Staff confirmed enrollment in '{}'", program.0);
    }

    let queued = service.verification_queue(VerificationQueue::New)?;
    println!("- Income verification queue: {} household(s)", queued.len());
    service.verify_income(&id, true)?;

    let Some(renewal_due) = interval.and_then(|interval| interval.after(applied_at)) else {
        println!("\nEvery active program is lifetime; no renewal is required.");
        return Ok(());
    };
    let renewal_at = renewal_due + Duration::days(1);
    println!("\nRenewal window ({})", renewal_at.date_naive());
    render_dashboard(&service.dashboard(&id, renewal_at)?);

    let report = service.sweep_renewals(renewal_at)?;
    render_sweep(&report);
    for notice in notifier.sent() {
        println!("  Reminder '{}' sent to {}", notice.template, notice.recipient);
    }

    for step in ApplicationStep::RENEWAL_STEPS {
        service.record_renewal_step(&id, step)?;
    }
    match service.renew_application(&id, renewal_at) {
        Ok(outcome) => {
            println!("- Renewal completed");
            println!(
                "  Renewed: {}",
                list_or_none(&outcome.summary.renewal_eligible)
            );
            println!(
                "  No longer eligible: {}",
                list_or_none(&outcome.summary.renewal_ineligible)
            );
        }
        Err(err) => println!("- Renewal blocked: {err}"),
    }
    render_dashboard(&service.dashboard(&id, renewal_at)?);

    Ok(())
}

fn demo_members() -> Vec<HouseholdMember> {
    [
        ("Alex Rivera", 1986, 5, 17),
        ("Casey Rivera", 1988, 11, 2),
        ("Robin Rivera", 2015, 3, 9),
    ]
    .into_iter()
    .filter_map(|(name, year, month, day)| {
        NaiveDate::from_ymd_opt(year, month, day).map(|birthdate| HouseholdMember {
            name: name.to_string(),
            birthdate,
            identification_path: Some(format!(
                "ids/{}.pdf",
                name.to_ascii_lowercase().replace(' ', "-")
            )),
        })
    })
    .collect()
}

fn render_dashboard(view: &DashboardView) {
    println!(
        "  Dashboard: needs_renewal={} renew_now={}",
        view.needs_renewal, view.renew_now_enabled
    );
    if view.programs.is_empty() {
        println!("    (no programs available)");
    }
    for card in &view.programs {
        let program = card.result.program();
        println!(
            "    - {:<28} {:<8} [{}]",
            program.friendly_name, card.status_label, card.button_text
        );
    }
}

fn render_sweep(report: &SweepReport) {
    println!(
        "- Sweep scanned {} | not due {} | buffered {} | notified {} | delivery failures {} | write failures {}",
        report.scanned,
        report.not_due,
        report.buffered,
        report.notified.len(),
        report.delivery_failures.len(),
        report.write_failures.len()
    );
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
