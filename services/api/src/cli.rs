use crate::demo::{run_demo, run_sweep, DemoArgs, SweepArgs};
use crate::server;
use benefit_eligibility::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Benefit Eligibility Service",
    about = "Run and demonstrate the income-qualified benefit eligibility service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Renewal reminder tooling
    Renewals {
        #[command(subcommand)]
        command: RenewalsCommand,
    },
    /// Walk a sample household through application, enrollment, and renewal
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RenewalsCommand {
    /// Run one renewal notification sweep and print the report
    Sweep(SweepArgs),
}

/// Catalog CSV exports; the built-in catalog is used unless both are given.
#[derive(Args, Debug, Default, Clone)]
pub(crate) struct CatalogArgs {
    /// Program catalog CSV export
    #[arg(long)]
    pub(crate) programs_csv: Option<PathBuf>,
    /// Eligibility document category CSV export
    #[arg(long)]
    pub(crate) categories_csv: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    #[command(flatten)]
    pub(crate) catalog: CatalogArgs,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Renewals {
            command: RenewalsCommand::Sweep(args),
        } => run_sweep(args),
        Command::Demo(args) => run_demo(args),
    }
}
