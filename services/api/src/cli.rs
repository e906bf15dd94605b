use crate::demo::{run_demo, run_roster_import, DemoArgs, RosterImportArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use safetrack::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "SafeTrack",
    about = "Assign safety controls to workers and report compliance gaps",
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
    /// Roster maintenance against the reference catalog
    Roster {
        #[command(subcommand)]
        command: RosterCommand,
    },
    /// Run an end-to-end demo: hire a crew, file evidence, and report gaps and scores
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RosterCommand {
    /// Import a roster CSV and print the resulting client gap analysis
    Import(RosterImportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Roster CSV to load into the in-memory store before serving
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Roster {
            command: RosterCommand::Import(args),
        } => run_roster_import(args),
        Command::Demo(args) => run_demo(args),
    }
}
