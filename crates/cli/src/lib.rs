pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "revvy",
    about = "Revvy operator CLI",
    long_about = "Operate Revvy runtime readiness, migrations, config inspection, and one-off optimization runs.",
    after_help = "Examples:\n  revvy doctor --json\n  revvy config\n  revvy smoke\n  revvy optimize --hotel-name \"Centara Grand\" --hotel-location \"Bangkok, Thailand\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Run end-to-end readiness checks with per-check timing details")]
    Smoke,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM credential readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one optimization pipeline pass and print the report JSON")]
    Optimize(commands::optimize::OptimizeArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Smoke => commands::smoke::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Optimize(args) => commands::optimize::run(args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
