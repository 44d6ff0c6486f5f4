mod commands;
mod logging;

use clap::{Parser, Subcommand, ValueEnum};
use shift_migrate::RunnerResult;
use std::path::PathBuf;
use std::process::ExitCode;

use commands::Context;

#[derive(Parser)]
#[command(name = "shift")]
#[command(version)]
#[command(about = "Versioned database migrations and seeders")]
struct Cli {
    /// Configuration file (default: ./shift.yml, then DB_* variables)
    #[arg(short = 'c', long = "configuration", global = true)]
    configuration: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write log output as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default shift.yml
    Init {
        /// Directory to write the file into (default: current directory)
        path: Option<PathBuf>,
    },

    /// Show applied, pending and missing migrations
    Status {
        /// Target environment
        #[arg(short, long)]
        environment: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Create a new migration file
    Create {
        /// Migration name in CamelCase, e.g. CreateUsersTable
        name: String,
    },

    /// Apply pending migrations
    Migrate {
        /// Target environment
        #[arg(short, long)]
        environment: Option<String>,

        /// Highest version to apply
        #[arg(short, long)]
        target: Option<String>,

        /// Print the plan and its statements without touching the database
        #[arg(long)]
        dry_run: bool,

        /// Record migrations as applied without running them
        #[arg(long)]
        fake: bool,
    },

    /// Revert applied migrations (default: the most recent one)
    Rollback {
        /// Target environment
        #[arg(short, long)]
        environment: Option<String>,

        /// Revert everything newer than this version; 0 reverts all
        #[arg(short, long, conflicts_with = "date")]
        target: Option<String>,

        /// Revert everything created at or after YYYYMMDD[HHMMSS]
        #[arg(short, long)]
        date: Option<String>,

        /// Print the plan and its statements without touching the database
        #[arg(long)]
        dry_run: bool,

        /// Remove ledger entries without running the down migrations
        #[arg(long)]
        fake: bool,
    },

    /// Create a new seeder file
    #[command(name = "seed:create")]
    SeedCreate {
        /// Seeder name in CamelCase, e.g. UserSeeder
        name: String,
    },

    /// Run one, several or all seeders
    #[command(name = "seed:run")]
    SeedRun {
        /// Target environment
        #[arg(short, long)]
        environment: Option<String>,

        /// Seeder to run; repeat for several (default: all)
        #[arg(short = 's', long = "seed")]
        seeds: Vec<String>,
    },

    /// Check the configuration and the database connection
    Test {
        /// Target environment
        #[arg(short, long)]
        environment: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = logging::LoggingConfig::from_verbosity(cli.verbose).with_json(cli.log_json);
    if let Err(e) = logging::init_logging(log_config) {
        eprintln!("warning: logging disabled: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> RunnerResult<()> {
    let ctx = Context::new(cli.configuration);

    match cli.command {
        Commands::Init { path } => {
            commands::init::run(path.as_deref())?;
        }
        Commands::Status {
            environment,
            format,
        } => {
            commands::status::run(&ctx, environment.as_deref(), format).await?;
        }
        Commands::Create { name } => {
            commands::create::migration(&ctx, &name)?;
        }
        Commands::Migrate {
            environment,
            target,
            dry_run,
            fake,
        } => {
            let args = commands::migrate::MigrateArgs {
                target,
                dry_run,
                fake,
            };
            commands::migrate::run(&ctx, environment.as_deref(), args).await?;
        }
        Commands::Rollback {
            environment,
            target,
            date,
            dry_run,
            fake,
        } => {
            let args = commands::rollback::RollbackArgs {
                target,
                date,
                dry_run,
                fake,
            };
            commands::rollback::run(&ctx, environment.as_deref(), args).await?;
        }
        Commands::SeedCreate { name } => {
            commands::create::seeder(&ctx, &name)?;
        }
        Commands::SeedRun { environment, seeds } => {
            commands::seed::run(&ctx, environment.as_deref(), &seeds).await?;
        }
        Commands::Test { environment } => {
            commands::test::run(&ctx, environment.as_deref()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn seed_run_accepts_repeated_seeders() {
        let cli = Cli::try_parse_from([
            "shift", "seed:run", "-e", "testing", "-s", "UserSeeder", "-s", "PostSeeder",
        ])
        .unwrap();
        match cli.command {
            Commands::SeedRun { environment, seeds } => {
                assert_eq!(environment.as_deref(), Some("testing"));
                assert_eq!(seeds, vec!["UserSeeder", "PostSeeder"]);
            }
            _ => panic!("parsed the wrong command"),
        }
    }

    #[test]
    fn rollback_target_and_date_conflict() {
        assert!(Cli::try_parse_from(["shift", "rollback", "-t", "0", "-d", "20230101"]).is_err());
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["shift", "status", "-c", "db/shift.yml", "-vv"]).unwrap();
        assert_eq!(cli.configuration, Some(PathBuf::from("db/shift.yml")));
        assert_eq!(cli.verbose, 2);
    }
}
