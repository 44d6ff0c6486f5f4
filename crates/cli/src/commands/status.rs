use serde::Serialize;
use shift_migrate::{MigrationState, MigrationStatus, RunnerResult};

use super::{Context, Session};
use crate::OutputFormat;

#[derive(Serialize)]
struct StatusOutput<'a> {
    environment: &'a str,
    migration_table: &'a str,
    migrations: &'a [MigrationStatus],
}

pub async fn run(ctx: &Context, environment: Option<&str>, format: OutputFormat) -> RunnerResult<()> {
    let session = Session::open(ctx, environment).await?;
    let status = match session.migrator.status().await {
        Ok(status) => status,
        Err(e) => {
            session.close().await;
            return Err(e);
        }
    };

    match format {
        OutputFormat::Json => {
            let output = StatusOutput {
                environment: &session.environment,
                migration_table: &session.loaded.config.migration_table,
                migrations: &status,
            };
            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            println!("{}", json);
        }
        OutputFormat::Text => print_table(&session.header(), &status),
    }

    session.close().await;
    Ok(())
}

fn print_table(header: &str, status: &[MigrationStatus]) {
    println!("📋 Migration status for {}", header);
    println!();

    if status.is_empty() {
        println!("No migrations found");
        return;
    }

    println!(" {:<8} {:<15} {:<20} {}", "Status", "Version", "Applied at", "Migration");
    println!(" {}", "-".repeat(72));
    for row in status {
        let (label, applied_at) = match &row.state {
            MigrationState::Applied { start_time, .. } => {
                ("up", start_time.clone().unwrap_or_default())
            }
            MigrationState::Pending => ("down", String::new()),
            MigrationState::Missing => ("missing", String::new()),
        };
        println!(
            " {:<8} {:<15} {:<20} {}",
            label,
            row.version.to_string(),
            applied_at,
            row.name
        );
    }

    let applied = status.iter().filter(|s| s.is_applied()).count();
    let pending = status
        .iter()
        .filter(|s| s.state == MigrationState::Pending)
        .count();
    let missing = status.len() - applied - pending;

    println!();
    println!("{} applied, {} pending", applied, pending);
    if missing > 0 {
        println!(
            "⚠️  {} applied version(s) have no migration file",
            missing
        );
    }
}
