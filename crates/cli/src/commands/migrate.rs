use shift_migrate::{ApplyMode, Direction, MigrateOptions, RunnerResult};

use super::{interrupt_flag, parse_version, print_planned, Context, Session};

pub struct MigrateArgs {
    pub target: Option<String>,
    pub dry_run: bool,
    pub fake: bool,
}

pub async fn run(ctx: &Context, environment: Option<&str>, args: MigrateArgs) -> RunnerResult<()> {
    let target = args.target.as_deref().map(parse_version).transpose()?;
    let mut session = Session::open(ctx, environment).await?;
    session.migrator = session.migrator.with_interrupt(interrupt_flag());

    println!("🚀 Migrating {}", session.header());

    let options = MigrateOptions {
        target,
        dry_run: args.dry_run,
        mode: if args.fake {
            ApplyMode::Fake
        } else {
            ApplyMode::Execute
        },
    };

    let result = session.migrator.migrate(options).await;
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            session.close().await;
            return Err(e);
        }
    };

    if report.applied.is_empty() {
        println!("✅ Nothing to migrate ({} already applied)", report.skipped_count);
    } else if report.dry_run {
        println!("📝 Dry run: {} migration(s) would be applied", report.applied.len());
        for applied in &report.applied {
            if let Some(migration) = session
                .migrator
                .migrations()
                .iter()
                .find(|m| m.version == applied.version)
            {
                let sql = if args.fake { "" } else { migration.sql(Direction::Up) };
                print_planned(session.migrator.store(), migration, sql);
            }
        }
    } else {
        for applied in &report.applied {
            println!("  == {}: migrated", applied);
        }
        println!(
            "✅ Applied {} migration(s){} in {} ms",
            report.applied.len(),
            if args.fake { " (fake)" } else { "" },
            report.execution_time_ms
        );
    }

    session.close().await;
    Ok(())
}
