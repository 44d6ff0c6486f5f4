use shift_migrate::{ApplyMode, Direction, RollbackOptions, RollbackTarget, RunnerResult, Version};

use super::{interrupt_flag, parse_version, print_planned, Context, Session};

pub struct RollbackArgs {
    pub target: Option<String>,
    pub date: Option<String>,
    pub dry_run: bool,
    pub fake: bool,
}

impl RollbackArgs {
    fn rollback_target(&self) -> RunnerResult<RollbackTarget> {
        match (&self.target, &self.date) {
            (Some(version), _) => Ok(RollbackTarget::Version(parse_version(version)?)),
            (None, Some(date)) => Ok(RollbackTarget::Date(Version::from_date(date)?)),
            (None, None) => Ok(RollbackTarget::LastStep),
        }
    }
}

pub async fn run(ctx: &Context, environment: Option<&str>, args: RollbackArgs) -> RunnerResult<()> {
    let target = args.rollback_target()?;
    let mut session = Session::open(ctx, environment).await?;
    session.migrator = session.migrator.with_interrupt(interrupt_flag());

    println!("⏪ Rolling back {}", session.header());

    let options = RollbackOptions {
        target,
        dry_run: args.dry_run,
        mode: if args.fake {
            ApplyMode::Fake
        } else {
            ApplyMode::Execute
        },
    };

    let report = match session.migrator.rollback(options).await {
        Ok(report) => report,
        Err(e) => {
            session.close().await;
            return Err(e);
        }
    };

    if report.reverted.is_empty() {
        println!("✅ Nothing to roll back");
    } else if report.dry_run {
        println!("📝 Dry run: {} migration(s) would be reverted", report.reverted.len());
        for reverted in &report.reverted {
            if let Some(migration) = session
                .migrator
                .migrations()
                .iter()
                .find(|m| m.version == reverted.version)
            {
                let sql = if args.fake { "" } else { migration.sql(Direction::Down) };
                print_planned(session.migrator.store(), migration, sql);
            }
        }
    } else {
        for reverted in &report.reverted {
            println!("  == {}: reverted", reverted);
        }
        println!(
            "✅ Reverted {} migration(s){} in {} ms",
            report.reverted.len(),
            if args.fake { " (fake)" } else { "" },
            report.execution_time_ms
        );
    }

    session.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(target: Option<&str>, date: Option<&str>) -> RollbackArgs {
        RollbackArgs {
            target: target.map(str::to_string),
            date: date.map(str::to_string),
            dry_run: false,
            fake: false,
        }
    }

    #[test]
    fn target_selection() {
        assert_eq!(args(None, None).rollback_target().unwrap(), RollbackTarget::LastStep);
        assert_eq!(
            args(Some("0"), None).rollback_target().unwrap(),
            RollbackTarget::Version(Version::ZERO)
        );
        assert_eq!(
            args(None, Some("20230102")).rollback_target().unwrap(),
            RollbackTarget::Date(Version(20230102000000))
        );
        assert!(args(Some("yesterday"), None).rollback_target().is_err());
    }
}
