use shift_migrate::{create_seeder, MigrationConfig, MigrationManager, RunnerResult};

use super::Context;

pub fn migration(ctx: &Context, name: &str) -> RunnerResult<()> {
    let paths = ctx.paths()?;
    let manager = MigrationManager::new(MigrationConfig::from_paths(&paths));

    let path = manager.create_migration(name)?;
    println!("✅ Created migration {}", path.display());
    Ok(())
}

pub fn seeder(ctx: &Context, name: &str) -> RunnerResult<()> {
    let paths = ctx.paths()?;

    let path = create_seeder(&paths.seeds, name)?;
    println!("✅ Created seeder {}", path.display());
    Ok(())
}
