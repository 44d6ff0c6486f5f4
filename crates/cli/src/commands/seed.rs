use shift_migrate::{RunnerResult, SeederRegistry, SqlStore};

use super::Context;

pub async fn run(ctx: &Context, environment: Option<&str>, seeds: &[String]) -> RunnerResult<()> {
    let loaded = ctx.load()?;
    let environment = loaded.config.environment_name(environment).to_string();
    loaded.config.environment(&environment)?;

    let registry = SeederRegistry::load_dir(&loaded.config.paths.seeds)?;
    let store = SqlStore::from_config(&loaded.config, &environment).await?;

    println!("🌱 Seeding environment '{}' ({})", environment, loaded.source);

    let result = registry.run(&store, seeds).await;
    store.close().await;
    let report = result?;

    if report.executed.is_empty() {
        println!("No seeders found in {}", loaded.config.paths.seeds.display());
        return Ok(());
    }

    for name in &report.executed {
        println!("  == {}: seeded", name);
    }
    println!(
        "✅ Ran {} seeder(s) in {} ms",
        report.executed.len(),
        report.execution_time_ms
    );
    Ok(())
}
