use shift_core::{DEFAULT_CONFIG_FILE, INIT_TEMPLATE};
use shift_migrate::{RunnerError, RunnerResult};
use std::fs;
use std::io::Write;
use std::path::Path;

pub fn run(path: Option<&Path>) -> RunnerResult<()> {
    let dir = match path {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    fs::create_dir_all(&dir)?;

    let target = dir.join(DEFAULT_CONFIG_FILE);
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => {
                RunnerError::Scaffold(format!("{} already exists", target.display()))
            }
            _ => RunnerError::Io(e),
        })?;
    file.write_all(INIT_TEMPLATE.as_bytes())?;

    println!("✅ Created {}", target.display());
    println!("   Edit the environments, then run `shift create <Name>` to add a migration.");
    Ok(())
}
