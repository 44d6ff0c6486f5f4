use std::fs;

use shift_migrate::{
    create_seeder, FnSeeder, MemoryStore, RunnerError, SeederRegistry, SqlSeeder, StoreError,
    Version,
};
use tempfile::TempDir;

const USER_ROWS: &str = "INSERT INTO users (name) VALUES ('ada');\n\
                         INSERT INTO users (name) VALUES ('grace');";

fn user_seeder() -> SqlSeeder {
    SqlSeeder::new("UserSeeder", USER_ROWS)
}

#[tokio::test]
async fn test_named_seeder_runs_regardless_of_ledger() {
    let store = MemoryStore::with_applied([(Version(20230101000000), "CreateUsers")]);
    let registry = SeederRegistry::new().with(user_seeder()).unwrap();
    let names = vec!["UserSeeder".to_string()];

    let report = registry.run(&store, &names).await.unwrap();
    assert_eq!(report.executed, vec!["UserSeeder"]);
    assert_eq!(store.journal().len(), 2);

    // a second run inserts the same rows again
    registry.run(&store, &names).await.unwrap();
    assert_eq!(store.journal().len(), 4);
    assert_eq!(store.ledger_versions(), vec![Version(20230101000000)]);
}

#[tokio::test]
async fn test_seeding_works_without_ledger_table() {
    let store = MemoryStore::new();
    let registry = SeederRegistry::new().with(user_seeder()).unwrap();

    registry.run(&store, &[]).await.unwrap();

    assert_eq!(store.journal().len(), 2);
    assert!(!store.ledger_exists());
}

#[tokio::test]
async fn test_run_all_resolves_dependencies() {
    let store = MemoryStore::new();
    let registry = SeederRegistry::new()
        .with(SqlSeeder::new(
            "PostSeeder",
            "-- depends: UserSeeder\nINSERT INTO posts (user_id) VALUES (1);",
        ))
        .unwrap()
        .with(user_seeder())
        .unwrap();

    let report = registry.run(&store, &[]).await.unwrap();

    assert_eq!(report.executed, vec!["UserSeeder", "PostSeeder"]);
    let journal = store.journal();
    assert!(journal[0].contains("users"));
    assert!(journal[2].contains("posts"));
}

#[tokio::test]
async fn test_named_seeders_run_in_given_order() {
    let store = MemoryStore::new();
    let registry = SeederRegistry::new()
        .with(SqlSeeder::new(
            "PostSeeder",
            "-- depends: UserSeeder\nINSERT INTO posts (user_id) VALUES (1);",
        ))
        .unwrap()
        .with(user_seeder())
        .unwrap();

    let report = registry
        .run(&store, &["PostSeeder".to_string()])
        .await
        .unwrap();

    assert_eq!(report.executed, vec!["PostSeeder"]);
    assert_eq!(store.journal().len(), 1);
}

#[tokio::test]
async fn test_failing_seeder_stops_the_run() {
    let store = MemoryStore::new();
    store.fail_on_statement("comments");
    let registry = SeederRegistry::new()
        .with(user_seeder())
        .unwrap()
        .with(SqlSeeder::new(
            "CommentSeeder",
            "INSERT INTO comments (body) VALUES ('first');",
        ))
        .unwrap()
        .with(FnSeeder::new("TagSeeder", |store| {
            Box::pin(async move {
                store
                    .execute_script("INSERT INTO tags (name) VALUES ('rust');")
                    .await
                    .map(|_| ())
            })
        }))
        .unwrap();

    let err = registry.run(&store, &[]).await.unwrap_err();

    match err {
        RunnerError::Seed { seeder, cause } => {
            assert_eq!(seeder, "CommentSeeder");
            assert!(matches!(cause, StoreError::Statement { .. }));
        }
        other => panic!("unexpected error {:?}", other),
    }
    let journal = store.journal();
    assert_eq!(journal.len(), 2);
    assert!(journal.iter().all(|statement| !statement.contains("tags")));
}

#[tokio::test]
async fn test_unknown_seeder_is_reported() {
    let store = MemoryStore::new();
    let registry = SeederRegistry::new().with(user_seeder()).unwrap();

    let err = registry
        .run(&store, &["MissingSeeder".to_string()])
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "seeder 'MissingSeeder' is not defined");
    assert!(store.journal().is_empty());
}

#[tokio::test]
async fn test_load_dir_registers_sql_files() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("seeds");

    let path = create_seeder(&dir, "UserSeeder").unwrap();
    fs::write(&path, format!("-- Seeder: UserSeeder\n{}", USER_ROWS)).unwrap();
    fs::write(
        dir.join("PostSeeder.sql"),
        "-- depends: UserSeeder\nINSERT INTO posts (user_id) VALUES (1);",
    )
    .unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();

    let registry = SeederRegistry::load_dir(&dir).unwrap();
    assert_eq!(registry.names(), vec!["PostSeeder", "UserSeeder"]);

    let store = MemoryStore::new();
    let report = registry.run(&store, &[]).await.unwrap();
    assert_eq!(report.executed, vec!["UserSeeder", "PostSeeder"]);
    assert_eq!(store.journal().len(), 3);
}

#[test]
fn test_missing_seeds_directory_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let registry = SeederRegistry::load_dir(&temp_dir.path().join("nope")).unwrap();
    assert!(registry.is_empty());
}
