//! The `DataStore` capability used by the runner and the seeders.
//!
//! `SqlStore` talks to a real database through sqlx; `MemoryStore` keeps
//! everything in memory and is what the tests drive.

pub mod memory;
pub mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

use async_trait::async_trait;
use sqlparser::dialect::Dialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token, TokenWithLocation, Tokenizer};
use thiserror::Error;

use crate::ledger::LedgerEntry;
use crate::migrations::{ApplyMode, Direction, Migration};

const STATEMENT_PREVIEW: usize = 120;

/// Failures inside a store. The runner wraps them with the version or
/// seeder they belong to.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("statement `{statement}` failed: {message}")]
    Statement { statement: String, message: String },

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("transaction error: {0}")]
    Transaction(String),
}

impl StoreError {
    pub fn statement(statement: &str, message: impl ToString) -> Self {
        let statement = if statement.chars().count() > STATEMENT_PREVIEW {
            let cut: String = statement.chars().take(STATEMENT_PREVIEW).collect();
            format!("{}...", cut)
        } else {
            statement.to_string()
        };
        StoreError::Statement {
            statement,
            message: message.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Database capability injected into the runner and the seeders.
///
/// Every `apply` and `execute_script` call is one transaction: either all
/// of its statements (and the ledger write) commit, or none do.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Create the ledger table when it does not exist yet
    async fn ensure_ledger(&self) -> StoreResult<()>;

    /// Applied versions, ascending. An absent ledger table reads as empty.
    async fn ledger(&self) -> StoreResult<Vec<LedgerEntry>>;

    /// Run one migration body in `direction` and update the ledger in the
    /// same transaction.
    async fn apply(
        &self,
        migration: &Migration,
        direction: Direction,
        mode: ApplyMode,
    ) -> StoreResult<()>;

    /// Run a script in one transaction; returns the number of statements
    async fn execute_script(&self, sql: &str) -> StoreResult<usize>;

    /// Split a script into the statements this store would execute
    fn statements(&self, sql: &str) -> Vec<String>;
}

/// Split SQL into statements at top-level semicolons.
///
/// Uses the sqlparser tokenizer for `dialect`, so quoted strings, comments
/// and dollar-quoted bodies never split a statement. Semicolons inside a
/// `CREATE ... BEGIN ... END` body (triggers) stay with their statement.
/// Each statement is the author's text with leading comments dropped. When
/// the script cannot be tokenized it is returned whole.
pub fn split_statements(sql: &str, dialect: &dyn Dialect) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }

    let tokens = match Tokenizer::new(dialect, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!("SQL tokenizing failed, executing the script unsplit: {}", e);
            return vec![sql.trim().to_string()];
        }
    };

    let offsets = LineOffsets::new(sql);
    let mut statements = Vec::new();
    let mut start: Option<usize> = None;
    let mut is_create = false;
    let mut depth = 0usize;

    for TokenWithLocation { token, location } in &tokens {
        match token {
            Token::Whitespace(_) | Token::EOF => continue,
            Token::SemiColon if depth == 0 => {
                if let Some(begin) = start.take() {
                    let end = offsets.byte_offset(sql, location).unwrap_or(sql.len());
                    push_statement(&mut statements, &sql[begin..end]);
                }
                is_create = false;
                continue;
            }
            _ => {}
        }

        if start.is_none() {
            start = offsets.byte_offset(sql, location);
            is_create = matches!(token, Token::Word(w) if w.keyword == Keyword::CREATE);
        }

        if let Token::Word(word) = token {
            match word.keyword {
                Keyword::BEGIN if is_create => depth += 1,
                Keyword::CASE if depth > 0 => depth += 1,
                Keyword::END => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }

    if let Some(begin) = start {
        push_statement(&mut statements, &sql[begin..]);
    }
    statements
}

fn push_statement(statements: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        statements.push(text.to_string());
    }
}

/// Maps tokenizer locations (1-based line, 1-based char column) to byte offsets
struct LineOffsets(Vec<usize>);

impl LineOffsets {
    fn new(sql: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        Self(starts)
    }

    fn byte_offset(&self, sql: &str, location: &Location) -> Option<usize> {
        let line = usize::try_from(location.line).ok()?.checked_sub(1)?;
        let column = usize::try_from(location.column).ok()?.checked_sub(1)?;
        let line_start = *self.0.get(line)?;
        sql[line_start..]
            .char_indices()
            .nth(column)
            .map(|(i, _)| line_start + i)
            .or(Some(sql.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::{GenericDialect, SQLiteDialect};

    #[test]
    fn splits_parsed_statements() {
        let sql = "CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(50));\n\
                   INSERT INTO users (id, name) VALUES (1, 'a;b');";
        let statements = split_statements(sql, &GenericDialect {});
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE users"));
        assert!(statements[1].contains("'a;b'"));
    }

    #[test]
    fn splits_unknown_syntax_on_semicolons() {
        let statements = split_statements("FROBNICATE x; FROBNICATE y;", &GenericDialect {});
        assert_eq!(statements, vec!["FROBNICATE x", "FROBNICATE y"]);
    }

    #[test]
    fn trigger_bodies_and_quoted_semicolons_stay_whole() {
        let sql = "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT, touched INTEGER);\n\
                   CREATE TRIGGER items_touch AFTER UPDATE ON items\n\
                   BEGIN\n\
                       UPDATE items SET touched = CASE WHEN touched IS NULL THEN 1 ELSE touched + 1 END WHERE id = NEW.id;\n\
                   END;\n\
                   -- seed row\n\
                   INSERT INTO items (id, label) VALUES (1, 'a;b');";
        let statements = split_statements(sql, &SQLiteDialect {});

        assert_eq!(statements.len(), 3);
        assert!(statements[1].starts_with("CREATE TRIGGER items_touch"));
        assert!(statements[1].ends_with("END"));
        assert_eq!(statements[2], "INSERT INTO items (id, label) VALUES (1, 'a;b')");
    }

    #[test]
    fn comment_only_scripts_have_no_statements() {
        let sql = "-- nothing yet\n/* still nothing; really */\n";
        assert!(split_statements(sql, &GenericDialect {}).is_empty());
    }

    #[test]
    fn escaped_quotes_are_kept_verbatim() {
        let statements =
            split_statements("INSERT INTO t (s) VALUES ('it''s; fine'); SELECT 1", &GenericDialect {});
        assert_eq!(
            statements,
            vec!["INSERT INTO t (s) VALUES ('it''s; fine')", "SELECT 1"]
        );
    }

    #[test]
    fn empty_body_has_no_statements() {
        assert!(split_statements("  \n", &GenericDialect {}).is_empty());
    }

    #[test]
    fn long_statements_are_shortened_in_errors() {
        let long = "x".repeat(500);
        match StoreError::statement(&long, "boom") {
            StoreError::Statement { statement, .. } => assert_eq!(statement.len(), 123),
            other => panic!("unexpected {:?}", other),
        }
    }
}
