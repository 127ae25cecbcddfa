use rusqlite::{params, Connection};

use super::types::Fact;
use super::{now_timestamp, StoreError, StoreResult};

/// Append a fact to long-term memory. Whitespace is trimmed; empty facts
/// are rejected.
pub fn save_fact(conn: &Connection, fact: &str) -> StoreResult<Fact> {
    let fact = fact.trim();
    if fact.is_empty() {
        return Err(StoreError::Invalid("fact must not be empty".into()));
    }

    let created_at = now_timestamp();
    conn.execute(
        "INSERT INTO facts (fact, created_at) VALUES (?1, ?2)",
        params![fact, created_at],
    )?;

    tracing::info!(fact_len = fact.len(), "fact saved");

    Ok(Fact {
        id: conn.last_insert_rowid(),
        fact: fact.to_string(),
        created_at,
    })
}

/// All facts, newest first.
pub fn list_facts(conn: &Connection) -> StoreResult<Vec<Fact>> {
    let mut stmt =
        conn.prepare("SELECT id, fact, created_at FROM facts ORDER BY created_at DESC, id DESC")?;
    let facts = stmt
        .query_map([], |row| {
            Ok(Fact {
                id: row.get(0)?,
                fact: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(facts)
}

pub fn count_facts(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM facts", [], |row| row.get(0))?)
}
