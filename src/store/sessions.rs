use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::types::Session;
use super::{now_timestamp, StoreError, StoreResult};

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

/// Insert a new session. Fails with [`StoreError::Invalid`] if the id is
/// empty or already taken.
pub fn create_session(conn: &Connection, id: &str, name: &str) -> StoreResult<Session> {
    if id.trim().is_empty() {
        return Err(StoreError::Invalid("session id must not be empty".into()));
    }

    let created_at = now_timestamp();
    let inserted = conn.execute(
        "INSERT INTO sessions (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![id, name, created_at],
    );

    match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            return Err(StoreError::Invalid(format!("session {id} already exists")));
        }
        Err(e) => return Err(e.into()),
    }

    tracing::debug!(session_id = %id, "session created");

    Ok(Session {
        id: id.to_string(),
        name: name.to_string(),
        created_at,
    })
}

/// All sessions, newest first.
pub fn list_sessions(conn: &Connection) -> StoreResult<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, created_at FROM sessions ORDER BY created_at DESC, rowid DESC",
    )?;
    let sessions = stmt
        .query_map([], row_to_session)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sessions)
}

pub fn get_session(conn: &Connection, id: &str) -> StoreResult<Option<Session>> {
    let session = conn
        .query_row(
            "SELECT id, name, created_at FROM sessions WHERE id = ?1",
            params![id],
            row_to_session,
        )
        .optional()?;
    Ok(session)
}

/// Delete a session and its messages. Returns `false` if no such session.
///
/// Messages are deleted explicitly as well as through the foreign key, so
/// databases opened without `foreign_keys = ON` stay consistent.
pub fn delete_session(conn: &mut Connection, id: &str) -> StoreResult<bool> {
    let tx = conn.transaction()?;
    let messages = tx.execute("DELETE FROM messages WHERE session_id = ?1", params![id])?;
    let removed = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
    tx.commit()?;

    tracing::info!(session_id = %id, messages, removed = removed > 0, "session deleted");
    Ok(removed > 0)
}
