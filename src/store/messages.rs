use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use super::sessions::get_session;
use super::types::{Message, NewMessage};
use super::{now_timestamp, StoreError, StoreResult};

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: parse_column(row, 2)?,
        content: row.get(3)?,
        kind: parse_column(row, 4)?,
        created_at: row.get(5)?,
    })
}

/// Append a message to a session's log. The session must exist.
pub fn append_message(conn: &Connection, msg: &NewMessage) -> StoreResult<Message> {
    if get_session(conn, &msg.session_id)?.is_none() {
        return Err(StoreError::NotFound(format!("session {}", msg.session_id)));
    }

    let created_at = now_timestamp();
    conn.execute(
        "INSERT INTO messages (session_id, role, content, type, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            msg.session_id,
            msg.role.as_str(),
            msg.content,
            msg.kind.as_str(),
            created_at,
        ],
    )?;

    Ok(Message {
        id: conn.last_insert_rowid(),
        session_id: msg.session_id.clone(),
        role: msg.role,
        content: msg.content.clone(),
        kind: msg.kind,
        created_at,
    })
}

/// A session's messages in the order they were appended.
pub fn list_messages(conn: &Connection, session_id: &str) -> StoreResult<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, role, content, type, created_at FROM messages \
         WHERE session_id = ?1 ORDER BY id ASC",
    )?;
    let messages = stmt
        .query_map(params![session_id], row_to_message)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}
