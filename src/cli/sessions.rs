use anyhow::{bail, Result};

use crate::config::SuzanneConfig;
use crate::store::types::MessageKind;
use crate::store::{messages, sessions};

pub fn list(config: &SuzanneConfig) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;
    let sessions = sessions::list_sessions(&conn)?;

    if sessions.is_empty() {
        println!("No sessions yet.");
        return Ok(());
    }

    for session in &sessions {
        println!("  {}  {}  ({})", session.id, session.name, session.created_at);
    }
    println!("\n{} session(s)", sessions.len());
    Ok(())
}

/// Print a session's transcript.
pub fn show(config: &SuzanneConfig, id: &str) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;
    let Some(session) = sessions::get_session(&conn, id)? else {
        bail!("session {id} not found");
    };

    println!("{} ({})\n", session.name, session.created_at);
    for message in messages::list_messages(&conn, id)? {
        let body = match message.kind {
            MessageKind::Image => "[image]".to_string(),
            MessageKind::Text => message.content,
        };
        println!("{:>6}: {body}", message.role.as_str());
    }
    Ok(())
}

pub fn delete(config: &SuzanneConfig, id: &str) -> Result<()> {
    let mut conn = crate::db::open_database(config.resolved_db_path())?;
    if !sessions::delete_session(&mut conn, id)? {
        bail!("session {id} not found");
    }
    println!("Deleted session {id} and its messages.");
    Ok(())
}
