use anyhow::Result;

use crate::config::SuzanneConfig;
use crate::store::facts;

pub fn list(config: &SuzanneConfig) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;
    let facts = facts::list_facts(&conn)?;

    if facts.is_empty() {
        println!("No facts remembered yet.");
        return Ok(());
    }

    for fact in &facts {
        println!("  - {}", fact.fact);
    }
    println!("\n{} fact(s)", facts.len());
    Ok(())
}

pub fn add(config: &SuzanneConfig, text: &str) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;
    let fact = facts::save_fact(&conn, text)?;
    println!("Remembered: {}", fact.fact);
    Ok(())
}
