//! CLI `doctor` command: database, API key and audio device diagnostics.

use anyhow::{Context, Result};

use crate::config::SuzanneConfig;
use crate::db;
use crate::voice::{CpalCapture, CpalSink};

/// Run diagnostics and print a health report.
pub fn doctor(config: &SuzanneConfig) -> Result<()> {
    println!("Suzanne Health Report");
    println!("=====================");
    println!();

    database_section(config)?;
    println!();

    let key_status = if config.model.api_key.trim().is_empty() {
        "MISSING (set GEMINI_API_KEY)"
    } else {
        "configured"
    };
    println!("Model:");
    println!("  API key:         {key_status}");
    println!("  Chat model:      {}", config.model.chat_model);
    println!("  Live model:      {}", config.voice.live_model);
    println!("  Voice:           {}", config.voice.voice_name);
    println!();

    println!("Audio devices:");
    print_devices("Input", CpalCapture::list_input_devices());
    print_devices("Output", CpalSink::list_output_devices());

    Ok(())
}

fn database_section(config: &SuzanneConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database:          not found at {}", db_path.display());
        println!("Run `suzanne serve` or `suzanne chat` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Row counts:");
    println!("  Sessions:        {}", report.session_count);
    println!("  Messages:        {}", report.message_count);
    println!("  Facts:           {}", report.fact_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db {}", db_path.display());
        println!("  2. Or move the damaged file aside and let Suzanne create a new one.");
    }

    Ok(())
}

fn print_devices(label: &str, devices: crate::voice::VoiceResult<Vec<String>>) {
    match devices {
        Ok(names) if names.is_empty() => println!("  {label}: none found"),
        Ok(names) => {
            println!("  {label}:");
            for name in names {
                println!("    - {name}");
            }
        }
        Err(e) => println!("  {label}: unavailable ({e})"),
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
