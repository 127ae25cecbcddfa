//! CLI `call` command: a voice call from the terminal.

use anyhow::Result;
use tokio::sync::mpsc;

use crate::config::SuzanneConfig;
use crate::store::facts;
use crate::voice::{self, CallCallbacks, VoiceError};

enum CallEnd {
    Closed,
    Failed(VoiceError),
}

/// Hold a call until Ctrl-C or until the remote side ends it.
pub async fn call(config: &SuzanneConfig) -> Result<()> {
    let known_facts: Vec<String> = {
        let conn = crate::db::open_database(config.resolved_db_path())?;
        facts::list_facts(&conn)?.into_iter().map(|f| f.fact).collect()
    };

    let orchestrator = voice::live_call(config, &known_facts)?;

    let (end_tx, mut end_rx) = mpsc::unbounded_channel();
    let error_tx = end_tx.clone();
    let callbacks = CallCallbacks::new(
        move || {
            let _ = end_tx.send(CallEnd::Closed);
        },
        move |err| {
            let _ = error_tx.send(CallEnd::Failed(err.clone()));
        },
    );

    println!("Connecting to Suzanne...");
    orchestrator.connect(callbacks).await?;
    println!("Call active. Speak any time; press Ctrl-C to hang up.");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            orchestrator.disconnect();
            println!("\nCall ended.");
        }
        end = end_rx.recv() => match end {
            Some(CallEnd::Failed(e)) => {
                orchestrator.disconnect();
                anyhow::bail!("call dropped: {e}");
            }
            Some(CallEnd::Closed) | None => {
                orchestrator.disconnect();
                println!("Suzanne hung up.");
            }
        }
    }

    Ok(())
}
