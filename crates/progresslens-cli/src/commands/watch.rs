//! The `progresslens watch` command: print the summary every time it changes.

use std::path::Path;

use anyhow::Result;
use tokio::sync::mpsc;

use progresslens_core::live::LiveReports;

use super::summary::print_summary;
use super::{print_diagnostics, ReportArgs, Session};

pub async fn execute(
    config_path: Option<&Path>,
    args: ReportArgs,
    max_updates: Option<usize>,
) -> Result<()> {
    let session = Session::open(config_path, &args)?;
    let live = LiveReports::new(session.engine.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut subscription = live
        .subscribe(&session.teacher_id, session.filters.clone(), move |update| {
            let _ = tx.send(update);
        })
        .await?;

    eprintln!(
        "Watching teacher {} (Ctrl-C to stop)",
        session.teacher_id
    );

    let mut updates = 0usize;
    loop {
        tokio::select! {
            update = rx.recv() => {
                let Some(update) = update else { break };
                updates += 1;
                match update {
                    Ok(result) if args.json() => {
                        println!("{}", serde_json::to_string(&result)?);
                    }
                    Ok(result) => {
                        let at = chrono::Utc::now().format("%H:%M:%S");
                        println!("--- update {updates} at {at} ---");
                        print_summary(&result.data);
                        print_diagnostics(&result.diagnostics);
                    }
                    Err(e) => eprintln!("warning: recomputation failed: {e}"),
                }
                if max_updates.is_some_and(|max| updates >= max) {
                    break;
                }
            }
            _ = subscription.closed() => {
                eprintln!("Change feed closed.");
                break;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    subscription.unsubscribe();
    Ok(())
}
