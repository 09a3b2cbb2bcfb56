//! Failure ledger subcommand handlers.

use serde_json::{Value, json};

use failbox_ledger::{
    FailureBackend, FailureLedger, FailureRecord, JobError, JobFailure, JobPayload, LedgerError,
};

use crate::cli::{Commands, OutputFormat};

/// Handle a ledger subcommand.
pub(crate) async fn handle_command(
    command: Commands,
    ledger: &FailureLedger,
) -> Result<(), Box<dyn std::error::Error>> {
    let default_queue = ledger.default_queue().to_string();
    let or_default = |queue: Option<String>| queue.unwrap_or_else(|| default_queue.clone());

    match command {
        Commands::Count { queue } => {
            let count = ledger.enumerator().count(queue.as_deref()).await?;
            println!("{}", count);
        }
        Commands::Queues => {
            for queue in ledger.registry().queues().await? {
                println!("{}", queue);
            }
        }
        Commands::List { queue, offset, limit, format } => {
            failure_list(ledger, &or_default(queue), offset, limit, format).await?;
        }
        Commands::Show { index, queue } => {
            let record = ledger.enumerator().get(index, &or_default(queue)).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Requeue { index, queue } => {
            let record = ledger.requeuer().requeue(index, &or_default(queue)).await?;
            println!("Requeued {} to '{}'", record.payload.class, record.queue);
        }
        Commands::RequeueQueue { queue } => {
            let requeued = ledger.requeuer().requeue_queue(&queue).await?;
            println!("Requeued {} failures from '{}'", requeued, queue);
        }
        Commands::Remove { index, queue } => {
            let queue = or_default(queue);
            ledger.remover().remove(index, &queue).await?;
            println!("Removed {}[{}]", queue, index);
        }
        Commands::RemoveQueue { queue } => {
            ledger.remover().remove_queue(&queue).await?;
            println!("Removed failure queue of '{}'", queue);
        }
        Commands::Clear => {
            ledger.remover().clear().await?;
            println!("Cleared '{}'", ledger.default_queue());
        }
        Commands::Record { queue, class, args, exception, message, backtrace, worker } => {
            let args: Vec<Value> = serde_json::from_str(&args)?;
            let worker = worker.unwrap_or_else(|| format!("failbox:{}", std::process::id()));
            let failure = JobFailure::new(
                JobPayload::new(class, args),
                JobError::new(exception, message).with_backtrace(backtrace),
                queue,
                worker,
            );
            ledger.backend().save(&failure).await?;
            println!("Recorded failure for '{}'", failure.queue);
        }
    }

    Ok(())
}

/// Print a page of failures.
async fn failure_list(
    ledger: &FailureLedger,
    queue: &str,
    offset: usize,
    limit: usize,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = ledger.enumerator().each(offset, limit, queue).await?;

    if entries.len() == 0 {
        println!("No failures in '{}'.", queue);
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            let records: Vec<Value> = entries
                .map(|(index, record)| list_entry_json(index, record))
                .collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Table => {
            println!(
                "{:<6} {:<26} {:<16} {:<20} {:<24} {}",
                "INDEX", "FAILED AT", "QUEUE", "CLASS", "EXCEPTION", "ERROR"
            );
            println!("{}", "-".repeat(110));
            for (index, record) in entries {
                match record {
                    Ok(r) => {
                        let retried = if r.retried_at.is_some() { " (retried)" } else { "" };
                        println!(
                            "{:<6} {:<26} {:<16} {:<20} {:<24} {}{}",
                            index,
                            r.failed_at,
                            r.queue,
                            r.payload.class,
                            r.exception,
                            first_line(&r.error),
                            retried
                        );
                    }
                    Err(e) => println!("{:<6} <{}>", index, e),
                }
            }
        }
    }

    Ok(())
}

/// JSON form of one listed entry. Undecodable entries carry their error.
fn list_entry_json(index: usize, record: Result<FailureRecord, LedgerError>) -> Value {
    match record {
        Ok(record) => json!({ "index": index, "failure": record }),
        Err(e) => json!({ "index": index, "error": e.to_string() }),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_entry_json_keeps_malformed_entries() {
        let err = LedgerError::MalformedRecord {
            queue: "emails_failed".to_string(),
            index: 3,
            message: "expected value".to_string(),
        };

        let entry = list_entry_json(3, Err(err));
        assert_eq!(entry["index"], json!(3));
        assert!(entry["error"].as_str().unwrap().contains("emails_failed"));
        assert!(entry.get("failure").is_none());
    }

    #[test]
    fn test_list_entry_json_wraps_record() {
        let raw = json!({
            "failed_at": "2026/10/18 14:03:11 +0200",
            "payload": {"class": "SendEmail", "args": []},
            "exception": "SmtpError",
            "error": "timed out",
            "backtrace": [],
            "worker": "w",
            "queue": "emails"
        })
        .to_string();
        let record = FailureRecord::decode(&raw).unwrap();

        let entry = list_entry_json(0, Ok(record));
        assert_eq!(entry["index"], json!(0));
        assert_eq!(entry["failure"]["exception"], json!("SmtpError"));
        assert!(entry.get("error").is_none());
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("boom\nat line 2"), "boom");
        assert_eq!(first_line(""), "");
    }
}
