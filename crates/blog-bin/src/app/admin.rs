//! Operator commands: stats, dead letters, requeue.

use super::relay::open_store;
use blog_config_and_utils::Paths;
use blog_database::{OutboxRecord, OutboxStats};
use chrono::SecondsFormat;

fn format_stats(stats: &OutboxStats) -> String {
    let oldest = stats
        .oldest_pending_at
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "pending:        {}\n\
         due now:        {}\n\
         retrying:       {}\n\
         delivered:      {}\n\
         dead-lettered:  {}\n\
         oldest pending: {}",
        stats.pending, stats.due, stats.retrying, stats.delivered, stats.dead_lettered, oldest
    )
}

fn format_dead_letter(record: &OutboxRecord) -> String {
    format!(
        "#{} {} aggregate={} attempts={} at={} error={}",
        record.id,
        record.event_kind,
        record.aggregate_id,
        record.retry_count,
        record
            .dead_lettered_at
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default(),
        record.error.as_deref().unwrap_or("-"),
    )
}

pub async fn print_stats(paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(paths).await?;
    println!("{}", format_stats(&store.stats().await?));
    Ok(())
}

pub async fn print_dead_letters(
    paths: &Paths,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(paths).await?;
    let records = store.list_dead_lettered(limit).await?;
    if records.is_empty() {
        println!("No dead-lettered records");
        return Ok(());
    }
    for record in &records {
        println!("{}", format_dead_letter(record));
    }
    Ok(())
}

pub async fn requeue(paths: &Paths, id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(paths).await?;
    store.requeue(id).await?;
    println!("Record {id} requeued");
    Ok(())
}
