//! Replay saga events from a JSON-lines file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::AppContext;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{BrokerConfig, SagaEvent, SagaStatus};
use crate::infrastructure::broker::InMemoryBroker;
use crate::services::{ConsumerSettings, ConsumerStats, SagaConsumer};

#[derive(Args, Debug)]
pub struct ConsumeArgs {
    /// File with one saga event per line
    #[arg(short, long)]
    pub events: PathBuf,

    /// Override the number of partition workers
    #[arg(short, long)]
    pub workers: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ConsumeOutput {
    pub stats: ConsumerStats,
    pub outcomes: Vec<SagaEvent>,
}

impl CommandOutput for ConsumeOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["transaction", "status", "last message"]);
        for outcome in &self.outcomes {
            let message = outcome
                .history()
                .last()
                .map(|entry| entry.message.as_str())
                .unwrap_or_default();
            table.add_row(vec![
                outcome.transaction_id.clone(),
                outcome.status.to_string(),
                truncate(message, 60),
            ]);
        }
        format!(
            "{}\n\nreceived {}, published {}, re-emitted {}, skipped {}, rejected {}, failed {}",
            render_list("outcome", &table, self.outcomes.len()),
            self.stats.received,
            self.stats.published,
            self.stats.reemitted,
            self.stats.skipped,
            self.stats.rejected,
            self.stats.failed,
        )
    }
}

/// Topic an event would arrive on.
fn topic_for(event: &SagaEvent, broker: &BrokerConfig) -> String {
    match event.status {
        SagaStatus::RollbackPending => broker.rollback_topic.clone(),
        SagaStatus::Success | SagaStatus::Fail => broker.create_topic.clone(),
    }
}

pub async fn execute(args: ConsumeArgs, context: &AppContext, json: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.events)
        .await
        .with_context(|| format!("Failed to read {}", args.events.display()))?;

    let broker = InMemoryBroker::new();
    let broker_config = &context.config.broker;
    for (line_number, line) in raw.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        // unparseable lines still go through so the coordinator rejects them
        let (topic, key) = match SagaEvent::from_json(line) {
            Ok(event) => (topic_for(&event, broker_config), Some(event.transaction_id)),
            Err(err) => {
                warn!(line = line_number + 1, error = %err, "event will be rejected");
                (broker_config.create_topic.clone(), None)
            }
        };
        broker.send(&topic, key.as_deref(), line)?;
    }

    let consumer = Arc::new(broker.consumer(&broker_config.inbound_topics()));
    let coordinator = Arc::new(context.coordinator(Arc::new(broker.clone())));
    let mut settings = ConsumerSettings::from(broker_config);
    settings.stop_when_idle = true;
    if let Some(workers) = args.workers {
        settings.partition_workers = workers.max(1);
    }

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing in-flight events");
            ctrl_c.cancel();
        }
    });

    let stats = SagaConsumer::new(consumer, coordinator, settings)
        .run(shutdown)
        .await
        .context("Saga consumer failed")?;
    context.persist().await.context("Failed to save store snapshot")?;

    let outcomes = broker
        .messages(&broker_config.result_topic)
        .iter()
        .map(|message| SagaEvent::from_json(&message.payload))
        .collect::<Result<Vec<_>, _>>()
        .context("Published an unreadable outcome")?;

    output(&ConsumeOutput { stats, outcomes }, json);
    Ok(())
}
