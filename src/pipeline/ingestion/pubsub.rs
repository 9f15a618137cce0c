//! Pub/sub chaos simulator.
//!
//! One publisher task emits messages through a bounded channel to one
//! subscriber that writes them to JSONL in arrival order. Chaos comes from
//! per-message jittered delays, a slow path that delivers some messages late
//! and random re-sends of earlier messages.

use super::{random_message_id, random_zipcode, timestamped_output_path, DataSource, SourceContext};
use crate::config::{ChaosParams, GenerationMode, PubSubOptions};
use crate::constants;
use crate::error::{PipelineError, Result};
use crate::types::EventRecord;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone)]
struct Message {
    message_id: String,
    sequence_id: i64,
    partition_id: i64,
    created_at: f64,
    value: i64,
    zipcode: String,
}

fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Parameters of one simulation run
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub total_messages: u64,
    pub chaos: ChaosParams,
    pub options: PubSubOptions,
    /// When false every sleep is skipped
    pub delays: bool,
}

pub struct PubSubSource {
    ctx: SourceContext,
}

impl PubSubSource {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl DataSource for PubSubSource {
    fn name(&self) -> &str {
        constants::PUBSUB_SOURCE
    }

    async fn generate(&self) -> Result<PathBuf> {
        let generation = &self.ctx.generation;
        let mut rng = match generation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let chaos = generation.chaos.sample(&mut rng);
        let output = timestamped_output_path(
            &self.ctx.storage.raw_data_path,
            constants::PUBSUB_FILE_PREFIX,
        )?;

        info!(
            total_messages = generation.scale.0,
            partitions = self.ctx.options.pubsub.partitions,
            mode = generation.mode.as_str(),
            dup_prob = chaos.dup_prob,
            slow_prob = chaos.slow_prob,
            output = %output.display(),
            "pubsub_simulation_starting"
        );

        let params = SimulationParams {
            total_messages: generation.scale.0,
            chaos,
            options: self.ctx.options.pubsub.clone(),
            delays: generation.mode == GenerationMode::Chaos,
        };
        let arrivals = run_simulation(params, rng, &output).await?;

        info!(arrivals, output = %output.display(), "pubsub_simulation_complete");
        self.validate_output(&output)?;
        Ok(output)
    }
}

/// Run publisher and subscriber to completion. Returns the number of
/// messages written, duplicates included.
pub async fn run_simulation(params: SimulationParams, rng: StdRng, output: &Path) -> Result<u64> {
    let (tx, rx) = mpsc::channel(params.options.buffer_size);

    let subscriber = tokio::spawn(subscriber(
        rx,
        output.to_path_buf(),
        params.total_messages,
        params.options.log_interval,
    ));

    // The subscriber only finishes once every sender is gone: the
    // publisher's own and those held by in-flight slow-path tasks.
    let published = publisher(tx, &params, rng).await;

    let written = subscriber.await.map_err(|e| PipelineError::Task {
        task: "pubsub_subscriber".to_string(),
        message: e.to_string(),
    })??;
    published?;
    Ok(written)
}

async fn send(tx: &mpsc::Sender<Message>, msg: Message) -> Result<()> {
    tx.send(msg).await.map_err(|_| PipelineError::Task {
        task: "pubsub_publisher".to_string(),
        message: "subscriber closed the channel".to_string(),
    })
}

async fn publisher(
    tx: mpsc::Sender<Message>,
    params: &SimulationParams,
    mut rng: StdRng,
) -> Result<()> {
    let chaos = &params.chaos;
    let message = &params.options.message;
    let [value_lo, value_hi] = message.value_range;
    let partitions = params.options.partitions.max(1) as i64;
    let slow_delay = if params.delays {
        Duration::from_millis(params.options.slow_path_delay_ms)
    } else {
        Duration::ZERO
    };

    let mut produced: Vec<Message> = Vec::new();

    for seq in 1..=params.total_messages as i64 {
        if params.delays {
            let lo = chaos.base_delay - chaos.jitter;
            let hi = chaos.base_delay + chaos.jitter;
            let delay = rng.gen_range(lo..=hi).max(0.0);
            if delay > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
        }

        let msg = Message {
            message_id: random_message_id(&mut rng, message.id_length),
            sequence_id: seq,
            partition_id: rng.gen_range(0..partitions),
            created_at: epoch_seconds(),
            value: rng.gen_range(value_lo..=value_hi),
            zipcode: random_zipcode(&mut rng, message.zipcode_digits),
        };
        produced.push(msg.clone());

        if rng.gen::<f64>() < chaos.slow_prob {
            let slow_tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(slow_delay).await;
                // Channel closes only after this sender drops
                let _ = slow_tx.send(msg).await;
            });
        } else {
            send(&tx, msg).await?;
        }

        if rng.gen::<f64>() < chaos.dup_prob {
            let idx = rng.gen_range(0..produced.len());
            send(&tx, produced[idx].clone()).await?;
        }
    }

    Ok(())
}

async fn subscriber(
    mut rx: mpsc::Receiver<Message>,
    output: PathBuf,
    total_messages: u64,
    log_interval: u64,
) -> Result<u64> {
    let file = tokio::fs::File::create(&output).await?;
    let mut writer = BufWriter::new(file);
    let start = Instant::now();
    let mut arrival_index: u64 = 0;

    while let Some(msg) = rx.recv().await {
        arrival_index += 1;

        let mut record =
            EventRecord::new(&msg.message_id, msg.sequence_id, msg.partition_id, msg.created_at);
        record.value = Some(msg.value);
        record.zipcode = Some(msg.zipcode);
        record.arrival_ts = Some(epoch_seconds());
        record.arrival_index = Some(arrival_index);
        record
            .extra
            .insert("event".to_string(), Value::from("message_received"));

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        writer.write_all(&line).await?;

        if log_interval > 0 && arrival_index % log_interval == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 { arrival_index as f64 / elapsed } else { 0.0 };
            let percent = if total_messages > 0 {
                arrival_index as f64 / total_messages as f64 * 100.0
            } else {
                0.0
            };
            let eta = if rate > 0.0 {
                (total_messages as f64 - arrival_index as f64).max(0.0) / rate
            } else {
                0.0
            };
            info!(
                processed = arrival_index,
                total = total_messages,
                percent = %format!("{:.1}", percent),
                rate_per_sec = %format!("{:.1}", rate),
                elapsed_sec = %format!("{:.1}", elapsed),
                eta_sec = %format!("{:.1}", eta),
                "pubsub_progress"
            );
        }
    }

    writer.flush().await?;
    Ok(arrival_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ingestion::jsonl;
    use std::collections::HashSet;

    fn params(total: u64, delays: bool) -> SimulationParams {
        SimulationParams {
            total_messages: total,
            chaos: ChaosParams {
                dup_prob: 0.2,
                slow_prob: 0.2,
                base_delay: 0.0,
                jitter: 0.0,
            },
            options: PubSubOptions {
                buffer_size: 4,
                slow_path_delay_ms: 5,
                ..PubSubOptions::default()
            },
            delays,
        }
    }

    #[tokio::test]
    async fn test_every_sequence_id_is_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("sim.jsonl");

        let written = run_simulation(params(300, true), StdRng::seed_from_u64(42), &output)
            .await
            .unwrap();

        let records = jsonl::read_records(&output).unwrap();
        assert_eq!(records.len() as u64, written);
        assert!(written >= 300);

        let seqs: HashSet<i64> = records.iter().map(|r| r.sequence_id).collect();
        assert_eq!(seqs, (1..=300).collect::<HashSet<i64>>());

        let arrivals: Vec<u64> = records.iter().filter_map(|r| r.arrival_index).collect();
        assert_eq!(arrivals, (1..=written).collect::<Vec<u64>>());
        assert!(records.iter().all(|r| r.extra["event"] == "message_received"));
        assert!(records.iter().all(|r| (0..3).contains(&r.partition_id)));
    }

    #[tokio::test]
    async fn test_slow_path_reorders_arrivals() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("sim.jsonl");
        run_simulation(params(200, true), StdRng::seed_from_u64(9), &output)
            .await
            .unwrap();

        let records = jsonl::read_records(&output).unwrap();
        let out_of_order = records
            .windows(2)
            .filter(|w| w[1].sequence_id < w[0].sequence_id)
            .count();
        assert!(out_of_order > 0);
    }

    #[tokio::test]
    async fn test_speed_mode_produces_duplicates_without_delays() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("sim.jsonl");
        let written = run_simulation(params(500, false), StdRng::seed_from_u64(1), &output)
            .await
            .unwrap();
        assert!(written > 500);
    }
}
