//! Fast in-memory generator with the same record shape as the simulator.
//! No sleeps: chaos is applied to the finished batch.

use super::{
    jsonl, random_message_id, random_zipcode, timestamped_output_path, DataSource, SourceContext,
};
use crate::config::{ChaosParams, PubSubOptions};
use crate::constants;
use crate::error::{PipelineError, Result};
use crate::types::EventRecord;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tracing::{debug, info};

pub struct SyntheticSource {
    ctx: SourceContext,
}

impl SyntheticSource {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl DataSource for SyntheticSource {
    fn name(&self) -> &str {
        constants::SYNTHETIC_SOURCE
    }

    async fn generate(&self) -> Result<PathBuf> {
        let generation = self.ctx.generation.clone();
        let options = self.ctx.options.pubsub.clone();
        let output = timestamped_output_path(
            &self.ctx.storage.raw_data_path,
            constants::SYNTHETIC_FILE_PREFIX,
        )?;

        info!(
            scale = generation.scale.0,
            seed = ?generation.seed,
            "synthetic_generation_starting"
        );

        let path = output.clone();
        let count = tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut rng = match generation.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let chaos = generation.chaos.sample(&mut rng);
            let records = generate_records(generation.scale.0, &chaos, &options, &mut rng);
            jsonl::write_records(&path, &records)?;
            Ok(records.len())
        })
        .await
        .map_err(|e| PipelineError::Task {
            task: "synthetic_generate".to_string(),
            message: e.to_string(),
        })??;

        self.validate_output(&output)?;
        let size_mb = std::fs::metadata(&output)?.len() as f64 / (1024.0 * 1024.0);
        info!(
            path = %output.display(),
            records = count,
            size_mb = %format!("{:.2}", size_mb),
            "synthetic_data_generated"
        );
        Ok(output)
    }
}

/// Build the batch: `scale` base rows, `floor(scale * dup_prob)` re-sampled
/// duplicates kept in sequence order, then `floor(len * slow_prob)` rows
/// permuted among their own positions.
pub fn generate_records(
    scale: u64,
    chaos: &ChaosParams,
    options: &PubSubOptions,
    rng: &mut StdRng,
) -> Vec<EventRecord> {
    let message = &options.message;
    let [value_lo, value_hi] = message.value_range;
    let partitions = options.partitions.max(1) as i64;

    let mut records: Vec<EventRecord> = (0..scale as i64)
        .map(|seq| {
            let mut record = EventRecord::new(
                &random_message_id(rng, message.id_length),
                seq,
                rng.gen_range(0..partitions),
                seq as f64 * 0.01,
            );
            record.value = Some(rng.gen_range(value_lo..=value_hi));
            record.zipcode = Some(random_zipcode(rng, message.zipcode_digits));
            record
        })
        .collect();

    let base_len = records.len();
    let n_dups = (base_len as f64 * chaos.dup_prob).floor() as usize;
    if n_dups > 0 {
        for _ in 0..n_dups {
            let idx = rng.gen_range(0..base_len);
            records.push(records[idx].clone());
        }
        records.sort_by_key(|r| r.sequence_id);
        debug!(count = n_dups, "duplicates_added");
    }

    let n_shuffle = (records.len() as f64 * chaos.slow_prob).floor() as usize;
    if n_shuffle > 1 {
        let mut positions = index::sample(rng, records.len(), n_shuffle).into_vec();
        positions.sort_unstable();
        let mut moved: Vec<EventRecord> = positions.iter().map(|&p| records[p].clone()).collect();
        moved.shuffle(rng);
        for (pos, record) in positions.into_iter().zip(moved) {
            records[pos] = record;
        }
        debug!(count = n_shuffle, "out_of_order_added");
    }

    for (i, record) in records.iter_mut().enumerate() {
        record.arrival_index = Some(i as u64 + 1);
    }
    records
}
