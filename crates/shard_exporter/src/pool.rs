//! Writer Pool
//!
//! One [`ShardWriter`] per discovered shard, indexed by shard ordinal. The
//! pool is built all-or-nothing: if the backend cannot create a writer for
//! any shard, no writer is started.

use crate::backend::StreamBackend;
use crate::config::ExporterConfig;
use crate::directory::ShardDirectory;
use crate::error::ExporterError;
use crate::shard::ShardDescriptor;
use crate::shard_writer::ShardWriter;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug)]
pub struct WriterPool {
    /// `writers[i]` serves the shard with ordinal `i`
    writers: Vec<Arc<ShardWriter>>,
}

impl WriterPool {
    /// Creates a writer for every shard in `directory`, then starts them all.
    pub fn start<B: StreamBackend>(
        directory: &ShardDirectory,
        backend: &B,
        config: &ExporterConfig,
    ) -> Result<Self, ExporterError> {
        let pool = Self::create(directory, backend, config)?;
        for writer in &pool.writers {
            writer.start();
        }
        info!(
            stream = %directory.stream_name(),
            writers = pool.len(),
            "started shard writers"
        );
        Ok(pool)
    }

    /// Creates, without starting, a writer for every shard.
    pub fn create<B: StreamBackend>(
        directory: &ShardDirectory,
        backend: &B,
        config: &ExporterConfig,
    ) -> Result<Self, ExporterError> {
        let writers = directory
            .shards()
            .iter()
            .map(|shard| {
                let external = backend
                    .create_writer(shard, &config.target, &config.producer)
                    .map_err(|source| ExporterError::WriterSetup {
                        shard_id: shard.id.clone(),
                        source,
                    })?;
                Ok(Arc::new(ShardWriter::new(
                    Arc::clone(shard),
                    external,
                    config.list.clone(),
                )))
            })
            .collect::<Result<Vec<_>, ExporterError>>()?;

        Ok(Self { writers })
    }

    /// The writer serving `shard`, which must come from the same directory.
    pub fn writer_for(&self, shard: &ShardDescriptor) -> Option<&Arc<ShardWriter>> {
        self.writers
            .get(shard.ordinal)
            .filter(|writer| writer.shard().id == shard.id)
    }

    pub fn writers(&self) -> &[Arc<ShardWriter>] {
        &self.writers
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Stops every writer concurrently and waits for all of them.
    ///
    /// Returns the number of writers whose stop failed.
    pub async fn stop_all(&self) -> usize {
        let mut stops = JoinSet::new();
        for writer in &self.writers {
            let writer = Arc::clone(writer);
            stops.spawn(async move {
                let result = writer.stop().await;
                (writer.shard().id.clone(), result)
            });
        }

        let mut failed = 0;
        while let Some(joined) = stops.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((shard_id, Err(error))) => {
                    failed += 1;
                    warn!(shard_id = %shard_id, error = %error, "stopping shard writer failed");
                }
                Err(error) => {
                    failed += 1;
                    warn!(error = %error, "shard writer stop task panicked");
                }
            }
        }
        failed
    }
}
