//! # Optimization Job Module
//!
//! Job persistente che esegue batch successivi fino a esaurire la selezione.
//!
//! ## Responsabilità:
//! - `JobRecord`: stato (`Pending → Running → Completed | Failed`), settings,
//!   cursore e totali del job
//! - `JobStore`: persistenza del job corrente in `<data_dir>/job_<hash>.json`
//! - `JobRunner`: esecuzione batch per batch con ripresa dopo un'interruzione
//!
//! ## Cursore:
//! Gli asset ottimizzati escono dalla selezione, quelli falliti restano. Il
//! cursore quindi avanza solo del numero di fallimenti di ogni batch e punta
//! sempre al primo asset non ancora tentato. Il job termina quando un batch
//! seleziona meno asset della sua dimensione.

use super::batch_controller::{BatchController, BatchResult};
use crate::config::Settings;
use crate::file_manager::FileManager;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Persistent state of a library-wide optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub state: JobState,
    pub settings: Settings,
    pub batch_size: usize,
    /// Offset of the next batch in the selection
    pub cursor: usize,
    pub batches_run: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_saved_bytes: u64,
    pub last_error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl JobRecord {
    pub fn new(settings: &Settings) -> Self {
        let now = now_secs();
        Self {
            id: format!("job-{}", now),
            state: JobState::Pending,
            settings: settings.clone(),
            batch_size: settings.batch_size.max(1),
            cursor: 0,
            batches_run: 0,
            succeeded: 0,
            failed: 0,
            total_saved_bytes: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Failed)
    }

    /// Applica il risultato di un batch a cursore e totali
    fn apply(&mut self, result: &BatchResult) {
        self.cursor += result.failed.len();
        self.batches_run += 1;
        self.succeeded += result.succeeded.len();
        self.failed += result.failed.len();
        self.total_saved_bytes += result.total_saved_bytes;
        self.state = if result.selected < self.batch_size {
            JobState::Completed
        } else {
            JobState::Running
        };
        self.updated_at = now_secs();
    }
}

/// Persistenza del job corrente di una libreria
pub struct JobStore {
    job_file_path: PathBuf,
}

impl JobStore {
    pub fn new(job_file_path: PathBuf) -> Self {
        Self { job_file_path }
    }

    pub fn for_library(data_dir: &Path, library_root: &Path) -> Self {
        let hash = FileManager::library_hash(library_root);

        Self::new(data_dir.join(format!("job_{}.json", hash)))
    }

    pub async fn load(&self) -> Result<Option<JobRecord>> {
        if !self.job_file_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.job_file_path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub async fn save(&self, job: &JobRecord) -> Result<()> {
        if let Some(parent) = self.job_file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(job)?;
        fs::write(&self.job_file_path, content).await?;
        Ok(())
    }
}

/// Esegue un job batch per batch sopra il controller stateless
pub struct JobRunner<'a> {
    controller: &'a BatchController,
    store: JobStore,
}

impl<'a> JobRunner<'a> {
    pub fn new(controller: &'a BatchController, store: JobStore) -> Self {
        Self { controller, store }
    }

    /// Resume the stored job when it is unfinished and uses the same encoding, otherwise start a new one
    pub async fn start(&self, settings: &Settings) -> Result<JobRecord> {
        if let Some(job) = self.store.load().await? {
            if !job.is_finished() && job.settings.same_encoding(settings) {
                info!(
                    "Resuming {} at cursor {} ({} processed)",
                    job.id,
                    job.cursor,
                    job.processed()
                );
                return Ok(job);
            }
        }

        let job = JobRecord::new(settings);
        self.store.save(&job).await?;
        info!("Started {} (batch size {})", job.id, job.batch_size);
        Ok(job)
    }

    /// Run the next batch of the job and persist the new cursor
    pub async fn step(&self, job: &mut JobRecord) -> Result<BatchResult> {
        job.state = JobState::Running;

        match self
            .controller
            .run_batch(job.batch_size, job.cursor, &job.settings)
            .await
        {
            Ok(result) => {
                job.apply(&result);
                self.store.save(job).await?;
                Ok(result)
            }
            Err(e) => {
                error!("{} failed: {}", job.id, e);
                job.state = JobState::Failed;
                job.last_error = Some(e.to_string());
                job.updated_at = now_secs();
                self.store.save(job).await?;
                Err(e.into())
            }
        }
    }

    /// Run batches until the job completes, calling `on_batch` after each one
    pub async fn run<F>(&self, settings: &Settings, mut on_batch: F) -> Result<JobRecord>
    where
        F: FnMut(&JobRecord, &BatchResult),
    {
        let mut job = self.start(settings).await?;
        while !job.is_finished() {
            let result = self.step(&mut job).await?;
            on_batch(&job, &result);
        }
        info!(
            "{} completed: {} optimized, {} failed",
            job.id, job.succeeded, job.failed
        );
        Ok(job)
    }

    pub async fn status(&self) -> Result<Option<JobRecord>> {
        self.store.load().await
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupStore;
    use crate::catalog::{AssetId, JsonCatalog};
    use crate::codec::testing::{SyntheticCodec, UNDECODABLE};
    use crate::config::{BackupKeying, CompressionMode};
    use crate::optimizer::AssetOptimizer;
    use crate::stats::{MemoryStatsStore, StatisticsAggregator};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn controller_with(temp_dir: &TempDir, contents: &[&[u8]]) -> BatchController {
        let catalog = JsonCatalog::open(&temp_dir.path().join("catalog.json"))
            .await
            .unwrap();
        for (i, bytes) in contents.iter().enumerate() {
            let path = temp_dir.path().join(format!("img{}.jpg", i + 1));
            std::fs::write(&path, bytes).unwrap();
            catalog.register(&path, "image/jpeg", Vec::new()).await.unwrap();
        }

        BatchController::new(
            Arc::new(catalog),
            AssetOptimizer::new(
                Arc::new(SyntheticCodec::with_ratio(0.5)),
                BackupStore::new(temp_dir.path().join("backups"), BackupKeying::AssetId),
            ),
            StatisticsAggregator::new(Arc::new(MemoryStatsStore::new())),
        )
    }

    fn settings(batch_size: usize) -> Settings {
        Settings {
            batch_size,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cursor_skips_only_failures() {
        let temp_dir = TempDir::new().unwrap();
        let good = vec![1u8; 1000];
        let controller = controller_with(&temp_dir, &[&good, UNDECODABLE, &good]).await;
        let runner = JobRunner::new(&controller, JobStore::new(temp_dir.path().join("job.json")));

        let mut job = runner.start(&settings(2)).await.unwrap();
        assert_eq!(job.state, JobState::Pending);

        // Selezione [3, 2]: 3 riesce, 2 fallisce
        let first = runner.step(&mut job).await.unwrap();
        assert_eq!(first.selected, 2);
        assert_eq!(job.cursor, 1);
        assert_eq!(job.state, JobState::Running);

        // Selezione [2, 1] dal cursore 1: resta solo 1
        let second = runner.step(&mut job).await.unwrap();
        assert_eq!(second.succeeded[0].id, AssetId(1));
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.succeeded, 2);
        assert_eq!(job.failed, 1);
        assert_eq!(job.total_saved_bytes, 1000);

        let remaining = controller
            .catalog()
            .select_unoptimized(&job.settings, 10, 0)
            .await
            .unwrap();
        assert_eq!(remaining, vec![AssetId(2)]);
    }

    #[tokio::test]
    async fn test_job_resumes_from_store() {
        let temp_dir = TempDir::new().unwrap();
        let good = vec![1u8; 1000];
        let controller = controller_with(&temp_dir, &[&good, &good, &good, &good]).await;
        let job_path = temp_dir.path().join("job.json");

        let runner = JobRunner::new(&controller, JobStore::new(job_path.clone()));
        let mut job = runner.start(&settings(2)).await.unwrap();
        runner.step(&mut job).await.unwrap();

        let resumed_runner = JobRunner::new(&controller, JobStore::new(job_path.clone()));
        let resumed = resumed_runner.start(&settings(2)).await.unwrap();
        assert_eq!(resumed.id, job.id);
        assert_eq!(resumed.succeeded, 2);

        // Encoding diverso: nuovo job
        let other = settings(2).with_encoding(CompressionMode::Lossless, 80);
        let fresh = resumed_runner.start(&other).await.unwrap();
        assert_eq!(fresh.succeeded, 0);
        assert_eq!(fresh.state, JobState::Pending);
    }

    #[tokio::test]
    async fn test_run_until_completed() {
        let temp_dir = TempDir::new().unwrap();
        let good = vec![1u8; 1000];
        let controller =
            controller_with(&temp_dir, &[&good, &good, UNDECODABLE, &good, &good]).await;
        let runner = JobRunner::new(&controller, JobStore::new(temp_dir.path().join("job.json")));

        let mut batches = 0;
        let job = runner
            .run(&settings(2), |_, _| batches += 1)
            .await
            .unwrap();

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.succeeded, 4);
        assert_eq!(job.failed, 1);
        assert_eq!(batches, job.batches_run);
        assert_eq!(runner.status().await.unwrap().unwrap().state, JobState::Completed);
    }
}
