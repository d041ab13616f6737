//! Builds the pipeline from a [`WorkerConfig`].

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tokio::runtime::Handle;

use agritrain_events::{EntryMutation, InMemoryEventBus, TaskEnqueued};
use agritrain_infra::config::{StoreBackend, WorkerConfig};
use agritrain_infra::knowledge::{InMemoryKnowledgeBase, KnowledgeBase, PostgresKnowledgeBase};
use agritrain_infra::maintenance::{RetentionEnforcer, RetentionPolicy, StaleTaskSweeper};
use agritrain_infra::processor::QueueProcessor;
use agritrain_infra::registry::{InMemoryModelRegistry, ModelRegistry, PostgresModelRegistry};
use agritrain_infra::scheduler::TrainingScheduler;
use agritrain_infra::tasks::{InMemoryTaskStore, PostgresTaskStore, TaskStore};
use agritrain_infra::watcher::ChangeWatcher;
use agritrain_training::{CentroidTrainingJob, FsBlobStore};

pub type Processor = QueueProcessor<
    Arc<dyn TaskStore>,
    Arc<dyn KnowledgeBase>,
    CentroidTrainingJob<Arc<FsBlobStore>, Arc<FsBlobStore>>,
    Arc<dyn ModelRegistry>,
>;

/// In-process mutation feed, present only with the in-memory backend.
pub struct DevFeed {
    pub knowledge: Arc<InMemoryKnowledgeBase>,
    pub mutations: Arc<InMemoryEventBus<EntryMutation>>,
}

pub struct Backends {
    pub tasks: Arc<dyn TaskStore>,
    pub knowledge: Arc<dyn KnowledgeBase>,
    pub registry: Arc<dyn ModelRegistry>,
    pub dev_feed: Option<DevFeed>,
}

impl Backends {
    pub async fn connect(config: &WorkerConfig) -> anyhow::Result<Self> {
        match config.store {
            StoreBackend::Memory => {
                let mutations = Arc::new(InMemoryEventBus::new());
                let knowledge = Arc::new(InMemoryKnowledgeBase::with_feed(mutations.clone()));
                Ok(Self {
                    tasks: Arc::new(InMemoryTaskStore::new()),
                    knowledge: knowledge.clone(),
                    registry: Arc::new(InMemoryModelRegistry::new()),
                    dev_feed: Some(DevFeed {
                        knowledge,
                        mutations,
                    }),
                })
            }
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is required for the postgres store")?;
                let pool = PgPool::connect(url)
                    .await
                    .context("failed to connect to Postgres")?;
                agritrain_infra::pg::apply_schema(&pool)
                    .await
                    .context("failed to apply schema")?;

                let runtime = Handle::current();
                Ok(Self {
                    tasks: Arc::new(PostgresTaskStore::new(pool.clone(), runtime.clone())),
                    knowledge: Arc::new(PostgresKnowledgeBase::new(pool.clone(), runtime.clone())),
                    registry: Arc::new(PostgresModelRegistry::new(pool, runtime)),
                    dev_feed: None,
                })
            }
        }
    }

    pub fn watcher(&self) -> ChangeWatcher<Arc<dyn TaskStore>, Arc<InMemoryEventBus<TaskEnqueued>>> {
        ChangeWatcher::new(self.tasks.clone(), Arc::new(InMemoryEventBus::new()))
    }

    pub fn scheduler(&self, config: &WorkerConfig) -> TrainingScheduler<Processor> {
        let blobs = Arc::new(FsBlobStore::new(config.blob_root.clone()));
        let processor = QueueProcessor::new(
            self.tasks.clone(),
            self.knowledge.clone(),
            CentroidTrainingJob::new(blobs.clone(), blobs),
            self.registry.clone(),
        )
        .with_config(config.processor);

        let mut scheduler = TrainingScheduler::new(processor);
        if let Some(stale_after) = config.stale_after {
            scheduler =
                scheduler.with_housekeeping(StaleTaskSweeper::new(self.tasks.clone(), stale_after));
        }
        if config.retention != RetentionPolicy::KeepAll {
            scheduler = scheduler
                .with_housekeeping(RetentionEnforcer::new(self.tasks.clone(), config.retention));
        }
        scheduler
    }
}
