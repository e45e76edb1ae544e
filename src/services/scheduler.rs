//! Timers and background tasks of one engine run, torn down in one place.
//! Repeated jobs run on tokio-cron-scheduler, long-lived loops are plain
//! tokio tasks tracked here so `shutdown` can abort them.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;

pub struct Scheduler {
    jobs: JobScheduler,
    job_ids: Mutex<Vec<(&'static str, Uuid)>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub async fn new() -> Result<Self, EngineError> {
        Ok(Self {
            jobs: JobScheduler::new().await?,
            job_ids: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Runs `f` every `period`, starting one period from now
    pub async fn every<F, Fut>(&self, name: &'static str, period: Duration, f: F) -> Result<(), EngineError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job = Job::new_repeated_async(period, move |_uuid, _l| Box::pin(f()))?;
        let id = self.jobs.add(job).await?;
        self.job_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, id));
        debug!("⏰ Scheduled {} every {:?}", name, period);
        Ok(())
    }

    /// Keeps a spawned task so it is aborted on shutdown
    pub fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    pub fn task_count(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| !t.is_finished())
            .count()
    }

    pub async fn start(&self) -> Result<(), EngineError> {
        self.jobs.start().await?;
        let names: Vec<&str> = self
            .job_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, _)| *name)
            .collect();
        info!("🔔 Scheduler started with jobs: {:?}", names);
        Ok(())
    }

    /// Aborts tracked tasks and stops repeated jobs
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in &tasks {
            task.abort();
        }

        let ids: Vec<_> = self
            .job_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for (name, id) in ids {
            if let Err(e) = self.jobs.remove(&id).await {
                warn!("⚠️ Failed to remove job {}: {}", name, e);
            }
        }
        let mut jobs = self.jobs.clone();
        jobs.shutdown().await?;
        debug!("🛑 Scheduler stopped ({} tasks aborted)", tasks.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_aborts_tracked_tasks() {
        let scheduler = Scheduler::new().await.unwrap();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        scheduler.track(handle);
        scheduler.start().await.unwrap();
        assert_eq!(scheduler.task_count(), 1);

        scheduler.shutdown().await.unwrap();
        assert_eq!(scheduler.task_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_job_runs() {
        let scheduler = Scheduler::new().await.unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        scheduler
            .every("counter", Duration::from_secs(1), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(2_600)).await;
        scheduler.shutdown().await.unwrap();
        assert!(hits.load(Ordering::SeqCst) >= 1);
    }
}
