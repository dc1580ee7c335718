use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Outcome counts of a scheduled run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleReport {
    pub total: usize,
    pub batches: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Runs independent tasks on a bounded worker pool, one batch at a time.
///
/// At most `parallel` tasks run concurrently and at most `batch_size` are in
/// flight; the next batch is submitted only after every task of the current
/// one has finished or failed.
#[derive(Debug, Clone)]
pub struct Scheduler {
    parallel: usize,
    batch_size: usize,
}

impl Scheduler {
    pub fn new(parallel: usize, batch_size: usize) -> Self {
        Self {
            parallel: parallel.max(1),
            batch_size: batch_size.max(1),
        }
    }

    /// Run every task through `worker`.
    ///
    /// A task that errors or panics is logged and counted as failed; it never
    /// cancels its siblings or stops later batches.
    pub async fn run<T, F, Fut>(&self, tasks: Vec<T>, worker: F) -> ScheduleReport
    where
        T: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let total = tasks.len();
        let batch_count = total.div_ceil(self.batch_size);
        let semaphore = Arc::new(Semaphore::new(self.parallel));
        let mut report = ScheduleReport {
            total,
            batches: batch_count,
            ..Default::default()
        };

        info!(
            total,
            batches = batch_count,
            parallel = self.parallel,
            "Total tasks to process: {}",
            total
        );

        let mut remaining = tasks.into_iter();
        for batch_index in 1..=batch_count {
            let mut join_set = JoinSet::new();
            for task in remaining.by_ref().take(self.batch_size) {
                let semaphore = Arc::clone(&semaphore);
                let job = worker(task);
                join_set.spawn(async move {
                    let _permit = semaphore.acquire_owned().await?;
                    job.await
                });
            }

            let batch_len = join_set.len();
            info!("Processing batch {}/{} ({} tasks)", batch_index, batch_count, batch_len);

            let mut done = 0;
            while let Some(joined) = join_set.join_next().await {
                done += 1;
                match joined {
                    Ok(Ok(())) => report.completed += 1,
                    Ok(Err(e)) => {
                        report.failed += 1;
                        error!(batch = batch_index, "Task failed: {:#}", e);
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!(batch = batch_index, "Task aborted: {}", e);
                    }
                }
                debug!(batch = batch_index, done, of = batch_len, "Batch progress");
            }

            info!(
                completed = report.completed,
                failed = report.failed,
                "Finished batch {}/{}",
                batch_index,
                batch_count
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_runs_every_task_in_batches() {
        let ran = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(8, 100);

        let counter = Arc::clone(&ran);
        let report = scheduler
            .run((0..250).collect(), move |_: usize| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            })
            .await;

        assert_eq!(
            report,
            ScheduleReport {
                total: 250,
                batches: 3,
                completed: 250,
                failed: 0
            }
        );
        assert_eq!(ran.load(Ordering::SeqCst), 250);
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let report = Scheduler::new(4, 10)
            .run(Vec::<usize>::new(), |_| async { anyhow::Ok(()) })
            .await;
        assert_eq!(report, ScheduleReport::default());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_siblings() {
        let report = Scheduler::new(4, 5)
            .run((0..20).collect(), |i: usize| async move {
                if i % 4 == 0 {
                    bail!("task {} failed", i);
                }
                anyhow::Ok(())
            })
            .await;

        assert_eq!(report.completed, 15);
        assert_eq!(report.failed, 5);
        assert_eq!(report.batches, 4);
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let report = Scheduler::new(2, 10)
            .run((0..6).collect(), |i: usize| async move {
                if i == 3 {
                    panic!("worker blew up");
                }
                anyhow::Ok(())
            })
            .await;

        assert_eq!(report.completed, 5);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallelism_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let report = Scheduler::new(3, 50)
            .run((0..24).collect(), move |_: usize| {
                let (running, peak) = (Arc::clone(&r), Arc::clone(&p));
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            })
            .await;

        assert_eq!(report.completed, 24);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_next_batch_waits_for_current_batch() {
        let events = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&events);
        Scheduler::new(4, 2)
            .run((0..6).collect(), move |i: usize| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(("start", i));
                    // the first task of each batch is the slow one
                    if i % 2 == 0 {
                        sleep(Duration::from_millis(20)).await;
                    }
                    log.lock().unwrap().push(("end", i));
                    anyhow::Ok(())
                }
            })
            .await;

        let events = events.lock().unwrap();
        let position = |kind: &str, i: usize| {
            events
                .iter()
                .position(|&(k, n)| k == kind && n == i)
                .unwrap()
        };
        for batch in 0..2 {
            let last_end = position("end", batch * 2).max(position("end", batch * 2 + 1));
            let next_start = position("start", batch * 2 + 2).min(position("start", batch * 2 + 3));
            assert!(last_end < next_start);
        }
    }
}
