// Job scheduling: a bounded FIFO of pending jobs feeding a fixed pool of
// execution workers.

pub mod job;
pub mod process;
mod worker;

pub use job::{CommandFn, FileSet, JobOutcome, JobSink, SimulationJob};
pub use process::{ProcessLauncher, ProcessOutput, SystemLauncher};

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{CoreError, CoreResult};
use worker::{ExecutionWorker, WorkerSlot};

pub struct JobScheduler {
    queue: Mutex<Option<mpsc::Sender<SimulationJob>>>,
    permits: Arc<Semaphore>,
    /// Workers currently executing a job. The dispatcher may hold a permit
    /// while it waits for the next job, so this is not `permits` mirrored.
    running: Arc<AtomicUsize>,
    workers: usize,
    queue_capacity: usize,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl JobScheduler {
    /// Start the scheduler and its dispatch task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &SchedulerConfig, launcher: Arc<dyn ProcessLauncher>) -> CoreResult<Self> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let permits = Arc::new(Semaphore::new(config.workers));
        let running = Arc::new(AtomicUsize::new(0));

        let dispatcher = tokio::spawn(Self::dispatch_loop(
            receiver,
            permits.clone(),
            running.clone(),
            launcher,
            config.work_root.clone(),
        ));

        info!(
            "Job scheduler started with {} workers and queue capacity {}",
            config.workers, config.queue_capacity
        );

        Ok(Self {
            queue: Mutex::new(Some(sender)),
            permits,
            running,
            workers: config.workers,
            queue_capacity: config.queue_capacity,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Enqueue a job without waiting.
    ///
    /// Fails with `QueueFull` when the pending queue is at capacity; nothing is
    /// enqueued in that case.
    pub fn submit(&self, job: SimulationJob) -> CoreResult<Uuid> {
        let guard = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = guard.as_ref() else {
            return Err(CoreError::Internal("job scheduler is shut down".to_string()));
        };

        let id = job.id;
        match sender.try_send(job) {
            Ok(()) => {
                debug!("Queued job {}", id);
                Ok(id)
            }
            Err(TrySendError::Full(_)) => {
                warn!("Rejected job {}: {} jobs already pending", id, self.queue_capacity);
                Err(CoreError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(CoreError::Internal(
                "job dispatcher is not running".to_string(),
            )),
        }
    }

    /// Worker slots not currently executing a job.
    pub fn available_workers(&self) -> usize {
        self.workers.saturating_sub(self.running.load(Ordering::SeqCst))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs accepted but not yet handed to a worker.
    pub fn pending_jobs(&self) -> usize {
        let guard = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .map(|sender| sender.max_capacity() - sender.capacity())
            .unwrap_or(0)
    }

    /// Stop accepting jobs, let the queue drain and wait for running workers.
    pub async fn shutdown(&self) {
        let sender = self.queue.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(sender);

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                warn!("Job dispatcher ended abnormally: {}", e);
            }
        }

        // Every worker holds one permit until it finishes.
        match self.permits.acquire_many(self.workers as u32).await {
            Ok(all) => drop(all),
            Err(e) => warn!("Failed to wait for running workers: {}", e),
        }
        info!("Job scheduler stopped");
    }

    async fn dispatch_loop(
        mut queue: mpsc::Receiver<SimulationJob>,
        permits: Arc<Semaphore>,
        running: Arc<AtomicUsize>,
        launcher: Arc<dyn ProcessLauncher>,
        work_root: Option<PathBuf>,
    ) {
        debug!("Job dispatcher started");

        loop {
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let Some(job) = queue.recv().await else {
                break;
            };

            match ExecutionWorker::prepare(job, work_root.as_deref()).await {
                Ok(worker) => {
                    let slot = WorkerSlot::occupy(permit, running.clone());
                    tokio::spawn(worker.run(launcher.clone(), slot));
                }
                Err((job, e)) => {
                    warn!("Could not start worker for job {}: {}", job.id, e);
                    drop(permit);
                    tokio::spawn(job.reject(e));
                }
            }
        }

        debug!("Job dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VersionStatus;
    use async_trait::async_trait;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

    /// Blocks every launch on a gate and tracks how many run at once.
    struct GatedLauncher {
        gate: Semaphore,
        running: AtomicUsize,
        peak: AtomicUsize,
        started: UnboundedSender<()>,
    }

    impl GatedLauncher {
        fn new(started: UnboundedSender<()>) -> Self {
            Self {
                gate: Semaphore::new(0),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                started,
            }
        }

        fn open(&self, n: usize) {
            self.gate.add_permits(n);
        }
    }

    #[async_trait]
    impl ProcessLauncher for GatedLauncher {
        async fn launch(&self, args: &[String], _workdir: &Path) -> io::Result<ProcessOutput> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _ = self.started.send(());

            let pass = self.gate.acquire().await;
            if let Ok(pass) = pass {
                pass.forget();
            }

            self.running.fetch_sub(1, Ordering::SeqCst);
            if args.first().map(String::as_str) == Some("fail") {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such binary"));
            }
            Ok(ProcessOutput {
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    /// Sleeps briefly and tracks peak concurrency.
    struct SleepyLauncher {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ProcessLauncher for SleepyLauncher {
        async fn launch(&self, _args: &[String], _workdir: &Path) -> io::Result<ProcessOutput> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(ProcessOutput {
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    struct ChannelSink {
        statuses: AtomicUsize,
        done: UnboundedSender<JobOutcome>,
        panic_on_complete: bool,
    }

    #[async_trait]
    impl JobSink for ChannelSink {
        async fn status_update(&self, status: VersionStatus) {
            assert_eq!(status, VersionStatus::Running);
            self.statuses.fetch_add(1, Ordering::SeqCst);
        }

        async fn complete(&self, outcome: JobOutcome) {
            let _ = self.done.send(outcome);
            if self.panic_on_complete {
                panic!("sink failure");
            }
        }
    }

    fn sink(done: &UnboundedSender<JobOutcome>) -> Arc<ChannelSink> {
        Arc::new(ChannelSink {
            statuses: AtomicUsize::new(0),
            done: done.clone(),
            panic_on_complete: false,
        })
    }

    fn job_with(program: &'static str, sink: Arc<ChannelSink>) -> SimulationJob {
        SimulationJob::new(FileSet::new(), move |_: &Path| vec![program.to_string()], sink)
    }

    fn config(workers: usize, queue_capacity: usize) -> SchedulerConfig {
        SchedulerConfig {
            workers,
            queue_capacity,
            work_root: None,
        }
    }

    async fn collect(done: &mut UnboundedReceiver<JobOutcome>, n: usize) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..n {
            let outcome = tokio::time::timeout(Duration::from_secs(10), done.recv())
                .await
                .expect("job did not complete in time")
                .expect("sink channel closed");
            outcomes.push(outcome);
        }
        outcomes
    }

    #[tokio::test]
    async fn test_rejects_zero_workers() {
        let (started, _rx) = unbounded_channel();
        let result = JobScheduler::start(&config(0, 10), Arc::new(GatedLauncher::new(started)));
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_available_workers_counts_only_executing_jobs() {
        let (started_tx, mut started_rx) = unbounded_channel();
        let (done_tx, mut done_rx) = unbounded_channel();
        let launcher = Arc::new(GatedLauncher::new(started_tx));
        let scheduler = JobScheduler::start(&config(2, 4), launcher.clone()).unwrap();

        // Let the dispatcher park on an empty queue while holding a permit.
        tokio::task::yield_now().await;
        assert_eq!(scheduler.available_workers(), 2);

        scheduler.submit(job_with("sim", sink(&done_tx))).unwrap();
        started_rx.recv().await.unwrap();
        assert_eq!(scheduler.available_workers(), 1);

        launcher.open(1);
        collect(&mut done_rx, 1).await;
        scheduler.shutdown().await;
        assert_eq!(scheduler.available_workers(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_losing_accepted_jobs() {
        let (started_tx, mut started_rx) = unbounded_channel();
        let (done_tx, mut done_rx) = unbounded_channel();
        let launcher = Arc::new(GatedLauncher::new(started_tx));
        let scheduler = JobScheduler::start(&config(1, 2), launcher.clone()).unwrap();

        let first = scheduler.submit(job_with("sim", sink(&done_tx))).unwrap();
        started_rx.recv().await.unwrap();

        let second = scheduler.submit(job_with("sim", sink(&done_tx))).unwrap();
        let third = scheduler.submit(job_with("sim", sink(&done_tx))).unwrap();
        assert_eq!(scheduler.pending_jobs(), 2);

        let overflow = scheduler.submit(job_with("sim", sink(&done_tx)));
        assert_eq!(overflow.unwrap_err(), CoreError::QueueFull);
        assert_eq!(scheduler.pending_jobs(), 2);

        launcher.open(3);
        let mut finished: Vec<_> = collect(&mut done_rx, 3).await.into_iter().map(|o| o.job_id).collect();
        finished.sort();
        let mut expected = vec![first, second, third];
        expected.sort();
        assert_eq!(finished, expected);

        scheduler.shutdown().await;
        assert!(done_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_jobs_run_in_fifo_order_with_single_worker() {
        let (started_tx, mut started_rx) = unbounded_channel();
        let (done_tx, mut done_rx) = unbounded_channel();
        let launcher = Arc::new(GatedLauncher::new(started_tx));
        let scheduler = JobScheduler::start(&config(1, 10), launcher.clone()).unwrap();

        let ids: Vec<_> = (0..4)
            .map(|_| scheduler.submit(job_with("sim", sink(&done_tx))).unwrap())
            .collect();

        let mut order = Vec::new();
        for _ in 0..4 {
            started_rx.recv().await.unwrap();
            launcher.open(1);
            order.push(collect(&mut done_rx, 1).await[0].job_id);
        }

        assert_eq!(order, ids);
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_worker_count() {
        let (done_tx, mut done_rx) = unbounded_channel();
        let launcher = Arc::new(SleepyLauncher {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let scheduler = JobScheduler::start(&config(3, 100), launcher.clone()).unwrap();

        for _ in 0..30 {
            scheduler.submit(job_with("sim", sink(&done_tx))).unwrap();
        }
        let outcomes = collect(&mut done_rx, 30).await;
        scheduler.shutdown().await;

        assert!(outcomes.iter().all(JobOutcome::is_success));
        let peak = launcher.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {}", peak);
        assert!(peak >= 1);
        assert_eq!(scheduler.available_workers(), 3);
    }

    #[tokio::test]
    async fn test_permits_return_after_failures_and_sink_panics() {
        let (started_tx, _started_rx) = unbounded_channel();
        let (done_tx, mut done_rx) = unbounded_channel();
        let launcher = Arc::new(GatedLauncher::new(started_tx));
        launcher.open(100);
        let scheduler = JobScheduler::start(&config(2, 10), launcher.clone()).unwrap();

        let panicking = Arc::new(ChannelSink {
            statuses: AtomicUsize::new(0),
            done: done_tx.clone(),
            panic_on_complete: true,
        });
        let sinks: Vec<_> = (0..4).map(|_| sink(&done_tx)).collect();

        scheduler.submit(job_with("fail", sinks[0].clone())).unwrap();
        scheduler.submit(job_with("sim", panicking.clone())).unwrap();
        scheduler.submit(job_with("fail", sinks[1].clone())).unwrap();
        scheduler.submit(job_with("sim", sinks[2].clone())).unwrap();
        scheduler.submit(job_with("sim", sinks[3].clone())).unwrap();

        let outcomes = collect(&mut done_rx, 5).await;
        scheduler.shutdown().await;

        assert_eq!(outcomes.iter().filter(|o| o.errors.contains_key("process")).count(), 2);
        assert_eq!(scheduler.available_workers(), 2);
        for s in sinks.iter().chain([&panicking]) {
            assert_eq!(s.statuses.load(Ordering::SeqCst), 1);
        }
        assert!(done_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_worker_creation_failure_is_reported() {
        let (started_tx, _started_rx) = unbounded_channel();
        let (done_tx, mut done_rx) = unbounded_channel();
        let root = tempfile::tempdir().unwrap();
        let cfg = SchedulerConfig {
            workers: 1,
            queue_capacity: 4,
            work_root: Some(root.path().join("missing")),
        };
        let scheduler = JobScheduler::start(&cfg, Arc::new(GatedLauncher::new(started_tx))).unwrap();

        let job_sink = sink(&done_tx);
        let id = scheduler.submit(job_with("sim", job_sink.clone())).unwrap();
        let outcome = collect(&mut done_rx, 1).await.remove(0);
        scheduler.shutdown().await;

        assert_eq!(outcome.job_id, id);
        assert!(outcome.errors.contains_key("worker"));
        assert_eq!(job_sink.statuses.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.available_workers(), 1);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let (started_tx, _started_rx) = unbounded_channel();
        let (done_tx, _done_rx) = unbounded_channel();
        let scheduler = JobScheduler::start(&config(1, 1), Arc::new(GatedLauncher::new(started_tx))).unwrap();

        scheduler.shutdown().await;

        let err = scheduler.submit(job_with("sim", sink(&done_tx))).unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));
        assert_eq!(scheduler.pending_jobs(), 0);
    }
}
