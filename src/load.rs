use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Sender, bounded, unbounded};
use tracing::{debug, info, info_span, warn};
use url::Url;

use crate::config::LoadTestSettings;
use crate::probe::{HttpProbe, ProbeResult};
use crate::stats::LoadTestReport;

const DEFAULT_BATCH_PAUSE: Duration = Duration::from_secs(1);

/// Validated parameters for one load-test run.
#[derive(Debug, Clone)]
pub struct LoadTestPlan {
    url: Url,
    concurrent_users: usize,
    duration: Duration,
    batch_pause: Duration,
}

impl LoadTestPlan {
    pub fn new(url: Url, concurrent_users: usize, duration: Duration) -> Result<Self> {
        if !matches!(url.scheme(), "http" | "https") {
            bail!("load test target {url} must be an http(s) URL");
        }
        if concurrent_users == 0 {
            bail!("load test requires at least one concurrent user");
        }
        if duration.is_zero() {
            bail!("load test duration must be positive");
        }
        Ok(Self {
            url,
            concurrent_users,
            duration,
            batch_pause: DEFAULT_BATCH_PAUSE,
        })
    }

    pub fn from_settings(url: Url, settings: &LoadTestSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::new(url, settings.concurrent_users, settings.duration())?
            .with_batch_pause(settings.batch_pause()))
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn concurrent_users(&self) -> usize {
        self.concurrent_users
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Raw output of a load-test run.
#[derive(Debug, Clone)]
pub struct LoadTestRun {
    pub results: Vec<ProbeResult>,
    pub batches: usize,
    pub elapsed: Duration,
}

impl LoadTestRun {
    pub fn report(&self) -> LoadTestReport {
        LoadTestReport::from_results(&self.results)
    }
}

/// Simulates concurrent virtual users hitting a single URL in batches.
///
/// This sends real traffic at the configured concurrency.
pub struct LoadGenerator {
    probe: HttpProbe,
    stop: Option<Arc<AtomicBool>>,
}

impl LoadGenerator {
    pub fn new(probe: HttpProbe) -> Self {
        Self { probe, stop: None }
    }

    /// Flag checked between batches; setting it ends the run after the
    /// batch in flight.
    pub fn with_stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn run(&self, plan: &LoadTestPlan) -> Result<LoadTestRun> {
        let span = info_span!(
            "load_test",
            url = %plan.url,
            users = plan.concurrent_users,
            duration_s = plan.duration.as_secs_f64()
        );
        let _guard = span.enter();

        if plan.duration < self.probe.timeout() {
            debug!(
                probe_timeout_s = self.probe.timeout().as_secs_f64(),
                "probe timeout exceeds test duration; a slow batch may extend the run"
            );
        }

        let pool = WorkerPool::spawn(plan.concurrent_users, self.probe.clone(), plan.url.clone())?;
        warn!(
            url = %plan.url,
            users = plan.concurrent_users,
            "starting load test; this generates real traffic against the target"
        );

        let started = Instant::now();
        let mut results = Vec::new();
        let mut batches = 0usize;

        while started.elapsed() < plan.duration && !self.stop_requested() {
            let batch = pool.run_batch(plan.concurrent_users);
            batches += 1;
            let succeeded = batch.iter().filter(|result| result.success).count();
            debug!(batch = batches, succeeded, total = batch.len(), "batch completed");
            results.extend(batch);

            if !plan.batch_pause.is_zero() {
                thread::sleep(plan.batch_pause);
            }
        }

        let elapsed = started.elapsed();
        drop(pool);

        info!(
            batches,
            requests = results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "load test finished"
        );

        Ok(LoadTestRun {
            results,
            batches,
            elapsed,
        })
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

struct ProbeJob {
    reply: Sender<ProbeResult>,
}

/// Fixed set of threads that each execute one probe per job.
struct WorkerPool {
    jobs: Option<Sender<ProbeJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn spawn(size: usize, probe: HttpProbe, url: Url) -> Result<Self> {
        let (jobs, queue) = unbounded::<ProbeJob>();
        let url = Arc::new(url);
        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let queue = queue.clone();
            let probe = probe.clone();
            let url = Arc::clone(&url);
            let handle = thread::Builder::new()
                .name(format!("sitepulse-user-{index}"))
                .spawn(move || {
                    for job in queue.iter() {
                        let result = probe.probe(&url);
                        // The collector only goes away once the batch is abandoned.
                        let _ = job.reply.send(result);
                    }
                })
                .with_context(|| format!("Failed to spawn load worker {index}"))?;
            workers.push(handle);
        }
        Ok(Self {
            jobs: Some(jobs),
            workers,
        })
    }

    /// Dispatch `size` probes and block until each one has reported.
    fn run_batch(&self, size: usize) -> Vec<ProbeResult> {
        let (reply, collected) = bounded(size);
        let mut dispatched = 0usize;
        if let Some(jobs) = &self.jobs {
            for _ in 0..size {
                if jobs
                    .send(ProbeJob {
                        reply: reply.clone(),
                    })
                    .is_err()
                {
                    break;
                }
                dispatched += 1;
            }
        }
        drop(reply);

        let mut results: Vec<ProbeResult> = collected.iter().collect();
        let missing = size.saturating_sub(results.len());
        if missing > 0 {
            warn!(
                dispatched,
                missing, "load workers exited before reporting; recording as failures"
            );
            results.extend(
                (0..missing).map(|_| ProbeResult::network_failure("load worker terminated")),
            );
        }
        results
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
