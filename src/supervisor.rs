//! Job Supervisor
//!
//! Owns the recurring jobs. Each job runs in its own task on its own
//! schedule, stops on a shared shutdown signal, and can also be run once on
//! demand so a single cycle can be driven without waiting on timers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A unit of recurring work
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// One cycle. Failures are handled and logged inside the job.
    async fn run_once(&self);
}

/// When a job runs: first after `initial_delay`, then every `period`
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub initial_delay: Duration,
    pub period: Duration,
}

impl Schedule {
    pub fn every(period: Duration) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            period,
        }
    }

    pub fn after(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }
}

pub struct Supervisor {
    shutdown: watch::Sender<bool>,
    jobs: HashMap<&'static str, Arc<dyn PeriodicJob>>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            jobs: HashMap::new(),
            handles: Vec::new(),
        }
    }

    /// Start a job on its schedule
    pub fn spawn(&mut self, job: Arc<dyn PeriodicJob>, schedule: Schedule) {
        let name = job.name();
        info!(
            "⏱️  Starting job {} (every {:?}, first run after {:?})",
            name, schedule.period, schedule.initial_delay
        );

        let handle = tokio::spawn(run_periodic(
            job.clone(),
            schedule,
            self.shutdown.subscribe(),
        ));

        self.jobs.insert(name, job);
        self.handles.push((name, handle));
    }

    /// Run one cycle of a job now; false if no such job is registered
    pub async fn run_now(&self, name: &str) -> bool {
        match self.jobs.get(name) {
            Some(job) => {
                job.run_once().await;
                true
            }
            None => false,
        }
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.jobs.keys().copied().collect();
        names.sort();
        names
    }

    /// Signal every job and wait for them to finish their current cycle
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);

        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                error!("Job {} exited abnormally: {}", name, e);
            }
        }

        info!("⏹️  All jobs stopped");
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_periodic(
    job: Arc<dyn PeriodicJob>,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) {
    if !schedule.initial_delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(schedule.initial_delay) => {}
            _ = shutdown.changed() => return,
        }
    }

    let mut interval = tokio::time::interval(schedule.period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => job.run_once().await,
            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl PeriodicJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_once(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_and_stop() {
        let job = Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
        });
        let mut supervisor = Supervisor::new();
        supervisor.spawn(
            job.clone(),
            Schedule::every(Duration::from_secs(60)).after(Duration::from_secs(10)),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);

        // First run right after the delay, then one per period
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);

        supervisor.stop().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_now() {
        let job = Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
        });
        let mut supervisor = Supervisor::new();
        supervisor.spawn(job.clone(), Schedule::every(Duration::from_secs(3600)).after(Duration::from_secs(3600)));

        assert!(supervisor.run_now("counting").await);
        assert!(!supervisor.run_now("missing").await);
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.job_names(), vec!["counting"]);

        supervisor.stop().await;
    }
}
