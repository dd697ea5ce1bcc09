use std::{
    fmt, io,
    panic::{self, AssertUnwindSafe},
    str::FromStr,
    sync::{Mutex, PoisonError},
    thread::{self, JoinHandle, ThreadId},
};

use serde::Deserialize;
use tokio::{
    runtime::Runtime,
    sync::{mpsc, oneshot},
};
use tracing::{debug, error};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Default,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Default => "default",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsePriorityError(String);

impl fmt::Display for ParsePriorityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown priority '{}', expected high, default or low",
            self.0
        )
    }
}

impl std::error::Error for ParsePriorityError {}

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "default" => Ok(Priority::Default),
            "low" => Ok(Priority::Low),
            _ => Err(ParsePriorityError(value.to_string())),
        }
    }
}

/// Runs jobs on the single thread that owns the script engine.
///
/// Jobs run exactly once, in submission order within a priority class.
pub trait JobScheduler: Send + Sync {
    fn push_job_on_engine_thread(&self, priority: Priority, job: Job);
}

struct Senders {
    high: mpsc::UnboundedSender<Job>,
    default: mpsc::UnboundedSender<Job>,
    low: mpsc::UnboundedSender<Job>,
}

impl Senders {
    fn for_priority(&self, priority: Priority) -> &mpsc::UnboundedSender<Job> {
        match priority {
            Priority::High => &self.high,
            Priority::Default => &self.default,
            Priority::Low => &self.low,
        }
    }
}

struct Receivers {
    high: mpsc::UnboundedReceiver<Job>,
    default: mpsc::UnboundedReceiver<Job>,
    low: mpsc::UnboundedReceiver<Job>,
}

impl Receivers {
    async fn next_job(&mut self) -> Option<Job> {
        tokio::select! {
            biased;
            Some(job) = self.high.recv() => Some(job),
            Some(job) = self.default.recv() => Some(job),
            Some(job) = self.low.recv() => Some(job),
            else => None,
        }
    }
}

pub struct ScriptScheduler {
    name: String,
    thread_id: ThreadId,
    senders: Mutex<Option<Senders>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptScheduler {
    pub fn start(name: &str) -> io::Result<Self> {
        let (high_tx, high) = mpsc::unbounded_channel();
        let (default_tx, default) = mpsc::unbounded_channel();
        let (low_tx, low) = mpsc::unbounded_channel();
        let receivers = Receivers { high, default, low };

        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_engine_thread(runtime, receivers))?;
        let thread_id = handle.thread().id();
        debug!("engine thread {name} started");

        Ok(Self {
            name: name.to_string(),
            thread_id,
            senders: Mutex::new(Some(Senders {
                high: high_tx,
                default: default_tx,
                low: low_tx,
            })),
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_engine_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Runs `f` on the engine thread and waits for its result.
    ///
    /// Returns `None` if the job never ran (scheduler stopped) or panicked.
    /// Must not be called from inside an async runtime.
    pub fn run_sync<R, F>(&self, priority: Priority, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_engine_thread() {
            return Some(f());
        }

        let (tx, rx) = oneshot::channel();
        self.push_job_on_engine_thread(
            priority,
            Box::new(move || {
                let _ = tx.send(f());
            }),
        );
        rx.blocking_recv().ok()
    }

    pub fn is_running(&self) -> bool {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Closes the queues and waits for already queued jobs to finish.
    pub fn stop(&self) {
        let senders = self
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(senders);

        let Some(handle) = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        if self.is_engine_thread() {
            debug!("engine thread {} stopped from itself, detaching", self.name);
            return;
        }
        if handle.join().is_err() {
            error!("engine thread {} terminated abnormally", self.name);
        } else {
            debug!("engine thread {} stopped", self.name);
        }
    }
}

impl JobScheduler for ScriptScheduler {
    fn push_job_on_engine_thread(&self, priority: Priority, job: Job) {
        let rejected = {
            let senders = self.senders.lock().expect("scheduler lock poisoned");
            match senders.as_ref() {
                Some(senders) => senders
                    .for_priority(priority)
                    .send(job)
                    .err()
                    .map(|err| err.0),
                None => Some(job),
            }
        };

        if let Some(job) = rejected {
            error!(
                "engine thread {} is not running; dropping {priority} job",
                self.name
            );
            drop(job);
        }
    }
}

impl Drop for ScriptScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ScriptScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptScheduler")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run_engine_thread(runtime: Runtime, mut receivers: Receivers) {
    while let Some(job) = runtime.block_on(receivers.next_job()) {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("job panicked on engine thread");
        }
    }
}
