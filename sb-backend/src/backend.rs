use std::{
    fmt, io,
    sync::{Arc, Mutex, PoisonError},
};

use runtime::{Job, JobScheduler, Priority, ScriptScheduler};
use tracing::{debug, info};

use crate::{
    config::{BackendConfig, ConfigError},
    engine::ScriptEngine,
    ignore::{IgnoreRegistry, ThreadId},
    logging::{category_debug, category_engine},
    registry::{DebugMessageHandler, HandlerRegistry},
    session::{DebugSession, SessionState},
};

#[derive(Debug)]
pub enum BackendError {
    Config(ConfigError),
    SpawnScheduler(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Config(err) => write!(f, "{err}"),
            BackendError::SpawnScheduler(err) => {
                write!(f, "failed to start engine thread: {err}")
            }
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Config(err) => Some(err),
            BackendError::SpawnScheduler(err) => Some(err),
        }
    }
}

impl From<ConfigError> for BackendError {
    fn from(err: ConfigError) -> Self {
        BackendError::Config(err)
    }
}

/// Shared state behind every [`ScriptBackend`] handle, pending job and
/// in-flight envelope. Teardown runs when the last of them is released.
pub(crate) struct Inner<E: ScriptEngine> {
    pub(crate) registry: HandlerRegistry,
    /// Only touched with the engine lock held.
    pub(crate) session: Mutex<DebugSession<E::DebugContext>>,
    pub(crate) ignored: IgnoreRegistry,
    pub(crate) job_priority: Priority,
    // Declared before `engine` so the scheduler goes away first.
    pub(crate) scheduler: Arc<dyn JobScheduler>,
    pub(crate) engine: E,
}

impl<E: ScriptEngine> Inner<E> {
    fn enable_debugger(self: &Arc<Self>) {
        let mut scope = self.engine.lock();
        let hook = self.message_hook();
        let mut session = self.session.lock().expect("debug session lock poisoned");
        session.enable(&mut scope, hook);
    }

    fn disable_debugger(&self) {
        let mut scope = self.engine.lock();
        let mut session = self.session.lock().expect("debug session lock poisoned");
        session.disable(&mut scope);
    }

    fn push_job(&self, priority: Priority, job: Job) {
        self.scheduler.push_job_on_engine_thread(priority, job);
    }
}

impl<E: ScriptEngine> Drop for Inner<E> {
    fn drop(&mut self) {
        drop(self.registry.take());

        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let mut scope = self.engine.lock();
        session.disable(&mut scope);
        drop(scope);

        info!("{} script backend disposed", category_engine());
    }
}

/// Debug bridge between the engine thread and client main contexts.
///
/// Cloning yields another counted handle to the same backend.
pub struct ScriptBackend<E: ScriptEngine> {
    inner: Arc<Inner<E>>,
}

impl<E: ScriptEngine> Clone for ScriptBackend<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: ScriptEngine> ScriptBackend<E> {
    /// Starts a dedicated engine thread and takes ownership of `engine`.
    pub fn new(engine: E, config: BackendConfig) -> Result<Self, BackendError> {
        config.validate()?;
        let scheduler = ScriptScheduler::start(&config.engine_thread_name)
            .map_err(BackendError::SpawnScheduler)?;
        Ok(Self::with_scheduler(engine, Arc::new(scheduler), &config))
    }

    pub fn with_scheduler(
        engine: E,
        scheduler: Arc<dyn JobScheduler>,
        config: &BackendConfig,
    ) -> Self {
        if !config.engine_flags.is_empty() {
            debug!(
                "{} applying engine flags {}",
                category_engine(),
                config.engine_flags.join(" ")
            );
            engine.apply_flags(&config.engine_flags);
        }

        Self {
            inner: Arc::new(Inner {
                registry: HandlerRegistry::default(),
                session: Mutex::new(DebugSession::default()),
                ignored: IgnoreRegistry::default(),
                job_priority: config.job_priority,
                scheduler,
                engine,
            }),
        }
    }

    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    pub fn scheduler(&self) -> &Arc<dyn JobScheduler> {
        &self.inner.scheduler
    }

    /// Registers, replaces or (with `None`) removes the message handler.
    ///
    /// Messages are delivered on the calling thread's default main context.
    /// The debug session is enabled or disabled asynchronously on the engine
    /// thread.
    pub fn set_debug_message_handler(&self, handler: Option<DebugMessageHandler>) {
        let enable = handler.is_some();
        drop(self.inner.registry.replace(handler));

        let backend = Arc::clone(&self.inner);
        let job: Job = if enable {
            Box::new(move || backend.enable_debugger())
        } else {
            Box::new(move || backend.disable_debugger())
        };
        debug!(
            "{} scheduling debugger {}",
            category_debug(),
            if enable { "enable" } else { "disable" }
        );
        self.inner.push_job(self.inner.job_priority, job);
    }

    pub fn clear_debug_message_handler(&self) {
        self.set_debug_message_handler(None);
    }

    /// Hands a protocol command to the engine. Dropped silently when no
    /// handler is registered.
    pub fn post_debug_message(&self, message: &str) {
        self.inner.post_command(message);
    }

    pub fn debug_session_state(&self) -> SessionState {
        self.inner
            .session
            .lock()
            .expect("debug session lock poisoned")
            .state()
    }

    pub fn ignore(&self, thread_id: ThreadId) {
        self.inner.ignored.ignore(thread_id);
    }

    pub fn unignore(&self, thread_id: ThreadId) {
        self.inner.ignored.unignore(thread_id);
    }

    /// Unignores `thread_id` once the engine thread has worked through the
    /// jobs already queued ahead of it.
    pub fn unignore_later(&self, thread_id: ThreadId) {
        let backend = Arc::clone(&self.inner);
        self.inner.push_job(
            Priority::Low,
            Box::new(move || backend.ignored.unignore(thread_id)),
        );
    }

    pub fn is_ignoring(&self, thread_id: ThreadId) -> bool {
        self.inner.ignored.is_ignoring(thread_id)
    }
}

impl<E: ScriptEngine> fmt::Debug for ScriptBackend<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptBackend")
            .field("handler_registered", &self.inner.registry.is_registered())
            .field("session", &self.debug_session_state())
            .field("job_priority", &self.inner.job_priority)
            .finish_non_exhaustive()
    }
}
