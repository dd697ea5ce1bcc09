mod backend;
mod config;
mod engine;
mod ignore;
mod logging;
mod registry;
mod relay;
mod session;

pub use runtime::{
    Job, JobScheduler, MainContext, MainLoop, Priority, ScriptScheduler, ThreadDefaultGuard,
};

pub use backend::{BackendError, ScriptBackend};
pub use config::{
    BackendConfig, ConfigError, ENV_ENGINE_FLAGS, ENV_ENGINE_THREAD_NAME, ENV_JOB_PRIORITY,
};
pub use engine::{DebugMessageHook, EngineScope, ScriptEngine};
pub use ignore::ThreadId;
pub use logging::init as init_logging;
pub use registry::DebugMessageHandler;
pub use session::SessionState;
