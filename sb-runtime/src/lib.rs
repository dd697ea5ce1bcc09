mod main_context;
mod scheduler;

pub use main_context::{MainContext, MainLoop, Task, ThreadDefaultGuard};
pub use scheduler::{Job, JobScheduler, ParsePriorityError, Priority, ScriptScheduler};
