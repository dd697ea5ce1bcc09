//! The slice of the embedded script engine the backend drives.

use std::sync::Arc;

/// Called by the engine, on the engine thread, for every protocol message it
/// emits while a debug session is active. The argument is the message text.
pub type DebugMessageHook = Arc<dyn Fn(&str) + Send + Sync>;

pub trait ScriptEngine: Send + Sync + 'static {
    /// Persistent handle into the engine's debug execution context.
    type DebugContext: Send + 'static;

    type Scope<'a>: EngineScope<DebugContext = Self::DebugContext>
    where
        Self: 'a;

    /// Takes the execution lock for the calling thread.
    ///
    /// Must be re-entrant: the backend may take it again from inside a
    /// debug message hook when the hook releases the last backend reference.
    fn lock(&self) -> Self::Scope<'_>;

    /// Queues a protocol command. Callable from any thread without the lock.
    fn send_debug_command(&self, command: &[u16]);

    fn apply_flags(&self, _flags: &[String]) {}
}

/// Operations that are only valid while the execution lock is held.
pub trait EngineScope {
    type DebugContext;

    fn set_debug_message_hook(&mut self, hook: Option<DebugMessageHook>);

    fn debug_context(&mut self) -> Self::DebugContext;

    /// Runs the debug runtime bootstrap script inside `context`.
    fn run_debug_runtime(&mut self, context: &Self::DebugContext);

    fn process_debug_messages(&mut self, context: &Self::DebugContext);

    fn release_debug_context(&mut self, context: Self::DebugContext);
}
