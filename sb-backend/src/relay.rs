use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    backend::Inner,
    engine::{DebugMessageHook, ScriptEngine},
    logging::category_relay,
};

/// One engine notification on its way to the client's main context.
///
/// Keeps the backend alive until the message has been delivered.
struct Envelope<E: ScriptEngine> {
    backend: Arc<Inner<E>>,
    message: String,
}

impl<E: ScriptEngine> Envelope<E> {
    fn deliver(self) {
        match self.backend.registry.current_handler() {
            Some(handler) => handler(&self.message),
            None => trace!(
                "{} handler removed before delivery, dropping message",
                category_relay()
            ),
        }
    }
}

impl<E: ScriptEngine> Inner<E> {
    /// Hook installed into the engine while a session is enabled.
    pub(crate) fn message_hook(self: &Arc<Self>) -> DebugMessageHook {
        let backend = Arc::downgrade(self);
        Arc::new(move |message: &str| {
            if let Some(backend) = backend.upgrade() {
                backend.capture(message);
            }
        })
    }

    fn capture(self: &Arc<Self>, message: &str) {
        let Some(context) = self.registry.capture_context() else {
            trace!(
                "{} no handler registered, discarding engine message",
                category_relay()
            );
            return;
        };

        let envelope = Envelope {
            backend: Arc::clone(self),
            message: message.to_owned(),
        };
        context.invoke(move || envelope.deliver());
    }

    pub(crate) fn post_command(self: &Arc<Self>, message: &str) {
        if !self.registry.is_registered() {
            trace!(
                "{} no handler registered, dropping posted command",
                category_relay()
            );
            return;
        }

        let command: Vec<u16> = message.encode_utf16().collect();
        self.engine.send_debug_command(&command);
        debug!(
            "{} posted command units={}",
            category_relay(),
            command.len()
        );

        let backend = Arc::clone(self);
        self.scheduler.push_job_on_engine_thread(
            self.job_priority,
            Box::new(move || backend.process_debug_messages()),
        );
    }

    fn process_debug_messages(&self) {
        let mut scope = self.engine.lock();
        let session = self.session.lock().expect("debug session lock poisoned");
        session.process_pending(&mut scope);
    }
}
