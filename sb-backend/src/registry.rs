use std::sync::{Arc, Mutex, PoisonError};

use runtime::MainContext;

/// Client callback for debug protocol messages. The closure owns whatever
/// client state it needs; dropping the last reference releases that state.
pub type DebugMessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Registration {
    handler: Option<DebugMessageHandler>,
    context: Option<MainContext>,
}

impl Registration {
    pub(crate) fn is_registered(&self) -> bool {
        self.handler.is_some()
    }
}

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    current: Mutex<Registration>,
}

impl HandlerRegistry {
    /// Swaps in `handler` and returns the previous registration.
    ///
    /// The caller drops the returned value after this returns, so the old
    /// handler is released outside the lock.
    #[must_use = "the previous registration must be dropped outside the lock"]
    pub(crate) fn replace(&self, handler: Option<DebugMessageHandler>) -> Registration {
        let context = handler.as_ref().map(|_| MainContext::ref_thread_default());
        let next = Registration { handler, context };
        let mut current = self.current.lock().expect("handler registry lock poisoned");
        std::mem::replace(&mut *current, next)
    }

    pub(crate) fn capture_context(&self) -> Option<MainContext> {
        self.current
            .lock()
            .expect("handler registry lock poisoned")
            .context
            .clone()
    }

    pub(crate) fn current_handler(&self) -> Option<DebugMessageHandler> {
        self.current
            .lock()
            .expect("handler registry lock poisoned")
            .handler
            .clone()
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.current
            .lock()
            .expect("handler registry lock poisoned")
            .is_registered()
    }

    pub(crate) fn take(&mut self) -> Registration {
        std::mem::take(
            self.current
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}
