use serde::Serialize;
use tracing::{debug, info};

use crate::{
    engine::{DebugMessageHook, EngineScope},
    logging::category_debug,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disabled,
    Enabled,
}

/// Holds the persistent debug context while a session is enabled.
///
/// Every method takes the engine scope, so the context is only created, used
/// and released with the execution lock held.
pub(crate) struct DebugSession<C> {
    context: Option<C>,
}

impl<C> Default for DebugSession<C> {
    fn default() -> Self {
        Self { context: None }
    }
}

impl<C> DebugSession<C> {
    pub(crate) fn state(&self) -> SessionState {
        if self.context.is_some() {
            SessionState::Enabled
        } else {
            SessionState::Disabled
        }
    }

    /// Returns `false` when a session was already enabled; the existing
    /// context is kept.
    pub(crate) fn enable<S>(&mut self, scope: &mut S, hook: DebugMessageHook) -> bool
    where
        S: EngineScope<DebugContext = C>,
    {
        if self.context.is_some() {
            debug!("{} enable ignored, session already active", category_debug());
            return false;
        }

        scope.set_debug_message_hook(Some(hook));
        let context = scope.debug_context();
        scope.run_debug_runtime(&context);
        self.context = Some(context);
        info!("{} debug session enabled", category_debug());
        true
    }

    pub(crate) fn disable<S>(&mut self, scope: &mut S) -> bool
    where
        S: EngineScope<DebugContext = C>,
    {
        let context = self.context.take();
        let was_enabled = context.is_some();
        if let Some(context) = context {
            scope.release_debug_context(context);
        }
        scope.set_debug_message_hook(None);
        if was_enabled {
            info!("{} debug session disabled", category_debug());
        }
        was_enabled
    }

    pub(crate) fn process_pending<S>(&self, scope: &mut S) -> bool
    where
        S: EngineScope<DebugContext = C>,
    {
        match self.context.as_ref() {
            Some(context) => {
                scope.process_debug_messages(context);
                true
            }
            None => {
                debug!(
                    "{} skipping message processing, no active session",
                    category_debug()
                );
                false
            }
        }
    }
}
