//! Client-side event loop contexts.
//!
//! A [`MainContext`] is a queue of one-shot tasks that is drained by whichever
//! thread iterates it. Every thread carries a stack of default contexts; code
//! that wants callbacks delivered "where the caller lives" captures
//! [`MainContext::ref_thread_default`] at registration time.

use std::{
    cell::RefCell,
    fmt,
    marker::PhantomData,
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use tokio::sync::mpsc;
use tracing::warn;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

enum Dispatch {
    Task(Task),
    Wakeup,
}

struct ContextInner {
    sender: mpsc::UnboundedSender<Dispatch>,
    receiver: Mutex<mpsc::UnboundedReceiver<Dispatch>>,
    queued: AtomicUsize,
}

#[derive(Clone)]
pub struct MainContext {
    inner: Arc<ContextInner>,
}

static GLOBAL_CONTEXT: OnceLock<MainContext> = OnceLock::new();

thread_local! {
    static THREAD_DEFAULTS: RefCell<Vec<MainContext>> = const { RefCell::new(Vec::new()) };
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MainContext {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ContextInner {
                sender,
                receiver: Mutex::new(receiver),
                queued: AtomicUsize::new(0),
            }),
        }
    }

    /// The process-wide context used by threads that never pushed one.
    pub fn global() -> Self {
        GLOBAL_CONTEXT.get_or_init(MainContext::new).clone()
    }

    pub fn ref_thread_default() -> Self {
        THREAD_DEFAULTS
            .with(|stack| stack.borrow().last().cloned())
            .unwrap_or_else(Self::global)
    }

    /// Makes this context the calling thread's default until the guard drops.
    pub fn push_thread_default(&self) -> ThreadDefaultGuard {
        THREAD_DEFAULTS.with(|stack| stack.borrow_mut().push(self.clone()));
        ThreadDefaultGuard {
            context: self.clone(),
            _not_send: PhantomData,
        }
    }

    pub fn invoke<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.queued.fetch_add(1, Ordering::AcqRel);
        // The receiver lives inside `inner`, so the channel cannot be closed here.
        let _ = self.inner.sender.send(Dispatch::Task(Box::new(task)));
    }

    pub fn pending(&self) -> bool {
        self.inner.queued.load(Ordering::Acquire) > 0
    }

    /// Runs at most one queued task. Returns whether a task ran.
    ///
    /// With `may_block` the call parks until something is queued; it must not
    /// be made from inside an async runtime.
    pub fn iteration(&self, may_block: bool) -> bool {
        let dispatch = {
            let mut receiver = self
                .inner
                .receiver
                .lock()
                .expect("main context lock poisoned");
            if may_block {
                receiver.blocking_recv()
            } else {
                receiver.try_recv().ok()
            }
        };

        match dispatch {
            Some(Dispatch::Task(task)) => {
                self.inner.queued.fetch_sub(1, Ordering::AcqRel);
                task();
                true
            }
            Some(Dispatch::Wakeup) | None => false,
        }
    }

    /// Drains every task queued so far without blocking.
    pub fn dispatch_pending(&self) -> usize {
        let mut dispatched = 0;
        // Stale wakeups left behind by `MainLoop::quit` are skipped.
        while self.pending() {
            if self.iteration(false) {
                dispatched += 1;
            }
        }
        dispatched
    }

    pub fn ptr_eq(a: &MainContext, b: &MainContext) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    fn wakeup(&self) {
        let _ = self.inner.sender.send(Dispatch::Wakeup);
    }
}

impl fmt::Debug for MainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainContext")
            .field("queued", &self.inner.queued.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

pub struct ThreadDefaultGuard {
    context: MainContext,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ThreadDefaultGuard {
    fn drop(&mut self) {
        let popped = THREAD_DEFAULTS.with(|stack| stack.borrow_mut().pop());
        match popped {
            Some(popped) if MainContext::ptr_eq(&popped, &self.context) => {}
            _ => warn!("thread default main context popped out of order"),
        }
    }
}

#[derive(Clone)]
pub struct MainLoop {
    context: MainContext,
    running: Arc<AtomicBool>,
}

impl MainLoop {
    pub fn new(context: MainContext) -> Self {
        Self {
            context,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn context(&self) -> &MainContext {
        &self.context
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn run(&self) {
        self.running.store(true, Ordering::Release);
        while self.running.load(Ordering::Acquire) {
            self.context.iteration(true);
        }
    }

    pub fn quit(&self) {
        self.running.store(false, Ordering::Release);
        self.context.wakeup();
    }
}
