#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    thread::{self, ThreadId},
};

use backend::{
    DebugMessageHandler, DebugMessageHook, EngineScope, Job, JobScheduler, Priority, ScriptEngine,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    FlagsApplied(Vec<String>),
    HookInstalled,
    HookRemoved,
    ContextAcquired(u32),
    RuntimeBootstrapped(u32),
    MessagesProcessed { context: u32, commands: Vec<String> },
    ContextReleased(u32),
    Dropped,
}

#[derive(Default)]
pub struct EngineProbe {
    events: Mutex<Vec<(EngineEvent, ThreadId)>>,
    hook: Mutex<Option<DebugMessageHook>>,
    received: Mutex<Vec<String>>,
    pending: Mutex<VecDeque<String>>,
    next_context: AtomicU32,
}

impl EngineProbe {
    fn record(&self, event: EngineEvent) {
        self.events
            .lock()
            .expect("events lock")
            .push((event, thread::current().id()));
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .expect("events lock")
            .iter()
            .map(|(event, _)| event.clone())
            .collect()
    }

    pub fn events_with_threads(&self) -> Vec<(EngineEvent, ThreadId)> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn count(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    pub fn position(&self, event: &EngineEvent) -> Option<usize> {
        self.events().iter().position(|candidate| candidate == event)
    }

    pub fn received_commands(&self) -> Vec<String> {
        self.received.lock().expect("received lock").clone()
    }

    pub fn hook_installed(&self) -> bool {
        self.hook.lock().expect("hook lock").is_some()
    }

    /// Emits a notification through the installed hook, as the engine would.
    pub fn emit(&self, message: &str) -> bool {
        let hook = self.hook.lock().expect("hook lock").clone();
        match hook {
            Some(hook) => {
                hook(message);
                true
            }
            None => false,
        }
    }
}

pub struct RecordingEngine {
    probe: Arc<EngineProbe>,
}

impl RecordingEngine {
    pub fn new() -> (Self, Arc<EngineProbe>) {
        let probe = Arc::new(EngineProbe::default());
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        self.probe.record(EngineEvent::Dropped);
    }
}

pub struct RecordingScope<'a> {
    probe: &'a EngineProbe,
}

impl ScriptEngine for RecordingEngine {
    type DebugContext = u32;
    type Scope<'a> = RecordingScope<'a>;

    fn lock(&self) -> RecordingScope<'_> {
        RecordingScope { probe: &self.probe }
    }

    fn send_debug_command(&self, command: &[u16]) {
        let text = String::from_utf16(command).expect("command should be valid utf-16");
        self.probe
            .received
            .lock()
            .expect("received lock")
            .push(text.clone());
        self.probe
            .pending
            .lock()
            .expect("pending lock")
            .push_back(text);
    }

    fn apply_flags(&self, flags: &[String]) {
        self.probe.record(EngineEvent::FlagsApplied(flags.to_vec()));
    }
}

impl EngineScope for RecordingScope<'_> {
    type DebugContext = u32;

    fn set_debug_message_hook(&mut self, hook: Option<DebugMessageHook>) {
        let event = if hook.is_some() {
            EngineEvent::HookInstalled
        } else {
            EngineEvent::HookRemoved
        };
        *self.probe.hook.lock().expect("hook lock") = hook;
        self.probe.record(event);
    }

    fn debug_context(&mut self) -> u32 {
        let context = self.probe.next_context.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.record(EngineEvent::ContextAcquired(context));
        context
    }

    fn run_debug_runtime(&mut self, context: &u32) {
        self.probe
            .record(EngineEvent::RuntimeBootstrapped(*context));
    }

    fn process_debug_messages(&mut self, context: &u32) {
        let commands: Vec<String> = self
            .probe
            .pending
            .lock()
            .expect("pending lock")
            .drain(..)
            .collect();
        self.probe.record(EngineEvent::MessagesProcessed {
            context: *context,
            commands: commands.clone(),
        });
        for command in commands {
            self.probe.emit(&response_for(&command));
        }
    }

    fn release_debug_context(&mut self, context: u32) {
        self.probe.record(EngineEvent::ContextReleased(context));
    }
}

pub fn response_for(command: &str) -> String {
    format!(r#"{{"type":"response","request":{command}}}"#)
}

/// Queues jobs until the test runs them; the running thread plays the engine
/// thread.
#[derive(Default)]
pub struct ManualScheduler {
    jobs: Mutex<VecDeque<(Priority, Job)>>,
    pushed: AtomicUsize,
}

fn rank(priority: Priority) -> u8 {
    match priority {
        Priority::High => 0,
        Priority::Default => 1,
        Priority::Low => 2,
    }
}

impl ManualScheduler {
    pub fn pending(&self) -> usize {
        self.jobs.lock().expect("jobs lock").len()
    }

    pub fn pushed(&self) -> usize {
        self.pushed.load(Ordering::SeqCst)
    }

    pub fn take_jobs(&self) -> Vec<(Priority, Job)> {
        self.jobs.lock().expect("jobs lock").drain(..).collect()
    }

    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = {
                let mut jobs = self.jobs.lock().expect("jobs lock");
                let index = jobs
                    .iter()
                    .enumerate()
                    .min_by_key(|(index, (priority, _))| (rank(*priority), *index))
                    .map(|(index, _)| index);
                index.and_then(|index| jobs.remove(index))
            };
            let Some((_, job)) = next else {
                return ran;
            };
            job();
            ran += 1;
        }
    }
}

impl JobScheduler for ManualScheduler {
    fn push_job_on_engine_thread(&self, priority: Priority, job: Job) {
        self.pushed.fetch_add(1, Ordering::SeqCst);
        self.jobs
            .lock()
            .expect("jobs lock")
            .push_back((priority, job));
    }
}

#[derive(Default)]
pub struct Inbox {
    messages: Mutex<Vec<(String, ThreadId)>>,
    drops: AtomicUsize,
}

struct InboxHandle(Arc<Inbox>);

impl InboxHandle {
    fn record(&self, message: &str) {
        self.0
            .messages
            .lock()
            .expect("inbox lock")
            .push((message.to_string(), thread::current().id()));
    }
}

impl Drop for InboxHandle {
    fn drop(&mut self) {
        self.0.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl Inbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A handler that records into this inbox and counts its own release.
    pub fn handler(self: &Arc<Self>) -> DebugMessageHandler {
        let handle = InboxHandle(self.clone());
        Arc::new(move |message: &str| handle.record(message))
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("inbox lock")
            .iter()
            .map(|(message, _)| message.clone())
            .collect()
    }

    pub fn delivery_threads(&self) -> Vec<ThreadId> {
        self.messages
            .lock()
            .expect("inbox lock")
            .iter()
            .map(|(_, thread)| *thread)
            .collect()
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}
