//! Mock implementations for testing.

use std::sync::{Arc, Mutex, PoisonError};

use kestrel_core::ServerRole;
use kestrel_events::{EventBus, EventSubscriber, KestrelEvent};
use kestrel_kernel::{KernelServer, ServerError, ServerResult};

/// Subscriber that keeps every event it sees, in delivery order.
#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    name: String,
    events: Mutex<Vec<KestrelEvent>>,
}

impl RecordingSubscriber {
    /// Create a recorder called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            events: Mutex::new(Vec::new()),
        })
    }

    /// Create a recorder and subscribe it to `bus`.
    #[must_use]
    pub fn attach(bus: &EventBus) -> Arc<Self> {
        let recorder = Self::new("recorder");
        bus.subscribe_sync(Arc::clone(&recorder) as Arc<dyn EventSubscriber>);
        recorder
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<KestrelEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `event_type()` of everything recorded so far.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(KestrelEvent::event_type)
            .collect()
    }

    /// Recorded events matching `predicate`.
    #[must_use]
    pub fn matching(&self, predicate: impl Fn(&KestrelEvent) -> bool) -> Vec<KestrelEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSubscriber for RecordingSubscriber {
    fn on_event(&self, event: &KestrelEvent, _bus: &EventBus) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Call log shared between several [`ScriptedServer`]s.
///
/// Entries look like `"start:artifact"` or `"stop:event_bus"`.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: String) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Snapshot of the log.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Kernel server whose start and stop succeed or fail on request.
#[derive(Debug)]
pub struct ScriptedServer {
    role: ServerRole,
    dependencies: Option<Vec<ServerRole>>,
    fail_start: bool,
    fail_stop: bool,
    log: CallLog,
}

impl ScriptedServer {
    /// A server for `role` that succeeds, logging to `log`.
    #[must_use]
    pub fn new(role: ServerRole, log: &CallLog) -> Self {
        Self {
            role,
            dependencies: None,
            fail_start: false,
            fail_stop: false,
            log: log.clone(),
        }
    }

    /// Make `start` fail.
    #[must_use]
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Make `stop` fail.
    #[must_use]
    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Override the declared dependencies.
    #[must_use]
    pub fn depends_on(mut self, dependencies: Vec<ServerRole>) -> Self {
        self.dependencies = Some(dependencies);
        self
    }

    /// Wrap in an `Arc` for `KernelBuilder::server`.
    #[must_use]
    pub fn shared(self) -> Arc<dyn KernelServer> {
        Arc::new(self)
    }
}

impl KernelServer for ScriptedServer {
    fn role(&self) -> ServerRole {
        self.role
    }

    fn dependencies(&self) -> Vec<ServerRole> {
        self.dependencies
            .clone()
            .unwrap_or_else(|| kestrel_kernel::default_dependencies(self.role))
    }

    fn start(&self) -> ServerResult<()> {
        self.log.push(format!("start:{}", self.role));
        if self.fail_start {
            return Err(ServerError::Setup(format!("{} scripted to fail", self.role)));
        }
        Ok(())
    }

    fn stop(&self) -> ServerResult<()> {
        self.log.push(format!("stop:{}", self.role));
        if self.fail_stop {
            return Err(ServerError::Teardown(format!("{} scripted to fail", self.role)));
        }
        Ok(())
    }
}
