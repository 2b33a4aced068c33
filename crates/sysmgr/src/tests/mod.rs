mod lifecycle;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::{SysConfig, SystemTask};
use crate::error::PortError;
use crate::fatal::PanicOnFatal;
use crate::manager::SystemManager;
use crate::port::host::HostPort;
use crate::port::{Port, TaskEntry, TaskHandle, TaskSpec};
use crate::priority::TaskPriority;
use crate::states::{StandardState, StateSet};
use crate::trace::TraceHook;

pub(crate) type Trace = Arc<Mutex<Vec<(u8, Vec<u8>)>>>;

/// Manager with two slots per state and two transitioning tasks.
pub(crate) fn test_manager() -> (SystemManager, Trace) {
    test_manager_on(HostPort)
}

pub(crate) fn test_manager_on(port: impl Port) -> (SystemManager, Trace) {
    let config = StandardState::ALL
        .iter()
        .fold(SysConfig::builder(StandardState::NoConf), |builder, &state| {
            builder.callback_slots(state, 2)
        })
        .task(SystemTask::new("Requester", 100).on_core(0))
        .task(SystemTask::new("Contender", 101))
        .build()
        .expect("valid config");

    let trace: Trace = Arc::default();
    let sink = Arc::clone(&trace);
    let hook: TraceHook = Arc::new(move |record: u8, payload: &[u8]| {
        sink.lock().push((record, payload.to_vec()));
    });

    let manager = SystemManager::builder(config)
        .port(port)
        .fatal_handler(PanicOnFatal)
        .trace_hook(hook)
        .build()
        .expect("manager");
    (manager, trace)
}

pub(crate) fn records_of(trace: &Trace, record: u8) -> Vec<Vec<u8>> {
    trace
        .lock()
        .iter()
        .filter(|(kind, _)| *kind == record)
        .map(|(_, payload)| payload.clone())
        .collect()
}

/// Time source that only moves when told to, or when a task sleeps.
#[derive(Clone)]
pub(crate) struct ManualClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::default(),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    pub(crate) fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

/// Host tasks and priorities on a [`ManualClock`]; sleeping jumps the clock.
pub(crate) struct ManualClockPort {
    pub(crate) clock: ManualClock,
}

impl Port for ManualClockPort {
    fn spawn(&self, spec: TaskSpec, entry: TaskEntry) -> Result<TaskHandle, PortError> {
        HostPort.spawn(spec, entry)
    }

    fn adopt_current(&self, spec: &TaskSpec) -> Result<(), PortError> {
        HostPort.adopt_current(spec)
    }

    fn current_priority(&self) -> Result<TaskPriority, PortError> {
        HostPort.current_priority()
    }

    fn set_current_priority(&self, priority: TaskPriority) -> Result<(), PortError> {
        HostPort.set_current_priority(priority)
    }

    fn now(&self) -> Instant {
        self.clock.start + self.clock.elapsed()
    }

    fn sleep_until(&self, deadline: Instant) {
        let target = deadline.saturating_duration_since(self.clock.start);
        let mut elapsed = self.clock.elapsed.lock();
        *elapsed = (*elapsed).max(target);
    }
}
