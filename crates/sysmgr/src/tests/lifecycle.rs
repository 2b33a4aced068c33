use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{test_manager, test_manager_on, ManualClock, ManualClockPort};
use crate::error::{HookError, LifecycleError, PortError, RegistryError};
use crate::lifecycle::{
    Component, ComponentLifecycleDispatcher, CycleStats, Hook, HookResult, OverrunPolicy,
};
use crate::manager::{TaskContext, COMPONENT_MANAGER_TASK};
use crate::states::StandardState;

type Journal = Arc<Mutex<Vec<(&'static str, Hook)>>>;

struct Recorder {
    name: &'static str,
    journal: Journal,
    fail_on: Option<Hook>,
    cycle_cost: Option<(Duration, ManualClock)>,
}

impl Recorder {
    fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: Arc::clone(journal),
            fail_on: None,
            cycle_cost: None,
        }
    }

    fn failing_on(mut self, hook: Hook) -> Self {
        self.fail_on = Some(hook);
        self
    }

    /// Each cycle hook takes `cost` on `clock`.
    fn costing(mut self, cost: Duration, clock: &ManualClock) -> Self {
        self.cycle_cost = Some((cost, clock.clone()));
        self
    }
}

impl Component for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn on_hook(&mut self, hook: Hook, _ctx: &TaskContext) -> HookResult {
        self.journal.lock().push((self.name, hook));
        if let (Hook::Cycle, Some((cost, clock))) = (hook, &self.cycle_cost) {
            clock.advance(*cost);
        }
        match self.fail_on {
            Some(failing) if failing == hook => Err(HookError::fatal("hardware missing")),
            _ => Ok(()),
        }
    }
}

fn run_adopted(dispatcher: ComponentLifecycleDispatcher) -> Result<CycleStats, LifecycleError> {
    let (manager, _) = test_manager();
    let ctx = manager.adopt_current_task(COMPONENT_MANAGER_TASK).unwrap();
    dispatcher.run(&ctx)
}

fn run_on_clock(
    clock: &ManualClock,
    dispatcher: ComponentLifecycleDispatcher,
) -> Result<CycleStats, LifecycleError> {
    let (manager, _) = test_manager_on(ManualClockPort {
        clock: clock.clone(),
    });
    let ctx = manager.adopt_current_task(COMPONENT_MANAGER_TASK).unwrap();
    dispatcher.run(&ctx)
}

#[test]
fn one_shot_hooks_run_once_in_order_before_cycles() {
    let journal = Journal::default();
    let dispatcher = ComponentLifecycleDispatcher::new(Duration::from_millis(1))
        .register(Recorder::new("first", &journal))
        .register(Recorder::new("second", &journal))
        .cycle_limit(2);

    let stats = run_adopted(dispatcher).unwrap();
    assert_eq!(stats.cycles, 2);

    let mut expected = Vec::new();
    for hook in Hook::ONE_SHOT.into_iter().chain([Hook::Cycle, Hook::Cycle]) {
        expected.push(("first", hook));
        expected.push(("second", hook));
    }
    assert_eq!(*journal.lock(), expected);
}

#[test]
fn failing_init_hook_stops_the_dispatcher() {
    let journal = Journal::default();
    let dispatcher = ComponentLifecycleDispatcher::new(Duration::from_millis(1))
        .register(Recorder::new("driver", &journal).failing_on(Hook::InitHw))
        .register(Recorder::new("logic", &journal))
        .cycle_limit(5);

    let err = run_adopted(dispatcher).unwrap_err();
    let LifecycleError::HookFailed {
        component,
        hook,
        source,
    } = err;
    assert_eq!(component, "driver");
    assert_eq!(hook, Hook::InitHw);
    assert_eq!(source, HookError::fatal("hardware missing"));
    assert_eq!(
        *journal.lock(),
        vec![
            ("driver", Hook::InitHwFirst),
            ("logic", Hook::InitHwFirst),
            ("driver", Hook::InitHw),
        ]
    );
}

#[test]
fn failing_cycle_hook_stops_the_dispatcher() {
    let journal = Journal::default();
    let dispatcher = ComponentLifecycleDispatcher::new(Duration::from_millis(1))
        .register(Recorder::new("watch", &journal).failing_on(Hook::Cycle))
        .cycle_limit(5);

    let err = run_adopted(dispatcher).unwrap_err();
    assert!(matches!(err, LifecycleError::HookFailed { hook: Hook::Cycle, .. }));
    let cycles = journal
        .lock()
        .iter()
        .filter(|(_, hook)| *hook == Hook::Cycle)
        .count();
    assert_eq!(cycles, 1);
}

struct LateRegistrar {
    outcomes: Arc<Mutex<Vec<(Hook, Result<(), RegistryError>)>>>,
}

impl Component for LateRegistrar {
    fn name(&self) -> &str {
        "late"
    }

    fn on_hook(&mut self, hook: Hook, ctx: &TaskContext) -> HookResult {
        if matches!(hook, Hook::InitVar | Hook::Cycle) {
            let outcome = ctx.register_callback(StandardState::Configured, 0, |_, _| {});
            self.outcomes.lock().push((hook, outcome));
        }
        Ok(())
    }
}

#[test]
fn registry_is_sealed_once_cycling() {
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = ComponentLifecycleDispatcher::new(Duration::from_millis(1))
        .register(LateRegistrar {
            outcomes: Arc::clone(&outcomes),
        })
        .cycle_limit(1);

    run_adopted(dispatcher).unwrap();
    assert_eq!(
        *outcomes.lock(),
        vec![
            (Hook::InitVar, Ok(())),
            (Hook::Cycle, Err(RegistryError::Sealed)),
        ]
    );
}

/// Three 25 ms cycles against a 10 ms period; returns the stats and the
/// simulated time spent.
fn slow_run(policy: OverrunPolicy) -> (CycleStats, Duration) {
    let clock = ManualClock::new();
    let journal = Journal::default();
    let dispatcher = ComponentLifecycleDispatcher::new(Duration::from_millis(10))
        .register(Recorder::new("slow", &journal).costing(Duration::from_millis(25), &clock))
        .overrun_policy(policy)
        .cycle_limit(3);
    let stats = run_on_clock(&clock, dispatcher).unwrap();
    (stats, clock.elapsed())
}

#[test]
fn skip_policy_drops_missed_deadlines() {
    let (stats, elapsed) = slow_run(OverrunPolicy::Skip);
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.overruns, 2);
    // 15 ms late each time: the missed deadline and the one in flight.
    assert_eq!(stats.skipped_periods, 4);
    // Cycles start at 0, 30 and 60 ms.
    assert_eq!(elapsed, Duration::from_millis(85));
}

#[test]
fn catch_up_policy_skips_nothing() {
    let (stats, elapsed) = slow_run(OverrunPolicy::CatchUp);
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.overruns, 2);
    assert_eq!(stats.skipped_periods, 0);
    assert_eq!(elapsed, Duration::from_millis(75));
}

#[test]
fn fixed_delay_policy_never_overruns() {
    let (stats, elapsed) = slow_run(OverrunPolicy::FixedDelay);
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.overruns, 0);
    assert_eq!(elapsed, Duration::from_millis(95));
}

#[test]
fn zero_period_cycles_back_to_back() {
    let clock = ManualClock::new();
    let journal = Journal::default();
    let dispatcher = ComponentLifecycleDispatcher::new(Duration::ZERO)
        .register(Recorder::new("busy", &journal).costing(Duration::from_millis(1), &clock))
        .cycle_limit(3);

    let stats = run_on_clock(&clock, dispatcher).unwrap();
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.overruns, 0);
    assert_eq!(stats.skipped_periods, 0);
    assert_eq!(clock.elapsed(), Duration::from_millis(3));
}

#[test]
fn manager_task_runs_the_dispatcher() {
    let (manager, _) = test_manager();
    let journal = Journal::default();
    let dispatcher = manager
        .dispatcher()
        .register(Recorder::new("only", &journal))
        .cycle_limit(1);
    assert_eq!(dispatcher.period(), Duration::from_millis(50));

    manager.start(dispatcher).unwrap().join().unwrap();
    assert_eq!(journal.lock().last(), Some(&("only", Hook::Cycle)));
    assert!(manager.engine().registry().is_sealed());
}

#[test]
fn hook_failure_on_manager_task_is_fatal() {
    let (manager, _) = test_manager();
    let journal = Journal::default();
    let dispatcher = manager
        .dispatcher()
        .register(Recorder::new("broken", &journal).failing_on(Hook::LastInit));

    let outcome = manager.start(dispatcher).unwrap().join();
    assert!(matches!(
        outcome,
        Err(PortError::TaskPanicked(name)) if name == COMPONENT_MANAGER_TASK
    ));
    assert!(!journal.lock().iter().any(|(_, hook)| *hook == Hook::Cycle));
}

#[test]
fn fatal_error_elsewhere_stops_cycling() {
    let (manager, _) = test_manager();
    manager
        .spawn_task("Requester", |ctx| ctx.fatal_error("sensor lost"))
        .unwrap()
        .join()
        .unwrap_err();

    let journal = Journal::default();
    let dispatcher = ComponentLifecycleDispatcher::new(Duration::from_millis(1))
        .register(Recorder::new("only", &journal))
        .cycle_limit(3);
    let outcome = manager.start(dispatcher).unwrap().join();

    assert!(matches!(
        outcome,
        Err(PortError::TaskPanicked(name)) if name == COMPONENT_MANAGER_TASK
    ));
    assert!(journal.lock().iter().any(|(_, hook)| *hook == Hook::LastInitEnd));
    assert!(!journal.lock().iter().any(|(_, hook)| *hook == Hook::Cycle));
}
