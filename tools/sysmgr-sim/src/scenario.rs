//! Scripted host events, fired from the cycle hook.

use std::collections::BTreeSet;

use cmp_example::ExampleTriggers;
use log::info;
use sysmgr::{Component, Hook, HookResult, TaskContext};

/// Fires the example component's triggers at chosen cycle numbers.
///
/// Cycles are counted from 1. Register it before the components it drives so
/// a trigger is handled in the cycle that fires it.
pub struct Scenario {
    triggers: ExampleTriggers,
    new_config_at: BTreeSet<u64>,
    reset_at: BTreeSet<u64>,
    cycle: u64,
}

impl Scenario {
    pub fn new(
        triggers: ExampleTriggers,
        new_config_at: impl IntoIterator<Item = u64>,
        reset_at: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            triggers,
            new_config_at: new_config_at.into_iter().collect(),
            reset_at: reset_at.into_iter().collect(),
            cycle: 0,
        }
    }
}

impl Component for Scenario {
    fn name(&self) -> &str {
        "Scenario"
    }

    fn on_hook(&mut self, hook: Hook, _ctx: &TaskContext) -> HookResult {
        if hook != Hook::Cycle {
            return Ok(());
        }
        self.cycle += 1;
        if self.new_config_at.contains(&self.cycle) {
            info!("cycle {}: new configuration", self.cycle);
            self.triggers.request_new_config();
        }
        if self.reset_at.contains(&self.cycle) {
            info!("cycle {}: configuration reset", self.cycle);
            self.triggers.request_reset();
        }
        Ok(())
    }
}
