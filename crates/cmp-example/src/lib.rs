//! # cmp-example
//!
//! Reference component for the [`sysmgr`] system manager, together with the
//! board adaptation layer ([`adapt`]) that declares callback ranks, the system
//! task table and the component list.
//!
//! To add a component: give it ranks in [`adapt`] for the states it reacts to,
//! list its tasks in [`adapt::system_tasks`], and register it in
//! [`adapt::register_components`].

pub mod adapt;
mod component;

pub use component::{ExampleComponent, ExampleTriggers, EXAMPLE_TASK, EXAMPLE_TASK_PERIOD};
