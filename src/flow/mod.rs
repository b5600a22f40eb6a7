//! Multi-step form flow
//!
//! [`FormSteps`] drives an ordered list of [`Step`]s: it accumulates the
//! form value, validates required fields, tracks inline and banner errors,
//! moves focus, and mirrors the current step in the URL fragment.

pub mod controller;
pub mod guard;
pub mod history;
pub mod step;

pub use controller::{FlowOptions, FocusTarget, FormSteps, Transition};
pub use guard::NavigationGuard;
pub use history::{parse_step_fragment, step_fragment, History, MemoryHistory};
pub use step::{FieldRegistration, FormValue, Step, StepError};
