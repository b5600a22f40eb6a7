use crate::errors::FlowError;
use crate::input::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::guard::NavigationGuard;
use super::history::{parse_step_fragment, step_fragment, History};
use super::step::{FieldRegistration, FormValue, Step, StepError};

/// Where focus was last moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum FocusTarget {
    /// Anchor at the beginning of the step content
    StepAnchor,
    Field(String),
}

/// Result of a navigation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Moved { from: String, to: String },
    Blocked { errors: Vec<StepError>, focus: FocusTarget },
    Completed { values: FormValue },
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct FlowOptions {
    pub initial_step: Option<String>,
    pub initial_values: FormValue,
    /// Errors to show on mount, used when re-entering after a rejection
    pub initial_active_errors: Vec<StepError>,
    pub prompt_on_navigate: bool,
    /// Page title format, `%{step}` replaced by the step title
    pub title_format: Option<String>,
}

impl FlowOptions {
    pub fn new() -> Self {
        Self {
            prompt_on_navigate: true,
            ..Default::default()
        }
    }
}

/// Multi-step form state machine.
///
/// Owns the form value, active errors, focus and history sync for one flow
/// instance. Steps propose changes through [`set_value`](Self::set_value)
/// and [`set_field_error`](Self::set_field_error) and never mutate the
/// value directly.
pub struct FormSteps {
    steps: Vec<Step>,
    registrations: Vec<Vec<FieldRegistration>>,
    index: usize,
    values: FormValue,
    field_errors: BTreeMap<String, FlowError>,
    step_error: Option<FlowError>,
    focus: Option<FocusTarget>,
    guard: NavigationGuard,
    history: Box<dyn History>,
    title_format: Option<String>,
    step_can_complete: Option<bool>,
    completed: bool,
    mounted: bool,
}

impl FormSteps {
    /// Mount a flow. The controller decides the starting step; a stale
    /// fragment left in history is overwritten.
    pub fn new(steps: Vec<Step>, options: FlowOptions, mut history: Box<dyn History>) -> Self {
        let index = options
            .initial_step
            .as_deref()
            .and_then(|name| steps.iter().position(|step| step.name == name))
            .unwrap_or(0);

        if let Some(stale) = history.current() {
            let matches = parse_step_fragment(&stale)
                .map(|name| steps.get(index).map(|s| s.name.as_str()) == Some(name))
                .unwrap_or(false);
            if !matches {
                log::debug!("Ignoring history marker {} at mount", stale);
            }
        }
        let fragment = (index > 0).then(|| step_fragment(&steps[index].name));
        history.replace(fragment);

        let mut field_errors = BTreeMap::new();
        let mut step_error = None;
        for StepError { field, error } in options.initial_active_errors {
            match field {
                Some(field) => {
                    field_errors.insert(field, error);
                }
                None => step_error = Some(error),
            }
        }

        let mut guard = NavigationGuard::new(options.prompt_on_navigate);
        if !options.initial_values.is_empty() {
            guard.arm();
        }

        let registrations = steps.iter().map(|step| step.fields.clone()).collect();

        Self {
            steps,
            registrations,
            index,
            values: options.initial_values,
            field_errors,
            step_error,
            focus: None,
            guard,
            history,
            title_format: options.title_format,
            step_can_complete: None,
            completed: false,
            mounted: true,
        }
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.index)
    }

    pub fn current_step_name(&self) -> Option<&str> {
        self.current_step().map(|step| step.name.as_str())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn values(&self) -> &FormValue {
        &self.values
    }

    pub fn focus(&self) -> Option<&FocusTarget> {
        self.focus.as_ref()
    }

    pub fn is_last_step(&self) -> bool {
        self.index + 1 == self.steps.len()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn is_guard_armed(&self) -> bool {
        self.guard.is_armed()
    }

    pub fn history_fragment(&self) -> Option<String> {
        self.history.current()
    }

    pub fn field_error(&self, field: &str) -> Option<&FlowError> {
        self.field_errors.get(field)
    }

    pub fn field_errors(&self) -> &BTreeMap<String, FlowError> {
        &self.field_errors
    }

    pub fn step_error(&self) -> Option<&FlowError> {
        self.step_error.as_ref()
    }

    /// Page title for the current step, when both a format and a title exist
    pub fn title(&self) -> Option<String> {
        let format = self.title_format.as_ref()?;
        let title = self.current_step()?.title.as_ref()?;
        Some(format.replace("%{step}", title))
    }

    fn is_registered_on(&self, index: usize, field: &str) -> bool {
        self.registrations
            .get(index)
            .map(|fields| fields.iter().any(|r| r.field == field))
            .unwrap_or(false)
    }

    /// Active field errors whose field has no input on the current step.
    /// These are displayed alongside the step banner.
    pub fn unknown_field_errors(&self) -> Vec<StepError> {
        self.field_errors
            .iter()
            .filter(|(field, _)| !self.is_registered_on(self.index, field))
            .map(|(field, error)| StepError::field(field.clone(), error.clone()))
            .collect()
    }

    /// All active errors, field errors in declaration order first
    pub fn active_errors(&self) -> Vec<StepError> {
        let mut errors = self.errors_on_step(self.index);
        errors.extend(self.unknown_field_errors());
        if let Some(error) = &self.step_error {
            errors.push(StepError::step(error.clone()));
        }
        errors
    }

    /// Register an input of the current step. The first registration of a
    /// field wins.
    pub fn register_field(&mut self, field: &str, is_required: bool) {
        if !self.mounted {
            return;
        }
        if let Some(fields) = self.registrations.get_mut(self.index) {
            if !fields.iter().any(|r| r.field == field) {
                fields.push(FieldRegistration {
                    field: field.to_string(),
                    is_required,
                });
            }
        }
    }

    /// Raise a typed error for a field, replacing any previous one.
    pub fn set_field_error(&mut self, field: &str, error: FlowError) {
        if !self.mounted {
            return;
        }
        log::debug!("Field error on {}: {}", field, error);
        self.field_errors.insert(field.to_string(), error);
    }

    pub fn clear_field_error(&mut self, field: &str) -> bool {
        self.field_errors.remove(field).is_some()
    }

    /// Raise a step-level error, shown as a banner until the next submit.
    pub fn raise_step_error(&mut self, error: FlowError) {
        if !self.mounted {
            return;
        }
        log::debug!("Step error: {}", error);
        self.step_error = Some(error);
        self.focus = Some(FocusTarget::StepAnchor);
    }

    /// Merge a patch into the form value. Errors on patched fields clear.
    pub fn set_value(&mut self, patch: FormValue) {
        if !self.mounted || self.completed {
            return;
        }
        for (field, value) in patch {
            self.field_errors.remove(&field);
            self.values.insert(field, value);
        }
        if !self.values.is_empty() {
            self.guard.arm();
        }
    }

    pub fn set_field_value(&mut self, field: &str, value: FieldValue) {
        let mut patch = FormValue::new();
        patch.insert(field.to_string(), value);
        self.set_value(patch);
    }

    /// Let the current step finish the flow early (or prevent finishing).
    /// Reset after the next successful submit of the step.
    pub fn set_step_can_complete(&mut self, can_complete: Option<bool>) {
        self.step_can_complete = can_complete;
    }

    fn is_missing(&self, field: &str) -> bool {
        self.values.get(field).map(FieldValue::is_empty).unwrap_or(true)
    }

    /// Add required-value errors for step `index`. Existing typed errors
    /// on the same field take precedence and are kept.
    fn validate_step(&mut self, index: usize) {
        let missing: Vec<String> = self
            .registrations
            .get(index)
            .map(|fields| {
                fields
                    .iter()
                    .filter(|r| r.is_required && self.is_missing(&r.field))
                    .map(|r| r.field.clone())
                    .collect()
            })
            .unwrap_or_default();

        for field in missing {
            self.field_errors
                .entry(field)
                .or_insert(FlowError::RequiredValueMissing);
        }
    }

    fn errors_on_step(&self, index: usize) -> Vec<StepError> {
        self.registrations
            .get(index)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|r| {
                        self.field_errors
                            .get(&r.field)
                            .map(|error| StepError::field(r.field.clone(), error.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn block(&mut self, errors: Vec<StepError>) -> Transition {
        let focus = errors
            .iter()
            .find_map(|e| e.field.clone())
            .map(FocusTarget::Field)
            .unwrap_or(FocusTarget::StepAnchor);
        log::debug!(
            "Blocked on step {:?} with {} error(s)",
            self.current_step_name(),
            errors.len()
        );
        self.focus = Some(focus.clone());
        Transition::Blocked { errors, focus }
    }

    fn move_to(&mut self, index: usize, push: bool) -> Transition {
        let from = self.steps[self.index].name.clone();
        self.index = index;
        let to = self.steps[index].name.clone();
        let fragment = (index > 0).then(|| step_fragment(&to));
        if push {
            self.history.push(fragment);
        } else {
            self.history.replace(fragment);
        }
        self.focus = Some(FocusTarget::StepAnchor);
        log::info!("Step changed: {} -> {}", from, to);
        Transition::Moved { from, to }
    }

    /// Submit the current step: validate it, then move to the next step or
    /// complete the flow from the last one.
    pub fn advance(&mut self) -> Transition {
        if !self.mounted || self.completed || self.steps.is_empty() {
            return Transition::Unchanged;
        }

        self.step_error = None;

        self.validate_step(self.index);
        let errors = self.errors_on_step(self.index);
        if !errors.is_empty() {
            return self.block(errors);
        }

        let is_complete = self
            .step_can_complete
            .take()
            .unwrap_or(self.index + 1 == self.steps.len());
        if is_complete {
            self.complete()
        } else {
            self.move_to(self.index + 1, true)
        }
    }

    pub fn retreat(&mut self) -> Transition {
        if !self.mounted || self.completed || self.index == 0 {
            return Transition::Unchanged;
        }
        self.move_to(self.index - 1, false)
    }

    /// Finish the flow. Required fields are validated across every step and
    /// the value is handed out at most once.
    pub fn complete(&mut self) -> Transition {
        if !self.mounted || self.completed {
            return Transition::Unchanged;
        }

        for index in 0..self.steps.len() {
            self.validate_step(index);
        }

        let first_invalid = (0..self.steps.len())
            .map(|index| (index, self.errors_on_step(index)))
            .find(|(_, errors)| !errors.is_empty());

        if let Some((index, errors)) = first_invalid {
            if index != self.index {
                self.move_to(index, false);
            }
            return self.block(errors);
        }

        self.completed = true;
        self.guard.release();
        self.history.replace(None);
        log::info!("Flow completed with {} value(s)", self.values.len());
        Transition::Completed {
            values: self.values.clone(),
        }
    }

    /// Back/forward navigation landed on `fragment`. Moves without running
    /// any step side effects. Unknown step names are ignored.
    pub fn on_history_pop(&mut self, fragment: Option<&str>) -> Transition {
        if !self.mounted || self.completed {
            return Transition::Unchanged;
        }

        let index = match fragment.and_then(parse_step_fragment) {
            None => 0,
            Some(name) => match self.steps.iter().position(|s| s.name == name) {
                Some(index) => index,
                None => {
                    log::debug!("Ignoring unknown step {} from history", name);
                    return Transition::Unchanged;
                }
            },
        };

        if index == self.index {
            return Transition::Unchanged;
        }

        let from = self.steps[self.index].name.clone();
        self.index = index;
        self.focus = Some(FocusTarget::StepAnchor);
        Transition::Moved {
            from,
            to: self.steps[index].name.clone(),
        }
    }

    /// An expected navigation is about to happen.
    /// Tear down. Later calls are no-ops.
    pub fn unmount(&mut self) {
        self.guard.release();
        self.mounted = false;
    }
}
