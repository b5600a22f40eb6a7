//! Property-Based Tests for the step flow controller
//!
//! Run with: cargo test --test flow_props

use idcapture::errors::FlowError;
use idcapture::flow::{FlowOptions, FocusTarget, FormSteps, MemoryHistory, Step, Transition};
use idcapture::input::FieldValue;
use proptest::prelude::*;

fn field_name(index: usize) -> String {
    format!("field_{}", index)
}

/// A two-step flow whose first step requires one field per flag
fn flow_with_required(count: usize) -> FormSteps {
    let first = (0..count).fold(Step::new("details"), |step, index| {
        step.required(&field_name(index))
    });
    FormSteps::new(
        vec![first, Step::new("review")],
        FlowOptions::new(),
        Box::new(MemoryHistory::new()),
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// REQUIRED FIELD INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: Advancing with unresolved required fields never moves the
    /// flow, reports every missing field in declaration order and focuses
    /// the first of them
    #[test]
    fn advance_blocks_on_missing_required(
        filled in prop::collection::vec(any::<bool>(), 1..8),
    ) {
        let mut flow = flow_with_required(filled.len());
        for (index, is_filled) in filled.iter().enumerate() {
            if *is_filled {
                flow.set_field_value(&field_name(index), FieldValue::from("value"));
            }
        }

        let missing: Vec<String> = filled
            .iter()
            .enumerate()
            .filter(|(_, is_filled)| !**is_filled)
            .map(|(index, _)| field_name(index))
            .collect();

        match flow.advance() {
            Transition::Blocked { errors, focus } => {
                prop_assert!(!missing.is_empty());
                prop_assert_eq!(flow.current_index(), 0);

                let fields: Vec<String> = errors.iter().filter_map(|e| e.field.clone()).collect();
                prop_assert_eq!(&fields, &missing);
                prop_assert!(errors.iter().all(|e| e.error == FlowError::RequiredValueMissing));
                prop_assert_eq!(focus, FocusTarget::Field(missing[0].clone()));
            }
            Transition::Moved { from, to } => {
                prop_assert!(missing.is_empty());
                prop_assert_eq!(from, "details");
                prop_assert_eq!(to, "review");
                prop_assert_eq!(flow.current_index(), 1);
            }
            other => prop_assert!(false, "unexpected transition {:?}", other),
        }
    }

    /// INVARIANT: Changing a field's value clears that field's error and
    /// leaves every other field error in place
    #[test]
    fn value_change_clears_only_that_field(
        count in 2usize..6,
        changed in 0usize..6,
    ) {
        let changed = changed % count;
        let mut flow = flow_with_required(count);
        for index in 0..count {
            flow.set_field_error(&field_name(index), FlowError::Glare);
        }

        flow.set_field_value(&field_name(changed), FieldValue::from("value"));

        for index in 0..count {
            let error = flow.field_error(&field_name(index));
            if index == changed {
                prop_assert!(error.is_none());
            } else {
                prop_assert_eq!(error, Some(&FlowError::Glare));
            }
        }
        prop_assert!(!flow.clear_field_error(&field_name(changed)));
    }

    /// INVARIANT: History pops never leave the flow on a step that does
    /// not exist, and unknown step names are ignored
    #[test]
    fn history_pop_stays_in_bounds(
        fragments in prop::collection::vec(
            prop_oneof![
                Just(None),
                Just(Some("step=details".to_string())),
                Just(Some("step=review".to_string())),
                "[a-z]{1,8}".prop_map(|name| Some(format!("step={}", name))),
            ],
            1..12,
        ),
    ) {
        let mut flow = flow_with_required(1);
        for fragment in &fragments {
            let before = flow.current_index();
            let transition = flow.on_history_pop(fragment.as_deref());
            prop_assert!(flow.current_index() < flow.steps().len());
            if transition == Transition::Unchanged {
                prop_assert_eq!(flow.current_index(), before);
            }
        }
    }

    /// INVARIANT: A completed flow hands out its value exactly once
    #[test]
    fn completion_is_single_shot(
        value in "[a-zA-Z0-9]{1,16}",
    ) {
        let mut flow = flow_with_required(1);
        flow.set_field_value(&field_name(0), FieldValue::from(value.as_str()));

        let first = flow.complete();
        prop_assert!(matches!(first, Transition::Completed { .. }), "got {:?}", first);
        prop_assert_eq!(flow.complete(), Transition::Unchanged);
        prop_assert_eq!(flow.advance(), Transition::Unchanged);
        prop_assert!(!flow.is_guard_armed());
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_two_missing_fields_focus_first() {
    let mut flow = FormSteps::new(
        vec![
            Step::new("documents").required("front").required("back"),
            Step::new("review"),
        ],
        FlowOptions::new(),
        Box::new(MemoryHistory::new()),
    );

    match flow.advance() {
        Transition::Blocked { errors, focus } => {
            assert_eq!(errors.len(), 2);
            assert_eq!(errors[0].field.as_deref(), Some("front"));
            assert_eq!(errors[1].field.as_deref(), Some("back"));
            assert_eq!(focus, FocusTarget::Field("front".to_string()));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(flow.current_step_name(), Some("documents"));
    assert_eq!(flow.history_fragment(), None);
}

#[test]
fn test_typed_error_outranks_required_value() {
    let mut flow = flow_with_required(1);
    flow.set_field_error("field_0", FlowError::Blurry);

    match flow.advance() {
        Transition::Blocked { errors, .. } => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].error, FlowError::Blurry);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_typed_error_reported_with_missing_siblings() {
    let mut flow = FormSteps::new(
        vec![
            Step::new("documents").required("front").required("back"),
            Step::new("review"),
        ],
        FlowOptions::new(),
        Box::new(MemoryHistory::new()),
    );
    flow.set_field_error("front", FlowError::Glare);

    match flow.advance() {
        Transition::Blocked { errors, focus } => {
            assert_eq!(errors.len(), 2);
            assert_eq!(errors[0].error, FlowError::Glare);
            assert_eq!(errors[1].field.as_deref(), Some("back"));
            assert_eq!(errors[1].error, FlowError::RequiredValueMissing);
            assert_eq!(focus, FocusTarget::Field("front".to_string()));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        flow.field_error("back"),
        Some(&FlowError::RequiredValueMissing)
    );
}

#[test]
fn test_unmounted_flow_ignores_updates() {
    let mut flow = flow_with_required(1);
    flow.unmount();

    flow.set_field_value("field_0", FieldValue::from("value"));
    flow.set_field_error("field_0", FlowError::Glare);

    assert!(flow.values().is_empty());
    assert!(flow.field_error("field_0").is_none());
    assert_eq!(flow.advance(), Transition::Unchanged);
}
