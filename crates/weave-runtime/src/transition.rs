#![forbid(unsafe_code)]

//! Running a record's transition sequence against a node.
//!
//! A sequence is read left to right with one "current" transition:
//!
//! - `Start` schedules a fresh transition (or one timed like an existing
//!   instance) and makes it current.
//! - The first `Configure` after a `Start` configures that transition.
//! - Any other `Configure` chains a new transition off the current one; a
//!   leading `Configure` starts a default transition instead.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unknown method | `methods` names something transitions lack | `warn!`, skipped |
//! | Bad argument | wrong arity or type for a known method | error returned |
//! | Unknown template | `Like` names a transition never created | error returned |

use std::rc::Rc;

use weave_core::{TransitionConfig, TransitionStart, TransitionStep};
use weave_dom::{Document, DomError, NodeId, TransitionId};

/// Schedule every transition described by `steps` on `node`.
///
/// Returns the ids created, in order.
pub fn run_sequence(
    doc: &mut Document,
    node: NodeId,
    steps: &[TransitionStep],
) -> Result<Vec<TransitionId>, DomError> {
    let mut created = Vec::new();
    let mut current: Option<TransitionId> = None;
    let mut fresh = false;

    for step in steps {
        match step {
            TransitionStep::Start(TransitionStart::Named(name)) => {
                let id = doc.transition(node, name.as_deref())?;
                created.push(id);
                current = Some(id);
                fresh = true;
            }
            TransitionStep::Start(TransitionStart::Like(template)) => {
                let id = doc.transition_like(node, *template)?;
                created.push(id);
                current = Some(id);
                fresh = true;
            }
            TransitionStep::Configure(config) => {
                let id = match current {
                    Some(id) if fresh => id,
                    Some(prev) => {
                        let id = doc.chain(prev)?;
                        created.push(id);
                        id
                    }
                    None => {
                        let id = doc.transition(node, None)?;
                        created.push(id);
                        id
                    }
                };
                fresh = false;
                current = Some(id);
                configure(doc, id, config)?;
            }
        }
    }
    Ok(created)
}

/// Apply one declarative config to a scheduled transition.
pub fn configure(doc: &mut Document, id: TransitionId, config: &TransitionConfig) -> Result<(), DomError> {
    if let Some(ms) = config.duration {
        doc.set_duration(id, ms)?;
    }
    if let Some(ms) = config.delay {
        doc.set_delay(id, ms)?;
    }
    if let Some(ease) = config.ease {
        doc.set_ease(id, ease)?;
    }
    if let Some(text) = &config.text {
        doc.transition_text(id, text)?;
    }
    for (name, value) in &config.attrs {
        doc.transition_attr(id, name, value.clone())?;
    }
    for (name, style) in &config.styles {
        doc.transition_style(id, name, style.value.clone(), style.important)?;
    }
    for (event, handler) in &config.events {
        doc.transition_on(id, event, Some(Rc::clone(handler)))?;
    }
    for (name, tween) in &config.tweens {
        doc.transition_tween(id, name, Some(Rc::clone(tween)))?;
    }
    for call in &config.methods {
        match doc.call_transition_method(id, &call.method, &call.args) {
            Err(DomError::UnknownMethod { method, .. }) => {
                tracing::warn!(%id, %method, "skipping unknown transition method");
            }
            other => other?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_dom::{Ease, Phase, Value};

    fn setup() -> (Document, NodeId) {
        let mut doc = Document::new();
        let node = doc.create_element("div");
        (doc, node)
    }

    #[test]
    fn leading_config_starts_default_transition() {
        let (mut doc, node) = setup();
        let steps = vec![TransitionConfig::new().duration(100.0).into()];
        let ids = run_sequence(&mut doc, node, &steps).unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(doc.transition_timing(ids[0]).unwrap().duration, 100.0);
    }

    #[test]
    fn config_after_start_configures_it_and_later_configs_chain() {
        let (mut doc, node) = setup();
        let steps = vec![
            TransitionStep::named("fade"),
            TransitionConfig::new().duration(100.0).ease(Ease::Linear).into(),
            TransitionConfig::new().duration(30.0).into(),
        ];
        let ids = run_sequence(&mut doc, node, &steps).unwrap();
        assert_eq!(ids.len(), 2);
        let first = doc.transition_timing(ids[0]).unwrap().clone();
        let second = doc.transition_timing(ids[1]).unwrap();
        assert_eq!(first.name.as_deref(), Some("fade"));
        assert_eq!(first.ease, Ease::Linear);
        assert_eq!(second.name.as_deref(), Some("fade"));
        assert_eq!(second.start(), first.start() + 100.0);
        assert_eq!(second.duration, 30.0);
    }

    #[test]
    fn like_inherits_timing() {
        let (mut doc, node) = setup();
        let other = doc.create_element("div");
        let template = doc.transition(other, Some("t")).unwrap();
        doc.set_duration(template, 40.0).unwrap();
        let ids = run_sequence(&mut doc, node, &[TransitionStep::like(template)]).unwrap();
        assert_eq!(doc.transition_timing(ids[0]).unwrap().duration, 40.0);
        assert_eq!(doc.transition_phase(ids[0]), Some(Phase::Scheduled));
    }

    #[test]
    fn methods_run_by_name_and_unknown_ones_are_skipped() {
        let (mut doc, node) = setup();
        let config = TransitionConfig::new()
            .method("duration", [Value::from(10)])
            .method("wiggle", [])
            .method("attr", [Value::from("width"), Value::from(4)]);
        let ids = run_sequence(&mut doc, node, &[config.into()]).unwrap();
        doc.advance(20.0);
        assert_eq!(doc.attr(node, "width"), Some("4"));
        assert!(doc.transition_phase(ids[0]).is_none_or(|p| p == Phase::Ended));

        let bad = TransitionConfig::new().method("duration", [Value::from("soon")]);
        assert!(run_sequence(&mut doc, node, &[bad.into()]).is_err());
    }
}
