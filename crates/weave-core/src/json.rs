#![forbid(unsafe_code)]

//! Authoring records from JSON.
//!
//! ```json
//! {
//!   "tag": "svg:rect",
//!   "attrs": { "width": 10, "height": 20 },
//!   "styles": [["fill", "red"], ["stroke", "blue", "important"]],
//!   "transitions": ["grow", { "duration": 500, "attrs": { "width": 40 } }],
//!   "children": ["a", "b"]
//! }
//! ```
//!
//! Row collections accept an object or an array of `[name, value]` pairs.
//! `children` (or its alias `data`) must be an array of objects (records)
//! or of scalars (literal leaves); mixing both is rejected. Hooks cannot be
//! expressed in JSON.

use serde_json::{Map, Value as Json};
use weave_dom::{Selector, Value};

use crate::error::WeaveError;
use crate::record::{
    Children, Invocation, Record, StyleValue, TransitionConfig, TransitionStep, upsert_row,
};

fn kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

/// Convert a JSON scalar.
pub fn value_from_json(json: &Json) -> Result<Value, WeaveError> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::Str(s.clone()),
        other => return Err(WeaveError::shape("a scalar", kind(other))),
    })
}

fn string(json: &Json, field: &'static str) -> Result<String, WeaveError> {
    match json {
        Json::String(s) => Ok(s.clone()),
        other => Err(WeaveError::shape(field, kind(other))),
    }
}

fn number(json: &Json, field: &'static str) -> Result<f64, WeaveError> {
    json.as_f64()
        .ok_or_else(|| WeaveError::shape(field, kind(json)))
}

/// Rows as `(name, value, extra)` from either an object or an array of
/// `[name, value, extra?]` arrays.
fn rows(json: &Json) -> Result<Vec<(String, Value, Option<String>)>, WeaveError> {
    match json {
        Json::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), value_from_json(v)?, None)))
            .collect(),
        Json::Array(items) => items
            .iter()
            .map(|item| match item.as_array().map(Vec::as_slice) {
                Some([name, value]) => Ok((string(name, "a row name")?, value_from_json(value)?, None)),
                Some([name, value, extra]) => Ok((
                    string(name, "a row name")?,
                    value_from_json(value)?,
                    Some(string(extra, "a priority")?),
                )),
                _ => Err(WeaveError::shape("a [name, value] pair", kind(item))),
            })
            .collect(),
        other => Err(WeaveError::shape("an object or an array of pairs", kind(other))),
    }
}

fn style_rows(json: &Json) -> Result<Vec<(String, StyleValue)>, WeaveError> {
    let mut out = Vec::new();
    for (name, value, priority) in rows(json)? {
        let style = StyleValue {
            value,
            important: priority.as_deref() == Some("important"),
        };
        upsert_row(&mut out, &name, Some(style));
    }
    Ok(out)
}

fn value_rows(json: &Json) -> Result<Vec<(String, Value)>, WeaveError> {
    let mut out = Vec::new();
    for (name, value, _) in rows(json)? {
        upsert_row(&mut out, &name, Some(value));
    }
    Ok(out)
}

fn invocation(json: &Json) -> Result<Invocation, WeaveError> {
    match json {
        Json::String(method) => Ok(Invocation::new(method.clone(), [])),
        Json::Array(items) => match items.split_first() {
            Some((method, args)) => Ok(Invocation::new(
                string(method, "a method name")?,
                args.iter().map(value_from_json).collect::<Result<Vec<_>, _>>()?,
            )),
            None => Err(WeaveError::shape("a method name", "an empty array")),
        },
        other => Err(WeaveError::shape("a method name or [method, ...args]", kind(other))),
    }
}

fn transition_config(map: &Map<String, Json>) -> Result<TransitionConfig, WeaveError> {
    let mut config = TransitionConfig::new();
    for (key, value) in map {
        match key.as_str() {
            "duration" => config.duration = Some(number(value, "a duration")?),
            "delay" => config.delay = Some(number(value, "a delay")?),
            "ease" => config.ease = Some(string(value, "an easing name")?.parse()?),
            "text" => config.text = Some(value_from_json(value)?.render()),
            "attrs" => config.attrs = value_rows(value)?,
            "styles" => config.styles = style_rows(value)?,
            "methods" => {
                config.methods = array(value)?
                    .iter()
                    .map(invocation)
                    .collect::<Result<_, _>>()?;
            }
            other => tracing::debug!(key = other, "ignoring unknown transition key"),
        }
    }
    Ok(config)
}

fn transitions(json: &Json) -> Result<Vec<TransitionStep>, WeaveError> {
    array(json)?
        .iter()
        .map(|step| match step {
            Json::String(name) => Ok(TransitionStep::named(name.clone())),
            Json::Null => Ok(TransitionStep::unnamed()),
            Json::Object(map) => Ok(TransitionStep::Configure(transition_config(map)?)),
            other => Err(WeaveError::shape("a transition name or config", kind(other))),
        })
        .collect()
}

fn array(json: &Json) -> Result<&[Json], WeaveError> {
    json.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| WeaveError::shape("an array", kind(json)))
}

/// Parse a children collection: an array of objects or of scalars.
pub fn children_from_json(json: &Json) -> Result<Children, WeaveError> {
    let items = array(json)?;
    if items.iter().all(Json::is_object) {
        return items
            .iter()
            .map(Record::from_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Children::Records);
    }
    if items.iter().all(|i| !i.is_object() && !i.is_array()) {
        return items
            .iter()
            .map(value_from_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Children::Literals);
    }
    Err(WeaveError::shape(
        "an array of records or of scalars",
        "a mixed array",
    ))
}

impl Record {
    /// Parse one record from a JSON object.
    pub fn from_json(json: &Json) -> Result<Self, WeaveError> {
        let Json::Object(map) = json else {
            return Err(WeaveError::shape("an object", kind(json)));
        };
        let mut record = Record::default();
        let props = &mut record.props;
        for (key, value) in map {
            match key.as_str() {
                "tag" => props.tag = Some(string(value, "a tag name")?),
                "ns" => props.ns = Some(string(value, "a namespace")?),
                "selector" => {
                    props.selector = Some(string(value, "a selector")?.parse::<Selector>()?);
                }
                "text" => props.text = Some(value_from_json(value)?.render()),
                "attrs" => props.attrs = value_rows(value)?,
                "styles" => props.styles = style_rows(value)?,
                "properties" => props.properties = value_rows(value)?,
                "transitions" => props.transitions = transitions(value)?,
                "invoke" => {
                    props.invocations = array(value)?
                        .iter()
                        .map(invocation)
                        .collect::<Result<_, _>>()?;
                }
                "children" | "data" => record.children = children_from_json(value)?,
                other => tracing::debug!(key = other, "ignoring unknown record key"),
            }
        }
        Ok(record)
    }

    /// Parse one record from JSON text.
    pub fn from_json_str(source: &str) -> Result<Self, WeaveError> {
        let json: Json =
            serde_json::from_str(source).map_err(|e| WeaveError::shape("valid JSON", e))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TransitionStart, TransitionStep};
    use serde_json::json;
    use weave_dom::Ease;

    #[test]
    fn parses_full_record() {
        let record = Record::from_json(&json!({
            "tag": "svg:rect",
            "attrs": { "width": 10 },
            "styles": [["fill", "red"], ["stroke", "blue", "important"]],
            "properties": [["value", "x"]],
            "text": 42,
            "invoke": ["raise", ["classed", "on", true]],
            "transitions": ["grow", { "duration": 500, "ease": "linear", "attrs": { "width": 40 } }],
            "children": ["a", "b"]
        }))
        .unwrap();

        let props = &record.props;
        assert_eq!(props.tag.as_deref(), Some("svg:rect"));
        assert_eq!(props.attr("width"), Some(&Value::from(10)));
        assert_eq!(props.style("stroke").map(|s| s.important), Some(true));
        assert_eq!(props.style("fill").map(|s| s.important), Some(false));
        assert_eq!(props.text.as_deref(), Some("42"));
        assert_eq!(props.invocations[1].args, vec![Value::from("on"), Value::from(true)]);
        assert!(matches!(
            &props.transitions[0],
            TransitionStep::Start(TransitionStart::Named(Some(n))) if n == "grow"
        ));
        match &props.transitions[1] {
            TransitionStep::Configure(c) => {
                assert_eq!(c.duration, Some(500.0));
                assert_eq!(c.ease, Some(Ease::Linear));
                assert_eq!(c.attrs, vec![("width".to_owned(), Value::from(40))]);
            }
            other => panic!("unexpected step {other:?}"),
        }
        assert!(matches!(record.children, Children::Literals(ref l) if l.len() == 2));
    }

    #[test]
    fn data_alias_and_nested_records() {
        let record = Record::from_json_str(r#"{"tag":"ul","data":[{"tag":"li","text":"x"}]}"#).unwrap();
        match record.children {
            Children::Records(children) => {
                assert_eq!(children[0].props.text.as_deref(), Some("x"));
            }
            Children::Literals(_) => panic!("expected records"),
        }
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(matches!(
            children_from_json(&json!({"tag": "p"})),
            Err(WeaveError::InvalidShape { .. })
        ));
        assert!(matches!(
            children_from_json(&json!([{"tag": "p"}, "leaf"])),
            Err(WeaveError::InvalidShape { .. })
        ));
        assert!(Record::from_json(&json!({"attrs": [["only-name"]]})).is_err());
        assert!(Record::from_json(&json!({"selector": "a b"})).is_err());
        assert!(Record::from_json_str("{not json").is_err());
    }

    #[test]
    fn empty_array_is_empty_records() {
        assert!(matches!(children_from_json(&json!([])), Ok(Children::Records(ref r)) if r.is_empty()));
    }
}
