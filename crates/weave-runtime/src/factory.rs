#![forbid(unsafe_code)]

//! Node creation for entering data.

use weave_core::{Datum, RecordNode};
use weave_dom::{Document, DomError, NodeId};

/// Element name for `tag` inside a scope whose namespace prefix is `ns`.
///
/// A tag that carries its own prefix wins over the inherited one.
#[must_use]
pub fn qualified_name(tag: &str, ns: Option<&str>) -> String {
    match ns {
        Some(ns) if !tag.contains(':') => format!("{ns}:{tag}"),
        _ => tag.to_owned(),
    }
}

/// Create the detached node for one datum.
///
/// Records with a tag become elements, tagless records become text nodes
/// carrying the record's text. Literals become text nodes, or `text`
/// elements inside the `svg` namespace.
pub fn create_node(
    doc: &mut Document,
    datum: &Datum,
    record: Option<&RecordNode>,
    ns: Option<&str>,
) -> Result<NodeId, DomError> {
    if let Some(record) = record {
        return Ok(match record.props.tag.as_deref() {
            Some(tag) => doc.create_element(&qualified_name(tag, ns)),
            None => doc.create_text(record.props.text.clone().unwrap_or_default()),
        });
    }
    let text = match datum {
        Datum::Literal(value) => value.render(),
        Datum::Record(_) => String::new(),
    };
    if ns == Some("svg") {
        let node = doc.create_element("svg:text");
        doc.set_text(node, &text)?;
        return Ok(node);
    }
    Ok(doc.create_text(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_core::{Children, Record, RecordStore};
    use weave_dom::{NodeKind, SVG_NS, Value};

    #[test]
    fn prefixes_follow_scope() {
        assert_eq!(qualified_name("rect", Some("svg")), "svg:rect");
        assert_eq!(qualified_name("xhtml:div", Some("svg")), "xhtml:div");
        assert_eq!(qualified_name("p", None), "p");
    }

    #[test]
    fn creates_by_datum_kind() {
        let store = RecordStore::from_children(Children::Records(vec![
            Record::new("circle"),
            Record::text_node("hi"),
        ]));
        let ids: Vec<_> = (0..2).filter_map(|i| store.root().record(i)).collect();
        let mut doc = Document::new();

        let circle = create_node(&mut doc, &Datum::Record(ids[0]), store.get(ids[0]), Some("svg")).unwrap();
        assert_eq!(doc.namespace(circle), Some(SVG_NS));
        assert_eq!(doc.tag_name(circle), Some("circle"));

        let text = create_node(&mut doc, &Datum::Record(ids[1]), store.get(ids[1]), None).unwrap();
        assert_eq!(doc.kind(text), Some(&NodeKind::Text("hi".into())));

        let leaf = Datum::Literal(Value::from(7));
        let plain = create_node(&mut doc, &leaf, None, None).unwrap();
        assert!(doc.is_text(plain));
        let svg = create_node(&mut doc, &leaf, None, Some("svg")).unwrap();
        assert_eq!(doc.tag_name(svg), Some("text"));
        assert_eq!(doc.text_content(svg), "7");
    }
}
