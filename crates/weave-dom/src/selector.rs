#![forbid(unsafe_code)]

//! Child selectors used to pick the nodes a collection is joined against.
//!
//! Only a compact CSS subset is understood: an optional `:scope>` prefix
//! (direct children only) followed by one compound selector made of an
//! optional type (`rect`, `svg:rect`, `*`), classes (`.a.b`) and an id
//! (`#main`). Without `:scope>` the whole subtree is searched.

use std::fmt;
use std::str::FromStr;

use crate::document::{Document, NodeId, resolve_name};
use crate::error::DomError;

/// Which nodes under a root take part in a join.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    /// Every child node, text leaves included.
    #[default]
    ChildNodes,
    /// Element children only (`:scope>*`).
    ChildElements,
    /// A parsed CSS subset selector.
    Css(Css),
}

impl Selector {
    /// Parse a CSS subset selector.
    pub fn css(source: &str) -> Result<Self, DomError> {
        source.parse()
    }
}

impl FromStr for Selector {
    type Err = DomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let css: Css = s.parse()?;
        if css.direct && css.tag.is_none() && css.classes.is_empty() && css.id.is_none() {
            return Ok(Self::ChildElements);
        }
        Ok(Self::Css(css))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChildNodes => f.write_str("childNodes"),
            Self::ChildElements => f.write_str(":scope>*"),
            Self::Css(css) => write!(f, "{}", css.source),
        }
    }
}

/// A single compound CSS selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Css {
    source: String,
    direct: bool,
    tag: Option<String>,
    classes: Vec<String>,
    id: Option<String>,
}

impl Css {
    /// Whether matching is restricted to direct children of the root.
    #[must_use]
    pub fn direct_children_only(&self) -> bool {
        self.direct
    }

    /// Whether `node` matches the compound selector.
    #[must_use]
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(name) = doc.tag_name(node) else {
            return false;
        };
        if let Some(tag) = &self.tag {
            let (ns, local) = resolve_name(tag);
            if local != name || (ns.is_some() && ns != doc.namespace(node)) {
                return false;
            }
        }
        if let Some(id) = &self.id
            && doc.attr(node, "id") != Some(id.as_str())
        {
            return false;
        }
        self.classes.iter().all(|c| doc.has_class(node, c))
    }
}

impl FromStr for Css {
    type Err = DomError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let invalid = || DomError::InvalidSelector(source.to_owned());
        let mut rest = source.trim();
        let mut direct = false;
        if let Some(after) = rest.strip_prefix(":scope") {
            rest = after
                .trim_start()
                .strip_prefix('>')
                .ok_or_else(invalid)?
                .trim_start();
            direct = true;
        }
        if rest.is_empty() || rest.contains(char::is_whitespace) || rest.contains(',') {
            return Err(invalid());
        }

        let mut tag = None;
        let mut classes = Vec::new();
        let mut id = None;
        let mut token = String::new();
        let mut kind = 't';
        let mut flush = |kind: char, token: &mut String| -> Result<(), DomError> {
            let value = std::mem::take(token);
            match kind {
                't' if value.is_empty() || value == "*" => {}
                't' => tag = Some(value),
                _ if value.is_empty() => return Err(invalid()),
                '.' => classes.push(value),
                _ => id = Some(value),
            }
            Ok(())
        };
        for ch in rest.chars() {
            match ch {
                '.' | '#' => {
                    flush(kind, &mut token)?;
                    kind = ch;
                }
                _ => token.push(ch),
            }
        }
        flush(kind, &mut token)?;

        Ok(Self {
            source: source.to_owned(),
            direct,
            tag,
            classes,
            id,
        })
    }
}
