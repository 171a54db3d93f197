//! Scene Document - Owned SVG Element Tree
//!
//! The editor's live scene is parsed once into this tree. Every render
//! works on a deep clone; the parsed original is never mutated by the
//! export pipeline.

use std::fmt::Write as _;

use thiserror::Error;

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Malformed scene markup: {0}")]
    Malformed(#[from] roxmltree::Error),

    #[error("Scene root must be <svg>, found <{0}>")]
    NotSvg(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with qualified attribute names (`xlink:href`, `xmlns:xlink`).
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: vec![], children: vec![] }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(idx).1)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// Local part of the element name (`image` for `svg:image`).
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn has_child_elements(&self) -> bool {
        self.child_elements().next().is_some()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        if self.id() == Some(id) {
            return Some(self);
        }
        self.child_elements().find_map(|c| c.find_by_id(id))
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        if self.id() == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) => e.find_by_id_mut(id),
            Node::Text(_) => None,
        })
    }

    /// Removes every descendant carrying `id`. Returns how many were removed.
    pub fn remove_by_id(&mut self, id: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|n| !matches!(n, Node::Element(e) if e.id() == Some(id)));
        let mut removed = before - self.children.len();
        for child in &mut self.children {
            if let Node::Element(e) = child {
                removed += e.remove_by_id(id);
            }
        }
        removed
    }

    /// Visits this element and all descendants, depth first.
    pub fn for_each_element_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in &mut self.children {
            if let Node::Element(e) = child {
                e.for_each_element_mut(f);
            }
        }
    }

    /// Child-index paths of every descendant whose local name is `local`.
    pub fn paths_of(&self, local: &str) -> Vec<Vec<usize>> {
        let mut out = vec![];
        let mut path = vec![];
        self.collect_paths(local, &mut path, &mut out);
        out
    }

    fn collect_paths(&self, local: &str, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        for (i, child) in self.children.iter().enumerate() {
            if let Node::Element(e) = child {
                path.push(i);
                if e.local_name() == local {
                    out.push(path.clone());
                }
                e.collect_paths(local, path, out);
                path.pop();
            }
        }
    }

    pub fn at_path(&self, path: &[usize]) -> Option<&Element> {
        match path.split_first() {
            None => Some(self),
            Some((i, rest)) => match self.children.get(*i)? {
                Node::Element(e) => e.at_path(rest),
                Node::Text(_) => None,
            },
        }
    }

    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        match path.split_first() {
            None => Some(self),
            Some((i, rest)) => match self.children.get_mut(*i)? {
                Node::Element(e) => e.at_path_mut(rest),
                Node::Text(_) => None,
            },
        }
    }

    fn write_to(&self, out: &mut String) {
        let _ = write!(out, "<{}", self.name);
        for (k, v) in &self.attributes {
            let _ = write!(out, " {}=\"{}\"", k, escape(v, true));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_to(out),
                Node::Text(t) => out.push_str(&escape(t, false)),
            }
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

/// The editor's layered vector scene, rooted at an `<svg>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDocument {
    root: Element,
}

impl SceneDocument {
    pub fn parse(markup: &str) -> Result<Self, SceneError> {
        let opts = roxmltree::ParsingOptions { allow_dtd: true, ..Default::default() };
        let doc = roxmltree::Document::parse_with_options(markup, opts)?;
        let root = doc.root_element();
        if root.tag_name().name() != "svg" {
            return Err(SceneError::NotSvg(root.tag_name().name().to_string()));
        }
        Ok(Self { root: convert(root, None) })
    }

    pub fn from_root(root: Element) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Returns the named layer if it exists and has content.
    pub fn layer(&self, id: &str) -> Option<&Element> {
        self.root.find_by_id(id).filter(|e| e.has_child_elements() || e.name != "g")
    }

    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.root.write_to(&mut out);
        out
    }
}

fn convert(node: roxmltree::Node<'_, '_>, parent: Option<roxmltree::Node<'_, '_>>) -> Element {
    let mut element = Element::new(qualified_element_name(node));

    // Declarations new at this level, so serialization reproduces the scopes.
    for ns in node.namespaces() {
        if ns.uri() == XML_NS {
            continue;
        }
        let inherited = parent
            .map(|p| p.namespaces().any(|pns| pns.name() == ns.name() && pns.uri() == ns.uri()))
            .unwrap_or(false);
        if !inherited {
            let key = match ns.name() {
                Some(prefix) => format!("xmlns:{}", prefix),
                None => "xmlns".to_string(),
            };
            element.attributes.push((key, ns.uri().to_string()));
        }
    }

    for attr in node.attributes() {
        let key = match attr.namespace() {
            Some(XML_NS) => format!("xml:{}", attr.name()),
            Some(uri) => match node.lookup_prefix(uri) {
                Some(prefix) => format!("{}:{}", prefix, attr.name()),
                None => attr.name().to_string(),
            },
            None => attr.name().to_string(),
        };
        element.attributes.push((key, attr.value().to_string()));
    }

    for child in node.children() {
        if child.is_element() {
            element.children.push(Node::Element(convert(child, Some(node))));
        } else if child.is_text() {
            if let Some(text) = child.text() {
                element.children.push(Node::Text(text.to_string()));
            }
        }
    }
    element
}

fn qualified_element_name(node: roxmltree::Node<'_, '_>) -> String {
    let tag = node.tag_name();
    match tag.namespace() {
        None | Some(SVG_NS) => tag.name().to_string(),
        Some(uri) => match node.lookup_prefix(uri) {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, tag.name()),
            _ => tag.name().to_string(),
        },
    }
}

fn escape(value: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" id="lin" viewBox="0 0 1100 700">
  <g id="boxgrid"><path d="M0 0 L10 10"/></g>
  <g id="boxwall"><path d="M0 0 H100" stroke="#333"/></g>
  <g id="boxFurniture"><image xlink:href="chair.png" width="10" height="10"/></g>
  <g id="boxText"><text x="1" y="2">Living &amp; dining</text></g>
  <g id="boxRoom"/>
</svg>"##;

    #[test]
    fn test_parse_and_lookup() {
        let doc = SceneDocument::parse(PLAN).unwrap();
        assert_eq!(doc.root().id(), Some("lin"));
        assert!(doc.layer("boxwall").is_some());
        // Present but empty layers count as absent.
        assert!(doc.layer("boxRoom").is_none());
        assert!(doc.layer("boxEnergy").is_none());
    }

    #[test]
    fn test_namespaced_attributes_survive_round_trip() {
        let doc = SceneDocument::parse(PLAN).unwrap();
        let markup = doc.to_markup();
        assert!(markup.contains(r#"xmlns:xlink="http://www.w3.org/1999/xlink""#));
        assert!(markup.contains(r#"xlink:href="chair.png""#));
        assert!(markup.contains("Living &amp; dining"));

        let again = SceneDocument::parse(&markup).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn test_remove_by_id_is_deep() {
        let mut doc = SceneDocument::parse(PLAN).unwrap();
        let clone = doc.clone();
        assert_eq!(doc.root_mut().remove_by_id("boxgrid"), 1);
        assert!(doc.root().find_by_id("boxgrid").is_none());
        // The clone is independent.
        assert!(clone.root().find_by_id("boxgrid").is_some());
    }

    #[test]
    fn test_paths_of_images() {
        let doc = SceneDocument::parse(PLAN).unwrap();
        let paths = doc.root().paths_of("image");
        assert_eq!(paths.len(), 1);
        let image = doc.root().at_path(&paths[0]).unwrap();
        assert_eq!(image.attr("xlink:href"), Some("chair.png"));
    }

    #[test]
    fn test_rejects_non_svg_root() {
        assert!(matches!(SceneDocument::parse("<div/>"), Err(SceneError::NotSvg(_))));
        assert!(matches!(SceneDocument::parse("<svg"), Err(SceneError::Malformed(_))));
    }
}
