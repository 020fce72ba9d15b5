//! Owned XML element tree
//!
//! The document stays a tree from generation through sanitization and is
//! serialized once. Parsing exists for ingesting documents produced elsewhere.

use crate::error::XmlError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name, e.g. `bpmn2:sequenceFlow`.
    pub name: String,
    /// Attributes in emission order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// Text content; `None` and empty are equivalent on output.
    pub text: Option<String>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder: append an attribute.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Builder: append a child.
    pub fn child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Builder: set text content. Empty text is stored as `None`.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text = if text.is_empty() { None } else { Some(text) };
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .rsplit_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.name)
    }

    pub fn is(&self, local: &str) -> bool {
        self.local_name() == local
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.get("id")
    }

    /// Set an attribute, replacing in place if present.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(pos).1)
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// First direct child with the given local name.
    pub fn find(&self, local: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(local))
    }

    pub fn find_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find(|c| c.is(local))
    }

    /// Direct children with the given local name.
    pub fn children_named<'s>(&'s self, local: &'s str) -> impl Iterator<Item = &'s XmlElement> {
        self.children.iter().filter(move |c| c.is(local))
    }

    /// Pre-order visit of this element and every descendant.
    pub fn walk<'s>(&'s self, visit: &mut impl FnMut(&'s XmlElement)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Pre-order mutable visit.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut XmlElement)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }

    /// All descendants (excluding self) with the given local name, in document order.
    pub fn descendants_named<'s>(&'s self, local: &str) -> Vec<&'s XmlElement> {
        let mut found = Vec::new();
        for child in &self.children {
            child.walk(&mut |el| {
                if el.is(local) {
                    found.push(el);
                }
            });
        }
        found
    }

    /// Drop every descendant for which `keep` returns false, in document order.
    /// A dropped element takes its subtree with it.
    pub fn retain_descendants(&mut self, keep: &mut impl FnMut(&XmlElement) -> bool) {
        self.children.retain(|c| keep(c));
        for child in &mut self.children {
            child.retain_descendants(keep);
        }
    }

    /// Find a descendant-or-self by `id` attribute.
    pub fn find_by_id(&self, id: &str) -> Option<&XmlElement> {
        if self.id() == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_id(id))
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut XmlElement> {
        if self.id() == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_by_id_mut(id))
    }
}

// ── Platform helpers ──

/// `<ifl:property><key>k</key><value>v</value></ifl:property>`
pub fn property(key: &str, value: &str) -> XmlElement {
    XmlElement::new("ifl:property")
        .child(XmlElement::new("key").with_text(key))
        .child(XmlElement::new("value").with_text(value))
}

/// `<bpmn2:extensionElements>` holding the given properties in order.
pub fn extension_elements<'p>(props: impl IntoIterator<Item = (&'p str, &'p str)>) -> XmlElement {
    let mut ext = XmlElement::new("bpmn2:extensionElements");
    for (key, value) in props {
        ext.push(property(key, value));
    }
    ext
}

/// Read the `key → value` pairs of an extension block.
pub fn read_properties(ext: &XmlElement) -> Vec<(String, String)> {
    ext.children_named("property")
        .map(|p| {
            let key = p.find("key").map(|k| k.text().to_string()).unwrap_or_default();
            let value = p.find("value").map(|v| v.text().to_string()).unwrap_or_default();
            (key, value)
        })
        .collect()
}

// ── Serialization ──

/// Serialize with an XML declaration and 4-space indentation.
pub fn write_document(root: &XmlElement) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_element(&mut writer, root)?;
    Ok(String::from_utf8(writer.into_inner())?)
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &XmlElement) -> Result<(), XmlError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    let text = el.text.as_deref().filter(|t| !t.is_empty());
    if el.children.is_empty() && text.is_none() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    if let Some(text) = text {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in &el.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    Ok(())
}

/// Parse a document into its root element. Comments, processing
/// instructions and the declaration are dropped.
pub fn parse_document(xml: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(start_element(&e)?),
            Event::Empty(e) => {
                let el = start_element(&e)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(e) => {
                let text = e.unescape()?;
                if let Some(top) = stack.last_mut() {
                    append_text(top, &text);
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8(e.into_inner().into_owned())?;
                if let Some(top) = stack.last_mut() {
                    append_text(top, &text);
                }
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| XmlError::Malformed("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Malformed("unclosed element at end of input".to_string()));
    }
    root.ok_or_else(|| XmlError::Malformed("no root element".to_string()))
}

fn start_element(e: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let mut el = XmlElement::new(String::from_utf8(e.name().as_ref().to_vec())?);
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8(attr.key.as_ref().to_vec())?;
        let value = attr.unescape_value()?.into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn append_text(el: &mut XmlElement, text: &str) {
    if text.is_empty() {
        return;
    }
    match &mut el.text {
        Some(existing) => existing.push_str(text),
        None => el.text = Some(text.to_string()),
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    el: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(el);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(el);
            Ok(())
        }
        None => Err(XmlError::Malformed("multiple root elements".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> XmlElement {
        XmlElement::new("bpmn2:process")
            .attr("id", "Process_1")
            .child(extension_elements([("transactionTimeout", "30"), ("note", "")]))
            .child(
                XmlElement::new("bpmn2:sequenceFlow")
                    .attr("id", "f1")
                    .attr("sourceRef", "a")
                    .attr("targetRef", "b")
                    .child(XmlElement::new("bpmn2:conditionExpression").with_text("${header.x} > 1")),
            )
    }

    #[test]
    fn test_write_then_parse_preserves_tree() {
        let xml = write_document(&sample()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("${header.x} &gt; 1"));
        assert!(xml.contains("<value/>"));
        let parsed = parse_document(&xml).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_attribute_set_and_remove() {
        let mut el = XmlElement::new("bpmn2:exclusiveGateway").attr("id", "gw");
        el.set("default", "f1");
        el.set("default", "f2");
        assert_eq!(el.get("default"), Some("f2"));
        assert_eq!(el.attributes.len(), 2);
        assert_eq!(el.remove_attr("default").as_deref(), Some("f2"));
        assert_eq!(el.get("default"), None);
    }

    #[test]
    fn test_local_name_and_find() {
        let el = sample();
        assert_eq!(el.local_name(), "process");
        assert!(el.find("extensionElements").is_some());
        assert_eq!(el.find_by_id("f1").unwrap().get("sourceRef"), Some("a"));
        assert_eq!(el.descendants_named("property").len(), 2);
    }

    #[test]
    fn test_retain_descendants_prunes_subtrees() {
        let mut el = sample();
        el.retain_descendants(&mut |c| !c.is("sequenceFlow"));
        assert!(el.find_by_id("f1").is_none());
        assert!(el.descendants_named("conditionExpression").is_empty());
    }

    #[test]
    fn test_read_properties() {
        let ext = extension_elements([("a", "1"), ("b", "")]);
        assert_eq!(
            read_properties(&ext),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), String::new())
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_document(""), Err(XmlError::Malformed(_))));
        assert!(parse_document("<a><b></a>").is_err());
    }
}
