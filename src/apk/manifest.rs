//! Manifest element tree.

use std::{io::Read, str::FromStr};

use failure::Error;
use xml::reader::{EventReader, XmlEvent};

use crate::{error::Kind, utils::parser_config};

/// Namespace of the Android manifest attributes (`android:`).
pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

/// Key of an attribute: namespace and local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrKey<'a> {
    namespace: Option<&'a str>,
    local_name: &'a str,
}

impl<'a> AttrKey<'a> {
    /// Creates a new attribute key.
    pub const fn new(namespace: Option<&'a str>, local_name: &'a str) -> Self {
        Self {
            namespace,
            local_name,
        }
    }

    /// Local name of the attribute.
    pub fn local_name(&self) -> &'a str {
        self.local_name
    }

    /// Key of an attribute in the Android namespace.
    pub const fn android(local_name: &'a str) -> Self {
        Self {
            namespace: Some(ANDROID_NS),
            local_name,
        }
    }

    /// Key of an attribute without namespace.
    pub const fn plain(local_name: &'a str) -> Self {
        Self {
            namespace: None,
            local_name,
        }
    }

    fn matches(&self, attribute: &Attribute) -> bool {
        attribute.local_name == self.local_name
            && attribute.namespace.as_ref().map(String::as_str) == self.namespace
    }
}

/// `android:name`, the most queried attribute.
pub const ANDROID_NAME: AttrKey<'static> = AttrKey::android("name");

#[derive(Debug, Clone, PartialEq, Eq)]
struct Attribute {
    namespace: Option<String>,
    local_name: String,
    value: String,
}

/// Element of the manifest tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<Element>,
}

impl Element {
    /// Creates an empty element with the given tag name.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds an attribute to the element.
    pub fn with_attribute<V: Into<String>>(mut self, key: AttrKey<'_>, value: V) -> Self {
        self.attributes.push(Attribute {
            namespace: key.namespace.map(str::to_owned),
            local_name: key.local_name.to_owned(),
            value: value.into(),
        });
        self
    }

    /// Adds a child element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Tag name of the element.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Gets the value of the given attribute.
    pub fn attr(&self, key: AttrKey<'_>) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| key.matches(a))
            .map(|a| a.value.as_str())
    }

    /// Gets the value of an attribute in the Android namespace.
    pub fn android_attr(&self, local_name: &str) -> Option<&str> {
        self.attr(AttrKey::android(local_name))
    }

    /// Direct children of the element.
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// All the elements with the given tag, this one included, in document order.
    pub fn find_all<'s>(&'s self, tag: &str) -> Vec<&'s Element> {
        let mut found = Vec::new();
        self.collect(tag, &mut found);
        found
    }

    fn collect<'s>(&'s self, tag: &str, found: &mut Vec<&'s Element>) {
        if self.name == tag {
            found.push(self);
        }
        for child in &self.children {
            child.collect(tag, found);
        }
    }

    /// Parses an XML document into its root element.
    pub fn parse<R: Read>(source: R) -> Result<Self, Error> {
        let parser = EventReader::new_with_config(source, parser_config());
        let mut stack: Vec<Element> = Vec::new();

        for event in parser {
            match event {
                Ok(XmlEvent::StartElement {
                    name, attributes, ..
                }) => {
                    let mut element = Element::new(name.local_name);
                    element.attributes = attributes
                        .into_iter()
                        .map(|a| Attribute {
                            namespace: a.name.namespace,
                            local_name: a.name.local_name,
                            value: a.value,
                        })
                        .collect();
                    stack.push(element);
                }
                Ok(XmlEvent::EndElement { .. }) => {
                    let element = stack.pop().ok_or_else(|| Kind::Parse {
                        message: "closing tag without opening tag".to_owned(),
                    })?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => return Ok(element),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(Kind::Parse {
                        message: format!("invalid XML document: {}", e),
                    }
                    .into());
                }
            }
        }

        Err(Kind::Parse {
            message: "the XML document has no root element".to_owned(),
        }
        .into())
    }
}

impl FromStr for Element {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Self::parse(s.as_bytes())
    }
}
