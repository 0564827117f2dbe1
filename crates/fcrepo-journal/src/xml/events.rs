//! Owned pull parser over quick-xml events

use crate::error::{JournalError, JournalResult};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::BufRead;

#[derive(Debug)]
pub(crate) struct Element {
    pub name: String,
    attrs: Vec<(String, String)>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> JournalResult<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }
        Ok(Self { name, attrs })
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn required(&self, name: &str) -> JournalResult<&str> {
        self.attr(name).ok_or_else(|| {
            JournalError::malformed(format!("<{}> lacks attribute {name}", self.name))
        })
    }
}

#[derive(Debug)]
pub(crate) enum Node {
    Start(Element),
    End(String),
    Text(String),
    Eof,
}

pub(crate) struct XmlEvents<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    pending_end: Option<String>,
}

impl<R: BufRead> XmlEvents<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            pending_end: None,
        }
    }

    /// Next element boundary or text run; declarations and comments skipped
    fn next_raw(&mut self) -> JournalResult<Node> {
        if let Some(name) = self.pending_end.take() {
            return Ok(Node::End(name));
        }
        loop {
            self.buf.clear();
            let node = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => Node::Start(Element::from_start(&e)?),
                Event::Empty(e) => {
                    let element = Element::from_start(&e)?;
                    self.pending_end = Some(element.name.clone());
                    Node::Start(element)
                }
                Event::End(e) => Node::End(String::from_utf8_lossy(e.name().as_ref()).into_owned()),
                Event::Text(t) => Node::Text(t.unescape()?.into_owned()),
                Event::CData(c) => Node::Text(
                    String::from_utf8(c.into_inner().into_owned())
                        .map_err(|_| JournalError::malformed("CDATA is not UTF-8"))?,
                ),
                Event::Eof => Node::Eof,
                _ => continue,
            };
            return Ok(node);
        }
    }

    /// Next node that is not whitespace between elements
    pub fn next_node(&mut self) -> JournalResult<Node> {
        loop {
            match self.next_raw()? {
                Node::Text(t) if t.trim().is_empty() => {}
                Node::Text(t) => {
                    return Err(JournalError::malformed(format!(
                        "unexpected text {:?}",
                        truncate(&t)
                    )));
                }
                node => return Ok(node),
            }
        }
    }

    pub fn expect_start(&mut self, name: &str) -> JournalResult<Element> {
        match self.next_node()? {
            Node::Start(e) if e.name == name => Ok(e),
            other => Err(unexpected(&other, &format!("<{name}>"))),
        }
    }

    /// Text content of an element whose start was just consumed, through its end
    pub fn read_text(&mut self, name: &str) -> JournalResult<String> {
        let mut text = String::new();
        loop {
            match self.next_raw()? {
                Node::Text(t) => text.push_str(&t),
                Node::End(n) if n == name => return Ok(text),
                other => return Err(unexpected(&other, &format!("text or </{name}>"))),
            }
        }
    }
}

fn truncate(s: &str) -> &str {
    s.char_indices().nth(40).map_or(s, |(i, _)| &s[..i])
}

pub(crate) fn unexpected(node: &Node, wanted: &str) -> JournalError {
    let found = match node {
        Node::Start(e) => format!("<{}>", e.name),
        Node::End(n) => format!("</{n}>"),
        Node::Text(t) => format!("text {:?}", truncate(t)),
        Node::Eof => "end of input".to_string(),
    };
    JournalError::malformed(format!("expected {wanted}, found {found}"))
}
