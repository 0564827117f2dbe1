use super::{
    ARGUMENT, ATTR_METHOD, ATTR_NAME, ATTR_REPOSITORY_HASH, ATTR_SEQUENCE, ATTR_TIMESTAMP,
    ATTR_TYPE, CONTEXT, ELEMENT, ENTRY, JournalHeader, KEY, MULTIMAP, NO_OP, NOW, PASSWORD, ROOT,
    VALUE, format_timestamp,
};
use crate::cipher::{self, CIPHER_TYPE};
use crate::context::{AttributeMap, Context};
use crate::entry::{Argument, JournalEntry};
use crate::error::JournalResult;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Write;

/// Streams journal XML to a sink
pub struct JournalXmlWriter<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> JournalXmlWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: Writer::new(sink),
        }
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> JournalResult<()> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.writer.write_event(Event::Start(start))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> JournalResult<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn text(&mut self, text: &str) -> JournalResult<()> {
        if !text.is_empty() {
            self.writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        Ok(())
    }

    fn newline(&mut self) -> JournalResult<()> {
        self.writer.write_event(Event::Text(BytesText::new("\n")))?;
        Ok(())
    }

    fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> JournalResult<()> {
        self.start(name, attrs)?;
        self.text(text)?;
        self.end(name)
    }

    /// XML declaration and the opening root element
    pub fn write_header(&mut self, header: &JournalHeader) -> JournalResult<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.newline()?;
        let timestamp = format_timestamp(header.timestamp);
        self.start(
            ROOT,
            &[
                (ATTR_REPOSITORY_HASH, header.repository_hash.as_str()),
                (ATTR_TIMESTAMP, timestamp.as_str()),
            ],
        )?;
        self.newline()
    }

    /// Closing root element
    pub fn write_footer(&mut self) -> JournalResult<()> {
        self.end(ROOT)?;
        self.newline()
    }

    pub fn write_entry(&mut self, entry: &JournalEntry) -> JournalResult<()> {
        let sequence = entry.sequence().to_string();
        let timestamp = format_timestamp(entry.timestamp());
        self.start(
            ENTRY,
            &[
                (ATTR_METHOD, entry.method().as_str()),
                (ATTR_SEQUENCE, sequence.as_str()),
                (ATTR_TIMESTAMP, timestamp.as_str()),
            ],
        )?;
        self.newline()?;
        self.write_context(entry.context())?;
        self.newline()?;
        for (name, value) in entry.arguments() {
            self.write_argument(name, value)?;
            self.newline()?;
        }
        self.end(ENTRY)?;
        self.newline()
    }

    /// The `<context>` element; the password is enciphered keyed by `now`
    pub fn write_context(&mut self, context: &Context) -> JournalResult<()> {
        let now = format_timestamp(context.now());
        self.start(CONTEXT, &[])?;
        self.text_element(
            PASSWORD,
            &[(ATTR_TYPE, CIPHER_TYPE)],
            &cipher::encipher(&now, context.password()),
        )?;
        self.text_element(NO_OP, &[], if context.no_op() { "true" } else { "false" })?;
        self.text_element(NOW, &[], &now)?;
        for map in AttributeMap::ALL {
            self.start(MULTIMAP, &[(ATTR_NAME, map.name())])?;
            for (key, values) in context.attributes(map) {
                self.start(KEY, &[(ATTR_NAME, key.as_str())])?;
                for value in values {
                    self.text_element(VALUE, &[], value)?;
                }
                self.end(KEY)?;
            }
            self.end(MULTIMAP)?;
        }
        self.end(CONTEXT)
    }

    fn write_argument(&mut self, name: &str, value: &Argument) -> JournalResult<()> {
        let attrs = [(ATTR_NAME, name), (ATTR_TYPE, value.type_name())];
        match value {
            Argument::String(s) => self.text_element(ARGUMENT, &attrs, s),
            Argument::Integer(n) => self.text_element(ARGUMENT, &attrs, &n.to_string()),
            Argument::Boolean(b) => self.text_element(ARGUMENT, &attrs, &b.to_string()),
            Argument::Date(d) => self.text_element(ARGUMENT, &attrs, &format_timestamp(*d)),
            Argument::Binary(data) => self.text_element(ARGUMENT, &attrs, &STANDARD.encode(data)),
            Argument::Null => self.text_element(ARGUMENT, &attrs, ""),
            Argument::StringArray(items) => {
                self.start(ARGUMENT, &attrs)?;
                for item in items {
                    self.text_element(ELEMENT, &[], item)?;
                }
                self.end(ARGUMENT)
            }
        }
    }

    pub fn flush(&mut self) -> JournalResult<()> {
        self.writer.get_mut().flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

/// Write a standalone `<context>` document
pub fn write_context<W: Write>(context: &Context, sink: W) -> JournalResult<W> {
    let mut writer = JournalXmlWriter::new(sink);
    writer.write_context(context)?;
    writer.flush()?;
    Ok(writer.into_inner())
}

/// One entry as an XML fragment
pub fn entry_to_xml(entry: &JournalEntry) -> JournalResult<String> {
    let mut writer = JournalXmlWriter::new(Vec::new());
    writer.write_entry(entry)?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| crate::error::JournalError::malformed(e.to_string()))
}
