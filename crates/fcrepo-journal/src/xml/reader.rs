use super::events::{Node, XmlEvents, unexpected};
use super::{
    ARGUMENT, ATTR_METHOD, ATTR_NAME, ATTR_REPOSITORY_HASH, ATTR_SEQUENCE, ATTR_TIMESTAMP,
    ATTR_TYPE, CONTEXT, ELEMENT, ENTRY, JournalHeader, KEY, MULTIMAP, NO_OP, NOW, PASSWORD, ROOT,
    VALUE, parse_timestamp,
};
use crate::cipher;
use crate::context::{AttributeMap, JournalEntryContext, MultiValueMap};
use crate::entry::{Argument, JournalEntry, ManagementMethod};
use crate::error::{JournalError, JournalResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Entries of one journal file, in file order
pub struct JournalFileReader<R: BufRead> {
    events: XmlEvents<R>,
    header: JournalHeader,
    done: bool,
}

impl JournalFileReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> JournalResult<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: BufRead> JournalFileReader<R> {
    /// Read the root element; entries are read on demand
    pub fn new(source: R) -> JournalResult<Self> {
        let mut events = XmlEvents::new(source);
        let root = events.expect_start(ROOT)?;
        let header = JournalHeader {
            repository_hash: root.required(ATTR_REPOSITORY_HASH)?.to_string(),
            timestamp: parse_timestamp(root.required(ATTR_TIMESTAMP)?)?,
        };
        Ok(Self {
            events,
            header,
            done: false,
        })
    }

    #[must_use]
    pub const fn header(&self) -> &JournalHeader {
        &self.header
    }

    /// Next entry, `None` after the closing root element
    pub fn next_entry(&mut self) -> JournalResult<Option<JournalEntry>> {
        if self.done {
            return Ok(None);
        }
        match self.events.next_node()? {
            Node::Start(e) if e.name == ENTRY => {
                let method = e.required(ATTR_METHOD)?.parse::<ManagementMethod>()?;
                let sequence = parse_sequence(e.required(ATTR_SEQUENCE)?)?;
                read_entry_body(&mut self.events, method, sequence).map(Some)
            }
            Node::End(name) if name == ROOT => {
                self.done = true;
                Ok(None)
            }
            other => Err(unexpected(&other, &format!("<{ENTRY}> or </{ROOT}>"))),
        }
    }
}

impl<R: BufRead> Iterator for JournalFileReader<R> {
    type Item = JournalResult<JournalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn parse_sequence(s: &str) -> JournalResult<u64> {
    s.trim()
        .parse()
        .map_err(|_| JournalError::malformed(format!("bad sequence {s:?}")))
}

/// Parse a standalone `<context>` document
pub fn read_context(source: impl BufRead) -> JournalResult<JournalEntryContext> {
    let mut events = XmlEvents::new(source);
    events.expect_start(CONTEXT)?;
    read_context_body(&mut events)
}

/// Parse one `<JournalEntry>` fragment
pub fn read_entry(xml: &str) -> JournalResult<JournalEntry> {
    let mut events = XmlEvents::new(xml.as_bytes());
    let e = events.expect_start(ENTRY)?;
    let method = e.required(ATTR_METHOD)?.parse::<ManagementMethod>()?;
    let sequence = parse_sequence(e.required(ATTR_SEQUENCE)?)?;
    read_entry_body(&mut events, method, sequence)
}

fn read_entry_body<R: BufRead>(
    events: &mut XmlEvents<R>,
    method: ManagementMethod,
    sequence: u64,
) -> JournalResult<JournalEntry> {
    let context = match events.next_node()? {
        Node::Start(e) if e.name == CONTEXT => read_context_body(events)?.build(),
        other => return Err(unexpected(&other, &format!("<{CONTEXT}>"))),
    };

    let mut entry = JournalEntry::new(method, context).with_sequence(sequence);
    loop {
        match events.next_node()? {
            Node::Start(e) if e.name == ARGUMENT => {
                let name = e.required(ATTR_NAME)?.to_string();
                let value = read_argument(events, e.required(ATTR_TYPE)?)?;
                entry = entry.with_argument(name, value);
            }
            Node::End(name) if name == ENTRY => return Ok(entry),
            other => return Err(unexpected(&other, &format!("<{ARGUMENT}> or </{ENTRY}>"))),
        }
    }
}

fn read_argument<R: BufRead>(events: &mut XmlEvents<R>, kind: &str) -> JournalResult<Argument> {
    let value = match kind {
        "string" => Argument::String(events.read_text(ARGUMENT)?),
        "integer" => {
            let text = events.read_text(ARGUMENT)?;
            Argument::Integer(
                text.trim()
                    .parse()
                    .map_err(|_| JournalError::malformed(format!("bad integer {text:?}")))?,
            )
        }
        "boolean" => Argument::Boolean(parse_bool(&events.read_text(ARGUMENT)?)?),
        "date" => Argument::Date(parse_timestamp(&events.read_text(ARGUMENT)?)?),
        "binary" => {
            let text = events.read_text(ARGUMENT)?;
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            Argument::Binary(
                STANDARD
                    .decode(compact)
                    .map_err(|e| JournalError::malformed(format!("bad binary argument: {e}")))?,
            )
        }
        "null" => {
            let text = events.read_text(ARGUMENT)?;
            if !text.trim().is_empty() {
                return Err(JournalError::malformed("null argument has content"));
            }
            Argument::Null
        }
        "stringArray" => {
            let mut items = Vec::new();
            loop {
                match events.next_node()? {
                    Node::Start(e) if e.name == ELEMENT => items.push(events.read_text(ELEMENT)?),
                    Node::End(name) if name == ARGUMENT => break,
                    other => {
                        return Err(unexpected(&other, &format!("<{ELEMENT}> or </{ARGUMENT}>")));
                    }
                }
            }
            Argument::StringArray(items)
        }
        other => {
            return Err(JournalError::malformed(format!(
                "unknown argument type {other:?}"
            )));
        }
    };
    Ok(value)
}

fn parse_bool(text: &str) -> JournalResult<bool> {
    match text.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(JournalError::malformed(format!("bad boolean {other:?}"))),
    }
}

/// Children of `<context>`, through `</context>`
fn read_context_body<R: BufRead>(events: &mut XmlEvents<R>) -> JournalResult<JournalEntryContext> {
    let mut password: Option<(String, Option<String>)> = None;
    let mut no_op = false;
    let mut now: Option<String> = None;
    let mut maps: Vec<(AttributeMap, MultiValueMap)> = Vec::new();

    loop {
        match events.next_node()? {
            Node::Start(e) => match e.name.as_str() {
                PASSWORD => {
                    let cipher_type = e.attr(ATTR_TYPE).map(str::to_string);
                    password = Some((events.read_text(PASSWORD)?, cipher_type));
                }
                NO_OP => no_op = parse_bool(&events.read_text(NO_OP)?)?,
                NOW => now = Some(events.read_text(NOW)?),
                MULTIMAP => {
                    let name = e.required(ATTR_NAME)?;
                    let map = AttributeMap::from_name(name).ok_or_else(|| {
                        JournalError::malformed(format!("unknown multimap {name:?}"))
                    })?;
                    maps.push((map, read_multimap(events)?));
                }
                other => {
                    return Err(JournalError::malformed(format!(
                        "unexpected <{other}> in <{CONTEXT}>"
                    )));
                }
            },
            Node::End(name) if name == CONTEXT => break,
            other => return Err(unexpected(&other, &format!("</{CONTEXT}>"))),
        }
    }

    let now_text = now.ok_or_else(|| JournalError::malformed("context has no <now>"))?;
    let mut context = JournalEntryContext::new(parse_timestamp(&now_text)?).no_op(no_op);
    if let Some((text, cipher_type)) = password {
        let plain = cipher::decipher(now_text.trim(), &text, cipher_type.as_deref())?;
        context = context.password(plain);
    }
    for (map, values) in maps {
        *context.attributes_mut(map) = values;
    }
    Ok(context)
}

fn read_multimap<R: BufRead>(
    events: &mut XmlEvents<R>,
) -> JournalResult<MultiValueMap> {
    let mut map = MultiValueMap::new();
    loop {
        match events.next_node()? {
            Node::Start(e) if e.name == KEY => {
                let key = e.required(ATTR_NAME)?.to_string();
                let mut values = Vec::new();
                loop {
                    match events.next_node()? {
                        Node::Start(v) if v.name == VALUE => values.push(events.read_text(VALUE)?),
                        Node::End(name) if name == KEY => break,
                        other => return Err(unexpected(&other, &format!("<{VALUE}> or </{KEY}>"))),
                    }
                }
                map.set(key, values);
            }
            Node::End(name) if name == MULTIMAP => return Ok(map),
            other => return Err(unexpected(&other, &format!("<{KEY}> or </{MULTIMAP}>"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::xml::{JournalXmlWriter, entry_to_xml, write_context};
    use chrono::{TimeZone, Utc};

    fn sample_context() -> Context {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap();
        Context::builder(now)
            .password("s3cret <&> \"quoted\"")
            .attribute(
                AttributeMap::Environment,
                "urn:fedora:names:fedora:2.1:environment:httpRequest:clientIpAddress",
                ["127.0.0.1"],
            )
            .attribute(
                AttributeMap::Subject,
                "urn:fedora:names:fedora:2.1:subject:loginId",
                ["fedoraAdmin"],
            )
            .attribute(AttributeMap::Subject, "role", ["administrator", "  padded  ", ""])
            .attribute(AttributeMap::Action, "empty", Vec::<String>::new())
            .build()
    }

    #[test]
    fn test_context_round_trip() {
        let context = sample_context();
        let xml = write_context(&context, Vec::new()).unwrap();
        let read = read_context(xml.as_slice()).unwrap().build();
        assert_eq!(read, context);
        assert!(read.resource().is_empty());
        assert_eq!(read.subject().get("role")[1], "  padded  ");
    }

    #[test]
    fn test_context_round_trip_empty() {
        let context = Context::new(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());
        let xml = write_context(&context, Vec::new()).unwrap();
        assert_eq!(read_context(xml.as_slice()).unwrap().build(), context);
    }

    #[test]
    fn test_password_is_not_plaintext() {
        let context = Context::builder(Utc::now()).password("fedoraAdmin").build();
        let xml = String::from_utf8(write_context(&context, Vec::new()).unwrap()).unwrap();
        assert!(xml.contains("<password type=\"1\">"));
        assert!(!xml.contains("fedoraAdmin"));
    }

    #[test]
    fn test_legacy_plaintext_password() {
        let xml = r#"<context>
            <password>fedoraAdmin</password>
            <noOp>true</noOp>
            <now>2009-03-25T12:30:00.123Z</now>
            <multimap name="subject"><key name="loginId"><value>fedoraAdmin</value></key></multimap>
        </context>"#;
        let context = read_context(xml.as_bytes()).unwrap().build();
        assert_eq!(context.password(), "fedoraAdmin");
        assert!(context.no_op());
        assert_eq!(context.subject().get("loginId"), ["fedoraAdmin".to_string()]);
        assert_eq!(context.now().timestamp_subsec_millis(), 123);
    }

    #[test]
    fn test_unknown_cipher_type_is_malformed() {
        let xml = r#"<context><password type="9">x</password><now>2009-03-25T12:30:00.000Z</now></context>"#;
        assert!(read_context(xml.as_bytes()).unwrap_err().is_malformed());
    }

    #[test]
    fn test_malformed_context() {
        for xml in [
            "<context><noOp>maybe</noOp><now>2009-03-25T12:30:00.000Z</now></context>",
            "<context><noOp>false</noOp></context>",
            "<context><multimap name=\"other\"></multimap><now>2009-03-25T12:30:00.000Z</now></context>",
            "<context><now>2009-03-25T12:30:00.000Z</now>",
            "<context><now>2009-03-25T12:30:00.000Z</now></contex>",
        ] {
            assert!(read_context(xml.as_bytes()).unwrap_err().is_malformed(), "{xml}");
        }
    }

    fn sample_entry(sequence: u64) -> JournalEntry {
        JournalEntry::new(ManagementMethod::AddDatastream, sample_context())
            .with_sequence(sequence)
            .with_argument("pid", "demo:1")
            .with_argument("dsId", "IMG")
            .with_argument("versionable", true)
            .with_argument("size", -42_i64)
            .with_argument("created", Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap())
            .with_argument("altIds", vec!["one".to_string(), "two".to_string()])
            .with_argument("content", vec![0_u8, 1, 2, 255, b'<'])
            .with_argument("logMessage", Argument::Null)
    }

    #[test]
    fn test_entry_round_trip() {
        let entry = sample_entry(7);
        let xml = entry_to_xml(&entry).unwrap();
        assert_eq!(read_entry(&xml).unwrap(), entry);
    }

    #[test]
    fn test_file_reader() {
        let header = JournalHeader {
            repository_hash: "abc123".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
        };
        let mut writer = JournalXmlWriter::new(Vec::new());
        writer.write_header(&header).unwrap();
        for seq in 1..=3 {
            writer.write_entry(&sample_entry(seq)).unwrap();
        }
        writer.write_footer().unwrap();
        let bytes = writer.into_inner();

        let reader = JournalFileReader::new(bytes.as_slice()).unwrap();
        assert_eq!(reader.header(), &header);
        let sequences: Vec<u64> = reader.map(|e| e.unwrap().sequence()).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn test_file_reader_truncated() {
        let xml = r#"<FedoraJournal repositoryHash="h" timestamp="2026-10-18T09:00:00.000Z">
            <JournalEntry method="purgeObject" sequence="1" timestamp="2026-10-18T09:00:00.000Z">"#;
        let mut reader = JournalFileReader::new(xml.as_bytes()).unwrap();
        assert!(reader.next().unwrap().unwrap_err().is_malformed());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_unknown_argument_type() {
        let xml = r#"<JournalEntry method="purgeObject" sequence="1" timestamp="2026-10-18T09:00:00.000Z">
            <context><now>2026-10-18T09:00:00.000Z</now></context>
            <argument name="pid" type="float">1.5</argument>
        </JournalEntry>"#;
        assert!(read_entry(xml).unwrap_err().is_malformed());
    }
}
