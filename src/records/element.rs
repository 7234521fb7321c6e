use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use thiserror::Error;

/// An owned XML element tree for a single dump record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first child called `name`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Children of the wrapper child `wrapper` called `item`, e.g. `<urls><url/>`.
    pub fn items<'a>(&'a self, wrapper: &str, item: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.child(wrapper)
            .into_iter()
            .flat_map(move |w| w.children_named(item))
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("Document ended inside <{0}>")]
    UnexpectedEof(String),
}

/// Forward-only reader yielding every element one level below the document root.
///
/// Only the record currently being read is held in memory.
pub struct ElementStream<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    depth: usize,
    stack: Vec<XmlElement>,
    finished: bool,
}

impl<R: BufRead> ElementStream<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::with_capacity(8 * 1024),
            depth: 0,
            stack: Vec::new(),
            finished: false,
        }
    }

    pub fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn next_record(&mut self) -> Result<Option<XmlElement>, StreamError> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| StreamError::Malformed {
                    position: self.reader.buffer_position() as u64,
                    message: e.to_string(),
                })?;
            match event {
                Event::Start(start) => {
                    if self.depth > 0 {
                        let element = open_element(&start, self.reader.buffer_position() as u64)?;
                        self.stack.push(element);
                    }
                    self.depth += 1;
                }
                Event::Empty(start) => {
                    if self.depth > 0 {
                        let element = open_element(&start, self.reader.buffer_position() as u64)?;
                        if let Some(record) = close_element(&mut self.stack, element) {
                            return Ok(Some(record));
                        }
                    }
                }
                Event::End(_) => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth > 0 {
                        if let Some(element) = self.stack.pop() {
                            if let Some(record) = close_element(&mut self.stack, element) {
                                return Ok(Some(record));
                            }
                        }
                    }
                }
                Event::Text(text) => {
                    if let Some(current) = self.stack.last_mut() {
                        let text = text.unescape().map_err(|e| StreamError::Malformed {
                            position: self.reader.buffer_position() as u64,
                            message: e.to_string(),
                        })?;
                        current.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = self.stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => {
                    if let Some(open) = self.stack.first() {
                        return Err(StreamError::UnexpectedEof(open.name.clone()));
                    }
                    if self.depth > 0 {
                        return Err(StreamError::UnexpectedEof("document root".to_string()));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

fn open_element(start: &BytesStart, position: u64) -> Result<XmlElement, StreamError> {
    let malformed = |message: String| StreamError::Malformed { position, message };
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(e.to_string()))?;
        element.attributes.push((
            String::from_utf8_lossy(attr.key.as_ref()).to_string(),
            value.to_string(),
        ));
    }
    Ok(element)
}

/// Attaches a finished element to its parent, or returns it if it is a record.
fn close_element(stack: &mut [XmlElement], element: XmlElement) -> Option<XmlElement> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            None
        }
        None => Some(element),
    }
}

impl<R: BufRead> Iterator for ElementStream<R> {
    type Item = Result<XmlElement, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
