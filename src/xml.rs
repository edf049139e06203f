//! XML writing and path-driven reading shared by Facturae, Veri*Factu and
//! the SOAP channels.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use rust_decimal::{Decimal, RoundingStrategy};
use std::io::Cursor;

use crate::core::FacturaError;

fn xml_io(e: std::io::Error) -> FacturaError {
    FacturaError::Xml(format!("XML write error: {e}"))
}

pub(crate) struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlWriter {
    pub fn new() -> Result<Self, FacturaError> {
        let mut writer = Self::fragment();
        writer
            .writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_io)?;
        Ok(writer)
    }

    /// A writer without XML declaration, for SOAP bodies.
    pub fn fragment() -> Self {
        Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        }
    }

    pub fn into_string(self) -> Result<String, FacturaError> {
        let buf = self.writer.into_inner().into_inner();
        String::from_utf8(buf).map_err(|e| FacturaError::Xml(format!("XML UTF-8 error: {e}")))
    }

    pub fn start_element(&mut self, name: &str) -> Result<&mut Self, FacturaError> {
        self.writer
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn start_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, FacturaError> {
        let mut elem = BytesStart::new(name);
        for (k, v) in attrs {
            elem.push_attribute((*k, *v));
        }
        self.writer
            .write_event(Event::Start(elem))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn end_element(&mut self, name: &str) -> Result<&mut Self, FacturaError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self, FacturaError> {
        self.start_element(name)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    /// Write `name` only when `text` is present.
    pub fn optional_element(
        &mut self,
        name: &str,
        text: Option<&str>,
    ) -> Result<&mut Self, FacturaError> {
        if let Some(text) = text {
            self.text_element(name, text)?;
        }
        Ok(self)
    }

    /// Amount with exactly two decimals.
    pub fn amount_element(&mut self, name: &str, amount: Decimal) -> Result<&mut Self, FacturaError> {
        self.text_element(name, &format_amount(amount))
    }

    /// Insert pre-rendered markup verbatim (already escaped).
    pub fn raw(&mut self, markup: &str) -> Result<&mut Self, FacturaError> {
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(markup)))
            .map_err(xml_io)?;
        Ok(self)
    }
}

/// Format an amount with exactly two decimals, rounding half away from zero.
pub(crate) fn format_amount(d: Decimal) -> String {
    let mut rounded = d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

/// Format a unit price: at least two and at most six decimals.
pub(crate) fn format_price(d: Decimal) -> String {
    let s = d
        .round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string();
    match s.find('.') {
        Some(dot) if s.len() - dot - 1 >= 2 => s,
        Some(dot) => format!("{s}{}", "0".repeat(2 - (s.len() - dot - 1))),
        None => format!("{s}.00"),
    }
}

/// One step of a path-driven walk over an XML document.
///
/// Paths hold local names (namespace prefixes stripped) from the root down.
pub(crate) enum XmlEvent<'a> {
    Start(&'a [String]),
    Text(&'a [String], &'a str),
    /// Path of the parent and the local name of the element just closed.
    End(&'a [String], &'a str),
}

fn local_name(qname: &[u8]) -> String {
    let name = std::str::from_utf8(qname).unwrap_or("");
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.to_string(),
    }
}

/// Walk `xml`, handing every start, text and end event to `visit`.
pub(crate) fn walk(xml: &str, mut visit: impl FnMut(XmlEvent<'_>)) -> Result<(), FacturaError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                path.push(local_name(e.name().as_ref()));
                visit(XmlEvent::Start(&path));
            }
            Ok(Event::Empty(ref e)) => {
                let name = local_name(e.name().as_ref());
                path.push(name.clone());
                visit(XmlEvent::Start(&path));
                path.pop();
                visit(XmlEvent::End(&path, &name));
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| FacturaError::Xml(format!("XML parse error: {e}")))?;
                if !text.is_empty() {
                    visit(XmlEvent::Text(&path, &text));
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                if !text.is_empty() {
                    visit(XmlEvent::Text(&path, &text));
                }
            }
            Ok(Event::End(_)) => {
                let ended = path.pop().unwrap_or_default();
                visit(XmlEvent::End(&path, &ended));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FacturaError::Xml(format!(
                    "XML parse error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    if !path.is_empty() {
        return Err(FacturaError::Xml(format!(
            "unexpected end of document inside <{}>",
            path.join("/")
        )));
    }
    Ok(())
}

/// Text of the first element with local name `name`, anywhere in `xml`.
pub(crate) fn first_text(xml: &str, name: &str) -> Result<Option<String>, FacturaError> {
    let mut found = None;
    walk(xml, |event| {
        if let XmlEvent::Text(path, text) = event {
            if found.is_none() && path.last().is_some_and(|leaf| leaf == name) {
                found = Some(text.to_string());
            }
        }
    })?;
    Ok(found)
}

/// True if `xml` contains an element with local name `name`.
pub(crate) fn has_element(xml: &str, name: &str) -> bool {
    let mut found = false;
    let walked = walk(xml, |event| {
        if let XmlEvent::Start(path) = event {
            found |= path.last().is_some_and(|leaf| leaf == name);
        }
    });
    walked.is_ok() && found
}
