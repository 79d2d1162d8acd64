//! In-memory view of a `.config` file.
//!
//! The document keeps the original text and only ever rewrites the byte range
//! of the `assemblyBinding` element, so declarations, comments, line endings
//! and every other section survive a merge untouched.

use crate::error::{DoctorError, Result};
use crate::version::AssemblyVersion;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::ops::Range;

/// Namespace the runtime expects on `<assemblyBinding>`.
pub const ASM_V1_NAMESPACE: &str = "urn:schemas-microsoft-com:asm.v1";

const ASSEMBLY_BINDING: &[u8] = b"assemblyBinding";
const DEPENDENT_ASSEMBLY: &[u8] = b"dependentAssembly";
const ASSEMBLY_IDENTITY: &[u8] = b"assemblyIdentity";
const BINDING_REDIRECT: &[u8] = b"bindingRedirect";

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    /// Text after the byte-order mark, if there was one.
    source: String,
    bom: bool,
}

/// One `<dependentAssembly>` child of the binding section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentAssemblyEntry {
    /// `assemblyIdentity/@name`, the dedup key.
    pub name: String,
    /// `bindingRedirect/@newVersion`.
    pub new_version: AssemblyVersion,
    /// The element exactly as it was written.
    pub markup: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionChild {
    Entry(DependentAssemblyEntry),
    /// Any other element (`probing`, `qualifyAssembly`, ...), kept verbatim.
    Other(String),
}

/// The located `<assemblyBinding>` element, split into the pieces needed to
/// write it back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyBindingSection {
    /// Byte range of the whole element in the document.
    pub span: Range<usize>,
    /// Opening tag as written. For a self-closing section this is the whole element.
    pub open_tag: String,
    /// Closing tag as written; `None` for `<assemblyBinding/>`.
    pub close_tag: Option<String>,
    /// Whitespace that preceded the first child element.
    pub leading: String,
    /// Whitespace immediately before the closing tag.
    pub trailing: String,
    pub children: Vec<SectionChild>,
}

impl AssemblyBindingSection {
    pub fn entry_count(&self) -> usize {
        self.children
            .iter()
            .filter(|c| matches!(c, SectionChild::Entry(_)))
            .count()
    }

    /// Render a replacement element with the given children markup, reusing
    /// this section's tags and indentation.
    pub fn render<'a>(&self, children: impl IntoIterator<Item = &'a str>) -> String {
        let Some(close_tag) = &self.close_tag else {
            // Only reachable for `<assemblyBinding/>`, which has no children to emit.
            return self.open_tag.clone();
        };

        let mut out = self.open_tag.clone();
        for child in children {
            out.push_str(&self.leading);
            out.push_str(child);
        }
        out.push_str(&self.trailing);
        out.push_str(close_tag);
        out
    }
}

impl ConfigDocument {
    /// Parse and validate an XML document. A leading byte-order mark is
    /// set aside and restored by [`ConfigDocument::to_text`].
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let mut source = source.into();
        let bom = source.starts_with(BOM);
        if bom {
            source.drain(..BOM.len_utf8());
        }
        let mut reader = Reader::from_str(&source);
        let mut depth = 0usize;
        let mut saw_element = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(_)) => {
                    depth += 1;
                    saw_element = true;
                }
                Ok(Event::End(_)) => depth = depth.saturating_sub(1),
                Ok(Event::Empty(_)) => saw_element = true,
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(DoctorError::malformed(format!(
                        "XML error at byte {}: {e}",
                        reader.error_position()
                    )))
                }
            }
        }

        if depth != 0 {
            return Err(DoctorError::malformed(format!(
                "unexpected end of document, {depth} element(s) left open"
            )));
        }
        if !saw_element {
            return Err(DoctorError::malformed("document has no root element"));
        }

        Ok(Self { source, bom })
    }

    /// Document text without the byte-order mark.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Full file contents, byte-order mark included.
    pub fn to_text(&self) -> String {
        if self.bom {
            let mut text = String::with_capacity(self.source.len() + BOM.len_utf8());
            text.push(BOM);
            text.push_str(&self.source);
            text
        } else {
            self.source.clone()
        }
    }

    /// Replace a byte range of the document. The new text takes the old
    /// text's place among its siblings.
    pub fn replace_range(&mut self, span: Range<usize>, replacement: &str) {
        self.source.replace_range(span, replacement);
    }

    /// Find the first `assemblyBinding` element in document order.
    pub fn binding_section(&self) -> Result<AssemblyBindingSection> {
        let mut reader = Reader::from_str(&self.source);

        loop {
            let start = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(xml_error)?;
            let end = reader.buffer_position() as usize;

            match event {
                Event::Start(e) if e.local_name().as_ref() == ASSEMBLY_BINDING => {
                    return self.read_section(&mut reader, start, end);
                }
                Event::Empty(e) if e.local_name().as_ref() == ASSEMBLY_BINDING => {
                    return Ok(AssemblyBindingSection {
                        span: start..end,
                        open_tag: self.source[start..end].to_string(),
                        close_tag: None,
                        leading: String::new(),
                        trailing: String::new(),
                        children: Vec::new(),
                    });
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Err(DoctorError::malformed("no assemblyBinding section found"))
    }

    fn read_section(
        &self,
        reader: &mut Reader<&[u8]>,
        section_start: usize,
        open_end: usize,
    ) -> Result<AssemblyBindingSection> {
        let mut depth = 0usize;
        let mut child_start = 0usize;
        let mut children = Vec::new();
        let mut leading: Option<String> = None;
        let mut last_ws: Option<String> = None;
        let mut trailing = String::new();

        loop {
            let start = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(xml_error)?;
            let end = reader.buffer_position() as usize;

            match event {
                Event::Start(_) => {
                    if depth == 0 {
                        child_start = start;
                        if leading.is_none() {
                            leading = Some(last_ws.take().unwrap_or_default());
                        }
                    }
                    depth += 1;
                    trailing.clear();
                }
                Event::Empty(_) if depth == 0 => {
                    if leading.is_none() {
                        leading = Some(last_ws.take().unwrap_or_default());
                    }
                    children.push(self.read_child(start..end, children.len())?);
                    trailing.clear();
                }
                Event::End(_) if depth == 0 => {
                    return Ok(AssemblyBindingSection {
                        span: section_start..end,
                        open_tag: self.source[section_start..open_end].to_string(),
                        close_tag: Some(self.source[start..end].to_string()),
                        leading: leading.unwrap_or_default(),
                        trailing,
                        children,
                    });
                }
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        children.push(self.read_child(child_start..end, children.len())?);
                    }
                    trailing.clear();
                }
                Event::Text(_) if depth == 0 => {
                    let text = &self.source[start..end];
                    if text.trim().is_empty() {
                        trailing = text.to_string();
                        if leading.is_none() {
                            last_ws = Some(text.to_string());
                        }
                    } else {
                        trailing.clear();
                    }
                }
                Event::Eof => {
                    return Err(DoctorError::malformed(
                        "assemblyBinding section is not closed",
                    ))
                }
                _ => {
                    if depth == 0 {
                        trailing.clear();
                    }
                }
            }
        }
    }

    fn read_child(&self, span: Range<usize>, index: usize) -> Result<SectionChild> {
        let markup = &self.source[span];
        let mut reader = Reader::from_str(markup);

        let first = reader.read_event().map_err(xml_error)?;
        let is_entry = match &first {
            Event::Start(e) | Event::Empty(e) => e.local_name().as_ref() == DEPENDENT_ASSEMBLY,
            _ => false,
        };
        if !is_entry {
            return Ok(SectionChild::Other(markup.to_string()));
        }

        let mut name = None;
        let mut new_version = None;

        if matches!(first, Event::Start(_)) {
            let mut depth = 1usize;
            loop {
                match reader.read_event().map_err(xml_error)? {
                    Event::Start(e) => {
                        if depth == 1 {
                            inspect_entry_child(&e, &mut name, &mut new_version)?;
                        }
                        depth += 1;
                    }
                    Event::Empty(e) if depth == 1 => {
                        inspect_entry_child(&e, &mut name, &mut new_version)?;
                    }
                    Event::End(_) => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    Event::Eof => break,
                    _ => {}
                }
            }
        }

        let name = name.filter(|n| !n.trim().is_empty()).ok_or_else(|| {
            DoctorError::malformed(format!(
                "dependentAssembly #{} is missing assemblyIdentity/@name",
                index + 1
            ))
        })?;
        let new_version = new_version.ok_or_else(|| {
            DoctorError::malformed(format!(
                "dependentAssembly '{name}' is missing bindingRedirect/@newVersion"
            ))
        })?;

        Ok(SectionChild::Entry(DependentAssemblyEntry {
            new_version: new_version.parse()?,
            name,
            markup: markup.to_string(),
        }))
    }
}

/// Pick up the dedup key and target version from a direct child of
/// `<dependentAssembly>`. Only the first of each element counts.
fn inspect_entry_child(
    element: &BytesStart<'_>,
    name: &mut Option<String>,
    new_version: &mut Option<String>,
) -> Result<()> {
    match element.local_name().as_ref() {
        ASSEMBLY_IDENTITY if name.is_none() => {
            *name = attribute(element, "name")?;
        }
        BINDING_REDIRECT if new_version.is_none() => {
            *new_version = attribute(element, "newVersion")?;
        }
        _ => {}
    }
    Ok(())
}

fn attribute(element: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    let element_name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
    let attr = element.try_get_attribute(key).map_err(|e| {
        DoctorError::malformed(format!("invalid attributes on <{element_name}>: {e}"))
    })?;

    match attr {
        Some(attr) => {
            let value = attr.unescape_value().map_err(|e| {
                DoctorError::malformed(format!("invalid {key} on <{element_name}>: {e}"))
            })?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

fn xml_error(e: quick_xml::Error) -> DoctorError {
    DoctorError::malformed(format!("XML error: {e}"))
}
