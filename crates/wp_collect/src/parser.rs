//! `getStatistics` payload parser
//!
//! The supervisor API answers with a SOAP envelope whose elements carry
//! arbitrary namespace prefixes. The payload is a column declaration
//! followed by positional rows:
//!
//! ```xml
//! <columns><values><data>Username</data><data>State</data></values></columns>
//! <rows><values><data>alice</data><data>Ready</data></values></rows>
//! ```
//!
//! Parsing happens in two passes: the document is read into an element
//! tree, then every tag is rewritten to its local name so matching never
//! depends on which prefix the service chose.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::{CollectError, StatRecord};

/// Element holding the column declaration
const COLUMNS: &str = "columns";
/// Element holding one data row
const ROWS: &str = "rows";
/// Positional value container inside `columns` and `rows`
const VALUES: &str = "values";
/// A single positional value
const DATA: &str = "data";

/// Parsed element: tag, leading text, children
#[derive(Debug, Clone, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..Self::default()
        }
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All descendants in document order, excluding `self`
    fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.children.iter().rev().collect();
        while let Some(el) = stack.pop() {
            out.push(el);
            stack.extend(el.children.iter().rev());
        }
        out
    }

    /// Text of each `data` child of this `values` container, in order
    fn data_values(&self) -> Vec<String> {
        self.children_named(DATA).map(|d| d.text.clone()).collect()
    }
}

/// Rewrite every tag in the tree to its local name (`ns2:rows` -> `rows`)
fn strip_namespaces(element: &mut Element) {
    if let Some((_, local)) = element.name.rsplit_once(':') {
        element.name = local.to_string();
    }
    for child in &mut element.children {
        strip_namespaces(child);
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), CollectError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_some() {
        Err(CollectError::ParseError("multiple root elements".to_string()))
    } else {
        *root = Some(element);
        Ok(())
    }
}

fn append_text(stack: &mut [Element], text: &str) -> Result<(), CollectError> {
    match stack.last_mut() {
        // Only text before the first child counts as the element's own text
        Some(top) if top.children.is_empty() => {
            top.text.push_str(text);
            Ok(())
        }
        Some(_) => Ok(()),
        None if text.trim().is_empty() => Ok(()),
        None => Err(CollectError::ParseError("text outside of the root element".to_string())),
    }
}

/// Read a document into an element tree with qualified tag names
fn read_tree(body: &str) -> Result<Element, CollectError> {
    let mut reader = Reader::from_str(body);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(Element::from_start(&start)),
            Ok(Event::Empty(start)) => {
                attach(&mut stack, &mut root, Element::from_start(&start))?;
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| {
                    CollectError::ParseError(format!("unmatched end tag at byte {position}"))
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| {
                    CollectError::ParseError(format!("bad text near byte {position}: {e}"))
                })?;
                append_text(&mut stack, &text)?;
            }
            Ok(Event::CData(cdata)) => {
                let raw = cdata.into_inner();
                append_text(&mut stack, &String::from_utf8_lossy(&raw))?;
            }
            Ok(Event::Eof) => break,
            // Declarations, comments, processing instructions, doctype
            Ok(_) => {}
            Err(e) => {
                return Err(CollectError::ParseError(format!(
                    "malformed XML near byte {position}: {e}"
                )));
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(CollectError::ParseError(format!(
            "unexpected end of document inside <{}>",
            open.name
        )));
    }

    root.ok_or_else(|| CollectError::ParseError("document has no root element".to_string()))
}

/// Parse a `getStatistics` response body into records, in row order.
///
/// A response without a column declaration is a [`CollectError::SchemaError`]
/// even when rows are present. Rows without a `values` container are skipped;
/// a row shorter than the declaration populates only the matching prefix.
///
/// # Errors
///
/// Returns [`CollectError::ParseError`] for malformed XML and
/// [`CollectError::SchemaError`] when no columns are declared.
pub fn parse_statistics(body: &str) -> Result<Vec<StatRecord>, CollectError> {
    let mut root = read_tree(body)?;
    strip_namespaces(&mut root);

    let descendants = root.descendants();

    let columns = descendants
        .iter()
        .filter(|el| el.name == COLUMNS)
        .find_map(|el| el.child(VALUES))
        .map(Element::data_values)
        .ok_or_else(|| CollectError::SchemaError("No columns found in response".to_string()))?;

    let records = descendants
        .iter()
        .filter(|el| el.name == ROWS)
        .filter_map(|row| row.child(VALUES))
        .map(|values| {
            columns
                .iter()
                .cloned()
                .zip(values.data_values())
                .collect::<StatRecord>()
        })
        .collect();

    Ok(records)
}
