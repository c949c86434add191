//! XML parts as flat event lists.
//!
//! A part is parsed into owned `quick_xml` events and written back with the
//! same writer, so whitespace, comments and unknown markup survive an edit
//! untouched. Elements are addressed by index: a `Start` event and its
//! matching `End`, or a single `Empty` event.
//!
//! Names are compared fully qualified (`w:p`, `wp:docPr`). Word always uses
//! the conventional prefixes for the elements handled here.

use super::DocxError;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::ops::RangeInclusive;

pub type Events = Vec<Event<'static>>;

/// Parse a complete XML part.
pub fn parse(bytes: &[u8]) -> Result<Events, DocxError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut events = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            ev => events.push(ev.into_owned()),
        }
        buf.clear();
    }
    Ok(events)
}

/// Write events back to bytes.
pub fn serialize(events: &[Event<'static>]) -> Result<Vec<u8>, DocxError> {
    let mut writer = Writer::new(Vec::new());
    for ev in events {
        writer.write_event(ev)?;
    }
    Ok(writer.into_inner())
}

// ── Element navigation ───────────────────────────────────────────────────

/// The start tag of `ev` when it opens an element (`Start` or `Empty`).
pub fn start_tag<'a>(ev: &'a Event<'static>) -> Option<&'a BytesStart<'static>> {
    match ev {
        Event::Start(e) | Event::Empty(e) => Some(e),
        _ => None,
    }
}

/// Whether `ev` opens an element named `name`.
pub fn is_element(ev: &Event<'static>, name: &[u8]) -> bool {
    start_tag(ev).is_some_and(|e| e.name().as_ref() == name)
}

/// Whether `ev` closes an element named `name`.
pub fn is_end(ev: &Event<'static>, name: &[u8]) -> bool {
    matches!(ev, Event::End(e) if e.name().as_ref() == name)
}

/// Index of the event closing the element opened at `start`.
pub fn matching_end(events: &[Event<'static>], start: usize) -> Option<usize> {
    match events.get(start)? {
        Event::Empty(_) => Some(start),
        Event::Start(_) => {
            let mut depth = 0usize;
            for (i, ev) in events.iter().enumerate().skip(start) {
                match ev {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(i);
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

/// First element named `name` anywhere in `events`, as an inclusive range.
pub fn find_element(events: &[Event<'static>], name: &[u8]) -> Option<RangeInclusive<usize>> {
    let start = events.iter().position(|ev| is_element(ev, name))?;
    let end = matching_end(events, start)?;
    Some(start..=end)
}

/// Direct child elements of the element spanning `parent`.
pub fn children(events: &[Event<'static>], parent: &RangeInclusive<usize>) -> Vec<RangeInclusive<usize>> {
    let mut out = Vec::new();
    if parent.start() == parent.end() {
        return out;
    }
    let mut i = parent.start() + 1;
    while i < *parent.end() {
        match &events[i] {
            Event::Start(_) => match matching_end(events, i) {
                Some(end) => {
                    out.push(i..=end);
                    i = end + 1;
                }
                None => break,
            },
            Event::Empty(_) => {
                out.push(i..=i);
                i += 1;
            }
            _ => i += 1,
        }
    }
    out
}

/// Range of `w:body`.
pub fn body(events: &[Event<'static>]) -> Result<RangeInclusive<usize>, DocxError> {
    find_element(events, b"w:body").ok_or_else(|| DocxError::Xml("document has no w:body".into()))
}

/// The body-level `w:sectPr` holding the final section properties, if any.
pub fn body_section(events: &[Event<'static>], body: &RangeInclusive<usize>) -> Option<RangeInclusive<usize>> {
    children(events, body)
        .into_iter()
        .last()
        .filter(|r| is_element(&events[*r.start()], b"w:sectPr"))
}

/// Where new body content goes: before the final section properties, or
/// before `</w:body>` when there are none.
pub fn body_insert_point(events: &[Event<'static>]) -> Result<usize, DocxError> {
    let body = body(events)?;
    if body.start() == body.end() {
        return Err(DocxError::Xml("document body is an empty element".into()));
    }
    Ok(match body_section(events, &body) {
        Some(sect) => *sect.start(),
        None => *body.end(),
    })
}

/// Concatenated text of every `w:t` inside `range`.
pub fn text_content(events: &[Event<'static>], range: RangeInclusive<usize>) -> Result<String, DocxError> {
    let mut out = String::new();
    let mut in_text = false;
    for ev in &events[range] {
        match ev {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) if e.name().as_ref() == b"w:t" => in_text = false,
            Event::Text(t) if in_text => out.push_str(&t.unescape()?),
            _ => {}
        }
    }
    Ok(out)
}

// ── Attributes ───────────────────────────────────────────────────────────

/// Value of attribute `key` on `e`, unescaped.
pub fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Copy of `e` with attribute `key` set to `value`, in place if present.
pub fn with_attr(e: &BytesStart<'_>, key: &str, value: &str) -> BytesStart<'static> {
    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    let mut replaced = false;
    for a in e.attributes().flatten() {
        if a.key.as_ref() == key.as_bytes() {
            out.push_attribute((key, value));
            replaced = true;
        } else {
            out.push_attribute(a);
        }
    }
    if !replaced {
        out.push_attribute((key, value));
    }
    out
}

/// Copy of `e` without the attributes named in `keys`.
pub fn without_attrs(e: &BytesStart<'_>, keys: &[&[u8]]) -> BytesStart<'static> {
    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for a in e.attributes().flatten() {
        if !keys.iter().any(|k| *k == a.key.as_ref()) {
            out.push_attribute(a);
        }
    }
    out
}

/// Replace the start tag at `index`, keeping its `Start`/`Empty` kind.
pub fn replace_tag(events: &mut [Event<'static>], index: usize, tag: BytesStart<'static>) {
    events[index] = match events[index] {
        Event::Empty(_) => Event::Empty(tag),
        _ => Event::Start(tag),
    };
}

// ── Builders ─────────────────────────────────────────────────────────────

/// `<name k="v" …/>`
pub fn empty(name: &str, attrs: &[(&str, &str)]) -> Event<'static> {
    let mut e = BytesStart::new(name.to_string());
    for &(k, v) in attrs {
        e.push_attribute((k, v));
    }
    Event::Empty(e)
}

/// `<name k="v" …>`
pub fn start(name: &str, attrs: &[(&str, &str)]) -> Event<'static> {
    let mut e = BytesStart::new(name.to_string());
    for &(k, v) in attrs {
        e.push_attribute((k, v));
    }
    Event::Start(e)
}

/// `</name>`
pub fn end(name: &str) -> Event<'static> {
    Event::End(BytesEnd::new(name.to_string()))
}

/// Escaped character data.
pub fn text(content: &str) -> Event<'static> {
    Event::Text(BytesText::new(content).into_owned())
}
