//! Concatenate assembled documents behind a base document.
//!
//! The base document supplies the composite's styles and final section
//! properties. Each appended document contributes its body content; the
//! style definitions, images, and external links that content refers to
//! are copied over and re-identified so nothing collides. A style already
//! defined by the base keeps the base definition.

use super::assemble::{max_drawing_id, AssembledDocument};
use super::package::{DocxPackage, Relationships, REL_IMAGE, STYLES_PART};
use super::xml::{self, Events};
use super::DocxError;
use crate::error::BatchError;
use quick_xml::events::Event;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::debug;

/// Attributes that carry a relationship id of the document part.
const REL_ATTRS: [&[u8]; 3] = [b"r:embed", b"r:link", b"r:id"];

/// Elements that name a style by id.
const STYLE_REFS: [&[u8]; 3] = [b"w:pStyle", b"w:rStyle", b"w:tblStyle"];

/// Accumulates the composite document.
pub struct CompositeBuilder {
    package: DocxPackage,
    events: Events,
    rels: Relationships,
    styles: Events,
    next_drawing_id: u64,
}

impl CompositeBuilder {
    /// Start from the base document at `path`.
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        if !path.is_file() {
            return Err(BatchError::BaseDocumentMissing {
                path: path.to_path_buf(),
            });
        }
        let invalid = |source| BatchError::InvalidDocument {
            path: path.to_path_buf(),
            source,
        };
        let package = DocxPackage::open(path).map_err(invalid)?;
        Self::new(package).map_err(invalid)
    }

    pub fn new(mut base: DocxPackage) -> Result<Self, DocxError> {
        let events = base.document()?;
        xml::body_insert_point(&events)?;
        let rels = base.relationships()?;
        let styles = base.styles()?;
        if xml::find_element(&styles, b"w:styles").is_none() {
            return Err(DocxError::Xml("styles part has no w:styles".into()));
        }
        let next_drawing_id = max_drawing_id(&events) + 1;
        Ok(Self {
            package: base,
            events,
            rels,
            styles,
            next_drawing_id,
        })
    }

    /// Append `doc`'s body. On error the composite is left unchanged.
    pub fn append(&mut self, doc: &AssembledDocument) -> Result<(), DocxError> {
        let source = &doc.package;
        let source_events = source.document()?;
        let mut content = body_content(&source_events)?;

        // ── relationships and the parts behind them ──
        let source_rels = source.relationships()?;
        let mut rels = self.rels.clone();
        let mut new_parts: Vec<(String, Vec<u8>)> = Vec::new();
        let mut remap: HashMap<String, String> = HashMap::new();
        for i in 0..content.len() {
            let Some(tag) = xml::start_tag(&content[i]) else {
                continue;
            };
            let mut updated = None;
            for key in REL_ATTRS {
                let Some(old_id) = xml::attr(updated.as_ref().unwrap_or(tag), key) else {
                    continue;
                };
                let new_id = match remap.get(&old_id) {
                    Some(id) => id.clone(),
                    None => {
                        let id = self.carry_relationship(
                            source,
                            &source_rels,
                            &old_id,
                            &mut rels,
                            &mut new_parts,
                        )?;
                        remap.insert(old_id, id.clone());
                        id
                    }
                };
                let key = String::from_utf8_lossy(key).into_owned();
                updated = Some(xml::with_attr(updated.as_ref().unwrap_or(tag), &key, &new_id));
            }
            if let Some(tag) = updated {
                xml::replace_tag(&mut content, i, tag);
            }
        }

        // ── styles ──
        let copied_styles = self.missing_styles(source, &content)?;

        // ── drawing ids ──
        let mut next_drawing_id = self.next_drawing_id;
        for i in 0..content.len() {
            let renumbered = match xml::start_tag(&content[i]) {
                Some(tag) if tag.name().as_ref() == b"wp:docPr" => {
                    let tag = xml::with_attr(tag, "id", &next_drawing_id.to_string());
                    next_drawing_id += 1;
                    tag
                }
                _ => continue,
            };
            xml::replace_tag(&mut content, i, renumbered);
        }

        // ── commit ──
        for (name, _) in &new_parts {
            if let Some(ext) = name.rsplit_once('.').map(|(_, ext)| ext) {
                self.package
                    .ensure_default_content_type(ext, image_content_type(ext))?;
            }
        }
        for (name, data) in new_parts {
            self.package.set_part(name, data);
        }
        self.rels = rels;
        self.next_drawing_id = next_drawing_id;

        if !copied_styles.is_empty() {
            let root = xml::find_element(&self.styles, b"w:styles")
                .ok_or_else(|| DocxError::Xml("styles part has no w:styles".into()))?;
            let at = *root.end();
            self.styles.splice(at..at, copied_styles);
        }

        merge_root_namespaces(&mut self.events, &source_events);
        let at = xml::body_insert_point(&self.events)?;
        self.events.splice(at..at, content);

        debug!(
            "Appended '{}' ({} relationships carried)",
            doc.identifier,
            remap.len()
        );
        Ok(())
    }

    /// Serialise the accumulated parts into the finished package.
    pub fn finish(mut self) -> Result<DocxPackage, DocxError> {
        self.package.set_document(&self.events)?;
        self.package.set_relationships(&self.rels)?;
        self.package.set_styles(&self.styles)?;
        Ok(self.package)
    }

    /// Register `old_id`'s target in `rels`, staging any part it needs.
    fn carry_relationship(
        &self,
        source: &DocxPackage,
        source_rels: &Relationships,
        old_id: &str,
        rels: &mut Relationships,
        new_parts: &mut Vec<(String, Vec<u8>)>,
    ) -> Result<String, DocxError> {
        let rel = source_rels
            .get(old_id)
            .ok_or_else(|| DocxError::MissingRelationship {
                id: old_id.to_string(),
            })?;

        if rel.external {
            return Ok(rels.add(&rel.rel_type, &rel.target, true));
        }
        if rel.rel_type != REL_IMAGE {
            return Err(DocxError::UnsupportedRelationship {
                id: rel.id.clone(),
                rel_type: rel.rel_type.clone(),
            });
        }

        let source_part = resolve_target(&rel.target);
        let data = source.require(&source_part)?.to_vec();
        let ext = source_part
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string());

        let mut n = 1usize;
        let part = loop {
            let candidate = format!("word/media/image{n}.{ext}");
            if !self.package.contains(&candidate) && !new_parts.iter().any(|(p, _)| *p == candidate) {
                break candidate;
            }
            n += 1;
        };
        let id = rels.add(REL_IMAGE, part.trim_start_matches("word/"), false);
        new_parts.push((part, data));
        Ok(id)
    }

    /// Definitions of every style `content` uses that the composite lacks,
    /// together with the styles they are based on.
    fn missing_styles(&self, source: &DocxPackage, content: &[Event<'static>]) -> Result<Events, DocxError> {
        let defined: HashSet<String> = style_definitions(&self.styles)
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let mut queue: Vec<String> = referenced_styles(content)
            .into_iter()
            .filter(|id| !defined.contains(id))
            .collect();
        if queue.is_empty() {
            return Ok(Vec::new());
        }

        let source_styles = match source.part(STYLES_PART) {
            Some(bytes) => xml::parse(bytes)?,
            None => Vec::new(),
        };
        let available: HashMap<String, RangeInclusive<usize>> =
            style_definitions(&source_styles).into_iter().collect();

        let mut copied = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        while let Some(id) = queue.pop() {
            if defined.contains(&id) || !seen.insert(id.clone()) {
                continue;
            }
            let range = available
                .get(&id)
                .cloned()
                .ok_or_else(|| DocxError::MissingStyle { style_id: id.clone() })?;
            let definition = &source_styles[range];
            if let Some(parent) = definition
                .iter()
                .filter_map(xml::start_tag)
                .find(|e| e.name().as_ref() == b"w:basedOn")
                .and_then(|e| xml::attr(e, b"w:val"))
            {
                queue.push(parent);
            }
            copied.extend(definition.iter().cloned());
        }
        Ok(copied)
    }
}

/// Body children of `events` minus the final section properties, with
/// header and footer references dropped.
fn body_content(events: &[Event<'static>]) -> Result<Events, DocxError> {
    let body = xml::body(events)?;
    let section = xml::body_section(events, &body);
    let mut content = Vec::new();
    for child in xml::children(events, &body) {
        if section.as_ref() == Some(&child) {
            continue;
        }
        content.extend(events[child].iter().cloned());
    }

    let mut i = 0;
    while i < content.len() {
        let is_reference = xml::is_element(&content[i], b"w:headerReference")
            || xml::is_element(&content[i], b"w:footerReference");
        if is_reference {
            let end = xml::matching_end(&content, i)
                .ok_or_else(|| DocxError::Xml("unterminated reference".into()))?;
            content.drain(i..=end);
        } else {
            i += 1;
        }
    }
    Ok(content)
}

/// Declare on the composite's `w:document` every `xmlns:*` prefix the
/// source document declares and the composite lacks.
fn merge_root_namespaces(events: &mut Events, source: &[Event<'static>]) {
    let root = |evs: &[Event<'static>]| evs.iter().position(|ev| xml::is_element(ev, b"w:document"));
    let (Some(target), Some(from)) = (root(events.as_slice()), root(source)) else {
        return;
    };
    let Some(source_root) = xml::start_tag(&source[from]) else {
        return;
    };
    let declared: Vec<(String, String)> = source_root
        .attributes()
        .flatten()
        .filter(|a| a.key.as_ref().starts_with(b"xmlns:"))
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                String::from_utf8_lossy(&a.value).into_owned(),
            )
        })
        .collect();
    for (key, value) in declared {
        let Some(tag) = xml::start_tag(&events[target]) else {
            return;
        };
        if xml::attr(tag, key.as_bytes()).is_none() {
            let updated = xml::with_attr(tag, &key, &value);
            xml::replace_tag(events, target, updated);
        }
    }
}

/// Style ids used by `events`, first use first.
fn referenced_styles(events: &[Event<'static>]) -> Vec<String> {
    let mut seen = HashSet::new();
    events
        .iter()
        .filter_map(xml::start_tag)
        .filter(|e| STYLE_REFS.iter().any(|name| *name == e.name().as_ref()))
        .filter_map(|e| xml::attr(e, b"w:val"))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// `(styleId, range)` of every `w:style` in a styles part.
fn style_definitions(events: &[Event<'static>]) -> Vec<(String, RangeInclusive<usize>)> {
    let Some(root) = xml::find_element(events, b"w:styles") else {
        return Vec::new();
    };
    xml::children(events, &root)
        .into_iter()
        .filter_map(|range| {
            let tag = xml::start_tag(&events[*range.start()])?;
            if tag.name().as_ref() != b"w:style" {
                return None;
            }
            Some((xml::attr(tag, b"w:styleId")?, range))
        })
        .collect()
}

/// Part name for a relationship target of `word/document.xml`.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("word/{target}"),
    }
}

fn image_content_type(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "emf" => "image/x-emf",
        "wmf" => "image/x-wmf",
        _ => "application/octet-stream",
    }
}
