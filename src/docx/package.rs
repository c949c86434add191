//! The `.docx` zip container: parts, relationships, and content types.

use super::xml::{self, Events};
use super::DocxError;
use quick_xml::events::Event;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const DOCUMENT_PART: &str = "word/document.xml";
pub const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
pub const STYLES_PART: &str = "word/styles.xml";

pub const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const STYLES_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";

/// An in-memory Word package. Part order is preserved on write.
#[derive(Debug, Clone)]
pub struct DocxPackage {
    parts: Vec<(String, Vec<u8>)>,
}

impl DocxPackage {
    pub fn open(path: &Path) -> Result<Self, DocxError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocxError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.push((name, data));
        }

        let package = Self { parts };
        for required in [CONTENT_TYPES_PART, DOCUMENT_PART] {
            if !package.contains(required) {
                return Err(DocxError::MissingPart(required.to_string()));
            }
        }
        Ok(package)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.iter().any(|(n, _)| n == name)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    pub fn require(&self, name: &str) -> Result<&[u8], DocxError> {
        self.part(name)
            .ok_or_else(|| DocxError::MissingPart(name.to_string()))
    }

    /// Insert or replace a part.
    pub fn set_part(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        match self.parts.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = data,
            None => self.parts.push((name, data)),
        }
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }

    /// First `{dir}/{stem}{n}.{ext}` not yet present, counting from 1.
    pub fn unique_part_name(&self, dir: &str, stem: &str, ext: &str) -> String {
        let mut n = 1usize;
        loop {
            let candidate = format!("{dir}/{stem}{n}.{ext}");
            if !self.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DocxError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    // ── Typed part access ────────────────────────────────────────────────

    pub fn document(&self) -> Result<Events, DocxError> {
        xml::parse(self.require(DOCUMENT_PART)?)
    }

    pub fn set_document(&mut self, events: &[Event<'static>]) -> Result<(), DocxError> {
        let bytes = xml::serialize(events)?;
        self.set_part(DOCUMENT_PART, bytes);
        Ok(())
    }

    /// Relationships of the main document part; empty when it has none.
    pub fn relationships(&self) -> Result<Relationships, DocxError> {
        match self.part(DOCUMENT_RELS_PART) {
            Some(bytes) => Relationships::parse(bytes),
            None => Ok(Relationships::default()),
        }
    }

    pub fn set_relationships(&mut self, rels: &Relationships) -> Result<(), DocxError> {
        let bytes = rels.to_xml()?;
        self.set_part(DOCUMENT_RELS_PART, bytes);
        Ok(())
    }

    /// Style definitions, creating an empty styles part when absent.
    pub fn styles(&mut self) -> Result<Events, DocxError> {
        if !self.contains(STYLES_PART) {
            let empty = concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                "\n",
                r#"<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"></w:styles>"#
            );
            self.set_part(STYLES_PART, empty.as_bytes().to_vec());
            self.ensure_override("/word/styles.xml", STYLES_CONTENT_TYPE)?;
            let mut rels = self.relationships()?;
            if !rels.iter().any(|r| r.rel_type == REL_STYLES) {
                rels.add(REL_STYLES, "styles.xml", false);
                self.set_relationships(&rels)?;
            }
        }
        xml::parse(self.require(STYLES_PART)?)
    }

    pub fn set_styles(&mut self, events: &[Event<'static>]) -> Result<(), DocxError> {
        let bytes = xml::serialize(events)?;
        self.set_part(STYLES_PART, bytes);
        Ok(())
    }

    /// Register a default content type for files ending in `.{ext}`.
    pub fn ensure_default_content_type(&mut self, ext: &str, content_type: &str) -> Result<(), DocxError> {
        self.ensure_content_type(
            b"Default",
            b"Extension",
            ext,
            &[("Extension", ext), ("ContentType", content_type)],
        )
    }

    fn ensure_override(&mut self, part_name: &str, content_type: &str) -> Result<(), DocxError> {
        self.ensure_content_type(
            b"Override",
            b"PartName",
            part_name,
            &[("PartName", part_name), ("ContentType", content_type)],
        )
    }

    fn ensure_content_type(
        &mut self,
        element: &[u8],
        key: &[u8],
        value: &str,
        attrs: &[(&str, &str)],
    ) -> Result<(), DocxError> {
        let mut events = xml::parse(self.require(CONTENT_TYPES_PART)?)?;
        let present = events.iter().filter_map(xml::start_tag).any(|e| {
            e.name().as_ref() == element
                && xml::attr(e, key).is_some_and(|v| v.eq_ignore_ascii_case(value))
        });
        if present {
            return Ok(());
        }
        let types_end = events
            .iter()
            .rposition(|ev| xml::is_end(ev, b"Types"))
            .ok_or_else(|| DocxError::Xml("content types have no closing </Types>".into()))?;
        let name = String::from_utf8_lossy(element).into_owned();
        events.insert(types_end, xml::empty(&name, attrs));
        let bytes = xml::serialize(&events)?;
        self.set_part(CONTENT_TYPES_PART, bytes);
        Ok(())
    }
}

// ── Relationships ────────────────────────────────────────────────────────

/// One entry of a `.rels` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Relationships {
    entries: Vec<Relationship>,
}

impl Relationships {
    pub fn parse(bytes: &[u8]) -> Result<Self, DocxError> {
        let events = xml::parse(bytes)?;
        let entries = events
            .iter()
            .filter_map(xml::start_tag)
            .filter(|e| e.name().as_ref() == b"Relationship")
            .map(|e| Relationship {
                id: xml::attr(e, b"Id").unwrap_or_default(),
                rel_type: xml::attr(e, b"Type").unwrap_or_default(),
                target: xml::attr(e, b"Target").unwrap_or_default(),
                external: xml::attr(e, b"TargetMode").as_deref() == Some("External"),
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.entries.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a relationship under a fresh `rIdN` and return the id.
    pub fn add(&mut self, rel_type: &str, target: &str, external: bool) -> String {
        let highest = self
            .entries
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        let mut n = highest + 1;
        let mut id = format!("rId{n}");
        while self.get(&id).is_some() {
            n += 1;
            id = format!("rId{n}");
        }
        self.entries.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external,
        });
        id
    }

    pub fn to_xml(&self) -> Result<Vec<u8>, DocxError> {
        let mut events = vec![
            Event::Decl(quick_xml::events::BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))),
            xml::start("Relationships", &[("xmlns", RELS_NS)]),
        ];
        for r in &self.entries {
            let mut attrs = vec![
                ("Id", r.id.as_str()),
                ("Type", r.rel_type.as_str()),
                ("Target", r.target.as_str()),
            ];
            if r.external {
                attrs.push(("TargetMode", "External"));
            }
            events.push(xml::empty("Relationship", &attrs));
        }
        events.push(xml::end("Relationships"));
        xml::serialize(&events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/?a=1&amp;b=2" TargetMode="External"/></Relationships>"#;

    #[test]
    fn relationships_parse_and_extend() {
        let mut rels = Relationships::parse(RELS.as_bytes()).unwrap();
        assert_eq!(rels.len(), 2);
        let link = rels.get("rId7").unwrap();
        assert!(link.external);
        assert_eq!(link.target, "https://example.com/?a=1&b=2");

        let id = rels.add(REL_IMAGE, "media/image1.png", false);
        assert_eq!(id, "rId8");

        let reparsed = Relationships::parse(&rels.to_xml().unwrap()).unwrap();
        assert_eq!(reparsed.len(), 3);
        assert_eq!(reparsed.get("rId7").unwrap().target, "https://example.com/?a=1&b=2");
        assert_eq!(reparsed.get("rId8").unwrap().rel_type, REL_IMAGE);
    }

    fn minimal_package() -> DocxPackage {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file(CONTENT_TYPES_PART, options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#,
        )
        .unwrap();
        zip.start_file(DOCUMENT_PART, options).unwrap();
        zip.write_all(br#"<w:document xmlns:w="w"><w:body/></w:document>"#)
            .unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        DocxPackage::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn missing_document_part_rejected() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(CONTENT_TYPES_PART, SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<Types/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let err = DocxPackage::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, DocxError::MissingPart(p) if p == DOCUMENT_PART));
    }

    #[test]
    fn not_a_zip_rejected() {
        assert!(matches!(
            DocxPackage::from_bytes(b"plain text"),
            Err(DocxError::Zip(_))
        ));
    }

    #[test]
    fn content_type_added_once() {
        let mut pkg = minimal_package();
        pkg.ensure_default_content_type("png", "image/png").unwrap();
        pkg.ensure_default_content_type("PNG", "image/png").unwrap();
        let types = String::from_utf8(pkg.part(CONTENT_TYPES_PART).unwrap().to_vec()).unwrap();
        assert_eq!(types.matches("Extension=\"png\"").count(), 1);
    }

    #[test]
    fn styles_part_created_on_demand() {
        let mut pkg = minimal_package();
        let styles = pkg.styles().unwrap();
        assert!(xml::find_element(&styles, b"w:styles").is_some());
        assert!(pkg.contains(STYLES_PART));
        let rels = pkg.relationships().unwrap();
        assert!(rels.iter().any(|r| r.rel_type == REL_STYLES));
    }

    #[test]
    fn package_roundtrips_through_zip() {
        let mut pkg = minimal_package();
        let name = pkg.unique_part_name("word/media", "image", "png");
        assert_eq!(name, "word/media/image1.png");
        pkg.set_part(name, vec![1, 2, 3]);
        assert_eq!(
            pkg.unique_part_name("word/media", "image", "png"),
            "word/media/image2.png"
        );

        let again = DocxPackage::from_bytes(&pkg.to_bytes().unwrap()).unwrap();
        assert_eq!(again.part("word/media/image1.png"), Some(&[1u8, 2, 3][..]));
        assert_eq!(again.part_names().count(), 3);
    }
}
