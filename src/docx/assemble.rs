//! Fill the report template for one source PDF.
//!
//! For each report the template is copied, its section is forced to the
//! output page size, every table-cell paragraph containing the placeholder
//! is retitled with the report identifier in the title style, and the
//! report's fragments are appended as inline pictures in one paragraph.

use super::package::{DocxPackage, REL_IMAGE};
use super::xml::{self, Events};
use super::DocxError;
use crate::config::ConversionConfig;
use crate::error::BatchError;
use crate::pipeline::layout::FragmentLayout;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use std::path::Path;
use tracing::{debug, warn};

const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";

/// The per-report template, loaded once per batch.
#[derive(Debug, Clone)]
pub struct ReportTemplate {
    package: DocxPackage,
}

impl ReportTemplate {
    /// Load and sanity-check the template at `path`.
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        if !path.is_file() {
            return Err(BatchError::TemplateMissing {
                path: path.to_path_buf(),
            });
        }
        let invalid = |source| BatchError::InvalidDocument {
            path: path.to_path_buf(),
            source,
        };
        let package = DocxPackage::open(path).map_err(invalid)?;
        let events = package.document().map_err(invalid)?;
        xml::body_insert_point(&events).map_err(invalid)?;
        Ok(Self { package })
    }

    pub fn from_package(package: DocxPackage) -> Self {
        Self { package }
    }
}

/// One encoded fragment with its allocated display size.
#[derive(Debug, Clone)]
pub struct FragmentImage {
    pub page_num: usize,
    pub png: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
    pub layout: FragmentLayout,
}

impl FragmentImage {
    /// Embedded extent `(cx, cy)` in EMU: the allocated width, with the
    /// height following the image's own aspect ratio.
    pub fn extent_emu(&self) -> (u64, u64) {
        let cx = self.layout.width_emu;
        let cy = (cx as f64 * self.height_px as f64 / self.width_px.max(1) as f64).round() as u64;
        (cx, cy.max(1))
    }
}

/// A template filled in for one report.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub identifier: String,
    pub package: DocxPackage,
    /// Whether a placeholder paragraph was found and retitled.
    pub title_found: bool,
    pub images: usize,
}

/// Build the document for `identifier` from `template`.
pub fn assemble(
    template: &ReportTemplate,
    identifier: &str,
    images: &[FragmentImage],
    config: &ConversionConfig,
) -> Result<AssembledDocument, DocxError> {
    let mut package = template.package.clone();
    let mut events = package.document()?;

    set_page_size(&mut events, config.page_size_twips())?;

    let retitled = replace_placeholder(
        &mut events,
        &config.placeholder,
        identifier,
        &config.title_style_id,
    )?;
    if retitled == 0 {
        warn!("{}: template has no '{}' placeholder", identifier, config.placeholder);
    } else {
        ensure_title_style(&mut package, &config.title_style_id, &config.title_font)?;
    }

    ensure_root_namespaces(&mut events);
    let paragraph = picture_paragraph(&mut package, &events, images)?;
    let at = xml::body_insert_point(&events)?;
    events.splice(at..at, paragraph);

    package.set_document(&events)?;
    debug!(
        "{}: assembled with {} images, {} titles",
        identifier,
        images.len(),
        retitled
    );
    Ok(AssembledDocument {
        identifier: identifier.to_string(),
        package,
        title_found: retitled > 0,
        images: images.len(),
    })
}

// ── Section properties ───────────────────────────────────────────────────

/// Set every section to `(width, height)` twips and clear its explicit
/// page margins so Word falls back to its defaults.
fn set_page_size(events: &mut Events, (w, h): (u32, u32)) -> Result<(), DocxError> {
    let (w, h) = (w.to_string(), h.to_string());
    let mut found = false;
    for i in 0..events.len() {
        let Some(tag) = xml::start_tag(&events[i]) else {
            continue;
        };
        let updated = match tag.name().as_ref() {
            b"w:pgSz" => {
                found = true;
                xml::with_attr(&xml::with_attr(tag, "w:w", &w), "w:h", &h)
            }
            b"w:pgMar" => {
                xml::without_attrs(tag, &[b"w:left", b"w:right", b"w:top", b"w:bottom"])
            }
            _ => continue,
        };
        xml::replace_tag(events, i, updated);
    }
    if found {
        return Ok(());
    }

    let page_size = xml::empty("w:pgSz", &[("w:w", &w), ("w:h", &h)]);
    let body = xml::body(events)?;
    match xml::body_section(events, &body) {
        Some(sect) if sect.start() == sect.end() => {
            let at = *sect.start();
            let tag = xml::start_tag(&events[at])
                .cloned()
                .ok_or_else(|| DocxError::Xml("section properties lost".into()))?;
            events.splice(at..=at, [Event::Start(tag), page_size, xml::end("w:sectPr")]);
        }
        Some(sect) => {
            events.insert(sect.start() + 1, page_size);
        }
        None => {
            let at = xml::body_insert_point(events)?;
            events.splice(
                at..at,
                [xml::start("w:sectPr", &[]), page_size, xml::end("w:sectPr")],
            );
        }
    }
    Ok(())
}

// ── Title ────────────────────────────────────────────────────────────────

/// Retitle every table paragraph whose text contains `placeholder`.
/// Returns the number of paragraphs changed.
fn replace_placeholder(
    events: &mut Events,
    placeholder: &str,
    identifier: &str,
    style_id: &str,
) -> Result<usize, DocxError> {
    let mut replaced = 0;
    let mut table_depth = 0usize;
    let mut i = 0;
    while i < events.len() {
        if xml::is_end(&events[i], b"w:tbl") {
            table_depth = table_depth.saturating_sub(1);
        } else if matches!(&events[i], Event::Start(e) if e.name().as_ref() == b"w:tbl") {
            table_depth += 1;
        } else if table_depth > 0
            && matches!(&events[i], Event::Start(e) if e.name().as_ref() == b"w:p")
        {
            let end = xml::matching_end(events, i)
                .ok_or_else(|| DocxError::Xml("unterminated w:p".into()))?;
            let current = xml::text_content(events, i..=end)?;
            if current.contains(placeholder) {
                let title = current.replace(placeholder, identifier);
                let paragraph = titled_paragraph(events, i..=end, &title, style_id);
                let len = paragraph.len();
                events.splice(i..=end, paragraph);
                replaced += 1;
                i += len;
                continue;
            }
        }
        i += 1;
    }
    Ok(replaced)
}

/// The paragraph at `range` with its runs replaced by a single run of
/// `title` and its paragraph style set to `style_id`.
fn titled_paragraph(
    events: &Events,
    range: std::ops::RangeInclusive<usize>,
    title: &str,
    style_id: &str,
) -> Events {
    let mut out = vec![events[*range.start()].clone()];

    out.push(xml::start("w:pPr", &[]));
    out.push(xml::empty("w:pStyle", &[("w:val", style_id)]));
    let existing = xml::children(events, &range)
        .into_iter()
        .find(|c| xml::is_element(&events[*c.start()], b"w:pPr"));
    if let Some(ppr) = existing {
        for prop in xml::children(events, &ppr) {
            if !xml::is_element(&events[*prop.start()], b"w:pStyle") {
                out.extend(events[prop].iter().cloned());
            }
        }
    }
    out.push(xml::end("w:pPr"));

    out.push(xml::start("w:r", &[]));
    out.push(xml::start("w:t", &[("xml:space", "preserve")]));
    out.push(xml::text(title));
    out.push(xml::end("w:t"));
    out.push(xml::end("w:r"));
    out.push(xml::end("w:p"));
    out
}

/// Add a bold paragraph style `style_id` in `font` unless it exists.
fn ensure_title_style(package: &mut DocxPackage, style_id: &str, font: &str) -> Result<(), DocxError> {
    let mut styles = package.styles()?;
    let exists = styles.iter().filter_map(xml::start_tag).any(|e| {
        e.name().as_ref() == b"w:style" && xml::attr(e, b"w:styleId").as_deref() == Some(style_id)
    });
    if exists {
        return Ok(());
    }

    let root = xml::find_element(&styles, b"w:styles")
        .ok_or_else(|| DocxError::Xml("styles part has no w:styles".into()))?;
    if root.start() == root.end() {
        return Err(DocxError::Xml("styles part is an empty element".into()));
    }
    let (id, font) = (escape(style_id), escape(font));
    let definition = format!(
        r#"<w:style w:type="paragraph" w:customStyle="1" w:styleId="{id}"><w:name w:val="{id}"/><w:qFormat/><w:rPr><w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}"/><w:b/><w:bCs/></w:rPr></w:style>"#
    );
    let at = *root.end();
    styles.splice(at..at, xml::parse(definition.as_bytes())?);
    package.set_styles(&styles)
}

// ── Pictures ─────────────────────────────────────────────────────────────

/// Declare the relationship and drawing prefixes on `w:document`.
fn ensure_root_namespaces(events: &mut Events) {
    let Some(i) = events.iter().position(|ev| xml::is_element(ev, b"w:document")) else {
        return;
    };
    for (prefix, ns) in [("xmlns:r", NS_R), ("xmlns:wp", NS_WP)] {
        if let Some(tag) = xml::start_tag(&events[i]) {
            if xml::attr(tag, prefix.as_bytes()).is_none() {
                let updated = xml::with_attr(tag, prefix, ns);
                xml::replace_tag(events, i, updated);
            }
        }
    }
}

/// Highest `wp:docPr` id in use.
pub(crate) fn max_drawing_id(events: &[Event<'static>]) -> u64 {
    events
        .iter()
        .filter_map(xml::start_tag)
        .filter(|e| e.name().as_ref() == b"wp:docPr")
        .filter_map(|e| xml::attr(e, b"id")?.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

/// One paragraph holding every fragment as an inline picture, in order.
/// The image parts and their relationships are added to `package`.
fn picture_paragraph(
    package: &mut DocxPackage,
    events: &Events,
    images: &[FragmentImage],
) -> Result<Events, DocxError> {
    let mut out = vec![xml::start("w:p", &[])];
    if images.is_empty() {
        out.push(xml::end("w:p"));
        return Ok(out);
    }

    package.ensure_default_content_type("png", "image/png")?;
    let mut rels = package.relationships()?;
    let mut next_id = max_drawing_id(events) + 1;

    for image in images {
        let part = package.unique_part_name("word/media", "image", "png");
        let target = part.trim_start_matches("word/").to_string();
        package.set_part(part, image.png.clone());
        let rel_id = rels.add(REL_IMAGE, &target, false);

        let (cx, cy) = image.extent_emu();
        let run = inline_picture_run(&rel_id, next_id, image.page_num, cx, cy);
        out.extend(xml::parse(run.as_bytes())?);
        next_id += 1;
    }
    package.set_relationships(&rels)?;

    out.push(xml::end("w:p"));
    Ok(out)
}

fn inline_picture_run(rel_id: &str, doc_pr_id: u64, page_num: usize, cx: u64, cy: u64) -> String {
    format!(
        concat!(
            r#"<w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{id}" name="Page {page}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="0" name="page{page}.png"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#
        ),
        cx = cx,
        cy = cy,
        id = doc_pr_id,
        page = page_num,
        rel = rel_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Events {
        xml::parse(s.as_bytes()).unwrap()
    }

    fn render(events: &Events) -> String {
        String::from_utf8(xml::serialize(events).unwrap()).unwrap()
    }

    #[test]
    fn page_size_overwritten_and_margins_cleared() {
        let mut ev = parse(
            r#"<w:document><w:body><w:p/><w:sectPr><w:pgSz w:w="12240" w:h="15840" w:orient="portrait"/><w:pgMar w:top="1440" w:left="1800" w:header="720"/></w:sectPr></w:body></w:document>"#,
        );
        set_page_size(&mut ev, (11909, 16834)).unwrap();
        let out = render(&ev);
        assert!(out.contains(r#"<w:pgSz w:w="11909" w:h="16834" w:orient="portrait"/>"#), "{out}");
        assert!(out.contains(r#"<w:pgMar w:header="720"/>"#), "{out}");
    }

    #[test]
    fn page_size_added_when_missing() {
        let mut ev = parse(r#"<w:document><w:body><w:p/><w:sectPr/></w:body></w:document>"#);
        set_page_size(&mut ev, (11909, 16834)).unwrap();
        assert_eq!(
            render(&ev),
            r#"<w:document><w:body><w:p/><w:sectPr><w:pgSz w:w="11909" w:h="16834"/></w:sectPr></w:body></w:document>"#
        );

        let mut bare = parse(r#"<w:document><w:body><w:p/></w:body></w:document>"#);
        set_page_size(&mut bare, (10, 20)).unwrap();
        assert!(render(&bare).ends_with(
            r#"<w:p/><w:sectPr><w:pgSz w:w="10" w:h="20"/></w:sectPr></w:body></w:document>"#
        ));
    }

    #[test]
    fn placeholder_only_replaced_inside_tables() {
        let mut ev = parse(concat!(
            r#"<w:document><w:body>"#,
            r#"<w:p><w:r><w:t>Cable Name</w:t></w:r></w:p>"#,
            r#"<w:tbl><w:tr><w:tc><w:p><w:pPr><w:pStyle w:val="Old"/><w:jc w:val="center"/></w:pPr>"#,
            r#"<w:r><w:t>Cable </w:t></w:r><w:r><w:rPr><w:i/></w:rPr><w:t>Name:</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
            r#"</w:body></w:document>"#
        ));
        let n = replace_placeholder(&mut ev, "Cable Name", "DB-1 & Co", "CommentsStyle").unwrap();
        assert_eq!(n, 1);
        let out = render(&ev);
        assert!(out.starts_with(r#"<w:document><w:body><w:p><w:r><w:t>Cable Name</w:t></w:r></w:p>"#));
        assert!(out.contains(concat!(
            r#"<w:p><w:pPr><w:pStyle w:val="CommentsStyle"/><w:jc w:val="center"/></w:pPr>"#,
            r#"<w:r><w:t xml:space="preserve">DB-1 &amp; Co:</w:t></w:r></w:p>"#
        )), "{out}");
    }

    #[test]
    fn extent_follows_image_aspect() {
        let img = FragmentImage {
            page_num: 1,
            png: vec![],
            width_px: 200,
            height_px: 100,
            layout: FragmentLayout {
                width_emu: 1000,
                height_emu: 588,
            },
        };
        assert_eq!(img.extent_emu(), (1000, 500));
    }

    #[test]
    fn drawing_ids_scanned() {
        let ev = parse(r#"<w:p><wp:docPr id="3" name="a"/><wp:docPr id="12" name="b"/></w:p>"#);
        assert_eq!(max_drawing_id(&ev), 12);
    }
}
