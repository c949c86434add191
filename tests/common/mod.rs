//! Shared fixtures: an in-memory PDF backend and minimal Word packages.

#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use pcad2docx::{
    ConversionConfig, FileError, PageError, PageMargins, PdfBackend, ReportGeometry,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ── Fake backend ─────────────────────────────────────────────────────────────

/// One page of a fake report.
#[derive(Clone)]
pub struct FakePage {
    image: Option<DynamicImage>,
    text: Option<String>,
}

impl FakePage {
    /// A 120×200 white page with an ink band over rows 20..60.
    pub fn ink(text: &str) -> Self {
        let mut img = RgbImage::from_pixel(120, 200, Rgb([255, 255, 255]));
        for y in 20..60 {
            for x in 10..110 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        Self {
            image: Some(DynamicImage::ImageRgb8(img)),
            text: Some(text.to_string()),
        }
    }

    /// A page with nothing printed on it.
    pub fn blank() -> Self {
        Self {
            image: Some(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                120,
                200,
                Rgb([255, 255, 255]),
            ))),
            text: Some(String::new()),
        }
    }

    /// A page that fails both to render and to yield text.
    pub fn corrupt() -> Self {
        Self {
            image: None,
            text: None,
        }
    }
}

/// [`PdfBackend`] serving pages keyed by the PDF's file stem.
#[derive(Clone, Default)]
pub struct FakeBackend {
    reports: HashMap<String, Vec<FakePage>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pages` for `<dir>/<stem>.pdf` and write a stub file there.
    pub fn report(mut self, dir: &Path, stem: &str, pages: Vec<FakePage>) -> Self {
        std::fs::write(dir.join(format!("{stem}.pdf")), b"%PDF-1.7\n%fake\n").unwrap();
        self.reports.insert(stem.to_string(), pages);
        self
    }

    fn pages(&self, path: &Path) -> Option<&Vec<FakePage>> {
        let stem = path.file_stem()?.to_string_lossy().into_owned();
        self.reports.get(&stem)
    }
}

impl PdfBackend for FakeBackend {
    fn page_count(&self, path: &Path) -> Result<usize, FileError> {
        self.pages(path)
            .map(Vec::len)
            .ok_or_else(|| FileError::Unreadable {
                path: path.to_path_buf(),
                detail: "unknown document".into(),
            })
    }

    fn render_page(
        &self,
        path: &Path,
        page_num: usize,
        _dpi: u32,
    ) -> Result<DynamicImage, PageError> {
        self.pages(path)
            .and_then(|pages| pages.get(page_num.checked_sub(1)?))
            .and_then(|page| page.image.clone())
            .ok_or(PageError::RenderFailed {
                page: page_num,
                detail: "corrupt page".into(),
            })
    }

    fn page_text(&self, path: &Path, page_num: usize) -> Result<String, PageError> {
        self.pages(path)
            .and_then(|pages| pages.get(page_num.checked_sub(1)?))
            .and_then(|page| page.text.clone())
            .ok_or(PageError::TextFailed {
                page: page_num,
                detail: "corrupt page".into(),
            })
    }
}

// ── Word fixtures ────────────────────────────────────────────────────────────

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>"#,
    r#"</Types>"#
);

const PACKAGE_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#
);

const DOCUMENT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
    r#"</Relationships>"#
);

fn styles(extra: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:styles xmlns:w="{ns}">"#,
            r#"<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>"#,
            "{extra}",
            r#"</w:styles>"#
        ),
        ns = W_NS,
        extra = extra
    )
}

fn document(body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="{ns}"><w:body>{body}</w:body></w:document>"#
        ),
        ns = W_NS,
        body = body
    )
}

/// Zip `parts` into a Word package at `path`.
pub fn write_docx(path: &Path, parts: &[(&str, String)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, data) in parts {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Template with the placeholder in a table cell and a Letter-sized section.
pub fn write_template(path: &Path) {
    write_template_with(path, TemplateExtras::default());
}

/// Optional template content beyond the placeholder table.
#[derive(Default)]
pub struct TemplateExtras<'a> {
    /// `w:tblStyle` of the placeholder table.
    pub table_style: Option<&'a str>,
    /// Extra `w:style` definitions.
    pub styles: &'a str,
    /// Bytes of a logo picture placed above the table.
    pub logo: Option<&'a [u8]>,
}

pub const LOGO_PART: &str = "word/media/logo.jpeg";

pub fn write_template_with(path: &Path, extras: TemplateExtras<'_>) {
    let table_props = extras
        .table_style
        .map(|id| format!(r#"<w:tblPr><w:tblStyle w:val="{id}"/></w:tblPr>"#))
        .unwrap_or_default();
    let logo = if extras.logo.is_some() {
        concat!(
            r#"<w:p><w:r><w:drawing><wp:inline><wp:extent cx="914400" cy="457200"/>"#,
            r#"<wp:docPr id="1" name="Logo"/><a:graphic><a:graphicData><pic:pic><pic:blipFill>"#,
            r#"<a:blip r:embed="rId2"/></pic:blipFill></pic:pic></a:graphicData></a:graphic>"#,
            r#"</wp:inline></w:drawing></w:r></w:p>"#
        )
    } else {
        ""
    };
    let body = format!(
        concat!(
            "{logo}<w:tbl>{table_props}",
            r#"<w:tr><w:tc><w:p><w:pPr><w:jc w:val="center"/></w:pPr>"#,
            r#"<w:r><w:t>Cable Name</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
            r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/>"#,
            r#"<w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720"/></w:sectPr>"#
        ),
        logo = logo,
        table_props = table_props
    );

    let mut rels = DOCUMENT_RELS.to_string();
    if extras.logo.is_some() {
        rels = rels.replace(
            "</Relationships>",
            concat!(
                r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/logo.jpeg"/>"#,
                "</Relationships>"
            ),
        );
    }

    let mut parts = vec![
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", PACKAGE_RELS.to_string()),
        ("word/document.xml", document(&body)),
        ("word/_rels/document.xml.rels", rels),
        ("word/styles.xml", styles(extras.styles)),
    ];
    let file = std::fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, data) in parts.drain(..) {
        zip.start_file(name, options).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    if let Some(bytes) = extras.logo {
        zip.start_file(LOGO_PART, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// Base document with a Heading1 style and one introductory paragraph.
pub fn write_base(path: &Path) {
    let body = concat!(
        r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Cable schedule</w:t></w:r></w:p>"#,
        r#"<w:sectPr><w:pgSz w:w="11909" w:h="16834"/></w:sectPr>"#
    );
    let heading = r#"<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/></w:style>"#;
    write_docx(
        path,
        &[
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", PACKAGE_RELS.to_string()),
            ("word/document.xml", document(body)),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS.to_string()),
            ("word/styles.xml", styles(heading)),
        ],
    );
}

/// Route library logs to the test harness; `RUST_LOG` raises the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Template and base document in `dir`, plus a config pointing at them.
///
/// Margins are zeroed and pages rendered at 72 DPI so fake pages trim to
/// predictable fragments.
pub fn setup(dir: &Path) -> ConversionConfig {
    init_tracing();
    let template = dir.join("template.docx");
    let base = dir.join("default.docx");
    write_template(&template);
    write_base(&base);
    ConversionConfig::builder()
        .dpi(72)
        .geometry(ReportGeometry {
            margins: PageMargins {
                left_pt: 0.0,
                top_pt: 0.0,
                right_pt: 0.0,
                bottom_pt: 0.0,
            },
            ..ReportGeometry::default()
        })
        .template_path(template)
        .base_path(base)
        .build()
        .unwrap()
}

/// Text of the composite's main document part.
pub fn document_xml(path: &Path) -> String {
    let package = pcad2docx::docx::DocxPackage::open(path).unwrap();
    String::from_utf8(package.part("word/document.xml").unwrap().to_vec()).unwrap()
}

/// Report text in the generator's `Label : value` layout.
pub fn report_text(max_zint: &str, zint: &str) -> String {
    format!(
        "Load Maximum Demand : 1,250 A\n\
         Protective Device Rating (In) : 160\n\
         Current Capacity : 212.5\n\
         Max. Circuit Impedance (max. Zint) : {max_zint}\n\
         Earth Fault Loop Impedance (Zint) : {zint}\n"
    )
}
