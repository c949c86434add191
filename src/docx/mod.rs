//! Minimal WordprocessingML package handling.
//!
//! Only what the batch needs: open a `.docx`, edit its main document part
//! as a flat list of XML events, add image parts, and merge several
//! documents into one. Parts that are not touched are carried through
//! byte-for-byte.
//!
//! * [`package`]  — zip container, relationships, content types
//! * [`xml`]      — event-list parsing, serialisation, navigation helpers
//! * [`assemble`] — fill the report template for one source PDF
//! * [`compose`]  — concatenate assembled documents behind a base document

pub mod assemble;
pub mod compose;
pub mod package;
pub mod xml;

pub use assemble::{assemble, AssembledDocument, FragmentImage, ReportTemplate};
pub use compose::CompositeBuilder;
pub use package::{DocxPackage, Relationship, Relationships};

use thiserror::Error;

/// Errors raised while reading, editing, or writing a Word package.
#[derive(Debug, Error)]
pub enum DocxError {
    /// The zip container is damaged or could not be written.
    #[error("zip archive error: {0}")]
    Zip(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A part every Word document must have is absent.
    #[error("package has no part '{0}'")]
    MissingPart(String),

    #[error("malformed XML: {0}")]
    Xml(String),

    /// Content uses a style that neither the source nor the base defines.
    #[error("style '{style_id}' is referenced but not defined")]
    MissingStyle { style_id: String },

    /// Content refers to a relationship id the part does not declare.
    #[error("relationship '{id}' is referenced but not declared")]
    MissingRelationship { id: String },

    /// Content refers to a related part the composite cannot carry over.
    #[error("relationship '{id}' of type '{rel_type}' cannot be merged")]
    UnsupportedRelationship { id: String, rel_type: String },
}

impl From<zip::result::ZipError> for DocxError {
    fn from(e: zip::result::ZipError) -> Self {
        DocxError::Zip(e.to_string())
    }
}

impl From<quick_xml::Error> for DocxError {
    fn from(e: quick_xml::Error) -> Self {
        DocxError::Xml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for DocxError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        DocxError::Xml(e.to_string())
    }
}
