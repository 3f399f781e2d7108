// Document processing: field mapping, expression templating, text cleanup, summary extraction

pub mod document;
pub mod expression;
pub mod mapper;
pub mod summary;
pub mod text;

pub use document::build_document;
pub use mapper::{map_fields, FieldMappings};
pub use text::{clean_html, TextFormat};
