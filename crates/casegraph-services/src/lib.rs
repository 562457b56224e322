pub mod document;
pub mod translate;
pub mod web_search;

pub use document::{create_reader, is_accepted, HttpDocumentReader, PlainTextReader};
pub use translate::{create_translator, GoogleTranslator, PassthroughTranslator};
pub use web_search::{create_search, TavilySearch};
