pub mod extractor;
pub mod sse;
pub mod translator;

pub use translator::StreamTranslator;
