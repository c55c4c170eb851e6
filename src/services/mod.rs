pub mod anchor;
pub mod corpus;
pub mod crossref;
pub mod fetcher;
pub mod parser;
pub mod report;
pub mod splitter;
pub mod toolchain;

pub use corpus::BookCorpus;
pub use crossref::CrossReferenceRewriter;
pub use fetcher::ContentFetcher;
pub use parser::MarkdownParser;
pub use report::ReportWriter;
pub use splitter::DocumentSplitter;
pub use toolchain::{ExternalTool, Requirement};
