mod frontmatter;
mod fulltext;
mod service;

pub use frontmatter::FrontMatterIndex;
pub use fulltext::FullTextIndex;
pub use service::{IndexingService, IndexingSink, WaitOutcome};
