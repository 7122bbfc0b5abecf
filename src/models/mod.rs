mod snippet;
pub use snippet::{CreateSnippetRequest, Snippet, SnippetId, UpdateSnippetRequest};

mod stats;
pub use stats::{Stats, StatsEvent};
