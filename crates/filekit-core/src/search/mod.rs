//! Filter-driven file search.
//!
//! A [`SearchQuery`] is compiled once, then evaluated against each entry a
//! [`crate::fs::walk::PathWalker`] yields, cheapest predicate first: name,
//! then size, then content. Content is streamed, never read whole.

mod content;
pub mod engine;
pub mod query;

pub use engine::{Search, SearchEngine, SearchOutcome, SearchResult, SearchStatus};
pub use query::{
    CompiledQuery, MatchedPredicates, NamePattern, SearchQuery, SizeFilter, SizeOperator, SizeUnit,
};
