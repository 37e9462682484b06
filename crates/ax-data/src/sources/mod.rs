pub mod fetcher;
pub mod locator;

pub use fetcher::{DefaultFetcher, FsFetcher, HttpFetcher, MemoryFetcher, SourceFetcher};
pub use locator::{Granularity, SourceLayout, SourceLocator};
