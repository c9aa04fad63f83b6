mod fetcher;
pub mod wire;

pub use fetcher::{ArticleSource, RemoteFetcher};
