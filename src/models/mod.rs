mod article;

pub use article::{Article, ArticleId};

#[cfg(test)]
pub(crate) use article::sample;
