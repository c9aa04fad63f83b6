mod repository;
mod schema;
mod shared;

pub use repository::ArticleRepository;
pub use schema::SCHEMA_VERSION;
pub use shared::SharedStore;
