pub mod cache;
pub mod cache_keys;
pub mod cascade;
pub mod catalog;
pub mod commands;
pub mod placeholder;
pub mod preferences;
pub mod session;
pub mod transforms;

pub use cache::{FetchMode, ResultCache};
pub use catalog::CatalogService;
pub use session::{Identity, Session};
