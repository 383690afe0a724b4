pub mod adapters;
pub mod errors;
pub mod memory;
pub mod query;
pub mod rest;
pub mod retry;
pub mod traits;

pub use errors::BackendError;
pub use memory::MemoryBackend;
pub use query::Query;
pub use rest::RestClient;
pub use retry::RetryPolicy;
pub use traits::{BackendClient, BackendSurface, SourceAdapter};
