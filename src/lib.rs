//! Catalog client for the YidVid curation service: resilient reads over a
//! hosted backend, a shared result cache and the admin/subscriber writes.

#![allow(clippy::result_large_err)]

pub mod backends;
pub mod config;
pub mod constants;
pub mod core;
pub mod events;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use services::CatalogService;
pub use utils::errors::AppError;
