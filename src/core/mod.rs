pub mod viewmodels;

pub use viewmodels::{ResourceList, ResourceState};
