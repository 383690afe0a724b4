pub mod property;
pub mod resource_list;

pub use property::{Property, PropertySubscriber};
pub use resource_list::{Loader, ResourceList, ResourceState};
