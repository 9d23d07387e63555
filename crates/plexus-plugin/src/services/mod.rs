//! Service registry: scoped call endpoints between plugins.

pub mod descriptor;
pub mod registry;

pub use descriptor::{
    ServiceDefinition, ServiceDescriptor, ServiceHandler, ServiceRequest, ServiceScope,
};
pub use registry::ServiceRegistry;
