//! Configuration management for the UpCloud image builder
//!
//! This crate decodes raw build settings (maps merged in order, with template
//! expressions rendered first) into a typed [`Config`], applies defaults and
//! validates it, reporting every problem at once.

pub mod communicator;
pub mod interpolate;
pub mod loader;
pub mod schema;
pub mod validation;

pub use communicator::{CommunicatorPreparer, CommunicatorType, StandardCommunicator};
pub use interpolate::{InterpolateContext, InterpolateError};
pub use loader::ConfigLoader;
pub use schema::*;
pub use validation::*;
