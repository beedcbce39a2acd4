//! UpCloud API client handle
//!
//! Builds authenticated clients for the UpCloud API from configured
//! credentials. Constructing a client or a request never touches the network;
//! sending is left to the provisioning steps that use the handle.

pub mod client;
pub mod service;

pub use client::*;
pub use service::*;
