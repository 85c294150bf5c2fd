//! acrflow registry control plane
//!
//! The [`RegistryClient`] trait covers the registry operations a build needs
//! (upload context, start, query, locate log, cancel). [`ArmRegistryClient`]
//! implements it over the Azure Resource Manager REST API.

pub mod arm;
pub mod client;
pub mod error;
pub mod model;

pub use arm::ArmRegistryClient;
pub use client::RegistryClient;
pub use error::{RegistryError, Result};
pub use model::{BuildRequest, BuildStatus, Platform, RegistryRef};
