//! CFAPI CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the CFAPI controller.

pub mod cfapi;

pub use cfapi::*;
