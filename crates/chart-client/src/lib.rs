//! Chart Client
//!
//! Installs, upgrades and removes the chart-based workload managed by the
//! CFAPI controller. The production client drives the `helm` CLI; the
//! `test-util` feature adds an in-memory mock.
//!
//! # Example
//!
//! ```no_run
//! use chart_client::{ChartClientTrait, HelmClient, ReleaseSpec};
//!
//! # async fn example() -> Result<(), chart_client::ChartError> {
//! let client = HelmClient::new("helm");
//! let spec = ReleaseSpec::new("cf-api", "cf-system", "./charts/cfapi");
//! let release = client.install(&spec).await?;
//! println!("{} at revision {}", release.name, release.revision);
//! client.uninstall("cf-api", "cf-system").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod chart_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use chart_trait::ChartClientTrait;
pub use client::HelmClient;
pub use error::ChartError;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::{ChartCall, MockChartClient};
