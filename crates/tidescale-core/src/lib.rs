//! tidescale-core — shared building blocks for the tidescale autoscaler.
//!
//! Holds the workload identity and utilization sample types, the scaling
//! parameters with their validation rules, the `tidescale.toml` parser,
//! an injectable wall clock, and the small HTTP/1 client used to talk to
//! Prometheus and the Kubernetes API server.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod types;

use std::future::Future;
use std::pin::Pin;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use config::{ResolvedConfig, TideConfig, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use types::*;

/// Boxed, sendable future used by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
