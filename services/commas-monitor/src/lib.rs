//! 3Commas Monitor Library
//!
//! Signed 3Commas API client, periodic poller and derived capital metrics,
//! exposed as read-only numeric sensors.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod sensor;
pub mod signer;

// Re-export main types for convenience
pub use client::{ThreeCommasApi, ThreeCommasClient};
pub use config::{AuthMethod, Credentials, EntryConfig, Settings, UserMode};
pub use coordinator::{AccountFailure, Coordinator, CoordinatorState, Snapshot, Status};
pub use error::{ClientError, UpdateError};
pub use metrics::{AccountMetrics, BotInvestment, DerivedMetrics};
pub use models::{Account, Bot, ProfitData};
pub use registry::{EntryHandle, Registry, SetupError, ValidationError};
pub use sensor::{Sensor, SensorDescription};
pub use signer::{QueryParams, SignedHeaders, Signer};
