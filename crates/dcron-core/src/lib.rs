//! Scheduling engine and shared-state discipline for the distributed cron service.
//!
//! A single node looks like: a [`store::StoreGateway`] for shared state, a [`registry::JobRegistry`]
//! for key layout, a [`wheel::Wheel`] for active ticking, a [`firing::FiringPipeline`] for what
//! happens when a job fires, a [`control::ControlPlane`] for API-driven mutation, and a
//! [`bootstrap::Bootstrap`] to rehydrate the wheel on start. Replicas share state only through the
//! store; nothing here coordinates across processes directly.

pub mod bootstrap;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod firing;
pub mod id;
pub mod job;
pub mod registry;
pub mod schedule;
pub mod store;
pub mod wheel;

pub use bootstrap::Bootstrap;
pub use config::DcronConfig;
pub use control::ControlPlane;
pub use error::{DcronError, DcronResult};
pub use firing::{FiringPipeline, SCHEDULING_TZ};
pub use id::Snowflake;
pub use job::{Job, JobStatus, JobType, PubJobEvent, TaskPayloadReq};
pub use registry::JobRegistry;
pub use store::StoreGateway;
pub use wheel::{Firer, Wheel};
