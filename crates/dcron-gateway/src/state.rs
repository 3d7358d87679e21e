//! Shared application state injected into every axum handler.

use std::sync::Arc;

use chrono_tz::Tz;
use dcron_core::{Bootstrap, ControlPlane, JobRegistry, Snowflake, StoreGateway};

pub type DynStore = Arc<dyn StoreGateway>;

/// Everything a route handler needs, cloned cheaply per-request (every field is an `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry<DynStore>>,
    pub control: Arc<ControlPlane<DynStore>>,
    pub bootstrap: Arc<Bootstrap<DynStore>>,
    pub ids: Arc<Snowflake>,
    pub tz: Tz,
}
