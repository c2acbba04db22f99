//! Shared state handed to API handlers.

use std::sync::Arc;

use statuswatch_core::Config;
use statuswatch_sink::DiscordClient;
use statuswatch_status::StatusSource;
use statuswatch_tracker::{JobScheduler, SharedJobStore};

pub struct AppState {
    pub config: Config,
    pub store: SharedJobStore,
    pub scheduler: JobScheduler,
    pub status: Arc<dyn StatusSource>,
    pub discord: Arc<DiscordClient>,
}
