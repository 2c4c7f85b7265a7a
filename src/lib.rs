use std::sync::Arc;

use config::Config;

pub mod cache;
pub mod card;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod scheduler;
pub mod utils;

use card::CardService;
use scheduler::{ExpiryScheduler, PerformanceScheduler};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub cards: Arc<CardService>,
    pub expiry_scheduler: Arc<ExpiryScheduler>,
    pub performance_scheduler: Arc<PerformanceScheduler>,
}
