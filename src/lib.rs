pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod models;
pub mod relay;
pub mod services;
pub mod store;

use axum::Router;
use std::sync::Arc;
use tracing::info;

use config::{Config, StoreBackend};
use relay::ChangeRelay;
use services::BookingService;
use store::{BookingStore, MemoryStore, PgStore};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub bookings: BookingService,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let store: Arc<dyn BookingStore> = match config.database.backend {
            StoreBackend::Postgres => {
                let db = database::Database::connect(&config.database).await?;
                Arc::new(PgStore::new(&db))
            }
            StoreBackend::Memory => {
                info!("Using in-memory store, data is lost on restart");
                Arc::new(MemoryStore::seeded())
            }
        };
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn BookingStore>) -> Arc<Self> {
        let relay = ChangeRelay::new(config.booking.relay_capacity);
        let bookings = BookingService::new(store, config.booking.legacy_slots.clone(), relay);
        Arc::new(Self { bookings, config })
    }

    pub fn with_service(config: Config, bookings: BookingService) -> Arc<Self> {
        Arc::new(Self { bookings, config })
    }
}

/// Все маршруты доступны и от корня, и под `/api`: старые клиенты ходят на `/api/...`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(controllers::routes())
        .nest("/api", controllers::routes())
        .with_state(state)
}
