use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{LegacySlots, TimeRange};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub booking: BookingConfig,
}

// Настройки приложения
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("expected 'postgres' or 'memory', got '{other}'")),
        }
    }
}

// Настройки базы данных
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub pool_size: u32,
    pub run_migrations: bool,
}

// Настройки бронирования
#[derive(Debug, Clone)]
pub struct BookingConfig {
    // Канонические интервалы старых тегов morning/afternoon/evening
    pub legacy_slots: LegacySlots,
    pub relay_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app: AppConfig {
                host: "0.0.0.0".to_string(),
                port: 4000,
                environment: "development".to_string(),
                rust_log: "seat_booking=debug,tower_http=debug".to_string(),
            },
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: None,
                pool_size: 10,
                run_migrations: true,
            },
            booking: BookingConfig {
                legacy_slots: LegacySlots::default(),
                relay_capacity: 256,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Сборка из произвольного источника переменных; в тестах - из HashMap.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let defaults = Config::default();

        let url = vars.get("DATABASE_URL");
        let backend = match vars.get("STORE_BACKEND") {
            Some(_) => vars.parse("STORE_BACKEND", StoreBackend::Postgres)?,
            // без явного бэкенда работаем с Postgres, как и раньше
            None => StoreBackend::Postgres,
        };
        if backend == StoreBackend::Postgres && url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let slots = defaults.booking.legacy_slots;
        Ok(Config {
            app: AppConfig {
                host: vars.get("HOST").unwrap_or(defaults.app.host),
                port: vars.parse("PORT", defaults.app.port)?,
                environment: vars.get("ENVIRONMENT").unwrap_or(defaults.app.environment),
                rust_log: vars.get("RUST_LOG").unwrap_or(defaults.app.rust_log),
            },
            database: DatabaseConfig {
                backend,
                url,
                pool_size: vars.parse("DB_POOL_SIZE", defaults.database.pool_size)?,
                run_migrations: vars.parse("DB_RUN_MIGRATIONS", defaults.database.run_migrations)?,
            },
            booking: BookingConfig {
                legacy_slots: LegacySlots {
                    morning: vars.parse::<TimeRange>("LEGACY_MORNING", slots.morning)?,
                    afternoon: vars.parse::<TimeRange>("LEGACY_AFTERNOON", slots.afternoon)?,
                    evening: vars.parse::<TimeRange>("LEGACY_EVENING", slots.evening)?,
                },
                relay_capacity: vars.parse("RELAY_CAPACITY", defaults.booking.relay_capacity)?,
            },
        })
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: name,
                reason: e.to_string(),
                value,
            }),
        }
    }
}
