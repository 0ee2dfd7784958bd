//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info};

use crate::database::error::DatabaseError;
use crate::database::{get_pool_stats, health_check};

/// Responses slower than this mark the component as degraded.
const SLOW_RESPONSE_MS: u128 = 1_000;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Degraded still serves traffic; only Unhealthy fails readiness.
    pub fn is_healthy(&self) -> bool {
        !matches!(self.status, HealthState::Unhealthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
///
/// Holds no pool when the service runs on in-memory storage; the
/// database component then reports up unconditionally.
#[derive(Clone)]
pub struct HealthChecker {
    db_pool: Option<PgPool>,
}

impl HealthChecker {
    pub fn new(db_pool: Option<PgPool>) -> Self {
        Self { db_pool }
    }

    /// Perform comprehensive health check
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        let database = match &self.db_pool {
            Some(pool) => match timeout(Duration::from_secs(5), check_database_health(pool)).await
            {
                Ok(Ok(response_time)) => {
                    let stats = get_pool_stats(pool);
                    info!(
                        response_time_ms = response_time as u64,
                        pool_idle = stats.num_idle,
                        pool_size = stats.size,
                        "database health check ok"
                    );
                    if response_time > SLOW_RESPONSE_MS {
                        ComponentHealth::warning(
                            Some(response_time),
                            Some("slow response".to_string()),
                        )
                    } else {
                        ComponentHealth::up(Some(response_time))
                    }
                }
                Ok(Err(e)) => {
                    error!("database health check failed: {}", e);
                    ComponentHealth::down(Some(e.to_string()))
                }
                Err(_) => {
                    error!("database health check timed out");
                    ComponentHealth::down(Some("timeout".to_string()))
                }
            },
            None => ComponentHealth {
                status: ComponentState::Up,
                response_time_ms: None,
                details: Some("in-memory store".to_string()),
            },
        };

        let any_down = matches!(database.status, ComponentState::Down);
        let any_warning = matches!(database.status, ComponentState::Warning);
        health_status.checks.insert("database".to_string(), database);

        health_status.status = if any_down {
            HealthState::Unhealthy
        } else if any_warning {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        health_status
    }
}

/// Round-trip a trivial query and report the elapsed time.
pub async fn check_database_health(pool: &PgPool) -> Result<u128, DatabaseError> {
    let start = Instant::now();
    health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}
