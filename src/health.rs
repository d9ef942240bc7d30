//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
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
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Up,
    Down,
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
}

#[derive(Clone)]
pub struct HealthChecker {
    db_pool: Option<PgPool>,
    check_timeout: Duration,
}

impl HealthChecker {
    pub fn new(db_pool: Option<PgPool>) -> Self {
        Self {
            db_pool,
            check_timeout: Duration::from_secs(5),
        }
    }

    pub async fn check(&self) -> HealthStatus {
        let mut checks = HashMap::new();

        if let Some(pool) = &self.db_pool {
            let started = Instant::now();
            let result = timeout(self.check_timeout, crate::database::health_check(pool)).await;
            let component = match result {
                Ok(Ok(())) => ComponentHealth::up(Some(started.elapsed().as_millis())),
                Ok(Err(e)) => ComponentHealth::down(Some(e.to_string())),
                Err(_) => ComponentHealth::down(Some("health check timed out".to_string())),
            };
            checks.insert("database".to_string(), component);
        }

        let status = if checks
            .values()
            .any(|component| component.status == ComponentState::Down)
        {
            HealthState::Unhealthy
        } else {
            HealthState::Healthy
        };

        HealthStatus {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checker_without_dependencies_is_healthy() {
        let checker = HealthChecker::new(None);
        let status = checker.check().await;
        assert_eq!(status.status, HealthState::Healthy);
        assert!(status.checks.is_empty());
    }

    #[test]
    fn component_constructors_set_state() {
        assert_eq!(ComponentHealth::up(Some(3)).status, ComponentState::Up);
        let down = ComponentHealth::down(Some("no route".to_string()));
        assert_eq!(down.status, ComponentState::Down);
        assert_eq!(down.details.as_deref(), Some("no route"));
    }
}
