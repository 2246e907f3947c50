// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

/// Readiness checks for the state store
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::storage::StateStore;

pub const HEALTHY: &str = "healthy";
pub const UNHEALTHY: &str = "unhealthy";

/// Overall health status
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub checks: Vec<HealthCheck>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == HEALTHY
    }
}

/// Individual health check result
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
    pub duration_ms: f64,
}

/// Check that the state store can be reached
pub async fn check_store_health(store: &Arc<dyn StateStore>) -> HealthCheck {
    let start = Instant::now();
    let (status, message) = match store.check().await {
        Ok(()) => (HEALTHY, None),
        Err(e) => (UNHEALTHY, Some(format!("{} store check failed: {}", store.backend(), e))),
    };
    HealthCheck {
        name: "store".to_string(),
        status: status.to_string(),
        message,
        duration_ms: start.elapsed().as_secs_f64() * 1000.0,
    }
}

pub async fn get_health_status(store: &Arc<dyn StateStore>) -> HealthStatus {
    let checks = vec![check_store_health(store).await];
    let all_healthy = checks.iter().all(|c| c.status == HEALTHY);

    HealthStatus {
        status: if all_healthy { HEALTHY } else { UNHEALTHY }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks,
    }
}
