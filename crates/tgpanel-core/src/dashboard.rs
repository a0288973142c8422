//! Dashboard statistics: parallel best-effort reads plus a periodic refresh.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    api::{ApiClient, ApiResult},
    utils::now_ms,
};

/// Hours of scheduler log history summarised on the dashboard.
pub const LOG_STATS_HOURS: u32 = 24;

/// One section per panel card. A section is `None` when its read failed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub scheduler: Option<Value>,
    pub messages: Option<Value>,
    pub groups: Option<Value>,
    pub blacklist: Option<Value>,
    pub logs: Option<Value>,
    pub fetched_at_ms: u64,
}

impl DashboardStats {
    pub fn scheduler_running(&self) -> bool {
        self.scheduler
            .as_ref()
            .and_then(|s| s.get("is_running"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Number of sections that loaded.
    pub fn loaded_sections(&self) -> usize {
        [
            &self.scheduler,
            &self.messages,
            &self.groups,
            &self.blacklist,
            &self.logs,
        ]
        .iter()
        .filter(|s| s.is_some())
        .count()
    }
}

#[derive(Clone)]
pub struct DashboardService {
    api: Arc<ApiClient>,
}

impl DashboardService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn fetch_stats(&self) -> DashboardStats {
        let logs_path = format!("/scheduler/logs/stats?hours={LOG_STATS_HOURS}");
        let (scheduler, messages, groups, blacklist, logs) = tokio::join!(
            self.section("/scheduler/status"),
            self.section("/messages/stats"),
            self.section("/groups/stats"),
            self.section("/blacklist/stats"),
            self.section(&logs_path),
        );

        DashboardStats {
            scheduler,
            messages,
            groups,
            blacklist,
            logs,
            fetched_at_ms: now_ms(),
        }
    }

    /// Start the scheduler if stopped, stop it if running; returns the fresh
    /// scheduler status.
    pub async fn toggle_scheduler(&self, running: bool) -> ApiResult<Value> {
        let path = if running {
            "/scheduler/stop"
        } else {
            "/scheduler/start"
        };
        let _: Value = self.api.post_json::<Value, _>(path, None).await?;
        tracing::info!(action = path, "scheduler toggled");
        self.api.get_json("/scheduler/status").await
    }

    /// Refresh every `interval` until `cancel` fires. The first refresh runs
    /// immediately.
    pub fn spawn_refresh<F>(
        &self,
        interval: Duration,
        cancel: CancellationToken,
        mut on_update: F,
    ) -> JoinHandle<()>
    where
        F: FnMut(DashboardStats) + Send + 'static,
    {
        let svc = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                  _ = cancel.cancelled() => break,
                  _ = tick.tick() => {
                      let stats = svc.fetch_stats().await;
                      on_update(stats);
                  }
                }
            }
            tracing::debug!("dashboard refresh stopped");
        })
    }

    async fn section(&self, path: &str) -> Option<Value> {
        match self.api.get_json::<Value>(path).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(path, error = %e, "dashboard section unavailable");
                None
            }
        }
    }
}
