//! Application state shared across handlers.
//!
//! # Broadcast Channel Behavior
//!
//! Every computed [`AqiResult`] is published on `results_tx` for WebSocket
//! clients:
//!
//! - **Buffer size**: Configurable via `server.broadcast_buffer` (default: 100)
//! - **Message loss**: A subscriber that falls behind a full buffer skips the oldest results
//! - **No blocking**: Publishing never waits on subscribers
//!
//! # Recent Results
//!
//! The last `storage.recent_limit` results are kept in memory, newest at the
//! front, and served by `GET /data`.

use std::collections::VecDeque;
use std::sync::Arc;

use aqi_core::{AqiCalculator, SharedCalculator};
use aqi_types::AqiResult;
use time::OffsetDateTime;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// The index engine.
    pub calculator: SharedCalculator,
    /// Configuration (RwLock for runtime reads).
    pub config: RwLock<Config>,
    /// Most recent results, newest first.
    pub recent: RwLock<VecDeque<AqiResult>>,
    /// Broadcast channel for real-time result updates.
    pub results_tx: broadcast::Sender<AqiResult>,
    /// When the service started.
    pub started_at: OffsetDateTime,
    recent_limit: usize,
}

impl AppState {
    /// Create application state with a calculator built from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`aqi_core::Error::InvalidConfig`] if the configured window is zero.
    pub fn new(config: Config) -> aqi_core::Result<Arc<Self>> {
        let calculator = AqiCalculator::with_window(config.engine.window())?;
        Ok(Self::with_calculator(Arc::new(calculator), config))
    }

    /// Create application state around an existing calculator.
    ///
    /// The broadcast buffer is `config.server.broadcast_buffer`, raised to 1
    /// if configured as 0.
    pub fn with_calculator(calculator: SharedCalculator, config: Config) -> Arc<Self> {
        let buffer_size = config.server.broadcast_buffer.max(1);
        let recent_limit = config.storage.recent_limit.max(1);
        let (results_tx, _) = broadcast::channel(buffer_size);
        Arc::new(Self {
            calculator,
            config: RwLock::new(config),
            recent: RwLock::new(VecDeque::with_capacity(recent_limit)),
            results_tx,
            started_at: OffsetDateTime::now_utc(),
            recent_limit,
        })
    }

    /// Store a result in the recent list and broadcast it to subscribers.
    pub async fn publish(&self, result: AqiResult) {
        {
            let mut recent = self.recent.write().await;
            recent.push_front(result.clone());
            recent.truncate(self.recent_limit);
        }

        // Err only means nobody is listening
        match self.results_tx.send(result) {
            Ok(receivers) => debug!(receivers, "Broadcast result"),
            Err(_) => debug!("No WebSocket subscribers for result"),
        }
    }

    /// Up to `limit` most recent results, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<AqiResult> {
        self.recent.read().await.iter().take(limit).cloned().collect()
    }

    /// Maximum number of retained recent results.
    pub fn recent_limit(&self) -> usize {
        self.recent_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqi_types::SensorReading;

    fn result_for(concentration: f64) -> AqiResult {
        let calculator = AqiCalculator::new();
        let reading = SensorReading::new(28.6, 77.2).with_pollutant("PM10", concentration);
        calculator.calculate_final_aqi(&reading).unwrap()
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let state = AppState::new(Config::default()).unwrap();
        let config = state.config.read().await;
        assert_eq!(config.server.bind, "127.0.0.1:3001");
        assert_eq!(state.calculator.window().as_secs(), 300);
        assert_eq!(state.recent_limit(), 100);
    }

    #[test]
    fn test_app_state_rejects_zero_window() {
        let mut config = Config::default();
        config.engine.window_secs = 0;
        assert!(AppState::new(config).is_err());
    }

    #[tokio::test]
    async fn test_publish_keeps_newest_first_and_bounded() {
        let mut config = Config::default();
        config.storage.recent_limit = 2;
        let state = AppState::new(config).unwrap();

        for c in [50.0, 150.0, 250.0] {
            state.publish(result_for(c)).await;
        }

        let recent = state.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].location.sub_indices[&aqi_types::Pollutant::Pm10], 200.0);
        assert_eq!(recent[1].location.sub_indices[&aqi_types::Pollutant::Pm10], 100.0);
        assert_eq!(state.recent(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let state = AppState::new(Config::default()).unwrap();
        state.publish(result_for(50.0)).await;
        assert_eq!(state.recent(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_channel_multiple_receivers() {
        let state = AppState::new(Config::default()).unwrap();

        let mut rx1 = state.results_tx.subscribe();
        let mut rx2 = state.results_tx.subscribe();

        state.publish(result_for(150.0)).await;

        let received1 = rx1.recv().await.unwrap();
        let received2 = rx2.recv().await.unwrap();
        assert_eq!(received1.aqi(), Some(100.0));
        assert_eq!(received2.scope_key, "28.6,77.2");
    }
}
