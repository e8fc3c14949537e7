//! Latency port - store / transport の待ち時間シミュレーション
//!
//! 本番の実装は実 I/O の遅延をそのまま持つので `NoLatency` を使い、
//! 開発用の in-memory 実装やシミュレーションでは `RandomLatency` を差し込みます。
//! テストは `NoLatency` か `FixedLatency` で決定的に走らせます。

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

#[async_trait]
pub trait Latency: Send + Sync {
    async fn pause(&self);
}

/// 待たない
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLatency;

#[async_trait]
impl Latency for NoLatency {
    async fn pause(&self) {}
}

/// 毎回同じだけ待つ
#[derive(Debug, Clone, Copy)]
pub struct FixedLatency(pub Duration);

#[async_trait]
impl Latency for FixedLatency {
    async fn pause(&self) {
        if !self.0.is_zero() {
            tokio::time::sleep(self.0).await;
        }
    }
}

/// `[0, max)` の一様乱数だけ待つ
#[derive(Debug, Clone, Copy)]
pub struct RandomLatency {
    pub max: Duration,
}

impl RandomLatency {
    pub fn new(max: Duration) -> Self {
        Self { max }
    }

    fn sample(&self) -> Duration {
        let max_ms = self.max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

#[async_trait]
impl Latency for RandomLatency {
    async fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// 設定値（ミリ秒）から Latency を選ぶ。0 なら `NoLatency`。
pub fn random_or_none(max_ms: u64) -> std::sync::Arc<dyn Latency> {
    if max_ms == 0 {
        std::sync::Arc::new(NoLatency)
    } else {
        std::sync::Arc::new(RandomLatency::new(Duration::from_millis(max_ms)))
    }
}
