//! DialTransport port - 実際に発信する外部システム
//!
//! # 契約
//! - `dial()` は壁時計時間がかかってよい（carrier / ネットワーク待ち）
//! - engine は同じ agent の dial を直列化しない（並行に何本も呼ばれる）
//! - 失敗は `DialError` で返す。engine はそれを `on_call_failed` に流す

use async_trait::async_trait;

use crate::domain::{AgentId, DialError, DialOutcome, PhoneNumber};

#[async_trait]
pub trait DialTransport: Send + Sync {
    async fn dial(&self, agent: &AgentId, phone: &PhoneNumber) -> Result<DialOutcome, DialError>;
}
