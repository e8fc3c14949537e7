//! LeadStore port - lead / attempt / active call の正本（source of truth）
//!
//! LeadStore は以下を管理します：
//! - まだ誰にも渡していない lead のプール
//! - agent ごとの CallingAttempt（dial 中の lead）
//! - agent ごとの ActiveCall（接続中の lead、最大 1 件）
//! - transport が実際に発信した履歴
//!
//! # 削除ポリシー
//! - `remove_*` は **strict**: 対象が無ければ `AttemptNotFound` / `ActiveCallNotFound`
//!   （event が「レコードがある」ことを前提にしているので、無いのは異常）
//! - `clear_*` は **idempotent**: 対象が無くても成功（logout は何度呼んでもよい）
//!
//! 各メソッドは内部で遅い I/O をしてもよいが、engine からは同期的に見える
//! （返るまで engine は先に進まない）。

use async_trait::async_trait;

use crate::domain::{ActiveCall, AgentId, CallingAttempt, Lead, PhoneNumber, StoreError};

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Pop one available lead and assign it to `agent`.
    ///
    /// Fails with `StoreError::NoLeadsAvailable` when the pool is empty.
    async fn acquire_lead(&self, agent: &AgentId) -> Result<Lead, StoreError>;

    /// Number of leads still in the available pool.
    async fn available_leads(&self) -> Result<usize, StoreError>;

    async fn insert_calling_attempt(
        &self,
        agent: &AgentId,
        phone: &PhoneNumber,
    ) -> Result<CallingAttempt, StoreError>;

    /// Strict: an absent attempt is `StoreError::AttemptNotFound`.
    async fn remove_calling_attempt(
        &self,
        agent: &AgentId,
        phone: &PhoneNumber,
    ) -> Result<(), StoreError>;

    /// Idempotent: returns how many attempts were removed.
    async fn clear_calling_attempts(&self, agent: &AgentId) -> Result<usize, StoreError>;

    async fn count_calling_attempts(&self, agent: &AgentId) -> Result<usize, StoreError>;

    /// Current attempts of `agent`, oldest first.
    async fn list_calling_attempts(&self, agent: &AgentId)
    -> Result<Vec<CallingAttempt>, StoreError>;

    async fn insert_active_call(
        &self,
        agent: &AgentId,
        phone: &PhoneNumber,
    ) -> Result<ActiveCall, StoreError>;

    /// Strict: an absent active call is `StoreError::ActiveCallNotFound`.
    async fn remove_active_call(&self, agent: &AgentId) -> Result<ActiveCall, StoreError>;

    /// Idempotent: returns whether an active call was removed.
    async fn clear_active_call(&self, agent: &AgentId) -> Result<bool, StoreError>;

    async fn active_call(&self, agent: &AgentId) -> Result<Option<ActiveCall>, StoreError>;

    /// Append to the dialed-leads history.
    async fn record_lead_called(
        &self,
        agent: &AgentId,
        phone: &PhoneNumber,
    ) -> Result<(), StoreError>;
}
