//! EngineBuilder - engine の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - store / transport が未設定なら build() で `BuildError::Missing`
//! - dial ratio が 0 なら build() で `BuildError::InvalidConfig`
//!
//! 起動後に「transport が無かった」と気付くより、組み立て時に落ちる方がよい。

use std::sync::Arc;

use super::engine::PacingEngine;
use crate::config::{ConfigError, PacingConfig};
use crate::domain::AgentId;
use crate::ports::{DialTransport, IdGenerator, LeadStore, SystemClock, UlidGenerator};

/// EngineBuilder は `PacingEngine` を構築
///
/// # 使用例
/// ```ignore
/// let engine = PacingEngine::builder("123")
///     .store(store)
///     .transport(transport)
///     .config(PacingConfig::new(3)?)
///     .build()?;
/// ```
pub struct EngineBuilder {
    agent_id: AgentId,
    config: PacingConfig,
    store: Option<Arc<dyn LeadStore>>,
    transport: Option<Arc<dyn DialTransport>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError は engine 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing {0}: it must be set before build()")]
    Missing(&'static str),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl EngineBuilder {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            config: PacingConfig::default(),
            store: None,
            transport: None,
            ids: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn LeadStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn DialTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: PacingConfig) -> Self {
        self.config = config;
        self
    }

    /// Shortcut for `config(PacingConfig { dial_ratio, .. })`; validated in `build()`.
    pub fn dial_ratio(mut self, dial_ratio: usize) -> Self {
        self.config.dial_ratio = dial_ratio;
        self
    }

    /// Defaults to a `UlidGenerator` over the system clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<PacingEngine, BuildError> {
        self.config.validate()?;
        let store = self.store.ok_or(BuildError::Missing("lead store"))?;
        let transport = self.transport.ok_or(BuildError::Missing("dial transport"))?;
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));

        Ok(PacingEngine::from_parts(
            self.agent_id,
            self.config,
            store,
            transport,
            ids,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryLeadStore, SimulatedTransport};

    fn parts() -> (Arc<dyn LeadStore>, Arc<dyn DialTransport>) {
        let store: Arc<dyn LeadStore> = Arc::new(InMemoryLeadStore::with_default_leads());
        let transport: Arc<dyn DialTransport> = Arc::new(SimulatedTransport::new(store.clone()));
        (store, transport)
    }

    #[test]
    fn test_build_success() {
        let (store, transport) = parts();
        let engine = PacingEngine::builder("123")
            .store(store)
            .transport(transport)
            .dial_ratio(3)
            .build()
            .unwrap();

        assert_eq!(engine.agent_id().as_str(), "123");
        assert_eq!(engine.config().dial_ratio, 3);
    }

    #[test]
    fn test_build_defaults_to_ratio_two() {
        let (store, transport) = parts();
        let engine = PacingEngine::builder("123")
            .store(store)
            .transport(transport)
            .build()
            .unwrap();

        assert_eq!(engine.config().dial_ratio, 2);
    }

    #[test]
    fn test_build_missing_transport() {
        let (store, _) = parts();
        let result = PacingEngine::builder("123").store(store).build();
        assert!(matches!(result, Err(BuildError::Missing("dial transport"))));
    }

    #[test]
    fn test_build_missing_store() {
        let (_, transport) = parts();
        let result = PacingEngine::builder("123").transport(transport).build();
        assert!(matches!(result, Err(BuildError::Missing("lead store"))));
    }

    #[test]
    fn test_build_zero_ratio() {
        let (store, transport) = parts();
        let result = PacingEngine::builder("123")
            .store(store)
            .transport(transport)
            .dial_ratio(0)
            .build();
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }
}
