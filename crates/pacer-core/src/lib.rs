//! pacer-core
//!
//! Per-agent power-dialer pacing: keep `dial_ratio` leads being dialed for
//! an agent, replacing failed dials one for one.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, lead records, outcome, events, errors）
//! - **ports**: 抽象化レイヤー（LeadStore, DialTransport, Clock, Latency, IdGenerator）
//! - **app**: pacing engine（builder, engine, dispatch, session）
//! - **impls**: 開発・シミュレーション用の実装（InMemoryLeadStore, SimulatedTransport）
//! - **config**: `pacer.toml` の読み込みと検証
//! - **observability**: snapshot / counts とテスト用ログ初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{BuildError, EngineBuilder, PacingEngine};
pub use config::{Config, ConfigError, LeadShortagePolicy, PacingConfig};
pub use domain::{AgentId, PacingError, PacingEvent, PhoneNumber};
