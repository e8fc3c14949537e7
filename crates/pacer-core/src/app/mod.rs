//! App - アプリケーション層
//!
//! ports を組み合わせて pacing ロジックを実装します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: engine の構築とワイヤリング
//! - **PacingEngine**: event handler と dial cycle
//! - **dispatch**: 1 cycle 分の並行 dial（最初の 1 本だけ待つ）
//! - **session**: ログイン中の shutdown シグナルと failure reactor

pub mod builder;
pub mod engine;
mod dispatch;
mod session;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::engine::PacingEngine;
