//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。lead store と telephony transport は
//! engine の外側にある協力者で、engine はこの trait 越しにしか触りません。

pub mod clock;
pub mod dial_transport;
pub mod id_generator;
pub mod latency;
pub mod lead_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dial_transport::DialTransport;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::latency::{FixedLatency, Latency, NoLatency, RandomLatency, random_or_none};
pub use self::lead_store::LeadStore;
