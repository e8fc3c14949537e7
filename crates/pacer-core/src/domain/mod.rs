//! Domain model (ids, lead records, outcomes, events, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod lead;
pub mod outcome;

pub use self::errors::{DialError, PacingError, StoreError};
pub use self::events::PacingEvent;
pub use self::ids::{AgentId, DialId, PhoneNumber};
pub use self::lead::{ActiveCall, CallingAttempt, Lead, LeadCalled};
pub use self::outcome::{DialOutcome, DialReport};
