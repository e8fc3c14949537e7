//! Implementations of the ports for development, tests and simulation.

pub mod inmem_store;
pub mod sim_transport;

pub use self::inmem_store::{DEFAULT_SEED_LEADS, InMemoryLeadStore};
pub use self::sim_transport::SimulatedTransport;
