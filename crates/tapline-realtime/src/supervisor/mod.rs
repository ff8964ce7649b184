//! Picks the authoritative transport and exposes one API to the UI.

pub mod ledger;
pub mod manager;
pub mod status;

pub use ledger::MessageLedger;
pub use manager::TransportSupervisor;
pub use status::ConnectionStatus;
