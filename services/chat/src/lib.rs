//! Multi-client text-chat relay.
//!
//! The connection layer (`chat-network`) multiplexes peers and fires
//! lifecycle events; the manager translates those events into messages for
//! four single-purpose actors (`chat-actors`): session registers and greets
//! joiners, command parses and routes inbound lines, delivery writes
//! outbound text, log serializes diagnostics. Client identities live in the
//! contact registry and are recycled after disconnect.

pub mod actors;
pub mod config;
pub mod contact;
pub mod dispatch;
pub mod manager;

pub use config::{ChatConfig, Driver};
pub use contact::{ClientId, ContactRegistry};
pub use manager::{ChatClient, Manager, ManagerHandle};
