//! Password-reset tickets: short-lived, single-use, dual-expiry.

pub mod models;
mod repo;
mod service;

pub use models::{ActiveTicket, IssuedTicket, TicketError, TicketPolicy};
pub use service::TicketService;
