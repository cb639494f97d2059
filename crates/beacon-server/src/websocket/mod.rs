//! WebSocket sessions: lifecycle, inbound and outbound pumps.

pub mod pumps;
pub mod session;

pub use pumps::CloseReason;
pub use session::run_session;
