//! Hub coordinator: the single owner of client and room state.
//!
//! Sessions never touch the registries. They submit [`HubCommand`]s through a
//! [`HubHandle`]; the [`Hub`] event loop applies them one at a time and pushes
//! serialized frames into session mailboxes.

pub mod clients;
pub mod command;
pub mod coordinator;
pub mod rooms;

pub use clients::{ClientEntry, ClientRegistry, SessionHandle};
pub use command::{HubCommand, HubSnapshot};
pub use coordinator::{Hub, HubHandle, channel};
pub use rooms::{LeaveOutcome, RoomRegistry};
