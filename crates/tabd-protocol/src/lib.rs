//! Wire types shared between the daemon's client socket and extension gateway.
//!
//! Nothing in this crate talks to an actual socket — it only defines the JSON shapes and the
//! handful of pure translations (command validation, extension-shape mapping) that both sides of
//! the wire need to agree on.

mod command;
mod extension;
mod ipc;

pub use command::{
    ClientResponse, Command, CommandType, ExtensionCommand, ExtensionResponse, translate_for_extension, validate_command,
};
pub use extension::{ExtensionFrame, RegisterInfo, SessionAssigned};
pub use ipc::{EndpointInfo, IpcMessage, IpcMessageType};
