//! MGAM - client-side VLT service protocol engine
//!
//! Registers an electronic gaming machine with its site controller, opens and
//! closes player sessions, and moves money through cash, voucher and play
//! commands without losing or duplicating value across disconnects, server
//! errors and restarts.
//!
//! - [`commands`]: command dispatch, retry registry and handlers
//! - [`registration`]: the registration handshake
//! - [`protocol`]: response codes, classification and messages
//! - [`interfaces`]: collaborator traits implemented by the host

pub mod bus;
pub mod commands;
pub mod config;
pub mod instance;
pub mod interfaces;
pub mod protocol;
pub mod registration;
pub mod storage;
pub mod test_utils;
pub mod utils;

pub use commands::{Command, CommandDispatcher, CommandError, CommandKind, CommandOutput};
pub use config::ProtocolConfig;
pub use registration::{Registrar, RegistrationError, RegistrationInfo};
