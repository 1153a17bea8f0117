//! User command handling.

use crate::command::Command;
use crate::engine::{EngineError, PeerEngine};

impl PeerEngine {
    /// Apply a user command.
    ///
    /// `Register` and `Advertise` only make sense on a member; the root
    /// refuses them with [`EngineError::WrongRole`].
    pub fn handle_command(&mut self, command: Command, now_ms: u64) -> Result<(), EngineError> {
        match command {
            Command::Register => self.send_register(),
            Command::Advertise => self.send_advertise(now_ms),
            Command::SendMessage(text) => self.send_message(&text),
        }
    }
}
