//! Connection requests handed over by the transport.

/// Proxy command the client asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    #[default]
    Connect,
    Bind,
    Associate,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect => write!(f, "connect"),
            Command::Bind => write!(f, "bind"),
            Command::Associate => write!(f, "associate"),
        }
    }
}

/// The part of a connection request the policy looks at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionRequest {
    pub command: Command,

    /// Requested name, empty when the client asked for a bare address.
    pub destination_name: String,

    /// Printable destination address, e.g. `93.184.216.34:443`.
    pub destination_address: String,
}

impl ConnectionRequest {
    /// A `Connect` request.
    pub fn connect(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            command: Command::Connect,
            destination_name: name.into(),
            destination_address: address.into(),
        }
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.command = command;
        self
    }
}
