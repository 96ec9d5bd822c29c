use core::{fmt::Display, net::IpAddr};

/// Holds the context for the current request. Used for prefixing logs.
#[derive(Default, Debug)]
pub struct Context {
    /// The request peer.
    pub peer: Option<IpAddr>,
    /// The file the backup was saved as.
    pub backup: Option<String>,
    /// The current context
    pub current_context: &'static str,
}

impl Context {
    /// Creates a context for a request from `peer`.
    pub fn for_peer(peer: IpAddr) -> Self {
        Self {
            peer: Some(peer),
            ..Self::default()
        }
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(peer) = &self.peer {
            write!(f, "[{peer}] ")?;
        }

        if let Some(backup) = &self.backup {
            write!(f, "[{backup}] ")?;
        }

        write!(f, "[{}] ", self.current_context)?;

        Ok(())
    }
}
