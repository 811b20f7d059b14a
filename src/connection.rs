use super::{
    auth::{self, CredentialSupplier},
    fs::Fs,
    lowlevel::{Connector, Transport},
    Error, Session, SftpChannel, SftpOptions, DEFAULT_SSH_PORT,
};

use std::sync::Arc;

/// Where to connect and as whom.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ConnectionSpec {
    host: String,
    user: String,
    port: u16,
}

impl ConnectionSpec {
    /// Connect to `user@host` on the default ssh port.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: DEFAULT_SSH_PORT,
        }
    }

    /// Use `port` instead of the default ssh port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn get_host(&self) -> &str {
        &self.host
    }

    pub fn get_user(&self) -> &str {
        &self.user
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Connect, authenticate with `supplier` and start an sftp channel.
    ///
    /// A failed or aborted attempt leaves nothing behind; calling this again
    /// starts over with a new connection.
    pub fn create_session<C, S>(
        &self,
        connector: &C,
        supplier: &mut S,
        options: SftpOptions,
    ) -> Result<AuthenticatedSession<C::Transport>, Error>
    where
        C: Connector,
        S: CredentialSupplier + ?Sized,
    {
        let session = Session::connect(connector, &self.host, self.port)?;

        auth::authenticate(&session, &self.user, supplier)?;

        #[cfg(feature = "tracing")]
        tracing::info!(host = %self.host, port = self.port, user = %self.user, "authenticated");

        let channel = SftpChannel::open(Arc::clone(&session), options)?;

        Ok(AuthenticatedSession {
            session,
            fs: channel.fs(),
        })
    }
}

/// A session that completed authentication, together with its sftp
/// channel.
#[derive(Debug)]
pub struct AuthenticatedSession<T: Transport> {
    session: Arc<Session<T>>,
    fs: Fs<T>,
}

impl<T: Transport> AuthenticatedSession<T> {
    /// The underlying session.
    pub fn session(&self) -> &Arc<Session<T>> {
        &self.session
    }

    /// Filesystem operations on the remote host.
    pub fn fs(&self) -> &Fs<T> {
        &self.fs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_to_ssh() {
        let spec = ConnectionSpec::new("localhost", "swish");
        assert_eq!(spec.get_port(), 22);
        assert_eq!(spec.port(2222).get_port(), 2222);
    }
}
