use crate::{
    lowlevel::{Connector, Transport},
    Error,
};

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// Everything that must only be touched while holding the session lock.
struct SessionState<T: Transport> {
    transport: T,

    /// Handles of the sftp channels running on `transport`.
    ///
    /// [`crate::SftpChannel`] refers to its handle by slot index; a slot is
    /// `Some` from channel startup until its shutdown.
    channels: Vec<Option<T::Sftp>>,
}

/// One connected ssh session.
///
/// A session is always handed out as `Arc<Session<T>>` so it never moves
/// once created: channels, filesystems and file streams keep a clone of the
/// `Arc` rather than owning the session.
///
/// The underlying transport is not thread-safe. Every call into it, and
/// into any channel opened on it, happens while holding the lock returned by
/// [`Session::acquire_lock`]. The lock is held for one transport call at a
/// time, so independent operations sharing a session interleave between
/// transport calls.
pub struct Session<T: Transport> {
    host: String,
    port: u16,
    state: Mutex<SessionState<T>>,
}

impl<T: Transport> Session<T> {
    /// Connect to `host:port` and perform the ssh handshake.
    ///
    /// The session is not authenticated yet, see [`crate::auth`].
    pub fn connect<C>(connector: &C, host: &str, port: u16) -> Result<Arc<Self>, Error>
    where
        C: Connector<Transport = T>,
    {
        #[cfg(feature = "tracing")]
        tracing::debug!(host, port, "connecting");

        let transport = connector
            .connect(host, port)
            .map_err(|source| Error::Connection {
                host: host.into(),
                port,
                source,
            })?;

        Ok(Self::from_transport(transport, host, port))
    }

    /// Wrap a transport that is already connected.
    pub fn from_transport(transport: T, host: &str, port: u16) -> Arc<Self> {
        Arc::new(Self {
            host: host.into(),
            port,
            state: Mutex::new(SessionState {
                transport,
                channels: Vec::new(),
            }),
        })
    }

    /// Host the session is connected to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port the session is connected to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Lock the session for exclusive access to the transport handle.
    ///
    /// The lock is never poisoned: the transport is still usable after a
    /// panic in caller code holding it. Threads waiting for the lock get it
    /// in turn, so a caller queued behind a transfer runs between two of its
    /// chunks.
    pub fn acquire_lock(&self) -> SessionGuard<'_, T> {
        SessionGuard {
            state: Some(self.state.lock()),
        }
    }

    /// Whether authentication has completed.
    pub fn is_authenticated(&self) -> bool {
        self.acquire_lock().transport().authenticated()
    }
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        let mut guard = self.acquire_lock();

        if let Err(_err) = guard.transport().disconnect("session closed") {
            #[cfg(feature = "tracing")]
            tracing::error!(?_err, host = %self.host, "failed to disconnect");
        }
    }
}

/// Exclusive access to the transport of a [`Session`].
///
/// Dropping the guard releases the lock, handing it to the longest waiting
/// thread if there is one.
pub struct SessionGuard<'s, T: Transport> {
    /// `None` only while dropping.
    state: Option<MutexGuard<'s, SessionState<T>>>,
}

impl<T: Transport> SessionGuard<'_, T> {
    fn state(&self) -> &SessionState<T> {
        self.state.as_ref().expect("session guard holds the lock until dropped")
    }

    fn state_mut(&mut self) -> &mut SessionState<T> {
        self.state.as_mut().expect("session guard holds the lock until dropped")
    }

    /// The transport handle.
    pub fn transport(&mut self) -> &mut T {
        &mut self.state_mut().transport
    }

    pub(crate) fn insert_channel(&mut self, sftp: T::Sftp) -> usize {
        let channels = &mut self.state_mut().channels;

        match channels.iter().position(Option::is_none) {
            Some(slot) => {
                channels[slot] = Some(sftp);
                slot
            }
            None => {
                channels.push(Some(sftp));
                channels.len() - 1
            }
        }
    }

    pub(crate) fn channel(&self, slot: usize) -> Option<&T::Sftp> {
        self.state().channels.get(slot).and_then(Option::as_ref)
    }

    pub(crate) fn channel_mut(&mut self, slot: usize) -> Option<&mut T::Sftp> {
        self.state_mut().channels.get_mut(slot).and_then(Option::as_mut)
    }

    pub(crate) fn take_channel(&mut self, slot: usize) -> Option<T::Sftp> {
        self.state_mut().channels.get_mut(slot).and_then(Option::take)
    }
}

impl<T: Transport> Drop for SessionGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            MutexGuard::unlock_fair(state);
        }
    }
}

impl<T: Transport> fmt::Debug for SessionGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard").finish_non_exhaustive()
    }
}
