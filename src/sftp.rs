use super::{
    file::{File, OpenMode},
    fs::Fs,
    lowlevel::Transport,
    Error, Session, SessionGuard, SftpOptions,
};

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;

use derive_destructure2::destructure;

/// An sftp channel running on an authenticated [`Session`].
///
/// The channel handle itself lives in the session's registry; this value
/// only holds the session and its slot, so it can be moved and shared
/// freely while the handle stays put.
///
/// The channel is shut down when dropped or with [`SftpChannel::close`].
/// Shutdown failures are logged and otherwise ignored.
#[derive(destructure)]
pub struct SftpChannel<T: Transport> {
    session: Arc<Session<T>>,
    slot: usize,
    options: SftpOptions,
}

impl<T: Transport> SftpChannel<T> {
    /// Start the sftp subsystem on `session`.
    pub fn open(session: Arc<Session<T>>, options: SftpOptions) -> Result<Self, Error> {
        let slot = {
            let mut guard = session.acquire_lock();
            let sftp = guard.transport().open_sftp().map_err(Error::Channel)?;
            guard.insert_channel(sftp)
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(host = session.host(), slot, "sftp channel started");

        Ok(Self {
            session,
            slot,
            options,
        })
    }

    /// Lock the owning session and borrow the channel handle.
    ///
    /// Every filesystem and stream operation goes through this guard, so
    /// they serialise against each other and against the session.
    pub fn acquire_lock(&self) -> ChannelGuard<'_, T> {
        ChannelGuard {
            guard: self.session.acquire_lock(),
            slot: self.slot,
        }
    }

    /// The session this channel runs on.
    pub fn session(&self) -> &Arc<Session<T>> {
        &self.session
    }

    /// The options the channel was opened with.
    pub fn options(&self) -> &SftpOptions {
        &self.options
    }

    /// Filesystem operations over this channel.
    pub fn fs(self) -> Fs<T> {
        Fs::new(Arc::new(self))
    }

    /// Open `path` in `mode`, see [`Fs::get_file`].
    pub fn get_file(self: &Arc<Self>, path: impl AsRef<Path>, mode: OpenMode) -> Result<File<T>, Error> {
        File::open(Arc::clone(self), path.as_ref(), mode)
    }

    /// Shut the channel down now rather than when the last reference to it
    /// goes away.
    pub fn close(self) {
        let (session, slot, _options) = self.destructure();
        shutdown(&session, slot);
    }
}

fn shutdown<T: Transport>(session: &Session<T>, slot: usize) {
    let mut guard = session.acquire_lock();

    let res = match guard.take_channel(slot) {
        Some(sftp) => guard.transport().shutdown_sftp(sftp),
        None => Ok(()),
    };

    if let Err(_err) = res {
        #[cfg(feature = "tracing")]
        tracing::error!(?_err, slot, "failed to shut sftp channel down");
    }
}

impl<T: Transport> fmt::Debug for SftpChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpChannel")
            .field("session", &self.session)
            .field("slot", &self.slot)
            .field("options", &self.options)
            .finish()
    }
}

impl<T: Transport> Drop for SftpChannel<T> {
    fn drop(&mut self) {
        shutdown(&self.session, self.slot);
    }
}

/// Session lock held on behalf of an [`SftpChannel`].
///
/// Dereferences to the channel handle.
pub struct ChannelGuard<'s, T: Transport> {
    guard: SessionGuard<'s, T>,
    slot: usize,
}

impl<T: Transport> ChannelGuard<'_, T> {
    /// The transport of the owning session.
    pub fn transport(&mut self) -> &mut T {
        self.guard.transport()
    }
}

impl<T: Transport> Deref for ChannelGuard<'_, T> {
    type Target = T::Sftp;

    fn deref(&self) -> &Self::Target {
        self.guard
            .channel(self.slot)
            .expect("channel slot is occupied while the channel is alive")
    }
}

impl<T: Transport> DerefMut for ChannelGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard
            .channel_mut(self.slot)
            .expect("channel slot is occupied while the channel is alive")
    }
}

impl<T: Transport> fmt::Debug for ChannelGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelGuard")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}
