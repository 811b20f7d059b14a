use super::OPENSSH_PORTABLE_DEFAULT_COPY_BUFLEN;

use std::num::NonZeroUsize;

/// Options when opening a [`crate::SftpChannel`].
#[derive(Debug, Copy, Clone, Default)]
pub struct SftpOptions {
    max_read_len: Option<NonZeroUsize>,
    max_write_len: Option<NonZeroUsize>,
}

impl SftpOptions {
    /// Create a new [`SftpOptions`].
    pub const fn new() -> Self {
        Self {
            max_read_len: None,
            max_write_len: None,
        }
    }

    /// Set `max_read_len`, the largest chunk requested by one read call.
    ///
    /// It defaults to [`OPENSSH_PORTABLE_DEFAULT_COPY_BUFLEN`].
    #[must_use]
    pub const fn max_read_len(mut self, max_read_len: NonZeroUsize) -> Self {
        self.max_read_len = Some(max_read_len);
        self
    }

    /// Set `max_write_len`, the largest chunk sent by one write call.
    ///
    /// It defaults to [`OPENSSH_PORTABLE_DEFAULT_COPY_BUFLEN`].
    #[must_use]
    pub const fn max_write_len(mut self, max_write_len: NonZeroUsize) -> Self {
        self.max_write_len = Some(max_write_len);
        self
    }

    pub(crate) fn get_max_read_len(&self) -> usize {
        self.max_read_len
            .map(NonZeroUsize::get)
            .unwrap_or(OPENSSH_PORTABLE_DEFAULT_COPY_BUFLEN)
    }

    pub(crate) fn get_max_write_len(&self) -> usize {
        self.max_write_len
            .map(NonZeroUsize::get)
            .unwrap_or(OPENSSH_PORTABLE_DEFAULT_COPY_BUFLEN)
    }
}
