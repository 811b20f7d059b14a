use crate::{
    constants::{MAX_RENAME_TEMP_CANDIDATES, RENAME_TEMP_SUFFIX},
    lowlevel::{SftpHandle, Transport},
    provider::{Overwrite, OverwriteConfirmation},
    utils::{path_error, ErrorExt, ResultExt},
    Error, SftpErrorKind,
};

use super::Fs;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// `n`-th candidate name for moving `target` out of the way, a sibling of
/// `target`.
fn temp_candidate(target: &Path, n: usize) -> Result<PathBuf, Error> {
    let mut name = OsString::from(
        target
            .file_name()
            .ok_or_else(|| Error::InvalidPath(target.into()))?,
    );
    name.push(RENAME_TEMP_SUFFIX);
    if n > 0 {
        name.push(format!(".{n}"));
    }
    Ok(target.with_file_name(name))
}

impl<T: Transport> Fs<T> {
    /// Rename `from` to `to`.
    ///
    /// If `to` already exists, `confirm` is asked whether it may be
    /// replaced. On [`Overwrite::Deny`] the rename fails with
    /// [`Error::Aborted`] and neither path is touched.
    ///
    /// Returns `true` if the existing `to` had to be replaced, which is not
    /// atomic: `to` is first moved aside to a temporary name ending in
    /// [`RENAME_TEMP_SUFFIX`], then `from` is renamed, then the temporary is
    /// removed recursively.
    ///
    /// If renaming `from` fails after `to` was moved aside, the temporary is
    /// moved back before the error is returned. If removing the temporary
    /// fails, the rename did take effect and [`Error::TempCleanup`] names the
    /// leftover.
    pub fn rename<C>(
        &self,
        from: impl AsRef<Path>,
        to: impl AsRef<Path>,
        confirm: &mut C,
    ) -> Result<bool, Error>
    where
        C: OverwriteConfirmation + ?Sized,
    {
        let from = self.concat_path_if_needed(from.as_ref());
        let to = self.concat_path_if_needed(to.as_ref());

        let res = self.channel.acquire_lock().rename(&from, &to);
        let err = match res {
            Ok(()) => return Ok(false),
            Err(err) => err,
        };

        // sftp v3 servers report an existing target as a generic failure.
        let obstructed = matches!(
            err.sftp_kind(),
            Some(SftpErrorKind::FileAlreadyExists | SftpErrorKind::Failure)
        ) && matches!(self.lstat_if_exists(&to), Ok(Some(_)));

        if !obstructed {
            return Err(path_error(&from, err));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(?from, ?to, "rename target exists, asking to overwrite");

        match confirm.confirm_overwrite(&from, &to) {
            Overwrite::Allow => (),
            Overwrite::Deny => return Err(Error::Aborted),
        }

        self.replace(&from, &to)?;

        Ok(true)
    }

    /// Non-atomic overwrite of the existing `to` by `from`.
    fn replace(&self, from: &Path, to: &Path) -> Result<(), Error> {
        let temp = self.free_temp_name(to)?;

        let res = self.channel.acquire_lock().rename(to, &temp);
        res.at_path(to)?;

        // The temporary holds the only copy of `to` until `from` is in place.
        let res = self.channel.acquire_lock().rename(from, to);
        if let Err(err) = res {
            let err = path_error(from, err);

            #[cfg(feature = "tracing")]
            tracing::warn!(?err, ?temp, "rename failed, restoring target");

            let restored = self.channel.acquire_lock().rename(&temp, to);
            return Err(match restored {
                Ok(()) => err,
                Err(restore_err) => err.error_on_cleanup(path_error(&temp, restore_err)),
            });
        }

        self.remove_tree(&temp).map_err(|source| {
            #[cfg(feature = "tracing")]
            tracing::error!(?source, ?temp, "failed to remove rename temporary");

            Error::TempCleanup {
                temp,
                source: Box::new(source),
            }
        })
    }

    /// First temporary name derived from `target` that nothing occupies.
    fn free_temp_name(&self, target: &Path) -> Result<PathBuf, Error> {
        for n in 0..MAX_RENAME_TEMP_CANDIDATES {
            let candidate = temp_candidate(target, n)?;
            if self.lstat_if_exists(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }

        Err(Error::AlreadyExists {
            path: temp_candidate(target, MAX_RENAME_TEMP_CANDIDATES - 1)?,
        })
    }
}
