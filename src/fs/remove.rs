use crate::{
    lowlevel::{SftpHandle, Transport},
    utils::ResultExt,
    Error,
};

use super::Fs;

use std::path::{Path, PathBuf};

/// Pending step of the depth-first removal walk.
enum Visit {
    /// List the directory and schedule its children.
    Enter(PathBuf),
    /// Every child is gone, remove the directory itself.
    Leave(PathBuf),
}

impl<T: Transport> Fs<T> {
    /// Remove `path` and, if it is a directory, everything below it.
    ///
    /// Symlinks are removed, never followed. If an entry fails to be
    /// removed the walk stops there; entries removed until then stay
    /// removed.
    pub fn remove_all(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = self.concat_path_if_needed(path.as_ref());
        self.remove_tree(&path)
    }

    pub(super) fn remove_tree(&self, path: &Path) -> Result<(), Error> {
        let is_dir = self
            .file_type_of(path, None)?
            .map_or(false, |file_type| file_type.is_dir());

        if !is_dir {
            return self.unlink(path);
        }

        let mut stack = vec![Visit::Enter(path.to_path_buf())];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Leave(dir) => {
                    let res = self.channel.acquire_lock().rmdir(&dir);
                    res.at_path(&dir)?;
                }
                Visit::Enter(dir) => {
                    let entries = self.read_entries(&dir)?;

                    stack.push(Visit::Leave(dir.clone()));

                    for entry in entries {
                        let child = dir.join(entry.filename());

                        let is_dir = self
                            .file_type_of(&child, entry.file_type())?
                            .map_or(false, |file_type| file_type.is_dir());

                        if is_dir {
                            stack.push(Visit::Enter(child));
                        } else {
                            self.unlink(&child)?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn unlink(&self, path: &Path) -> Result<(), Error> {
        let res = self.channel.acquire_lock().unlink(path);
        res.at_path(path)
    }
}
