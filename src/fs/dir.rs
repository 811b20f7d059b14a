use crate::{
    lowlevel::{NameEntry, SftpHandle, Transport},
    metadata::{FileAttrs, FileType, MetaData, Permissions},
    utils::{path_error, ErrorExt},
    Error, UnixTimeStamp,
};

use super::Fs;

use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::DateTime;

/// Entries returned by [`Fs::listing`].
///
/// Each entry is a snapshot taken while the directory was read; it never
/// changes afterwards.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DirEntry {
    filename: String,
    owner: Option<String>,
    group: Option<String>,
    long_entry: String,
    attrs: FileAttrs,
}

#[allow(clippy::len_without_is_empty)]
impl DirEntry {
    pub(crate) fn new(entry: NameEntry) -> Self {
        let NameEntry {
            filename,
            longname,
            attrs,
        } = entry;

        let (uid, gid) = match attrs.get_id() {
            Some((uid, gid)) => (Some(uid), Some(gid)),
            None => (None, None),
        };

        let (owner, group) = match longname.as_deref().and_then(parse_owner_group) {
            Some((owner, group)) => (Some(owner.to_owned()), Some(group.to_owned())),
            None => (uid.map(|uid| uid.to_string()), gid.map(|gid| gid.to_string())),
        };

        let long_entry = match longname {
            Some(longname) if !longname.is_empty() => longname,
            _ => format_long_entry(
                &filename,
                owner.as_deref(),
                group.as_deref(),
                &attrs,
                SystemTime::now(),
            ),
        };

        Self {
            filename,
            owner,
            group,
            long_entry,
            attrs,
        }
    }

    /// Return filename of the dir entry.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Name of the owner, or the numeric uid if the server sent no
    /// `ls -l` line.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Name of the group, or the numeric gid if the server sent no
    /// `ls -l` line.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn uid(&self) -> Option<u32> {
        self.metadata().uid()
    }

    pub fn gid(&self) -> Option<u32> {
        self.metadata().gid()
    }

    /// Size in bytes.
    pub fn len(&self) -> Option<u64> {
        self.metadata().len()
    }

    pub fn permissions(&self) -> Option<Permissions> {
        self.metadata().permissions()
    }

    /// Return the file type for the dir entry.
    pub fn file_type(&self) -> Option<FileType> {
        self.metadata().file_type()
    }

    pub fn modified(&self) -> Option<UnixTimeStamp> {
        self.metadata().modified()
    }

    pub fn accessed(&self) -> Option<UnixTimeStamp> {
        self.metadata().accessed()
    }

    /// The `ls -l` style line sent by the server, or one formatted from the
    /// attributes if the server did not send any.
    pub fn long_entry(&self) -> &str {
        &self.long_entry
    }

    /// Return metadata for the dir entry.
    pub fn metadata(&self) -> MetaData {
        MetaData::new(self.attrs)
    }
}

/// Owner and group of an `ls -l` line, its third and fourth fields.
fn parse_owner_group(longname: &str) -> Option<(&str, &str)> {
    let mut fields = longname.split_whitespace();

    let _mode = fields.next()?;
    let _links = fields.next()?;
    let owner = fields.next()?;
    let group = fields.next()?;

    // Size, date and name must follow, else this is not an `ls -l` line.
    if fields.count() < 3 {
        return None;
    }

    Some((owner, group))
}

/// Roughly six months, the cutoff `ls` uses to print the year instead of
/// the time of day.
const RECENT: Duration = Duration::from_secs(182 * 24 * 60 * 60);

/// Format `attrs` the way openssh's `ls_file` does.
fn format_long_entry(
    filename: &str,
    owner: Option<&str>,
    group: Option<&str>,
    attrs: &FileAttrs,
    now: SystemTime,
) -> String {
    let metadata = MetaData::new(*attrs);

    let kind = metadata.file_type().map_or('?', |file_type| file_type.ls_char());
    let permissions = metadata.permissions().unwrap_or_default();

    let date = metadata
        .modified()
        .and_then(|mtime| {
            let time = DateTime::from_timestamp(mtime.into_raw().into(), 0)?;
            let recent = match now.duration_since(mtime.as_system_time()) {
                Ok(age) => age < RECENT,
                // In the future.
                Err(_) => false,
            };
            let format = if recent { "%b %e %H:%M" } else { "%b %e  %Y" };
            Some(time.format(format).to_string())
        })
        .unwrap_or_default();

    format!(
        "{kind}{permissions} {links:>3} {owner:<8} {group:<8} {size:>8} {date:>12} {filename}",
        links = 1,
        owner = owner.unwrap_or("?"),
        group = group.unwrap_or("?"),
        size = metadata.len().unwrap_or(0),
    )
}

impl<T: Transport> Fs<T> {
    /// List the directory at `path`.
    ///
    /// The entries `.` and `..` are left out. The returned entries are a
    /// snapshot; later changes to the directory do not affect them.
    ///
    /// Fails with [`Error::Directory`], carrying the server's status, if
    /// the directory cannot be opened.
    pub fn listing(&self, path: impl AsRef<Path>) -> Result<Vec<DirEntry>, Error> {
        let path = self.concat_path_if_needed(path.as_ref());
        self.read_entries(&path)
    }

    pub(super) fn read_entries(&self, path: &Path) -> Result<Vec<DirEntry>, Error> {
        let res = self.channel.acquire_lock().open_dir(path);
        let mut dir = res.map_err(|source| Error::Directory {
            path: path.into(),
            source,
        })?;

        let mut entries = Vec::new();

        let res = loop {
            let next = self.channel.acquire_lock().read_dir(&mut dir);

            match next {
                Ok(Some(entry)) => {
                    if entry.filename != "." && entry.filename != ".." {
                        entries.push(DirEntry::new(entry));
                    }
                }
                Ok(None) => break Ok(()),
                Err(source) => {
                    break Err(Error::Directory {
                        path: path.into(),
                        source,
                    })
                }
            }
        };

        let closed = self
            .channel
            .acquire_lock()
            .close_dir(dir)
            .map_err(|err| path_error(path, err));

        match (res, closed) {
            (Ok(()), Ok(())) => Ok(entries),
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Err(err), Err(close_err)) => Err(err.error_on_cleanup(close_err)),
        }
    }
}
