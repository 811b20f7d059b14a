use super::{
    constants::{
        S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK, S_ISGID, S_ISUID,
        S_ISVTX,
    },
    UnixTimeStamp,
};

use std::fmt;

/// Attributes of a remote file, as carried by sftp v3 `ATTRS`.
///
/// Every field is optional since the server decides which ones it sends.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct FileAttrs {
    size: Option<u64>,
    id: Option<(u32, u32)>,
    permissions: Option<u32>,
    accessed: Option<UnixTimeStamp>,
    modified: Option<UnixTimeStamp>,
}

impl FileAttrs {
    /// Create attributes with no field set.
    pub const fn new() -> Self {
        Self {
            size: None,
            id: None,
            permissions: None,
            accessed: None,
            modified: None,
        }
    }

    /// Set size in bytes.
    pub fn set_size(&mut self, size: u64) -> &mut Self {
        self.size = Some(size);
        self
    }

    /// Set uid and gid.
    pub fn set_id(&mut self, uid: u32, gid: u32) -> &mut Self {
        self.id = Some((uid, gid));
        self
    }

    /// Set the raw `st_mode`, file type bits included.
    pub fn set_permissions(&mut self, mode: u32) -> &mut Self {
        self.permissions = Some(mode);
        self
    }

    /// Set last access time.
    pub fn set_accessed(&mut self, accessed: UnixTimeStamp) -> &mut Self {
        self.accessed = Some(accessed);
        self
    }

    /// Set last modification time.
    pub fn set_modified(&mut self, modified: UnixTimeStamp) -> &mut Self {
        self.modified = Some(modified);
        self
    }

    pub fn get_size(&self) -> Option<u64> {
        self.size
    }

    pub fn get_id(&self) -> Option<(u32, u32)> {
        self.id
    }

    /// The raw `st_mode`.
    pub fn get_permissions(&self) -> Option<u32> {
        self.permissions
    }

    pub fn get_accessed(&self) -> Option<UnixTimeStamp> {
        self.accessed
    }

    pub fn get_modified(&self) -> Option<UnixTimeStamp> {
        self.modified
    }
}

/// Metadata information about a file.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MetaData(FileAttrs);

#[allow(clippy::len_without_is_empty)]
impl MetaData {
    pub fn new(attrs: FileAttrs) -> Self {
        Self(attrs)
    }

    pub fn into_inner(self) -> FileAttrs {
        self.0
    }

    /// Returns the size of the file in bytes.
    ///
    /// Return `None` if the server did not return
    /// the size.
    pub fn len(&self) -> Option<u64> {
        self.0.get_size()
    }

    /// Returns the user ID of the owner.
    ///
    /// Return `None` if the server did not return
    /// the uid.
    pub fn uid(&self) -> Option<u32> {
        self.0.get_id().map(|(uid, _gid)| uid)
    }

    /// Returns the group ID of the owner.
    ///
    /// Return `None` if the server did not return
    /// the gid.
    pub fn gid(&self) -> Option<u32> {
        self.0.get_id().map(|(_uid, gid)| gid)
    }

    /// Returns the permissions.
    ///
    /// Return `None` if the server did not return
    /// the permissions.
    pub fn permissions(&self) -> Option<Permissions> {
        self.0.get_permissions().map(Permissions::from_mode)
    }

    /// Returns the file type.
    ///
    /// Return `None` if the server did not return the permissions or
    /// they carry no recognisable type bits.
    pub fn file_type(&self) -> Option<FileType> {
        self.0.get_permissions().and_then(FileType::from_mode)
    }

    /// Returns the last access time.
    ///
    /// Return `None` if the server did not return
    /// the last access time.
    pub fn accessed(&self) -> Option<UnixTimeStamp> {
        self.0.get_accessed()
    }

    /// Returns the last modification time.
    ///
    /// Return `None` if the server did not return
    /// the last modification time.
    pub fn modified(&self) -> Option<UnixTimeStamp> {
        self.0.get_modified()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
enum Kind {
    Directory,
    RegularFile,
    Symlink,
    Fifo,
    Socket,
    BlockDevice,
    CharacterDevice,
}

/// A structure representing a type of file with accessors for each file type.
/// It is returned by [`MetaData::file_type`] method.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FileType(Kind);

impl FileType {
    /// Extract the file type from the type bits of `mode`.
    pub fn from_mode(mode: u32) -> Option<Self> {
        let kind = match mode & S_IFMT {
            S_IFDIR => Kind::Directory,
            S_IFREG => Kind::RegularFile,
            S_IFLNK => Kind::Symlink,
            S_IFIFO => Kind::Fifo,
            S_IFSOCK => Kind::Socket,
            S_IFBLK => Kind::BlockDevice,
            S_IFCHR => Kind::CharacterDevice,
            _ => return None,
        };
        Some(Self(kind))
    }

    /// Tests whether this file type represents a directory.
    pub fn is_dir(&self) -> bool {
        self.0 == Kind::Directory
    }

    /// Tests whether this file type represents a regular file.
    pub fn is_file(&self) -> bool {
        self.0 == Kind::RegularFile
    }

    /// Tests whether this file type represents a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.0 == Kind::Symlink
    }

    /// Tests whether this file type represents a fifo.
    pub fn is_fifo(&self) -> bool {
        self.0 == Kind::Fifo
    }

    /// Tests whether this file type represents a socket.
    pub fn is_socket(&self) -> bool {
        self.0 == Kind::Socket
    }

    /// Tests whether this file type represents a block device.
    pub fn is_block_device(&self) -> bool {
        self.0 == Kind::BlockDevice
    }

    /// Tests whether this file type represents a character device.
    pub fn is_char_device(&self) -> bool {
        self.0 == Kind::CharacterDevice
    }

    /// Character `ls -l` prints in front of the permission bits.
    pub fn ls_char(&self) -> char {
        match self.0 {
            Kind::Directory => 'd',
            Kind::RegularFile => '-',
            Kind::Symlink => 'l',
            Kind::Fifo => 'p',
            Kind::Socket => 's',
            Kind::BlockDevice => 'b',
            Kind::CharacterDevice => 'c',
        }
    }
}

/// Representation of the various permissions on a file.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Permissions(u32);

macro_rules! impl_getter_setter {
    ($getter_name:ident, $setter_name:ident, $bit:expr, $variant_name:expr) => {
        #[doc = "Tests whether "]
        #[doc = $variant_name]
        #[doc = " bit is set."]
        pub fn $getter_name(&self) -> bool {
            self.0 & $bit != 0
        }

        #[doc = "Modify the "]
        #[doc = $variant_name]
        #[doc = " bit."]
        pub fn $setter_name(&mut self, value: bool) -> &mut Self {
            if value {
                self.0 |= $bit;
            } else {
                self.0 &= !$bit;
            }
            self
        }
    };
}

impl Permissions {
    /// Create a new permissions object with zero permissions
    /// set.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Keep the permission bits of a raw `st_mode`, dropping the type bits.
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & 0o7777)
    }

    /// Permission bits as a number, e.g. `0o644`.
    pub const fn mode(&self) -> u32 {
        self.0
    }

    impl_getter_setter!(suid, set_suid, S_ISUID, "set-user-id");
    impl_getter_setter!(sgid, set_sgid, S_ISGID, "set-group-id");
    impl_getter_setter!(svtx, set_vtx, S_ISVTX, "set-sticky-bit");

    impl_getter_setter!(read_by_owner, set_read_by_owner, 0o400, "read by owner");
    impl_getter_setter!(write_by_owner, set_write_by_owner, 0o200, "write by owner");
    impl_getter_setter!(
        execute_by_owner,
        set_execute_by_owner,
        0o100,
        "execute by owner"
    );

    impl_getter_setter!(read_by_group, set_read_by_group, 0o40, "read by group");
    impl_getter_setter!(write_by_group, set_write_by_group, 0o20, "write by group");
    impl_getter_setter!(
        execute_by_group,
        set_execute_by_group,
        0o10,
        "execute by group"
    );

    impl_getter_setter!(read_by_other, set_read_by_other, 0o4, "read by other");
    impl_getter_setter!(write_by_other, set_write_by_other, 0o2, "write by other");
    impl_getter_setter!(
        execute_by_other,
        set_execute_by_other,
        0o1,
        "execute by other"
    );

    /// Returns `true` if these permissions describe an unwritable file
    /// that no one can write to.
    pub fn readonly(&self) -> bool {
        !self.write_by_owner() && !self.write_by_group() && !self.write_by_other()
    }

    /// Modifies the readonly flag for this set of permissions.
    ///
    /// If the readonly argument is true, it will remove write permissions
    /// from all parties.
    ///
    /// Conversely, if it's false, it will permit writing from all parties.
    ///
    /// This operation does not modify the filesystem.
    pub fn set_readonly(&mut self, readonly: bool) {
        let writable = !readonly;

        self.set_write_by_owner(writable);
        self.set_write_by_group(writable);
        self.set_write_by_other(writable);
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u16> for Permissions {
    /// Converts numeric file mode bits permission into a [`Permissions`] object.
    ///
    /// The [numerical file mode bits](https://www.gnu.org/software/coreutils/manual/html_node/Numeric-Modes.html)
    /// are the usual `4000` setuid, `2000` setgid, `1000` sticky, then three
    /// `rwx` triplets for owner, group and others.
    fn from(octet: u16) -> Self {
        Self::from_mode(octet.into())
    }
}

impl fmt::Display for Permissions {
    /// Nine `rwx` characters the way `ls -l` prints them, including the
    /// `s`/`S` and `t`/`T` special bits.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn triplet(read: bool, write: bool, exec: bool, special: bool, marker: char) -> [char; 3] {
            let exec = match (exec, special) {
                (true, true) => marker,
                (false, true) => marker.to_ascii_uppercase(),
                (true, false) => 'x',
                (false, false) => '-',
            };
            [
                if read { 'r' } else { '-' },
                if write { 'w' } else { '-' },
                exec,
            ]
        }

        let owner = triplet(
            self.read_by_owner(),
            self.write_by_owner(),
            self.execute_by_owner(),
            self.suid(),
            's',
        );
        let group = triplet(
            self.read_by_group(),
            self.write_by_group(),
            self.execute_by_group(),
            self.sgid(),
            's',
        );
        let other = triplet(
            self.read_by_other(),
            self.write_by_other(),
            self.execute_by_other(),
            self.svtx(),
            't',
        );

        let bits: String = owner.iter().chain(&group).chain(&other).collect();
        f.write_str(&bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_from_mode() {
        assert!(FileType::from_mode(0o040755).unwrap().is_dir());
        assert!(FileType::from_mode(0o100644).unwrap().is_file());
        assert!(FileType::from_mode(0o120777).unwrap().is_symlink());
        assert_eq!(FileType::from_mode(0o644), None);
    }

    #[test]
    fn permissions_display_like_ls() {
        assert_eq!(Permissions::from(0o644).to_string(), "rw-r--r--");
        assert_eq!(Permissions::from(0o4755).to_string(), "rwsr-xr-x");
        assert_eq!(Permissions::from(0o1777).to_string(), "rwxrwxrwt");
        assert_eq!(Permissions::from(0o2644).to_string(), "rw-r-Sr--");
    }

    #[test]
    fn setters_toggle_bits() {
        let mut perm = Permissions::from(0o644);
        assert!(!perm.readonly());
        perm.set_readonly(true);
        assert_eq!(perm.mode(), 0o444);
        perm.set_execute_by_owner(true).set_suid(true);
        assert_eq!(perm.mode(), 0o4544);
    }

    #[test]
    fn metadata_strips_type_bits_from_permissions() {
        let mut attrs = FileAttrs::new();
        attrs.set_permissions(0o100640).set_size(767);
        let metadata = MetaData::new(attrs);

        assert_eq!(metadata.permissions().unwrap().mode(), 0o640);
        assert!(metadata.file_type().unwrap().is_file());
        assert_eq!(metadata.len(), Some(767));
        assert_eq!(metadata.uid(), None);
    }
}
