macro_rules! def_constants {
    ( $name:ident, $val:literal ) => {
        pub(crate) const $name: u32 = $val;
    };
}

// file type bits of the permissions attribute
def_constants!(S_IFMT, 0o170000);
def_constants!(S_IFSOCK, 0o140000);
def_constants!(S_IFLNK, 0o120000);
def_constants!(S_IFREG, 0o100000);
def_constants!(S_IFBLK, 0o060000);
def_constants!(S_IFDIR, 0o040000);
def_constants!(S_IFCHR, 0o020000);
def_constants!(S_IFIFO, 0o010000);

// permission bits
def_constants!(S_ISUID, 0o4000);
def_constants!(S_ISGID, 0o2000);
def_constants!(S_ISVTX, 0o1000);

// mode of newly created directories and files, before the server's umask
def_constants!(DEFAULT_DIR_MODE, 0o755);
def_constants!(DEFAULT_FILE_MODE, 0o644);

/// Suffix appended to an obstructing target while an overwriting rename
/// moves it out of the way.
pub const RENAME_TEMP_SUFFIX: &str = ".swish_rename_temp";

/// How many alternative temporary names are tried when the plain
/// `<target>.swish_rename_temp` is already taken.
pub(crate) const MAX_RENAME_TEMP_CANDIDATES: usize = 64;
