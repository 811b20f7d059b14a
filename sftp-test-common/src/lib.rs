//! Loopback sftp server and scripted credential supplier for the
//! integration tests of `sftp-folder`.
//!
//! [`LoopbackServer`] implements the transport traits in-process, mapping
//! the remote path `/a/b` onto `<root>/a/b` of a local sandbox. It panics
//! as soon as two transport calls of one session overlap, so every test
//! exercising it also checks the lock discipline of the crate.

use std::collections::{HashMap, HashSet, VecDeque};
use std::env;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;
use scopeguard::ScopeGuard;
use tempfile::TempDir;

use sftp_folder::{
    auth::{Challenge, AUTHENTICATION_FAILED, PUBLICKEY_UNVERIFIED},
    lowlevel::{
        AuthMethod, Connector, KeyPair, KeyboardInteractivePrompt, NameEntry, OpenFlags, Prompt,
        SftpHandle, Transport,
    },
    metadata::{FileAttrs, FileType, Permissions},
    AuthenticatedSession, ConnectionSpec, CredentialSupplier, Error, Overwrite,
    OverwriteConfirmation, Reply, SftpErrorKind, SftpOptions, TransportError, UnixTimeStamp,
};

pub const TEST_DATA: &[u8] = b"Humpty dumpty\nsat on the wall.\n\rHumpty dumpty\nhad a great fall.\n";

/// Transport calls of the loopback server, for [`LoopbackServer::call_count`]
/// and [`LoopbackServer::inject_fault`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Op {
    AuthMethods,
    UserAuth,
    OpenSftp,
    ShutdownSftp,
    Disconnect,
    OpenDir,
    ReadDir,
    CloseDir,
    Stat,
    Lstat,
    Rename,
    Unlink,
    Rmdir,
    Mkdir,
    Realpath,
    Readlink,
    Open,
    Read,
    Write,
    Fstat,
    Close,
}

#[derive(Debug)]
struct Config {
    user: String,
    methods: Vec<String>,
    password: String,
    prompts: Vec<String>,
    responses: Vec<String>,
    accepted_key: Option<PathBuf>,
    refuse_connections: bool,
    refuse_sftp: bool,
    long_entries: bool,
    owner: String,
    group: String,
    delay: Option<Duration>,
}

#[derive(Debug)]
struct Fault {
    op: Op,
    path: PathBuf,
    skip: usize,
}

#[derive(Debug)]
struct Shared {
    root: PathBuf,
    config: Mutex<Config>,
    calls: Mutex<HashMap<Op, usize>>,
    log: Mutex<Vec<(Op, PathBuf)>>,
    faults: Mutex<Vec<Fault>>,
    locked: Mutex<HashSet<PathBuf>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

type Busy<'a> = ScopeGuard<&'a AtomicBool, fn(&AtomicBool)>;

fn release(busy: &AtomicBool) {
    busy.store(false, Ordering::SeqCst);
}

fn sftp_error(err: io::Error) -> TransportError {
    let kind = match err.kind() {
        io::ErrorKind::NotFound => SftpErrorKind::NoSuchFile,
        io::ErrorKind::PermissionDenied => SftpErrorKind::PermissionDenied,
        // sftp v3 has no better status for the rest.
        _ => SftpErrorKind::Failure,
    };
    TransportError::sftp(kind, err.to_string())
}

fn failure(msg: &str) -> TransportError {
    TransportError::sftp(SftpErrorKind::Failure, msg)
}

fn attrs_of(metadata: &fs::Metadata) -> FileAttrs {
    let mut attrs = FileAttrs::new();
    attrs
        .set_size(metadata.size())
        .set_id(metadata.uid(), metadata.gid())
        .set_permissions(metadata.mode())
        .set_accessed(UnixTimeStamp::from_raw(
            u32::try_from(metadata.atime()).unwrap_or_default(),
        ))
        .set_modified(UnixTimeStamp::from_raw(
            u32::try_from(metadata.mtime()).unwrap_or_default(),
        ));
    attrs
}

impl Shared {
    fn config(&self) -> MutexGuard<'_, Config> {
        lock(&self.config)
    }

    fn local(&self, remote: &Path) -> PathBuf {
        self.root.join(remote.strip_prefix("/").unwrap_or(remote))
    }

    fn remote(&self, local: &Path) -> PathBuf {
        match local.strip_prefix(&self.root) {
            Ok(relative) => Path::new("/").join(relative),
            Err(_) => local.into(),
        }
    }

    /// Book-keeping shared by every transport call of one session.
    fn enter<'a>(&self, busy: &'a AtomicBool, op: Op, path: &Path) -> Result<Busy<'a>, TransportError> {
        if busy.swap(true, Ordering::SeqCst) {
            panic!("{op:?} on {path:?} overlaps another transport call of the session");
        }
        let busy = scopeguard::guard(busy, release as fn(&AtomicBool));

        *lock(&self.calls).entry(op).or_default() += 1;
        lock(&self.log).push((op, path.to_owned()));

        let delay = self.config().delay;
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        let mut faults = lock(&self.faults);
        if let Some(index) = faults
            .iter()
            .position(|fault| fault.op == op && fault.path == path)
        {
            if faults[index].skip > 0 {
                faults[index].skip -= 1;
            } else {
                faults.remove(index);
                return Err(failure("injected failure"));
            }
        }

        Ok(busy)
    }

    fn name_entry(&self, filename: String, metadata: &fs::Metadata) -> NameEntry {
        let attrs = attrs_of(metadata);

        let longname = {
            let config = self.config();
            config.long_entries.then(|| {
                let kind = FileType::from_mode(metadata.mode()).map_or('?', |kind| kind.ls_char());
                format!(
                    "{kind}{} {:>4} {:<8} {:<8} {:>8} Jan  1 00:00 {filename}",
                    Permissions::from_mode(metadata.mode()),
                    metadata.nlink(),
                    config.owner,
                    config.group,
                    metadata.size(),
                )
            })
        };

        NameEntry {
            filename,
            longname,
            attrs,
        }
    }
}

/// An in-process sftp server serving a local directory.
///
/// Clones share the same state, so a test can keep one to inspect the
/// server while the session owns another.
#[derive(Debug, Clone)]
pub struct LoopbackServer {
    shared: Arc<Shared>,
}

impl LoopbackServer {
    /// Serve `root`, accepting user `swish` with password `secret` over
    /// the `password` method.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root
            .as_ref()
            .canonicalize()
            .expect("Failed to canonicalize the server root");

        Self {
            shared: Arc::new(Shared {
                root,
                config: Mutex::new(Config {
                    user: "swish".into(),
                    methods: vec!["password".into()],
                    password: "secret".into(),
                    prompts: vec!["Password: ".into()],
                    responses: vec!["secret".into()],
                    accepted_key: None,
                    refuse_connections: false,
                    refuse_sftp: false,
                    long_entries: true,
                    owner: "swish".into(),
                    group: "wheel".into(),
                    delay: None,
                }),
                calls: Mutex::default(),
                log: Mutex::default(),
                faults: Mutex::default(),
                locked: Mutex::default(),
            }),
        }
    }

    /// Authentication methods advertised, in this order. An empty list
    /// lets every user in with the `none` method.
    #[must_use]
    pub fn methods(self, methods: &[&str]) -> Self {
        self.shared.config().methods = methods.iter().map(|&method| method.into()).collect();
        self
    }

    #[must_use]
    pub fn password(self, password: &str) -> Self {
        self.shared.config().password = password.into();
        self
    }

    /// Keyboard-interactive prompts and the responses they expect.
    #[must_use]
    pub fn challenge(self, prompts: &[&str], responses: &[&str]) -> Self {
        let mut config = self.shared.config();
        config.prompts = prompts.iter().map(|&prompt| prompt.into()).collect();
        config.responses = responses.iter().map(|&response| response.into()).collect();
        drop(config);
        self
    }

    /// Private key file accepted by the `publickey` method.
    #[must_use]
    pub fn accepted_key(self, private_key: impl Into<PathBuf>) -> Self {
        self.shared.config().accepted_key = Some(private_key.into());
        self
    }

    #[must_use]
    pub fn refuse_connections(self) -> Self {
        self.shared.config().refuse_connections = true;
        self
    }

    #[must_use]
    pub fn refuse_sftp(self) -> Self {
        self.shared.config().refuse_sftp = true;
        self
    }

    /// Whether directory entries carry an `ls -l` line.
    #[must_use]
    pub fn long_entries(self, long_entries: bool) -> Self {
        self.shared.config().long_entries = long_entries;
        self
    }

    /// Owner and group names printed in `ls -l` lines.
    #[must_use]
    pub fn owner(self, owner: &str, group: &str) -> Self {
        let mut config = self.shared.config();
        config.owner = owner.into();
        config.group = group.into();
        drop(config);
        self
    }

    /// Make every transport call take at least `delay`.
    #[must_use]
    pub fn slow_calls(self, delay: Duration) -> Self {
        self.shared.config().delay = Some(delay);
        self
    }

    pub fn user(&self) -> String {
        self.shared.config().user.clone()
    }

    /// Local directory served as `/`.
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Reads of `path` fail as if another process held a lock on it.
    pub fn lock_file(&self, path: impl Into<PathBuf>) {
        lock(&self.shared.locked).insert(path.into());
    }

    pub fn unlock_file(&self, path: impl AsRef<Path>) {
        lock(&self.shared.locked).remove(path.as_ref());
    }

    /// Fail the call `op` on `path` once, after letting `skip` matching
    /// calls through.
    pub fn inject_fault(&self, op: Op, path: impl Into<PathBuf>, skip: usize) {
        lock(&self.shared.faults).push(Fault {
            op,
            path: path.into(),
            skip,
        });
    }

    /// How many times `op` was called, failed calls included.
    pub fn call_count(&self, op: Op) -> usize {
        lock(&self.shared.calls).get(&op).copied().unwrap_or(0)
    }

    /// Every call made so far with the path it was made on, in the order
    /// the server handled them.
    pub fn call_log(&self) -> Vec<(Op, PathBuf)> {
        lock(&self.shared.log).clone()
    }

    /// Clear both the call counts and the call log.
    pub fn reset_call_counts(&self) {
        lock(&self.shared.calls).clear();
        lock(&self.shared.log).clear();
    }
}

impl Connector for LoopbackServer {
    type Transport = LoopbackTransport;

    fn connect(&self, _host: &str, _port: u16) -> Result<LoopbackTransport, TransportError> {
        if self.shared.config().refuse_connections {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "Connection refused").into());
        }

        Ok(LoopbackTransport {
            shared: Arc::clone(&self.shared),
            busy: Arc::new(AtomicBool::new(false)),
            authenticated: false,
        })
    }
}

/// One session with a [`LoopbackServer`].
#[derive(Debug)]
pub struct LoopbackTransport {
    shared: Arc<Shared>,
    busy: Arc<AtomicBool>,
    authenticated: bool,
}

/// Outcome of one authentication attempt.
fn verdict(accepted: bool, code: i32) -> Result<(), TransportError> {
    if accepted {
        Ok(())
    } else {
        Err(TransportError::session(code, "Authentication failed"))
    }
}

impl Transport for LoopbackTransport {
    type Sftp = LoopbackSftp;

    fn auth_methods(&mut self, _username: &str) -> Result<Vec<AuthMethod>, TransportError> {
        let _busy = self.shared.enter(&self.busy, Op::AuthMethods, Path::new(""))?;

        let methods = self.shared.config().methods.join(",");
        if methods.is_empty() {
            self.authenticated = true;
        }
        Ok(AuthMethod::parse_list(&methods))
    }

    fn authenticated(&self) -> bool {
        self.authenticated
    }

    fn userauth_password(&mut self, username: &str, password: &str) -> Result<(), TransportError> {
        let _busy = self.shared.enter(&self.busy, Op::UserAuth, Path::new(""))?;

        let accepted = {
            let config = self.shared.config();
            config.user == username && config.password == password
        };
        verdict(accepted, AUTHENTICATION_FAILED)?;
        self.authenticated = true;
        Ok(())
    }

    fn userauth_keyboard_interactive(
        &mut self,
        username: &str,
        prompter: &mut dyn KeyboardInteractivePrompt,
    ) -> Result<(), TransportError> {
        let _busy = self.shared.enter(&self.busy, Op::UserAuth, Path::new(""))?;

        let (user, prompts, expected) = {
            let config = self.shared.config();
            (
                config.user.clone(),
                config.prompts.clone(),
                config.responses.clone(),
            )
        };
        let prompts: Vec<_> = prompts
            .into_iter()
            .map(|text| Prompt {
                text: text.into(),
                echo: false,
            })
            .collect();

        let responses = prompter.prompt(username, "", &prompts);
        verdict(user == username && responses == expected, AUTHENTICATION_FAILED)?;
        self.authenticated = true;
        Ok(())
    }

    fn userauth_pubkey(&mut self, username: &str, key: &KeyPair) -> Result<(), TransportError> {
        let _busy = self.shared.enter(&self.busy, Op::UserAuth, Path::new(""))?;

        let accepted = {
            let config = self.shared.config();
            config.user == username && config.accepted_key.as_deref() == Some(&*key.private_key)
        };
        verdict(accepted, PUBLICKEY_UNVERIFIED)?;
        self.authenticated = true;
        Ok(())
    }

    fn open_sftp(&mut self) -> Result<LoopbackSftp, TransportError> {
        let _busy = self.shared.enter(&self.busy, Op::OpenSftp, Path::new(""))?;

        if !self.authenticated {
            return Err(TransportError::session(-21, "Channel open failure"));
        }
        if self.shared.config().refuse_sftp {
            return Err(TransportError::session(-31, "Unable to request sftp subsystem"));
        }

        Ok(LoopbackSftp {
            shared: Arc::clone(&self.shared),
            busy: Arc::clone(&self.busy),
        })
    }

    fn shutdown_sftp(&mut self, _sftp: LoopbackSftp) -> Result<(), TransportError> {
        let _busy = self.shared.enter(&self.busy, Op::ShutdownSftp, Path::new(""))?;
        Ok(())
    }

    fn disconnect(&mut self, _description: &str) -> Result<(), TransportError> {
        let _busy = self.shared.enter(&self.busy, Op::Disconnect, Path::new(""))?;
        self.authenticated = false;
        Ok(())
    }
}

/// Sftp channel of a [`LoopbackTransport`].
#[derive(Debug)]
pub struct LoopbackSftp {
    shared: Arc<Shared>,
    busy: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct LoopbackFile {
    file: fs::File,
    path: PathBuf,
}

/// Entries are read when the directory is opened, `.` and `..` first.
#[derive(Debug)]
pub struct LoopbackDir {
    path: PathBuf,
    entries: VecDeque<NameEntry>,
}

impl LoopbackSftp {
    fn enter(&self, op: Op, path: &Path) -> Result<Busy<'_>, TransportError> {
        self.shared.enter(&self.busy, op, path)
    }

    fn local(&self, remote: &Path) -> PathBuf {
        self.shared.local(remote)
    }
}

impl SftpHandle for LoopbackSftp {
    type File = LoopbackFile;
    type Dir = LoopbackDir;

    fn open_dir(&mut self, path: &Path) -> Result<LoopbackDir, TransportError> {
        let _busy = self.enter(Op::OpenDir, path)?;

        let local = self.local(path);
        let metadata = fs::metadata(&local).map_err(sftp_error)?;
        if !metadata.is_dir() {
            return Err(failure("Not a directory"));
        }

        let mut children = Vec::new();
        for entry in fs::read_dir(&local).map_err(sftp_error)? {
            let entry = entry.map_err(sftp_error)?;
            let metadata = entry.path().symlink_metadata().map_err(sftp_error)?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            children.push(self.shared.name_entry(filename, &metadata));
        }
        children.sort_by(|a, b| a.filename.cmp(&b.filename));

        let parent = local
            .parent()
            .and_then(|parent| fs::metadata(parent).ok())
            .unwrap_or_else(|| metadata.clone());

        let mut entries = VecDeque::with_capacity(children.len() + 2);
        entries.push_back(self.shared.name_entry(".".into(), &metadata));
        entries.push_back(self.shared.name_entry("..".into(), &parent));
        entries.extend(children);

        Ok(LoopbackDir {
            path: path.into(),
            entries,
        })
    }

    fn read_dir(&mut self, dir: &mut LoopbackDir) -> Result<Option<NameEntry>, TransportError> {
        let _busy = self.enter(Op::ReadDir, &dir.path)?;
        Ok(dir.entries.pop_front())
    }

    fn close_dir(&mut self, dir: LoopbackDir) -> Result<(), TransportError> {
        let _busy = self.enter(Op::CloseDir, &dir.path)?;
        Ok(())
    }

    fn stat(&mut self, path: &Path) -> Result<FileAttrs, TransportError> {
        let _busy = self.enter(Op::Stat, path)?;
        fs::metadata(self.local(path))
            .map(|metadata| attrs_of(&metadata))
            .map_err(sftp_error)
    }

    fn lstat(&mut self, path: &Path) -> Result<FileAttrs, TransportError> {
        let _busy = self.enter(Op::Lstat, path)?;
        fs::symlink_metadata(self.local(path))
            .map(|metadata| attrs_of(&metadata))
            .map_err(sftp_error)
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), TransportError> {
        let _busy = self.enter(Op::Rename, from)?;

        let to = self.local(to);
        // Like openssh's sftp-server without the posix-rename extension.
        if to.symlink_metadata().is_ok() {
            return Err(failure("Failure"));
        }
        fs::rename(self.local(from), to).map_err(sftp_error)
    }

    fn unlink(&mut self, path: &Path) -> Result<(), TransportError> {
        let _busy = self.enter(Op::Unlink, path)?;
        fs::remove_file(self.local(path)).map_err(sftp_error)
    }

    fn rmdir(&mut self, path: &Path) -> Result<(), TransportError> {
        let _busy = self.enter(Op::Rmdir, path)?;
        fs::remove_dir(self.local(path)).map_err(sftp_error)
    }

    fn mkdir(&mut self, path: &Path, mode: u32) -> Result<(), TransportError> {
        let _busy = self.enter(Op::Mkdir, path)?;
        DirBuilder::new()
            .mode(mode)
            .create(self.local(path))
            .map_err(sftp_error)
    }

    fn realpath(&mut self, path: &Path) -> Result<PathBuf, TransportError> {
        let _busy = self.enter(Op::Realpath, path)?;
        let local = self.local(path).canonicalize().map_err(sftp_error)?;
        Ok(self.shared.remote(&local))
    }

    fn readlink(&mut self, path: &Path) -> Result<PathBuf, TransportError> {
        let _busy = self.enter(Op::Readlink, path)?;
        let target = fs::read_link(self.local(path)).map_err(sftp_error)?;
        Ok(self.shared.remote(&target))
    }

    fn open(
        &mut self,
        path: &Path,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<LoopbackFile, TransportError> {
        let _busy = self.enter(Op::Open, path)?;

        let file = OpenOptions::new()
            .read(flags.read)
            .write(flags.write && !flags.append)
            .append(flags.append)
            .create(flags.create && !flags.exclusive)
            .create_new(flags.exclusive)
            .truncate(flags.truncate && !flags.append)
            .mode(mode)
            .open(self.local(path))
            .map_err(sftp_error)?;

        Ok(LoopbackFile {
            file,
            path: path.into(),
        })
    }

    fn read(
        &mut self,
        file: &mut LoopbackFile,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        let _busy = self.enter(Op::Read, &file.path)?;

        if lock(&self.shared.locked).contains(&file.path) {
            return Err(failure("The process cannot access the file because it is locked"));
        }
        file.file.read_at(buf, offset).map_err(sftp_error)
    }

    fn write(
        &mut self,
        file: &mut LoopbackFile,
        offset: u64,
        buf: &[u8],
    ) -> Result<usize, TransportError> {
        let _busy = self.enter(Op::Write, &file.path)?;
        file.file.write_at(buf, offset).map_err(sftp_error)
    }

    fn fstat(&mut self, file: &mut LoopbackFile) -> Result<FileAttrs, TransportError> {
        let _busy = self.enter(Op::Fstat, &file.path)?;
        file.file
            .metadata()
            .map(|metadata| attrs_of(&metadata))
            .map_err(sftp_error)
    }

    fn close(&mut self, file: LoopbackFile) -> Result<(), TransportError> {
        let _busy = self.enter(Op::Close, &file.path)?;
        Ok(())
    }
}

/// How [`MockConsumer`] answers password requests.
#[derive(Debug, Clone)]
pub enum PasswordBehaviour {
    CustomPassword(String),
    WrongPassword,
    SkipPassword,
    AbortPassword,
    /// Panic, for tests where a password request is a bug.
    FailPassword,
}

/// How [`MockConsumer`] answers keyboard-interactive prompts.
#[derive(Debug, Clone)]
pub enum KeyboardInteractiveBehaviour {
    CustomResponse(Vec<String>),
    WrongResponse,
    SkipResponse,
    AbortResponse,
}

/// How [`MockConsumer`] answers public key requests.
#[derive(Debug, Clone)]
pub enum PublicKeyBehaviour {
    CustomKeys(KeyPair),
    SkipKeys,
    AbortKeys,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConfirmOverwriteBehaviour {
    AllowOverwrite,
    PreventOverwrite,
}

/// Scripted stand-in for the user answering authentication and overwrite
/// questions.
#[derive(Debug, Clone)]
pub struct MockConsumer {
    pub password_behaviour: PasswordBehaviour,
    pub keyboard_interactive_behaviour: KeyboardInteractiveBehaviour,
    pub public_key_behaviour: PublicKeyBehaviour,
    pub confirm_overwrite_behaviour: ConfirmOverwriteBehaviour,
    pub max_attempts: u32,
    pub requests: Requests,
}

/// What a [`MockConsumer`] has been asked so far.
#[derive(Debug, Clone, Default)]
pub struct Requests {
    password: u32,
    keyboard_interactive: u32,
    public_key: u32,
    confirmed_overwrites: Vec<(PathBuf, PathBuf)>,
}

impl Default for MockConsumer {
    fn default() -> Self {
        Self {
            password_behaviour: PasswordBehaviour::FailPassword,
            keyboard_interactive_behaviour: KeyboardInteractiveBehaviour::SkipResponse,
            public_key_behaviour: PublicKeyBehaviour::SkipKeys,
            confirm_overwrite_behaviour: ConfirmOverwriteBehaviour::PreventOverwrite,
            max_attempts: 1,
            requests: Requests::default(),
        }
    }
}

impl MockConsumer {
    /// Supplies `password` and nothing else.
    pub fn with_password(password: &str) -> Self {
        Self {
            password_behaviour: PasswordBehaviour::CustomPassword(password.into()),
            ..Self::default()
        }
    }

    pub fn password_requests(&self) -> u32 {
        self.requests.password
    }

    pub fn keyboard_interactive_requests(&self) -> u32 {
        self.requests.keyboard_interactive
    }

    pub fn public_key_requests(&self) -> u32 {
        self.requests.public_key
    }

    pub fn was_asked_to_confirm_overwrite(&self) -> bool {
        !self.requests.confirmed_overwrites.is_empty()
    }

    /// `(from, to)` of every overwrite confirmation asked.
    pub fn confirmed_overwrites(&self) -> &[(PathBuf, PathBuf)] {
        &self.requests.confirmed_overwrites
    }
}

impl CredentialSupplier for MockConsumer {
    fn attempt_budget(&self, _method: &AuthMethod) -> u32 {
        self.max_attempts
    }

    fn offer_password(&mut self, _challenge: &Challenge<'_>) -> Reply<String> {
        self.requests.password += 1;

        match &self.password_behaviour {
            PasswordBehaviour::CustomPassword(password) => Reply::Credential(password.clone()),
            PasswordBehaviour::WrongPassword => Reply::Credential("this is the wrong password".into()),
            PasswordBehaviour::SkipPassword => Reply::NextMethod,
            PasswordBehaviour::AbortPassword => Reply::Abort,
            PasswordBehaviour::FailPassword => panic!("Unexpected call to offer_password"),
        }
    }

    fn offer_keyboard_interactive(
        &mut self,
        _challenge: &Challenge<'_>,
        _instructions: &str,
        prompts: &[Prompt<'_>],
    ) -> Reply<Vec<String>> {
        self.requests.keyboard_interactive += 1;

        match &self.keyboard_interactive_behaviour {
            KeyboardInteractiveBehaviour::CustomResponse(responses) => {
                Reply::Credential(responses.clone())
            }
            KeyboardInteractiveBehaviour::WrongResponse => {
                Reply::Credential(vec!["wrong response".into(); prompts.len()])
            }
            KeyboardInteractiveBehaviour::SkipResponse => Reply::NextMethod,
            KeyboardInteractiveBehaviour::AbortResponse => Reply::Abort,
        }
    }

    fn offer_public_key(&mut self, _challenge: &Challenge<'_>) -> Reply<KeyPair> {
        self.requests.public_key += 1;

        match &self.public_key_behaviour {
            PublicKeyBehaviour::CustomKeys(key) => Reply::Credential(key.clone()),
            PublicKeyBehaviour::SkipKeys => Reply::NextMethod,
            PublicKeyBehaviour::AbortKeys => Reply::Abort,
        }
    }
}

impl OverwriteConfirmation for MockConsumer {
    fn confirm_overwrite(&mut self, from: &Path, to: &Path) -> Overwrite {
        self.requests.confirmed_overwrites.push((from.into(), to.into()));

        match self.confirm_overwrite_behaviour {
            ConfirmOverwriteBehaviour::AllowOverwrite => Overwrite::Allow,
            ConfirmOverwriteBehaviour::PreventOverwrite => Overwrite::Deny,
        }
    }
}

fn get_path_for_tmp_files() -> &'static Path {
    static RUNTIME_DIR: OnceCell<PathBuf> = OnceCell::new();

    RUNTIME_DIR.get_or_init(|| {
        env::var_os("RUNTIME_DIR")
            .map(|dir| {
                PathBuf::from(dir)
                    .canonicalize()
                    .expect("Failed to canonicalize $RUNTIME_DIR")
            })
            .unwrap_or_else(env::temp_dir)
    })
}

/// Local directory served by a [`LoopbackServer`], removed on drop.
#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::Builder::new()
            .prefix("sftp_folder")
            .tempdir_in(get_path_for_tmp_files())
            .expect("Failed to create sandbox");
        Self { dir }
    }

    /// A server serving this sandbox as `/`.
    pub fn server(&self) -> LoopbackServer {
        LoopbackServer::new(self.dir.path())
    }

    /// Local path of the remote path `remote`.
    pub fn local(&self, remote: impl AsRef<Path>) -> PathBuf {
        let remote = remote.as_ref();
        self.dir
            .path()
            .join(remote.strip_prefix("/").unwrap_or(remote))
    }

    pub fn write_file(&self, remote: impl AsRef<Path>, content: &[u8]) {
        fs::write(self.local(remote), content).expect("Failed to write sandbox file");
    }

    pub fn read_file(&self, remote: impl AsRef<Path>) -> Vec<u8> {
        fs::read(self.local(remote)).expect("Failed to read sandbox file")
    }

    pub fn make_dir(&self, remote: impl AsRef<Path>) {
        fs::create_dir_all(self.local(remote)).expect("Failed to create sandbox directory");
    }

    pub fn symlink(&self, target: impl AsRef<Path>, remote: impl AsRef<Path>) {
        std::os::unix::fs::symlink(target, self.local(remote))
            .expect("Failed to create sandbox symlink");
    }

    pub fn exists(&self, remote: impl AsRef<Path>) -> bool {
        self.local(remote).symlink_metadata().is_ok()
    }

    /// Names in the directory `remote`, sorted.
    pub fn names(&self, remote: impl AsRef<Path>) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(self.local(remote))
            .expect("Failed to list sandbox directory")
            .map(|entry| {
                entry
                    .expect("Failed to read sandbox entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Connect to `server` as its user, authenticating with `consumer`.
pub fn connect(
    server: &LoopbackServer,
    consumer: &mut MockConsumer,
) -> Result<AuthenticatedSession<LoopbackTransport>, Error> {
    ConnectionSpec::new("localhost", server.user()).create_session(
        server,
        consumer,
        SftpOptions::new(),
    )
}

/// Connect with the server's default password.
pub fn connect_with_password(server: &LoopbackServer) -> AuthenticatedSession<LoopbackTransport> {
    connect_with_options(server, SftpOptions::new())
}

/// Connect with the server's default password and the given channel options.
pub fn connect_with_options(
    server: &LoopbackServer,
    options: SftpOptions,
) -> AuthenticatedSession<LoopbackTransport> {
    ConnectionSpec::new("localhost", server.user())
        .create_session(server, &mut MockConsumer::with_password("secret"), options)
        .expect("Failed to connect")
}
