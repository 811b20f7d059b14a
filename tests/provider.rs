use sftp_folder::{file::OpenMode, Error, Overwrite, Provider, SftpErrorKind, RENAME_TEMP_SUFFIX};
use sftp_test_common::*;

use std::io::Read;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;

fn filenames<P: Provider>(provider: &P, path: &str) -> Vec<String> {
    provider
        .listing(Path::new(path))
        .unwrap()
        .iter()
        .map(|entry| entry.filename().to_owned())
        .collect()
}

fn allow_overwrite() -> MockConsumer {
    MockConsumer {
        confirm_overwrite_behaviour: ConfirmOverwriteBehaviour::AllowOverwrite,
        ..MockConsumer::default()
    }
}

#[test]
fn listing_returns_every_entry() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/a", b"first");
    sandbox.write_file("/b", TEST_DATA);
    sandbox.make_dir("/c");

    let server = sandbox.server();
    let session = connect_with_password(&server);

    let entries = session.fs().listing("/").unwrap();
    let names: Vec<_> = entries.iter().map(|entry| entry.filename()).collect();
    assert_eq!(names, ["a", "b", "c"]);

    let b = &entries[1];
    assert_eq!(b.len(), Some(TEST_DATA.len() as u64));
    assert_eq!(b.owner(), Some("swish"));
    assert_eq!(b.group(), Some("wheel"));
    assert!(b.file_type().unwrap().is_file());
    assert!(b.long_entry().ends_with(" b"));

    assert!(entries[2].file_type().unwrap().is_dir());
}

#[test]
fn listing_is_a_snapshot() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/A", b"a");
    sandbox.write_file("/B", b"b");

    let server = sandbox.server();
    let session = connect_with_password(&server);
    let fs = session.fs();

    let before = fs.listing("/").unwrap();
    assert_eq!(before.len(), 2);

    fs.remove_file("/B").unwrap();

    let after = fs.listing("/").unwrap();
    let after: Vec<_> = after.iter().map(|entry| entry.filename()).collect();
    assert_eq!(after, ["A"]);

    // Taken earlier, so still listing B.
    let before: Vec<_> = before.iter().map(|entry| entry.filename()).collect();
    assert_eq!(before, ["A", "B"]);
}

#[test]
fn listing_without_long_entries_synthesises_them() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/plain", TEST_DATA);

    let server = sandbox.server().long_entries(false);
    let session = connect_with_password(&server);

    let entries = session.fs().listing("/").unwrap();
    let entry = &entries[0];

    let uid = entry.uid().unwrap().to_string();
    assert_eq!(entry.owner(), Some(uid.as_str()));
    assert!(entry.long_entry().starts_with("-rw"), "{}", entry.long_entry());
    assert!(entry.long_entry().ends_with(" plain"), "{}", entry.long_entry());
}

#[test]
fn listing_missing_directory_fails_with_server_status() {
    let sandbox = Sandbox::new();
    let server = sandbox.server();
    let session = connect_with_password(&server);

    match session.fs().listing("/missing") {
        Err(Error::Directory { path, source }) => {
            assert_eq!(path, Path::new("/missing"));
            assert_eq!(source.sftp_kind(), Some(SftpErrorKind::NoSuchFile));
        }
        res => panic!("Unexpected result {res:?}"),
    }
}

#[test]
fn rename_without_obstruction_is_atomic() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/source", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);
    let mut consumer = MockConsumer::default();

    server.reset_call_counts();
    let replaced = session
        .fs()
        .rename("/source", "/target", &mut consumer)
        .unwrap();

    assert!(!replaced);
    assert_eq!(server.call_count(Op::Rename), 1);
    assert!(!consumer.was_asked_to_confirm_overwrite());
    assert!(!sandbox.exists("/source"));
    assert_eq!(sandbox.read_file("/target"), TEST_DATA);
}

#[test]
fn rename_over_file_when_allowed() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/source", TEST_DATA);
    sandbox.write_file("/target", b"obstruction");

    let server = sandbox.server();
    let session = connect_with_password(&server);
    let mut consumer = allow_overwrite();

    let replaced = session
        .fs()
        .rename("/source", "/target", &mut consumer)
        .unwrap();

    assert!(replaced);
    assert_eq!(
        consumer.confirmed_overwrites(),
        [(PathBuf::from("/source"), PathBuf::from("/target"))]
    );
    assert!(!sandbox.exists("/source"));
    assert_eq!(sandbox.read_file("/target"), TEST_DATA);
    assert_eq!(sandbox.names("/"), ["target"]);
}

#[test]
fn rename_over_directory_when_allowed() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/source", TEST_DATA);
    sandbox.make_dir("/target/nested/deeper");
    sandbox.write_file("/target/file", b"obstruction");
    sandbox.write_file("/target/nested/deeper/file", b"obstruction");

    let server = sandbox.server();
    let session = connect_with_password(&server);

    let replaced = session
        .fs()
        .rename("/source", "/target", &mut allow_overwrite())
        .unwrap();

    assert!(replaced);
    assert_eq!(sandbox.read_file("/target"), TEST_DATA);
    assert_eq!(sandbox.names("/"), ["target"]);
}

#[test]
fn rename_denied_leaves_both_paths() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/source", TEST_DATA);
    sandbox.write_file("/target", b"obstruction");

    let server = sandbox.server();
    let session = connect_with_password(&server);
    let mut consumer = MockConsumer::default();

    let err = session
        .fs()
        .rename("/source", "/target", &mut consumer)
        .unwrap_err();

    assert!(matches!(err, Error::Aborted), "{err:?}");
    assert!(err.is_abort());
    assert!(consumer.was_asked_to_confirm_overwrite());
    assert_eq!(sandbox.read_file("/source"), TEST_DATA);
    assert_eq!(sandbox.read_file("/target"), b"obstruction");
    assert_eq!(sandbox.names("/"), ["source", "target"]);
}

#[test]
fn rename_skips_taken_temporary_names() {
    let sandbox = Sandbox::new();
    let taken = format!("/target{RENAME_TEMP_SUFFIX}");
    sandbox.write_file("/source", TEST_DATA);
    sandbox.write_file("/target", b"obstruction");
    sandbox.write_file(&taken, b"unrelated");

    let server = sandbox.server();
    let session = connect_with_password(&server);

    session
        .fs()
        .rename("/source", "/target", &mut allow_overwrite())
        .unwrap();

    assert_eq!(sandbox.read_file("/target"), TEST_DATA);
    assert_eq!(sandbox.read_file(&taken), b"unrelated");
    assert!(!sandbox.exists(format!("{taken}.1")));
}

#[test]
fn rename_restores_target_when_second_step_fails() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/source", TEST_DATA);
    sandbox.write_file("/target", b"obstruction");

    let server = sandbox.server();
    let session = connect_with_password(&server);

    // The first rename of /source is the atomic attempt.
    server.inject_fault(Op::Rename, "/source", 1);

    let err = session
        .fs()
        .rename("/source", "/target", &mut allow_overwrite())
        .unwrap_err();

    assert_eq!(err.sftp_kind(), Some(SftpErrorKind::Failure), "{err:?}");
    assert_eq!(sandbox.read_file("/source"), TEST_DATA);
    assert_eq!(sandbox.read_file("/target"), b"obstruction");
    assert_eq!(sandbox.names("/"), ["source", "target"]);
}

#[test]
fn rename_leaves_both_paths_when_target_cannot_be_moved_aside() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/source", TEST_DATA);
    sandbox.write_file("/target", b"obstruction");

    let server = sandbox.server();
    let session = connect_with_password(&server);

    server.inject_fault(Op::Rename, "/target", 0);

    match session
        .fs()
        .rename("/source", "/target", &mut allow_overwrite())
    {
        Err(Error::Sftp { path, kind, .. }) => {
            assert_eq!(path, Path::new("/target"));
            assert_eq!(kind, SftpErrorKind::Failure);
        }
        res => panic!("Unexpected result {res:?}"),
    }

    assert_eq!(sandbox.read_file("/source"), TEST_DATA);
    assert_eq!(sandbox.read_file("/target"), b"obstruction");
    assert_eq!(sandbox.names("/"), ["source", "target"]);
}

#[test]
fn rename_reports_both_errors_when_restore_fails() {
    let sandbox = Sandbox::new();
    let temp = format!("/target{RENAME_TEMP_SUFFIX}");
    sandbox.write_file("/source", TEST_DATA);
    sandbox.write_file("/target", b"obstruction");

    let server = sandbox.server();
    let session = connect_with_password(&server);

    server.inject_fault(Op::Rename, "/source", 1);
    server.inject_fault(Op::Rename, &temp, 0);

    let err = session
        .fs()
        .rename("/source", "/target", &mut allow_overwrite())
        .unwrap_err();

    assert!(matches!(err, Error::RecursiveErrors(_)), "{err:?}");
    // Nothing is lost: the displaced target is still at the temporary.
    assert_eq!(sandbox.read_file(&temp), b"obstruction");
    assert_eq!(sandbox.read_file("/source"), TEST_DATA);
}

#[test]
fn rename_reports_leftover_temporary() {
    let sandbox = Sandbox::new();
    let temp = format!("/target{RENAME_TEMP_SUFFIX}");
    sandbox.write_file("/source", TEST_DATA);
    sandbox.write_file("/target", b"obstruction");

    let server = sandbox.server();
    let session = connect_with_password(&server);

    server.inject_fault(Op::Unlink, &temp, 0);

    match session
        .fs()
        .rename("/source", "/target", &mut allow_overwrite())
    {
        Err(Error::TempCleanup { temp: leftover, .. }) => {
            assert_eq!(leftover, Path::new(&temp));
        }
        res => panic!("Unexpected result {res:?}"),
    }

    // The rename itself took effect.
    assert_eq!(sandbox.read_file("/target"), TEST_DATA);
    assert!(!sandbox.exists("/source"));
}

#[test]
fn rename_missing_source_is_not_an_obstruction() {
    let sandbox = Sandbox::new();
    let server = sandbox.server();
    let session = connect_with_password(&server);
    let mut consumer = MockConsumer::default();

    let err = session
        .fs()
        .rename("/missing", "/target", &mut consumer)
        .unwrap_err();

    assert!(matches!(err, Error::NotFound { .. }), "{err:?}");
    assert!(!consumer.was_asked_to_confirm_overwrite());
}

#[test]
fn remove_all_removes_nested_tree() {
    let sandbox = Sandbox::new();
    sandbox.make_dir("/tree/a/b/c");
    sandbox.make_dir("/tree/empty");
    sandbox.make_dir("/outside");
    sandbox.write_file("/tree/file", TEST_DATA);
    sandbox.write_file("/tree/a/file", TEST_DATA);
    sandbox.write_file("/tree/a/b/c/file", TEST_DATA);
    sandbox.write_file("/outside/kept", TEST_DATA);
    sandbox.write_file("/sibling", TEST_DATA);
    sandbox.symlink(sandbox.local("/outside"), "/tree/a/link");

    let server = sandbox.server();
    let session = connect_with_password(&server);

    session.fs().remove_all("/tree").unwrap();

    assert!(!sandbox.exists("/tree"));
    assert_eq!(sandbox.names("/"), ["outside", "sibling"]);
    // The symlink was removed, not followed.
    assert_eq!(sandbox.read_file("/outside/kept"), TEST_DATA);
}

#[test]
fn remove_all_removes_single_file() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/file", TEST_DATA);
    sandbox.write_file("/sibling", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);

    session.fs().remove_all("/file").unwrap();

    assert_eq!(sandbox.names("/"), ["sibling"]);
}

#[test]
fn remove_all_stops_at_first_failure() {
    let sandbox = Sandbox::new();
    sandbox.make_dir("/tree/a");
    sandbox.make_dir("/tree/b");
    sandbox.write_file("/tree/a/file", TEST_DATA);
    sandbox.write_file("/tree/b/file", TEST_DATA);
    sandbox.write_file("/tree/file", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);

    server.inject_fault(Op::Unlink, "/tree/a/file", 0);

    match session.fs().remove_all("/tree") {
        Err(Error::Sftp { path, .. }) => assert_eq!(path, Path::new("/tree/a/file")),
        res => panic!("Unexpected result {res:?}"),
    }

    // Files of a directory go first, then its subdirectories last to first.
    assert_eq!(sandbox.names("/tree"), ["a"]);
    assert_eq!(sandbox.read_file("/tree/a/file"), TEST_DATA);
}

#[test]
fn remove_all_missing_path_fails() {
    let sandbox = Sandbox::new();
    let server = sandbox.server();
    let session = connect_with_password(&server);

    let err = session.fs().remove_all("/missing").unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err:?}");
}

#[test]
fn create_new_directory_fails_if_present() {
    let sandbox = Sandbox::new();
    let server = sandbox.server();
    let session = connect_with_password(&server);
    let fs = session.fs();

    fs.create_new_directory("/dir").unwrap();
    fs.write("/dir/file", TEST_DATA).unwrap();

    let err = fs.create_new_directory("/dir").unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }), "{err:?}");
    assert_eq!(sandbox.read_file("/dir/file"), TEST_DATA);

    sandbox.write_file("/file", TEST_DATA);
    let err = fs.create_new_directory("/file").unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }), "{err:?}");
}

#[test]
fn create_new_directory_needs_parent() {
    let sandbox = Sandbox::new();
    let server = sandbox.server();
    let session = connect_with_password(&server);

    let err = session
        .fs()
        .create_new_directory("/missing/dir")
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err:?}");
}

#[test]
fn stat_and_resolve_link() {
    let sandbox = Sandbox::new();
    sandbox.make_dir("/dir");
    sandbox.write_file("/dir/target", TEST_DATA);
    sandbox.symlink("target", "/dir/link");

    let server = sandbox.server();
    let session = connect_with_password(&server);
    let fs = session.fs();

    let link = fs.stat("/dir/link", false).unwrap();
    assert!(link.file_type().unwrap().is_symlink());

    let target = fs.stat("/dir/link", true).unwrap();
    assert!(target.file_type().unwrap().is_file());
    assert_eq!(target.len(), Some(TEST_DATA.len() as u64));

    assert_eq!(fs.resolve_link("/dir/link").unwrap(), Path::new("/dir/target"));
}

#[test]
fn relative_paths_use_cwd() {
    let sandbox = Sandbox::new();
    sandbox.make_dir("/home/swish");
    sandbox.write_file("/home/swish/.cshrc", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);

    let mut fs = session.fs().clone();
    fs.set_cwd("/home/swish");

    assert_eq!(filenames(&fs, "."), [".cshrc"]);
    assert_eq!(&fs.read(".cshrc").unwrap()[..], TEST_DATA);
}

#[test]
fn provider_trait_drives_filesystem() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/source", TEST_DATA);
    sandbox.write_file("/target", b"obstruction");

    let server = sandbox.server();
    let session = connect_with_password(&server);
    let provider = session.fs();

    let replaced = Provider::rename(
        provider,
        &mut |_: &Path, _: &Path| Overwrite::Allow,
        Path::new("/source"),
        Path::new("/target"),
    )
    .unwrap();
    assert!(replaced);

    Provider::create_new_directory(provider, Path::new("/dir")).unwrap();
    assert_eq!(filenames(provider, "/"), ["dir", "target"]);

    let mut content = Vec::new();
    Provider::get_file(provider, Path::new("/target"), OpenMode::read())
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    assert_eq!(content, TEST_DATA);

    Provider::remove_all(provider, Path::new("/dir")).unwrap();
    assert_eq!(filenames(provider, "/"), ["target"]);
}
