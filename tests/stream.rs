use sftp_folder::{file::OpenMode, Error, SftpOptions};
use sftp_test_common::*;

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;

use bytes::BytesMut;
use pretty_assertions::assert_eq;

fn connect_with_chunks(
    server: &LoopbackServer,
    chunk: usize,
) -> sftp_folder::AuthenticatedSession<LoopbackTransport> {
    let chunk = NonZeroUsize::new(chunk).unwrap();
    connect_with_options(server, SftpOptions::new().max_read_len(chunk).max_write_len(chunk))
}

#[test]
fn write_then_read_back() {
    let sandbox = Sandbox::new();
    let server = sandbox.server();
    let session = connect_with_password(&server);
    let fs = session.fs();

    fs.write("/file", TEST_DATA).unwrap();
    assert_eq!(sandbox.read_file("/file"), TEST_DATA);

    assert_eq!(&fs.read("/file").unwrap()[..], TEST_DATA);
}

#[test]
fn read_past_end_returns_short_count() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/file", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);

    let mut file = session.fs().get_file("/file", OpenMode::read()).unwrap();

    let mut buffer = vec![0; TEST_DATA.len() * 2];
    let n = file.read(&mut buffer).unwrap();
    assert_eq!(n, TEST_DATA.len());
    assert_eq!(&buffer[..n], TEST_DATA);

    assert_eq!(file.read(&mut buffer).unwrap(), 0);
    assert_eq!(file.offset(), TEST_DATA.len() as u64);
}

#[test]
fn reads_are_chunked() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/file", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_chunks(&server, 5);

    let mut file = session.fs().get_file("/file", OpenMode::read()).unwrap();

    server.reset_call_counts();
    let mut buffer = vec![0; TEST_DATA.len()];
    assert_eq!(file.read(&mut buffer).unwrap(), TEST_DATA.len());
    assert_eq!(buffer, TEST_DATA);

    assert_eq!(server.call_count(Op::Read), (TEST_DATA.len() + 4) / 5);
}

#[test]
fn writes_are_chunked() {
    let sandbox = Sandbox::new();
    let server = sandbox.server();
    let session = connect_with_chunks(&server, 7);

    let mut file = session.fs().get_file("/file", OpenMode::write()).unwrap();

    server.reset_call_counts();
    file.write_all(TEST_DATA).unwrap();
    file.close().unwrap();

    assert_eq!(server.call_count(Op::Write), (TEST_DATA.len() + 6) / 7);
    assert_eq!(sandbox.read_file("/file"), TEST_DATA);
}

#[test]
fn locked_file_fails_without_consuming() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/locked", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);

    let mut file = session.fs().get_file("/locked", OpenMode::read()).unwrap();

    server.lock_file("/locked");

    let mut buffer = [0; 10];
    let err = file.read(&mut buffer).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Other);
    assert_eq!(file.offset(), 0);
    assert_eq!(buffer, [0; 10]);

    server.unlock_file("/locked");

    file.read_exact(&mut buffer).unwrap();
    assert_eq!(&buffer, &TEST_DATA[..10]);
}

#[test]
fn seek_positions_exactly() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/file", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);

    let mut file = session.fs().get_file("/file", OpenMode::read()).unwrap();
    let mut buffer = [0; 6];

    assert_eq!(file.seek(SeekFrom::Start(7)).unwrap(), 7);
    file.read_exact(&mut buffer).unwrap();
    assert_eq!(&buffer, b"dumpty");

    let end = file.seek(SeekFrom::End(-6)).unwrap();
    assert_eq!(end, TEST_DATA.len() as u64 - 6);
    file.read_exact(&mut buffer).unwrap();
    assert_eq!(&buffer, b"fall.\n");

    file.seek(SeekFrom::Current(-12)).unwrap();
    file.read_exact(&mut buffer).unwrap();
    assert_eq!(&buffer, b"great ");

    let err = file.seek(SeekFrom::Current(-1000)).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    // A failed seek keeps the position.
    assert_eq!(file.stream_position().unwrap(), TEST_DATA.len() as u64 - 6);
}

#[test]
fn write_at_offset_keeps_rest() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/file", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);

    let mut file = session
        .fs()
        .get_file("/file", OpenMode::read_write())
        .unwrap();

    file.seek(SeekFrom::Start(7)).unwrap();
    file.write_all(b"DUMPTY").unwrap();

    file.seek(SeekFrom::Start(0)).unwrap();
    let mut content = Vec::new();
    file.read_to_end(&mut content).unwrap();
    file.close().unwrap();

    let mut expected = TEST_DATA.to_vec();
    expected[7..13].copy_from_slice(b"DUMPTY");
    assert_eq!(content, expected);
    assert_eq!(sandbox.read_file("/file"), expected);
}

#[test]
fn append_starts_at_end() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/file", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);

    let mut file = session
        .fs()
        .get_file("/file", OpenMode::write().append(true))
        .unwrap();
    assert_eq!(file.offset(), TEST_DATA.len() as u64);

    file.write_all(b"All the king's horses\n").unwrap();
    file.close().unwrap();

    let mut expected = TEST_DATA.to_vec();
    expected.extend_from_slice(b"All the king's horses\n");
    assert_eq!(sandbox.read_file("/file"), expected);
}

#[test]
fn write_mode_truncates() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/file", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);

    session.fs().write("/file", b"short").unwrap();
    assert_eq!(sandbox.read_file("/file"), b"short");
}

#[test]
fn stat_is_never_cached() {
    let sandbox = Sandbox::new();
    let server = sandbox.server();
    let session = connect_with_password(&server);

    let mut file = session.fs().get_file("/dir-less", OpenMode::read_write()).unwrap();

    let stat = file.stat().unwrap();
    assert_eq!(stat.name, "dir-less");
    assert_eq!(stat.size, 0);

    file.write_all(TEST_DATA).unwrap();
    assert_eq!(file.stat().unwrap().size, TEST_DATA.len() as u64);

    let metadata = file.metadata().unwrap();
    assert!(metadata.file_type().unwrap().is_file());
}

#[test]
fn missing_file_is_not_found_for_reading_only() {
    let sandbox = Sandbox::new();
    let server = sandbox.server();
    let session = connect_with_password(&server);
    let fs = session.fs();

    let err = fs.get_file("/missing", OpenMode::read()).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err:?}");

    fs.get_file("/missing", OpenMode::write())
        .unwrap()
        .close()
        .unwrap();
    assert!(sandbox.exists("/missing"));
}

#[test]
fn stream_checks_open_mode() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/file", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);
    let fs = session.fs();

    let mut reader = fs.get_file("/file", OpenMode::read()).unwrap();
    assert!(reader.write(b"no").is_err());

    let mut writer = fs.get_file("/other", OpenMode::write()).unwrap();
    assert!(writer.read(&mut [0; 4]).is_err());

    assert_eq!(sandbox.read_file("/file"), TEST_DATA);
}

#[test]
fn read_all_appends_exactly() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/file", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_chunks(&server, 3);

    let mut file = session.fs().get_file("/file", OpenMode::read()).unwrap();

    let buffer = BytesMut::from(&b"prefix:"[..]);
    let buffer = file.read_all(13, buffer).unwrap();
    assert_eq!(&buffer[..], b"prefix:Humpty dumpty");

    let err = file.read_all(TEST_DATA.len(), BytesMut::new()).unwrap_err();
    match err {
        Error::IOError(err) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
        err => panic!("Unexpected error {err:?}"),
    }
}

#[test]
fn dropping_stream_closes_handle() {
    let sandbox = Sandbox::new();
    sandbox.write_file("/file", TEST_DATA);

    let server = sandbox.server();
    let session = connect_with_password(&server);

    server.reset_call_counts();
    drop(session.fs().get_file("/file", OpenMode::read()).unwrap());
    assert_eq!(server.call_count(Op::Close), 1);

    server.inject_fault(Op::Close, "/file", 0);
    let file = session.fs().get_file("/file", OpenMode::read()).unwrap();
    assert!(file.close().is_err());
}
