//! End-to-end transfers between a real [`Sender`] and [`Receiver`].
//!
//! Both engines run on loopback with shortened timings; the receiver runs in
//! a background task and the test drives the sender.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;

use urft::{
    ProtocolConfig, ReceiveReport, Receiver, ReceiverOptions, SendReport, Sender, TransferError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_config() -> ProtocolConfig {
    ProtocolConfig::default()
        .with_loss_timeout(Duration::from_millis(300))
        .with_consecutive_packets_timeout(Duration::from_millis(100))
}

async fn start_receiver(
    output_dir: &Path,
) -> (SocketAddr, JoinHandle<Result<ReceiveReport, TransferError>>) {
    let options = ReceiverOptions {
        output_dir: output_dir.to_path_buf(),
    };
    let receiver = Receiver::bind("127.0.0.1:0".parse().unwrap(), fast_config(), options)
        .await
        .expect("bind receiver");
    let addr = receiver.local_addr();
    (addr, tokio::spawn(receiver.listen()))
}

async fn write_source(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(&path, bytes).await.unwrap();
    path
}

/// Send `path` to a fresh receiver writing into `out_dir`.
async fn transfer(path: &Path, out_dir: &Path) -> (SendReport, ReceiveReport) {
    let (addr, receiver_task) = start_receiver(out_dir).await;

    let sender = Sender::connect(addr, fast_config()).await.expect("connect");
    let sent = tokio::time::timeout(Duration::from_secs(20), sender.send_file(path))
        .await
        .expect("send timed out")
        .expect("send failed");

    let received = tokio::time::timeout(Duration::from_secs(5), receiver_task)
        .await
        .expect("receiver did not finish")
        .expect("receiver task panicked")
        .expect("receive failed");

    (sent, received)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// A file spanning three segments arrives byte-identical.
#[tokio::test]
async fn small_file_arrives_intact() {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let data: Vec<u8> = (0..2050u32).map(|i| (i % 251) as u8).collect();
    let path = write_source(src_dir.path(), "report.bin", &data).await;

    let (sent, received) = transfer(&path, out_dir.path()).await;

    assert_eq!(sent.filename, "report.bin");
    assert_eq!(sent.filesize, 2050);
    assert_eq!(sent.segments_sent, 3);
    assert_eq!(sent.acks_received, 3);

    assert!(received.is_complete());
    assert!(!received.closed_by_nulls);
    assert_eq!(received.segments_stored, 3);
    assert_eq!(received.path, out_dir.path().join("report.bin"));
    assert_eq!(tokio::fs::read(&received.path).await.unwrap(), data);
}

/// Several hundred segments, random contents.
#[tokio::test]
async fn large_random_file_arrives_intact() {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let mut data = vec![0u8; 300_000];
    rng.fill(&mut data[..]);
    let path = write_source(src_dir.path(), "blob.dat", &data).await;

    let (sent, received) = transfer(&path, out_dir.path()).await;

    assert_eq!(sent.segments_sent, 300_000usize.div_ceil(1015));
    assert_eq!(received.bytes_written, 300_000);
    assert_eq!(tokio::fs::read(out_dir.path().join("blob.dat")).await.unwrap(), data);
}

/// An empty file completes on the handshake alone.
#[tokio::test]
async fn empty_file_creates_empty_output() {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let path = write_source(src_dir.path(), "empty", b"").await;

    let (sent, received) = transfer(&path, out_dir.path()).await;

    assert_eq!(sent.segments_sent, 0);
    assert!(received.is_complete());
    assert!(tokio::fs::read(out_dir.path().join("empty")).await.unwrap().is_empty());
}

/// Only the base name crosses the wire; directories are not recreated.
#[tokio::test]
async fn directories_are_stripped_from_the_name() {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let path = write_source(src_dir.path(), "a/b/notes.txt", b"nested contents").await;

    let (sent, received) = transfer(&path, out_dir.path()).await;

    assert_eq!(sent.filename, "notes.txt");
    assert_eq!(received.path, out_dir.path().join("notes.txt"));
    assert_eq!(
        tokio::fs::read(out_dir.path().join("notes.txt")).await.unwrap(),
        b"nested contents"
    );
}

/// A stale file of the same name is replaced, not appended to.
#[tokio::test]
async fn existing_output_is_replaced() {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let path = write_source(src_dir.path(), "data.txt", b"new").await;
    write_source(out_dir.path(), "data.txt", b"a much longer stale file").await;

    transfer(&path, out_dir.path()).await;

    assert_eq!(tokio::fs::read(out_dir.path().join("data.txt")).await.unwrap(), b"new");
}
