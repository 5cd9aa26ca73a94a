//! Sender behaviour against a scripted receiver.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use urft::packet::{decode_data, decode_init, encode_ack, INIT_SEQUENCE_NUMBER};
use urft::{ProtocolConfig, SendReport, Sender, TransferError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_config() -> ProtocolConfig {
    ProtocolConfig::default()
        .with_loss_timeout(Duration::from_millis(300))
        .with_consecutive_packets_timeout(Duration::from_millis(100))
}

type SenderTask = JoinHandle<Result<SendReport, TransferError>>;

async fn source(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await.unwrap();
    path
}

async fn start_sender(receiver: SocketAddr, config: ProtocolConfig, path: PathBuf) -> SenderTask {
    let sender = Sender::connect(receiver, config).await.expect("connect");
    tokio::spawn(async move { sender.send_file(&path).await })
}

/// Next datagram from the sender, with its source address.
async fn next(sock: &UdpSocket) -> (Vec<u8>, SocketAddr) {
    let mut buf = vec![0u8; 2048];
    let (n, from) = tokio::time::timeout(Duration::from_secs(2), sock.recv_from(&mut buf))
        .await
        .expect("sender went quiet")
        .unwrap();
    buf.truncate(n);
    (buf, from)
}

async fn finish(task: SenderTask) -> Result<SendReport, TransferError> {
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("sender did not finish")
        .expect("sender task panicked")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn init_is_resent_until_acknowledged() {
    let dir = tempfile::tempdir().unwrap();
    let path = source(dir.path(), "i.txt", b"abc").await;
    let recv = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let config = fast_config().with_socket_timeout(Duration::from_secs(2));
    let task = start_sender(recv.local_addr().unwrap(), config, path).await;

    let (first, _) = next(&recv).await;
    assert_eq!(decode_init(&first).unwrap(), (3, "i.txt".to_owned()));
    // Ignore the first INIT.
    let (second, from) = next(&recv).await;
    assert_eq!(second, first);

    recv.send_to(&encode_ack(INIT_SEQUENCE_NUMBER), from).await.unwrap();
    let (segment, _) = next(&recv).await;
    let segment = decode_data(&segment).unwrap();
    assert_eq!((segment.seq, segment.payload), (0, &b"abc"[..]));
    assert!(segment.is_intact());
    recv.send_to(&encode_ack(0), from).await.unwrap();

    let report = finish(task).await.unwrap();
    assert!(report.init_attempts >= 2);
    assert_eq!(report.segments_sent, 1);
}

#[tokio::test]
async fn unacknowledged_segment_is_retransmitted() {
    let dir = tempfile::tempdir().unwrap();
    let data: Vec<u8> = (0..2050u32).map(|i| i as u8).collect();
    let path = source(dir.path(), "r.bin", &data).await;
    let recv = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let task = start_sender(recv.local_addr().unwrap(), fast_config(), path).await;

    let (_, from) = next(&recv).await;
    recv.send_to(&encode_ack(INIT_SEQUENCE_NUMBER), from).await.unwrap();

    let mut offsets = Vec::new();
    for _ in 0..3 {
        let (segment, _) = next(&recv).await;
        offsets.push(decode_data(&segment).unwrap().seq);
    }
    assert_eq!(offsets, vec![0, 1015, 2030]);

    // Withhold the ACK for the middle segment.
    recv.send_to(&encode_ack(0), from).await.unwrap();
    recv.send_to(&encode_ack(2030), from).await.unwrap();

    let (resent, _) = next(&recv).await;
    let resent = decode_data(&resent).unwrap();
    assert_eq!(resent.seq, 1015);
    assert_eq!(resent.payload, &data[1015..2030]);
    assert!(resent.is_intact());
    recv.send_to(&encode_ack(1015), from).await.unwrap();

    let report = finish(task).await.unwrap();
    assert!(report.retransmissions >= 1);
    assert_eq!(report.acks_received, 3);
}

#[tokio::test]
async fn silent_receiver_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = source(dir.path(), "s.txt", b"nobody listens").await;
    // Bound so the port is open, but never answers.
    let recv = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let task = start_sender(recv.local_addr().unwrap(), fast_config(), path).await;

    let err = finish(task).await.unwrap_err();
    assert!(matches!(err, TransferError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn silence_after_streaming_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = source(dir.path(), "d.txt", b"never acked").await;
    let recv = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let task = start_sender(recv.local_addr().unwrap(), fast_config(), path).await;

    let (_, from) = next(&recv).await;
    recv.send_to(&encode_ack(INIT_SEQUENCE_NUMBER), from).await.unwrap();

    let err = finish(task).await.unwrap_err();
    assert!(err.is_peer_failure(), "got {err:?}");
}

#[tokio::test]
async fn closed_port_is_connection_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = source(dir.path(), "c.txt", b"refused").await;
    let addr = {
        let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        probe.local_addr().unwrap()
    };
    let task = start_sender(addr, fast_config(), path).await;

    let err = finish(task).await.unwrap_err();
    assert!(matches!(err, TransferError::ConnectionRefused), "got {err:?}");
}

#[tokio::test]
async fn missing_file_is_a_file_error() {
    let dir = tempfile::tempdir().unwrap();
    let recv = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let task = start_sender(
        recv.local_addr().unwrap(),
        fast_config(),
        dir.path().join("absent"),
    )
    .await;

    let err = finish(task).await.unwrap_err();
    assert!(matches!(err, TransferError::File(_)), "got {err:?}");
    assert!(!err.is_peer_failure());
}

#[tokio::test]
async fn overlong_name_is_rejected_before_sending() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config().with_max_segment_size(16);
    let path = source(dir.path(), "a-rather-long-name.txt", b"x").await;
    let recv = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let task = start_sender(recv.local_addr().unwrap(), config, path).await;

    let err = finish(task).await.unwrap_err();
    assert!(
        matches!(err, TransferError::FilenameTooLong { max: 11, .. }),
        "got {err:?}"
    );
}
