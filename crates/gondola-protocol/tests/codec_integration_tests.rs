//! Integration tests for IntLineCodec with Tokio streams.
//!
//! A duplex pipe stands in for the serial link: one end plays the host, the
//! other the microcontroller firmware.

use futures::{SinkExt, StreamExt};
use gondola_core::Error;
use gondola_protocol::{DeviceSignal, HostCommand, IntLineCodec};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::codec::{Framed, FramedRead};

fn create_framed_duplex(
    buffer_size: usize,
) -> (
    Framed<DuplexStream, IntLineCodec>,
    Framed<DuplexStream, IntLineCodec>,
) {
    let (host, device) = tokio::io::duplex(buffer_size);
    (
        Framed::new(host, IntLineCodec::new()),
        Framed::new(device, IntLineCodec::new()),
    )
}

#[tokio::test]
async fn test_handshake_over_stream() {
    let (mut host, mut device) = create_framed_duplex(64);

    device.send(DeviceSignal::Handshake.code()).await.unwrap();
    let received = host.next().await.unwrap().unwrap();
    assert_eq!(DeviceSignal::try_from(received).unwrap(), DeviceSignal::Handshake);

    host.send(HostCommand::HandshakeAck).await.unwrap();
    assert_eq!(device.next().await.unwrap().unwrap(), 1);

    device.send(DeviceSignal::HandshakeConfirm.code()).await.unwrap();
    assert_eq!(host.next().await.unwrap().unwrap(), 2);
}

#[tokio::test]
async fn test_full_pick_cycle_values() {
    let (mut host, mut device) = create_framed_duplex(256);

    let host_values = [3_i64, 5, 73, 9, 11];
    for value in host_values {
        host.send(value).await.unwrap();
    }
    for expected in host_values {
        assert_eq!(device.next().await.unwrap().unwrap(), expected);
    }
}

#[tokio::test]
async fn test_crlf_firmware_output() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut framed = FramedRead::new(reader, IntLineCodec::new());

    writer.write_all(b"4\r\n6\r\n").await.unwrap();
    drop(writer);

    assert_eq!(framed.next().await.unwrap().unwrap(), 4);
    assert_eq!(framed.next().await.unwrap().unwrap(), 6);
    assert!(framed.next().await.is_none());
}

#[tokio::test]
async fn test_split_writes_reassemble() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut framed = FramedRead::new(reader, IntLineCodec::new());

    writer.write_all(b"1").await.unwrap();
    writer.flush().await.unwrap();
    writer.write_all(b"0\n").await.unwrap();
    drop(writer);

    assert_eq!(framed.next().await.unwrap().unwrap(), 10);
}

#[tokio::test]
async fn test_unterminated_value_at_eof() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut framed = FramedRead::new(reader, IntLineCodec::new());

    writer.write_all(b"8").await.unwrap();
    drop(writer);

    assert_eq!(framed.next().await.unwrap().unwrap(), 8);
    assert!(framed.next().await.is_none());
}

#[tokio::test]
async fn test_garbage_line_surfaces_error() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut framed = FramedRead::new(reader, IntLineCodec::new());

    writer.write_all(b"boot ok\n").await.unwrap();
    drop(writer);

    assert!(matches!(
        framed.next().await.unwrap(),
        Err(Error::InvalidLine(line)) if line == "boot ok"
    ));
}
