//! The per-connection task: frames bytes off the transport and forwards
//! decoded packets to the broker loop. Holds no protocol state of its own
//! beyond the read buffer — every decision about what a packet means is
//! made by `Broker`.

use bytes::BytesMut;
use log::debug;
use mqtt_core::codec::{FixedHeader, MqttPacket};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::broker::{BrokerEvent, OutboundEvent};
use crate::transport::Transport;

const READ_CHUNK: usize = 512;

pub async fn run<T: Transport>(
    connection_id: u64,
    mut stream: T,
    to_broker: mpsc::Sender<BrokerEvent>,
    mut from_broker: mpsc::Receiver<OutboundEvent>,
) {
    let mut buf = BytesMut::with_capacity(mqtt_core::MAX_PACKET_SIZE);
    let graceful = loop {
        tokio::select! {
            read_result = stream.read_buf(&mut buf) => {
                match read_result {
                    Ok(0) => break false,
                    Ok(_) => {
                        if !drain_packets(connection_id, &mut buf, &to_broker).await {
                            break false;
                        }
                    }
                    Err(e) => {
                        debug!("connection {connection_id} read error: {e}");
                        break false;
                    }
                }
            }
            outbound = from_broker.recv() => {
                match outbound {
                    Some(OutboundEvent::Send(bytes)) => {
                        if stream.write_all(&bytes).await.is_err() {
                            break false;
                        }
                    }
                    Some(OutboundEvent::Close) | None => break true,
                }
            }
        }
    };

    let _ = stream.shutdown().await;
    let _ = to_broker.send(BrokerEvent::Disconnected { connection_id, graceful }).await;
}

/// Extracts as many complete packets as `buf` currently holds, forwarding
/// each to the broker. Returns `false` only when the fixed header itself
/// can't be parsed (the packet boundary is unknown, so the stream can't be
/// resynchronized); a body that fails to decode is dropped and reading
/// continues.
async fn drain_packets(connection_id: u64, buf: &mut BytesMut, to_broker: &mpsc::Sender<BrokerEvent>) -> bool {
    loop {
        if buf.len() > READ_CHUNK && buf.len() > mqtt_core::MAX_PACKET_SIZE {
            debug!("connection {connection_id} exceeded the read buffer limit without a full packet");
            return false;
        }

        let header = match FixedHeader::parse(buf) {
            Ok(Some(result)) => result,
            Ok(None) => return true,
            Err(e) => {
                debug!("connection {connection_id} sent a malformed fixed header: {e}");
                return false;
            }
        };

        let (header, header_len) = header;
        let total_len = header_len + header.remaining_length;
        if buf.len() < total_len {
            return true;
        }

        let frame = buf.split_to(total_len);
        let body = frame.freeze().slice(header_len..);

        match MqttPacket::decode(&header, body) {
            Ok(packet) => {
                if to_broker
                    .send(BrokerEvent::Packet { connection_id, packet })
                    .await
                    .is_err()
                {
                    return false;
                }
            }
            Err(e) => {
                // The frame boundary is already known (it was `split_to`'d
                // above), so only this one packet is malformed: drop it and
                // keep reading rather than tearing down the connection.
                debug!("connection {connection_id} dropped an undecodable packet: {e}");
            }
        }
    }
}
