//! 디코드 워커 -- 수신/디코딩/누락 추적/전달 루프
//!
//! 워커 하나가 소켓 하나를 소유하고 수신-디코딩-전달 루프를 독립적으로
//! 실행합니다. 대기 지점은 데이터그램 수신과 트랜스포트 전달뿐입니다.
//!
//! 패킷 처리 중 어떤 실패도 워커를 종료시키지 않습니다. 디코딩 실패는
//! 해당 데이터그램만, 포맷팅 실패는 해당 레코드만 드롭하고 카운트합니다.
//! 소켓 에러만이 워커를 멈추며, 나머지 워커는 계속 동작합니다.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use metrics::{counter, gauge, histogram};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use flowgate_core::metrics::{
    DECODE_DURATION_SECONDS, DECODER_ERRORS_TOTAL, DECODER_PACKETS_TOTAL, FLOWS_DECODED_TOTAL,
    FLOWS_MISSING_TOTAL, FLOWS_SEQUENCE, FORMAT_ERRORS_TOTAL, LABEL_DECODER, LABEL_ERROR,
    LABEL_EXPORTER, LABEL_LOCAL_ADDR, LABEL_VERSION, LABEL_WORKER, PROCESS_DURATION_SECONDS,
    RECORDS_FORWARDED_TOTAL, SEQUENCE_RESETS_TOTAL, TRAFFIC_BYTES_TOTAL, TRAFFIC_PACKETS_TOTAL,
    TRAFFIC_PACKET_SIZE_BYTES,
};
use flowgate_core::pipeline::{FlowDecoder, RecordFormatter, Transport};

use crate::receiver::RawPacket;
use crate::tracker::{SequenceGapTracker, SourceKey};

/// UDP 데이터그램 최대 크기
const MAX_DATAGRAM_SIZE: usize = 65535;

/// 디코드 워커
///
/// 소켓과 협력자들에 대한 핸들을 소유하며, [`run`](Self::run)에서
/// 취소될 때까지 수신 루프를 돌립니다.
pub(crate) struct DecodeWorker {
    id: usize,
    socket: UdpSocket,
    local_addr: String,
    decoder: Arc<dyn FlowDecoder>,
    formatter: Arc<dyn RecordFormatter>,
    transport: Arc<dyn Transport>,
    tracker: Arc<SequenceGapTracker>,
    cancel: CancellationToken,
}

impl DecodeWorker {
    pub(crate) fn new(
        id: usize,
        socket: UdpSocket,
        local_addr: String,
        decoder: Arc<dyn FlowDecoder>,
        formatter: Arc<dyn RecordFormatter>,
        transport: Arc<dyn Transport>,
        tracker: Arc<SequenceGapTracker>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            socket,
            local_addr,
            decoder,
            formatter,
            transport,
            tracker,
            cancel,
        }
    }

    /// 수신 루프를 실행합니다.
    ///
    /// 취소 신호를 받으면 새 데이터그램 수신을 멈추고 반환합니다.
    /// 진행 중인 처리는 select 구조상 이미 완료된 뒤입니다.
    pub(crate) async fn run(self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        info!(worker = self.id, local_addr = %self.local_addr, "decode worker started");

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => {
                            let packet =
                                RawPacket::new(Bytes::copy_from_slice(&buf[..len]), peer);
                            self.process(packet).await;
                        }
                        Err(e) => {
                            // 소켓 자체의 에러: 이 워커만 멈추고 나머지는 계속 동작
                            error!(worker = self.id, error = %e, "socket receive failed, stopping worker");
                            break;
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    debug!(worker = self.id, "decode worker received shutdown signal");
                    break;
                }
            }
        }

        info!(worker = self.id, "decode worker stopped");
    }

    /// 데이터그램 하나를 처리합니다.
    pub(crate) async fn process(&self, packet: RawPacket) {
        let started = Instant::now();
        let decoder_name = self.decoder.name();

        counter!(
            TRAFFIC_PACKETS_TOTAL,
            LABEL_LOCAL_ADDR => self.local_addr.clone(),
            LABEL_DECODER => decoder_name
        )
        .increment(1);
        counter!(
            TRAFFIC_BYTES_TOTAL,
            LABEL_LOCAL_ADDR => self.local_addr.clone(),
            LABEL_DECODER => decoder_name
        )
        .increment(packet.payload.len() as u64);
        histogram!(TRAFFIC_PACKET_SIZE_BYTES, LABEL_DECODER => decoder_name)
            .record(packet.payload.len() as f64);

        let exporter = canonical_exporter_addr(packet.peer.ip());

        let decode_started = Instant::now();
        let decoded = match self.decoder.decode(&packet.payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                counter!(
                    DECODER_ERRORS_TOTAL,
                    LABEL_DECODER => decoder_name,
                    LABEL_ERROR => e.kind()
                )
                .increment(1);
                debug!(worker = self.id, exporter = %exporter, error = %e, "datagram decode failed");
                return;
            }
        };
        histogram!(DECODE_DURATION_SECONDS, LABEL_DECODER => decoder_name)
            .record(decode_started.elapsed().as_secs_f64());
        counter!(
            DECODER_PACKETS_TOTAL,
            LABEL_WORKER => self.id.to_string(),
            LABEL_DECODER => decoder_name
        )
        .increment(1);

        let version = decoded.version.to_string();

        // 시퀀스/카운트 쌍이 있는 프로토콜만 누락 추적 대상
        if let Some(sequence) = &decoded.sequence {
            let key = SourceKey::for_stream(exporter, sequence.stream_id.as_deref());
            let observation =
                self.tracker
                    .observe(&key, sequence.sequence, sequence.record_count);

            gauge!(
                FLOWS_SEQUENCE,
                LABEL_EXPORTER => exporter.to_string(),
                LABEL_VERSION => version.clone()
            )
            .set(f64::from(sequence.sequence));
            if observation.newly_missing > 0 {
                counter!(
                    FLOWS_MISSING_TOTAL,
                    LABEL_EXPORTER => exporter.to_string(),
                    LABEL_VERSION => version.clone()
                )
                .increment(observation.newly_missing);
                debug!(
                    worker = self.id,
                    exporter = %exporter,
                    newly_missing = observation.newly_missing,
                    "sequence gap observed"
                );
            }
            if observation.sequence_reset {
                counter!(
                    SEQUENCE_RESETS_TOTAL,
                    LABEL_EXPORTER => exporter.to_string(),
                    LABEL_VERSION => version.clone()
                )
                .increment(1);
                info!(
                    worker = self.id,
                    exporter = %exporter,
                    sequence = sequence.sequence,
                    "exporter sequence reset detected"
                );
            }
        }

        if !decoded.records.is_empty() {
            counter!(
                FLOWS_DECODED_TOTAL,
                LABEL_EXPORTER => exporter.to_string(),
                LABEL_VERSION => version.clone()
            )
            .increment(decoded.records.len() as u64);
        }

        let time_received = epoch_secs(packet.received_at);
        for mut record in decoded.records {
            record.time_received = time_received;
            record.sampler_address = exporter;

            match self.formatter.format(&record) {
                Ok(formatted) => {
                    self.transport.send(formatted).await;
                    counter!(
                        RECORDS_FORWARDED_TOTAL,
                        LABEL_EXPORTER => exporter.to_string(),
                        LABEL_VERSION => version.clone()
                    )
                    .increment(1);
                }
                Err(e) => {
                    // 레코드 하나만 드롭, 배치와 워커는 계속
                    warn!(worker = self.id, exporter = %exporter, error = %e, "record formatting failed, dropping record");
                    counter!(
                        FORMAT_ERRORS_TOTAL,
                        LABEL_EXPORTER => exporter.to_string(),
                        LABEL_VERSION => version.clone()
                    )
                    .increment(1);
                }
            }
        }

        histogram!(PROCESS_DURATION_SECONDS, LABEL_DECODER => decoder_name)
            .record(started.elapsed().as_secs_f64());
    }
}

/// 익스포터 주소를 정규화합니다.
///
/// IPv4-mapped IPv6 주소(`::ffff:a.b.c.d`)는 4바이트 IPv4 형태로
/// 변환합니다. 듀얼스택 소켓에서 IPv4 송신자가 mapped 형태로 보이는
/// 것을 흡수해, 같은 익스포터가 주소 표기 차이로 다른 키가 되는 일을
/// 막습니다.
fn canonical_exporter_addr(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    }
}

fn epoch_secs(ts: SystemTime) -> u64 {
    ts.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use bytes::{BufMut, BytesMut};

    use flowgate_core::error::FormatError;
    use flowgate_core::types::{FlowRecord, FormattedRecord};

    use crate::decoder::NetFlowV5Decoder;
    use crate::format::JsonFormatter;
    use crate::transport::ChannelTransport;

    fn v5_packet(count: u16, flow_sequence: u32) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u16(5);
        buf.put_u16(count);
        buf.put_u32(1000); // uptime
        buf.put_u32(1_700_000_000); // export secs
        buf.put_u32(0);
        buf.put_u32(flow_sequence);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u16(0);
        for _ in 0..count {
            buf.put_u32(u32::from_be_bytes([10, 0, 0, 1]));
            buf.put_u32(u32::from_be_bytes([10, 0, 0, 2]));
            buf.put_u32(0);
            buf.put_u16(0);
            buf.put_u16(0);
            buf.put_u32(1);
            buf.put_u32(64);
            buf.put_u32(500);
            buf.put_u32(900);
            buf.put_u16(1234);
            buf.put_u16(80);
            buf.put_u8(0);
            buf.put_u8(0);
            buf.put_u8(6);
            buf.put_u8(0);
            buf.put_u16(0);
            buf.put_u16(0);
            buf.put_u8(0);
            buf.put_u8(0);
            buf.put_u16(0);
        }
        buf
    }

    async fn test_worker(
        transport: Arc<dyn Transport>,
        formatter: Arc<dyn RecordFormatter>,
    ) -> DecodeWorker {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let local_addr = socket.local_addr().unwrap().to_string();
        DecodeWorker::new(
            0,
            socket,
            local_addr,
            Arc::new(NetFlowV5Decoder),
            formatter,
            transport,
            Arc::new(SequenceGapTracker::new(1000)),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn valid_packet_forwards_stamped_records() {
        let (transport, mut rx) = ChannelTransport::new(8);
        let worker = test_worker(Arc::new(transport), Arc::new(JsonFormatter)).await;

        let peer: SocketAddr = "192.0.2.1:50000".parse().unwrap();
        let ts = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_123);
        let packet = RawPacket::new(v5_packet(2, 100).freeze(), peer).with_received_at(ts);
        worker.process(packet).await;

        for _ in 0..2 {
            let formatted = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_slice(&formatted.payload).unwrap();
            assert_eq!(value["sampler_address"], "192.0.2.1");
            assert_eq!(value["time_received"], 1_700_000_123u64);
        }
    }

    #[tokio::test]
    async fn ipv4_mapped_peer_is_canonicalized() {
        let (transport, mut rx) = ChannelTransport::new(8);
        let worker = test_worker(Arc::new(transport), Arc::new(JsonFormatter)).await;

        let peer: SocketAddr = "[::ffff:192.0.2.77]:9000".parse().unwrap();
        worker
            .process(RawPacket::new(v5_packet(1, 0).freeze(), peer))
            .await;

        let formatted = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&formatted.payload).unwrap();
        assert_eq!(value["sampler_address"], "192.0.2.77");
        assert_eq!(&formatted.key[..], b"192.0.2.77");
    }

    #[tokio::test]
    async fn undecodable_packet_forwards_nothing() {
        let (transport, mut rx) = ChannelTransport::new(8);
        let worker = test_worker(Arc::new(transport), Arc::new(JsonFormatter)).await;

        let peer: SocketAddr = "192.0.2.1:50000".parse().unwrap();
        // NetFlow v9 헤더: 버전 불일치로 드롭되어야 함
        let mut buf = BytesMut::new();
        buf.put_u16(9);
        buf.put_slice(&[0u8; 22]);
        worker.process(RawPacket::new(buf.freeze(), peer)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn sequence_gaps_are_tracked_per_stream() {
        let (transport, _rx) = ChannelTransport::new(64);
        let worker = test_worker(Arc::new(transport), Arc::new(JsonFormatter)).await;
        let peer: SocketAddr = "192.0.2.1:50000".parse().unwrap();

        worker
            .process(RawPacket::new(v5_packet(1, 100).freeze(), peer))
            .await;
        assert_eq!(worker.tracker.tracked_sources(), 1);

        // 같은 익스포터의 후속 패킷은 같은 스트림으로 집계되어야 함
        worker
            .process(RawPacket::new(v5_packet(1, 101).freeze(), peer))
            .await;
        assert_eq!(worker.tracker.tracked_sources(), 1);
    }

    #[tokio::test]
    async fn format_failure_drops_record_but_not_batch() {
        struct FailingFormatter;
        impl RecordFormatter for FailingFormatter {
            fn name(&self) -> &'static str {
                "failing"
            }
            fn format(&self, record: &FlowRecord) -> Result<FormattedRecord, FormatError> {
                if record.src_port == 1234 {
                    Err(FormatError::Serialize("refused".to_owned()))
                } else {
                    JsonFormatter.format(record)
                }
            }
        }

        let (transport, mut rx) = ChannelTransport::new(8);
        let worker = test_worker(Arc::new(transport), Arc::new(FailingFormatter)).await;
        let peer: SocketAddr = "192.0.2.1:50000".parse().unwrap();

        // 모든 레코드가 src_port=1234이므로 전부 드롭되지만 process는 정상 반환
        worker
            .process(RawPacket::new(v5_packet(2, 0).freeze(), peer))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn canonicalizes_only_mapped_addresses() {
        let mapped: IpAddr = "::ffff:10.1.2.3".parse().unwrap();
        assert_eq!(
            canonical_exporter_addr(mapped),
            "10.1.2.3".parse::<IpAddr>().unwrap()
        );

        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(canonical_exporter_addr(v6), v6);

        let v4: IpAddr = "10.1.2.3".parse().unwrap();
        assert_eq!(canonical_exporter_addr(v4), v4);
    }

    #[test]
    fn epoch_secs_of_unix_epoch_is_zero() {
        assert_eq!(epoch_secs(SystemTime::UNIX_EPOCH), 0);
    }
}
