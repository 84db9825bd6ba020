//! NetFlow v5 디코더
//!
//! 고정 레이아웃 프로토콜입니다: 24바이트 헤더 뒤에 48바이트 레코드가
//! `count`개 이어집니다. 템플릿 협상이 없으므로 상태 없이 디코딩됩니다.
//!
//! 헤더의 `flow_sequence`는 "이 패킷 이전까지 익스포터가 내보낸 총 플로우
//! 수"이므로, engine type/id 조합별로 독립적인 누락 추적 스트림을
//! 구성합니다.

use std::net::{IpAddr, Ipv4Addr};

use bytes::Buf;

use flowgate_core::error::DecodeError;
use flowgate_core::pipeline::FlowDecoder;
use flowgate_core::types::{DecodedPacket, FlowRecord, SequenceInfo};

/// NetFlow v5 헤더 길이 (바이트)
const HEADER_LEN: usize = 24;
/// NetFlow v5 레코드 길이 (바이트)
const RECORD_LEN: usize = 48;
/// v5 패킷 하나가 담을 수 있는 최대 레코드 수 (RFC 외 관례적 한계)
const MAX_RECORDS: u16 = 30;

/// NetFlow v5 디코더
///
/// 상태가 없으므로 워커 간에 자유롭게 공유할 수 있습니다.
pub struct NetFlowV5Decoder;

impl FlowDecoder for NetFlowV5Decoder {
    fn name(&self) -> &'static str {
        "netflow_v5"
    }

    fn decode(&self, payload: &[u8]) -> Result<DecodedPacket, DecodeError> {
        let mut buf = payload;

        if buf.len() < 2 {
            return Err(DecodeError::Truncated {
                expected: HEADER_LEN,
                actual: payload.len(),
            });
        }
        let version = buf.get_u16();
        if version != 5 {
            return Err(DecodeError::UnsupportedVersion { version });
        }
        if payload.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                expected: HEADER_LEN,
                actual: payload.len(),
            });
        }

        let count = buf.get_u16();
        let sys_uptime_ms = buf.get_u32();
        let unix_secs = buf.get_u32();
        let _unix_nsecs = buf.get_u32();
        let flow_sequence = buf.get_u32();
        let engine_type = buf.get_u8();
        let engine_id = buf.get_u8();
        // 상위 2비트는 샘플링 모드, 하위 14비트가 주기
        let sampling_rate = u64::from(buf.get_u16() & 0x3FFF);

        if count > MAX_RECORDS {
            return Err(DecodeError::Malformed {
                reason: format!("record count {count} exceeds v5 maximum {MAX_RECORDS}"),
            });
        }
        let expected = HEADER_LEN + usize::from(count) * RECORD_LEN;
        if payload.len() < expected {
            return Err(DecodeError::Truncated {
                expected,
                actual: payload.len(),
            });
        }

        let mut records = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            records.push(decode_record(
                &mut buf,
                flow_sequence,
                sys_uptime_ms,
                unix_secs,
                sampling_rate,
            ));
        }

        Ok(DecodedPacket {
            version,
            sequence: Some(SequenceInfo {
                sequence: flow_sequence,
                record_count: count,
                stream_id: Some(format!("{engine_type}/{engine_id}")),
            }),
            records,
        })
    }
}

/// 48바이트 레코드 하나를 디코딩합니다. 길이 검증은 호출자가 마친 상태입니다.
fn decode_record(
    buf: &mut &[u8],
    flow_sequence: u32,
    sys_uptime_ms: u32,
    unix_secs: u32,
    sampling_rate: u64,
) -> FlowRecord {
    let src_addr = IpAddr::V4(Ipv4Addr::from(buf.get_u32()));
    let dst_addr = IpAddr::V4(Ipv4Addr::from(buf.get_u32()));
    let next_hop = IpAddr::V4(Ipv4Addr::from(buf.get_u32()));
    let in_if = u32::from(buf.get_u16());
    let out_if = u32::from(buf.get_u16());
    let packets = u64::from(buf.get_u32());
    let bytes = u64::from(buf.get_u32());
    let first_uptime_ms = buf.get_u32();
    let last_uptime_ms = buf.get_u32();
    let src_port = buf.get_u16();
    let dst_port = buf.get_u16();
    let _pad1 = buf.get_u8();
    let tcp_flags = buf.get_u8();
    let proto = buf.get_u8();
    let tos = buf.get_u8();
    let src_as = u32::from(buf.get_u16());
    let dst_as = u32::from(buf.get_u16());
    let src_mask = buf.get_u8();
    let dst_mask = buf.get_u8();
    let _pad2 = buf.get_u16();

    FlowRecord {
        sequence_num: flow_sequence,
        src_addr,
        dst_addr,
        next_hop,
        in_if,
        out_if,
        packets,
        bytes,
        src_port,
        dst_port,
        tcp_flags,
        proto,
        tos,
        src_as,
        dst_as,
        src_mask,
        dst_mask,
        time_flow_start: uptime_to_epoch(unix_secs, sys_uptime_ms, first_uptime_ms),
        time_flow_end: uptime_to_epoch(unix_secs, sys_uptime_ms, last_uptime_ms),
        sampling_rate,
        ..FlowRecord::default()
    }
}

/// sysUptime 기준 밀리초 타임스탬프를 epoch 초로 환산합니다.
///
/// `at_uptime_ms`가 헤더의 sysUptime보다 큰 비정상 입력은 익스포트
/// 시각으로 클램프됩니다.
fn uptime_to_epoch(unix_secs: u32, sys_uptime_ms: u32, at_uptime_ms: u32) -> u64 {
    let offset_secs = (i64::from(sys_uptime_ms) - i64::from(at_uptime_ms)).max(0) / 1000;
    u64::try_from(i64::from(unix_secs) - offset_secs).unwrap_or(0)
}
