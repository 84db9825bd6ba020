//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 디코더가 생성하고 포매터/트랜스포트가 소비하는 데이터 구조를 정의합니다.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 정규화된 플로우 레코드
///
/// 프로토콜 버전과 무관하게 하나의 플로우를 표현합니다.
/// 시간 필드는 Unix epoch 초 단위입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    /// 수신 시각 (epoch 초)
    pub time_received: u64,
    /// 익스포트 패킷의 시퀀스 번호
    pub sequence_num: u32,
    /// 익스포터 주소 (IPv4-mapped IPv6는 4바이트 형태로 정규화)
    pub sampler_address: IpAddr,
    /// 출발지 IP
    pub src_addr: IpAddr,
    /// 목적지 IP
    pub dst_addr: IpAddr,
    /// 넥스트 홉 IP
    pub next_hop: IpAddr,
    /// 출발지 포트
    pub src_port: u16,
    /// 목적지 포트
    pub dst_port: u16,
    /// 수신 인터페이스 인덱스
    pub in_if: u32,
    /// 송신 인터페이스 인덱스
    pub out_if: u32,
    /// 플로우 바이트 수
    pub bytes: u64,
    /// 플로우 패킷 수
    pub packets: u64,
    /// 프로토콜 (TCP=6, UDP=17 등)
    pub proto: u8,
    /// TCP 플래그 (OR 누적)
    pub tcp_flags: u8,
    /// Type of Service
    pub tos: u8,
    /// 출발지 AS 번호
    pub src_as: u32,
    /// 목적지 AS 번호
    pub dst_as: u32,
    /// 출발지 프리픽스 길이
    pub src_mask: u8,
    /// 목적지 프리픽스 길이
    pub dst_mask: u8,
    /// 플로우 시작 시각 (epoch 초)
    pub time_flow_start: u64,
    /// 플로우 종료 시각 (epoch 초)
    pub time_flow_end: u64,
    /// 샘플링 주기 (0이면 샘플링 없음)
    pub sampling_rate: u64,
}

impl Default for FlowRecord {
    fn default() -> Self {
        Self {
            time_received: 0,
            sequence_num: 0,
            sampler_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dst_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            next_hop: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_port: 0,
            in_if: 0,
            out_if: 0,
            bytes: 0,
            packets: 0,
            proto: 0,
            tcp_flags: 0,
            tos: 0,
            src_as: 0,
            dst_as: 0,
            src_mask: 0,
            dst_mask: 0,
            time_flow_start: 0,
            time_flow_end: 0,
            sampling_rate: 0,
        }
    }
}

impl fmt::Display for FlowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} proto={} bytes={} packets={} sampler={}",
            self.src_addr,
            self.src_port,
            self.dst_addr,
            self.dst_port,
            self.proto,
            self.bytes,
            self.packets,
            self.sampler_address,
        )
    }
}

/// 익스포트 패킷 헤더의 시퀀스 정보
///
/// 시퀀스/카운트 쌍이 없는 프로토콜은 이 정보를 생성하지 않으며,
/// 그 경우 누락 추적이 수행되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInfo {
    /// 헤더의 raw 시퀀스 번호
    pub sequence: u32,
    /// 이 패킷이 담은 레코드 수
    pub record_count: u16,
    /// 익스포터가 주소당 여러 독립 카운터를 다중화할 때의
    /// 하위 식별자 (예: engine type/id, observation domain)
    pub stream_id: Option<String>,
}

/// 디코딩된 익스포트 패킷
///
/// 디코더가 생성하고 디코드 워커가 소비하는 중간 형식입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    /// 프로토콜 버전 (예: NetFlow v5면 5)
    pub version: u16,
    /// 누락 추적에 쓰이는 시퀀스 정보
    pub sequence: Option<SequenceInfo>,
    /// 정규화된 플로우 레코드들
    pub records: Vec<FlowRecord>,
}

/// 포맷팅된 레코드 — 트랜스포트 전달 단위
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedRecord {
    /// 파티셔닝 키 (일반적으로 익스포터 주소)
    pub key: Bytes,
    /// 직렬화된 페이로드
    pub payload: Bytes,
}
