//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `flowgate_`
//! - 접미어: `_total` (counter), `_seconds`/`_bytes` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(flowgate_core::metrics::DECODER_PACKETS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 익스포터 주소 레이블 키
pub const LABEL_EXPORTER: &str = "exporter";

/// 프로토콜 버전 레이블 키 ("5" 등)
pub const LABEL_VERSION: &str = "version";

/// 디코더 이름 레이블 키 (netflow_v5 등)
pub const LABEL_DECODER: &str = "decoder";

/// 디코드 에러 분류 레이블 키 (unsupported_version, truncated, malformed)
pub const LABEL_ERROR: &str = "error";

/// 수신 소켓 주소 레이블 키
pub const LABEL_LOCAL_ADDR: &str = "local_addr";

/// 워커 인덱스 레이블 키
pub const LABEL_WORKER: &str = "worker";

// ─── 트래픽 메트릭 ──────────────────────────────────────────────────

/// 수신 바이트 수 (counter, labels: local_addr, decoder)
pub const TRAFFIC_BYTES_TOTAL: &str = "flowgate_traffic_bytes_total";

/// 수신 데이터그램 수 (counter, labels: local_addr, decoder)
pub const TRAFFIC_PACKETS_TOTAL: &str = "flowgate_traffic_packets_total";

/// 데이터그램 크기 분포 (histogram, 바이트)
pub const TRAFFIC_PACKET_SIZE_BYTES: &str = "flowgate_traffic_packet_size_bytes";

// ─── 디코더 메트릭 ──────────────────────────────────────────────────

/// 디코딩 성공 데이터그램 수 (counter, labels: worker, decoder)
pub const DECODER_PACKETS_TOTAL: &str = "flowgate_decoder_packets_total";

/// 디코딩 실패 수 (counter, labels: decoder, error)
pub const DECODER_ERRORS_TOTAL: &str = "flowgate_decoder_errors_total";

/// 디코딩 소요 시간 (histogram, 초)
pub const DECODE_DURATION_SECONDS: &str = "flowgate_decode_duration_seconds";

/// 데이터그램 전체 처리 소요 시간 (histogram, 초)
pub const PROCESS_DURATION_SECONDS: &str = "flowgate_process_duration_seconds";

// ─── 플로우 처리 메트릭 ─────────────────────────────────────────────

/// 디코딩된 플로우 레코드 수 (counter, labels: exporter, version)
pub const FLOWS_DECODED_TOTAL: &str = "flowgate_flows_decoded_total";

/// 트랜스포트로 전달된 레코드 수 (counter, labels: exporter, version)
pub const RECORDS_FORWARDED_TOTAL: &str = "flowgate_records_forwarded_total";

/// 포맷팅 실패로 드롭된 레코드 수 (counter, labels: exporter, version)
pub const FORMAT_ERRORS_TOTAL: &str = "flowgate_format_errors_total";

// ─── 시퀀스 갭 추적 메트릭 ──────────────────────────────────────────

/// 누락된 것으로 추정되는 레코드 수 (counter, labels: exporter, version)
///
/// 시퀀스 갭 추적기가 계산한 증분 값으로만 증가합니다. 절대값 게이지가
/// 아니므로 재정렬로 인한 일시적 음수는 여기 반영되지 않습니다.
pub const FLOWS_MISSING_TOTAL: &str = "flowgate_flows_missing_total";

/// 마지막으로 관측된 raw 시퀀스 번호 (gauge, labels: exporter, version)
pub const FLOWS_SEQUENCE: &str = "flowgate_flows_sequence";

/// 감지된 시퀀스 리셋 수 (counter, labels: exporter, version)
pub const SEQUENCE_RESETS_TOTAL: &str = "flowgate_sequence_resets_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 디코딩/처리 소요 시간 히스토그램 버킷 (초)
///
/// 1us ~ 100ms 범위, 로그 단위 분포
pub const DURATION_BUCKETS: [f64; 10] = [
    0.000001, 0.000005, 0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.1,
];

/// 데이터그램 크기 히스토그램 버킷 (바이트)
pub const PACKET_SIZE_BUCKETS: [f64; 8] = [
    64.0, 128.0, 256.0, 512.0, 1024.0, 1500.0, 9000.0, 65535.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// `metrics::describe_counter!()`, `describe_gauge!()`, `describe_histogram!()`을
/// 호출하여 Prometheus HELP 텍스트를 설정합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `flowgate-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // 트래픽
    describe_counter!(
        TRAFFIC_BYTES_TOTAL,
        "Total bytes received on telemetry listening sockets"
    );
    describe_counter!(
        TRAFFIC_PACKETS_TOTAL,
        "Total datagrams received on telemetry listening sockets"
    );
    describe_histogram!(
        TRAFFIC_PACKET_SIZE_BYTES,
        "Distribution of received datagram sizes in bytes"
    );

    // 디코더
    describe_counter!(
        DECODER_PACKETS_TOTAL,
        "Total datagrams successfully decoded"
    );
    describe_counter!(
        DECODER_ERRORS_TOTAL,
        "Total datagrams dropped due to decode failures, by error kind"
    );
    describe_histogram!(
        DECODE_DURATION_SECONDS,
        "Time spent decoding a single datagram in seconds"
    );
    describe_histogram!(
        PROCESS_DURATION_SECONDS,
        "End-to-end processing time of a single datagram in seconds"
    );

    // 플로우 처리
    describe_counter!(
        FLOWS_DECODED_TOTAL,
        "Total flow records produced by the decoders"
    );
    describe_counter!(
        RECORDS_FORWARDED_TOTAL,
        "Total formatted records handed to the transport"
    );
    describe_counter!(
        FORMAT_ERRORS_TOTAL,
        "Total records dropped due to formatting failures"
    );

    // 시퀀스 갭 추적
    describe_counter!(
        FLOWS_MISSING_TOTAL,
        "Estimated count of flow records lost in transit, per exporter stream"
    );
    describe_gauge!(
        FLOWS_SEQUENCE,
        "Last raw sequence number observed per exporter stream"
    );
    describe_counter!(
        SEQUENCE_RESETS_TOTAL,
        "Detected exporter sequence counter resets (reboot or desynchronized stream)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_use_flowgate_prefix() {
        for name in [
            TRAFFIC_BYTES_TOTAL,
            TRAFFIC_PACKETS_TOTAL,
            DECODER_PACKETS_TOTAL,
            DECODER_ERRORS_TOTAL,
            FLOWS_DECODED_TOTAL,
            FLOWS_MISSING_TOTAL,
            FLOWS_SEQUENCE,
            SEQUENCE_RESETS_TOTAL,
        ] {
            assert!(name.starts_with("flowgate_"), "bad prefix: {name}");
        }
    }

    #[test]
    fn duration_buckets_are_sorted() {
        let mut sorted = DURATION_BUCKETS.to_vec();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(sorted, DURATION_BUCKETS.to_vec());
    }

    #[test]
    fn describe_all_without_recorder_is_a_noop() {
        // 전역 레코더가 설치되지 않은 상태에서도 패닉 없이 동작해야 함
        describe_all();
    }
}
