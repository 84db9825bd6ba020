//! 익스포트 패킷 디코더 모듈
//!
//! core의 [`FlowDecoder`](flowgate_core::pipeline::FlowDecoder) trait
//! 구현체들을 제공합니다. 디코더는 설정의 `decoder` 필드 이름으로
//! 선택됩니다.
//!
//! 현재 지원:
//! - [`NetFlowV5Decoder`]: NetFlow v5 (고정 레이아웃, 템플릿 없음)

pub mod netflow5;

pub use netflow5::NetFlowV5Decoder;

use std::sync::Arc;

use flowgate_core::pipeline::FlowDecoder;

/// 이름으로 디코더를 생성합니다. 알 수 없는 이름이면 `None`.
pub fn by_name(name: &str) -> Option<Arc<dyn FlowDecoder>> {
    match name {
        "netflow_v5" => Some(Arc::new(NetFlowV5Decoder)),
        _ => None,
    }
}

/// 지원하는 디코더 이름인지 확인합니다.
pub fn is_known(name: &str) -> bool {
    by_name(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netflow_v5_is_registered() {
        let decoder = by_name("netflow_v5").unwrap();
        assert_eq!(decoder.name(), "netflow_v5");
        assert!(is_known("netflow_v5"));
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(by_name("sflow").is_none());
        assert!(!is_known("sflow"));
    }
}
