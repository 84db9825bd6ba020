//! 플로우 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`PipelineSection`](flowgate_core::config::PipelineSection)을
//! 기반으로 파이프라인 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use flowgate_core::config::FlowgateConfig;
//! use flowgate_flow_pipeline::config::PipelineConfig;
//!
//! let core_config = FlowgateConfig::default();
//! let config = PipelineConfig::from_core(&core_config.pipeline);
//! ```

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::decoder;
use crate::error::FlowPipelineError;

/// 플로우 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 디코더 이름
    pub decoder: String,
    /// UDP 수신 바인드 주소
    pub listen_addr: String,
    /// 병렬 디코드 워커 수
    pub workers: usize,
    /// SO_REUSEPORT로 워커들이 포트를 공유할지 여부
    pub reuse_port: bool,
    /// 소켓 수신 버퍼 크기 (바이트, 0이면 커널 기본값)
    pub recv_buffer_size: usize,
    /// 시퀀스 리셋 판정 임계값 (누적 갭, 양수)
    pub max_negative_sequence_difference: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decoder: "netflow_v5".to_owned(),
            listen_addr: "0.0.0.0:2055".to_owned(),
            workers: 1,
            reuse_port: false,
            recv_buffer_size: 256 * 1024, // 256KB
            max_negative_sequence_difference: 1000,
        }
    }
}

impl PipelineConfig {
    /// core의 `PipelineSection`에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &flowgate_core::config::PipelineSection) -> Self {
        Self {
            enabled: core.enabled,
            decoder: core.decoder.clone(),
            listen_addr: core.listen_addr.clone(),
            workers: core.workers,
            reuse_port: core.reuse_port,
            recv_buffer_size: core.recv_buffer_size,
            max_negative_sequence_difference: core.max_negative_sequence_difference,
        }
    }

    /// 설정 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FlowPipelineError> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(FlowPipelineError::Config {
                field: "listen_addr".to_owned(),
                reason: format!("'{}' is not a valid socket address", self.listen_addr),
            });
        }
        if self.workers == 0 {
            return Err(FlowPipelineError::Config {
                field: "workers".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        // 같은 주소/포트에 재사용 없이 여러 소켓을 바인드하는 구성은 유효하지 않음
        if self.workers > 1 && !self.reuse_port {
            return Err(FlowPipelineError::Config {
                field: "reuse_port".to_owned(),
                reason: format!("{} workers sharing one port require reuse_port", self.workers),
            });
        }
        if self.max_negative_sequence_difference <= 0 {
            return Err(FlowPipelineError::Config {
                field: "max_negative_sequence_difference".to_owned(),
                reason: "must be strictly positive".to_owned(),
            });
        }
        if !decoder::is_known(&self.decoder) {
            return Err(FlowPipelineError::Config {
                field: "decoder".to_owned(),
                reason: format!("unknown decoder '{}'", self.decoder),
            });
        }
        Ok(())
    }

    /// 바인드 주소를 파싱해 반환합니다. `validate` 통과 이후에만 호출하세요.
    pub(crate) fn parsed_listen_addr(&self) -> Result<SocketAddr, FlowPipelineError> {
        self.listen_addr
            .parse()
            .map_err(|_| FlowPipelineError::Config {
                field: "listen_addr".to_owned(),
                reason: format!("'{}' is not a valid socket address", self.listen_addr),
            })
    }
}
