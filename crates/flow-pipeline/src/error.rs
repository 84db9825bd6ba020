//! 플로우 파이프라인 에러 타입
//!
//! [`FlowPipelineError`]는 파이프라인 기동/설정 단계에서 발생하는 에러를
//! 표현합니다. `From<FlowPipelineError> for FlowgateError` 변환이 구현되어
//! 있어 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 패킷 처리 경로(디코딩/포맷팅)의 실패는 여기로 전파되지 않고 데이터그램
//! 또는 레코드 단위로 드롭/카운트됩니다.

use flowgate_core::error::{FlowgateError, PipelineError};

/// 플로우 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum FlowPipelineError {
    /// UDP 소켓 바인드 실패
    #[error("bind error: {addr}: {reason}")]
    Bind {
        /// 바인드하려던 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FlowPipelineError> for FlowgateError {
    fn from(err: FlowPipelineError) -> Self {
        match err {
            FlowPipelineError::Bind { addr, reason } => {
                FlowgateError::Pipeline(PipelineError::Bind { addr, reason })
            }
            other => FlowgateError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
