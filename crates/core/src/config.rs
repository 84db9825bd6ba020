//! 설정 관리 — flowgate.toml 파싱 및 런타임 설정
//!
//! [`FlowgateConfig`]는 모든 섹션의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`FLOWGATE_PIPELINE_WORKERS=4` 형식)
//! 3. 설정 파일 (`flowgate.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), flowgate_core::error::FlowgateError> {
//! use flowgate_core::config::FlowgateConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = FlowgateConfig::load("flowgate.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = FlowgateConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, FlowgateError};

/// Flowgate 통합 설정
///
/// `flowgate.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowgateConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수신 파이프라인 설정
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// 메트릭 익스포트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 출력 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 수신 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// 활성화 여부
    pub enabled: bool,
    /// 디코더 이름 (현재 "netflow_v5" 지원)
    pub decoder: String,
    /// UDP 수신 바인드 주소 (예: "0.0.0.0:2055")
    pub listen_addr: String,
    /// 병렬 디코드 워커 수
    pub workers: usize,
    /// SO_REUSEPORT로 워커들이 포트를 공유할지 여부
    ///
    /// 워커가 2개 이상이면 반드시 활성화해야 합니다. 같은 주소/포트에
    /// 재사용 없이 여러 소켓을 바인드하는 구성은 유효하지 않습니다.
    pub reuse_port: bool,
    /// 소켓 수신 버퍼 크기 (바이트)
    pub recv_buffer_size: usize,
    /// 시퀀스 리셋 판정 임계값 (누적 갭, 양수)
    pub max_negative_sequence_difference: i64,
}

impl Default for PipelineSection {
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

/// 메트릭 익스포트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// Prometheus 스크레이프 엔드포인트 바인드 주소
    pub listen_addr: String,
    /// 바인드 포트
    pub port: u16,
    /// HTTP 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9090,
            endpoint: "/metrics".to_owned(),
        }
    }
}

impl FlowgateConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FlowgateError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowgateError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FlowgateError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                FlowgateError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FlowgateError> {
        toml::from_str(toml_str).map_err(|e| {
            FlowgateError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `FLOWGATE_{SECTION}_{FIELD}`
    /// 예: `FLOWGATE_PIPELINE_LISTEN_ADDR=0.0.0.0:9995`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "FLOWGATE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "FLOWGATE_GENERAL_LOG_FORMAT");

        // Pipeline
        override_bool(&mut self.pipeline.enabled, "FLOWGATE_PIPELINE_ENABLED");
        override_string(&mut self.pipeline.decoder, "FLOWGATE_PIPELINE_DECODER");
        override_string(
            &mut self.pipeline.listen_addr,
            "FLOWGATE_PIPELINE_LISTEN_ADDR",
        );
        override_usize(&mut self.pipeline.workers, "FLOWGATE_PIPELINE_WORKERS");
        override_bool(&mut self.pipeline.reuse_port, "FLOWGATE_PIPELINE_REUSE_PORT");
        override_usize(
            &mut self.pipeline.recv_buffer_size,
            "FLOWGATE_PIPELINE_RECV_BUFFER_SIZE",
        );
        override_i64(
            &mut self.pipeline.max_negative_sequence_difference,
            "FLOWGATE_PIPELINE_MAX_NEGATIVE_SEQUENCE_DIFFERENCE",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "FLOWGATE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "FLOWGATE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "FLOWGATE_METRICS_PORT");
    }

    /// 설정 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FlowgateError> {
        const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(invalid_value(
                "general.log_level",
                format!(
                    "'{}' is not one of {:?}",
                    self.general.log_level, LOG_LEVELS
                ),
            ));
        }

        const LOG_FORMATS: &[&str] = &["json", "pretty"];
        if !LOG_FORMATS.contains(&self.general.log_format.as_str()) {
            return Err(invalid_value(
                "general.log_format",
                format!(
                    "'{}' is not one of {:?}",
                    self.general.log_format, LOG_FORMATS
                ),
            ));
        }

        if self.pipeline.enabled {
            if self.pipeline.listen_addr.parse::<SocketAddr>().is_err() {
                return Err(invalid_value(
                    "pipeline.listen_addr",
                    format!(
                        "'{}' is not a valid socket address",
                        self.pipeline.listen_addr
                    ),
                ));
            }
            if self.pipeline.workers == 0 {
                return Err(invalid_value(
                    "pipeline.workers",
                    "must be at least 1".to_owned(),
                ));
            }
            if self.pipeline.workers > 1 && !self.pipeline.reuse_port {
                return Err(invalid_value(
                    "pipeline.workers",
                    "multiple workers require reuse_port = true".to_owned(),
                ));
            }
            if self.pipeline.max_negative_sequence_difference <= 0 {
                return Err(invalid_value(
                    "pipeline.max_negative_sequence_difference",
                    "must be strictly positive".to_owned(),
                ));
            }
        }

        if self.metrics.enabled && self.metrics.listen_addr.is_empty() {
            return Err(invalid_value(
                "metrics.listen_addr",
                "must not be empty".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid_value(field: &str, reason: String) -> FlowgateError {
    FlowgateError::Config(ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    })
}

// ─── 환경변수 오버라이드 헬퍼 ───────────────────────────────────────

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(env_key, value = %val, "ignoring invalid bool env override"),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(env_key, value = %val, "ignoring invalid integer env override"),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(env_key, value = %val, "ignoring invalid integer env override"),
        }
    }
}

fn override_i64(target: &mut i64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<i64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(env_key, value = %val, "ignoring invalid integer env override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        FlowgateConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "pretty"

[pipeline]
enabled = true
decoder = "netflow_v5"
listen_addr = "127.0.0.1:9995"
workers = 4
reuse_port = true
recv_buffer_size = 524288
max_negative_sequence_difference = 2000

[metrics]
enabled = false
listen_addr = "0.0.0.0"
port = 9100
endpoint = "/metrics"
"#;
        let config = FlowgateConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.pipeline.listen_addr, "127.0.0.1:9995");
        assert_eq!(config.pipeline.workers, 4);
        assert!(config.pipeline.reuse_port);
        assert_eq!(config.pipeline.max_negative_sequence_difference, 2000);
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 9100);
    }

    #[test]
    fn parse_partial_toml_uses_defaults() {
        let config = FlowgateConfig::parse("[general]\nlog_level = \"warn\"").unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.pipeline.listen_addr, "0.0.0.0:2055");
        assert_eq!(config.pipeline.max_negative_sequence_difference, 1000);
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let result = FlowgateConfig::parse("invalid = [[[toml");
        assert!(matches!(
            result.unwrap_err(),
            FlowgateError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = FlowgateConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = FlowgateConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_unparseable_listen_addr() {
        let mut config = FlowgateConfig::default();
        config.pipeline.listen_addr = "not-an-address".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("listen_addr"));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = FlowgateConfig::default();
        config.pipeline.workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn validate_rejects_multiple_workers_without_reuse_port() {
        let mut config = FlowgateConfig::default();
        config.pipeline.workers = 4;
        config.pipeline.reuse_port = false;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reuse_port"));
    }

    #[test]
    fn validate_rejects_non_positive_threshold() {
        let mut config = FlowgateConfig::default();
        config.pipeline.max_negative_sequence_difference = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_negative_sequence_difference"));
    }

    #[test]
    fn validate_skips_pipeline_checks_when_disabled() {
        let mut config = FlowgateConfig::default();
        config.pipeline.enabled = false;
        config.pipeline.listen_addr = "not-an-address".to_owned();
        // 파이프라인이 비활성화 상태면 해당 섹션 검증을 건너뜀
        config.validate().unwrap();
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_FLOWGATE_STR", "overridden") };
        override_string(&mut val, "TEST_FLOWGATE_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_FLOWGATE_STR") };
    }

    #[test]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_FLOWGATE_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_FLOWGATE_BOOL_BAD");
        assert!(!val); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_FLOWGATE_BOOL_BAD") };
    }

    #[test]
    fn env_override_i64() {
        let mut val = 1000i64;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_FLOWGATE_I64", "5000") };
        override_i64(&mut val, "TEST_FLOWGATE_I64");
        assert_eq!(val, 5000);
        unsafe { std::env::remove_var("TEST_FLOWGATE_I64") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_FLOWGATE_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = FlowgateConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = FlowgateConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(config.pipeline.listen_addr, parsed.pipeline.listen_addr);
        assert_eq!(config.metrics.port, parsed.metrics.port);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = FlowgateConfig::from_file("/nonexistent/path/flowgate.toml").await;
        assert!(matches!(
            result.unwrap_err(),
            FlowgateError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
