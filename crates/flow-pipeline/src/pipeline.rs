//! 파이프라인 오케스트레이션 -- 수신/디코딩/추적/전달의 전체 흐름을 관리합니다.
//!
//! [`FlowPipeline`]은 core의 [`Pipeline`](flowgate_core::pipeline::Pipeline)
//! trait을 구현하여 `flowgate-daemon`에서 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! UDP socket(s) -> DecodeWorker[0..N] -> FlowDecoder -> SequenceGapTracker
//!                                     -> RecordFormatter -> Transport
//! ```
//!
//! 워커마다 소켓을 하나씩 소유하며, 시작은 모든 소켓 바인드가 성공한
//! 경우에만 성공합니다. 정지는 취소 신호를 브로드캐스트한 뒤 모든 워커의
//! 종료를 대기합니다.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use flowgate_core::error::{FlowgateError, PipelineError};
use flowgate_core::pipeline::{FlowDecoder, HealthStatus, Pipeline, RecordFormatter, Transport};

use crate::config::PipelineConfig;
use crate::decoder;
use crate::error::FlowPipelineError;
use crate::format::JsonFormatter;
use crate::receiver::bind_worker_socket;
use crate::tracker::SequenceGapTracker;
use crate::transport::StdoutTransport;
use crate::worker::DecodeWorker;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 플로우 수신 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use flowgate_core::pipeline::Pipeline;
/// use flowgate_flow_pipeline::{FlowPipeline, FlowPipelineBuilder};
///
/// let mut pipeline = FlowPipelineBuilder::new()
///     .config(config)
///     .build()?;
///
/// pipeline.start().await?;
/// // ...
/// pipeline.stop().await?;
/// ```
pub struct FlowPipeline {
    /// 파이프라인 설정
    config: PipelineConfig,
    /// 현재 상태
    state: PipelineState,
    /// 익스포트 패킷 디코더
    decoder: Arc<dyn FlowDecoder>,
    /// 레코드 포매터
    formatter: Arc<dyn RecordFormatter>,
    /// 하류 트랜스포트
    transport: Arc<dyn Transport>,
    /// 시퀀스 갭 추적 레지스트리 (워커 간 공유)
    tracker: Arc<SequenceGapTracker>,
    /// 워커 정지 신호
    cancel: CancellationToken,
    /// 워커 태스크 핸들
    workers: Vec<JoinHandle<()>>,
    /// 실제 바인드된 소켓 주소들 (포트 0 바인드 시 확정된 포트 확인용)
    local_addrs: Vec<std::net::SocketAddr>,
}

impl FlowPipeline {
    /// 현재 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 실제 바인드된 소켓 주소들을 반환합니다. 실행 중에만 비어있지 않습니다.
    pub fn local_addrs(&self) -> &[std::net::SocketAddr] {
        &self.local_addrs
    }

    /// 현재 추적 중인 익스포터 스트림 수를 반환합니다.
    pub fn tracked_sources(&self) -> usize {
        self.tracker.tracked_sources()
    }
}

impl Pipeline for FlowPipeline {
    async fn start(&mut self) -> Result<(), FlowgateError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let addr = self.config.parsed_listen_addr().map_err(FlowgateError::from)?;
        info!(
            listen_addr = %addr,
            workers = self.config.workers,
            decoder = self.decoder.name(),
            "starting flow pipeline"
        );

        // 1. 워커별 소켓 바인드. 하나라도 실패하면 이미 확보한 소켓을
        //    해제하고 원자적으로 실패합니다.
        let mut bind_addr = addr;
        let mut sockets = Vec::with_capacity(self.config.workers);
        for _ in 0..self.config.workers {
            match bind_worker_socket(
                bind_addr,
                self.config.reuse_port,
                self.config.recv_buffer_size,
            ) {
                Ok(socket) => {
                    // 포트 0 바인드는 첫 소켓이 확정한 포트를 나머지 워커가 공유
                    if bind_addr.port() == 0 {
                        if let Ok(local) = socket.local_addr() {
                            bind_addr.set_port(local.port());
                        }
                    }
                    sockets.push(socket);
                }
                Err(e) => {
                    drop(sockets);
                    return Err(e.into());
                }
            }
        }

        let mut local_addrs = Vec::with_capacity(sockets.len());
        for socket in &sockets {
            let local = socket
                .local_addr()
                .map_err(|e| FlowgateError::from(FlowPipelineError::Io(e)))?;
            local_addrs.push(local);
        }
        self.local_addrs = local_addrs;

        // 2. 워커 태스크 스폰
        self.cancel = CancellationToken::new();
        for (id, socket) in sockets.into_iter().enumerate() {
            let worker = DecodeWorker::new(
                id,
                socket,
                self.local_addrs[id].to_string(),
                Arc::clone(&self.decoder),
                Arc::clone(&self.formatter),
                Arc::clone(&self.transport),
                Arc::clone(&self.tracker),
                self.cancel.clone(),
            );
            self.workers.push(tokio::spawn(worker.run()));
        }

        self.state = PipelineState::Running;
        info!("flow pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), FlowgateError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping flow pipeline");

        // 1. 정지 신호 브로드캐스트: 워커는 새 수신을 멈추고 진행 중인
        //    처리를 마친 뒤 종료합니다.
        self.cancel.cancel();

        // 2. 모든 워커 종료 대기 (소켓은 워커 종료와 함께 해제됨)
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "decode worker task failed");
            }
        }

        self.local_addrs.clear();
        self.state = PipelineState::Stopped;
        info!("flow pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let exited = self.workers.iter().filter(|h| h.is_finished()).count();
                if exited == 0 {
                    HealthStatus::Healthy
                } else if exited < self.workers.len() {
                    // 일부 워커가 소켓 에러로 멈춤: 나머지는 계속 동작 중
                    HealthStatus::Degraded(format!(
                        "{exited}/{} workers exited",
                        self.workers.len()
                    ))
                } else {
                    HealthStatus::Unhealthy("all workers exited".to_owned())
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 플로우 파이프라인 빌더
///
/// 협력자를 지정하지 않으면 설정의 디코더 이름, JSON 포매터,
/// stdout 트랜스포트가 사용됩니다.
pub struct FlowPipelineBuilder {
    config: PipelineConfig,
    decoder: Option<Arc<dyn FlowDecoder>>,
    formatter: Option<Arc<dyn RecordFormatter>>,
    transport: Option<Arc<dyn Transport>>,
}

impl FlowPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            decoder: None,
            formatter: None,
            transport: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 디코더를 직접 지정합니다 (설정의 `decoder` 이름보다 우선).
    pub fn decoder(mut self, decoder: Arc<dyn FlowDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// 포매터를 지정합니다.
    pub fn formatter(mut self, formatter: Arc<dyn RecordFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// 트랜스포트를 지정합니다.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<FlowPipeline, FlowPipelineError> {
        self.config.validate()?;

        let decoder = match self.decoder {
            Some(decoder) => decoder,
            None => {
                decoder::by_name(&self.config.decoder).ok_or_else(|| {
                    FlowPipelineError::Config {
                        field: "decoder".to_owned(),
                        reason: format!("unknown decoder '{}'", self.config.decoder),
                    }
                })?
            }
        };

        let tracker = Arc::new(SequenceGapTracker::new(
            self.config.max_negative_sequence_difference,
        ));

        Ok(FlowPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            decoder,
            formatter: self.formatter.unwrap_or_else(|| Arc::new(JsonFormatter)),
            transport: self.transport.unwrap_or_else(|| Arc::new(StdoutTransport)),
            tracker,
            cancel: CancellationToken::new(),
            workers: Vec::new(),
            local_addrs: Vec::new(),
        })
    }
}

impl Default for FlowPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> PipelineConfig {
        PipelineConfig {
            listen_addr: "127.0.0.1:0".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn builder_creates_initialized_pipeline() {
        let pipeline = FlowPipelineBuilder::new().build().unwrap();
        assert_eq!(pipeline.state_name(), "initialized");
        assert_eq!(pipeline.tracked_sources(), 0);
        assert!(pipeline.local_addrs().is_empty());
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let config = PipelineConfig {
            workers: 0,
            ..Default::default()
        };
        let result = FlowPipelineBuilder::new().config(config).build();
        assert!(matches!(result, Err(FlowPipelineError::Config { .. })));
    }

    #[tokio::test]
    async fn lifecycle_start_and_stop() {
        let mut pipeline = FlowPipelineBuilder::new()
            .config(loopback_config())
            .build()
            .unwrap();

        assert!(pipeline.health_check().await.is_unhealthy());

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.state_name(), "running");
        assert_eq!(pipeline.local_addrs().len(), 1);
        assert!(pipeline.health_check().await.is_healthy());

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state_name(), "stopped");
        assert!(pipeline.health_check().await.is_unhealthy());
    }

    #[tokio::test]
    async fn stop_before_start_fails() {
        let mut pipeline = FlowPipelineBuilder::new()
            .config(loopback_config())
            .build()
            .unwrap();
        let err = pipeline.stop().await.unwrap_err();
        assert!(matches!(
            err,
            FlowgateError::Pipeline(PipelineError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn double_start_fails() {
        let mut pipeline = FlowPipelineBuilder::new()
            .config(loopback_config())
            .build()
            .unwrap();
        pipeline.start().await.unwrap();

        let err = pipeline.start().await.unwrap_err();
        assert!(matches!(
            err,
            FlowgateError::Pipeline(PipelineError::AlreadyRunning)
        ));

        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_fails_atomically_on_bind_conflict() {
        // 같은 포트를 먼저 점유해 바인드 실패를 유도
        let blocker = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let taken = blocker.local_addr().unwrap();

        let config = PipelineConfig {
            listen_addr: taken.to_string(),
            ..Default::default()
        };
        let mut pipeline = FlowPipelineBuilder::new().config(config).build().unwrap();

        let err = pipeline.start().await.unwrap_err();
        assert!(matches!(
            err,
            FlowgateError::Pipeline(PipelineError::Bind { .. })
        ));
        assert_eq!(pipeline.state_name(), "initialized");
        assert!(pipeline.local_addrs().is_empty());
        assert!(pipeline.health_check().await.is_unhealthy());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn multiple_workers_share_port_with_reuse() {
        let config = PipelineConfig {
            listen_addr: "127.0.0.1:0".to_owned(),
            workers: 2,
            reuse_port: true,
            ..Default::default()
        };
        let mut pipeline = FlowPipelineBuilder::new().config(config).build().unwrap();
        pipeline.start().await.unwrap();

        // 첫 소켓이 확정한 포트를 나머지 워커도 공유했는지 확인
        assert_eq!(pipeline.local_addrs().len(), 2);
        assert_eq!(pipeline.local_addrs()[0], pipeline.local_addrs()[1]);

        pipeline.stop().await.unwrap();
    }
}
