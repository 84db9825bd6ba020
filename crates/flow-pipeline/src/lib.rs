//! Flowgate 플로우 수신 파이프라인
//!
//! UDP로 도착하는 NetFlow 계열 익스포트 패킷을 수신/디코딩하고,
//! 소스별 시퀀스 갭을 추적하여 누락 레코드를 추정하며, 정규화된
//! 플로우 레코드를 포매터/트랜스포트로 전달합니다.
//!
//! # 아키텍처
//! ```text
//! UDP socket(s) -> DecodeWorker[0..N] -> FlowDecoder -> SequenceGapTracker
//!                                     -> RecordFormatter -> Transport
//! ```
//!
//! [`FlowPipeline`]은 core의 [`Pipeline`](flowgate_core::pipeline::Pipeline)
//! trait을 구현하여 `flowgate-daemon`에서 생명주기로 관리됩니다.

pub mod config;
pub mod decoder;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod receiver;
pub mod tracker;
pub mod transport;

mod worker;

pub use config::PipelineConfig;
pub use decoder::NetFlowV5Decoder;
pub use error::FlowPipelineError;
pub use format::JsonFormatter;
pub use pipeline::{FlowPipeline, FlowPipelineBuilder};
pub use receiver::RawPacket;
pub use tracker::{GapObservation, SequenceGapTracker, SourceKey};
pub use transport::{ChannelTransport, StdoutTransport};
