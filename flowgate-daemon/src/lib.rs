//! flowgate-daemon 라이브러리 — 통합 테스트에서 재사용하는 모듈 공개

pub mod cli;
pub mod logging;
pub mod metrics_server;
