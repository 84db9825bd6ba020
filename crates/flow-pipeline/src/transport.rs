//! 트랜스포트 구현
//!
//! core의 [`Transport`](flowgate_core::pipeline::Transport) trait
//! 구현체를 제공합니다. 전달은 파이프라인 관점에서 fire-and-forget이며,
//! 실패는 여기서 로깅/카운트로 끝나고 패킷 처리 경로로 역류하지 않습니다.

use std::io::Write;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use flowgate_core::pipeline::{BoxFuture, Transport};
use flowgate_core::types::FormattedRecord;

/// mpsc 채널 트랜스포트
///
/// 데몬에서 하류 소비자와 연결하거나 테스트에서 전달 결과를 관찰할 때
/// 사용합니다.
pub struct ChannelTransport {
    tx: mpsc::Sender<FormattedRecord>,
}

impl ChannelTransport {
    /// 채널 트랜스포트와 수신측을 생성합니다.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<FormattedRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, record: FormattedRecord) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.tx.send(record).await {
                // 수신측이 사라진 경우: 레코드는 드롭되고 파이프라인은 계속 동작
                warn!(error = %e, "transport receiver closed, dropping record");
            }
        })
    }
}

/// 표준 출력 트랜스포트
///
/// 레코드 페이로드를 한 줄씩 stdout에 씁니다. 별도 설정 없이 동작하는
/// 기본 트랜스포트입니다.
pub struct StdoutTransport;

impl Transport for StdoutTransport {
    fn send(&self, record: FormattedRecord) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut out = std::io::stdout().lock();
            if let Err(e) = out
                .write_all(&record.payload)
                .and_then(|()| out.write_all(b"\n"))
            {
                debug!(error = %e, "stdout write failed, dropping record");
            }
        })
    }
}
