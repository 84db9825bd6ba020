//! UDP 수신 -- 워커별 소켓 준비와 데이터그램 핸드오프 타입
//!
//! 워커마다 독립 소켓을 하나씩 바인드합니다. `reuse_port`가 켜진 경우
//! SO_REUSEPORT를 설정해 커널이 같은 포트의 데이터그램을 워커 소켓들에
//! 분산하도록 합니다. 재사용 없이 같은 주소/포트에 소켓 여러 개를
//! 바인드하는 구성은 설정 검증 단계에서 거부됩니다.

use std::net::SocketAddr;
use std::time::SystemTime;

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::FlowPipelineError;

/// 수신된 원시 데이터그램
///
/// 수신 루프가 생성하고 디코드 워커가 소비하는 중간 데이터 형식입니다.
#[derive(Debug, Clone)]
pub struct RawPacket {
    /// 데이터그램 페이로드
    pub payload: Bytes,
    /// 송신자(익스포터) 주소
    pub peer: SocketAddr,
    /// 수신 시각. 외부에서 타임스탬프가 공급되지 않으면 수신 시점의
    /// 벽시계 시간이 들어갑니다.
    pub received_at: SystemTime,
}

impl RawPacket {
    /// 수신 시점을 현재 시각으로 찍은 RawPacket을 생성합니다.
    pub fn new(payload: Bytes, peer: SocketAddr) -> Self {
        Self {
            payload,
            peer,
            received_at: SystemTime::now(),
        }
    }

    /// 외부 공급 타임스탬프로 수신 시각을 지정합니다.
    pub fn with_received_at(mut self, received_at: SystemTime) -> Self {
        self.received_at = received_at;
        self
    }
}

/// 워커 하나가 사용할 UDP 소켓을 바인드합니다.
///
/// tokio 소켓 생성 전에 SO_REUSEPORT와 수신 버퍼 크기를 지정해야 하므로
/// `socket2`로 소켓을 만든 뒤 변환합니다.
pub(crate) fn bind_worker_socket(
    addr: SocketAddr,
    reuse_port: bool,
    recv_buffer_size: usize,
) -> Result<UdpSocket, FlowPipelineError> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| bind_error(addr, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| bind_error(addr, e))?;

    if reuse_port {
        #[cfg(unix)]
        socket
            .set_reuse_port(true)
            .map_err(|e| bind_error(addr, e))?;
        #[cfg(not(unix))]
        return Err(FlowPipelineError::Config {
            field: "reuse_port".to_owned(),
            reason: "SO_REUSEPORT is not supported on this platform".to_owned(),
        });
    }
    if recv_buffer_size > 0 {
        socket
            .set_recv_buffer_size(recv_buffer_size)
            .map_err(|e| bind_error(addr, e))?;
    }

    socket.bind(&addr.into()).map_err(|e| bind_error(addr, e))?;
    UdpSocket::from_std(socket.into()).map_err(|e| bind_error(addr, e))
}

fn bind_error(addr: SocketAddr, err: std::io::Error) -> FlowPipelineError {
    FlowPipelineError::Bind {
        addr: addr.to_string(),
        reason: err.to_string(),
    }
}
