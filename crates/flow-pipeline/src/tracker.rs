//! 시퀀스 갭 추적 -- 익스포터별 누락 레코드 추정
//!
//! 익스포트 패킷 헤더의 32비트 시퀀스 카운터를 바탕으로, 소스별로
//! "전송 중 유실된 것으로 추정되는 레코드 수"를 증분으로 계산합니다.
//!
//! UDP 특성상 관측은 재정렬/중복/카운터 리셋이 섞인 채 도착합니다.
//! 추적기는 이를 다음 규칙으로 흡수합니다:
//! - 작은 음수 갭(임계값 미만)은 재정렬 노이즈로 보고 보고하지 않음
//! - 임계값 이상의 음수 갭은 익스포터 리셋(재부팅)으로 보고 재시드
//! - 이미 보고한 누락분은 다시 보고하지 않음 (증분 회계)
//!
//! # 알려진 한계
//! raw 시퀀스는 부호 있는 64비트로 비교하며 2^32 모듈러 연산을 하지
//! 않습니다. 카운터가 최대값을 넘어 0 근처로 되돌아가는 진짜 래핑은
//! 리셋과 구분되지 않습니다.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Mutex;

/// 하나의 독립 시퀀스 스트림을 식별하는 키
///
/// 익스포터 주소와, 프로토콜이 주소당 여러 카운터를 다중화하는 경우의
/// 하위 식별자로 구성됩니다. 키가 다른 스트림은 서로 완전히 독립적으로
/// 추적됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey(String);

impl SourceKey {
    /// 임의의 문자열 키를 생성합니다.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// 익스포터 주소와 선택적 스트림 식별자로 키를 만듭니다.
    pub fn for_stream(exporter: IpAddr, stream_id: Option<&str>) -> Self {
        match stream_id {
            Some(id) => Self(format!("{exporter}|{id}")),
            None => Self(exporter.to_string()),
        }
    }

    /// 키 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `observe` 호출 1회의 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapObservation {
    /// 이번 관측으로 새로 누락된 것으로 판정된 레코드 수 (항상 ≥ 0)
    pub newly_missing: u64,
    /// 익스포터 시퀀스 카운터 리셋이 감지됨
    pub sequence_reset: bool,
}

impl GapObservation {
    const NONE: Self = Self {
        newly_missing: 0,
        sequence_reset: false,
    };
}

/// 키 하나의 추적 상태 -- 순수 상태 기계
///
/// 레지스트리 락 안에서만 변경됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackerState {
    /// 지금까지 수신됐어야 할 레코드 수의 누계.
    /// 첫 관측의 raw 시퀀스로 시드되고, 이후 관측마다 레코드 수만큼 증가.
    accumulated_count: i64,
    /// 마지막으로 호출자에게 보고한 누적 누락값.
    /// 같은 유실을 두 번 보고하지 않기 위한 기준점.
    last_reported_missing: i64,
}

impl TrackerState {
    fn seeded(sequence: u32) -> Self {
        Self {
            accumulated_count: i64::from(sequence),
            last_reported_missing: 0,
        }
    }

    /// 관측 1건을 적용하고 새로 누락된 레코드 수를 계산합니다.
    fn apply(
        &mut self,
        sequence: u32,
        record_count: u16,
        max_negative_sequence_difference: i64,
    ) -> GapObservation {
        self.accumulated_count += i64::from(record_count);

        // 스트림 시작 이후의 누적 갭. 재정렬 시 일시적으로 음수가 될 수 있음.
        let total_missing = i64::from(sequence) - self.accumulated_count;

        // 누락값이 음수로 크게 벌어지면 익스포터 카운터 리셋(재부팅)이거나
        // 완전히 어긋난 스트림으로 판정하고 현재 시퀀스로 재시드합니다.
        if total_missing <= -max_negative_sequence_difference {
            self.accumulated_count = i64::from(sequence);
            self.last_reported_missing = 0;
            return GapObservation {
                newly_missing: 0,
                sequence_reset: true,
            };
        }

        let delta = total_missing - self.last_reported_missing;
        if delta > 0 {
            self.last_reported_missing = total_missing;
            GapObservation {
                newly_missing: delta.unsigned_abs(),
                sequence_reset: false,
            }
        } else {
            GapObservation::NONE
        }
    }
}

/// 시퀀스 갭 추적 레지스트리
///
/// 키 → [`TrackerState`] 매핑과 락 규율을 소유합니다. 유일한 공개
/// 연산은 [`observe`](Self::observe)이며, 키 하나에 대한
/// 읽기-수정-쓰기 전체가 하나의 임계 구역입니다. 서로 다른 키의 갱신이
/// 일관성을 맞출 필요는 없으므로 레지스트리 전역 락 하나로 직렬화합니다.
///
/// 키는 첫 관측 시 생성되고 프로세스 수명 동안 유지됩니다(만료 없음).
pub struct SequenceGapTracker {
    states: Mutex<HashMap<SourceKey, TrackerState>>,
    max_negative_sequence_difference: i64,
}

impl SequenceGapTracker {
    /// 새 추적기를 생성합니다.
    ///
    /// `max_negative_sequence_difference`는 재정렬 노이즈와 카운터 리셋을
    /// 구분하는 임계값으로, 양수여야 합니다 (설정 검증에서 보장).
    pub fn new(max_negative_sequence_difference: i64) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            max_negative_sequence_difference,
        }
    }

    /// 관측 1건을 기록하고 새로 누락된 레코드 수를 반환합니다.
    ///
    /// 키의 첫 관측은 상태를 시드만 하고 항상 0을 반환합니다. 이 함수에는
    /// 실패 경로가 없습니다: 어떤 시퀀스/카운트 조합도 유효한 입력입니다.
    /// 같은 키에 대한 동시 호출은 락으로 직렬화됩니다.
    pub fn observe(&self, key: &SourceKey, sequence: u32, record_count: u16) -> GapObservation {
        let mut states = match self.states.lock() {
            Ok(guard) => guard,
            // 관측 중 패닉은 없으므로 poisoning은 실질적으로 발생하지 않지만,
            // 발생하더라도 상태는 여전히 일관적이므로 그대로 이어서 사용한다.
            Err(poisoned) => poisoned.into_inner(),
        };

        match states.get_mut(key) {
            None => {
                states.insert(key.clone(), TrackerState::seeded(sequence));
                GapObservation::NONE
            }
            Some(state) => {
                state.apply(sequence, record_count, self.max_negative_sequence_difference)
            }
        }
    }

    /// 현재 추적 중인 스트림 수를 반환합니다.
    pub fn tracked_sources(&self) -> usize {
        match self.states.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
