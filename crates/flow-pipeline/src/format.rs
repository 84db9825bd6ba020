//! 레코드 포매터 구현
//!
//! core의 [`RecordFormatter`](flowgate_core::pipeline::RecordFormatter)
//! trait 구현체를 제공합니다.

use bytes::Bytes;

use flowgate_core::error::FormatError;
use flowgate_core::pipeline::RecordFormatter;
use flowgate_core::types::{FlowRecord, FormattedRecord};

/// JSON 라인 포매터
///
/// 레코드 하나를 JSON 오브젝트 한 줄로 직렬화합니다. 파티셔닝 키는
/// 익스포터 주소 문자열입니다.
pub struct JsonFormatter;

impl RecordFormatter for JsonFormatter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn format(&self, record: &FlowRecord) -> Result<FormattedRecord, FormatError> {
        let payload = serde_json::to_vec(record).map_err(|e| FormatError::Serialize(e.to_string()))?;
        Ok(FormattedRecord {
            key: Bytes::from(record.sampler_address.to_string()),
            payload: Bytes::from(payload),
        })
    }
}
