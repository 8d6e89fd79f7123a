use actix_web::HttpRequest;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::comm::serde_fmt::{parse_date, DATETIME_FMT};
use crate::error::{AppError, AppResult};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// `?id=` 查询参数
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IdQuery {
    pub id: i64,
}

/// 读取 `Idempotency-Key` 请求头；缺省或空白视为未提供
pub fn idempotency_key(req: &HttpRequest) -> AppResult<Option<String>> {
    let Some(value) = req.headers().get(IDEMPOTENCY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| AppError::bad_request("bad-request", "Idempotency-Key 必须为 ASCII"))?
        .trim();
    if key.is_empty() {
        return Ok(None);
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::bad_request(
            "bad-request",
            format!("Idempotency-Key 超过 {} 字符", MAX_IDEMPOTENCY_KEY_LEN),
        ));
    }
    Ok(Some(key.to_string()))
}

/// 解析 `YYYY-MM-DD` 字段
pub fn date_field(field: &str, raw: &str) -> AppResult<NaiveDate> {
    parse_date(raw).ok_or_else(|| {
        AppError::bad_request("bad-request", format!("{} 应为 YYYY-MM-DD: {}", field, raw))
    })
}

/// 时间范围边界：接受 `YYYY-MM-DD HH:MM:SS` 或 `YYYY-MM-DD`（取当日起点或终点）
pub fn datetime_bound(field: &str, raw: &str, end_of_day: bool) -> AppResult<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, DATETIME_FMT) {
        return Ok(dt);
    }
    let date = parse_date(raw).ok_or_else(|| {
        AppError::bad_request(
            "bad-request",
            format!("{} 应为 YYYY-MM-DD 或 YYYY-MM-DD HH:MM:SS: {}", field, raw),
        )
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };
    time.map(|t| date.and_time(t))
        .ok_or_else(|| AppError::internal("invalid time of day"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_idempotency_key_header() {
        let req = TestRequest::default()
            .insert_header((IDEMPOTENCY_HEADER, " abc-1 "))
            .to_http_request();
        assert_eq!(idempotency_key(&req).unwrap().as_deref(), Some("abc-1"));

        let req = TestRequest::default().to_http_request();
        assert_eq!(idempotency_key(&req).unwrap(), None);

        let req = TestRequest::default()
            .insert_header((IDEMPOTENCY_HEADER, "k".repeat(129)))
            .to_http_request();
        assert_eq!(idempotency_key(&req).unwrap_err().reason(), "bad-request");
    }

    #[test]
    fn test_datetime_bounds() {
        let from = datetime_bound("created_from", "2025-03-01", false).unwrap();
        assert_eq!(from.to_string(), "2025-03-01 00:00:00");
        let to = datetime_bound("created_to", "2025-03-31", true).unwrap();
        assert_eq!(to.to_string(), "2025-03-31 23:59:59");
        let exact = datetime_bound("created_to", "2025-03-31 08:30:00", true).unwrap();
        assert_eq!(exact.to_string(), "2025-03-31 08:30:00");
        assert!(datetime_bound("created_from", "31/03/2025", false).is_err());
        assert!(date_field("purchase_date", "2025-02-30").is_err());
    }
}
