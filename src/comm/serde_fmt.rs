//! 线上格式：日期 `YYYY-MM-DD`，时间 `YYYY-MM-DD HH:MM:SS`，金额保留两位小数
//! Wire formats: dates `YYYY-MM-DD`, timestamps `YYYY-MM-DD HH:MM:SS`, money with two decimals.

use chrono::{NaiveDate, NaiveDateTime};

pub const DATE_FMT: &str = "%Y-%m-%d";
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
pub const MONTH_FMT: &str = "%Y-%m";

/// 金额四舍五入到分 / Round money to cents
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FMT).ok()
}

/// 解析 `YYYY-MM` 为当月第一天 / Parse `YYYY-MM` into the first day of that month
pub fn parse_month(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() != 7 {
        return None;
    }
    NaiveDate::parse_from_str(&format!("{}-01", s), DATE_FMT).ok()
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

pub mod datetime {
    use super::DATETIME_FMT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(DATETIME_FMT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, DATETIME_FMT).map_err(serde::de::Error::custom)
    }
}

pub mod option_datetime {
    use super::DATETIME_FMT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => s.serialize_str(&dt.format(DATETIME_FMT).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            Some(raw) if !raw.is_empty() => NaiveDateTime::parse_from_str(&raw, DATETIME_FMT)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(10.005_f64 + 0.0000001), 10.01);
        assert_eq!(round2(0.1 + 0.2), 0.3);
        assert_eq!(round2(-1.234), -1.23);
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("2025-03"), NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(parse_month("2025-3"), None);
        assert_eq!(parse_month("2025-13"), None);
    }

    #[test]
    fn test_datetime_wire_format() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct W {
            #[serde(with = "super::datetime")]
            at: NaiveDateTime,
        }
        let at = NaiveDate::from_ymd_opt(2025, 4, 25)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        let json = serde_json::to_string(&W { at }).unwrap();
        assert_eq!(json, r#"{"at":"2025-04-25 23:59:59"}"#);
        let back: W = serde_json::from_str(&json).unwrap();
        assert_eq!(back.at, at);
    }
}
