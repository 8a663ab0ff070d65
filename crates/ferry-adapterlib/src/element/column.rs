use crate::errors::{ConversionError, ConversionTarget};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive, Zero};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::{
    fmt::{Display, Error as FmtError, Formatter},
    str::FromStr,
};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of value stored in a [`Column`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnKind {
    Long,
    Double,
    String,
    Bool,
    Date,
    Bytes,
    Null,
}

impl Display for ColumnKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(match self {
            Self::Long => "LONG",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::Bool => "BOOL",
            Self::Date => "DATE",
            Self::Bytes => "BYTES",
            Self::Null => "NULL",
        })
    }
}

/// Which parts of a temporal value were present in the source.
///
/// Only affects how a `DATE` column is rendered as a string.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateType {
    Date,
    Time,
    #[default]
    DateTime,
}

impl DateType {
    fn format(&self) -> &'static str {
        match self {
            Self::Date => DATE_FORMAT,
            Self::Time => TIME_FORMAT,
            Self::DateTime => DATE_TIME_FORMAT,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
enum Value {
    #[serde(serialize_with = "serialize_long")]
    Long(BigInt),
    Double(f64),
    String(String),
    Bool(bool),
    Date {
        millis: i64,
        #[serde(rename = "dateType")]
        date_type: DateType,
    },
    Bytes(Vec<u8>),
    Null,
}

/// Serializes integers that fit in `i64` as JSON numbers, larger ones as
/// strings.
fn serialize_long<S>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value.to_i64() {
        Some(v) => serializer.serialize_i64(v),
        None => serializer.collect_str(value),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            // The sub-type only affects rendering.
            (Self::Date { millis: a, .. }, Self::Date { millis: b, .. }) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Null, Self::Null) => true,
            _ => false,
        }
    }
}

/// A single typed value in a [`Record`](crate::Record).
///
/// Columns are immutable once constructed.  Every column carries an
/// estimate of its size in bytes, used by the channel for byte-rate
/// accounting.
///
/// The `as_*` conversions never fall back to a default: a conversion either
/// produces the converted value, or fails with a [`ConversionError`].  A
/// `NULL` column converts to `Ok(None)` for every target type.
#[derive(Clone, Debug)]
pub struct Column {
    value: Value,
    byte_size: usize,
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Serialize for Column {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.value.serialize(serializer)
    }
}

impl Column {
    fn new(value: Value) -> Self {
        let byte_size = match &value {
            Value::Long(v) => (v.bits() / 8 + 1) as usize,
            Value::Double(v) => v.to_string().len(),
            Value::String(v) => v.len(),
            Value::Bool(_) => 1,
            Value::Date { .. } => 8,
            Value::Bytes(v) => v.len(),
            Value::Null => 0,
        };
        Self { value, byte_size }
    }

    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    pub fn long(value: i64) -> Self {
        Self::new(Value::Long(BigInt::from(value)))
    }

    pub fn big_integer(value: BigInt) -> Self {
        Self::new(Value::Long(value))
    }

    pub fn double(value: f64) -> Self {
        Self::new(Value::Double(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(Value::String(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Value::Bool(value))
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::new(Value::Bytes(value.into()))
    }

    /// `DATE` column holding `millis` milliseconds since the Unix epoch.
    pub fn date_millis(millis: i64, date_type: DateType) -> Self {
        Self::new(Value::Date { millis, date_type })
    }

    pub fn date_time(value: DateTime<Utc>) -> Self {
        Self::date_millis(value.timestamp_millis(), DateType::DateTime)
    }

    /// `DATE` column for midnight UTC of `value`.
    pub fn date(value: NaiveDate) -> Self {
        let millis = value
            .and_time(NaiveTime::default())
            .and_utc()
            .timestamp_millis();
        Self::date_millis(millis, DateType::Date)
    }

    /// `DATE` column for `value` on the epoch day.
    pub fn time(value: NaiveTime) -> Self {
        Self::date_millis(time_millis(value), DateType::Time)
    }

    pub fn kind(&self) -> ColumnKind {
        match &self.value {
            Value::Long(_) => ColumnKind::Long,
            Value::Double(_) => ColumnKind::Double,
            Value::String(_) => ColumnKind::String,
            Value::Bool(_) => ColumnKind::Bool,
            Value::Date { .. } => ColumnKind::Date,
            Value::Bytes(_) => ColumnKind::Bytes,
            Value::Null => ColumnKind::Null,
        }
    }

    /// Sub-type of a `DATE` column; `None` for other kinds.
    pub fn date_type(&self) -> Option<DateType> {
        match &self.value {
            Value::Date { date_type, .. } => Some(*date_type),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, Value::Null)
    }

    /// Estimated size of the value in bytes.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    fn unsupported(&self, to: ConversionTarget) -> ConversionError {
        ConversionError::unsupported(self.kind(), to)
    }

    fn invalid(&self, to: ConversionTarget, reason: impl Into<String>) -> ConversionError {
        ConversionError::invalid(self.kind(), to, reason)
    }

    pub fn as_long(&self) -> Result<Option<i64>, ConversionError> {
        let to = ConversionTarget::Long;
        match &self.value {
            Value::Null => Ok(None),
            Value::Long(v) => v
                .to_i64()
                .map(Some)
                .ok_or_else(|| self.invalid(to, format!("{v} is out of range"))),
            Value::Double(v) => {
                let truncated = v.trunc();
                // `i64::MAX as f64` rounds up to 2^63, which is out of range.
                if truncated.is_finite()
                    && truncated >= i64::MIN as f64
                    && truncated < i64::MAX as f64
                {
                    Ok(Some(truncated as i64))
                } else {
                    Err(self.invalid(to, format!("{v} is out of range")))
                }
            }
            Value::String(v) => {
                let integer = parse_big_integer(v)
                    .ok_or_else(|| self.invalid(to, format!("'{v}' is not a number")))?;
                integer
                    .to_i64()
                    .map(Some)
                    .ok_or_else(|| self.invalid(to, format!("'{v}' is out of range")))
            }
            Value::Bool(v) => Ok(Some(*v as i64)),
            Value::Date { millis, .. } => Ok(Some(*millis)),
            Value::Bytes(_) => Err(self.unsupported(to)),
        }
    }

    pub fn as_double(&self) -> Result<Option<f64>, ConversionError> {
        let to = ConversionTarget::Double;
        match &self.value {
            Value::Null => Ok(None),
            Value::Long(v) => v
                .to_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(to, format!("{v} is out of range"))),
            Value::Double(v) => Ok(Some(*v)),
            Value::String(v) => v
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.invalid(to, format!("'{v}' is not a number"))),
            Value::Bool(v) => Ok(Some(if *v { 1.0 } else { 0.0 })),
            Value::Date { .. } | Value::Bytes(_) => Err(self.unsupported(to)),
        }
    }

    pub fn as_string(&self) -> Result<Option<String>, ConversionError> {
        let to = ConversionTarget::String;
        match &self.value {
            Value::Null => Ok(None),
            Value::Long(v) => Ok(Some(v.to_string())),
            Value::Double(v) => Ok(Some(v.to_string())),
            Value::String(v) => Ok(Some(v.clone())),
            Value::Bool(v) => Ok(Some(v.to_string())),
            Value::Date { millis, date_type } => DateTime::<Utc>::from_timestamp_millis(*millis)
                .map(|date| Some(date.format(date_type.format()).to_string()))
                .ok_or_else(|| self.invalid(to, format!("timestamp {millis} is out of range"))),
            Value::Bytes(v) => String::from_utf8(v.clone())
                .map(Some)
                .map_err(|e| self.invalid(to, e.to_string())),
        }
    }

    pub fn as_bool(&self) -> Result<Option<bool>, ConversionError> {
        let to = ConversionTarget::Bool;
        match &self.value {
            Value::Null => Ok(None),
            Value::Long(v) => Ok(Some(!v.is_zero())),
            Value::String(v) => {
                let v = v.trim();
                if v.eq_ignore_ascii_case("true") {
                    Ok(Some(true))
                } else if v.eq_ignore_ascii_case("false") {
                    Ok(Some(false))
                } else {
                    Err(self.invalid(to, format!("'{v}' is not a boolean")))
                }
            }
            Value::Bool(v) => Ok(Some(*v)),
            Value::Double(_) | Value::Date { .. } | Value::Bytes(_) => Err(self.unsupported(to)),
        }
    }

    pub fn as_date(&self) -> Result<Option<DateTime<Utc>>, ConversionError> {
        let to = ConversionTarget::Date;
        match &self.value {
            Value::Null => Ok(None),
            Value::Long(v) => v
                .to_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(Some)
                .ok_or_else(|| self.invalid(to, format!("timestamp {v} is out of range"))),
            Value::Date { millis, .. } => DateTime::<Utc>::from_timestamp_millis(*millis)
                .map(Some)
                .ok_or_else(|| self.invalid(to, format!("timestamp {millis} is out of range"))),
            Value::String(v) => parse_date(v)
                .map(Some)
                .ok_or_else(|| self.invalid(to, format!("'{v}' is not a date"))),
            Value::Double(_) | Value::Bool(_) | Value::Bytes(_) => Err(self.unsupported(to)),
        }
    }

    pub fn as_bytes(&self) -> Result<Option<Vec<u8>>, ConversionError> {
        match &self.value {
            Value::Null => Ok(None),
            Value::String(v) => Ok(Some(v.as_bytes().to_vec())),
            Value::Bytes(v) => Ok(Some(v.clone())),
            _ => Err(self.unsupported(ConversionTarget::Bytes)),
        }
    }

    pub fn as_big_integer(&self) -> Result<Option<BigInt>, ConversionError> {
        let to = ConversionTarget::BigInteger;
        match &self.value {
            Value::Null => Ok(None),
            Value::Long(v) => Ok(Some(v.clone())),
            Value::Double(v) => BigInt::from_f64(v.trunc())
                .map(Some)
                .ok_or_else(|| self.invalid(to, format!("{v} is not finite"))),
            Value::String(v) => parse_big_integer(v)
                .map(Some)
                .ok_or_else(|| self.invalid(to, format!("'{v}' is not a number"))),
            Value::Bool(v) => Ok(Some(BigInt::from(*v as u8))),
            Value::Date { .. } | Value::Bytes(_) => Err(self.unsupported(to)),
        }
    }

    pub fn as_big_decimal(&self) -> Result<Option<Decimal>, ConversionError> {
        let to = ConversionTarget::BigDecimal;
        match &self.value {
            Value::Null => Ok(None),
            Value::Long(v) => parse_decimal(&v.to_string())
                .map(Some)
                .ok_or_else(|| self.invalid(to, format!("{v} is out of range"))),
            Value::Double(v) => parse_decimal(&v.to_string())
                .map(Some)
                .ok_or_else(|| self.invalid(to, format!("{v} is out of range"))),
            Value::String(v) => parse_decimal(v)
                .map(Some)
                .ok_or_else(|| self.invalid(to, format!("'{v}' is not a number"))),
            Value::Bool(v) => Ok(Some(if *v { Decimal::ONE } else { Decimal::ZERO })),
            Value::Date { .. } | Value::Bytes(_) => Err(self.unsupported(to)),
        }
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Parses an integer, truncating any fractional part.
fn parse_big_integer(s: &str) -> Option<BigInt> {
    let s = s.trim();
    if let Ok(integer) = BigInt::from_str(s) {
        return Some(integer);
    }
    BigInt::from_str(&parse_decimal(s)?.trunc().to_string()).ok()
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT) {
        return Some(date.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Some(date.and_time(NaiveTime::default()).and_utc());
    }
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .ok()
        .and_then(|time| DateTime::<Utc>::from_timestamp_millis(time_millis(time)))
}

/// Milliseconds since midnight.
fn time_millis(time: NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * 1000 + (time.nanosecond() / 1_000_000) as i64
}

impl From<i64> for Column {
    fn from(value: i64) -> Self {
        Self::long(value)
    }
}

impl From<BigInt> for Column {
    fn from(value: BigInt) -> Self {
        Self::big_integer(value)
    }
}

impl From<f64> for Column {
    fn from(value: f64) -> Self {
        Self::double(value)
    }
}

impl From<bool> for Column {
    fn from(value: bool) -> Self {
        Self::bool(value)
    }
}

impl From<&str> for Column {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<String> for Column {
    fn from(value: String) -> Self {
        Self::string(value)
    }
}

impl From<Vec<u8>> for Column {
    fn from(value: Vec<u8>) -> Self {
        Self::bytes(value)
    }
}

impl From<DateTime<Utc>> for Column {
    fn from(value: DateTime<Utc>) -> Self {
        Self::date_time(value)
    }
}

impl<T> From<Option<T>> for Column
where
    Column: From<T>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Column::null, Column::from)
    }
}

#[cfg(test)]
mod test {
    use super::{Column, ColumnKind, DateType};
    use crate::errors::ConversionTarget;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use num_bigint::BigInt;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn sample_columns() -> Vec<Column> {
        vec![
            Column::long(42),
            Column::double(1.5),
            Column::string("x"),
            Column::bool(true),
            Column::date_millis(0, DateType::DateTime),
            Column::bytes(vec![1u8, 2]),
        ]
    }

    fn supports(column: &Column, target: ConversionTarget) -> Result<(), crate::ConversionError> {
        match target {
            ConversionTarget::Long => column.as_long().map(|_| ()),
            ConversionTarget::Double => column.as_double().map(|_| ()),
            ConversionTarget::String => column.as_string().map(|_| ()),
            ConversionTarget::Bool => column.as_bool().map(|_| ()),
            ConversionTarget::Date => column.as_date().map(|_| ()),
            ConversionTarget::Bytes => column.as_bytes().map(|_| ()),
            ConversionTarget::BigInteger => column.as_big_integer().map(|_| ()),
            ConversionTarget::BigDecimal => column.as_big_decimal().map(|_| ()),
        }
    }

    #[test]
    fn unsupported_conversions_fail() {
        use ConversionTarget::*;

        let unsupported: &[(ColumnKind, &[ConversionTarget])] = &[
            (ColumnKind::Long, &[Bytes]),
            (ColumnKind::Double, &[Bool, Date, Bytes]),
            (ColumnKind::Bool, &[Date, Bytes]),
            (
                ColumnKind::Date,
                &[Double, Bool, Bytes, BigInteger, BigDecimal],
            ),
            (
                ColumnKind::Bytes,
                &[Long, Double, Bool, Date, BigInteger, BigDecimal],
            ),
        ];

        for column in sample_columns() {
            let denied = unsupported
                .iter()
                .find(|(kind, _)| *kind == column.kind())
                .map(|(_, targets)| *targets)
                .unwrap_or(&[]);
            for target in denied {
                let error = supports(&column, *target).unwrap_err();
                assert_eq!(error.from, column.kind());
                assert_eq!(error.to, *target);
                assert_eq!(error.reason, None);
            }
        }
    }

    #[test]
    fn null_converts_to_none() {
        let null = Column::null();
        assert_eq!(null.kind(), ColumnKind::Null);
        assert_eq!(null.as_long(), Ok(None));
        assert_eq!(null.as_double(), Ok(None));
        assert_eq!(null.as_string(), Ok(None));
        assert_eq!(null.as_bool(), Ok(None));
        assert_eq!(null.as_date(), Ok(None));
        assert_eq!(null.as_bytes(), Ok(None));
        assert_eq!(null.as_big_integer(), Ok(None));
        assert_eq!(null.as_big_decimal(), Ok(None));
        assert_eq!(null.byte_size(), 0);
    }

    #[test]
    fn long_conversions() {
        let column = Column::long(-7);
        assert_eq!(column.as_long(), Ok(Some(-7)));
        assert_eq!(column.as_double(), Ok(Some(-7.0)));
        assert_eq!(column.as_string(), Ok(Some("-7".to_string())));
        assert_eq!(column.as_bool(), Ok(Some(true)));
        assert_eq!(Column::long(0).as_bool(), Ok(Some(false)));
        assert_eq!(column.as_big_decimal(), Ok(Some(Decimal::from(-7))));

        let huge = Column::big_integer(BigInt::from(i64::MAX) * 4);
        let error = huge.as_long().unwrap_err();
        assert_eq!(error.to, ConversionTarget::Long);
        assert!(error.reason.is_some());
        assert_eq!(
            huge.as_big_integer(),
            Ok(Some(BigInt::from(i64::MAX) * 4))
        );
    }

    #[test]
    fn double_conversions_truncate() {
        assert_eq!(Column::double(2.9).as_long(), Ok(Some(2)));
        assert_eq!(Column::double(-2.9).as_long(), Ok(Some(-2)));
        assert_eq!(
            Column::double(-2.9).as_big_integer(),
            Ok(Some(BigInt::from(-2)))
        );
        assert_eq!(
            Column::double(0.1).as_big_decimal(),
            Ok(Some(Decimal::from_str("0.1").unwrap()))
        );
        assert!(Column::double(f64::NAN).as_long().is_err());
        assert!(Column::double(1e30).as_long().is_err());
        assert!(Column::double(f64::INFINITY).as_big_integer().is_err());
    }

    #[test]
    fn string_conversions() {
        assert_eq!(Column::string(" 123 ").as_long(), Ok(Some(123)));
        assert_eq!(Column::string("12.7").as_long(), Ok(Some(12)));
        assert_eq!(Column::string("1e3").as_double(), Ok(Some(1000.0)));
        assert_eq!(Column::string("TRUE").as_bool(), Ok(Some(true)));
        assert_eq!(Column::string("false").as_bool(), Ok(Some(false)));
        assert!(Column::string("yes").as_bool().is_err());
        assert!(Column::string("abc").as_long().is_err());
        assert!(Column::string("99999999999999999999").as_long().is_err());
        assert_eq!(
            Column::string("99999999999999999999").as_big_integer(),
            Ok(Some(BigInt::from_str("99999999999999999999").unwrap()))
        );
        assert_eq!(Column::string("héllo").as_bytes(), Ok(Some("héllo".into())));
    }

    #[test]
    fn string_to_date() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 20, 30).unwrap();
        assert_eq!(
            Column::string("2024-03-01 10:20:30").as_date(),
            Ok(Some(expected))
        );
        assert_eq!(
            Column::string("2024-03-01T12:20:30+02:00").as_date(),
            Ok(Some(expected))
        );
        assert_eq!(
            Column::string("2024-03-01").as_date(),
            Ok(Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()))
        );
        assert_eq!(
            Column::string("00:00:05").as_date(),
            Ok(Some(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 5).unwrap()))
        );
        assert!(Column::string("March 1st").as_date().is_err());
    }

    #[test]
    fn date_rendering_follows_sub_type() {
        let instant = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 58).unwrap();
        let millis = instant.timestamp_millis();

        let date_time = Column::date_millis(millis, DateType::DateTime);
        let date = Column::date_millis(millis, DateType::Date);
        let time = Column::date_millis(millis, DateType::Time);

        assert_eq!(
            date_time.as_string(),
            Ok(Some("2023-12-31 23:59:58".to_string()))
        );
        assert_eq!(date.as_string(), Ok(Some("2023-12-31".to_string())));
        assert_eq!(time.as_string(), Ok(Some("23:59:58".to_string())));

        // Sub-type does not take part in equality.
        assert_eq!(date, time);
        assert_eq!(date.date_type(), Some(DateType::Date));
        assert_eq!(date.as_long(), Ok(Some(millis)));
        assert_eq!(date.as_date(), Ok(Some(instant)));

        let day = Column::date(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap());
        assert_eq!(day.as_long(), Ok(Some(86_400_000)));
        let clock = Column::time(NaiveTime::from_hms_milli_opt(0, 0, 1, 250).unwrap());
        assert_eq!(clock.as_long(), Ok(Some(1250)));
    }

    #[test]
    fn bytes_to_string_requires_utf8() {
        assert_eq!(
            Column::bytes(b"abc".to_vec()).as_string(),
            Ok(Some("abc".to_string()))
        );
        let error = Column::bytes(vec![0xff, 0xfe]).as_string().unwrap_err();
        assert_eq!(error.from, ColumnKind::Bytes);
        assert!(error.reason.is_some());
    }

    #[test]
    fn byte_sizes() {
        assert_eq!(Column::long(0).byte_size(), 1);
        assert_eq!(Column::long(255).byte_size(), 2);
        assert_eq!(Column::long(i64::MAX).byte_size(), 8);
        assert_eq!(Column::double(1.25).byte_size(), 4);
        assert_eq!(Column::string("abcd").byte_size(), 4);
        assert_eq!(Column::bool(false).byte_size(), 1);
        assert_eq!(Column::date_millis(1, DateType::Time).byte_size(), 8);
        assert_eq!(Column::bytes(vec![0u8; 10]).byte_size(), 10);
    }

    #[test]
    fn from_option() {
        assert!(Column::from(None::<i64>).is_null());
        assert_eq!(Column::from(Some("a")), Column::string("a"));
    }

    #[test]
    fn json() {
        assert_eq!(
            serde_json::to_value(Column::long(3)).unwrap(),
            serde_json::json!({"type": "LONG", "value": 3})
        );
        assert_eq!(
            serde_json::to_value(Column::date_millis(5, DateType::Date)).unwrap(),
            serde_json::json!({"type": "DATE", "value": {"millis": 5, "dateType": "DATE"}})
        );
        assert_eq!(
            serde_json::to_value(Column::null()).unwrap(),
            serde_json::json!({"type": "NULL"})
        );
        assert_eq!(
            serde_json::to_value(Column::big_integer(BigInt::from(u64::MAX))).unwrap(),
            serde_json::json!({"type": "LONG", "value": "18446744073709551615"})
        );
    }
}
