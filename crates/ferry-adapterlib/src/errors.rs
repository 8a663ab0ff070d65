use crate::element::ColumnKind;
use ferry_types::error::{Classify, DetailedError, ErrorKind};
use serde::Serialize;
use std::{
    borrow::Cow,
    fmt::{Display, Error as FmtError, Formatter},
};
use thiserror::Error as ThisError;

/// Type a column value is being converted to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionTarget {
    Long,
    Double,
    String,
    Bool,
    Date,
    Bytes,
    BigInteger,
    BigDecimal,
}

impl Display for ConversionTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(match self {
            Self::Long => "LONG",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::Bool => "BOOL",
            Self::Date => "DATE",
            Self::Bytes => "BYTES",
            Self::BigInteger => "BIG_INTEGER",
            Self::BigDecimal => "BIG_DECIMAL",
        })
    }
}

/// A column value cannot be represented as the requested type.
///
/// Raised both for conversions that are never supported for the source
/// kind (e.g., `DATE` to `BOOL`) and for values that fall outside the range
/// of the target type or cannot be parsed as it.
#[derive(ThisError, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Cannot convert {from} column to {to}{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
pub struct ConversionError {
    pub from: ColumnKind,
    pub to: ConversionTarget,
    pub reason: Option<String>,
}

impl ConversionError {
    pub fn unsupported(from: ColumnKind, to: ConversionTarget) -> Self {
        Self {
            from,
            to,
            reason: None,
        }
    }

    pub fn invalid(from: ColumnKind, to: ConversionTarget, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: Some(reason.into()),
        }
    }
}

impl DetailedError for ConversionError {
    fn error_code(&self) -> Cow<'static, str> {
        Cow::from("ConversionUnsupported")
    }
}

impl Classify for ConversionError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ConversionUnsupported
    }
}
