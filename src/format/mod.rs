//! On-disk container formats and the sniffing order used to detect them.
//!
//! # Sniffing
//! A file is offered to each parser in [`SNIFF_ORDER`] until one accepts
//! it.  Classic validation is the weakest (a handful of offset checks), so
//! it is always tried last.
//!
//! # Parser contract
//! Each parser walks `preamble → types → instances` and either returns the
//! complete type list or a [`Rejection`] naming the stage that failed.
//! Rejections are logged and never surface to the caller; the next format
//! is tried instead.  Writers validate everything up front and either return
//! the complete encoded file or an error, never a partial image.

use std::fmt;

use serde::Serialize;

use crate::data::{macroman, Block, DataError, DataResult, Reader};
use crate::error::{ResourceError, Result};
use crate::resource_type::ResourceType;

pub mod classic;
pub mod extended;
pub mod rez;

// ── Format tag ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// 32-bit classic Macintosh resource fork.
    Classic,
    /// 64-bit superset of the classic layout with type attributes.
    Extended,
    /// Mixed-endian `BRGR` archive.
    Rez,
}

/// Detection order.  Part of the public contract.
pub const SNIFF_ORDER: [Format; 3] = [Format::Extended, Format::Rez, Format::Classic];

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::Classic  => "classic",
            Format::Extended => "extended",
            Format::Rez      => "rez",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "classic"  => Some(Format::Classic),
            "extended" => Some(Format::Extended),
            "rez"      => Some(Format::Rez),
            _          => None,
        }
    }

    /// Try to parse `data` as this format.  `None` means the data does not
    /// look like this format; the reason is logged at debug level.
    pub fn parse(self, data: &Block, zero_copy: bool) -> Option<Vec<ResourceType>> {
        let parsed = match self {
            Format::Classic  => classic::parse(data, zero_copy),
            Format::Extended => extended::parse(data, zero_copy),
            Format::Rez      => rez::parse(data, zero_copy),
        };
        match parsed {
            Ok(types) => Some(types),
            Err(rejection) => {
                rejection.log();
                None
            }
        }
    }

    /// Encode `types` as a complete file image.
    pub fn write(self, types: &[ResourceType]) -> Result<Block> {
        let block = match self {
            Format::Classic  => classic::write(types)?,
            Format::Extended => extended::write(types)?,
            Format::Rez      => rez::write(types)?,
        };
        tracing::debug!(
            format = self.name(),
            bytes = block.size(),
            types = types.len(),
            instances = types.iter().map(ResourceType::len).sum::<usize>(),
            "encoded resource file"
        );
        Ok(block)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Offer `data` to each format in `order`; the first one that accepts wins.
pub fn sniff(data: &Block, order: &[Format], zero_copy: bool) -> Option<(Format, Vec<ResourceType>)> {
    order.iter().find_map(|&format| {
        let types = format.parse(data, zero_copy)?;
        tracing::debug!(format = format.name(), types = types.len(), "detected resource format");
        Some((format, types))
    })
}

// ── Rejections ───────────────────────────────────────────────────────────────

/// Parser stage at which a candidate format was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preamble,
    Types,
    Instances,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Preamble  => "preamble",
            Stage::Types     => "types",
            Stage::Instances => "instances",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rejection {
    pub format: Format,
    pub stage:  Stage,
    pub reason: String,
}

impl Rejection {
    pub fn new(format: Format, stage: Stage, reason: impl Into<String>) -> Self {
        Self { format, stage, reason: reason.into() }
    }

    fn log(&self) {
        tracing::debug!(
            format = self.format.name(),
            stage = self.stage.name(),
            reason = %self.reason,
            "format rejected"
        );
    }
}

pub type ParseResult<T> = std::result::Result<T, Rejection>;

/// Turn a cursor error inside a parser into a rejection at `stage`.
pub(crate) trait OrReject<T> {
    fn or_reject(self, format: Format, stage: Stage) -> ParseResult<T>;
}

impl<T> OrReject<T> for DataResult<T> {
    fn or_reject(self, format: Format, stage: Stage) -> ParseResult<T> {
        self.map_err(|e: DataError| Rejection::new(format, stage, e.to_string()))
    }
}

/// Reject unless `condition` holds.
pub(crate) fn ensure(condition: bool, format: Format, stage: Stage, reason: &str) -> ParseResult<()> {
    if condition {
        Ok(())
    } else {
        Err(Rejection::new(format, stage, reason))
    }
}

// ── Shared helpers ───────────────────────────────────────────────────────────

/// Encode a type code, which must be exactly four MacRoman bytes.
pub(crate) fn check_code(code: &str) -> Result<[u8; 4]> {
    let encoded = macroman::encode(code);
    let invalid = || ResourceError::InvalidTypeCode { code: code.to_owned() };
    if macroman::decode(&encoded) != code {
        return Err(invalid());
    }
    encoded.try_into().map_err(|_| invalid())
}

/// Narrow a size or offset to a field type, failing with `LimitExceeded`.
pub(crate) fn fit<T: TryFrom<usize>>(value: usize, format: Format, what: &'static str) -> Result<T> {
    T::try_from(value).map_err(|_| ResourceError::LimitExceeded { format, what })
}

/// Read a payload of `length` bytes as a view of the file or a private copy.
pub(crate) fn take_data(reader: &mut Reader, length: usize, zero_copy: bool) -> DataResult<Block> {
    if zero_copy {
        reader.read_data(length)
    } else {
        reader.read_data_copy(length)
    }
}

/// Pascal-string length of `name` on disk, including the length byte.
pub(crate) fn pstr_len(name: &str) -> usize {
    1 + macroman::encode(name).len().min(u8::MAX as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for format in SNIFF_ORDER {
            assert_eq!(Format::from_name(format.name()), Some(format));
        }
        assert_eq!(Format::from_name("REZ"), Some(Format::Rez));
        assert_eq!(Format::from_name("zip"), None);
    }

    #[test]
    fn type_codes_must_be_four_bytes() {
        assert_eq!(check_code("snd ").unwrap(), *b"snd ");
        assert_eq!(check_code("©ode").unwrap(), [0xA9, b'o', b'd', b'e']);
        assert!(matches!(check_code("TXT"), Err(ResourceError::InvalidTypeCode { .. })));
        assert!(check_code("TEXTS").is_err());
        assert!(check_code("日本語x").is_err());
    }

    #[test]
    fn garbage_is_rejected_by_every_format() {
        let junk = Block::from(vec![0xA5u8; 64]);
        assert!(sniff(&junk, &SNIFF_ORDER, true).is_none());
        assert!(sniff(&Block::empty(), &SNIFF_ORDER, true).is_none());
    }
}
