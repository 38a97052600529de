//! Encoder properties.
//!
//! [`DeflateProperties`] is a plain struct with level presets. Callers that
//! configure codecs by name (archive front ends) go through
//! [`DeflateProperties::set_properties`], which applies a whole list of
//! `(name, value)` pairs or none of them.

use crate::match_finder::MatchFinderKind;
use crate::tables::DeflateVariant;
use oxiflate_core::error::{OxiFlateError, Result};
use oxiflate_core::traits::CompressionLevel;

/// Most optimal-parse passes accepted.
pub const MAX_PASSES: u32 = 10;
/// Deepest block-split recursion accepted.
pub const MAX_DIV_PASSES: u32 = 8;
/// Shortest "fast bytes" setting.
pub const MIN_FAST_BYTES: u32 = 3;
/// Longest "fast bytes" setting.
pub const MAX_FAST_BYTES: u32 = 258;

/// Compression method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// Stored blocks only.
    Store,
    /// DEFLATE.
    #[default]
    Deflate,
    /// Deflate64.
    Deflate64,
    /// BZip2; recognised by name but not produced by this codec.
    BZip2,
}

impl Method {
    /// Parse a method name (case-insensitive) or ZIP method number.
    pub fn parse(value: &PropValue<'_>) -> Result<Self> {
        let method = match value {
            PropValue::Str(name) => match name.to_ascii_lowercase().as_str() {
                "store" | "copy" => Self::Store,
                "deflate" => Self::Deflate,
                "deflate64" => Self::Deflate64,
                "bzip2" => Self::BZip2,
                _ => {
                    return Err(OxiFlateError::invalid_property(
                        "Method",
                        format!("unknown method {name:?}"),
                    ));
                }
            },
            PropValue::U32(0) => Self::Store,
            PropValue::U32(8) => Self::Deflate,
            PropValue::U32(9) => Self::Deflate64,
            PropValue::U32(12) => Self::BZip2,
            other => {
                return Err(OxiFlateError::invalid_property(
                    "Method",
                    format!("unsupported value {other:?}"),
                ));
            }
        };
        Ok(method)
    }
}

/// A property value as passed by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropValue<'a> {
    /// Numeric value.
    U32(u32),
    /// Switch.
    Bool(bool),
    /// Name or keyword.
    Str(&'a str),
}

impl PropValue<'_> {
    fn as_u32(&self, name: &str) -> Result<u32> {
        match *self {
            Self::U32(v) => Ok(v),
            _ => Err(OxiFlateError::invalid_property(
                name,
                format!("expected a number, got {self:?}"),
            )),
        }
    }

    fn as_bool(&self, name: &str) -> Result<bool> {
        match *self {
            Self::Bool(v) => Ok(v),
            Self::U32(v @ (0 | 1)) => Ok(v == 1),
            _ => Err(OxiFlateError::invalid_property(
                name,
                format!("expected a switch, got {self:?}"),
            )),
        }
    }
}

/// DEFLATE encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateProperties {
    /// Level the presets below were derived from.
    pub level: CompressionLevel,
    /// Output format.
    pub method: Method,
    /// Optimal-parse passes over each span.
    pub num_passes: u32,
    /// Match length taken without further search.
    pub fast_bytes: u32,
    /// Candidates visited per position by the match finder.
    pub match_finder_cycles: u32,
    /// Greedy parsing with a hash-chain match finder.
    pub fast_mode: bool,
    /// Block-split recursion depth.
    pub num_div_passes: u32,
}

impl Default for DeflateProperties {
    fn default() -> Self {
        Self::from_level(CompressionLevel::DEFAULT)
    }
}

impl DeflateProperties {
    /// Presets for `level` (0-9).
    pub fn from_level(level: impl Into<CompressionLevel>) -> Self {
        let level = level.into();
        let (fast_mode, num_passes, fast_bytes, num_div_passes) = match level.level() {
            0..=4 => (true, 1, 32, 0),
            5 | 6 => (false, 1, 32, 1),
            7 | 8 => (false, 3, 64, 2),
            _ => (false, 4, 128, 3),
        };
        let match_finder_cycles = match level.level() {
            0..=4 => 4 << level.level(),
            _ => 16 + fast_bytes / 2,
        };
        Self {
            level,
            method: if level == CompressionLevel::NONE {
                Method::Store
            } else {
                Method::Deflate
            },
            num_passes,
            fast_bytes,
            match_finder_cycles,
            fast_mode,
            num_div_passes,
        }
    }

    /// Presets for `level` writing Deflate64.
    pub fn deflate64(level: impl Into<CompressionLevel>) -> Self {
        let mut props = Self::from_level(level);
        if props.method == Method::Deflate {
            props.method = Method::Deflate64;
        }
        props
    }

    /// Stream flavour written.
    pub fn variant(&self) -> DeflateVariant {
        match self.method {
            Method::Deflate64 => DeflateVariant::Deflate64,
            _ => DeflateVariant::Deflate,
        }
    }

    /// Whether only stored blocks are written.
    pub fn store_only(&self) -> bool {
        self.method == Method::Store
    }

    /// Match finder used by these settings.
    pub fn match_finder_kind(&self) -> MatchFinderKind {
        if self.fast_mode {
            MatchFinderKind::HashChain3
        } else {
            MatchFinderKind::BinaryTree3
        }
    }

    /// Check every field.
    pub fn validate(&self) -> Result<()> {
        if self.method == Method::BZip2 {
            return Err(OxiFlateError::unsupported_method("BZip2"));
        }
        if !(1..=MAX_PASSES).contains(&self.num_passes) {
            return Err(OxiFlateError::invalid_property(
                "NumPasses",
                format!("{} is outside 1..={MAX_PASSES}", self.num_passes),
            ));
        }
        if !(MIN_FAST_BYTES..=MAX_FAST_BYTES).contains(&self.fast_bytes) {
            return Err(OxiFlateError::invalid_property(
                "FastBytes",
                format!(
                    "{} is outside {MIN_FAST_BYTES}..={MAX_FAST_BYTES}",
                    self.fast_bytes
                ),
            ));
        }
        if self.match_finder_cycles == 0 {
            return Err(OxiFlateError::invalid_property(
                "MatchFinderCycles",
                "must be at least 1",
            ));
        }
        if self.num_div_passes > MAX_DIV_PASSES {
            return Err(OxiFlateError::invalid_property(
                "NumDivPasses",
                format!("{} exceeds {MAX_DIV_PASSES}", self.num_div_passes),
            ));
        }
        Ok(())
    }

    /// Apply named properties.
    ///
    /// `CompressionLevel` is applied first (resetting the presets), then the
    /// rest in order. Names are case-insensitive. On any error `self` is
    /// left unchanged.
    pub fn set_properties(&mut self, props: &[(&str, PropValue<'_>)]) -> Result<()> {
        let mut next = *self;
        for (name, value) in props {
            if name.eq_ignore_ascii_case("CompressionLevel") || name.eq_ignore_ascii_case("Level") {
                let level = value.as_u32(name)?;
                if level > 9 {
                    return Err(OxiFlateError::invalid_property(
                        *name,
                        format!("{level} is outside 0..=9"),
                    ));
                }
                let method = next.method;
                next = Self::from_level(level as u8);
                if level != 0 && method != Method::Store {
                    next.method = method;
                }
            }
        }
        for (name, value) in props {
            match name.to_ascii_lowercase().as_str() {
                "compressionlevel" | "level" => {}
                "method" => next.method = Method::parse(value)?,
                "numpasses" => next.num_passes = value.as_u32(name)?,
                "fastbytes" => next.fast_bytes = value.as_u32(name)?,
                "matchfindercycles" => next.match_finder_cycles = value.as_u32(name)?,
                "fastmode" => next.fast_mode = value.as_bool(name)?,
                "numdivpasses" => next.num_div_passes = value.as_u32(name)?,
                _ => {
                    return Err(OxiFlateError::invalid_property(*name, "unknown property"));
                }
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}
