/*!
Register bit-field definitions.

A [`RegisterField`] is one named slice of a hardware register, as listed in
the datasheet-derived CSV schema. [`BitRange`] handles the `"[7:0]"` /
`"[3]"` notation used by that schema.
*/

use crate::error::{Result, SharedError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Widest field a single register slice can describe
pub const MAX_FIELD_BITS: u8 = 32;

/// Position of a field inside its register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitRange {
    pub offset: u8,
    pub width: u8,
}

impl BitRange {
    /// Create a bit range, rejecting empty or over-wide slices
    pub fn new(offset: u8, width: u8) -> Result<Self> {
        if width == 0 || u16::from(offset) + u16::from(width) > u16::from(MAX_FIELD_BITS) {
            return Err(SharedError::range(format!(
                "bit range offset {} width {} does not fit a {}-bit register",
                offset, width, MAX_FIELD_BITS
            )));
        }
        Ok(Self { offset, width })
    }

    /// Parse `"[n]"` (one bit) or `"[hi:lo]"`
    pub fn parse(text: &str) -> Result<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            Regex::new(r"^\[\s*(\d+(?:\.0+)?)\s*(?::\s*(\d+(?:\.0+)?)\s*)?\]$")
                .expect("bit range pattern is valid")
        });

        let caps = re
            .captures(text.trim())
            .ok_or_else(|| SharedError::invalid_file_format(format!("Invalid bit range: '{}'", text)))?;

        let first = parse_bit_index(&caps[1], text)?;
        match caps.get(2) {
            None => Self::new(first, 1),
            Some(lo) => {
                let lo = parse_bit_index(lo.as_str(), text)?;
                if lo > first {
                    return Err(SharedError::invalid_file_format(format!(
                        "Bit range '{}' has low bit above high bit",
                        text
                    )));
                }
                Self::new(lo, first - lo + 1)
            }
        }
    }

    /// Mask of the field value (not shifted into position)
    pub fn value_mask(&self) -> u32 {
        if self.width >= MAX_FIELD_BITS {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Highest bit index covered by the range
    pub fn high_bit(&self) -> u8 {
        self.offset + self.width - 1
    }
}

impl fmt::Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.width == 1 {
            write!(f, "[{}]", self.offset)
        } else {
            write!(f, "[{}:{}]", self.high_bit(), self.offset)
        }
    }
}

fn parse_bit_index(digits: &str, context: &str) -> Result<u8> {
    let whole = digits.split('.').next().unwrap_or(digits);
    whole
        .parse::<u8>()
        .map_err(|_| SharedError::invalid_file_format(format!("Invalid bit index in '{}'", context)))
}

/// One named bit-field of the register map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterField {
    pub name: String,
    pub bits: BitRange,
    pub register_address: u16,
    value: u32,
    pub description: String,
    pub value_meaning: String,
    pub section: String,
}

impl RegisterField {
    /// Create a field, checking the initial value against the bit width
    pub fn new(name: impl Into<String>, register_address: u16, bits: BitRange, value: u32) -> Result<Self> {
        let name = name.into();
        check_fits(&name, bits, value)?;
        Ok(Self {
            name,
            bits,
            register_address,
            value,
            description: String::new(),
            value_meaning: String::new(),
            section: String::new(),
        })
    }

    /// Attach the descriptive CSV columns
    pub fn with_text(
        mut self,
        section: impl Into<String>,
        description: impl Into<String>,
        value_meaning: impl Into<String>,
    ) -> Self {
        self.section = section.into();
        self.description = description.into();
        self.value_meaning = value_meaning.into();
        self
    }

    /// Current field value
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Replace the field value; values wider than the field are rejected
    pub fn set_value(&mut self, value: u32) -> Result<()> {
        check_fits(&self.name, self.bits, value)?;
        self.value = value;
        Ok(())
    }

    /// Write the value truncated to the field width
    pub(crate) fn set_masked(&mut self, value: u32) {
        self.value = value & self.bits.value_mask();
    }

    /// The field's contribution to its register, shifted into position
    pub fn register_bits(&self) -> u32 {
        self.value << self.bits.offset
    }

    /// Extract this field's value from a whole register value
    pub fn extract(&self, register_value: u32) -> u32 {
        (register_value >> self.bits.offset) & self.bits.value_mask()
    }
}

fn check_fits(name: &str, bits: BitRange, value: u32) -> Result<()> {
    if value > bits.value_mask() {
        return Err(SharedError::range(format!(
            "{} = {} does not fit in {} bit(s)",
            name, value, bits.width
        )));
    }
    Ok(())
}
