//! Address decoding: hex string -> 32-bit address -> (tag, index, offset)

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::bin::{extract, low_mask};

pub const ADDRESS_BITS: u32 = 32;
pub const TAG_BITS: u32 = 18;
pub const INDEX_BITS: u32 = 12;
pub const OFFSET_BITS: u32 = 2;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid bit {ch:?} at position {position} (expected '0' or '1')")]
    InvalidBit { ch: char, position: usize },
    #[error("bit string of {len} characters does not fit in 32 bits")]
    TooWide { len: usize },
    #[error("address layout {tag}/{index}/{offset} covers {sum} bits, expected 32")]
    LayoutWidth {
        tag: u32,
        index: u32,
        offset: u32,
        sum: u32,
    },
}

/// Parses a hexadecimal address leniently.
///
/// A leading `0x` / `0X` is skipped. Every other character that is not a hex
/// digit is ignored without affecting the result, and the accumulator wraps
/// like native 32-bit unsigned arithmetic.
///
/// ```
/// use cache_sim::address::parse_hex;
///
/// assert_eq!(parse_hex("0x1A"), 26);
/// assert_eq!(parse_hex("0x1a"), parse_hex("0X1A"));
/// assert_eq!(parse_hex("0xZZ"), 0);
/// assert_eq!(parse_hex("12_34"), 0x1234);
/// ```
pub fn parse_hex(s: &str) -> u32 {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    digits
        .chars()
        .filter_map(|c| c.to_digit(16))
        .fold(0u32, |acc, d| acc.wrapping_mul(16).wrapping_add(d))
}

/// 32-bit binary form of `n`, most significant bit first.
pub fn to_binary_width32(n: u32) -> BitString {
    BitString::new(n, ADDRESS_BITS)
}

/// Evaluates a string of `0`/`1` characters, most significant bit first.
///
/// ```
/// use cache_sim::address::bits_to_int;
///
/// assert_eq!(bits_to_int("101").unwrap(), 5);
/// assert!(bits_to_int("10a").is_err());
/// ```
pub fn bits_to_int(bits: &str) -> Result<u32, AddressError> {
    let len = bits.chars().count();
    if len > ADDRESS_BITS as usize {
        return Err(AddressError::TooWide { len });
    }
    bits.chars().enumerate().try_fold(0u32, |acc, (position, ch)| {
        let bit = match ch {
            '0' => 0,
            '1' => 1,
            _ => return Err(AddressError::InvalidBit { ch, position }),
        };
        Ok((acc << 1) | bit)
    })
}

/// Splits a 32-bit string into its tag, index and offset fields.
pub fn decompose(bits: BitString, layout: &AddressLayout) -> DecodedAddress {
    let v = bits.value();
    DecodedAddress {
        tag: BitString::new(
            extract(v, layout.index_bits + layout.offset_bits, layout.tag_bits),
            layout.tag_bits,
        ),
        index: BitString::new(
            extract(v, layout.offset_bits, layout.index_bits),
            layout.index_bits,
        ),
        offset: BitString::new(extract(v, 0, layout.offset_bits), layout.offset_bits),
    }
}

/// Fixed-width bit string stored by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitString {
    value: u32,
    width: u32,
}

impl BitString {
    /// bits of `value` above `width` are discarded.
    pub fn new(value: u32, width: u32) -> Self {
        let width = width.min(ADDRESS_BITS);
        Self {
            value: value & low_mask(width),
            width,
        }
    }
    pub fn value(self) -> u32 {
        self.value
    }
    pub fn width(self) -> u32 {
        self.width
    }
    /// `None` if the result would be wider than 32 bits.
    pub fn concat(self, rhs: Self) -> Option<Self> {
        let width = self.width + rhs.width;
        if width > ADDRESS_BITS {
            return None;
        }
        let high = self.value.checked_shl(rhs.width).unwrap_or(0);
        Some(Self::new(high | rhs.value, width))
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..self.width).rev() {
            let c = if crate::bin::at(self.value, i) == 1 {
                '1'
            } else {
                '0'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl FromStr for BitString {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = bits_to_int(s)?;
        Ok(Self::new(value, s.chars().count() as u32))
    }
}

/// Bit widths of the tag, index and offset fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLayout {
    tag_bits: u32,
    index_bits: u32,
    offset_bits: u32,
}

impl AddressLayout {
    pub fn new(tag_bits: u32, index_bits: u32, offset_bits: u32) -> Result<Self, AddressError> {
        let sum = tag_bits
            .saturating_add(index_bits)
            .saturating_add(offset_bits);
        if sum != ADDRESS_BITS {
            return Err(AddressError::LayoutWidth {
                tag: tag_bits,
                index: index_bits,
                offset: offset_bits,
                sum,
            });
        }
        Ok(Self {
            tag_bits,
            index_bits,
            offset_bits,
        })
    }
    pub fn tag_bits(&self) -> u32 {
        self.tag_bits
    }
    pub fn index_bits(&self) -> u32 {
        self.index_bits
    }
    pub fn offset_bits(&self) -> u32 {
        self.offset_bits
    }
    /// number of distinct index values.
    pub fn index_span(&self) -> u64 {
        1u64 << self.index_bits
    }
    pub fn decode(&self, address: &str) -> DecodedAddress {
        let decoded = decompose(to_binary_width32(parse_hex(address)), self);
        log::trace!("{address} -> {decoded}");
        decoded
    }
    /// first byte address of the block holding `tag` at `index`.
    pub fn block_address(&self, tag: BitString, index: usize) -> u32 {
        let tag = tag
            .value()
            .checked_shl(self.index_bits + self.offset_bits)
            .unwrap_or(0);
        let index = (index as u32)
            .checked_shl(self.offset_bits)
            .unwrap_or(0);
        tag | (index & !low_mask(self.offset_bits))
    }
}

impl Default for AddressLayout {
    fn default() -> Self {
        Self {
            tag_bits: TAG_BITS,
            index_bits: INDEX_BITS,
            offset_bits: OFFSET_BITS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedAddress {
    pub tag: BitString,
    pub index: BitString,
    pub offset: BitString,
}

impl DecodedAddress {
    pub fn index_value(&self) -> usize {
        self.index.value() as usize
    }
    /// `tag ++ index ++ offset`
    pub fn concat(&self) -> BitString {
        self.tag
            .concat(self.index)
            .and_then(|b| b.concat(self.offset))
            .unwrap_or(to_binary_width32(0))
    }
}

impl fmt::Display for DecodedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tag={} index={} ({}) offset={}",
            self.tag,
            self.index,
            self.index.value(),
            self.offset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_case_insensitive() {
        assert_eq!(parse_hex("0x1A"), parse_hex("0x1a"));
        assert_eq!(parse_hex("DeadBeef"), 0xdead_beef);
        assert_eq!(parse_hex("0XdEaDbEeF"), 0xdead_beef);
    }
    #[test]
    fn test_parse_hex_lenient() {
        assert_eq!(parse_hex("0xZZ"), 0);
        assert_eq!(parse_hex(""), 0);
        assert_eq!(parse_hex("0x"), 0);
        assert_eq!(parse_hex("0x00-40 "), 0x40);
        // only the leading prefix is stripped; the inner `x` is skipped
        assert_eq!(parse_hex("0x0x10"), 0x010);
    }
    #[test]
    fn test_parse_hex_wraps() {
        assert_eq!(parse_hex("0x1_0000_0001"), 1);
        assert_eq!(parse_hex("ffffffff"), u32::MAX);
    }
    #[test]
    fn test_binary_round_trip() {
        for n in [0, 1, 2, 0x8000_0000, 0xdead_beef, u32::MAX, 4096 * 4] {
            let bits = to_binary_width32(n);
            assert_eq!(bits.to_string().len(), 32);
            assert_eq!(bits_to_int(&bits.to_string()).unwrap(), n);
        }
    }
    #[test]
    fn test_msb_first() {
        assert_eq!(
            to_binary_width32(0x8000_0001).to_string(),
            "10000000000000000000000000000001"
        );
    }
    #[test]
    fn test_bits_to_int_errors() {
        assert_eq!(
            bits_to_int("0120"),
            Err(AddressError::InvalidBit {
                ch: '2',
                position: 2
            })
        );
        assert_eq!(
            bits_to_int(&"1".repeat(33)),
            Err(AddressError::TooWide { len: 33 })
        );
        assert_eq!(bits_to_int(""), Ok(0));
    }
    #[test]
    fn test_decompose_reference_layout() {
        let layout = AddressLayout::default();
        let d = layout.decode("0x00000004");
        assert_eq!(d.tag.to_string(), "000000000000000000");
        assert_eq!(d.index.to_string(), "000000000001");
        assert_eq!(d.offset.to_string(), "00");
        assert_eq!(d.index_value(), 1);

        let d = layout.decode("0xffffc003");
        assert_eq!(d.tag.value(), 0x3ffff);
        assert_eq!(d.index.value(), 0);
        assert_eq!(d.offset.value(), 0b11);
    }
    #[test]
    fn test_decompose_covers_all_bits() {
        let layouts = [
            AddressLayout::default(),
            AddressLayout::new(32, 0, 0).unwrap(),
            AddressLayout::new(0, 30, 2).unwrap(),
            AddressLayout::new(20, 6, 6).unwrap(),
        ];
        for layout in layouts {
            for n in [0, 7, 0x1234_5678, 0xdead_beef, u32::MAX] {
                let bits = to_binary_width32(n);
                let d = decompose(bits, &layout);
                assert_eq!(d.tag.width(), layout.tag_bits());
                assert_eq!(d.index.width(), layout.index_bits());
                assert_eq!(d.offset.width(), layout.offset_bits());
                assert_eq!(d.concat(), bits);
                assert_eq!(
                    format!("{}{}{}", d.tag, d.index, d.offset),
                    bits.to_string()
                );
            }
        }
    }
    #[test]
    fn test_layout_must_cover_32_bits() {
        assert!(AddressLayout::new(18, 12, 2).is_ok());
        assert_eq!(
            AddressLayout::new(18, 12, 3),
            Err(AddressError::LayoutWidth {
                tag: 18,
                index: 12,
                offset: 3,
                sum: 33
            })
        );
    }
    #[test]
    fn test_block_address() {
        let layout = AddressLayout::default();
        let d = layout.decode("0x12345677");
        assert_eq!(
            layout.block_address(d.tag, d.index_value()),
            0x1234_5674
        );
    }
    #[test]
    fn test_bit_string_parse() {
        let b: BitString = "0101".parse().unwrap();
        assert_eq!(b.value(), 5);
        assert_eq!(b.width(), 4);
        assert_eq!(b.to_string(), "0101");
        assert!("01x".parse::<BitString>().is_err());
    }
}
