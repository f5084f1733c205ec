use std::ops::Range;

/// mask with ones in `r`. `r.end` is inclusive, so `0..0` selects bit 0.
#[inline]
pub const fn bit_range(r: Range<u32>) -> u32 {
    let large: u32 = if r.end != 31 { 1 << (r.end + 1) } else { 0 };
    large.wrapping_sub(1 << r.start)
}

/// mask with the lowest `width` bits set. `width` may be 0 or 32.
#[inline]
pub const fn low_mask(width: u32) -> u32 {
    if width == 0 {
        0
    } else {
        bit_range(0..width - 1)
    }
}

#[inline]
pub const fn mask_lower(bin: u32, width: u32) -> u32 {
    bin & low_mask(width)
}

/// extracts the `width`-bit field whose least significant bit is `lsb`.
#[inline]
pub const fn extract(bin: u32, lsb: u32, width: u32) -> u32 {
    if width == 0 || lsb >= 32 {
        0
    } else {
        mask_lower(bin >> lsb, width)
    }
}

#[inline]
pub const fn at(bin: u32, index: u32) -> u32 {
    (bin >> index) & 1
}
