//! Validity bitmap helpers. Bitmaps are LSB-first: row `i` is bit `i % 8`
//! of byte `i / 8`, and a set bit means the row is valid.

use arrow_buffer::{bit_util, Buffer};
use gpu_memory_manager::{Device, DeviceBuffer, DeviceSlice};
use tracing::debug;

use crate::error::Result;

/// Bytes needed to hold `bits` validity bits.
pub fn bitmap_bytes(bits: usize) -> usize {
    bit_util::ceil(bits, 8)
}

/// Bytes a device bitmap for `bits` rows is allocated with (64-byte padded).
pub fn bitmask_allocation_size_bytes(bits: usize) -> usize {
    bit_util::round_upto_multiple_of_64(bitmap_bytes(bits))
}

/// Zero every bit at or beyond `len` in `bytes`.
pub fn clear_trailing_bits(bytes: &mut [u8], len: usize) {
    let full = len / 8;
    if full >= bytes.len() {
        return;
    }
    let tail = len % 8;
    let mut start = full;
    if tail != 0 {
        bytes[full] &= (1u8 << tail) - 1;
        start += 1;
    }
    bytes[start..].fill(0);
}

/// Read the bytes holding bits `bit_offset..bit_offset + len` of a device bitmap.
fn read_bits(
    device: &dyn Device,
    mask: DeviceSlice<'_>,
    bit_offset: usize,
    len: usize,
) -> Result<(Buffer, usize)> {
    let first_byte = bit_offset / 8;
    let last_byte = bitmap_bytes(bit_offset + len);
    let bytes = device.download(mask.subslice(first_byte, last_byte - first_byte)?)?;
    Ok((Buffer::from_vec(bytes), bit_offset % 8))
}

/// Copy bits `bit_offset..bit_offset + len` of a device bitmap into a fresh
/// device bitmap starting at bit zero. Bits past `len` are zero.
pub fn copy_bitmask(
    device: &dyn Device,
    mask: DeviceSlice<'_>,
    bit_offset: usize,
    len: usize,
) -> Result<DeviceBuffer> {
    let mut out = vec![0u8; bitmask_allocation_size_bytes(len)];
    if len > 0 {
        let (bits, shift) = read_bits(device, mask, bit_offset, len)?;
        let shifted = bits.bit_slice(shift, len);
        let n = bitmap_bytes(len).min(shifted.len());
        out[..n].copy_from_slice(&shifted.as_slice()[..n]);
        clear_trailing_bits(&mut out, len);
    }
    debug!(
        "Copied bitmask: {} bits from bit offset {}",
        len, bit_offset
    );
    Ok(device.upload(&out)?)
}

/// Number of null (unset) bits in `bit_offset..bit_offset + len`.
pub fn count_unset_bits(
    device: &dyn Device,
    mask: DeviceSlice<'_>,
    bit_offset: usize,
    len: usize,
) -> Result<usize> {
    if len == 0 {
        return Ok(0);
    }
    let (bits, shift) = read_bits(device, mask, bit_offset, len)?;
    Ok(len - bits.count_set_bits_offset(shift, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_memory_manager::SimDevice;
    use proptest::prelude::*;

    #[test]
    fn sizes() {
        assert_eq!(bitmap_bytes(0), 0);
        assert_eq!(bitmap_bytes(9), 2);
        assert_eq!(bitmask_allocation_size_bytes(1), 64);
        assert_eq!(bitmask_allocation_size_bytes(513), 128);
    }

    #[test]
    fn trailing_bits_are_cleared() {
        let mut bytes = [0xFF, 0xFF, 0xFF];
        clear_trailing_bits(&mut bytes, 11);
        assert_eq!(bytes, [0xFF, 0b0000_0111, 0]);

        let mut aligned = [0xFF, 0xFF];
        clear_trailing_bits(&mut aligned, 16);
        assert_eq!(aligned, [0xFF, 0xFF]);
    }

    #[test]
    fn copy_shifts_to_bit_zero() {
        let device = SimDevice::default();
        // bits 0..16: 1,0,1,1,0,0,1,1 | 1,0,0,0,0,0,0,1
        let mask = device.upload(&[0b1100_1101, 0b1000_0001]).unwrap();
        let copied = copy_bitmask(&device, mask.as_slice(), 3, 6).unwrap();
        assert_eq!(copied.len(), 64);
        let bytes = device.download(copied.as_slice()).unwrap();
        // bits 3..9 of the source: 1,0,0,1,1,1
        assert_eq!(bytes[0], 0b0011_1001);
        assert!(bytes[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn counts_nulls_in_range() {
        let device = SimDevice::default();
        let mask = device.upload(&[0b1100_1101, 0b1000_0001]).unwrap();
        assert_eq!(count_unset_bits(&device, mask.as_slice(), 0, 16).unwrap(), 9);
        assert_eq!(count_unset_bits(&device, mask.as_slice(), 3, 6).unwrap(), 2);
        assert_eq!(count_unset_bits(&device, mask.as_slice(), 5, 0).unwrap(), 0);
    }

    proptest! {
        #[test]
        fn copy_matches_source_bits(
            bytes in proptest::collection::vec(any::<u8>(), 1..16),
            start in 0usize..64,
            len in 0usize..64,
        ) {
            let total = bytes.len() * 8;
            let start = start.min(total);
            let len = len.min(total - start);
            let device = SimDevice::default();
            let mask = device.upload(&bytes).unwrap();

            let copied = copy_bitmask(&device, mask.as_slice(), start, len).unwrap();
            let out = device.download(copied.as_slice()).unwrap();
            for i in 0..len {
                prop_assert_eq!(bit_util::get_bit(&out, i), bit_util::get_bit(&bytes, start + i));
            }
            for i in len..out.len() * 8 {
                prop_assert!(!bit_util::get_bit(&out, i));
            }
            let unset = (0..len).filter(|i| !bit_util::get_bit(&bytes, start + i)).count();
            prop_assert_eq!(count_unset_bits(&device, mask.as_slice(), start, len).unwrap(), unset);
        }
    }
}
