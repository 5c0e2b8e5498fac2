//! Buffer transfer: device data and null bitmaps into freshly allocated host
//! buffers. Every copy is only issued here; the bytes land when the stream is
//! synchronized.

use gpu_memory_manager::HostBuffer;
use tracing::debug;

use crate::bitmask;
use crate::column_view::ColumnView;
use crate::context::ExportContext;
use crate::error::{InteropError, Result};

/// Issue a copy of the `view.size()` visible elements of width `width`.
pub fn fetch_data(ctx: &ExportContext<'_>, view: &ColumnView<'_>, width: usize) -> Result<HostBuffer> {
    let len = width * view.size();
    let host = ctx.host().allocate(len)?;
    if len == 0 {
        return Ok(host);
    }
    let data = view.data().ok_or_else(|| {
        InteropError::InvalidView(format!("{:?} column has no data", view.type_id()))
    })?;
    let src = data.subslice(view.offset() * width, len)?;
    ctx.stream().copy_to_host_async(src, &host)?;
    debug!(
        "Fetching {} bytes of {:?} data on stream {}",
        len,
        view.type_id(),
        ctx.stream().id()
    );
    Ok(host)
}

/// Issue a copy of the view's validity bitmap, or `None` when it has no nulls.
///
/// A view with a non-zero offset is first re-based onto a temporary device
/// bitmap; the stream keeps that bitmap alive until the copy completes. Bits
/// past `view.size()` are cleared when the pending array is resolved.
pub fn fetch_mask(ctx: &ExportContext<'_>, view: &ColumnView<'_>) -> Result<Option<HostBuffer>> {
    if !view.has_nulls() {
        return Ok(None);
    }
    let mask = view.null_mask().ok_or_else(|| {
        InteropError::InvalidView(format!("{:?} column has nulls but no mask", view.type_id()))
    })?;
    let len = bitmask::bitmap_bytes(view.size());
    let host = ctx.host().allocate(len)?;
    if view.offset() > 0 {
        let shifted = bitmask::copy_bitmask(ctx.device(), mask, view.offset(), view.size())?;
        ctx.stream()
            .copy_to_host_async(shifted.slice(0, len)?, &host)?;
    } else {
        ctx.stream()
            .copy_to_host_async(mask.subslice(0, len)?, &host)?;
    }
    debug!(
        "Fetching {}-row null mask ({} nulls) on stream {}",
        view.size(),
        view.null_count(),
        ctx.stream().id()
    );
    Ok(Some(host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_view::TypeId;
    use gpu_memory_manager::{Device, SimDevice};

    #[test]
    fn data_respects_view_offset() {
        let device = SimDevice::default();
        let ctx = ExportContext::new(&device).unwrap();
        let bytes: Vec<u8> = (0u16..6).flat_map(|v| v.to_le_bytes()).collect();
        let data = device.upload(&bytes).unwrap();
        let view = ColumnView::builder(TypeId::UInt16, 4)
            .data(data.as_slice())
            .offset(2)
            .build()
            .unwrap();

        let host = fetch_data(&ctx, &view, 2).unwrap();
        assert_eq!(host.len(), 8);
        assert_eq!(ctx.stream().pending_transfers(), 1);
        ctx.synchronize().unwrap();
        assert_eq!(host.into_buffer().unwrap().typed_data::<u16>(), &[2, 3, 4, 5]);
    }

    #[test]
    fn no_mask_without_nulls() {
        let device = SimDevice::default();
        let ctx = ExportContext::new(&device).unwrap();
        let data = device.upload(&[1, 2, 3]).unwrap();
        let mask = device.upload(&[0xFF]).unwrap();
        let view = ColumnView::builder(TypeId::Int8, 3)
            .data(data.as_slice())
            .null_mask(mask.as_slice(), 0)
            .build()
            .unwrap();
        assert!(fetch_mask(&ctx, &view).unwrap().is_none());
        assert_eq!(ctx.stream().pending_transfers(), 0);
    }

    #[test]
    fn offset_mask_is_rebased() {
        let device = SimDevice::default();
        let ctx = ExportContext::new(&device).unwrap();
        let data = device.upload(&[0u8; 10]).unwrap();
        // row 4 is null
        let mask = device.upload(&[0b1110_1111, 0b0000_0011]).unwrap();
        let view = ColumnView::builder(TypeId::Int8, 10)
            .data(data.as_slice())
            .null_mask(mask.as_slice(), 1)
            .build()
            .unwrap()
            .slice(&device, 3, 10)
            .unwrap();

        let host = fetch_mask(&ctx, &view).unwrap().unwrap();
        ctx.synchronize().unwrap();
        assert_eq!(host.into_buffer().unwrap().as_slice(), &[0b0111_1101]);
    }
}
