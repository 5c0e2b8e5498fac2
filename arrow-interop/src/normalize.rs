//! View normalization: collapse a view's offset to zero, and make its
//! children agree with its size, by materializing a device copy when needed.

use gpu_memory_manager::{Device, DeviceBuffer};
use std::borrow::Cow;
use tracing::debug;

use crate::bitmask;
use crate::column_view::{ColumnView, OwnedColumn, TypeId};
use crate::error::{InteropError, Result};

/// A view that is safe to convert without offset arithmetic: either the
/// caller's own view, or a materialized copy owned for the duration of one
/// conversion step.
#[derive(Debug)]
pub enum Normalized<'v> {
    Borrowed(&'v ColumnView<'v>),
    Owned(OwnedColumn),
}

impl Normalized<'_> {
    pub fn view(&self) -> Cow<'_, ColumnView<'_>> {
        match self {
            Normalized::Borrowed(view) => Cow::Borrowed(*view),
            Normalized::Owned(column) => Cow::Owned(column.view()),
        }
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, Normalized::Owned(_))
    }
}

/// Whether `view` has an offset, or a first child whose size disagrees with
/// the parent under the column's layout rule.
pub fn needs_materialization(view: &ColumnView<'_>) -> bool {
    if view.offset() != 0 {
        return true;
    }
    let Some(first) = view.children().first() else {
        return false;
    };
    match view.type_id() {
        TypeId::String | TypeId::List => first.size().checked_sub(1) != Some(view.size()),
        TypeId::Dictionary32 => first.size() != view.size(),
        _ => false,
    }
}

pub fn normalize<'v>(device: &dyn Device, view: &'v ColumnView<'_>) -> Result<Normalized<'v>> {
    if needs_materialization(view) {
        debug!(
            "Materializing {:?} column ({} rows at offset {})",
            view.type_id(),
            view.size(),
            view.offset()
        );
        Ok(Normalized::Owned(materialize(device, view)?))
    } else {
        Ok(Normalized::Borrowed(view))
    }
}

/// Deep-copy the visible rows of `view` (and what its children reference)
/// into new device allocations starting at offset zero.
pub fn materialize(device: &dyn Device, view: &ColumnView<'_>) -> Result<OwnedColumn> {
    let (null_mask, null_count) = match view.null_mask() {
        Some(mask) if view.has_nulls() => (
            Some(bitmask::copy_bitmask(device, mask, view.offset(), view.size())?),
            view.null_count(),
        ),
        _ => (None, 0),
    };

    if let Some(width) = view.type_id().element_width() {
        let data = match view.data() {
            Some(data) => {
                let src = data.subslice(view.offset() * width, view.size() * width)?;
                Some(device.copy_within_device(src)?)
            }
            None => None,
        };
        return OwnedColumn::new(view.type_id(), view.size(), data, null_mask, null_count, vec![]);
    }

    let children = match view.type_id() {
        TypeId::String | TypeId::List if view.num_children() == 0 => vec![],
        TypeId::String | TypeId::List => {
            let offsets = view.child(0)?;
            let (rebased, begin, end) = rebase_offsets(device, offsets, view.offset(), view.size())?;
            let values = view.child(1)?.slice(device, begin, end)?;
            vec![rebased, materialize(device, &values)?]
        }
        TypeId::Dictionary32 => {
            let indices = view
                .child(0)?
                .slice(device, view.offset(), view.offset() + view.size())?;
            vec![materialize(device, &indices)?, materialize(device, view.child(1)?)?]
        }
        other => return Err(InteropError::UnsupportedType(other)),
    };
    OwnedColumn::new(view.type_id(), view.size(), None, null_mask, null_count, children)
}

/// Copy offsets `first..=first + rows` re-based to start at zero.
///
/// Returns the new offsets column and the range of the values child they
/// referenced.
fn rebase_offsets(
    device: &dyn Device,
    offsets: &ColumnView<'_>,
    first: usize,
    rows: usize,
) -> Result<(OwnedColumn, usize, usize)> {
    let type_id = offsets.type_id();
    if rows == 0 {
        let zero = encode_offsets(type_id, &[0]);
        let buffer = device.upload(&zero)?;
        return Ok((OwnedColumn::new(type_id, 1, Some(buffer), None, 0, vec![])?, 0, 0));
    }

    if first + rows + 1 > offsets.size() {
        return Err(InteropError::InvalidView(format!(
            "offsets child of {} entries cannot describe rows {}..{}",
            offsets.size(),
            first,
            first + rows
        )));
    }
    let width = type_id.element_width().unwrap_or(4);
    let data = offsets.data().ok_or_else(|| {
        InteropError::InvalidView("offsets child has no data".to_string())
    })?;
    let start = (offsets.offset() + first) * width;
    let bytes = device.download(data.subslice(start, (rows + 1) * width)?)?;
    let values = decode_offsets(type_id, &bytes);

    let base = values[0];
    let last = values[rows];
    if base < 0 || last < base || values.windows(2).any(|w| w[1] < w[0]) {
        return Err(InteropError::InvalidView(format!(
            "offsets are not non-decreasing from a non-negative start ({}..{})",
            base, last
        )));
    }
    let rebased: Vec<i64> = values.iter().map(|v| v - base).collect();
    let buffer: DeviceBuffer = device.upload(&encode_offsets(type_id, &rebased))?;
    let column = OwnedColumn::new(type_id, rows + 1, Some(buffer), None, 0, vec![])?;
    Ok((column, base as usize, last as usize))
}

fn decode_offsets(type_id: TypeId, bytes: &[u8]) -> Vec<i64> {
    match type_id {
        TypeId::Int64 => bytes
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
        _ => bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as i64)
            .collect(),
    }
}

fn encode_offsets(type_id: TypeId, values: &[i64]) -> Vec<u8> {
    match type_id {
        TypeId::Int64 => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        _ => values.iter().flat_map(|v| (*v as i32).to_le_bytes()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_memory_manager::SimDevice;

    fn upload_i32(device: &SimDevice, values: &[i32]) -> DeviceBuffer {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        device.upload(&bytes).unwrap()
    }

    fn read_i32(device: &SimDevice, view: &ColumnView<'_>) -> Vec<i32> {
        let data = view.data().unwrap();
        let bytes = device
            .download(data.subslice(view.offset() * 4, view.size() * 4).unwrap())
            .unwrap();
        decode_offsets(TypeId::Int32, &bytes)
            .into_iter()
            .map(|v| v as i32)
            .collect()
    }

    #[test]
    fn aligned_view_is_borrowed() {
        let device = SimDevice::default();
        let data = upload_i32(&device, &[1, 2, 3]);
        let view = ColumnView::builder(TypeId::Int32, 3)
            .data(data.as_slice())
            .build()
            .unwrap();
        let normalized = normalize(&device, &view).unwrap();
        assert!(!normalized.is_materialized());
        assert_eq!(normalized.view().size(), 3);
    }

    #[test]
    fn sliced_strings_are_rebased() {
        let device = SimDevice::default();
        // ["ab", "c", "", "def"]
        let offsets = upload_i32(&device, &[0, 2, 3, 3, 6]);
        let chars = device.upload(b"abcdef").unwrap();
        let column = ColumnView::builder(TypeId::String, 4)
            .child(
                ColumnView::builder(TypeId::Int32, 5)
                    .data(offsets.as_slice())
                    .build()
                    .unwrap(),
            )
            .child(
                ColumnView::builder(TypeId::Int8, 6)
                    .data(chars.as_slice())
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let sliced = column.slice(&device, 1, 4).unwrap();
        assert!(needs_materialization(&sliced));

        let normalized = normalize(&device, &sliced).unwrap();
        let Normalized::Owned(owned) = &normalized else {
            panic!("expected a materialized column");
        };
        let view = owned.view();
        assert_eq!(view.offset(), 0);
        assert_eq!(view.size(), 3);
        assert_eq!(read_i32(&device, view.child(0).unwrap()), vec![0, 1, 1, 4]);
        let chars = view.child(1).unwrap().data().unwrap();
        assert_eq!(device.download(chars).unwrap(), b"cdef");
    }

    #[test]
    fn short_offsets_child_forces_materialization() {
        let device = SimDevice::default();
        let offsets = upload_i32(&device, &[0, 1, 2, 3]);
        let values = upload_i32(&device, &[7, 8, 9]);
        // two rows whose offsets child still has the sentinel of a third
        let list = ColumnView::builder(TypeId::List, 2)
            .child(
                ColumnView::builder(TypeId::Int32, 4)
                    .data(offsets.as_slice())
                    .build()
                    .unwrap(),
            )
            .child(
                ColumnView::builder(TypeId::Int32, 3)
                    .data(values.as_slice())
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        assert!(needs_materialization(&list));
        let owned = materialize(&device, &list).unwrap();
        let view = owned.view();
        assert_eq!(view.child(0).unwrap().size(), 3);
        assert_eq!(view.child(1).unwrap().size(), 2);
    }

    #[test]
    fn dictionary_indices_are_sliced_and_keys_kept() {
        let device = SimDevice::default();
        let indices = upload_i32(&device, &[1, 0, 1, 1]);
        let keys = upload_i32(&device, &[10, 20]);
        let dict = ColumnView::builder(TypeId::Dictionary32, 4)
            .child(
                ColumnView::builder(TypeId::Int32, 4)
                    .data(indices.as_slice())
                    .build()
                    .unwrap(),
            )
            .child(
                ColumnView::builder(TypeId::Int32, 2)
                    .data(keys.as_slice())
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
            .slice(&device, 1, 3)
            .unwrap();

        let owned = materialize(&device, &dict).unwrap();
        let view = owned.view();
        assert_eq!(view.size(), 2);
        assert_eq!(read_i32(&device, view.child(0).unwrap()), vec![0, 1]);
        assert_eq!(read_i32(&device, view.child(1).unwrap()), vec![10, 20]);
    }

    #[test]
    fn empty_list_gets_single_zero_offset() {
        let device = SimDevice::default();
        let offsets = upload_i32(&device, &[0, 2, 4]);
        let values = upload_i32(&device, &[1, 2, 3, 4]);
        let list = ColumnView::builder(TypeId::List, 2)
            .child(
                ColumnView::builder(TypeId::Int32, 3)
                    .data(offsets.as_slice())
                    .build()
                    .unwrap(),
            )
            .child(
                ColumnView::builder(TypeId::Int32, 4)
                    .data(values.as_slice())
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
            .slice(&device, 2, 2)
            .unwrap();
        let owned = materialize(&device, &list).unwrap();
        let view = owned.view();
        assert_eq!(view.size(), 0);
        assert_eq!(view.child(0).unwrap().size(), 1);
        assert_eq!(view.child(1).unwrap().size(), 0);
    }

    #[test]
    fn structs_cannot_be_materialized() {
        let device = SimDevice::default();
        let view = ColumnView::builder(TypeId::Struct, 0).build().unwrap();
        let err = materialize(&device, &view).unwrap_err();
        assert!(matches!(err, InteropError::UnsupportedType(TypeId::Struct)));
    }
}
