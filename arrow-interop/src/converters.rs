//! The four conversion strategies. Each one normalizes its view, issues the
//! transfers for its own buffers, and re-enters the dispatcher for children.
//! Children are issued before the parent's validity bitmap.

use arrow_schema::{DataType, Field};
use std::sync::Arc;

use crate::column_view::ColumnView;
use crate::context::ExportContext;
use crate::dispatch::convert_at_depth;
use crate::error::{InteropError, Result};
use crate::fetch::{fetch_data, fetch_mask};
use crate::normalize::normalize;
use crate::pending::PendingArray;
use crate::schema_utils::{dictionary_type, fixed_width_arrow_type, list_type, string_type};

pub(crate) fn fixed_width(
    ctx: &ExportContext<'_>,
    view: &ColumnView<'_>,
    width: usize,
    data_type: DataType,
) -> Result<PendingArray> {
    let data = fetch_data(ctx, view, width)?;
    let validity = fetch_mask(ctx, view)?;
    Ok(PendingArray::new(
        data_type,
        view.size(),
        view.null_count(),
        validity,
        vec![data],
        vec![],
    ))
}

pub(crate) fn string(
    ctx: &ExportContext<'_>,
    view: &ColumnView<'_>,
    depth: usize,
) -> Result<PendingArray> {
    let normalized = normalize(ctx.device(), view)?;
    let view = normalized.view();
    if view.num_children() == 0 {
        return Ok(PendingArray::empty(DataType::Utf8));
    }

    let offsets = view.child(0)?;
    let data_type = string_type(offsets.type_id());
    let offsets = convert_at_depth(ctx, offsets, depth + 1)?.into_data_buffer()?;
    let chars = convert_at_depth(ctx, view.child(1)?, depth + 1)?.into_data_buffer()?;
    let validity = fetch_mask(ctx, &view)?;
    Ok(PendingArray::new(
        data_type,
        view.size(),
        view.null_count(),
        validity,
        vec![offsets, chars],
        vec![],
    ))
}

pub(crate) fn dictionary(
    ctx: &ExportContext<'_>,
    view: &ColumnView<'_>,
    depth: usize,
) -> Result<PendingArray> {
    let normalized = normalize(ctx.device(), view)?;
    let view = normalized.view();

    let indices = view.child(0)?;
    let key_type = fixed_width_arrow_type(indices.type_id())
        .ok_or(InteropError::UnsupportedType(indices.type_id()))?;
    let indices = convert_at_depth(ctx, indices, depth + 1)?.into_data_buffer()?;
    let values = convert_at_depth(ctx, view.child(1)?, depth + 1)?;
    let validity = fetch_mask(ctx, &view)?;
    Ok(PendingArray::new(
        dictionary_type(key_type, values.data_type().clone()),
        view.size(),
        view.null_count(),
        validity,
        vec![indices],
        vec![values],
    ))
}

pub(crate) fn list(
    ctx: &ExportContext<'_>,
    view: &ColumnView<'_>,
    depth: usize,
) -> Result<PendingArray> {
    let normalized = normalize(ctx.device(), view)?;
    let view = normalized.view();
    if view.num_children() == 0 {
        let item = Arc::new(Field::new("item", DataType::Null, true));
        return Ok(PendingArray::empty(DataType::List(item)));
    }

    let offsets = view.child(0)?;
    let offsets_type = offsets.type_id();
    let offsets = convert_at_depth(ctx, offsets, depth + 1)?.into_data_buffer()?;
    let values = convert_at_depth(ctx, view.child(1)?, depth + 1)?;
    let validity = fetch_mask(ctx, &view)?;
    Ok(PendingArray::new(
        list_type(offsets_type, values.data_type().clone()),
        view.size(),
        view.null_count(),
        validity,
        vec![offsets],
        vec![values],
    ))
}
