//! Routes a column view to exactly one conversion strategy by its type tag.

use arrow_schema::DataType;
use tracing::debug;

use crate::column_view::{ColumnView, TypeId};
use crate::context::ExportContext;
use crate::converters;
use crate::error::{InteropError, Result};
use crate::pending::PendingArray;
use crate::schema_utils::fixed_width_arrow_type;

/// The conversion strategy for a device type.
#[derive(Debug, Clone, PartialEq)]
pub enum Category {
    FixedWidth { width: usize, data_type: DataType },
    String,
    Dictionary,
    List,
}

impl Category {
    pub fn of(type_id: TypeId) -> Result<Self> {
        if let (Some(width), Some(data_type)) =
            (type_id.element_width(), fixed_width_arrow_type(type_id))
        {
            return Ok(Category::FixedWidth { width, data_type });
        }
        match type_id {
            TypeId::String => Ok(Category::String),
            TypeId::Dictionary32 => Ok(Category::Dictionary),
            TypeId::List => Ok(Category::List),
            other => Err(InteropError::UnsupportedType(other)),
        }
    }
}

/// Issue every transfer needed to convert `view` and describe the array the
/// bytes will form once the context's stream is synchronized.
pub fn convert(ctx: &ExportContext<'_>, view: &ColumnView<'_>) -> Result<PendingArray> {
    convert_at_depth(ctx, view, 0)
}

/// [`convert`] for a column nested `depth` levels below a table column.
pub(crate) fn convert_at_depth(
    ctx: &ExportContext<'_>,
    view: &ColumnView<'_>,
    depth: usize,
) -> Result<PendingArray> {
    let max_depth = ctx.export_config().max_nesting_depth;
    if depth > max_depth {
        return Err(InteropError::NestingTooDeep(max_depth));
    }

    let category = Category::of(view.type_id())?;
    debug!(
        "Converting {:?} column of {} rows as {:?} (depth {})",
        view.type_id(),
        view.size(),
        category,
        depth
    );
    match category {
        Category::FixedWidth { width, data_type } => {
            converters::fixed_width(ctx, view, width, data_type)
        }
        Category::String => converters::string(ctx, view, depth),
        Category::Dictionary => converters::dictionary(ctx, view, depth),
        Category::List => converters::list(ctx, view, depth),
    }
}
