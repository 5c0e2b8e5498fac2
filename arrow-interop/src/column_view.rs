//! Read-only descriptions of device-resident columns and tables.

use gpu_memory_manager::{Device, DeviceBuffer, DeviceSlice};

use crate::bitmask;
use crate::error::{InteropError, Result};

/// Physical element type of a device column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeId {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// One byte per value; zero is false.
    Bool8,
    /// Days since the epoch, stored as `i32`.
    TimestampDays,
    TimestampSeconds,
    TimestampMilliseconds,
    TimestampMicroseconds,
    TimestampNanoseconds,
    DurationSeconds,
    DurationMilliseconds,
    DurationMicroseconds,
    DurationNanoseconds,
    /// Children: indices, then the dictionary values.
    Dictionary32,
    /// Children: offsets (`size + 1` entries), then the character bytes.
    String,
    /// Children: offsets (`size + 1` entries), then the flattened values.
    List,
    Struct,
    Empty,
}

impl TypeId {
    /// Width in bytes of one element, for fixed-width types.
    pub fn element_width(self) -> Option<usize> {
        use TypeId::*;
        match self {
            Int8 | UInt8 | Bool8 => Some(1),
            Int16 | UInt16 => Some(2),
            Int32 | UInt32 | Float32 | TimestampDays => Some(4),
            Int64 | UInt64 | Float64 | TimestampSeconds | TimestampMilliseconds
            | TimestampMicroseconds | TimestampNanoseconds | DurationSeconds
            | DurationMilliseconds | DurationMicroseconds | DurationNanoseconds => Some(8),
            Dictionary32 | String | List | Struct | Empty => None,
        }
    }

    pub fn is_fixed_width(self) -> bool {
        self.element_width().is_some()
    }

    pub fn is_integer(self) -> bool {
        use TypeId::*;
        matches!(
            self,
            Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64
        )
    }

    /// Types allowed as the offsets child of strings and lists.
    pub fn is_offset_type(self) -> bool {
        matches!(self, TypeId::Int32 | TypeId::Int64)
    }
}

/// A non-owning view of a device column.
///
/// `data` and `null_mask` cover the underlying allocation from its start;
/// the first visible element is at `offset`, and its validity is bit
/// `offset` of the mask. Children are not offset by the parent: for strings
/// and lists the parent offset indexes into the offsets child.
#[derive(Debug, Clone)]
pub struct ColumnView<'a> {
    type_id: TypeId,
    size: usize,
    offset: usize,
    null_count: usize,
    data: Option<DeviceSlice<'a>>,
    null_mask: Option<DeviceSlice<'a>>,
    children: Vec<ColumnView<'a>>,
}

impl<'a> ColumnView<'a> {
    pub fn builder(type_id: TypeId, size: usize) -> ColumnViewBuilder<'a> {
        ColumnViewBuilder {
            view: ColumnView {
                type_id,
                size,
                offset: 0,
                null_count: 0,
                data: None,
                null_mask: None,
                children: Vec::new(),
            },
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn null_count(&self) -> usize {
        self.null_count
    }

    pub fn has_nulls(&self) -> bool {
        self.null_count > 0
    }

    pub fn data(&self) -> Option<DeviceSlice<'a>> {
        self.data
    }

    pub fn null_mask(&self) -> Option<DeviceSlice<'a>> {
        self.null_mask
    }

    pub fn children(&self) -> &[ColumnView<'a>] {
        &self.children
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn child(&self, index: usize) -> Result<&ColumnView<'a>> {
        self.children.get(index).ok_or_else(|| {
            InteropError::InvalidView(format!(
                "{:?} column has no child {}",
                self.type_id, index
            ))
        })
    }

    /// View rows `begin..end` of this column.
    ///
    /// The null count of the new view is recomputed from the device bitmap.
    pub fn slice(&self, device: &dyn Device, begin: usize, end: usize) -> Result<ColumnView<'a>> {
        if begin > end || end > self.size {
            return Err(InteropError::InvalidView(format!(
                "slice {}..{} out of range for a column of {} rows",
                begin, end, self.size
            )));
        }
        let offset = self.offset + begin;
        let size = end - begin;
        let null_count = match self.null_mask {
            Some(mask) if self.null_count > 0 => {
                bitmask::count_unset_bits(device, mask, offset, size)?
            }
            _ => 0,
        };
        Ok(ColumnView {
            offset,
            size,
            null_count,
            ..self.clone()
        })
    }

    fn validate(&self) -> Result<()> {
        if self.null_count > self.size {
            return Err(self.invalid(format!(
                "null count {} exceeds size {}",
                self.null_count, self.size
            )));
        }
        let end = self
            .offset
            .checked_add(self.size)
            .ok_or_else(|| self.invalid("offset + size overflows".to_string()))?;
        match self.null_mask {
            Some(mask) if mask.len() < bitmask::bitmap_bytes(end) => {
                return Err(self.invalid(format!(
                    "null mask of {} bytes cannot cover {} rows",
                    mask.len(),
                    end
                )));
            }
            None if self.null_count > 0 => {
                return Err(self.invalid("nulls declared without a null mask".to_string()));
            }
            _ => {}
        }

        if let Some(width) = self.type_id.element_width() {
            let needed = end * width;
            let available = self.data.map_or(0, |d| d.len());
            if available < needed {
                return Err(self.invalid(format!(
                    "data of {} bytes cannot hold {} elements of width {}",
                    available, end, width
                )));
            }
            if !self.children.is_empty() {
                return Err(self.invalid("fixed-width columns have no children".to_string()));
            }
            return Ok(());
        }

        match self.type_id {
            TypeId::String => {
                if self.check_child_count(true)? {
                    self.check_child(0, TypeId::is_offset_type, "INT32 or INT64 offsets")?;
                    self.check_child(
                        1,
                        |t| matches!(t, TypeId::Int8 | TypeId::UInt8),
                        "INT8 or UINT8 characters",
                    )?;
                }
            }
            TypeId::List => {
                if self.check_child_count(true)? {
                    self.check_child(0, TypeId::is_offset_type, "INT32 or INT64 offsets")?;
                }
            }
            TypeId::Dictionary32 => {
                self.check_child_count(false)?;
                self.check_child(0, TypeId::is_integer, "integer indices")?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Returns whether the column has its two children. A childless column
    /// is accepted only when `allow_childless` and it has no rows.
    fn check_child_count(&self, allow_childless: bool) -> Result<bool> {
        match self.children.len() {
            2 => Ok(true),
            0 if allow_childless && self.size == 0 => Ok(false),
            n => Err(self.invalid(format!("expected 2 children, found {}", n))),
        }
    }

    fn check_child(
        &self,
        index: usize,
        accepts: impl Fn(TypeId) -> bool,
        expected: &'static str,
    ) -> Result<()> {
        let found = self.children[index].type_id;
        if accepts(found) {
            Ok(())
        } else {
            Err(InteropError::ChildTypeMismatch {
                parent: self.type_id,
                index,
                found,
                expected,
            })
        }
    }

    fn invalid(&self, reason: String) -> InteropError {
        InteropError::InvalidView(format!("{:?} column: {}", self.type_id, reason))
    }
}

/// Assembles a [`ColumnView`], checking its layout on `build`.
#[derive(Debug)]
pub struct ColumnViewBuilder<'a> {
    view: ColumnView<'a>,
}

impl<'a> ColumnViewBuilder<'a> {
    pub fn data(mut self, data: DeviceSlice<'a>) -> Self {
        self.view.data = Some(data);
        self
    }

    pub fn null_mask(mut self, mask: DeviceSlice<'a>, null_count: usize) -> Self {
        self.view.null_mask = Some(mask);
        self.view.null_count = null_count;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.view.offset = offset;
        self
    }

    pub fn child(mut self, child: ColumnView<'a>) -> Self {
        self.view.children.push(child);
        self
    }

    pub fn children(mut self, children: Vec<ColumnView<'a>>) -> Self {
        self.view.children = children;
        self
    }

    pub fn build(self) -> Result<ColumnView<'a>> {
        self.view.validate()?;
        Ok(self.view)
    }
}

/// A device column that owns its buffers, such as a materialized copy.
///
/// Its views always start at offset zero.
#[derive(Debug, Clone)]
pub struct OwnedColumn {
    type_id: TypeId,
    size: usize,
    null_count: usize,
    data: Option<DeviceBuffer>,
    null_mask: Option<DeviceBuffer>,
    children: Vec<OwnedColumn>,
}

impl OwnedColumn {
    pub fn new(
        type_id: TypeId,
        size: usize,
        data: Option<DeviceBuffer>,
        null_mask: Option<DeviceBuffer>,
        null_count: usize,
        children: Vec<OwnedColumn>,
    ) -> Result<Self> {
        let column = Self {
            type_id,
            size,
            null_count,
            data,
            null_mask,
            children,
        };
        column.view().validate()?;
        Ok(column)
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn view(&self) -> ColumnView<'_> {
        ColumnView {
            type_id: self.type_id,
            size: self.size,
            offset: 0,
            null_count: self.null_count,
            data: self.data.as_ref().map(DeviceBuffer::as_slice),
            null_mask: self.null_mask.as_ref().map(DeviceBuffer::as_slice),
            children: self.children.iter().map(OwnedColumn::view).collect(),
        }
    }

    /// Device bytes owned by this column and its children.
    pub fn device_bytes(&self) -> usize {
        self.data.as_ref().map_or(0, DeviceBuffer::len)
            + self.null_mask.as_ref().map_or(0, DeviceBuffer::len)
            + self.children.iter().map(OwnedColumn::device_bytes).sum::<usize>()
    }
}

/// An ordered set of equally sized column views.
#[derive(Debug, Clone, Default)]
pub struct TableView<'a> {
    columns: Vec<ColumnView<'a>>,
}

impl<'a> TableView<'a> {
    pub fn new(columns: Vec<ColumnView<'a>>) -> Result<Self> {
        if let Some(first) = columns.first() {
            if let Some(bad) = columns.iter().find(|c| c.size() != first.size()) {
                return Err(InteropError::InvalidView(format!(
                    "table columns differ in size ({} and {})",
                    first.size(),
                    bad.size()
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, ColumnView::size)
    }

    pub fn columns(&self) -> &[ColumnView<'a>] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnView<'a>> {
        self.columns.get(index)
    }
}
