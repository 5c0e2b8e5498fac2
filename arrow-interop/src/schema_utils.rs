use arrow_schema::{DataType, Field, TimeUnit};
use std::sync::Arc;

use crate::column_view::TypeId;

/// Arrow type of a fixed-width device type, `None` for every other type.
pub fn fixed_width_arrow_type(type_id: TypeId) -> Option<DataType> {
    use TypeId::*;
    let dt = match type_id {
        Int8 => DataType::Int8,
        Int16 => DataType::Int16,
        Int32 => DataType::Int32,
        Int64 => DataType::Int64,
        UInt8 => DataType::UInt8,
        UInt16 => DataType::UInt16,
        UInt32 => DataType::UInt32,
        UInt64 => DataType::UInt64,
        Float32 => DataType::Float32,
        Float64 => DataType::Float64,
        Bool8 => DataType::Boolean,
        TimestampDays => DataType::Date32,
        TimestampSeconds => DataType::Timestamp(TimeUnit::Second, None),
        TimestampMilliseconds => DataType::Timestamp(TimeUnit::Millisecond, None),
        TimestampMicroseconds => DataType::Timestamp(TimeUnit::Microsecond, None),
        TimestampNanoseconds => DataType::Timestamp(TimeUnit::Nanosecond, None),
        DurationSeconds => DataType::Duration(TimeUnit::Second),
        DurationMilliseconds => DataType::Duration(TimeUnit::Millisecond),
        DurationMicroseconds => DataType::Duration(TimeUnit::Microsecond),
        DurationNanoseconds => DataType::Duration(TimeUnit::Nanosecond),
        Dictionary32 | String | List | Struct | Empty => return None,
    };
    Some(dt)
}

/// `Utf8`, or `LargeUtf8` for 64-bit offsets.
pub fn string_type(offsets: TypeId) -> DataType {
    match offsets {
        TypeId::Int64 => DataType::LargeUtf8,
        _ => DataType::Utf8,
    }
}

/// `List`, or `LargeList` for 64-bit offsets, of nullable `values`.
pub fn list_type(offsets: TypeId, values: DataType) -> DataType {
    let item = Arc::new(Field::new("item", values, true));
    match offsets {
        TypeId::Int64 => DataType::LargeList(item),
        _ => DataType::List(item),
    }
}

pub fn dictionary_type(keys: DataType, values: DataType) -> DataType {
    DataType::Dictionary(Box::new(keys), Box::new(values))
}
