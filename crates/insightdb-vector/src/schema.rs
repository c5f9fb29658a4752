use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const META_TABLE: &str = "meta";
pub const MANIFEST_KEY: &str = "manifest";

pub fn vector_field(dim: i32) -> Field {
	Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true)
}

/// Segment payload + vector. `ordinal` is the global insertion order and
/// breaks distance ties at query time.
pub fn build_segments_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("entry_id", DataType::Utf8, false),
		Field::new("name", DataType::Utf8, false),
		Field::new("destination", DataType::Utf8, false),
		Field::new("malformed", DataType::Boolean, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("total_chunks", DataType::Int32, false),
		Field::new("span_start", DataType::Int64, false),
		Field::new("span_end", DataType::Int64, false),
		Field::new("ordinal", DataType::Int64, false),
		vector_field(dim),
	]))
}

pub fn build_meta_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
		Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}
