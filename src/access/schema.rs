use crate::access::value::FieldType;
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, typed column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub field_type: FieldType,
}

impl Column {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered column list describing the layout of a tuple.
///
/// Two schemas are equal when their column types match position by position; column
/// names do not participate in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> DbResult<Self> {
        if columns.is_empty() {
            return Err(DbError::InvalidTuple(
                "schema needs at least one column".to_string(),
            ));
        }
        Ok(Self { columns })
    }

    /// Builds a schema with generated column names `field0`, `field1`, ...
    pub fn from_types(types: &[FieldType]) -> DbResult<Self> {
        Self::new(
            types
                .iter()
                .enumerate()
                .map(|(i, t)| Column::new(format!("field{i}"), *t))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn num_fields(&self) -> usize {
        self.columns.len()
    }

    pub fn field_type(&self, i: usize) -> Option<FieldType> {
        self.columns.get(i).map(|c| c.field_type)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Serialized width of one tuple in bytes.
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(|c| c.field_type.len()).sum()
    }

    /// Concatenates two schemas, as needed by a join's output.
    pub fn merge(left: &Schema, right: &Schema) -> Schema {
        let mut columns = left.columns.clone();
        columns.extend(right.columns.iter().cloned());
        Schema { columns }
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{}({})", c.name, c.field_type))
            .collect();
        write!(f, "[{}]", cols.join(", "))
    }
}
