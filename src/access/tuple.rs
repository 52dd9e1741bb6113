use crate::access::schema::Schema;
use crate::access::value::Field;
use crate::error::{DbError, DbResult};
use crate::storage::page::PageId;
use std::cmp::Ordering;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

/// Location of a tuple: the page it lives on and its slot within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.page_id
            .cmp(&other.page_id)
            .then(self.slot.cmp(&other.slot))
    }
}

/// A row: one field per schema column, plus its location once stored.
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(schema: Arc<Schema>, fields: Vec<Field>) -> DbResult<Self> {
        if fields.len() != schema.num_fields() {
            return Err(DbError::InvalidTuple(format!(
                "expected {} fields, got {}",
                schema.num_fields(),
                fields.len()
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            if schema.field_type(i) != Some(field.field_type()) {
                return Err(DbError::InvalidTuple(format!(
                    "field {i} has type {}, schema says {}",
                    field.field_type(),
                    schema.columns()[i].field_type
                )));
            }
        }
        Ok(Self {
            schema,
            fields,
            record_id: None,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    pub fn set_field(&mut self, i: usize, field: Field) -> DbResult<()> {
        if self.schema.field_type(i) != Some(field.field_type()) {
            return Err(DbError::InvalidTuple(format!(
                "field {i} cannot hold a {} value",
                field.field_type()
            )));
        }
        self.fields[i] = field;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Concatenates two tuples. `schema` must be `Schema::merge` of their schemas.
    pub fn merge(schema: Arc<Schema>, left: &Tuple, right: &Tuple) -> DbResult<Tuple> {
        let fields: Vec<Field> = left.fields.iter().chain(&right.fields).cloned().collect();
        Tuple::new(schema, fields)
    }

    /// Writes the fields back to back, `schema.byte_size()` bytes in total.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> DbResult<()> {
        for field in &self.fields {
            field.serialize(writer)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(schema: Arc<Schema>, reader: &mut R) -> DbResult<Self> {
        let fields = schema
            .columns()
            .iter()
            .map(|c| c.field_type.parse(reader))
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Self {
            schema,
            fields,
            record_id: None,
        })
    }
}

/// Tuples compare by content; the record id is not part of a tuple's value.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.fields == other.fields
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.fields.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", values.join("\t"))
    }
}
