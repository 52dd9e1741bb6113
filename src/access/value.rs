use crate::error::{DbError, DbResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};

/// Maximum number of bytes a string field can hold on disk.
pub const STRING_LEN: usize = 128;

/// Field types supported by the storage format. Every type has a fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Int,
    Str,
}

impl FieldType {
    /// Width of a serialized value of this type in bytes.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Str => 4 + STRING_LEN,
        }
    }

    /// Reads one value of this type from `reader`.
    pub fn parse<R: Read>(&self, reader: &mut R) -> DbResult<Field> {
        match self {
            FieldType::Int => Ok(Field::Int(reader.read_i32::<BigEndian>()?)),
            FieldType::Str => {
                let len = reader.read_u32::<BigEndian>()? as usize;
                let mut buf = [0u8; STRING_LEN];
                reader.read_exact(&mut buf)?;
                if len > STRING_LEN {
                    return Err(DbError::InvalidTuple(format!(
                        "string length {len} exceeds {STRING_LEN}"
                    )));
                }
                let s = std::str::from_utf8(&buf[..len])
                    .map_err(|e| DbError::InvalidTuple(e.to_string()))?;
                Ok(Field::Str(s.to_string()))
            }
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Str => write!(f, "string"),
        }
    }
}

impl std::str::FromStr for FieldType {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(FieldType::Int),
            "str" | "string" | "text" => Ok(FieldType::Str),
            other => Err(DbError::InvalidTuple(format!("unknown field type: {other}"))),
        }
    }
}

/// A single typed value within a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Str(_) => FieldType::Str,
        }
    }

    /// Writes exactly `self.field_type().len()` bytes. Strings longer than
    /// [`STRING_LEN`] bytes are rejected rather than truncated.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> DbResult<()> {
        match self {
            Field::Int(v) => writer.write_i32::<BigEndian>(*v)?,
            Field::Str(s) => {
                let bytes = s.as_bytes();
                if bytes.len() > STRING_LEN {
                    return Err(DbError::InvalidTuple(format!(
                        "string of {} bytes exceeds {STRING_LEN}",
                        bytes.len()
                    )));
                }
                writer.write_u32::<BigEndian>(bytes.len() as u32)?;
                writer.write_all(bytes)?;
                writer.write_all(&[0u8; STRING_LEN][..STRING_LEN - bytes.len()])?;
            }
        }
        Ok(())
    }

    /// Parses `text` as a value of `field_type`.
    pub fn parse_str(field_type: FieldType, text: &str) -> DbResult<Field> {
        match field_type {
            FieldType::Int => text
                .parse::<i32>()
                .map(Field::Int)
                .map_err(|e| DbError::InvalidTuple(format!("'{text}': {e}"))),
            FieldType::Str => Ok(Field::Str(text.to_string())),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{v}"),
            Field::Str(s) => write!(f, "{s}"),
        }
    }
}
