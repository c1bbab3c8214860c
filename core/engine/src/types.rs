//! Records decoded from control-channel result rows.
//!
//! Decoding is strictly positional: each record names the wire columns in
//! order, and a missing or mistyped column is a protocol violation, never a
//! silent default.

use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::wire::Row;

/// A breakpoint position, also returned by the step operations.
///
/// Wire columns: `(targetId, line, label)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub target_id: u32,
    pub line: u32,
    pub signature: String,
}

impl Breakpoint {
    pub(crate) fn decode(row: &Row) -> Result<Self> {
        Ok(Self {
            target_id: col_u32(row, 0)?,
            line: col_u32(row, 1)?,
            signature: col_str(row, 2)?,
        })
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {} (target {})",
            self.signature, self.line, self.target_id
        )
    }
}

/// One frame of the target's call stack.
///
/// Wire columns: `(depth, label, targetId, line, args)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub depth: u32,
    pub label: String,
    pub target_id: u32,
    pub line: u32,
    pub args: String,
}

impl Frame {
    pub(crate) fn decode(row: &Row) -> Result<Self> {
        Ok(Self {
            depth: col_u32(row, 0)?,
            label: col_str(row, 1)?,
            target_id: col_u32(row, 2)?,
            line: col_u32(row, 3)?,
            args: col_str(row, 4)?,
        })
    }
}

/// A variable visible in the current frame.
///
/// Wire columns: `(name, class, line, unique, const, notNull, type, value)`;
/// the struct fields mirror that order exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub var_class: String,
    pub line: u32,
    pub unique: bool,
    pub constant: bool,
    pub not_null: bool,
    pub declared_type: String,
    pub value: String,
}

impl Variable {
    pub(crate) fn decode(row: &Row) -> Result<Self> {
        Ok(Self {
            name: col_str(row, 0)?,
            var_class: col_str(row, 1)?,
            line: col_u32(row, 2)?,
            unique: col_bool(row, 3)?,
            constant: col_bool(row, 4)?,
            not_null: col_bool(row, 5)?,
            declared_type: col_str(row, 6)?,
            value: col_str(row, 7)?,
        })
    }
}

fn col<'r>(row: &'r Row, idx: usize) -> Result<&'r Value> {
    row.get(idx)
        .ok_or_else(|| Error::Protocol(format!("row is missing column {idx}")))
}

pub(crate) fn col_str(row: &Row, idx: usize) -> Result<String> {
    match col(row, idx)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(Error::Protocol(format!(
            "column {idx} is not a string: {other}"
        ))),
    }
}

pub(crate) fn col_u32(row: &Row, idx: usize) -> Result<u32> {
    col(row, idx)?
        .as_u64()
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| Error::Protocol(format!("column {idx} is not a valid integer")))
}

pub(crate) fn col_i64(row: &Row, idx: usize) -> Result<i64> {
    col(row, idx)?
        .as_i64()
        .ok_or_else(|| Error::Protocol(format!("column {idx} is not a valid integer")))
}

pub(crate) fn col_bool(row: &Row, idx: usize) -> Result<bool> {
    col(row, idx)?
        .as_bool()
        .ok_or_else(|| Error::Protocol(format!("column {idx} is not a boolean")))
}
