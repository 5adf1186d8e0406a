// Protocol Gate
//
// Compares a table's declared minimum reader/writer versions with what
// this implementation supports. Read and write are checked independently.
// A failed check is final: callers must upgrade, nothing is retried.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::actions::Protocol;

pub const CURRENT_READER_VERSION: i32 = 1;
pub const CURRENT_WRITER_VERSION: i32 = 2;

/// Protocol versions an implementation is able to honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedVersions {
    pub reader_version: i32,
    pub writer_version: i32,
}

impl SupportedVersions {
    pub fn new(reader_version: i32, writer_version: i32) -> Self {
        Self {
            reader_version,
            writer_version,
        }
    }
}

impl Default for SupportedVersions {
    fn default() -> Self {
        Self::new(CURRENT_READER_VERSION, CURRENT_WRITER_VERSION)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// Which of the two protocol bounds a check is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolBound {
    Reader,
    Writer,
}

impl fmt::Display for ProtocolBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolBound::Reader => f.write_str("reader"),
            ProtocolBound::Writer => f.write_str("writer"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error(
    "table requires {bound} version {required} but this implementation supports {supported} \
     (short by {})",
    gap(.required, .supported)
)]
pub struct UnsupportedProtocolError {
    pub bound: ProtocolBound,
    pub required: i32,
    pub supported: i32,
}

fn gap(required: &i32, supported: &i32) -> i32 {
    required.saturating_sub(*supported)
}

impl UnsupportedProtocolError {
    /// How many versions the implementation is behind the table.
    pub fn shortfall(&self) -> i32 {
        gap(&self.required, &self.supported)
    }
}

pub fn check_protocol(
    table: &Protocol,
    supported: SupportedVersions,
    operation: Operation,
) -> Result<(), UnsupportedProtocolError> {
    let (bound, required, supported) = match operation {
        Operation::Read => (
            ProtocolBound::Reader,
            table.min_reader_version(),
            supported.reader_version,
        ),
        Operation::Write => (
            ProtocolBound::Writer,
            table.min_writer_version(),
            supported.writer_version,
        ),
    };

    if required > supported {
        return Err(UnsupportedProtocolError {
            bound,
            required,
            supported,
        });
    }
    Ok(())
}

pub fn check_read(
    table: &Protocol,
    supported: SupportedVersions,
) -> Result<(), UnsupportedProtocolError> {
    check_protocol(table, supported, Operation::Read)
}

pub fn check_write(
    table: &Protocol,
    supported: SupportedVersions,
) -> Result<(), UnsupportedProtocolError> {
    check_protocol(table, supported, Operation::Write)
}
