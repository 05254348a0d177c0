use std::fmt::Display;

#[derive(Clone, Debug, PartialEq)]
pub enum IsoError
{
    /// A bracketed (age, metallicity) pair has no rows in the grid.
    EmptyTrack { age: f64, metallicity: f64 },
    /// Malformed query: wrong number of coordinates, non-finite values or bad options.
    Argument(String),
    /// Column requested or required by the schema is not present.
    InvalidColumn(String),
    /// Not enough affinely independent samples to triangulate.
    InsufficientSamples { required: usize, found: usize },
    InvalidLabel { row: usize, value: f64 },
    ColumnLengthMismatch,
    Parse { line: usize, reason: String },
    FileIOError,
    ReadBufferFailed,
    WriteBufferFailed,
    SerializationFailed,
    DeserializationFailed,
    LZ4DecompressionFailed,
}
impl std::error::Error for IsoError {}

impl Display for IsoError
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
