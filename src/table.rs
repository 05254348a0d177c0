use std::{io::Read, path::Path};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::IsoError;

///
/// Column-major table of named `f64` columns, all of the same length.
/// Column order is the insertion order.
///
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Table
{
    columns: IndexMap<String, Vec<f64>>,
    len: usize,
    /// Free text found above the header when the table was parsed.
    pub comment: String,
}

impl Table
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn from_columns<I, S>(columns: I) -> Result<Self, IsoError>
    where I: IntoIterator<Item = (S, Vec<f64>)>, S: Into<String>
    {
        let mut table = Self::new();
        for (name, values) in columns
        {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    ///
    /// Appends a column, or replaces the values of an existing column in place.
    ///
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<(), IsoError>
    {
        if self.columns.is_empty()
        {
            self.len = values.len();
        }
        else if values.len() != self.len
        {
            return Err(IsoError::ColumnLengthMismatch);
        }
        self.columns.insert(name.into(), values);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize
    {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    #[inline]
    pub fn num_columns(&self) -> usize
    {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str>
    {
        self.columns.keys().map(|k| k.as_str())
    }

    #[inline]
    pub fn has_column(&self, name: &str) -> bool
    {
        self.columns.contains_key(name)
    }

    #[inline]
    pub fn column(&self, name: &str) -> Option<&[f64]>
    {
        self.columns.get(name).map(|c| c.as_slice())
    }

    #[inline]
    pub fn column_index(&self, name: &str) -> Option<usize>
    {
        self.columns.get_index_of(name)
    }

    ///
    /// Column by position. Panics if `index >= num_columns()`.
    ///
    #[inline]
    pub fn column_at(&self, index: usize) -> &[f64]
    {
        &self.columns[index]
    }

    #[inline]
    pub fn column_name_at(&self, index: usize) -> Option<&str>
    {
        self.columns.get_index(index).map(|(k, _)| k.as_str())
    }

    ///
    /// New table holding the given rows, in the given order.
    ///
    pub fn select_rows(&self, rows: &[usize]) -> Table
    {
        let columns = self.columns.iter()
            .map(|(name, values)| (name.clone(), rows.iter().map(|&r| values[r]).collect()))
            .collect();
        Table { columns, len: rows.len(), comment: self.comment.clone() }
    }

    ///
    /// Parses whitespace separated text as written by the CMD isochrone service.
    /// Leading `#` lines are comments, the last of which holds the column names.
    /// Anything after a `#` in later lines is ignored.
    ///
    pub fn parse(text: &str) -> Result<Table, IsoError>
    {
        let mut comments: Vec<&str> = Vec::new();
        let mut lines = text.lines().enumerate().peekable();
        while let Some(&(_, line)) = lines.peek()
        {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#')
            {
                comments.push(trimmed);
                lines.next();
            }
            else if trimmed.is_empty()
            {
                lines.next();
            }
            else
            {
                break;
            }
        }
        let header: Vec<String> = match comments.pop()
        {
            Some(line) => line.trim_start_matches('#').split_whitespace().map(str::to_owned).collect(),
            None => match lines.next()
            {
                Some((_, line)) => line.split_whitespace().map(str::to_owned).collect(),
                None => Vec::new(),
            },
        };
        if header.is_empty()
        {
            return Err(IsoError::Parse { line: 0, reason: "missing header".to_owned() });
        }

        let mut data: Vec<Vec<f64>> = vec![Vec::new(); header.len()];
        for (num, line) in lines
        {
            let content = match line.find('#')
            {
                Some(pos) => &line[..pos],
                None => line,
            };
            if content.trim().is_empty()
            {
                continue;
            }
            let mut count = 0;
            for (i, token) in content.split_whitespace().enumerate()
            {
                if i >= header.len()
                {
                    count = i + 1;
                    break;
                }
                let value = token.parse::<f64>().map_err(|e| IsoError::Parse { line: num + 1, reason: format!("{token}: {e}") })?;
                data[i].push(value);
                count = i + 1;
            }
            if count != header.len()
            {
                return Err(IsoError::Parse { line: num + 1, reason: format!("expected {} fields", header.len()) });
            }
        }

        let mut table = Table::from_columns(header.into_iter().zip(data))?;
        table.comment = comments.iter()
            .map(|c| c.trim_start_matches('#').trim())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(table)
    }

    pub fn read<Reader: Read>(mut reader: Reader) -> Result<Table, IsoError>
    {
        let mut text = String::new();
        reader.read_to_string(&mut text).map_err(|_| IsoError::ReadBufferFailed)?;
        Self::parse(&text)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Table, IsoError>
    {
        let file = std::fs::File::open(path).map_err(|_| IsoError::FileIOError)?;
        Self::read(std::io::BufReader::new(file))
    }
}

///
/// Canonical column names of an isochrone grid. Defaults follow the CMD output.
///
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ColumnSchema
{
    pub age: String,
    pub metallicity: String,
    pub label: String,
    /// Name of the continuous evolution column written to results.
    pub evolution: String,
}

impl Default for ColumnSchema
{
    fn default() -> Self {
        Self::new("logAge", "MH", "label")
    }
}

impl ColumnSchema
{
    pub fn new(age: impl Into<String>, metallicity: impl Into<String>, label: impl Into<String>) -> Self
    {
        Self { age: age.into(), metallicity: metallicity.into(), label: label.into(), evolution: "evol".to_owned() }
    }

    pub fn with_evolution(mut self, evolution: impl Into<String>) -> Self
    {
        self.evolution = evolution.into();
        self
    }

    ///
    /// Looks up the storage position of every canonical column once.
    ///
    pub fn resolve(&self, table: &Table) -> Result<ResolvedSchema, IsoError>
    {
        let find = |name: &str| table.column_index(name).ok_or_else(|| IsoError::InvalidColumn(name.to_owned()));
        Ok(ResolvedSchema
        {
            age: find(&self.age)?,
            metallicity: find(&self.metallicity)?,
            label: find(&self.label)?,
            evolution: table.column_index(&self.evolution),
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedSchema
{
    pub age: usize,
    pub metallicity: usize,
    pub label: usize,
    /// Present only when the source table already carries an evolution column.
    pub evolution: Option<usize>,
}

impl ResolvedSchema
{
    ///
    /// True if the column at `index` is a physical quantity: not a coordinate,
    /// not the stage label and not a precomputed evolution column.
    ///
    #[inline]
    pub fn is_quantity(&self, index: usize) -> bool
    {
        index != self.age && index != self.metallicity && index != self.label && Some(index) != self.evolution
    }

    pub fn quantity_columns(&self, table: &Table) -> Vec<usize>
    {
        (0..table.num_columns()).filter(|&i| self.is_quantity(i)).collect()
    }
}
