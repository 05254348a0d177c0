use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{errors::IsoError, evolution::label_value, table::{ColumnSchema, ResolvedSchema, Table}};
use super::index::{GridIndex, GridPoint};

///
/// Row indices of every track in `table`, sorted by (age, metallicity).
/// Rows keep their table order inside a track.
///
pub(crate) fn group_tracks(table: &Table, schema: &ResolvedSchema) -> Vec<(GridPoint, Vec<usize>)>
{
    let ages = table.column_at(schema.age);
    let metallicities = table.column_at(schema.metallicity);
    let mut map: FxHashMap<GridPoint, Vec<usize>> = FxHashMap::default();
    for (row, (&age, &metallicity)) in ages.iter().zip(metallicities).enumerate()
    {
        map.entry(GridPoint::new(age, metallicity)).or_default().push(row);
    }
    let mut tracks: Vec<_> = map.into_iter().collect();
    tracks.sort_by(|a, b| a.0.cmp(&b.0));
    tracks
}

///
/// Immutable isochrone grid: the source table, its resolved schema and the rows of
/// each track, all computed once.
///
#[derive(Clone, Debug)]
pub struct IsochroneGrid
{
    table: Table,
    schema: ColumnSchema,
    resolved: ResolvedSchema,
    tracks: FxHashMap<GridPoint, Vec<usize>>,
    index: GridIndex,
}

impl IsochroneGrid
{
    pub fn new(table: Table, schema: ColumnSchema) -> Result<Self, IsoError>
    {
        let resolved = schema.resolve(&table)?;
        if table.is_empty()
        {
            return Err(IsoError::InsufficientSamples { required: 1, found: 0 });
        }
        for (row, &value) in table.column_at(resolved.label).iter().enumerate()
        {
            label_value(row, value)?;
        }
        for column in [resolved.age, resolved.metallicity]
        {
            if let Some(row) = table.column_at(column).iter().position(|v| !v.is_finite())
            {
                let name = table.column_name_at(column).unwrap_or_default();
                return Err(IsoError::Argument(format!("non-finite {name} at row {row}")));
            }
        }
        let tracks: FxHashMap<GridPoint, Vec<usize>> = group_tracks(&table, &resolved).into_iter().collect();
        let index = GridIndex::new(tracks.keys().copied());
        debug!(rows = table.len(), tracks = tracks.len(), ages = index.ages().len(), metallicities = index.metallicities().len(), "loaded isochrone grid");
        Ok(Self { table, schema, resolved, tracks, index })
    }

    #[inline]
    pub fn table(&self) -> &Table
    {
        &self.table
    }

    #[inline]
    pub fn schema(&self) -> &ColumnSchema
    {
        &self.schema
    }

    #[inline]
    pub fn resolved(&self) -> &ResolvedSchema
    {
        &self.resolved
    }

    #[inline]
    pub fn index(&self) -> &GridIndex
    {
        &self.index
    }

    /// Number of tracks.
    #[inline]
    pub fn len(&self) -> usize
    {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.tracks.is_empty()
    }

    pub fn points(&self) -> Vec<GridPoint>
    {
        let mut points: Vec<_> = self.tracks.keys().copied().collect();
        points.sort();
        points
    }

    ///
    /// Rows of the track at `point`. Combinations absent from a sparse grid are
    /// empty tracks.
    ///
    pub fn track_rows(&self, point: &GridPoint) -> Result<&[usize], IsoError>
    {
        match self.tracks.get(point)
        {
            Some(rows) if !rows.is_empty() => Ok(rows.as_slice()),
            _ => Err(IsoError::EmptyTrack { age: point.age, metallicity: point.metallicity }),
        }
    }

    pub fn track(&self, point: &GridPoint) -> Result<Table, IsoError>
    {
        Ok(self.table.select_rows(self.track_rows(point)?))
    }

    ///
    /// Column indices of the requested quantities, or of every quantity column when
    /// `names` is `None`. Coordinates and the evolution column cannot be requested.
    ///
    pub fn quantity_columns<S: AsRef<str>>(&self, names: Option<&[S]>) -> Result<Vec<usize>, IsoError>
    {
        match names
        {
            None => Ok(self.resolved.quantity_columns(&self.table)),
            Some(names) => names.iter().map(|name|
            {
                let name = name.as_ref();
                match self.table.column_index(name)
                {
                    Some(i) if i != self.resolved.age && i != self.resolved.metallicity && Some(i) != self.resolved.evolution => Ok(i),
                    _ => Err(IsoError::InvalidColumn(name.to_owned())),
                }
            }).collect(),
        }
    }
}
