//!
//! Quick isochrone interpolation.
//!
//! A query `(age, metallicity)` is bracketed by up to four tracks of the grid.
//! Each of them gets its own continuous evolution coordinate, their rows are
//! stacked into one `(age, metallicity, evol)` cloud and every quantity is
//! interpolated linearly on a Delaunay triangulation of that cloud, along a
//! regular sweep of the evolution coordinate.
//!
//! ```no_run
//! use isochrone_interp::interpolator::QuickInterpolator;
//!
//! let iso = QuickInterpolator::from_path("isochrones.dat")?;
//! let cluster = iso.interpolate::<&str>(8.3, -0.2, None)?;
//! println!("{} rows", cluster.len());
//! # Ok::<(), isochrone_interp::errors::IsoError>(())
//! ```
//!
use std::{io::Write, path::Path};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    algorithms::interpolation::ScatteredInterpolator,
    errors::IsoError,
    grid::{index::GridPoint, neighbors::LocalTrackSet, store::IsochroneGrid},
    serialization::{deserialize, serialize, SerializationFormat},
    table::{ColumnSchema, Table},
};

/// Largest number of evolution points a sweep may hold.
pub const MAX_SWEEP_POINTS: usize = 10_000_000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterpolatorOptions
{
    pub schema: ColumnSchema,
    /// Spacing of the evolution sweep.
    pub sweep_step: f64,
    /// Exclusive upper end of the evolution sweep, which starts at 0.
    pub sweep_upper: f64,
}

impl Default for InterpolatorOptions
{
    fn default() -> Self {
        Self { schema: ColumnSchema::default(), sweep_step: 1e-3, sweep_upper: 9.0 }
    }
}

impl InterpolatorOptions
{
    pub fn new(schema: ColumnSchema) -> Self
    {
        Self { schema, ..Default::default() }
    }

    pub fn with_sweep(mut self, step: f64, upper: f64) -> Self
    {
        self.sweep_step = step;
        self.sweep_upper = upper;
        self
    }

    pub fn validate(&self) -> Result<(), IsoError>
    {
        if !(self.sweep_step.is_finite() && self.sweep_step > 0.0)
        {
            return Err(IsoError::Argument(format!("sweep step must be positive, got {}", self.sweep_step)));
        }
        if !(self.sweep_upper.is_finite() && self.sweep_upper > 0.0)
        {
            return Err(IsoError::Argument(format!("sweep upper bound must be positive, got {}", self.sweep_upper)));
        }
        let count = (self.sweep_upper / self.sweep_step).ceil();
        if !count.is_finite() || count > MAX_SWEEP_POINTS as f64
        {
            return Err(IsoError::Argument(format!("sweep of {count} points exceeds {MAX_SWEEP_POINTS}")));
        }
        Ok(())
    }

    ///
    /// `0, step, 2 step, ...` strictly below `sweep_upper`.
    ///
    pub fn sweep(&self) -> Vec<f64>
    {
        let count = (self.sweep_upper / self.sweep_step).ceil() as usize;
        (0..count).map(|i| i as f64 * self.sweep_step).collect()
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot
{
    table: Table,
    options: InterpolatorOptions,
}

///
/// Interpolator over an immutable isochrone grid. Queries share nothing mutable,
/// so one instance can serve several threads.
///
#[derive(Clone, Debug)]
pub struct QuickInterpolator
{
    grid: IsochroneGrid,
    options: InterpolatorOptions,
    sweep: Vec<f64>,
}

impl QuickInterpolator
{
    pub fn new(table: Table) -> Result<Self, IsoError>
    {
        Self::with_options(table, InterpolatorOptions::default())
    }

    pub fn with_options(table: Table, options: InterpolatorOptions) -> Result<Self, IsoError>
    {
        options.validate()?;
        let grid = IsochroneGrid::new(table, options.schema.clone())?;
        let sweep = options.sweep();
        Ok(Self { grid, options, sweep })
    }

    ///
    /// Loads a grid written by the CMD service (see [`Table::parse`]).
    ///
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, IsoError>
    {
        Self::new(Table::from_path(path)?)
    }

    #[inline]
    pub fn grid(&self) -> &IsochroneGrid
    {
        &self.grid
    }

    #[inline]
    pub fn options(&self) -> &InterpolatorOptions
    {
        &self.options
    }

    ///
    /// Per-axis closest grid coordinates, `[age, metallicity]`.
    ///
    pub fn closest_coordinates(&self, coordinates: &[f64]) -> Result<GridPoint, IsoError>
    {
        check_finite(coordinates)?;
        self.grid.index().nearest(coordinates)
    }

    ///
    /// The up to four grid points around `[age, metallicity]`.
    ///
    pub fn bracket_coordinates(&self, coordinates: &[f64]) -> Result<Vec<GridPoint>, IsoError>
    {
        check_finite(coordinates)?;
        self.grid.index().bracket(coordinates)
    }

    ///
    /// Rows of the track at the closest grid coordinates.
    ///
    pub fn closest(&self, age: f64, metallicity: f64) -> Result<Table, IsoError>
    {
        let point = self.closest_coordinates(&[age, metallicity])?;
        self.grid.track(&point)
    }

    ///
    /// Interpolated isochrone at `(age, metallicity)`.
    ///
    /// The result holds the age, metallicity and evolution columns followed by the
    /// requested quantities (all quantity columns when `quantities` is `None`), one
    /// row per sweep point inside the hull of the neighbouring tracks, by
    /// ascending evolution. When no sweep point is inside, the table has the
    /// columns but no rows.
    ///
    /// The stage label is not part of the default quantities; name it in
    /// `quantities` to interpolate it.
    ///
    pub fn interpolate<S: AsRef<str>>(&self, age: f64, metallicity: f64, quantities: Option<&[S]>) -> Result<Table, IsoError>
    {
        check_finite(&[age, metallicity])?;
        let columns = self.grid.quantity_columns(quantities)?;
        let neighbors = LocalTrackSet::new(&self.grid, age, metallicity, &columns)?;
        let interpolant = ScatteredInterpolator::new(&neighbors.points, &neighbors.values, neighbors.num_outputs)?;
        let sweep = interpolant.evaluate_sweep(age, metallicity, &self.sweep);

        let rows: Vec<usize> = (0..self.sweep.len()).filter(|&i| sweep.defined[i]).collect();
        let schema = &self.options.schema;
        let table = self.grid.table();
        let mut result = Table::new();
        result.push_column(schema.age.clone(), vec![age; rows.len()])?;
        result.push_column(schema.metallicity.clone(), vec![metallicity; rows.len()])?;
        result.push_column(schema.evolution.clone(), rows.iter().map(|&i| self.sweep[i]).collect())?;
        for (k, &column) in columns.iter().enumerate()
        {
            let name = table.column_name_at(column).unwrap_or_default();
            result.push_column(name, rows.iter().map(|&i| sweep.row(i)[k]).collect())?;
        }
        debug!(age, metallicity, rows = result.len(), "interpolated isochrone");
        Ok(result)
    }

    ///
    /// Independent queries evaluated in parallel; fails on the first failing query.
    ///
    pub fn interpolate_batch<S: AsRef<str> + Sync>(&self, queries: &[(f64, f64)], quantities: Option<&[S]>) -> Result<Vec<Table>, IsoError>
    {
        queries.par_iter()
            .map(|&(age, metallicity)| self.interpolate(age, metallicity, quantities))
            .collect()
    }

    pub fn write_buffer(&self, format: SerializationFormat) -> Result<Vec<u8>, IsoError>
    {
        serialize(&Snapshot { table: self.grid.table().clone(), options: self.options.clone() }, format)
    }

    pub fn read_buffer(buffer: &[u8], format: SerializationFormat) -> Result<Self, IsoError>
    {
        let snapshot: Snapshot = deserialize(buffer, format)?;
        Self::with_options(snapshot.table, snapshot.options)
    }

    ///
    /// Saves the grid and options to file (compressed using LZ4).
    ///
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IsoError>
    {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path).map_err(|_| IsoError::FileIOError)?);
        let buffer = self.write_buffer(SerializationFormat::BincodeLz4)?;
        file.write_all(&buffer).map_err(|_| IsoError::WriteBufferFailed)?;
        file.flush().map_err(|_| IsoError::WriteBufferFailed)?;
        Ok(())
    }

    ///
    /// Reads a grid written by [`QuickInterpolator::save`].
    ///
    pub fn read<Reader: std::io::Read>(mut reader: Reader) -> Result<Self, IsoError>
    {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|_| IsoError::ReadBufferFailed)?;
        Self::read_buffer(&bytes, SerializationFormat::BincodeLz4)
    }
}

fn check_finite(coordinates: &[f64]) -> Result<(), IsoError>
{
    if coordinates.iter().all(|c| c.is_finite())
    {
        Ok(())
    }
    else
    {
        Err(IsoError::Argument(format!("query {coordinates:?} is not finite")))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn two_tracks() -> Table
    {
        Table::from_columns([
            ("logAge", vec![8.0, 8.0, 8.0, 9.0, 9.0, 9.0]),
            ("MH", vec![0.0; 6]),
            ("label", vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0]),
            ("luminosity", vec![1.0, 2.0, 3.0, 1.5, 2.5, 3.5]),
        ]).unwrap()
    }

    ///
    /// Four tracks on a 2x2 (age, metallicity) grid plus an isolated corner.
    /// Quantities are linear in (age, metallicity, evol).
    ///
    fn grid_table() -> Table
    {
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); 5];
        for age in [7.0, 8.0]
        {
            for metallicity in [-1.0, 0.0]
            {
                for label in [0.0, 0.0, 1.0, 1.0, 1.0, 2.0]
                {
                    columns[0].push(age);
                    columns[1].push(metallicity);
                    columns[2].push(label);
                }
            }
        }
        let mut evol = Vec::new();
        for _ in 0..4
        {
            evol.extend([0.0, 0.5, 1.0, 1.0 + 1.0 / 3.0, 1.0 + 2.0 / 3.0, 2.0]);
        }
        for i in 0..columns[0].len()
        {
            let (age, metallicity) = (columns[0][i], columns[1][i]);
            columns[3].push(2.0 * age + metallicity + evol[i]);
            columns[4].push(metallicity - evol[i]);
        }
        Table::from_columns(["logAge", "MH", "label", "logL", "logTe"].into_iter().zip(columns)).unwrap()
    }

    fn at(table: &Table, column: &str, evol: f64) -> f64
    {
        let row = table.column("evol").unwrap().iter().position(|&e| (e - evol).abs() < 1e-9).unwrap();
        table.column(column).unwrap()[row]
    }

    #[test]
    fn midpoint_between_two_tracks()
    {
        let iso = QuickInterpolator::new(two_tracks()).unwrap();
        let result = iso.interpolate::<&str>(8.5, 0.0, None).unwrap();
        assert_eq!(result.column_names().collect::<Vec<_>>(), vec!["logAge", "MH", "evol", "luminosity"]);
        assert!((at(&result, "luminosity", 0.0) - 1.25).abs() < 1e-12);
        assert!((at(&result, "luminosity", 1.0) - 2.25).abs() < 1e-9);
        assert!(result.column("logAge").unwrap().iter().all(|&a| a == 8.5));
        assert!(result.column("MH").unwrap().iter().all(|&m| m == 0.0));
        // hull ends at evol 2 on both tracks
        let evol = result.column("evol").unwrap();
        assert!(evol.windows(2).all(|w| w[0] < w[1]));
        assert!(*evol.last().unwrap() <= 2.0 + 1e-12);
        assert_eq!(evol.len(), 2001);
    }

    #[test]
    fn grid_point_is_reproduced()
    {
        let table = grid_table();
        let iso = QuickInterpolator::new(table.clone()).unwrap();
        let result = iso.interpolate(7.0, -1.0, Some(&["logL", "logTe"][..])).unwrap();
        let track = iso.closest(7.0, -1.0).unwrap();
        let evol = crate::evolution::continuize(track.column("label").unwrap()).unwrap();
        for (i, &e) in evol.iter().enumerate()
        {
            // sweep points are multiples of 1e-3; thirds are matched approximately
            let rounded = (e * 1000.0).round() / 1000.0;
            let expected = track.column("logL").unwrap()[i] + (rounded - e);
            assert!((at(&result, "logL", rounded) - expected).abs() < 1e-9, "evol {e}");
        }
    }

    #[test]
    fn linear_field_inside_four_tracks()
    {
        let iso = QuickInterpolator::new(grid_table()).unwrap();
        let result = iso.interpolate::<&str>(7.25, -0.5, None).unwrap();
        assert_eq!(result.column_names().collect::<Vec<_>>(), vec!["logAge", "MH", "evol", "logL", "logTe"]);
        for evol in [0.0, 0.3, 1.1, 1.999]
        {
            assert!((at(&result, "logL", evol) - (2.0 * 7.25 - 0.5 + evol)).abs() < 1e-9);
            assert!((at(&result, "logTe", evol) - (-0.5 - evol)).abs() < 1e-9);
        }
    }

    #[test]
    fn single_metallicity_grid()
    {
        // metallicity has no spread, only age and evol are triangulated
        let iso = QuickInterpolator::new(two_tracks()).unwrap();
        let result = iso.interpolate(8.25, 0.0, Some(&["luminosity"][..])).unwrap();
        assert!(!result.is_empty());
        assert!((at(&result, "luminosity", 2.0) - 3.125).abs() < 1e-9);
    }

    #[test]
    fn query_outside_grid_uses_edge_track()
    {
        let iso = QuickInterpolator::new(two_tracks()).unwrap();
        // metallicity 0.5 is collapsed onto 0.0 and ignored as an inactive axis
        let result = iso.interpolate::<&str>(8.5, 0.5, None).unwrap();
        assert!((at(&result, "luminosity", 0.0) - 1.25).abs() < 1e-12);
        assert!(result.column("MH").unwrap().iter().all(|&m| m == 0.5));

        // beyond the last age the bracket is a single track: only evol is active
        let result = iso.interpolate::<&str>(10.0, 0.0, None).unwrap();
        assert!((at(&result, "luminosity", 1.5) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_quantity()
    {
        let iso = QuickInterpolator::new(two_tracks()).unwrap();
        let err = iso.interpolate(8.5, 0.0, Some(&["luminosity", "radius"][..])).unwrap_err();
        assert_eq!(err, IsoError::InvalidColumn("radius".to_owned()));
    }

    #[test]
    fn bad_queries()
    {
        let iso = QuickInterpolator::new(two_tracks()).unwrap();
        assert!(matches!(iso.interpolate::<&str>(f64::NAN, 0.0, None), Err(IsoError::Argument(_))));
        assert!(matches!(iso.closest_coordinates(&[8.0]), Err(IsoError::Argument(_))));
        assert!(matches!(iso.bracket_coordinates(&[8.0, 0.0, 1.0]), Err(IsoError::Argument(_))));
        assert!(matches!(iso.closest_coordinates(&[f64::NAN, 0.0]), Err(IsoError::Argument(_))));
        assert!(matches!(iso.closest(8.0, f64::INFINITY), Err(IsoError::Argument(_))));
        assert!(matches!(iso.bracket_coordinates(&[8.0, f64::NAN]), Err(IsoError::Argument(_))));
    }

    #[test]
    fn no_sweep_point_inside_hull()
    {
        // labels start at 1, the sweep stops below 0.5
        let table = Table::from_columns([
            ("logAge", vec![8.0, 8.0, 9.0, 9.0]),
            ("MH", vec![0.0; 4]),
            ("label", vec![1.0, 2.0, 1.0, 2.0]),
            ("logL", vec![1.0, 2.0, 3.0, 4.0]),
        ]).unwrap();
        let iso = QuickInterpolator::with_options(table, InterpolatorOptions::default().with_sweep(0.1, 0.5)).unwrap();
        let result = iso.interpolate::<&str>(8.5, 0.0, None).unwrap();
        assert_eq!(result.len(), 0);
        assert_eq!(result.column_names().collect::<Vec<_>>(), vec!["logAge", "MH", "evol", "logL"]);
    }

    #[test]
    fn sparse_grid_missing_track()
    {
        let mut table = grid_table();
        // drop the (8.0, 0.0) track
        let keep: Vec<usize> = (0..table.len()).filter(|&i| !(table.column("logAge").unwrap()[i] == 8.0 && table.column("MH").unwrap()[i] == 0.0)).collect();
        table = table.select_rows(&keep);
        let iso = QuickInterpolator::new(table).unwrap();
        let err = iso.interpolate::<&str>(7.5, -0.5, None).unwrap_err();
        assert_eq!(err, IsoError::EmptyTrack { age: 8.0, metallicity: 0.0 });
    }

    #[test]
    fn closest_and_bracket()
    {
        let iso = QuickInterpolator::new(grid_table()).unwrap();
        assert_eq!(iso.closest_coordinates(&[7.6, -0.2]).unwrap(), GridPoint::new(8.0, 0.0));
        assert_eq!(iso.closest(7.6, -0.2).unwrap().len(), 6);
        assert_eq!(iso.bracket_coordinates(&[6.0, -0.5]).unwrap(), vec![GridPoint::new(7.0, -1.0), GridPoint::new(7.0, 0.0)]);
    }

    #[test]
    fn options()
    {
        let options = InterpolatorOptions::default();
        assert_eq!(options.sweep().len(), 9000);
        assert_eq!(options.clone().with_sweep(0.5, 2.0).sweep(), vec![0.0, 0.5, 1.0, 1.5]);
        assert!(matches!(QuickInterpolator::with_options(two_tracks(), options.clone().with_sweep(0.0, 9.0)), Err(IsoError::Argument(_))));
        assert!(matches!(QuickInterpolator::with_options(two_tracks(), options.clone().with_sweep(1e-3, f64::NAN)), Err(IsoError::Argument(_))));
        assert!(matches!(QuickInterpolator::with_options(two_tracks(), options.clone().with_sweep(1e-300, 9.0)), Err(IsoError::Argument(_))));
        assert!(matches!(options.clone().with_sweep(1e-9, 9.0).validate(), Err(IsoError::Argument(_))));
        assert!(options.with_sweep(1e-6, 9.0).validate().is_ok());

        let schema = ColumnSchema::new("age", "feh", "phase").with_evolution("x");
        let table = Table::from_columns([
            ("age", vec![1.0, 1.0, 2.0, 2.0]), ("feh", vec![0.0; 4]), ("phase", vec![0.0, 1.0, 0.0, 1.0]), ("L", vec![0.0, 1.0, 2.0, 3.0]),
        ]).unwrap();
        let iso = QuickInterpolator::with_options(table, InterpolatorOptions::new(schema).with_sweep(0.25, 1.1)).unwrap();
        let result = iso.interpolate::<&str>(1.5, 0.0, None).unwrap();
        assert_eq!(result.column_names().collect::<Vec<_>>(), vec!["age", "feh", "x", "L"]);
        assert_eq!(result.column("x").unwrap(), &[0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!((result.column("L").unwrap()[4] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn batch_matches_single_queries()
    {
        let iso = QuickInterpolator::new(grid_table()).unwrap();
        let queries = [(7.25, -0.5), (7.0, 0.0), (7.9, -0.1)];
        let batch = iso.interpolate_batch(&queries, Some(&["logL"][..])).unwrap();
        for (table, &(age, metallicity)) in batch.iter().zip(&queries)
        {
            assert_eq!(table, &iso.interpolate(age, metallicity, Some(&["logL"][..])).unwrap());
        }
        let err = iso.interpolate_batch(&queries, Some(&["nope"][..])).unwrap_err();
        assert_eq!(err, IsoError::InvalidColumn("nope".to_owned()));
    }

    #[test]
    fn snapshot_roundtrip()
    {
        let iso = QuickInterpolator::with_options(two_tracks(), InterpolatorOptions::default().with_sweep(0.1, 3.0)).unwrap();
        let bytes = iso.write_buffer(SerializationFormat::BincodeLz4).unwrap();
        let restored = QuickInterpolator::read(bytes.as_slice()).unwrap();
        assert_eq!(restored.options(), iso.options());
        assert_eq!(restored.grid().table(), iso.grid().table());
        assert_eq!(restored.interpolate::<&str>(8.5, 0.0, None).unwrap(), iso.interpolate::<&str>(8.5, 0.0, None).unwrap());
    }
}
