use tracing::debug;

use crate::{errors::IsoError, evolution::continuize};
use super::{index::GridPoint, store::IsochroneGrid};

///
/// One neighbouring track with its own evolution coordinate.
///
#[derive(Clone, Debug)]
pub struct ContinuizedTrack
{
    pub point: GridPoint,
    pub evol: Vec<f64>,
    /// One vector per selected quantity column.
    pub values: Vec<Vec<f64>>,
}

impl ContinuizedTrack
{
    #[inline]
    pub fn len(&self) -> usize
    {
        self.evol.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.evol.is_empty()
    }
}

///
/// The tracks bracketing a query and their rows stacked as one point cloud of
/// `(age, metallicity, evol)` samples. Continuization is done per track.
///
#[derive(Clone, Debug)]
pub struct LocalTrackSet
{
    pub tracks: Vec<ContinuizedTrack>,
    pub points: Vec<[f64; 3]>,
    /// Row-major `points.len() x num_outputs` quantity matrix.
    pub values: Vec<f64>,
    pub num_outputs: usize,
}

impl LocalTrackSet
{
    pub fn new(grid: &IsochroneGrid, age: f64, metallicity: f64, quantities: &[usize]) -> Result<Self, IsoError>
    {
        let mut bracket = grid.index().bracket(&[age, metallicity])?;
        bracket.sort();
        debug!(age, metallicity, neighbors = ?bracket, "bracketed query");

        let labels = grid.table().column_at(grid.resolved().label);
        let columns: Vec<&[f64]> = quantities.iter().map(|&q| grid.table().column_at(q)).collect();
        let mut tracks = Vec::with_capacity(bracket.len());
        for point in bracket
        {
            let rows = grid.track_rows(&point)?;
            let track_labels: Vec<f64> = rows.iter().map(|&r| labels[r]).collect();
            let evol = continuize(&track_labels)?;
            let values = columns.iter().map(|c| rows.iter().map(|&r| c[r]).collect()).collect();
            tracks.push(ContinuizedTrack { point, evol, values });
        }

        let num_outputs = quantities.len();
        let total: usize = tracks.iter().map(|t| t.len()).sum();
        let mut points = Vec::with_capacity(total);
        let mut values = Vec::with_capacity(total * num_outputs);
        for track in &tracks
        {
            for (i, &evol) in track.evol.iter().enumerate()
            {
                points.push([track.point.age, track.point.metallicity, evol]);
                values.extend(track.values.iter().map(|column| column[i]));
            }
        }
        Ok(Self { tracks, points, values, num_outputs })
    }

    /// Number of samples in the point cloud.
    #[inline]
    pub fn len(&self) -> usize
    {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.points.is_empty()
    }
}
