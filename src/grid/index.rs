use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::errors::IsoError;

///
/// (age, metallicity) coordinates of one sampled isochrone.
///
#[derive(Serialize, Deserialize, Copy, Clone, Debug)]
pub struct GridPoint
{
    pub age: f64,
    pub metallicity: f64,
}

impl GridPoint
{
    #[inline]
    pub fn new(age: f64, metallicity: f64) -> Self
    {
        Self { age, metallicity }
    }

    #[inline]
    fn key(&self) -> (u64, u64)
    {
        // -0.0 and 0.0 name the same track
        let bits = |v: f64| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() };
        (bits(self.age), bits(self.metallicity))
    }
}

impl PartialEq for GridPoint
{
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for GridPoint {}

impl Hash for GridPoint
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for GridPoint
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(std::cmp::Ord::cmp(self, other))
    }
}
impl Ord for GridPoint
{
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let canonical = |v: f64| if v == 0.0 { 0.0 } else { v };
        canonical(self.age).total_cmp(&canonical(other.age))
            .then(canonical(self.metallicity).total_cmp(&canonical(other.metallicity)))
    }
}

///
/// Sorted unique age and metallicity values sampled by a grid. Every search is
/// done on each axis independently.
///
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GridIndex
{
    ages: Vec<f64>,
    metallicities: Vec<f64>,
}

impl GridIndex
{
    /// Number of query coordinates: age and metallicity.
    pub const NDIM: usize = 2;

    pub fn new<I: IntoIterator<Item = GridPoint>>(points: I) -> Self
    {
        let (mut ages, mut metallicities): (Vec<f64>, Vec<f64>) = points.into_iter().map(|p| (p.age, p.metallicity)).unzip();
        for axis in [&mut ages, &mut metallicities]
        {
            axis.sort_by(f64::total_cmp);
            axis.dedup();
        }
        Self { ages, metallicities }
    }

    #[inline]
    pub fn ages(&self) -> &[f64]
    {
        &self.ages
    }

    #[inline]
    pub fn metallicities(&self) -> &[f64]
    {
        &self.metallicities
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.ages.is_empty() || self.metallicities.is_empty()
    }

    fn check_dimensions(coordinates: &[f64]) -> Result<(), IsoError>
    {
        if coordinates.len() != Self::NDIM
        {
            Err(IsoError::Argument(format!("coordinates are {} dimensions, got {}", Self::NDIM, coordinates.len())))
        }
        else
        {
            Ok(())
        }
    }

    ///
    /// Sampled value closest to `value`; the first one in ascending order wins ties.
    ///
    pub fn nearest_axis(value: f64, sorted: &[f64]) -> f64
    {
        let mut best = f64::NAN;
        let mut best_distance = f64::INFINITY;
        for &v in sorted
        {
            let distance = (v - value).abs();
            if distance < best_distance
            {
                best = v;
                best_distance = distance;
            }
        }
        best
    }

    ///
    /// Per-axis nearest sample: age and metallicity are each minimised on their own,
    /// so the result is not the 2-D nearest neighbour in general.
    ///
    pub fn nearest(&self, coordinates: &[f64]) -> Result<GridPoint, IsoError>
    {
        Self::check_dimensions(coordinates)?;
        Ok(GridPoint::new(
            Self::nearest_axis(coordinates[0], &self.ages),
            Self::nearest_axis(coordinates[1], &self.metallicities),
        ))
    }

    ///
    /// Interval `(lo, hi)` of `sorted` with `lo <= value < hi`. Below the first
    /// sample both ends are the first sample; at or above the last sample (or when
    /// nothing matches) both ends are the last sample.
    ///
    pub fn bracket_axis(value: f64, sorted: &[f64]) -> (f64, f64)
    {
        let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) else {
            return (f64::NAN, f64::NAN);
        };
        if value < first
        {
            return (first, first);
        }
        for pair in sorted.windows(2)
        {
            if pair[0] <= value && value < pair[1]
            {
                return (pair[0], pair[1]);
            }
        }
        (last, last)
    }

    ///
    /// The grid points bracketing `coordinates`, in the order
    /// `(age_lo, met_lo), (age_lo, met_hi), (age_hi, met_lo), (age_hi, met_hi)`
    /// with repeats removed. Degenerate brackets leave one or two points.
    ///
    pub fn bracket(&self, coordinates: &[f64]) -> Result<Vec<GridPoint>, IsoError>
    {
        Self::check_dimensions(coordinates)?;
        let (age_lo, age_hi) = Self::bracket_axis(coordinates[0], &self.ages);
        let (met_lo, met_hi) = Self::bracket_axis(coordinates[1], &self.metallicities);
        let mut points: Vec<GridPoint> = Vec::with_capacity(4);
        for age in [age_lo, age_hi]
        {
            for metallicity in [met_lo, met_hi]
            {
                let point = GridPoint::new(age, metallicity);
                if !points.contains(&point)
                {
                    points.push(point);
                }
            }
        }
        Ok(points)
    }
}
