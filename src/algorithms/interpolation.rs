use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::IsoError;
use super::{linalg::MAX_DIM, triangulation::Triangulation};

/// Barycentric slack: points this close to the hull are inside.
pub const HULL_TOLERANCE: f64 = 1e-10;
const MAX_BUCKETS: usize = 1 << 12;

///
/// Coordinate axes with a non-zero spread in the sample cloud. Axes without spread
/// (a single age, a single metallicity) are left out of the triangulation and out
/// of every query vector.
///
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAxes
{
    mask: [bool; MAX_DIM],
}

impl ActiveAxes
{
    pub fn new(mask: [bool; MAX_DIM]) -> Self
    {
        Self { mask }
    }

    pub fn from_points(points: &[[f64; MAX_DIM]]) -> Self
    {
        let mut mask = [false; MAX_DIM];
        for (axis, active) in mask.iter_mut().enumerate()
        {
            let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p[axis]), hi.max(p[axis])));
            *active = hi - lo > 0.0;
        }
        Self { mask }
    }

    #[inline]
    pub fn is_active(&self, axis: usize) -> bool
    {
        self.mask[axis]
    }

    #[inline]
    pub fn count(&self) -> usize
    {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn axes(&self) -> impl Iterator<Item = usize> + '_
    {
        (0..MAX_DIM).filter(|&axis| self.mask[axis])
    }

    ///
    /// Active coordinates of `x` packed to the front.
    ///
    #[inline]
    pub fn reduce(&self, x: &[f64; MAX_DIM]) -> [f64; MAX_DIM]
    {
        let mut r = [0.0; MAX_DIM];
        for (slot, axis) in self.axes().enumerate()
        {
            r[slot] = x[axis];
        }
        r
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundingBox
{
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl BoundingBox
{
    pub fn from_points(points: &[[f64; MAX_DIM]], dim: usize) -> Self
    {
        let mut lower = vec![f64::INFINITY; dim];
        let mut upper = vec![f64::NEG_INFINITY; dim];
        for p in points
        {
            for d in 0..dim
            {
                lower[d] = lower[d].min(p[d]);
                upper[d] = upper[d].max(p[d]);
            }
        }
        Self { lower, upper }
    }

    #[inline]
    pub fn width(&self, dim: usize) -> f64
    {
        self.upper[dim] - self.lower[dim]
    }

    #[inline]
    pub fn to_unit_coordinate(&self, point: &[f64; MAX_DIM]) -> [f64; MAX_DIM]
    {
        let mut r = [0.0; MAX_DIM];
        for i in 0..self.lower.len()
        {
            r[i] = (point[i] - self.lower[i]) / self.width(i);
        }
        r
    }
}

///
/// Simplices bucketed by their extent along one axis of the unit box.
///
#[derive(Clone, Debug)]
struct SimplexLocator
{
    axis: usize,
    buckets: Vec<Vec<usize>>,
}

impl SimplexLocator
{
    fn new(triangulation: &Triangulation, axis: usize) -> Self
    {
        let count = triangulation.len().clamp(1, MAX_BUCKETS);
        let mut buckets = vec![Vec::new(); count];
        for simplex in 0..triangulation.len()
        {
            let (lo, hi) = triangulation.extent(simplex, axis);
            let first = Self::bucket(lo - HULL_TOLERANCE, count);
            let last = Self::bucket(hi + HULL_TOLERANCE, count);
            for bucket in &mut buckets[first..=last]
            {
                bucket.push(simplex);
            }
        }
        Self { axis, buckets }
    }

    #[inline]
    fn bucket(x: f64, count: usize) -> usize
    {
        ((x * count as f64).floor().max(0.0) as usize).min(count - 1)
    }

    #[inline]
    fn candidates(&self, x: &[f64]) -> &[usize]
    {
        &self.buckets[Self::bucket(x[self.axis], self.buckets.len())]
    }
}

///
/// Quantities evaluated along an evolution sweep. Rows outside the hull are NaN
/// and flagged as undefined.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SweepValues
{
    pub values: Vec<f64>,
    pub defined: Vec<bool>,
    pub num_outputs: usize,
}

impl SweepValues
{
    #[inline]
    pub fn row(&self, i: usize) -> &[f64]
    {
        &self.values[i * self.num_outputs..(i + 1) * self.num_outputs]
    }
}

///
/// Piecewise-linear interpolant over a scattered `(age, metallicity, evol)` cloud,
/// built on the Delaunay triangulation of the active axes. Queries outside the
/// convex hull of the samples are undefined.
///
#[derive(Clone, Debug)]
pub struct ScatteredInterpolator
{
    axes: ActiveAxes,
    bounding_box: BoundingBox,
    triangulation: Triangulation,
    locator: SimplexLocator,
    values: Vec<f64>,
    num_outputs: usize,
}

impl ScatteredInterpolator
{
    ///
    /// `values` is the row-major `points.len() x num_outputs` sample matrix.
    ///
    pub fn new(points: &[[f64; MAX_DIM]], values: &[f64], num_outputs: usize) -> Result<Self, IsoError>
    {
        if values.len() != points.len() * num_outputs
        {
            return Err(IsoError::Argument(format!("{} values for {} points and {} outputs", values.len(), points.len(), num_outputs)));
        }
        let axes = ActiveAxes::from_points(points);
        let dim = axes.count();
        if dim == 0
        {
            // a single distinct sample spans nothing
            return Err(IsoError::InsufficientSamples { required: 2, found: points.len().min(1) });
        }
        if points.len() < dim + 1
        {
            return Err(IsoError::InsufficientSamples { required: dim + 1, found: points.len() });
        }
        let reduced: Vec<[f64; MAX_DIM]> = points.iter().map(|p| axes.reduce(p)).collect();
        let bounding_box = BoundingBox::from_points(&reduced, dim);
        let unit: Vec<[f64; MAX_DIM]> = reduced.iter().map(|p| bounding_box.to_unit_coordinate(p)).collect();
        let triangulation = Triangulation::new(&unit, dim)?;

        // bucket along the axis with the most distinct samples
        let axis = (0..dim).max_by_key(|&d|
        {
            let mut coords: Vec<f64> = unit.iter().map(|p| p[d]).collect();
            coords.sort_by(f64::total_cmp);
            coords.dedup();
            coords.len()
        }).unwrap_or(0);
        let locator = SimplexLocator::new(&triangulation, axis);
        debug!(points = points.len(), active = ?axes, simplices = triangulation.len(), "built interpolant");
        Ok(Self { axes, bounding_box, triangulation, locator, values: values.to_vec(), num_outputs })
    }

    #[inline]
    pub fn active_axes(&self) -> &ActiveAxes
    {
        &self.axes
    }

    #[inline]
    pub fn num_outputs(&self) -> usize
    {
        self.num_outputs
    }

    #[inline]
    pub fn triangulation(&self) -> &Triangulation
    {
        &self.triangulation
    }

    ///
    /// Writes the interpolated quantities at `x` into `result`. Outside the hull
    /// `result` is filled with NaN and `false` is returned. Inactive coordinates of
    /// `x` are ignored.
    ///
    pub fn interpolate(&self, x: &[f64; MAX_DIM], result: &mut [f64]) -> bool
    {
        let dim = self.triangulation.dim();
        let unit = self.bounding_box.to_unit_coordinate(&self.axes.reduce(x));
        let outside = unit[..dim].iter().any(|&u| !(-HULL_TOLERANCE..=1.0 + HULL_TOLERANCE).contains(&u));
        if !outside
        {
            let mut weights = [0.0; MAX_DIM + 1];
            for &simplex in self.locator.candidates(&unit[..dim])
            {
                if self.triangulation.barycentric(simplex, &unit[..dim], &mut weights)
                    && weights[..=dim].iter().all(|&w| w >= -HULL_TOLERANCE)
                {
                    result.fill(0.0);
                    for (&vertex, &w) in self.triangulation.vertices(simplex).iter().zip(&weights)
                    {
                        let row = &self.values[vertex * self.num_outputs..(vertex + 1) * self.num_outputs];
                        for (r, v) in result.iter_mut().zip(row)
                        {
                            *r += w * v;
                        }
                    }
                    return true;
                }
            }
        }
        result.fill(f64::NAN);
        false
    }

    ///
    /// Evaluates every point `(age, metallicity, evol)` of the sweep.
    ///
    pub fn evaluate_sweep(&self, age: f64, metallicity: f64, sweep: &[f64]) -> SweepValues
    {
        let mut values = vec![0.0; sweep.len() * self.num_outputs];
        let mut defined = vec![false; sweep.len()];
        for (i, &evol) in sweep.iter().enumerate()
        {
            let row = &mut values[i * self.num_outputs..(i + 1) * self.num_outputs];
            defined[i] = self.interpolate(&[age, metallicity, evol], row);
        }
        SweepValues { values, defined, num_outputs: self.num_outputs }
    }
}
