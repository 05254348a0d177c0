//!
//! Incremental (Bowyer-Watson) Delaunay triangulation in one to three dimensions.
//!
//! Input coordinates are expected to be scaled to the unit box. The points are
//! inserted into a large enclosing simplex; the cells touching its corners are
//! dropped at the end, leaving a triangulation of the convex hull of the input.
//!
//! Points lying on a common circumsphere or a common hyperplane are the norm for
//! isochrone clouds (every track is a line of samples), so the in-sphere test is
//! strict and every cavity is grown until all of its boundary faces see the new
//! point with a positive volume. New cells are therefore never flat.
//!
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::errors::IsoError;
use super::linalg::{determinant, solve, MAX_DIM};

const NONE: usize = usize::MAX;
/// Distance of the enclosing simplex from the unit box.
const SUPER_MARGIN: f64 = 100.0;
/// Smallest accepted `d! * volume` for a new cell.
const MIN_VOLUME: f64 = 1e-13;
/// Relative margin of the strict in-sphere test.
const SPHERE_TOLERANCE: f64 = 1e-12;
/// Barycentric slack used while locating points during construction.
const LOCATE_TOLERANCE: f64 = 1e-12;
const PIVOT_TOLERANCE: f64 = 1e-18;

type Face = [usize; MAX_DIM];

#[derive(Clone, Debug)]
struct Cell
{
    vertices: [usize; MAX_DIM + 1],
    center: [f64; MAX_DIM],
    radius2: f64,
    alive: bool,
}

///
/// Linear simplices covering the convex hull of a point set. Vertex indices refer
/// to the points passed to [`Triangulation::new`].
///
#[derive(Clone, Debug)]
pub struct Triangulation
{
    dim: usize,
    points: Vec<[f64; MAX_DIM]>,
    simplices: Vec<[usize; MAX_DIM + 1]>,
}

impl Triangulation
{
    ///
    /// Triangulates the first `dim` coordinates of `points`.
    /// Fails when the points do not span `dim` dimensions.
    ///
    pub fn new(points: &[[f64; MAX_DIM]], dim: usize) -> Result<Self, IsoError>
    {
        if dim == 0 || dim > MAX_DIM
        {
            return Err(IsoError::Argument(format!("cannot triangulate in {dim} dimensions")));
        }
        if points.len() < dim + 1
        {
            return Err(IsoError::InsufficientSamples { required: dim + 1, found: points.len() });
        }
        let mut builder = Builder::new(points, dim);
        let mut order: Vec<usize> = (0..points.len()).collect();
        // Lexicographic insertion keeps consecutive points close, so the point
        // location scan from the newest cells stops early.
        order.sort_by(|&a, &b|
        {
            (0..dim).rev().fold(std::cmp::Ordering::Equal, |acc, k| acc.then(points[a][k].total_cmp(&points[b][k])))
        });
        for i in order
        {
            builder.insert(i);
        }
        let simplices = builder.finish();
        if simplices.is_empty()
        {
            return Err(IsoError::InsufficientSamples { required: dim + 1, found: points.len() });
        }
        trace!(points = points.len(), simplices = simplices.len(), dim, "triangulated");
        Ok(Self { dim, points: points.to_vec(), simplices })
    }

    #[inline]
    pub fn dim(&self) -> usize
    {
        self.dim
    }

    /// Number of simplices.
    #[inline]
    pub fn len(&self) -> usize
    {
        self.simplices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.simplices.is_empty()
    }

    #[inline]
    pub fn vertices(&self, simplex: usize) -> &[usize]
    {
        &self.simplices[simplex][..=self.dim]
    }

    #[inline]
    pub fn point(&self, index: usize) -> &[f64]
    {
        &self.points[index][..self.dim]
    }

    ///
    /// Barycentric weights of `x` in `simplex`. Returns `false` for a degenerate simplex.
    ///
    pub fn barycentric(&self, simplex: usize, x: &[f64], weights: &mut [f64]) -> bool
    {
        barycentric(&self.points, self.vertices(simplex), self.dim, x, weights)
    }

    ///
    /// Lower and upper coordinate of `simplex` along `axis`.
    ///
    pub fn extent(&self, simplex: usize, axis: usize) -> (f64, f64)
    {
        self.vertices(simplex).iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v|
        {
            let x = self.points[v][axis];
            (lo.min(x), hi.max(x))
        })
    }
}

fn barycentric(coords: &[[f64; MAX_DIM]], vertices: &[usize], dim: usize, x: &[f64], weights: &mut [f64]) -> bool
{
    let origin = &coords[vertices[0]];
    let mut a = [0.0; MAX_DIM * MAX_DIM];
    let mut b = [0.0; MAX_DIM];
    for row in 0..dim
    {
        for col in 0..dim
        {
            a[row * dim + col] = coords[vertices[col + 1]][row] - origin[row];
        }
        b[row] = x[row] - origin[row];
    }
    if !solve(&mut a[..dim * dim], &mut b[..dim], dim, PIVOT_TOLERANCE)
    {
        return false;
    }
    let mut first = 1.0;
    for k in 0..dim
    {
        weights[k + 1] = b[k];
        first -= b[k];
    }
    weights[0] = first;
    true
}

struct Builder
{
    dim: usize,
    num_points: usize,
    coords: Vec<[f64; MAX_DIM]>,
    cells: Vec<Cell>,
    faces: FxHashMap<Face, [usize; 2]>,
}

impl Builder
{
    fn new(points: &[[f64; MAX_DIM]], dim: usize) -> Self
    {
        let mut coords = points.to_vec();
        // {x_k >= -M, sum x_k <= d + M} strictly contains the unit box.
        let total = dim as f64 + SUPER_MARGIN;
        let mut corner = [0.0; MAX_DIM];
        corner[..dim].fill(-SUPER_MARGIN);
        coords.push(corner);
        for k in 0..dim
        {
            let mut vertex = corner;
            vertex[k] = total + (dim - 1) as f64 * SUPER_MARGIN;
            coords.push(vertex);
        }
        let mut builder = Self { dim, num_points: points.len(), coords, cells: Vec::new(), faces: FxHashMap::default() };
        let mut vertices = [NONE; MAX_DIM + 1];
        for (k, v) in vertices.iter_mut().take(dim + 1).enumerate()
        {
            *v = points.len() + k;
        }
        builder.add_cell(vertices);
        builder
    }

    fn face(&self, cell: usize, skip: usize) -> Face
    {
        let mut face = [NONE; MAX_DIM];
        let mut n = 0;
        for (k, &v) in self.cells[cell].vertices[..=self.dim].iter().enumerate()
        {
            if k != skip
            {
                face[n] = v;
                n += 1;
            }
        }
        face[..n].sort_unstable();
        face
    }

    fn neighbor(&self, face: &Face, cell: usize) -> Option<usize>
    {
        self.faces.get(face).and_then(|pair| pair.iter().copied().find(|&c| c != NONE && c != cell))
    }

    fn add_cell(&mut self, vertices: [usize; MAX_DIM + 1])
    {
        let (center, radius2) = self.circumsphere(&vertices[..=self.dim]);
        let id = self.cells.len();
        self.cells.push(Cell { vertices, center, radius2, alive: true });
        for skip in 0..=self.dim
        {
            let face = self.face(id, skip);
            let slots = self.faces.entry(face).or_insert([NONE; 2]);
            if let Some(slot) = slots.iter_mut().find(|s| **s == NONE)
            {
                *slot = id;
            }
        }
    }

    fn remove_cell(&mut self, id: usize)
    {
        self.cells[id].alive = false;
        for skip in 0..=self.dim
        {
            let face = self.face(id, skip);
            if let Some(slots) = self.faces.get_mut(&face)
            {
                for slot in slots.iter_mut().filter(|s| **s == id)
                {
                    *slot = NONE;
                }
                if slots.iter().all(|&s| s == NONE)
                {
                    self.faces.remove(&face);
                }
            }
        }
    }

    ///
    /// Center and squared radius; flat cells get an infinite sphere.
    ///
    fn circumsphere(&self, vertices: &[usize]) -> ([f64; MAX_DIM], f64)
    {
        let dim = self.dim;
        let origin = self.coords[vertices[0]];
        let mut a = [0.0; MAX_DIM * MAX_DIM];
        let mut b = [0.0; MAX_DIM];
        for row in 0..dim
        {
            let v = &self.coords[vertices[row + 1]];
            let mut norm = 0.0;
            for col in 0..dim
            {
                let delta = v[col] - origin[col];
                a[row * dim + col] = 2.0 * delta;
                norm += delta * delta;
            }
            b[row] = norm;
        }
        if !solve(&mut a[..dim * dim], &mut b[..dim], dim, PIVOT_TOLERANCE)
        {
            return (origin, f64::INFINITY);
        }
        let mut center = origin;
        let mut radius2 = 0.0;
        for k in 0..dim
        {
            center[k] += b[k];
            radius2 += b[k] * b[k];
        }
        (center, radius2)
    }

    fn in_sphere(&self, cell: usize, p: &[f64; MAX_DIM]) -> bool
    {
        let cell = &self.cells[cell];
        if !cell.radius2.is_finite()
        {
            return true;
        }
        let distance2: f64 = (0..self.dim).map(|k| (p[k] - cell.center[k]).powi(2)).sum();
        cell.radius2 - distance2 > SPHERE_TOLERANCE * cell.radius2
    }

    ///
    /// `d! * signed volume` of the simplex made of `face` and `x`.
    ///
    fn orientation(&self, face: &Face, x: &[f64; MAX_DIM]) -> f64
    {
        let dim = self.dim;
        let origin = &self.coords[face[0]];
        let mut a = [0.0; MAX_DIM * MAX_DIM];
        for row in 0..dim
        {
            let v = if row + 1 < dim { &self.coords[face[row + 1]] } else { x };
            for col in 0..dim
            {
                a[row * dim + col] = v[col] - origin[col];
            }
        }
        determinant(&a[..dim * dim], dim)
    }

    fn locate(&self, p: &[f64; MAX_DIM]) -> Option<usize>
    {
        let mut weights = [0.0; MAX_DIM + 1];
        (0..self.cells.len()).rev().find(|&id|
        {
            let cell = &self.cells[id];
            cell.alive
                && barycentric(&self.coords, &cell.vertices[..=self.dim], self.dim, p, &mut weights)
                && weights[..=self.dim].iter().all(|&w| w >= -LOCATE_TOLERANCE)
        })
    }

    fn insert(&mut self, index: usize)
    {
        let p = self.coords[index];
        let Some(seed) = self.locate(&p) else {
            trace!(index, "point outside the enclosing simplex, skipped");
            return;
        };
        let duplicate = self.cells[seed].vertices[..=self.dim].iter().any(|&v|
            (0..self.dim).all(|k| (self.coords[v][k] - p[k]).abs() <= LOCATE_TOLERANCE));
        if duplicate
        {
            trace!(index, "duplicate point skipped");
            return;
        }

        // cells whose circumsphere strictly holds p, grown from the containing cell
        let mut cavity = vec![seed];
        let mut in_cavity: FxHashSet<usize> = FxHashSet::default();
        in_cavity.insert(seed);
        let mut stack = vec![seed];
        while let Some(cell) = stack.pop()
        {
            for skip in 0..=self.dim
            {
                let face = self.face(cell, skip);
                if let Some(next) = self.neighbor(&face, cell)
                {
                    if !in_cavity.contains(&next) && self.in_sphere(next, &p)
                    {
                        in_cavity.insert(next);
                        cavity.push(next);
                        stack.push(next);
                    }
                }
            }
        }

        // every boundary face has to see p from the inside with a positive volume
        let boundary = loop
        {
            let mut boundary = Vec::new();
            let mut grow = None;
            'cells: for &cell in &cavity
            {
                for skip in 0..=self.dim
                {
                    let face = self.face(cell, skip);
                    let next = self.neighbor(&face, cell);
                    if next.is_some_and(|n| in_cavity.contains(&n))
                    {
                        continue;
                    }
                    let opposite = self.coords[self.cells[cell].vertices[skip]];
                    let inner = self.orientation(&face, &opposite);
                    let outer = self.orientation(&face, &p);
                    if inner * outer > 0.0 && outer.abs() > MIN_VOLUME
                    {
                        boundary.push(face);
                    }
                    else if let Some(next) = next
                    {
                        grow = Some(next);
                        break 'cells;
                    }
                }
            }
            match grow
            {
                Some(next) =>
                {
                    trace!(index, cell = next, "cavity repaired");
                    in_cavity.insert(next);
                    cavity.push(next);
                }
                None => break boundary,
            }
        };

        for &cell in &cavity
        {
            self.remove_cell(cell);
        }
        for face in boundary
        {
            let mut vertices = [NONE; MAX_DIM + 1];
            vertices[..self.dim].copy_from_slice(&face[..self.dim]);
            vertices[self.dim] = index;
            self.add_cell(vertices);
        }
    }

    fn finish(self) -> Vec<[usize; MAX_DIM + 1]>
    {
        let dim = self.dim;
        let num_points = self.num_points;
        self.cells.into_iter()
            .filter(|cell| cell.alive && cell.vertices[..=dim].iter().all(|&v| v < num_points))
            .map(|cell| cell.vertices)
            .collect()
    }
}
