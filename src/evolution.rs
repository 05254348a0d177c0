//!
//! Continuous evolution coordinate.
//!
//! Isochrone rows carry an integer evolutionary-stage label and several consecutive
//! rows usually share one. The `n` rows of label `L` are spread evenly over
//! `[L, L + 1)` in row order: `L, L + 1/n, ..., L + (n-1)/n`. The mapping is local to
//! one track and never looks at other tracks.
//!
use rustc_hash::FxHashMap;

use crate::{errors::IsoError, grid::store::group_tracks, table::{ColumnSchema, Table}};

///
/// Checks that a stored label is a finite, non-negative integer.
///
#[inline]
pub(crate) fn label_value(row: usize, value: f64) -> Result<u32, IsoError>
{
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64
    {
        Ok(value as u32)
    }
    else
    {
        Err(IsoError::InvalidLabel { row, value })
    }
}

///
/// Evolution coordinate for every row of one track, given its stage labels.
///
pub fn continuize(labels: &[f64]) -> Result<Vec<f64>, IsoError>
{
    if labels.is_empty()
    {
        return Err(IsoError::EmptyTrack { age: f64::NAN, metallicity: f64::NAN });
    }
    let labels = labels.iter().enumerate()
        .map(|(row, &value)| label_value(row, value))
        .collect::<Result<Vec<_>, _>>()?;

    let mut counts: FxHashMap<u32, (usize, usize)> = FxHashMap::default();
    for &label in &labels
    {
        counts.entry(label).or_insert((0, 0)).0 += 1;
    }
    let mut evol = Vec::with_capacity(labels.len());
    for &label in &labels
    {
        // (rows sharing the label, rows already placed)
        if let Some((count, placed)) = counts.get_mut(&label)
        {
            let delta = 1.0 / *count as f64;
            evol.push(label as f64 + *placed as f64 * delta);
            *placed += 1;
        }
    }
    Ok(evol)
}

///
/// Copy of `track` with the evolution column (named by `schema.evolution`) added.
/// Quantity columns are left untouched; an existing evolution column is overwritten.
///
pub fn add_evolution_phase(track: &Table, schema: &ColumnSchema) -> Result<Table, IsoError>
{
    let labels = track.column(&schema.label).ok_or_else(|| IsoError::InvalidColumn(schema.label.clone()))?;
    let evol = continuize(labels)?;
    let mut result = track.clone();
    result.push_column(schema.evolution.clone(), evol)?;
    Ok(result)
}

///
/// Adds the evolution column to every track of a whole grid. Rows come out grouped
/// by (age, metallicity) in ascending order, original row order within a track.
///
pub fn resample_evolution_label(grid: &Table, schema: &ColumnSchema) -> Result<Table, IsoError>
{
    let resolved = schema.resolve(grid)?;
    let tracks = group_tracks(grid, &resolved);
    let rows: Vec<usize> = tracks.iter().flat_map(|(_, rows)| rows.iter().copied()).collect();
    let labels = grid.column_at(resolved.label);
    let mut evol = Vec::with_capacity(rows.len());
    for (_, track_rows) in &tracks
    {
        let track_labels: Vec<f64> = track_rows.iter().map(|&r| labels[r]).collect();
        // Report the offending row in the source table, not in the track.
        let track_evol = continuize(&track_labels).map_err(|e| match e
        {
            IsoError::InvalidLabel { row, value } => IsoError::InvalidLabel { row: track_rows[row], value },
            e => e,
        })?;
        evol.extend(track_evol);
    }
    let mut result = grid.select_rows(&rows);
    result.push_column(schema.evolution.clone(), evol)?;
    Ok(result)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn shared_labels_are_spread()
    {
        let evol = continuize(&[0.0, 0.0, 1.0, 1.0, 1.0]).unwrap();
        let expected = [0.0, 0.5, 1.0, 1.0 + 1.0 / 3.0, 1.0 + 2.0 / 3.0];
        for (e, x) in evol.iter().zip(expected)
        {
            assert!((e - x).abs() < 1e-12, "{e} != {x}");
        }
    }

    #[test]
    fn unique_labels_are_unchanged()
    {
        assert_eq!(continuize(&[0.0, 1.0, 2.0, 4.0]).unwrap(), vec![0.0, 1.0, 2.0, 4.0]);
    }

    #[test]
    fn non_contiguous_labels_share_one_group()
    {
        assert_eq!(continuize(&[1.0, 2.0, 1.0]).unwrap(), vec![1.0, 2.0, 1.5]);
    }

    #[test]
    fn empty_track_is_rejected()
    {
        assert!(matches!(continuize(&[]), Err(IsoError::EmptyTrack { .. })));
    }

    #[test]
    fn bad_labels_are_rejected()
    {
        assert_eq!(continuize(&[0.0, 1.5]), Err(IsoError::InvalidLabel { row: 1, value: 1.5 }));
        assert_eq!(continuize(&[-1.0]), Err(IsoError::InvalidLabel { row: 0, value: -1.0 }));
        assert!(continuize(&[f64::NAN]).is_err());
    }

    #[test]
    fn add_evolution_phase_keeps_quantities()
    {
        let track = Table::from_columns([
            ("logAge", vec![8.0; 3]), ("MH", vec![0.0; 3]), ("label", vec![0.0, 0.0, 1.0]), ("logL", vec![1.0, 2.0, 3.0]),
        ]).unwrap();
        let result = add_evolution_phase(&track, &ColumnSchema::default()).unwrap();
        assert_eq!(result.column("logL").unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(result.column("evol").unwrap(), &[0.0, 0.5, 1.0]);
        assert_eq!(result.column_names().last(), Some("evol"));
    }

    #[test]
    fn resample_groups_tracks()
    {
        let grid = Table::from_columns([
            ("logAge", vec![9.0, 8.0, 9.0, 8.0]),
            ("MH", vec![0.0, 0.0, 0.0, 0.0]),
            ("label", vec![0.0, 0.0, 0.0, 1.0]),
            ("logL", vec![1.0, 2.0, 3.0, 4.0]),
        ]).unwrap();
        let result = resample_evolution_label(&grid, &ColumnSchema::default()).unwrap();
        assert_eq!(result.column("logAge").unwrap(), &[8.0, 8.0, 9.0, 9.0]);
        assert_eq!(result.column("logL").unwrap(), &[2.0, 4.0, 1.0, 3.0]);
        assert_eq!(result.column("evol").unwrap(), &[0.0, 1.0, 0.0, 0.5]);
    }

    #[test]
    fn resample_reports_source_row()
    {
        let grid = Table::from_columns([
            ("logAge", vec![9.0, 8.0, 9.0]),
            ("MH", vec![0.0; 3]),
            ("label", vec![0.0, 0.0, 0.5]),
        ]).unwrap();
        let err = resample_evolution_label(&grid, &ColumnSchema::default()).unwrap_err();
        assert_eq!(err, IsoError::InvalidLabel { row: 2, value: 0.5 });
    }

    proptest!
    {
        #[test]
        fn evolution_is_monotone_and_bounded(runs in prop::collection::vec(1usize..20, 1..8))
        {
            let labels: Vec<f64> = runs.iter().enumerate()
                .flat_map(|(label, &n)| std::iter::repeat(label as f64).take(n))
                .collect();
            let evol = continuize(&labels).unwrap();
            prop_assert_eq!(evol.len(), labels.len());
            for (e, l) in evol.iter().zip(&labels)
            {
                prop_assert!(*e >= *l && *e < *l + 1.0);
            }
            for pair in evol.windows(2)
            {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
