
use isochrone_interp::{errors::IsoError, interpolator::QuickInterpolator, table::Table};

///
/// Builds a small grid of two ages and two metallicities and interpolates a cluster
/// isochrone between them. Pass a CMD output file to use real isochrones instead.
///
fn main() -> Result<(), IsoError>
{
    let iso = match std::env::args().nth(1)
    {
        Some(path) => QuickInterpolator::from_path(path)?,
        None => QuickInterpolator::new(toy_grid()?)?,
    };
    println!("{} tracks, ages {:?}, metallicities {:?}", iso.grid().len(), iso.grid().index().ages(), iso.grid().index().metallicities());

    let (log_age, mh) = (8.3, -0.2);
    println!("closest grid point: {:?}", iso.closest_coordinates(&[log_age, mh])?);
    println!("bracket: {:?}", iso.bracket_coordinates(&[log_age, mh])?);

    let cluster = iso.interpolate::<&str>(log_age, mh, None)?;
    println!("interpolated {} rows with columns {:?}", cluster.len(), cluster.column_names().collect::<Vec<_>>());
    let evol = cluster.column("evol").unwrap_or_default();
    for row in (0..cluster.len()).step_by(500)
    {
        let values: Vec<String> = cluster.column_names().skip(3).map(|c| format!("{c}={:.4}", cluster.column(c).unwrap_or_default()[row])).collect();
        println!("evol={:.3} {}", evol[row], values.join(" "));
    }
    Ok(())
}

fn toy_grid() -> Result<Table, IsoError>
{
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); 5];
    for age in [8.0, 8.5]
    {
        for mh in [-0.5, 0.0]
        {
            for row in 0..30
            {
                let label = (row / 10) as f64;
                columns[0].push(age);
                columns[1].push(mh);
                columns[2].push(label);
                columns[3].push(-1.0 + 0.1 * row as f64 + 0.5 * (age - 8.0) - 0.2 * mh);
                columns[4].push(3.8 - 0.01 * row as f64 + 0.05 * mh);
            }
        }
    }
    Table::from_columns(["logAge", "MH", "label", "logL", "logTe"].into_iter().zip(columns))
}
