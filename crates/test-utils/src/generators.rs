//! Synthetic raw-model datasets.
//!
//! These generators build in-memory [`Dataset`]s shaped like real E3SM
//! output so handlers can be driven end to end through a
//! [`netcdf_parser::MemoryReader`].

use netcdf_parser::{ArrayVariable, Dataset};

/// Time units of generated atmosphere/land time series.
pub const TIME_UNITS: &str = "days since 1850-01-01 00:00:00";

const CUM_DAYS: [usize; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];

fn month_start(month: usize) -> f64 {
    ((month / 12) * 365 + CUM_DAYS[month % 12]) as f64
}

/// Noleap monthly bounds, in days since the first generated month.
pub fn monthly_time_bounds(first_month: usize, months: usize) -> Vec<[f64; 2]> {
    (first_month..first_month + months)
        .map(|m| [month_start(m), month_start(m + 1)])
        .collect()
}

/// Evenly spaced cell centres and bounds spanning `[lo, hi]`.
pub fn uniform_axis(n: usize, lo: f64, hi: f64) -> (Vec<f64>, Vec<[f64; 2]>) {
    let step = (hi - lo) / n as f64;
    let bounds: Vec<[f64; 2]> = (0..n)
        .map(|i| [lo + i as f64 * step, lo + (i + 1) as f64 * step])
        .collect();
    let centres = bounds.iter().map(|b| 0.5 * (b[0] + b[1])).collect();
    (centres, bounds)
}

fn flatten(bounds: &[[f64; 2]]) -> Vec<f64> {
    bounds.iter().flat_map(|b| b.iter().copied()).collect()
}

fn coordinates(nlat: usize, nlon: usize) -> Dataset {
    let (lat, lat_bnds) = uniform_axis(nlat, -90.0, 90.0);
    let (lon, lon_bnds) = uniform_axis(nlon, 0.0, 360.0);
    Dataset::new()
        .with(
            ArrayVariable::numeric("lat", &["lat"], &[nlat], lat)
                .expect("lat")
                .with_attr("units", "degrees_north"),
        )
        .and_then(|ds| {
            ds.with(
                ArrayVariable::numeric("lon", &["lon"], &[nlon], lon)
                    .expect("lon")
                    .with_attr("units", "degrees_east"),
            )
        })
        .and_then(|ds| ds.with(ArrayVariable::numeric("lat_bnds", &["lat", "nbnd"], &[nlat, 2], flatten(&lat_bnds)).expect("lat_bnds")))
        .and_then(|ds| ds.with(ArrayVariable::numeric("lon_bnds", &["lon", "nbnd"], &[nlon, 2], flatten(&lon_bnds)).expect("lon_bnds")))
        .expect("coordinate dataset")
}

fn with_monthly_time(ds: Dataset, months: usize) -> Dataset {
    let bounds = monthly_time_bounds(0, months);
    let time: Vec<f64> = bounds.iter().map(|b| 0.5 * (b[0] + b[1])).collect();
    ds.with(
        ArrayVariable::numeric("time", &["time"], &[months], time)
            .expect("time")
            .with_attr("units", TIME_UNITS)
            .with_attr("calendar", "noleap"),
    )
    .and_then(|ds| {
        ds.with(
            ArrayVariable::numeric("time_bnds", &["time", "nbnd"], &[months, 2], flatten(&bounds))
                .expect("time_bnds"),
        )
    })
    .expect("time coordinate")
}

/// Monthly `(time, lat, lon)` series of `var` on a uniform global grid,
/// the layout of E3SM atmosphere/land time-series files.
pub fn gridded_dataset(
    var: &str,
    units: &str,
    nlat: usize,
    nlon: usize,
    months: usize,
    value: impl Fn(usize, usize, usize) -> f64,
) -> Dataset {
    let mut data = Vec::with_capacity(months * nlat * nlon);
    for t in 0..months {
        for ilat in 0..nlat {
            for ilon in 0..nlon {
                data.push(value(t, ilat, ilon));
            }
        }
    }

    let ds = coordinates(nlat, nlon)
        .with(
            ArrayVariable::numeric(var, &["time", "lat", "lon"], &[months, nlat, nlon], data)
                .expect("data variable")
                .with_attr("units", units),
        )
        .expect("gridded dataset");
    with_monthly_time(ds, months)
}

/// Monthly `(time, level, lat, lon)` series, e.g. land soil layers on
/// `levgrnd`. The level coordinate carries no bounds.
#[allow(clippy::too_many_arguments)]
pub fn gridded_level_dataset(
    var: &str,
    units: &str,
    level_dim: &str,
    levels: &[f64],
    nlat: usize,
    nlon: usize,
    months: usize,
    value: impl Fn(usize, usize, usize, usize) -> f64,
) -> Dataset {
    let nlev = levels.len();
    let mut data = Vec::with_capacity(months * nlev * nlat * nlon);
    for t in 0..months {
        for k in 0..nlev {
            for ilat in 0..nlat {
                for ilon in 0..nlon {
                    data.push(value(t, k, ilat, ilon));
                }
            }
        }
    }

    let ds = coordinates(nlat, nlon)
        .with(
            ArrayVariable::numeric(var, &["time", level_dim, "lat", "lon"], &[months, nlev, nlat, nlon], data)
                .expect("data variable")
                .with_attr("units", units),
        )
        .and_then(|ds| {
            ds.with(
                ArrayVariable::numeric(level_dim, &[level_dim], &[nlev], levels.to_vec())
                    .expect("level coordinate")
                    .with_attr("units", "m"),
            )
        })
        .expect("gridded level dataset");
    with_monthly_time(ds, months)
}

/// Time-invariant `(lat, lon)` field, as found in E3SM fixed-field files.
pub fn fixed_dataset(
    var: &str,
    units: &str,
    nlat: usize,
    nlon: usize,
    value: impl Fn(usize, usize) -> f64,
) -> Dataset {
    let mut data = Vec::with_capacity(nlat * nlon);
    for ilat in 0..nlat {
        for ilon in 0..nlon {
            data.push(value(ilat, ilon));
        }
    }
    coordinates(nlat, nlon)
        .with(
            ArrayVariable::numeric(var, &["lat", "lon"], &[nlat, nlon], data)
                .expect("fixed variable")
                .with_attr("units", units),
        )
        .expect("fixed dataset")
}

/// MPAS mesh with unit cell areas.
pub fn mpas_mesh_dataset(max_level_cell: &[u32], ref_bottom_depth: &[f64]) -> Dataset {
    let n_cells = max_level_cell.len();
    let n_levels = ref_bottom_depth.len();
    Dataset::new()
        .with(
            ArrayVariable::numeric(
                "maxLevelCell",
                &["nCells"],
                &[n_cells],
                max_level_cell.iter().map(|&m| f64::from(m)).collect(),
            )
            .expect("maxLevelCell"),
        )
        .and_then(|ds| {
            ds.with(
                ArrayVariable::numeric("refBottomDepth", &["nVertLevels"], &[n_levels], ref_bottom_depth.to_vec())
                    .expect("refBottomDepth"),
            )
        })
        .and_then(|ds| ds.with(ArrayVariable::numeric("areaCell", &["nCells"], &[n_cells], vec![1.0; n_cells]).expect("areaCell")))
        .expect("mesh dataset")
}

fn xtime(month: usize) -> String {
    format!("{:04}-{:02}-01_00:00:00", 1 + month / 12, month % 12 + 1)
}

/// MPAS monthly-statistics file holding `var` with dims
/// `(Time, nCells[, level_dim])`, plus `xtime_startMonthly`/`xtime_endMonthly`.
///
/// Months are counted from 0001-01; `first_month` lets consecutive files of
/// a multi-file series continue where the previous one stopped.
pub fn mpas_timeseries_dataset(
    var: &str,
    n_cells: usize,
    level_dim: Option<(&str, usize)>,
    first_month: usize,
    months: usize,
    value: impl Fn(usize, usize, usize) -> f64,
) -> Dataset {
    let n_levels = level_dim.map_or(1, |(_, n)| n);
    let mut data = Vec::with_capacity(months * n_cells * n_levels);
    for t in 0..months {
        for cell in 0..n_cells {
            for level in 0..n_levels {
                data.push(value(first_month + t, cell, level));
            }
        }
    }

    let variable = match level_dim {
        Some((dim, n)) => ArrayVariable::numeric(var, &["Time", "nCells", dim], &[months, n_cells, n], data),
        None => ArrayVariable::numeric(var, &["Time", "nCells"], &[months, n_cells], data),
    }
    .expect("mpas variable");

    let starts = (first_month..first_month + months).map(xtime).collect();
    let ends = (first_month + 1..first_month + months + 1).map(xtime).collect();

    Dataset::new()
        .with(variable)
        .and_then(|ds| ds.with(ArrayVariable::text("xtime_startMonthly", &["Time"], &[months], starts).expect("xtime start")))
        .and_then(|ds| ds.with(ArrayVariable::text("xtime_endMonthly", &["Time"], &[months], ends).expect("xtime end")))
        .expect("mpas time series")
}

/// SCRIP mapping dataset from 0-based `(target, source, weight)` triplets
/// onto a uniform `nlat x nlon` grid.
pub fn mapping_dataset(n_a: usize, nlat: usize, nlon: usize, triplets: &[(usize, usize, f64)]) -> Dataset {
    let n_b = nlat * nlon;
    let n_s = triplets.len();
    let (lat, lat_bnds) = uniform_axis(nlat, -90.0, 90.0);
    let (lon, lon_bnds) = uniform_axis(nlon, 0.0, 360.0);

    let mut yc = Vec::with_capacity(n_b);
    let mut xc = Vec::with_capacity(n_b);
    let mut yv = Vec::with_capacity(n_b * 4);
    let mut xv = Vec::with_capacity(n_b * 4);
    for ilat in 0..nlat {
        for ilon in 0..nlon {
            yc.push(lat[ilat]);
            xc.push(lon[ilon]);
            let [s, n] = lat_bnds[ilat];
            let [w, e] = lon_bnds[ilon];
            yv.extend([s, s, n, n]);
            xv.extend([w, e, e, w]);
        }
    }

    let column = |f: fn(&(usize, usize, f64)) -> f64| triplets.iter().map(f).collect::<Vec<f64>>();

    Dataset::new()
        .with_dim("n_a", n_a)
        .with_dim("n_b", n_b)
        .with(ArrayVariable::numeric("S", &["n_s"], &[n_s], column(|t| t.2)).expect("S"))
        .and_then(|ds| ds.with(ArrayVariable::numeric("row", &["n_s"], &[n_s], column(|t| (t.0 + 1) as f64)).expect("row")))
        .and_then(|ds| ds.with(ArrayVariable::numeric("col", &["n_s"], &[n_s], column(|t| (t.1 + 1) as f64)).expect("col")))
        .and_then(|ds| ds.with(ArrayVariable::numeric("yc_b", &["n_b"], &[n_b], yc).expect("yc_b")))
        .and_then(|ds| ds.with(ArrayVariable::numeric("xc_b", &["n_b"], &[n_b], xc).expect("xc_b")))
        .and_then(|ds| ds.with(ArrayVariable::numeric("yv_b", &["n_b", "nv_b"], &[n_b, 4], yv).expect("yv_b")))
        .and_then(|ds| ds.with(ArrayVariable::numeric("xv_b", &["n_b", "nv_b"], &[n_b, 4], xv).expect("xv_b")))
        .and_then(|ds| {
            ds.with(
                ArrayVariable::numeric("dst_grid_dims", &["dst_grid_rank"], &[2], vec![nlon as f64, nlat as f64])
                    .expect("dst_grid_dims"),
            )
        })
        .expect("mapping dataset")
}

/// Unit-weight one-to-one mapping from `nlat * nlon` mesh cells.
pub fn identity_mapping_dataset(nlat: usize, nlon: usize) -> Dataset {
    let n = nlat * nlon;
    let triplets: Vec<_> = (0..n).map(|i| (i, i, 1.0)).collect();
    mapping_dataset(n, nlat, nlon, &triplets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_bounds_noleap() {
        let bounds = monthly_time_bounds(0, 3);
        assert_eq!(bounds, vec![[0.0, 31.0], [31.0, 59.0], [59.0, 90.0]]);
        assert_eq!(monthly_time_bounds(12, 1), vec![[365.0, 396.0]]);
    }

    #[test]
    fn test_gridded_dataset_layout() {
        let ds = gridded_dataset("TREFHT", "K", 2, 2, 3, |_, _, _| 280.0);
        let var = ds.variable("TREFHT").unwrap();
        assert_eq!(var.shape, vec![3, 2, 2]);
        assert_eq!(ds.variable("lat_bnds").unwrap().shape, vec![2, 2]);
        assert_eq!(ds.variable("time").unwrap().units(), Some(TIME_UNITS));
    }

    #[test]
    fn test_mpas_series_xtime() {
        let ds = mpas_timeseries_dataset("sst", 4, None, 11, 2, |_, _, _| 1.0);
        let start = ds.variable("xtime_startMonthly").unwrap().strings().unwrap();
        assert_eq!(start, &["0001-12-01_00:00:00", "0002-01-01_00:00:00"]);
    }

    #[test]
    fn test_identity_mapping() {
        let ds = identity_mapping_dataset(2, 2);
        assert_eq!(ds.dim("n_a").unwrap(), 4);
        assert_eq!(ds.variable("col").unwrap().values().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
