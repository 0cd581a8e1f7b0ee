//! File formats at the edges of a run: `.npy` arrays in, `.npy` matrices and
//! CSV result tables out.

use std::io::Write;
use std::path::Path;

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use ndarray_npy::{read_npy, write_npy, ReadNpyError, ReadableElement};

use crate::error::{Error, Result};
use crate::readout::Targets;
use crate::sweep::ResultTable;

/// Element types accepted in input arrays.
trait NpyScalar: ReadableElement + Copy {
    const INTEGRAL: bool;
    fn to_f64(self) -> f64;
}

macro_rules! npy_scalar {
    ($($t:ty => $integral:expr),* $(,)?) => {
        $(impl NpyScalar for $t {
            const INTEGRAL: bool = $integral;
            fn to_f64(self) -> f64 {
                self as f64
            }
        })*
    };
}

npy_scalar!(f64 => false, f32 => false, i64 => true, i32 => true, u8 => true);

impl NpyScalar for bool {
    const INTEGRAL: bool = true;
    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }
}

/// 1-D arrays come back as a single column.
fn read_as<T: NpyScalar>(path: &Path) -> std::result::Result<DMatrix<f64>, ReadNpyError> {
    match read_npy::<_, Array2<T>>(path) {
        Ok(a) => Ok(DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]].to_f64())),
        Err(_) => {
            let a: Array1<T> = read_npy(path)?;
            Ok(DMatrix::from_fn(a.len(), 1, |i, _| a[i].to_f64()))
        }
    }
}

/// Reads a numeric array whatever its dtype. The flag is true for integer
/// and boolean dtypes.
fn read_numeric(path: &Path) -> Result<(DMatrix<f64>, bool)> {
    fn attempt<T: NpyScalar>(path: &Path) -> Option<(DMatrix<f64>, bool)> {
        read_as::<T>(path).ok().map(|m| (m, T::INTEGRAL))
    }

    if let Some(found) = attempt::<f64>(path)
        .or_else(|| attempt::<f32>(path))
        .or_else(|| attempt::<i64>(path))
        .or_else(|| attempt::<i32>(path))
        .or_else(|| attempt::<u8>(path))
    {
        return Ok(found);
    }
    // Last candidate reports the error (missing file, unsupported dtype, ...).
    Ok((read_as::<bool>(path)?, true))
}

/// Square or rectangular float matrix, e.g. a connectome or an input sequence.
pub fn load_matrix(path: impl AsRef<Path>) -> Result<DMatrix<f64>> {
    Ok(read_numeric(path.as_ref())?.0)
}

/// Integer arrays are class labels; float arrays are regression targets.
pub fn load_targets(path: impl AsRef<Path>) -> Result<Targets> {
    let (values, integral) = read_numeric(path.as_ref())?;
    if integral {
        Targets::categorical(values)
    } else {
        Ok(Targets::continuous(values))
    }
}

/// Non-zero entries are `true`.
pub fn load_mask(path: impl AsRef<Path>) -> Result<Vec<bool>> {
    let m = read_numeric(path.as_ref())?.0;
    if m.ncols() != 1 {
        return Err(Error::mismatch("mask columns", 1, m.ncols()));
    }
    Ok(m.iter().map(|&v| v != 0.0).collect())
}

/// Numeric module labels, one per node. Integral values are printed without
/// a fractional part so `3.0` and `3` name the same module.
pub fn load_labels(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let m = read_numeric(path.as_ref())?.0;
    if m.ncols() != 1 {
        return Err(Error::mismatch("label columns", 1, m.ncols()));
    }
    Ok(m.iter()
        .map(|&v| {
            if v.fract() == 0.0 {
                format!("{}", v as i64)
            } else {
                v.to_string()
            }
        })
        .collect())
}

pub fn save_matrix(path: impl AsRef<Path>, m: &DMatrix<f64>) -> Result<()> {
    let a = Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)]);
    write_npy(path, &a)?;
    Ok(())
}

/// Header `alpha,module,n_nodes,<metric>...`, one record per result row.
pub fn write_results<W: Write>(out: W, table: &ResultTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    let mut header = vec!["alpha".to_string(), "module".to_string(), "n_nodes".to_string()];
    header.extend(table.metric_names().iter().cloned());
    wtr.write_record(&header)?;

    for row in table.rows() {
        let mut record = vec![row.alpha.to_string(), row.module.clone(), row.n_nodes.to_string()];
        record.extend(row.scores.iter().map(f64::to_string));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_results_csv(path: impl AsRef<Path>, table: &ResultTable) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_results(std::io::BufWriter::new(file), table)
}
