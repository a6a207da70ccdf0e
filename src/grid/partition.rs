//! Binary dump of the processor partitioning.
//!
//! The file records the process grid, the node ownership along every axis and
//! the global node coordinates, so that output can be re-partitioned offline.
//! All values are big-endian: `i32` for integers and `f64` for reals.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::staggered::StaggeredGrid;

/// Contents of a partitioning file.
#[derive(Debug, Clone, PartialEq)]
pub struct Partitioning {
    pub procs: [usize; 3],
    pub tnods: [usize; 3],
    /// First node of every process along each axis (`nproc + 1` entries).
    pub starts: [Vec<usize>; 3],
    /// Characteristic length used to scale the coordinates.
    pub length_unit: f64,
    pub coords: [Vec<f64>; 3],
}

/// Standard file name for a process grid.
pub fn partition_file_name(procs: [usize; 3]) -> String {
    format!(
        "ProcessorPartitioning_{}cpu_{}.{}.{}.bin",
        procs[0] * procs[1] * procs[2],
        procs[0],
        procs[1],
        procs[2]
    )
}

/// Write the partitioning of `fs` into directory `dir`.
///
/// Collective: every process must call it. Only rank zero writes and gets
/// the file path back.
pub fn write_partitioning(fs: &StaggeredGrid, dir: &Path, length_unit: f64) -> Result<Option<PathBuf>> {
    let coords = [0, 1, 2].map(|d| fs.ds[d].gather_coords(fs.comm()));

    let [Some(xc), Some(yc), Some(zc)] = coords else {
        return Ok(None);
    };

    let path = dir.join(partition_file_name(fs.procs));
    let mut w = BufWriter::new(File::create(&path)?);

    let put_int = |w: &mut BufWriter<File>, v: usize| w.write_all(&(v as i32).to_be_bytes());
    let put_real = |w: &mut BufWriter<File>, v: f64| w.write_all(&v.to_be_bytes());

    for d in 0..3 {
        put_int(&mut w, fs.ds[d].nproc)?;
    }
    for d in 0..3 {
        put_int(&mut w, fs.ds[d].tnods)?;
    }
    for d in 0..3 {
        for &s in &fs.ds[d].starts {
            put_int(&mut w, s)?;
        }
    }
    put_real(&mut w, length_unit)?;
    for c in [&xc, &yc, &zc] {
        for &x in c.iter() {
            put_real(&mut w, x)?;
        }
    }
    w.flush()?;

    log::debug!("processor partitioning saved to {}", path.display());

    Ok(Some(path))
}

/// Read a partitioning file written by [`write_partitioning`].
pub fn read_partitioning(path: &Path) -> Result<Partitioning> {
    let mut r = BufReader::new(File::open(path)?);

    fn get_int(r: &mut impl Read) -> Result<usize> {
        let mut b = [0u8; 4];
        r.read_exact(&mut b)?;
        let v = i32::from_be_bytes(b);
        usize::try_from(v).map_err(|_| Error::Config(format!("negative count {} in partitioning file", v)))
    }
    fn get_real(r: &mut impl Read) -> Result<f64> {
        let mut b = [0u8; 8];
        r.read_exact(&mut b)?;
        Ok(f64::from_be_bytes(b))
    }

    let mut procs = [0; 3];
    for p in procs.iter_mut() {
        *p = get_int(&mut r)?;
    }
    let mut tnods = [0; 3];
    for t in tnods.iter_mut() {
        *t = get_int(&mut r)?;
    }
    let mut starts: [Vec<usize>; 3] = Default::default();
    for d in 0..3 {
        starts[d] = (0..=procs[d]).map(|_| get_int(&mut r)).collect::<Result<_>>()?;
    }
    let length_unit = get_real(&mut r)?;
    let mut coords: [Vec<f64>; 3] = Default::default();
    for d in 0..3 {
        coords[d] = (0..tnods[d]).map(|_| get_real(&mut r)).collect::<Result<_>>()?;
    }

    Ok(Partitioning {
        procs,
        tnods,
        starts,
        length_unit,
        coords,
    })
}
