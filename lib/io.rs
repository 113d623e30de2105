//! Saving and loading compiled operators as NumPy `.npz` archives.
//!
//! An [`MPO`] over `N` sites is stored as
//! * `link_ids`, `link_dims`: identities and dimensions of the `N + 1` bonds,
//! * `link_labels`: bond labels as a `(N + 1, MAX_LABEL_LEN)` array of
//!   zero-padded code points,
//! * `site_dims`: physical dimension of every site,
//! * `left`, `right`: edge vectors,
//! * `W1`, ..., `WN`: site tensors with axes `[out, in, row, col]`.
//!
//! A dense matrix is stored as a single array, `matrix`.

use std::{
    fs::File,
    io::{ Read, Seek, Write },
    path::Path,
};
use ndarray as nd;
pub use ndarray_npy::{ NpzReader, NpzWriter, ReadNpzError, WriteNpzError };
use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::{
    index::{ BondIdx, Idx, Label, MPOIdx, MAX_LABEL_LEN },
    mpo::{ MPOError, MPO },
    tensor::{ Tensor, TensorError },
};

#[derive(Debug, Error)]
pub enum IOError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error writing npz: {0}")]
    WriteNpz(#[from] WriteNpzError),

    #[error("error reading npz: {0}")]
    ReadNpz(#[from] ReadNpzError),

    /// Returned when an archive is readable but its contents are inconsistent.
    #[error("malformed archive: {0}")]
    Malformed(String),

    #[error("{0}")]
    Chain(#[from] MPOError),

    #[error("{0}")]
    Array(#[from] TensorError),
}
use IOError::*;
pub type IOResult<T> = Result<T, IOError>;

/// Write a set of named arrays to a new `.npz` file.
///
/// ```ignore
/// write_npz!(
///     outdir.join("out.npz"),
///     arrays: {
///         "H" => &H,
///         "bond_dims" => &dims,
///     }
/// )?;
/// ```
#[macro_export]
macro_rules! write_npz {
    (
        $path:expr,
        arrays: { $( $name:expr => $arr:expr ),* $(,)? } $(,)?
    ) => {
        (|| -> $crate::io::IOResult<()> {
            let mut npz
                = $crate::io::NpzWriter::new(std::fs::File::create($path)?);
            $( npz.add_array($name, $arr)?; )*
            npz.finish()?;
            Ok(())
        })()
    };
}

/// Types that can be written to and read back from an `.npz` archive.
pub trait Persist: Sized {
    /// Add `self` to an open archive.
    fn write_npz<W>(&self, npz: &mut NpzWriter<W>) -> IOResult<()>
    where W: Write + Seek;

    /// Read a value of this type from an open archive.
    fn read_npz<R>(npz: &mut NpzReader<R>) -> IOResult<Self>
    where R: Read + Seek;

    /// Write `self` to a new file at `path`.
    fn write_to_file<P>(&self, path: P) -> IOResult<()>
    where P: AsRef<Path>
    {
        let mut npz = NpzWriter::new(File::create(path)?);
        self.write_npz(&mut npz)?;
        npz.finish()?;
        Ok(())
    }

    /// Read a value of this type from the file at `path`.
    fn read_from_file<P>(path: P) -> IOResult<Self>
    where P: AsRef<Path>
    {
        let mut npz = NpzReader::new(File::open(path)?)?;
        Self::read_npz(&mut npz)
    }
}

impl Persist for nd::Array2<C64> {
    fn write_npz<W>(&self, npz: &mut NpzWriter<W>) -> IOResult<()>
    where W: Write + Seek
    {
        npz.add_array("matrix", self)?;
        Ok(())
    }

    fn read_npz<R>(npz: &mut NpzReader<R>) -> IOResult<Self>
    where R: Read + Seek
    {
        Ok(npz.by_name("matrix")?)
    }
}

fn encode_label(label: &Label) -> impl Iterator<Item = u32> + '_ {
    label.as_str().chars()
        .map(u32::from)
        .chain(std::iter::repeat(0))
        .take(MAX_LABEL_LEN)
}

fn decode_label(codes: nd::ArrayView1<u32>) -> IOResult<Label> {
    let s: String
        = codes.iter()
        .take_while(|c| **c != 0)
        .map(|c| {
            char::from_u32(*c)
                .ok_or_else(|| Malformed(format!("invalid code point {c} in label")))
        })
        .collect::<IOResult<_>>()?;
    Ok(Label::new(&s))
}

impl Persist for MPO {
    fn write_npz<W>(&self, npz: &mut NpzWriter<W>) -> IOResult<()>
    where W: Write + Seek
    {
        let links = self.links();
        let ids: nd::Array1<u64> = links.iter().map(|b| b.id()).collect();
        let dims: nd::Array1<u64> = links.iter().map(|b| b.dim() as u64).collect();
        let labels: nd::Array2<u32>
            = nd::Array1::from_iter(links.iter().flat_map(|b| encode_label(b.name())))
            .into_shape((links.len(), MAX_LABEL_LEN))
            .map_err(TensorError::from)?;
        let site_dims: nd::Array1<u64>
            = (1..=self.len())
            .map(|n| self.site_dim(n).map(|d| d as u64))
            .collect::<Result<_, _>>()?;
        npz.add_array("link_ids", &ids)?;
        npz.add_array("link_dims", &dims)?;
        npz.add_array("link_labels", &labels)?;
        npz.add_array("site_dims", &site_dims)?;

        let left = self.left_edge().ok_or(MPOError::MissingEdge("left"))?;
        let right = self.right_edge().ok_or(MPOError::MissingEdge("right"))?;
        npz.add_array("left", left.array())?;
        npz.add_array("right", right.array())?;
        for n in 1..=self.len() {
            let W = self.local_tensor(n).ok_or(MPOError::MissingTensor(n))?;
            let d = site_dims[n - 1] as usize;
            let data = W.to_array_ordered(&[
                MPOIdx::SiteP { n, dim: d },
                MPOIdx::Site { n, dim: d },
                MPOIdx::Link(links[n - 1].clone()),
                MPOIdx::Link(links[n].clone()),
            ])?;
            npz.add_array(format!("W{n}"), &data)?;
        }
        Ok(())
    }

    fn read_npz<R>(npz: &mut NpzReader<R>) -> IOResult<Self>
    where R: Read + Seek
    {
        let ids: nd::Array1<u64> = npz.by_name("link_ids")?;
        let dims: nd::Array1<u64> = npz.by_name("link_dims")?;
        let labels: nd::Array2<u32> = npz.by_name("link_labels")?;
        let site_dims: nd::Array1<u64> = npz.by_name("site_dims")?;
        let nlinks = ids.len();
        if nlinks < 2
            || dims.len() != nlinks
            || labels.nrows() != nlinks
            || site_dims.len() + 1 != nlinks
        {
            return Err(Malformed("inconsistent bond and site counts".into()));
        }
        let links: Vec<BondIdx>
            = ids.iter().zip(&dims).zip(labels.outer_iter())
            .map(|((id, dim), label)| {
                Ok(BondIdx::from_parts(*id, *dim as usize, decode_label(label)?))
            })
            .collect::<IOResult<_>>()?;

        let mut mpo = MPO::new(links.clone());
        let edge = |data: nd::Array1<C64>, l: usize| -> IOResult<Tensor<MPOIdx>> {
            Ok(Tensor::from_array(vec![MPOIdx::Link(links[l].clone())], data.into_dyn())?)
        };
        let left: nd::Array1<C64> = npz.by_name("left")?;
        let right: nd::Array1<C64> = npz.by_name("right")?;
        mpo.set_left_edge(edge(left, 0)?)?;
        mpo.set_right_edge(edge(right, nlinks - 1)?)?;
        for (k, d) in site_dims.iter().enumerate() {
            let n = k + 1;
            let d = *d as usize;
            let data: nd::Array4<C64> = npz.by_name(&format!("W{n}"))?;
            let W = Tensor::from_array(
                vec![
                    MPOIdx::SiteP { n, dim: d },
                    MPOIdx::Site { n, dim: d },
                    MPOIdx::Link(links[k].clone()),
                    MPOIdx::Link(links[n].clone()),
                ],
                data.into_dyn(),
            )?;
            mpo.set_local_tensor(n, W)?;
        }
        Ok(mpo)
    }
}
