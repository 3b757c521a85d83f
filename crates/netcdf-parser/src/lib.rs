//! Reading raw model output (E3SM atmosphere/land time series, MPAS ocean and
//! sea-ice monthly statistics, MPAS meshes, SCRIP mapping files).
//!
//! Handlers never talk to libnetcdf directly: they go through the
//! [`DatasetReader`] trait, which has a native implementation
//! ([`NetcdfReader`], feature `netcdf`) and an in-memory one
//! ([`MemoryReader`]) for tests.

pub mod dataset;
pub mod error;
pub mod memory;
#[cfg(feature = "netcdf")]
pub mod native;
pub mod reader;

pub use dataset::{ArrayVariable, AttrValue, Dataset, VarData, RECORD_DIMS};
pub use error::{NetCdfError, NetCdfResult};
pub use memory::MemoryReader;
#[cfg(feature = "netcdf")]
pub use native::{silence_hdf5_errors, NetcdfReader};
pub use reader::DatasetReader;

/// The reader used by the command line: native when compiled in.
#[cfg(feature = "netcdf")]
pub fn default_reader() -> NetCdfResult<Box<dyn DatasetReader>> {
    Ok(Box::new(NetcdfReader::new()))
}

#[cfg(not(feature = "netcdf"))]
pub fn default_reader() -> NetCdfResult<Box<dyn DatasetReader>> {
    Err(NetCdfError::FeatureDisabled)
}
