//! Schema-driven output session for CMIP artifacts.
//!
//! Handlers describe their output with validated axes and stream time
//! slices into an [`OutputSession`]. The session checks everything against
//! the loaded schema table (units, dimensions, time ordering) and writes
//! one artifact per variable through a [`WriterFactory`]:
//!
//! - [`NetcdfWriterFactory`] (feature `netcdf`) writes netCDF files under
//!   the DRS directory layout.
//! - [`MemoryWriterFactory`] keeps artifacts in memory for tests.

pub mod artifact;
pub mod error;
pub mod layout;
pub mod metadata;
#[cfg(feature = "netcdf")]
pub mod netcdf_writer;
pub mod session;
pub mod table;
pub mod writer;

pub use artifact::SchemaContext;
pub use error::{Result, SessionError};
pub use layout::{time_range_label, OutputLayout};
pub use metadata::RunMetadata;
#[cfg(feature = "netcdf")]
pub use netcdf_writer::{NetcdfArtifactWriter, NetcdfWriterFactory};
pub use session::{
    AxisHandle, CmorSession, OutputSession, SessionConfig, SessionState, VariableHandle, VariableScope,
};
pub use table::{AxisEntry, CoordinateTable, SchemaTable, VariableEntry};
pub use writer::{
    ArtifactSpec, ArtifactWriter, MemoryArtifact, MemoryStore, MemoryWriterFactory, OutputAxis, ScalarCoordinate,
    WriterFactory,
};
