//! Common types shared by every crate of the CMIP conversion pipeline.
//!
//! - [`AxisDescriptor`] / [`AxisBuilder`]: coordinate axis records in schema order
//! - [`TimeUnits`] / [`Calendar`]: CF time units on model calendars (noleap, 360_day, ...)
//! - [`RawVariableSet`]: logical input keys mapped to raw model files
//! - [`TimeSlice`]: one streaming write unit
//! - fill value helpers

pub mod axis;
pub mod error;
pub mod fill;
pub mod raw;
pub mod slice;
pub mod time;

pub use axis::{bounds_from_flat, AxisBuilder, AxisDescriptor, AxisRole, AxisRule, StoredDirection};
pub use error::{AxisError, RawInputError, TimeError};
pub use fill::{is_fill, FILL_VALUE, FILL_VALUE_F32};
pub use raw::{RawVariableSet, ResolvedInputs};
pub use slice::{TimeSlice, TimeStamp};
pub use time::{Calendar, CalendarDate, TimeUnit, TimeUnits};
