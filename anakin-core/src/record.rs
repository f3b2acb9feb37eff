//! Types and traits for recording training metrics.
//!
//! * [`Record`] - A container of key-value pairs of various data types
//! * [`RecordValue`] - Values that can be stored in a [`Record`]
//! * [`Recorder`] - Writes records, each tagged with a [`LogEvent`], to some destination
//! * [`RecordStorage`] - Aggregates sequences of records into summary statistics
//! * [`BufferedRecorder`] - Keeps records in memory
//! * [`NullRecorder`] - Discards all records
//!
//! ```rust
//! use anakin_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("episode_return", -120.5);
//! record.insert("episode_length", RecordValue::Scalar(200.0));
//! record.insert("returns", RecordValue::Array1(vec![-120.0, -121.0]));
//! assert_eq!(record.get_scalar("episode_length").unwrap(), 200.0);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::{LogEvent, Recorder};
pub use storage::RecordStorage;
