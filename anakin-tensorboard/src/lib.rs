//! Writes records of the training loop to TFRecord files readable by TensorBoard.
use anakin_core::record::{Record, RecordValue, Recorder};
use log::{debug, warn};
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

const STEP_KEY: &str = "timestep";
const EVENT_KEY: &str = "event";

/// Write records to TFRecord.
///
/// Scalars are written with the tag `<event>/<key>`, where `<event>` is the
/// [`LogEvent`](anakin_core::record::LogEvent) the record was logged under, at the
/// step given by the `timestep` entry of the record.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
}

impl TensorboardRecorder {
    /// Construct a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
        }
    }
}

impl Recorder for TensorboardRecorder {
    /// Write a given [Record] into a TFRecord.
    ///
    /// Scalars and arrays (as their mean) are written. Records without a
    /// `timestep` entry are dropped.
    fn write(&mut self, record: Record) {
        let step = match record.get(STEP_KEY) {
            Some(RecordValue::Scalar(v)) => *v as usize,
            _ => {
                warn!("Dropped a record without {}", STEP_KEY);
                return;
            }
        };
        let prefix = record.get_string(EVENT_KEY).ok();

        for (k, v) in record.mean_of_arrays().iter() {
            if k == STEP_KEY || k == EVENT_KEY || k == "eval_step" {
                continue;
            }
            let tag = match &prefix {
                Some(p) => format!("{}/{}", p, k),
                None => k.clone(),
            };
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(&tag, *v, step),
                RecordValue::DateTime(_) => {}
                _ => debug!("Skipped unsupported value: {:?}", (k, v)),
            }
        }
    }

    fn flush(&mut self) {
        self.writer.flush();
    }
}
