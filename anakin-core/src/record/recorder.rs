use super::{Record, RecordValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category tag attached to every logged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogEvent {
    /// Metrics of the acting (rollout) side, e.g. completed episode returns.
    Act,
    /// Losses and optimizer throughput of the learner.
    Train,
    /// Periodic evaluation of the current policy.
    Eval,
    /// Final evaluation of the best policy found during training.
    Absolute,
    /// Bookkeeping such as the global timestep.
    Misc,
}

impl LogEvent {
    /// Lower-case name of the category, used as a tag prefix by recorders.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Act => "act",
            Self::Train => "train",
            Self::Eval => "eval",
            Self::Absolute => "absolute",
            Self::Misc => "misc",
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Writes a record to an output destination with [`Recorder::write`].
pub trait Recorder {
    /// Write a record to the [`Recorder`].
    fn write(&mut self, record: Record);

    /// Logs named values at the given timestep under a category.
    ///
    /// The default implementation adds `timestep`, `eval_step` and `event`
    /// entries to the record and passes it to [`Recorder::write`].
    fn log(&mut self, mut record: Record, timestep: usize, eval_step: usize, event: LogEvent) {
        record.insert("timestep", RecordValue::Scalar(timestep as f32));
        record.insert("eval_step", RecordValue::Scalar(eval_step as f32));
        record.insert("event", RecordValue::String(event.as_str().to_string()));
        self.write(record);
    }

    /// Flushes buffered values, if any.
    fn flush(&mut self) {}
}

impl<R: Recorder + ?Sized> Recorder for Box<R> {
    fn write(&mut self, record: Record) {
        (**self).write(record)
    }

    fn log(&mut self, record: Record, timestep: usize, eval_step: usize, event: LogEvent) {
        (**self).log(record, timestep, eval_step, event)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}
