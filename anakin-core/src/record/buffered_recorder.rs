use super::{LogEvent, Record, Recorder};

/// Buffered recorder.
///
/// Keeps every written record in memory, which is handy for inspecting what
/// the orchestrator logged in tests.
#[derive(Debug, Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
}

impl BufferedRecorder {
    /// Construct the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Returns the records logged under the given category.
    pub fn records_of(&self, event: LogEvent) -> Vec<&Record> {
        self.buf
            .iter()
            .filter(|r| r.get_string("event").map_or(false, |e| e == event.as_str()))
            .collect()
    }
}

impl Recorder for BufferedRecorder {
    /// Write a [`Record`] to the buffer.
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }
}
