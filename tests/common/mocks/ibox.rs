use axp_core::mbox::{IboxEvent, IboxSink};
use mockall::mock;
use std::sync::Mutex;

/// Records every event the Mbox raises, for inspection after the fact.
pub struct RecordingIbox {
    events: Mutex<Vec<IboxEvent>>,
}

impl RecordingIbox {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<IboxEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of recorded events.
    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl Default for RecordingIbox {
    fn default() -> Self {
        Self::new()
    }
}

impl IboxSink for RecordingIbox {
    fn memory_event(&self, event: IboxEvent) {
        self.events.lock().unwrap().push(event);
    }
}

mock! {
    pub EventSink {}
    impl IboxSink for EventSink {
        fn memory_event(&self, event: IboxEvent);
    }
}
