use crate::history::model::{DayBucket, DayClock, Message};
use std::collections::VecDeque;

/// Groups a newest-first message stream into per-day buckets.
///
/// A bucket becomes ready the moment a message from an older day arrives.
/// The last open bucket is only released by [`DateBucketer::finish`].
#[derive(Debug)]
pub struct DateBucketer {
    clock: DayClock,
    open: Option<DayBucket>,
    ready: VecDeque<DayBucket>,
}

impl DateBucketer {
    pub fn new(clock: DayClock) -> Self {
        Self {
            clock,
            open: None,
            ready: VecDeque::new(),
        }
    }

    pub fn accept(&mut self, message: Message) {
        let day = self.clock.day_of(&message);
        match self.open.as_mut() {
            Some(bucket) if bucket.date_key == day => bucket.messages.push(message),
            _ => {
                if let Some(done) = self.open.replace(DayBucket::open(day, message)) {
                    self.ready.push_back(done);
                }
            }
        }
    }

    pub fn flush_ready(&mut self) -> Option<DayBucket> {
        self.ready.pop_front()
    }

    /// Closes the open bucket. Ready buckets must be drained first.
    pub fn finish(&mut self) -> Option<DayBucket> {
        debug_assert!(self.ready.is_empty());
        self.open.take()
    }
}
