use std::fmt;

use crate::memory::Addr;

/// which component boundary a transfer crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    CacheToProcessor,
    ProcessorToCache,
    MemoryToCache,
    CacheToMemory,
    /// a clean line was discarded without a writeback.
    CacheToNowhere,
}

impl Direction {
    fn endpoints(self) -> (&'static str, &'static str) {
        match self {
            Direction::CacheToProcessor => ("cache", "processor"),
            Direction::ProcessorToCache => ("processor", "cache"),
            Direction::MemoryToCache => ("memory", "cache"),
            Direction::CacheToMemory => ("cache", "memory"),
            Direction::CacheToNowhere => ("cache", "nowhere"),
        }
    }
}

/// one transfer of the words `start..=end` across a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    pub start: Addr,
    pub end: Addr,
    pub direction: Direction,
}

impl TraceEvent {
    /// event covering `size` words from `start` upward.
    pub fn new(start: Addr, size: usize, direction: Direction) -> Self {
        Self {
            start,
            end: start.disp(size - 1),
            direction,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (src, dst) = self.direction.endpoints();
        write!(
            f,
            "@@@ transferring word [{}-{}] from the {src} to the {dst}",
            self.start, self.end
        )
    }
}

/// consumes the transfer events the cache emits.
pub trait TraceSink {
    fn emit(&mut self, event: TraceEvent);
}

/// discards every event.
pub struct NullTrace {}

impl NullTrace {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for NullTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for NullTrace {
    fn emit(&mut self, _: TraceEvent) {}
}

/// accumulates events in order of emission.
pub struct RecordTrace {
    events: Vec<TraceEvent>,
}

impl RecordTrace {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }
    pub fn into_inner(self) -> Vec<TraceEvent> {
        self.events
    }
}

impl Default for RecordTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for RecordTrace {
    fn emit(&mut self, event: TraceEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_transfer_line() {
        let ev = TraceEvent::new(Addr::new(8), 4, Direction::MemoryToCache);
        assert_eq!(
            "@@@ transferring word [8-11] from the memory to the cache",
            ev.to_string()
        );
        let ev = TraceEvent::new(Addr::new(3), 1, Direction::CacheToProcessor);
        assert_eq!(
            "@@@ transferring word [3-3] from the cache to the processor",
            ev.to_string()
        );
    }

    #[test]
    fn record_keeps_emission_order() {
        let mut t = RecordTrace::new();
        t.emit(TraceEvent::new(Addr::new(0), 4, Direction::CacheToMemory));
        t.emit(TraceEvent::new(Addr::new(4), 4, Direction::MemoryToCache));
        let evs = t.into_inner();
        assert_eq!(Direction::CacheToMemory, evs[0].direction);
        assert_eq!(Direction::MemoryToCache, evs[1].direction);
    }
}
