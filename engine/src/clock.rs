use time::{Date, OffsetDateTime, UtcOffset};

/// Seconds at the top of each hour during which the hour announcement may fire.
pub const TIME_SIGNAL_WINDOW_SECS: u8 = 10;

/// Source of wall-clock time for the top-of-hour check.
pub trait WallClock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time at a fixed UTC offset.
///
/// The local offset can only be read while the process is single-threaded
/// on some Unix targets, so [`SystemClock::local`] must run before the tokio
/// runtime starts.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    /// Capture the machine's local offset, or UTC when it can't be determined.
    pub fn local() -> Self {
        Self::with_offset(UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
    }

    pub fn with_offset(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }
}

impl WallClock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// Identifies one top-of-hour window so it can fire at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourWindow {
    date: Date,
    hour: u8,
}

/// Returns the window `now` falls in, or `None` outside the first
/// [`TIME_SIGNAL_WINDOW_SECS`] seconds of an hour.
pub fn time_signal_window(now: OffsetDateTime) -> Option<HourWindow> {
    if now.minute() == 0 && now.second() < TIME_SIGNAL_WINDOW_SECS {
        Some(HourWindow { date: now.date(), hour: now.hour() })
    } else {
        None
    }
}
