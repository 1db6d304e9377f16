use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Source of commit timestamps, swappable so tests can pin the clock.
pub trait TimeSource {
    /// Current wall clock, RFC 3339 with nanosecond precision.
    fn current_time(&self) -> String;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn current_time(&self) -> String {
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .expect("failed to format UTC time")
    }
}

#[derive(Clone)]
pub struct FixedTime {
    pub time: String,
}

impl TimeSource for FixedTime {
    fn current_time(&self) -> String {
        self.time.clone()
    }
}
