use time::{Date, OffsetDateTime, UtcOffset};

/// Source of the current instant and the device's UTC offset.
pub trait Clock {
    fn now_utc(&self) -> OffsetDateTime;

    /// `None` when the platform cannot determine the local offset.
    fn local_offset(&self) -> Option<UtcOffset>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn local_offset(&self) -> Option<UtcOffset> {
        UtcOffset::current_local_offset().ok()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FixedClock {
    now: OffsetDateTime,
    local_offset: Option<UtcOffset>,
}

impl FixedClock {
    #[must_use]
    pub fn new(now: OffsetDateTime, local_offset: Option<UtcOffset>) -> Self {
        Self { now, local_offset }
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> OffsetDateTime {
        self.now.to_offset(UtcOffset::UTC)
    }

    fn local_offset(&self) -> Option<UtcOffset> {
        self.local_offset
    }
}

/// Format a date as `YYYY-MM-DD` from its components.
#[must_use]
pub fn format_day(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

/// Candidate day strings, most likely first, without duplicates.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DayAnchors(Vec<String>);

impl DayAnchors {
    /// Derive anchors from a clock.
    ///
    /// The caller's offset wins over the clock's local offset, which wins over UTC.
    /// The device-clock anchor always uses the clock's own offset.
    #[must_use]
    pub fn from_clock(
        clock: &impl Clock,
        caller_offset: Option<UtcOffset>,
        override_day: Option<&str>,
    ) -> Self {
        let device_offset = clock.local_offset().unwrap_or(UtcOffset::UTC);
        let zone_offset = caller_offset.unwrap_or(device_offset);
        build_anchors(clock.now_utc(), zone_offset, device_offset, override_day)
    }

    fn push(&mut self, day: String) {
        if !self.0.contains(&day) {
            self.0.push(day);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a DayAnchors {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Build the ordered day anchors for `now`.
///
/// With an override the result is exactly `[override_day]`. Otherwise: today in
/// `zone_offset`, today in UTC, today per the device offset, then yesterday and
/// tomorrow in `zone_offset`.
#[must_use]
pub fn build_anchors(
    now: OffsetDateTime,
    zone_offset: UtcOffset,
    device_offset: UtcOffset,
    override_day: Option<&str>,
) -> DayAnchors {
    let mut anchors = DayAnchors::default();
    if let Some(day) = override_day {
        anchors.push(day.to_string());
        return anchors;
    }

    let local_today = now.to_offset(zone_offset).date();
    anchors.push(format_day(local_today));
    anchors.push(format_day(now.to_offset(UtcOffset::UTC).date()));
    anchors.push(format_day(now.to_offset(device_offset).date()));
    if let Some(yesterday) = local_today.previous_day() {
        anchors.push(format_day(yesterday));
    }
    if let Some(tomorrow) = local_today.next_day() {
        anchors.push(format_day(tomorrow));
    }
    anchors
}
