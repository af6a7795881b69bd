//! Stream slicer implementations

use super::types::StreamSlicer;
use crate::error::{Error, Result};
use crate::types::{JsonValue, SliceIter, StreamSlice};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::iter;
use std::sync::Arc;

/// Slices a test read pulls unless configured otherwise
pub const DEFAULT_MAXIMUM_NUMBER_OF_SLICES: usize = 5;

// ============================================================================
// Single Partition
// ============================================================================

/// A single empty slice
#[derive(Debug, Clone, Copy, Default)]
pub struct SinglePartitionSlicer;

impl StreamSlicer for SinglePartitionSlicer {
    fn stream_slices(&self) -> Result<SliceIter> {
        Ok(Box::new(iter::once(StreamSlice::new())))
    }
}

// ============================================================================
// List
// ============================================================================

/// One slice per value, exposed as a partition field
#[derive(Debug, Clone)]
pub struct ListSlicer {
    values: Arc<[JsonValue]>,
    partition_field: String,
}

impl ListSlicer {
    pub fn new(values: Vec<JsonValue>, partition_field: impl Into<String>) -> Self {
        Self {
            values: values.into(),
            partition_field: partition_field.into(),
        }
    }
}

impl StreamSlicer for ListSlicer {
    fn stream_slices(&self) -> Result<SliceIter> {
        let values = Arc::clone(&self.values);
        let field = self.partition_field.clone();
        Ok(Box::new((0..values.len()).map(move |i| {
            StreamSlice::new().with_partition(field.clone(), values[i].clone())
        })))
    }
}

// ============================================================================
// Datetime
// ============================================================================

/// Consecutive `[start, end)` windows of `step`, the last one clamped to `end`
///
/// Windows are produced lazily and exposed in the slice's cursor part under
/// `start_param` / `end_param`.
#[derive(Debug, Clone)]
pub struct DatetimeSlicer {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
    format: String,
    start_param: String,
    end_param: String,
}

impl DatetimeSlicer {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
        format: impl Into<String>,
        start_param: impl Into<String>,
        end_param: impl Into<String>,
    ) -> Result<Self> {
        if step <= Duration::zero() {
            return Err(Error::invalid_value("step", "must be a positive duration"));
        }
        Ok(Self {
            start,
            end,
            step,
            format: format.into(),
            start_param: start_param.into(),
            end_param: end_param.into(),
        })
    }

    /// Create from string values; `end` may be `now`
    pub fn from_strings(
        start: &str,
        end: &str,
        step: &str,
        format: impl Into<String>,
        start_param: impl Into<String>,
        end_param: impl Into<String>,
    ) -> Result<Self> {
        let end = match end.trim() {
            "now" | "" => Utc::now(),
            other => parse_datetime(other)?,
        };
        Self::new(
            parse_datetime(start)?,
            end,
            parse_duration(step)?,
            format,
            start_param,
            end_param,
        )
    }
}

impl StreamSlicer for DatetimeSlicer {
    fn stream_slices(&self) -> Result<SliceIter> {
        let Self {
            end,
            step,
            format,
            start_param,
            end_param,
            ..
        } = self.clone();
        let mut current = self.start;

        Ok(Box::new(iter::from_fn(move || {
            if current >= end {
                return None;
            }
            // Past the representable range is past `end` too
            let window_end = current
                .checked_add_signed(step)
                .map_or(end, |next| next.min(end));
            let slice = StreamSlice::new()
                .with_cursor(start_param.clone(), current.format(&format).to_string())
                .with_cursor(end_param.clone(), window_end.format(&format).to_string());
            current = window_end;
            Some(slice)
        })))
    }
}

/// Parse a datetime string into UTC
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    const FORMATS: [&str; 4] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d", "%Y/%m/%d"];
    FORMATS
        .iter()
        .find_map(|fmt| {
            NaiveDateTime::parse_from_str(s, fmt)
                .or_else(|_| NaiveDate::parse_from_str(s, fmt).map(|d| d.and_time(NaiveTime::MIN)))
                .ok()
        })
        .map(|ndt| ndt.and_utc())
        .ok_or_else(|| Error::config(format!("Invalid datetime format: {s}")))
}

/// Parse a duration like "1w", "1d", "2h", "30m", "45s" (bare numbers are days)
pub(crate) fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (number, unit) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], c),
        _ => (s, 'd'),
    };
    let n: i64 = number
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("Invalid duration number: {number}")))?;

    let duration = match unit {
        'w' => Duration::try_weeks(n),
        'd' => Duration::try_days(n),
        'h' => Duration::try_hours(n),
        'm' => Duration::try_minutes(n),
        's' => Duration::try_seconds(n),
        other => return Err(Error::config(format!("Invalid duration suffix: {other}"))),
    };
    duration.ok_or_else(|| Error::config(format!("Duration out of range: {s}")))
}

// ============================================================================
// Test Read
// ============================================================================

/// Limits another slicer to its first `max_slices` slices
pub struct TestReadSlicer {
    inner: Box<dyn StreamSlicer>,
    max_slices: usize,
}

impl TestReadSlicer {
    pub fn new(inner: Box<dyn StreamSlicer>, max_slices: Option<usize>) -> Self {
        Self {
            inner,
            max_slices: max_slices.unwrap_or(DEFAULT_MAXIMUM_NUMBER_OF_SLICES),
        }
    }

    pub fn max_slices(&self) -> usize {
        self.max_slices
    }
}

impl StreamSlicer for TestReadSlicer {
    fn stream_slices(&self) -> Result<SliceIter> {
        Ok(Box::new(self.inner.stream_slices()?.take(self.max_slices)))
    }
}

impl std::fmt::Debug for TestReadSlicer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestReadSlicer")
            .field("max_slices", &self.max_slices)
            .finish_non_exhaustive()
    }
}
