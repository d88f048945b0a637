//! Conversions from the timestamp encodings found in container headers.
//!
//! Containers record modification times in three ways:
//! - Unix seconds (tar headers, the ZIP extended-timestamp field)
//! - Windows FILETIME, 100-nanosecond intervals since 1601-01-01 UTC (the
//!   ZIP NTFS extra field)
//! - MS-DOS date and time words with two-second resolution and no time zone
//!   (ZIP headers); these are interpreted as UTC
//!
//! All conversions return `None` for values that cannot be represented.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Difference between the FILETIME and Unix epochs in 100-nanosecond
/// intervals.
const FILETIME_UNIX_DIFF: u64 = 116444736000000000;

/// Number of 100-nanosecond intervals per second.
const INTERVALS_PER_SECOND: u64 = 10_000_000;

/// Converts Unix seconds, which may be negative.
pub(crate) fn from_unix_secs(secs: i64) -> Option<SystemTime> {
    let magnitude = Duration::from_secs(secs.unsigned_abs());
    if secs < 0 {
        UNIX_EPOCH.checked_sub(magnitude)
    } else {
        UNIX_EPOCH.checked_add(magnitude)
    }
}

/// Converts a Windows FILETIME value, preserving 100ns precision.
pub(crate) fn from_filetime(filetime: u64) -> Option<SystemTime> {
    let (intervals, before_epoch) = if filetime >= FILETIME_UNIX_DIFF {
        (filetime - FILETIME_UNIX_DIFF, false)
    } else {
        (FILETIME_UNIX_DIFF - filetime, true)
    };
    let offset = Duration::new(
        intervals / INTERVALS_PER_SECOND,
        ((intervals % INTERVALS_PER_SECOND) * 100) as u32,
    );
    if before_epoch {
        UNIX_EPOCH.checked_sub(offset)
    } else {
        UNIX_EPOCH.checked_add(offset)
    }
}

/// Converts MS-DOS date and time words.
///
/// Returns `None` for the all-zero "no date" value and for out-of-range
/// fields.
pub(crate) fn from_dos(date: u16, time: u16) -> Option<SystemTime> {
    let year = 1980 + i64::from(date >> 9);
    let month = u32::from((date >> 5) & 0x0f);
    let day = u32::from(date & 0x1f);
    let hour = u64::from(time >> 11);
    let minute = u64::from((time >> 5) & 0x3f);
    let second = u64::from(time & 0x1f) * 2;

    if !(1..=12).contains(&month) || day == 0 || hour > 23 || minute > 59 || second > 59 {
        return None;
    }
    let days = days_from_civil(year, month, day);
    let secs = days * 86_400 + (hour * 3600 + minute * 60 + second) as i64;
    from_unix_secs(secs)
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let month_from_march = i64::from((month + 9) % 12);
    let day_of_year = (153 * month_from_march + 2) / 5 + i64::from(day) - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch() {
        assert_eq!(from_unix_secs(0), Some(UNIX_EPOCH));
        assert_eq!(from_filetime(FILETIME_UNIX_DIFF), Some(UNIX_EPOCH));
    }

    #[test]
    fn test_filetime_precision() {
        let t = from_filetime(FILETIME_UNIX_DIFF + INTERVALS_PER_SECOND + 5).unwrap();
        assert_eq!(
            t.duration_since(UNIX_EPOCH).unwrap(),
            Duration::new(1, 500)
        );
    }

    #[test]
    fn test_before_unix_epoch() {
        let t = from_unix_secs(-10).unwrap();
        assert_eq!(
            UNIX_EPOCH.duration_since(t).unwrap(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_dos_datetime() {
        // 2020-06-15 13:45:30
        let date = ((2020 - 1980) << 9) | (6 << 5) | 15;
        let time = (13 << 11) | (45 << 5) | (30 / 2);
        let t = from_dos(date, time).unwrap();
        assert_eq!(
            t.duration_since(UNIX_EPOCH).unwrap().as_secs(),
            1_592_228_730
        );
    }

    #[test]
    fn test_dos_zero_is_none() {
        assert_eq!(from_dos(0, 0), None);
        assert_eq!(from_dos((40 << 9) | (13 << 5) | 1, 0), None);
    }

    #[test]
    fn test_days_from_civil() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(2000, 3, 1), 11_017);
        assert_eq!(days_from_civil(1969, 12, 31), -1);
    }
}
