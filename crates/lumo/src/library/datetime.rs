//! `datetime`: calendar dates and instants exchanged as ISO 8601 strings.
//!
//! Instants without an explicit offset are taken as UTC.

use std::fmt::Write as _;

use chrono::{
    DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta, Utc,
};

use super::{ret, CallArgs, Exports, Library};
use crate::error::{Error, Result};
use crate::value::RawValue;

type Ret = Result<Option<RawValue>>;

#[derive(Debug, Default)]
pub struct DatetimeLib;

/// `2024-03-01T12:00:00.000Z`
pub(crate) fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `Fri, 01 Mar 2024 12:00:00 GMT`
pub(crate) fn http_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an instant: RFC 3339 with offset, or a naive date-time or date.
pub(crate) fn parse_instant(function: &'static str, text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| Error::capability(function, format!("unrecognized date {text:?}")))
}

pub(crate) fn from_seconds(function: &'static str, seconds: f64) -> Result<DateTime<Utc>> {
    if !seconds.is_finite() {
        return Err(Error::capability(function, format!("invalid timestamp {seconds}")));
    }
    DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64)
        .ok_or_else(|| Error::capability(function, format!("timestamp {seconds} out of range")))
}

/// Render a strftime-style formatting, rejecting unknown specifiers.
pub(crate) fn render(function: &'static str, formatted: impl std::fmt::Display, format: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{formatted}")
        .map_err(|_| Error::capability(function, format!("invalid format {format:?}")))?;
    Ok(out)
}

fn component(args: &CallArgs<'_>, index: usize) -> Result<u32> {
    let value = args.num(index)?;
    if !(0.0..=u32::MAX as f64).contains(&value) {
        return Err(Error::capability(args.function(), format!("invalid component {value}")));
    }
    Ok(value as u32)
}

fn date_from(args: &CallArgs<'_>) -> Result<NaiveDate> {
    let year = args.num(0)? as i32;
    let (month, day) = (component(args, 1)?, component(args, 2)?);
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::capability(args.function(), format!("invalid date {year}-{month}-{day}")))
}

fn time_from(args: &CallArgs<'_>, first: usize) -> Result<NaiveTime> {
    let [hour, minute, second, micro] = [0, 1, 2, 3].map(|i| component(args, first + i));
    let (hour, minute, second, micro) = (hour?, minute?, second?, micro?);
    NaiveTime::from_hms_micro_opt(hour, minute, second, micro).ok_or_else(|| {
        Error::capability(
            args.function(),
            format!("invalid time {hour}:{minute}:{second}.{micro}"),
        )
    })
}

fn shift(args: &mut CallArgs<'_>, sign: f64) -> Ret {
    let function = args.function();
    let dt = parse_instant(function, &args.str(0)?)?;
    let millis = (args.num(1)? * 1000.0 * sign).round();
    let shifted = TimeDelta::try_milliseconds(millis as i64)
        .and_then(|delta| dt.checked_add_signed(delta))
        .ok_or_else(|| Error::capability(function, "result out of range"))?;
    args.ret_str(&iso(shifted))
}

impl Library for DatetimeLib {
    const NAME: &'static str = "datetime";

    fn register(exports: &mut Exports<Self>) {
        exports
            .func("now", |_, args| args.ret_str(&Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)))
            .func("utcnow", |_, args| args.ret_str(&http_date(Utc::now())))
            .func("today", |_, args| {
                let today = Utc::now().date_naive();
                args.ret_int_array(vec![today.year(), today.month() as i32, today.day() as i32])
            })
            .func("date", |_, args| {
                let date = date_from(args)?;
                args.ret_str(&date.format("%Y-%m-%d").to_string())
            })
            .func("time", |_, args| {
                let time = time_from(args, 0)?;
                args.ret_str(&time.format("%H:%M:%S%.6f").to_string())
            })
            .func("datetime", |_, args| {
                let dt = date_from(args)?.and_time(time_from(args, 3)?).and_utc();
                args.ret_str(&iso(dt))
            })
            .func("fromtimestamp", |_, args| {
                let dt = from_seconds("fromtimestamp", args.num(0)?)?;
                args.ret_str(&dt.with_timezone(&Local).to_rfc3339_opts(SecondsFormat::Millis, false))
            })
            .func("utcfromtimestamp", |_, args| {
                let dt = from_seconds("utcfromtimestamp", args.num(0)?)?;
                args.ret_str(&http_date(dt))
            })
            .func("timestamp", |_, args| {
                let dt = parse_instant("timestamp", &args.str(0)?)?;
                ret(dt.timestamp_millis() as f64 / 1000.0)
            })
            .func("strftime", |_, args| {
                let dt = parse_instant("strftime", &args.str(0)?)?;
                let format = args.str(1)?;
                let text = render("strftime", dt.format(&format), &format)?;
                args.ret_str(&text)
            })
            .func("strptime", strptime)
            .func("isoformat", |_, args| {
                let dt = parse_instant("isoformat", &args.str(0)?)?;
                args.ret_str(&iso(dt))
            })
            .func("weekday", |_, args| {
                let dt = parse_instant("weekday", &args.str(0)?)?;
                ret(dt.weekday().num_days_from_monday() as i32)
            })
            .func("isoweekday", |_, args| {
                let dt = parse_instant("isoweekday", &args.str(0)?)?;
                ret(dt.weekday().number_from_monday() as i32)
            })
            .func("add_seconds", |_, args| shift(args, 1.0))
            .func("sub_seconds", |_, args| shift(args, -1.0));
    }
}

fn strptime(_: &mut DatetimeLib, args: &mut CallArgs<'_>) -> Ret {
    let (text, format) = (args.str(0)?, args.str(1)?);
    let parsed = NaiveDateTime::parse_from_str(&text, &format)
        .or_else(|_| {
            NaiveDate::parse_from_str(&text, &format).map(|date| date.and_time(NaiveTime::MIN))
        })
        .map_err(|e| Error::capability("strptime", format!("{text:?} does not match {format:?}: {e}")))?;
    args.ret_str(&iso(parsed.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::testing::{call, read_str, str_arg};
    use crate::library::LibraryCell;
    use crate::memory::LinearBuffer;

    fn nums(values: &[f64]) -> Vec<RawValue> {
        values.iter().map(|&v| RawValue::F32(v as f32)).collect()
    }

    #[test]
    fn builds_dates_and_times() {
        let mut lib = LibraryCell::new(DatetimeLib).unwrap();
        let mut mem = LinearBuffer::default();
        let out = call(&mut lib, &mut mem, "date", &nums(&[2024.0, 2.0, 29.0])).unwrap();
        assert_eq!(read_str(&mem, out), "2024-02-29");
        let out = call(&mut lib, &mut mem, "time", &nums(&[9.0, 5.0, 7.0, 42.0])).unwrap();
        assert_eq!(read_str(&mem, out), "09:05:07.000042");
        let out = call(
            &mut lib,
            &mut mem,
            "datetime",
            &nums(&[2024.0, 3.0, 1.0, 12.0, 30.0, 15.0, 250000.0]),
        )
        .unwrap();
        assert_eq!(read_str(&mem, out), "2024-03-01T12:30:15.250Z");
        assert!(call(&mut lib, &mut mem, "date", &nums(&[2023.0, 2.0, 29.0])).is_err());
    }

    #[test]
    fn timestamps_and_weekdays() {
        let mut lib = LibraryCell::new(DatetimeLib).unwrap();
        let mut mem = LinearBuffer::default();
        let when = str_arg(&mut mem, "2024-03-01T00:00:00Z");
        assert_eq!(
            call(&mut lib, &mut mem, "timestamp", &[when]).unwrap(),
            Some(RawValue::F64(1_709_251_200.0))
        );
        assert_eq!(call(&mut lib, &mut mem, "weekday", &[when]).unwrap(), Some(RawValue::I32(4)));
        assert_eq!(call(&mut lib, &mut mem, "isoweekday", &[when]).unwrap(), Some(RawValue::I32(5)));

        let out = call(&mut lib, &mut mem, "utcfromtimestamp", &[RawValue::F64(0.0)]).unwrap();
        assert_eq!(read_str(&mem, out), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn shifting_and_formatting() {
        let mut lib = LibraryCell::new(DatetimeLib).unwrap();
        let mut mem = LinearBuffer::default();
        let when = str_arg(&mut mem, "2024-02-28 23:59:30");
        let out = call(&mut lib, &mut mem, "add_seconds", &[when, RawValue::F64(45.0)]).unwrap();
        assert_eq!(read_str(&mem, out), "2024-02-29T00:00:15.000Z");
        let out = call(&mut lib, &mut mem, "sub_seconds", &[when, RawValue::F64(30.0)]).unwrap();
        assert_eq!(read_str(&mem, out), "2024-02-28T23:59:00.000Z");

        let fmt = str_arg(&mut mem, "%d/%m/%Y");
        let out = call(&mut lib, &mut mem, "strftime", &[when, fmt]).unwrap();
        assert_eq!(read_str(&mem, out), "28/02/2024");
        let bad = str_arg(&mut mem, "%Q");
        assert!(call(&mut lib, &mut mem, "strftime", &[when, bad]).is_err());

        let text = str_arg(&mut mem, "05/01/2025");
        let out = call(&mut lib, &mut mem, "strptime", &[text, fmt]).unwrap();
        assert_eq!(read_str(&mem, out), "2025-01-05T00:00:00.000Z");
    }

    #[test]
    fn rejects_unparseable_dates() {
        assert!(matches!(
            parse_instant("timestamp", "yesterday"),
            Err(Error::Capability { function: "timestamp", .. })
        ));
    }
}
