//! `time`: clocks, sleeping and broken-down time tuples.
//!
//! A time tuple travels as a JSON array string
//! `[year, month, day, hour, minute, second, weekday, yearday, isdst]`, with
//! weekday counted from Monday = 0 and yearday from 1.

use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike, Utc};

use super::datetime::{from_seconds, render};
use super::{ret, CallArgs, Exports, Library};
use crate::error::{Error, Result};

const ASCTIME: &str = "%a %b %e %H:%M:%S %Y";

pub struct TimeLib {
    started: Instant,
}

impl Default for TimeLib {
    fn default() -> Self {
        TimeLib {
            started: Instant::now(),
        }
    }
}

impl TimeLib {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Seconds argument where 0 means "now".
fn instant_arg(args: &CallArgs<'_>, index: usize) -> Result<DateTime<Utc>> {
    let seconds = args.num(index)?;
    if seconds == 0.0 {
        return Ok(Utc::now());
    }
    from_seconds(args.function(), seconds)
}

fn tuple<Tz: TimeZone>(dt: &DateTime<Tz>, isdst: i32) -> String {
    let fields = [
        dt.year(),
        dt.month() as i32,
        dt.day() as i32,
        dt.hour() as i32,
        dt.minute() as i32,
        dt.second() as i32,
        dt.weekday().num_days_from_monday() as i32,
        dt.ordinal() as i32,
        isdst,
    ];
    let items: Vec<String> = fields.iter().map(i32::to_string).collect();
    format!("[{}]", items.join(","))
}

/// Parse the first six fields of a time tuple.
fn parse_tuple(function: &'static str, text: &str) -> Result<NaiveDateTime> {
    let fields: Vec<i64> = serde_json::from_str(text)
        .map_err(|e| Error::capability(function, format!("invalid time tuple: {e}")))?;
    let [year, month, day, hour, minute, second] = match fields.get(..6) {
        Some(&[y, mo, d, h, mi, s]) => [y, mo, d, h, mi, s],
        _ => return Err(Error::capability(function, "time tuple needs at least 6 fields")),
    };
    let component = |v: i64| u32::try_from(v).ok();
    let date = i32::try_from(year)
        .ok()
        .zip(component(month).zip(component(day)))
        .and_then(|(y, (m, d))| NaiveDate::from_ymd_opt(y, m, d));
    let time = component(hour)
        .zip(component(minute).zip(component(second)))
        .and_then(|(h, (mi, s))| date?.and_hms_opt(h, mi, s));
    time.ok_or_else(|| Error::capability(function, format!("time tuple out of range: {text}")))
}

fn local_offset_seconds(dt: &DateTime<Local>) -> i32 {
    dt.offset().fix().local_minus_utc()
}

/// Whether the local zone uses a different offset in January and July.
fn observes_daylight_saving() -> bool {
    let year = Local::now().year();
    let offset = |month| {
        Local
            .with_ymd_and_hms(year, month, 1, 12, 0, 0)
            .earliest()
            .map(|dt| local_offset_seconds(&dt))
    };
    offset(1) != offset(7)
}

impl Library for TimeLib {
    const NAME: &'static str = "time";

    fn register(exports: &mut Exports<Self>) {
        exports
            .func("time", |_, _| ret(since_epoch().as_secs_f64()))
            .func("time_ns", |_, _| ret(since_epoch().as_nanos() as f64))
            .func("perf_counter", |lib, _| ret(lib.elapsed().as_secs_f64()))
            .func("perf_counter_ns", |lib, _| ret(lib.elapsed().as_nanos() as f64))
            .func("monotonic", |lib, _| ret(lib.elapsed().as_secs_f64()))
            .func("monotonic_ns", |lib, _| ret(lib.elapsed().as_nanos() as f64))
            .func("sleep", |_, args| {
                let seconds = args.num(0)?;
                let duration = Duration::try_from_secs_f64(seconds)
                    .map_err(|e| Error::capability("sleep", format!("invalid duration {seconds}: {e}")))?;
                thread::sleep(duration);
                Ok(None)
            })
            .func("ctime", |_, args| {
                let dt = instant_arg(args, 0)?.with_timezone(&Local);
                args.ret_str(&dt.format(ASCTIME).to_string())
            })
            .func("asctime", |_, args| {
                let dt = parse_tuple("asctime", &args.str(0)?)?;
                args.ret_str(&dt.format(ASCTIME).to_string())
            })
            .func("gmtime", |_, args| {
                let dt = instant_arg(args, 0)?;
                args.ret_str(&tuple(&dt, 0))
            })
            .func("localtime", |_, args| {
                let dt = instant_arg(args, 0)?.with_timezone(&Local);
                args.ret_str(&tuple(&dt, -1))
            })
            .func("mktime", |_, args| {
                let naive = parse_tuple("mktime", &args.str(0)?)?;
                let dt = Local
                    .from_local_datetime(&naive)
                    .earliest()
                    .ok_or_else(|| Error::capability("mktime", format!("{naive} does not exist locally")))?;
                ret(dt.timestamp() as f64)
            })
            .func("strftime", |_, args| {
                let format = args.str(0)?;
                let dt = parse_tuple("strftime", &args.str(1)?)?;
                let text = render("strftime", dt.format(&format), &format)?;
                args.ret_str(&text)
            })
            .func("timezone", |_, _| ret(-local_offset_seconds(&Local::now())))
            .func("daylight", |_, _| ret(observes_daylight_saving()))
            .func("tzname", |_, args| args.ret_str(&Local::now().format("%Z").to_string()));
    }
}
