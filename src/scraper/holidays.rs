//! Japanese national holidays (国民の祝日).
//!
//! Rules follow the Public Holiday Act as amended through 2019, valid for
//! 2000–2099: fixed dates, "Happy Monday" holidays, equinox days, the
//! 2019–2021 special arrangements, substitute holidays (振替休日) and
//! citizens' holidays (国民の休日). Facility closure days can be added on top.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

/// Holiday lookup with a per-year cache.
#[derive(Debug, Default)]
pub struct HolidayCalendar {
    extra: BTreeSet<NaiveDate>,
    cache: Mutex<HashMap<i32, BTreeSet<NaiveDate>>>,
}

impl HolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add non-statutory closure days (e.g. year-end closures) treated as holidays.
    pub fn with_extra_days(mut self, days: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.extra.extend(days);
        self
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        if self.extra.contains(&date) {
            return true;
        }
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache
            .entry(date.year())
            .or_insert_with(|| national_holidays(date.year()))
            .contains(&date)
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

/// The `n`th (1-based) Monday of a month.
fn nth_monday(year: i32, month: u32, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Mon, n)
}

/// Vernal and autumnal equinox days (1980–2099 approximation).
fn equinoxes(year: i32) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let y = f64::from(year - 1980);
    let leap_shift = f64::from((year - 1980) / 4);
    let vernal = (20.8431 + 0.242194 * y - leap_shift).floor() as u32;
    let autumnal = (23.2488 + 0.242194 * y - leap_shift).floor() as u32;
    (ymd(year, 3, vernal), ymd(year, 9, autumnal))
}

/// Holidays defined directly by law, before substitute/citizens' rules.
fn statutory_holidays(year: i32) -> BTreeSet<NaiveDate> {
    let mut days = Vec::new();
    let (vernal, autumnal) = equinoxes(year);

    days.push(ymd(year, 1, 1));
    days.push(nth_monday(year, 1, 2)); // 成人の日
    days.push(ymd(year, 2, 11));
    if year >= 2020 {
        days.push(ymd(year, 2, 23)); // 天皇誕生日
    }
    days.push(vernal);
    days.push(ymd(year, 4, 29));
    days.push(ymd(year, 5, 3));
    days.push(ymd(year, 5, 4));
    days.push(ymd(year, 5, 5));

    match year {
        2020 => days.extend([ymd(2020, 7, 23), ymd(2020, 7, 24), ymd(2020, 8, 10)]),
        2021 => days.extend([ymd(2021, 7, 22), ymd(2021, 7, 23), ymd(2021, 8, 8)]),
        _ => {
            days.push(nth_monday(year, 7, 3)); // 海の日
            if year >= 2016 {
                days.push(ymd(year, 8, 11)); // 山の日
            }
            days.push(nth_monday(year, 10, 2)); // スポーツの日
        }
    }

    days.push(nth_monday(year, 9, 3)); // 敬老の日
    days.push(autumnal);
    days.push(ymd(year, 11, 3));
    days.push(ymd(year, 11, 23));
    if year <= 2018 {
        days.push(ymd(year, 12, 23));
    }
    if year == 2019 {
        days.extend([ymd(2019, 5, 1), ymd(2019, 10, 22)]);
    }

    days.into_iter().flatten().collect()
}

/// Every national holiday of `year`, including substitute and citizens' holidays.
pub fn national_holidays(year: i32) -> BTreeSet<NaiveDate> {
    let base = statutory_holidays(year);
    let mut all = base.clone();

    // 振替休日: a holiday on Sunday moves to the next day that is not already a holiday.
    for day in &base {
        if day.weekday() == Weekday::Sun {
            let mut substitute = *day + Duration::days(1);
            while base.contains(&substitute) {
                substitute += Duration::days(1);
            }
            all.insert(substitute);
        }
    }

    // 国民の休日: an ordinary weekday sandwiched between two statutory holidays.
    for day in &base {
        let middle = *day + Duration::days(1);
        let next = *day + Duration::days(2);
        if base.contains(&next)
            && !all.contains(&middle)
            && middle.weekday() != Weekday::Sun
        {
            all.insert(middle);
        }
    }

    all
}
