//! Daily lottery planning.

use super::{Lottery, LotteryError};
use crate::store::LotteryStore;
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Kind of the lottery planned for every calendar day.
pub const DAILY_KIND: &str = "daily";

/// Seconds between midnight and the lottery start.
const START_DELAY_SECS: i64 = 1;

/// Ensures a daily lottery exists for `day` (UTC).
///
/// The lottery collects leaves created from 00:00:00 up to the last
/// nanosecond before midnight and starts at 00:00:01 the next day. Returns
/// the lottery and whether this call created it.
pub fn plan_daily_lottery(
    store: &dyn LotteryStore,
    day: NaiveDate,
) -> Result<(Lottery, bool), LotteryError> {
    let period_start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
    let next_midnight = period_start + Duration::days(1);
    let period_end = next_midnight - Duration::nanoseconds(1);

    if let Some(existing) = store.find_lottery(DAILY_KIND, period_start, period_end)? {
        return Ok((existing, false));
    }

    let start_time = next_midnight + Duration::seconds(START_DELAY_SECS);
    let lottery = store.create_lottery(Lottery::new(
        DAILY_KIND,
        start_time,
        period_start,
        period_end,
    ))?;
    tracing::info!(lottery = lottery.id, %day, start = %start_time, "Daily lottery planned");
    Ok((lottery, true))
}
