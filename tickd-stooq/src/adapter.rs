//! Stooq CSV download and normalization.

use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tickd_core::TickdError;
use tickd_types::DailyBar;
use url::Url;

/// Public stooq download endpoint.
pub const DEFAULT_BASE_URL: &str = "https://stooq.com";

/// Map a canonical symbol to stooq's ticker convention: lowercase, with a
/// `.us` market suffix when the symbol carries none.
#[must_use]
pub fn stooq_symbol(canonical: &str) -> String {
    let lower = canonical.to_ascii_lowercase();
    if lower.contains('.') {
        lower
    } else {
        format!("{lower}.us")
    }
}

/// Build the CSV download URL for a symbol and inclusive date range.
///
/// # Errors
/// `InvalidArg` when the base URL does not parse.
pub fn download_url(
    base_url: &str,
    canonical: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Url, TickdError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| TickdError::InvalidArg(format!("bad stooq base url: {e}")))?;
    url.set_path("/q/d/l/");
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("s", &stooq_symbol(canonical));
        pairs.append_pair("i", "d");
        if let Some(d) = from {
            pairs.append_pair("d1", &d.format("%Y%m%d").to_string());
        }
        if let Some(d) = to {
            pairs.append_pair("d2", &d.format("%Y%m%d").to_string());
        }
    }
    Ok(url)
}

/// Fetch one symbol's daily CSV and normalize it.
pub async fn fetch_daily_csv(
    client: &reqwest::Client,
    base_url: &str,
    canonical: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    timeout: Duration,
) -> Result<Vec<DailyBar>, TickdError> {
    let url = download_url(base_url, canonical, from, to)?;
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| TickdError::Io(format!("stooq request failed: {e}")))?;

    let status = response.status();
    if status.as_u16() == 404 {
        return Err(TickdError::not_found(format!("daily bars for {canonical}")));
    }
    if !status.is_success() {
        return Err(TickdError::Http {
            status: status.as_u16(),
            msg: format!("stooq returned {status} for {canonical}"),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| TickdError::Io(format!("stooq body read failed: {e}")))?;
    parse_daily_csv(canonical, &body)
}

/// Parse stooq's `Date,Open,High,Low,Close,Volume` CSV into ascending,
/// deduplicated daily bars. Rows that fail to parse are skipped; a body
/// with no parseable rows maps to `NotFound` (stooq answers unknown
/// symbols with a stub body rather than an error status).
pub fn parse_daily_csv(canonical: &str, body: &str) -> Result<Vec<DailyBar>, TickdError> {
    let mut bars: Vec<DailyBar> = Vec::new();
    for line in body.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut cols = line.split(',');
        let (Some(date), Some(open), Some(high), Some(low), Some(close)) = (
            cols.next(),
            cols.next(),
            cols.next(),
            cols.next(),
            cols.next(),
        ) else {
            continue;
        };
        let volume = cols.next().unwrap_or("0");

        let Ok(session) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
            continue;
        };
        let (Ok(open), Ok(high), Ok(low), Ok(close)) = (
            Decimal::from_str(open),
            Decimal::from_str(high),
            Decimal::from_str(low),
            Decimal::from_str(close),
        ) else {
            continue;
        };
        let volume = Decimal::from_str(volume).unwrap_or(Decimal::ZERO);

        bars.push(DailyBar {
            session,
            open,
            high,
            low,
            close,
            volume,
            adjusted_close: None,
        });
    }

    if bars.is_empty() {
        return Err(TickdError::not_found(format!("daily bars for {canonical}")));
    }

    bars.sort_by_key(|b| b.session);
    bars.dedup_by_key(|b| b.session);
    Ok(bars)
}
