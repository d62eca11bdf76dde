//! Data loading
//!
//! Loads OHLCV bars from CSV files and merges per-symbol series into
//! time-ordered batches, the shape in which a host runtime hands data to the
//! strategy.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

use crate::config::Resolution;
use crate::strategy::BarBatch;
use crate::{Candle, Symbol};

/// Parse an RFC 3339 timestamp, or `%Y-%m-%d %H:%M:%S` assumed to be UTC
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .with_context(|| format!("Failed to parse datetime: {}", s))
}

fn parse_field(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64> {
    record
        .get(idx)
        .with_context(|| format!("Missing {} column", name))?
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse {}", name))
}

/// Load OHLCV data from a CSV file with a header row:
/// `datetime,open,high,low,close,volume`
///
/// Rows are returned in file order; zero-filled rows are kept and left to the
/// strategy to skip.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = parse_datetime(dt_str.trim())?;

        candles.push(Candle::new_unchecked(
            datetime,
            parse_field(&record, 1, "open")?,
            parse_field(&record, 2, "high")?,
            parse_field(&record, 3, "low")?,
            parse_field(&record, 4, "close")?,
            parse_field(&record, 5, "volume")?,
        ));
    }

    Ok(candles)
}

/// Load `{SYMBOL}_{resolution}.csv` for every symbol in `data_dir`.
///
/// Missing files are skipped with a warning; it is an error if no symbol
/// could be loaded at all.
pub fn load_multi_symbol(
    data_dir: impl AsRef<Path>,
    symbols: &[Symbol],
    resolution: Resolution,
) -> Result<HashMap<Symbol, Vec<Candle>>> {
    let mut data = HashMap::new();

    for symbol in symbols {
        let filename = format!("{}_{}.csv", symbol.as_str(), resolution.as_str());
        let path = data_dir.as_ref().join(&filename);

        if !path.exists() {
            warn!("Data file not found: {}", path.display());
            continue;
        }

        let candles =
            load_csv(&path).with_context(|| format!("Failed to load data for {}", symbol))?;

        info!("Loaded {} candles for {}", candles.len(), symbol);
        data.insert(symbol.clone(), candles);
    }

    if data.is_empty() {
        anyhow::bail!("No data loaded for any symbol");
    }

    Ok(data)
}

/// Merge per-symbol series into one batch per distinct timestamp within
/// `[from, to)`, in ascending time order.
pub fn into_batches(
    data: HashMap<Symbol, Vec<Candle>>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<BarBatch> {
    let mut batches: BTreeMap<DateTime<Utc>, BarBatch> = BTreeMap::new();

    for (symbol, candles) in data {
        for candle in candles {
            if candle.datetime < from || candle.datetime >= to {
                continue;
            }
            batches
                .entry(candle.datetime)
                .or_insert_with(|| BarBatch::new(candle.datetime))
                .insert(symbol.clone(), candle);
        }
    }

    batches.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::fs;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("donchian_breakout_data_{}", name));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn t(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn bar(hour: i64, close: f64) -> Candle {
        Candle::new_unchecked(t(hour), close, close, close, close, 1.0)
    }

    #[test]
    fn test_load_csv_both_timestamp_formats() {
        let dir = temp_dir("formats");
        let path = dir.join("BTCUSD_1h.csv");
        fs::write(
            &path,
            "datetime,open,high,low,close,volume\n\
             2024-01-01T00:00:00Z,100,110,90,105,12.5\n\
             2024-01-01 01:00:00,105,115,100,112,8\n",
        )
        .unwrap();

        let candles = load_csv(&path).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].datetime, t(0));
        assert_eq!(candles[0].volume, 12.5);
        assert_eq!(candles[1].datetime, t(1));
        assert_eq!(candles[1].close, 112.0);
    }

    #[test]
    fn test_load_csv_reports_bad_number() {
        let dir = temp_dir("bad_number");
        let path = dir.join("BAD_1h.csv");
        fs::write(
            &path,
            "datetime,open,high,low,close,volume\n2024-01-01T00:00:00Z,100,abc,90,105,1\n",
        )
        .unwrap();

        let err = load_csv(&path).unwrap_err();
        assert!(format!("{err:#}").contains("high"));
    }

    #[test]
    fn test_load_multi_symbol_skips_missing_files() {
        let dir = temp_dir("multi");
        fs::write(
            dir.join("ETHUSD_1h.csv"),
            "datetime,open,high,low,close,volume\n2024-01-01T00:00:00Z,10,11,9,10,1\n",
        )
        .unwrap();

        let symbols = vec![Symbol::new("ETHUSD"), Symbol::new("NOPEUSD")];
        let data = load_multi_symbol(&dir, &symbols, Resolution::Hour).unwrap();
        assert_eq!(data.len(), 1);
        assert!(data.contains_key(&Symbol::new("ETHUSD")));

        let none = load_multi_symbol(&dir, &[Symbol::new("NOPEUSD")], Resolution::Hour);
        assert!(none.is_err());
    }

    #[test]
    fn test_into_batches_groups_and_orders() {
        let btc = Symbol::new("BTCUSD");
        let eth = Symbol::new("ETHUSD");
        let mut data = HashMap::new();
        data.insert(btc.clone(), vec![bar(2, 3.0), bar(0, 1.0), bar(1, 2.0)]);
        data.insert(eth.clone(), vec![bar(1, 20.0), bar(3, 40.0)]);

        let batches = into_batches(data, t(0), t(3));

        let times: Vec<_> = batches.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![t(0), t(1), t(2)]);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[1].get(&eth).unwrap().close, 20.0);
        assert!(batches[2].get(&eth).is_none());
    }
}
