//! Parquet tables (polars).

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use polars::prelude::{Column, DataFrame, DataType, NamedFrom, ParquetWriter};

use divlab_core::domain::{FeatureRow, PriceBar};

/// Days since 1970-01-01, the physical representation of a polars `Date`.
fn epoch_days(date: NaiveDate) -> i32 {
    date.and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp()
        .div_euclid(86_400) as i32
}

fn date_column(name: &str, dates: impl Iterator<Item = NaiveDate>) -> Result<Column> {
    let days: Vec<i32> = dates.map(epoch_days).collect();
    Column::new(name.into(), days)
        .cast(&DataType::Date)
        .with_context(|| format!("Failed to cast {name} to Date"))
}

fn write_frame(path: &Path, mut df: DataFrame) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create parquet {}", path.display()))?;
    ParquetWriter::new(&mut file)
        .finish(&mut df)
        .with_context(|| format!("Failed to write parquet {}", path.display()))?;
    file.sync_all()?;
    Ok(())
}

pub fn price_history_frame(bars: &[PriceBar]) -> Result<DataFrame> {
    let tickers: Vec<&str> = bars.iter().map(|b| b.ticker.as_str()).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();
    let sources: Vec<&str> = bars.iter().map(|b| b.source.as_str()).collect();

    DataFrame::new(vec![
        Column::new("ticker".into(), tickers),
        date_column("date", bars.iter().map(|b| b.date))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("source".into(), sources),
    ])
    .context("Failed to build price history dataframe")
}

fn column<'a, T>(rows: &'a [FeatureRow], f: impl Fn(&'a FeatureRow) -> T) -> Vec<T> {
    rows.iter().map(f).collect()
}

pub fn features_frame(rows: &[FeatureRow]) -> Result<DataFrame> {
    let strs = |f: fn(&FeatureRow) -> &str| column(rows, f);
    let nums = |f: fn(&FeatureRow) -> f64| column(rows, f);
    let opts = |f: fn(&FeatureRow) -> Option<f64>| column(rows, f);
    let half_windows: Vec<u32> = column(rows, |r| r.half_window);

    DataFrame::new(vec![
        Column::new("event_id".into(), strs(|r| r.event_id.as_str())),
        Column::new("ticker".into(), strs(|r| r.ticker.as_str())),
        Column::new("market".into(), strs(|r| r.market.as_str())),
        Column::new("corp_name".into(), strs(|r| r.corp_name.as_str())),
        Column::new("sector".into(), strs(|r| r.sector.as_str())),
        date_column("filing_date", rows.iter().map(|r| r.filing_date))?,
        Column::new("dividend_type".into(), strs(|r| r.dividend_type.as_str())),
        Column::new("dividend_class".into(), strs(|r| r.dividend_class.as_str())),
        Column::new("amount_per_share".into(), nums(|r| r.amount_per_share)),
        Column::new("dividend_yield".into(), opts(|r| r.dividend_yield)),
        Column::new("total_amount".into(), opts(|r| r.total_amount)),
        Column::new("half_window".into(), half_windows),
        Column::new("coverage".into(), nums(|r| r.coverage)),
        Column::new("pre_return".into(), nums(|r| r.pre_return)),
        Column::new("post_return".into(), nums(|r| r.post_return)),
        Column::new("event_day_return".into(), opts(|r| r.event_day_return)),
        Column::new("pre_volatility".into(), nums(|r| r.pre_volatility)),
        Column::new("post_volatility".into(), nums(|r| r.post_volatility)),
        Column::new("volume_ratio".into(), opts(|r| r.volume_ratio)),
    ])
    .context("Failed to build features dataframe")
}

pub fn write_price_history_parquet(path: &Path, bars: &[PriceBar]) -> Result<()> {
    write_frame(path, price_history_frame(bars)?)
}

pub fn write_features_parquet(path: &Path, rows: &[FeatureRow]) -> Result<()> {
    write_frame(path, features_frame(rows)?)
}
