//! Weather-history client and the daily-summary collector.
//!
//! The history API meters requests per key, so the client holds several keys
//! and rotates to the next on any failure. The collector walks the
//! experiment date range one day at a time, writing `date \t json` lines;
//! a second pass distills those lines into the daily weather TSV joined
//! into the feature table.

use crate::acquire::http::{BasicClient, HttpClient, fetch_json};
use crate::table::{TAB, Table};
use crate::timeutil::{self, DAY_FORMAT};
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{info, warn};

/// Dates travel in the API path compacted, e.g. `history_20140101`.
const API_DATE_FORMAT: &str = "%Y%m%d";
/// Collector input/output dates, e.g. `2014-01-01`.
const RANGE_FORMAT: &str = "%Y-%m-%d";

/// Daily-summary fields kept for the feature table, in output order.
static SUMMARY_COLUMNS: &[&str] = &[
    "mintempm",
    "maxtempm",
    "humidity",
    "snow",
    "snowdepthm",
    "meanpressurem",
    "meanwindspdm",
    "precipm",
    "rain",
];

pub struct WeatherClient {
    base_url: String,
    keys: Vec<String>,
    current: usize,
}

impl WeatherClient {
    /// Loads API keys from a JSON object of `account name -> key`.
    pub fn load(keys_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(keys_path)
            .with_context(|| format!("reading {}", keys_path.display()))?;
        let entries: BTreeMap<String, String> = serde_json::from_str(&content)?;
        let keys: Vec<String> = entries.into_values().collect();
        anyhow::ensure!(!keys.is_empty(), "no weather API keys configured");
        Ok(WeatherClient {
            base_url: "http://api.wunderground.com/api".to_string(),
            keys,
            current: 0,
        })
    }

    /// Advances to the next key (wrapping), for use after a failed request.
    pub fn rotate_key(&mut self) {
        self.current = (self.current + 1) % self.keys.len();
        info!(key_index = self.current, "switched to another weather API key");
    }

    fn history_url(&self, compact_date: &str, region: &str, city: &str) -> String {
        format!(
            "{}/{}/history_{}/q/{}/{}.json",
            self.base_url, self.keys[self.current], compact_date, region, city
        )
    }

    /// Fetches the daily summary object for one date.
    pub async fn daily_summary<C: HttpClient>(
        &self,
        http: &C,
        compact_date: &str,
        region: &str,
        city: &str,
    ) -> Result<Value> {
        let response = fetch_json(http, &self.history_url(compact_date, region, city)).await?;
        response["history"]["dailysummary"][0]
            .as_object()
            .map(|o| Value::Object(o.clone()))
            .with_context(|| format!("no daily summary for {compact_date}"))
    }
}

pub struct WeatherCollector {
    start_date: String,
    end_date: String,
}

impl WeatherCollector {
    /// Dates in `%Y-%m-%d`; the collected range is `[start, end)`.
    pub fn new(start_date: &str, end_date: &str) -> Self {
        WeatherCollector {
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
        }
    }

    /// Fetches one daily summary per date in the range, writing
    /// `date \t json` lines. A failed date rotates the key and moves on —
    /// the gap surfaces later as a missing weather row.
    pub async fn collect_period(
        &self,
        api: &mut WeatherClient,
        output: &Path,
        region: &str,
        city: &str,
    ) -> Result<()> {
        let http = BasicClient::new();
        let dates = timeutil::generate_dates(
            &self.start_date,
            &self.end_date,
            RANGE_FORMAT,
            API_DATE_FORMAT,
        )?;

        let mut file = std::fs::File::create(output)
            .with_context(|| format!("creating {}", output.display()))?;
        let mut collected = 0usize;
        for date in &dates {
            match api.daily_summary(&http, date, region, city).await {
                Ok(summary) => {
                    writeln!(file, "{date}\t{summary}")?;
                    collected += 1;
                }
                Err(e) => {
                    warn!(date = %date, error = %e, "weather fetch failed, rotating key");
                    api.rotate_key();
                }
            }
        }
        info!(collected, requested = dates.len(), "weather history collected");
        Ok(())
    }

    /// Distills the raw `date \t json` lines into the daily weather TSV.
    /// Trace precipitation is reported as `"T"`; it becomes a small epsilon
    /// so the column stays numeric.
    pub fn filter_weather(&self, input: &Path, output: &Path) -> Result<()> {
        let file = std::fs::File::open(input)
            .with_context(|| format!("opening {}", input.display()))?;

        let mut headers = vec!["observation_date_time".to_string()];
        headers.extend(SUMMARY_COLUMNS.iter().map(|c| c.to_string()));
        let mut table = Table::new(headers);

        for line in BufReader::new(file).lines() {
            let line = line?;
            let Some((date, json)) = line.split_once('\t') else {
                continue;
            };
            let summary: Value = serde_json::from_str(json)
                .with_context(|| format!("malformed weather record for {date}"))?;

            let day = timeutil::normalize_dt(date, API_DATE_FORMAT, DAY_FORMAT)
                .with_context(|| format!("malformed weather date {date}"))?;

            let mut row = vec![day];
            for column in SUMMARY_COLUMNS {
                let value = match &summary[*column] {
                    Value::Null => String::new(),
                    Value::String(s) if s == "T" => "0.001".to_string(),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                row.push(value);
            }
            table.push_row(row);
        }

        info!(days = table.len(), "weather data filtered");
        table.write(output, TAB)
    }
}
