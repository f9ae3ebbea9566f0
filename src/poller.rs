//! Continuous weather poller
//!
//! A simpler companion to the incremental ETL: every interval it fetches the
//! point forecast for a fixed list of coordinates and writes each hourly
//! value as a `weather` point. No caching and no change detection; a failing
//! location is logged and the loop moves on.

use crate::api::WeatherInfoSource;
use crate::config::{PollLocation, PollerConfig};
use crate::influx::TimeSeriesWriter;
use crate::models::{FieldValue, ForecastResponse, TimeSeriesPoint, parse_time_instant};
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Measurement name of every poller point
pub const WEATHER_MEASUREMENT: &str = "weather";

const SHUTDOWN_CHECK: Duration = Duration::from_millis(250);

pub struct Poller<S: WeatherInfoSource, W: TimeSeriesWriter> {
    source: S,
    writer: W,
    config: PollerConfig,
    shutdown: Arc<AtomicBool>,
}

impl<S: WeatherInfoSource, W: TimeSeriesWriter> Poller<S, W> {
    pub fn new(source: S, writer: W, config: PollerConfig, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            source,
            writer,
            config,
            shutdown,
        }
    }

    #[must_use]
    pub fn writer(&self) -> &W {
        &self.writer
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Poll until shutdown is requested, or for `max_rounds` rounds
    pub fn run(&mut self, max_rounds: Option<usize>) {
        let names: Vec<&str> = self.config.locations.iter().map(|l| l.name.as_str()).collect();
        info!(
            "Poller started. Interval: {}s | Locations: {:?}",
            self.config.interval_seconds, names
        );

        let mut rounds = 0;
        while !self.stopping() {
            self.poll_once();
            rounds += 1;
            if max_rounds.is_some_and(|max| rounds >= max) {
                break;
            }
            info!("Next poll in {}s", self.config.interval_seconds);
            self.sleep_interval();
        }
        info!("Poller stopped after {} rounds", rounds);
    }

    /// Poll every location once, returning the number of points written
    pub fn poll_once(&mut self) -> usize {
        let mut written = 0;
        let locations = self.config.locations.clone();

        for location in &locations {
            if self.stopping() {
                break;
            }
            match self.poll_location(location) {
                Ok(count) => {
                    info!("{}: {} points written", location.name, count);
                    written += count;
                }
                Err(e) => error!("{}: {}", location.name, e),
            }
        }
        written
    }

    fn poll_location(&mut self, location: &PollLocation) -> Result<usize> {
        let response = self.source.weather_info(location, &self.config.variables)?;
        let points = weather_points(&location.name, &response);
        if points.is_empty() {
            return Ok(0);
        }
        self.writer.write(&points)
    }

    fn sleep_interval(&self) {
        let deadline = Instant::now() + Duration::from_secs(self.config.interval_seconds);
        while !self.stopping() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SHUTDOWN_CHECK.min(deadline - now));
        }
    }
}

/// Points from the first feature of a `getWeatherInfo` response
#[must_use]
pub fn weather_points(location_name: &str, response: &ForecastResponse) -> Vec<TimeSeriesPoint> {
    let Some(feature) = response.features.first() else {
        warn!("No data for {}", location_name);
        return Vec::new();
    };

    let mut points = Vec::new();
    for day in &feature.properties.days {
        for variable in &day.variables {
            let variable_name = variable.name.clone().unwrap_or_default();
            for hourly in &variable.values {
                let (Some(raw_time), Some(value)) = (hourly.time_instant.as_deref(), &hourly.value)
                else {
                    continue;
                };
                let Some(timestamp) = parse_time_instant(raw_time) else {
                    warn!("Could not parse time '{}' for {}", raw_time, variable_name);
                    continue;
                };
                let Some(number) = value.as_f64() else {
                    warn!("Could not write {}={}", variable_name, value.to_text());
                    continue;
                };

                let tags = BTreeMap::from([
                    ("location".to_string(), location_name.to_string()),
                    ("variable".to_string(), variable_name.clone()),
                ]);
                let fields = BTreeMap::from([("value".to_string(), FieldValue::Float(number))]);
                points.extend(TimeSeriesPoint::new(WEATHER_MEASUREMENT, timestamp, tags, fields));
            }
        }
    }
    points
}
