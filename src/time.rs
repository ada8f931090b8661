//! Time coordinate decoded from per-timestep date strings

use crate::access::TokenTable;
use crate::derived::DerivedVariable;
use crate::error::{DcError, Result};
use crate::metadata::{GlobalAttributes, InitOptions};
use crate::storage::RawCollection;
use crate::types::{CoordVar, XType};
use crate::utils::{check_region, chars_to_string};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::future::try_join_all;
use ndarray::{ArrayD, IxDyn};
use std::sync::Arc;
use tracing::{debug, warn};

/// Accepted date layouts, model output format first
const TIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d_%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a date string into seconds since the Unix epoch, as UTC
pub fn parse_wrf_time(text: &str) -> Result<i64> {
    let text = text.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|t| t.and_utc().timestamp())
        .ok_or_else(|| DcError::MalformedTime(text.to_string()))
}

/// Logical-to-storage timestep mapping ordering steps by ascending time
///
/// Equal times keep their storage order.
pub fn time_lookup(seconds: &[i64]) -> Vec<usize> {
    let mut lookup: Vec<usize> = (0..seconds.len()).collect();
    lookup.sort_by_key(|&ts| seconds[ts]);
    lookup
}

async fn read_time_string(storage: &dyn RawCollection, var: &str, ts: usize) -> Result<String> {
    let token = storage.open_read(ts, var).await?;
    let chars = storage.read_chars(token).await;
    storage.close(token).await?;
    Ok(chars_to_string(&chars?))
}

/// Time coordinate computed from the character variable holding one
/// formatted date per timestep
///
/// Values are seconds since the epoch scaled by `P2SI`. A string that does
/// not parse fails the read of that timestep only.
pub struct WrfTimeCoordVar {
    storage: Arc<dyn RawCollection>,
    coord: CoordVar,
    times_var: String,
    p2si: f64,
    num_steps: usize,
    lookup: Vec<usize>,
    /// Scaled times in storage order, when every string parsed
    seconds: Option<Vec<f64>>,
    open: TokenTable<usize>,
}

impl WrfTimeCoordVar {
    /// Read every timestep's date string and build the time lookup
    pub async fn initialize(
        storage: Arc<dyn RawCollection>,
        options: &InitOptions,
        globals: &GlobalAttributes,
    ) -> Result<Self> {
        let times_var = options.times_var.as_str();
        match storage.xtype(times_var) {
            Some(XType::Char) => {}
            Some(other) => {
                return Err(DcError::InvalidCoordinateVariable(format!(
                    "{} has element type {}, expected character data",
                    times_var, other
                )))
            }
            None => return Err(DcError::NotFound(times_var.to_string())),
        }

        let num_steps = storage.num_time_steps();
        let strings = try_join_all(
            (0..num_steps).map(|ts| read_time_string(storage.as_ref(), times_var, ts)),
        )
        .await?;

        let parsed: Result<Vec<i64>> = strings.iter().map(|s| parse_wrf_time(s)).collect();
        let (lookup, seconds) = match parsed {
            Ok(secs) => {
                let scaled = secs.iter().map(|&s| s as f64 * globals.p2si).collect();
                (time_lookup(&secs), Some(scaled))
            }
            Err(e) => {
                warn!(variable = %times_var, error = %e, "unparsable time string, timesteps left unsorted");
                ((0..num_steps).collect(), None)
            }
        };
        debug!(variable = %options.time_coord, steps = num_steps, "time coordinate ready");

        let coord = CoordVar::new(
            options.time_coord.as_str(),
            "seconds",
            XType::Float,
            vec![false],
            3,
            Vec::new(),
            Some(options.time_dim.clone()),
        );

        Ok(Self {
            storage,
            coord,
            times_var: times_var.to_string(),
            p2si: globals.p2si,
            num_steps,
            lookup,
            seconds,
            open: TokenTable::default(),
        })
    }

    /// Storage timestep for each logical timestep
    pub fn lookup(&self) -> &[usize] {
        &self.lookup
    }

    /// Scaled times in logical (ascending) order at full precision
    pub fn times(&self) -> Option<Vec<f64>> {
        let seconds = self.seconds.as_ref()?;
        Some(self.lookup.iter().map(|&ts| seconds[ts]).collect())
    }
}

#[async_trait]
impl DerivedVariable for WrfTimeCoordVar {
    fn coord_var(&self) -> &CoordVar {
        &self.coord
    }

    fn dim_lens(&self) -> Vec<usize> {
        Vec::new()
    }

    fn exists(&self, ts: usize) -> bool {
        ts < self.num_steps
    }

    async fn open_read(&self, ts: usize) -> Result<u64> {
        if !self.exists(ts) {
            return Err(DcError::TimeStepOutOfRange {
                ts,
                count: self.num_steps,
            });
        }
        Ok(self.open.insert(ts))
    }

    async fn read_region(&self, token: u64, min: &[usize], max: &[usize]) -> Result<ArrayD<f32>> {
        let ts = self.open.get(token).ok_or(DcError::InvalidHandle(token))?;
        check_region(min, max, &[])?;

        let text = read_time_string(self.storage.as_ref(), &self.times_var, ts).await?;
        let seconds = parse_wrf_time(&text)? as f64 * self.p2si;
        Ok(ArrayD::from_elem(IxDyn(&[]), seconds as f32))
    }

    async fn close_variable(&self, token: u64) -> Result<()> {
        self.open
            .remove(token)
            .map(|_| ())
            .ok_or(DcError::InvalidHandle(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCollection;

    fn globals(p2si: f64) -> GlobalAttributes {
        GlobalAttributes {
            dx: 1.0,
            dy: 1.0,
            cen_lat: 0.0,
            cen_lon: 0.0,
            pole_lat: 90.0,
            pole_lon: 0.0,
            grav: 9.81,
            radius: 0.0,
            p2si,
        }
    }

    fn storage(times: &[&str]) -> Arc<dyn RawCollection> {
        let mut mc = MemoryCollection::new("Time")
            .with_dimension("Time", times.len())
            .with_dimension("DateStrLen", 19);
        mc.add_text_variable(
            "Times",
            &["Time", "DateStrLen"],
            times.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap();
        Arc::new(mc)
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!(parse_wrf_time("1970-01-01_00:01:00").unwrap(), 60);
        assert_eq!(parse_wrf_time("2005-08-29_12:00:00").unwrap(), 1125316800);
        assert_eq!(parse_wrf_time("2005-08-29 12:00:00\0").unwrap(), 1125316800);
        assert_eq!(parse_wrf_time("2005-08-29T12:00:00").unwrap(), 1125316800);
        assert!(matches!(
            parse_wrf_time("not a time"),
            Err(DcError::MalformedTime(_))
        ));
    }

    #[test]
    fn test_time_lookup_is_stable() {
        assert_eq!(time_lookup(&[30, 10, 20, 10]), vec![1, 3, 2, 0]);
        assert!(time_lookup(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_sorted_times() {
        let storage = storage(&[
            "2000-01-01_02:00:00",
            "2000-01-01_00:00:00",
            "2000-01-01_01:00:00",
        ]);
        let var = WrfTimeCoordVar::initialize(storage, &InitOptions::default(), &globals(1.0))
            .await
            .unwrap();
        assert_eq!(var.lookup(), &[1, 2, 0]);
        assert_eq!(
            var.times().unwrap(),
            vec![946684800.0, 946688400.0, 946692000.0]
        );
        assert_eq!(var.coord_var().units, "seconds");
        assert_eq!(var.coord_var().axis, 3);
        assert!(var.coord_var().time_varying);
    }

    #[tokio::test]
    async fn test_scaled_read() {
        let storage = storage(&["1970-01-01_00:01:00", "1970-01-01_00:02:00"]);
        let var = WrfTimeCoordVar::initialize(storage, &InitOptions::default(), &globals(0.5))
            .await
            .unwrap();
        let token = var.open_read(1).await.unwrap();
        let value = var.read_region(token, &[], &[]).await.unwrap();
        assert_eq!(value.ndim(), 0);
        assert_eq!(value[IxDyn(&[])], 60.0);
        var.close_variable(token).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_string_fails_read_only() {
        let storage = storage(&["2000-01-01_00:00:00", "garbage"]);
        let var = WrfTimeCoordVar::initialize(storage, &InitOptions::default(), &globals(1.0))
            .await
            .unwrap();
        assert_eq!(var.lookup(), &[0, 1]);
        assert!(var.times().is_none());

        let good = var.open_read(0).await.unwrap();
        assert!(var.read_region(good, &[], &[]).await.is_ok());
        let bad = var.open_read(1).await.unwrap();
        assert!(matches!(
            var.read_region(bad, &[], &[]).await,
            Err(DcError::MalformedTime(_))
        ));
        assert!(matches!(
            var.open_read(2).await,
            Err(DcError::TimeStepOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_times_variable() {
        let storage = storage(&["2000-01-01_00:00:00"]);
        let options = InitOptions::default().with_times_var("XTIME");
        assert!(matches!(
            WrfTimeCoordVar::initialize(storage, &options, &globals(1.0)).await,
            Err(DcError::NotFound(_))
        ));
    }
}
