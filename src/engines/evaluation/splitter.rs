use crate::error::{ForgeError, Result};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Inclusive calendar window handed to the scoring oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DataWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of calendar days covered, 0 when `end < start`.
    pub fn days(&self) -> i64 {
        ((self.end - self.start).num_days() + 1).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.days() == 0
    }
}

/// Single data split (in-sample + out-of-sample)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSplit {
    pub in_sample: DataWindow,
    pub out_of_sample: DataWindow,
}

impl DataSplit {
    /// Window of the same length as the out-of-sample half, starting the
    /// day after it ends. Nothing inside the split has seen it.
    pub fn forward(&self) -> DataWindow {
        let start = self.out_of_sample.end + Duration::days(1);
        DataWindow::new(start, start + Duration::days(self.out_of_sample.days() - 1))
    }
}

pub trait DataSplitter: Send + Sync {
    fn split(&self, window: &DataWindow) -> Result<DataSplit>;

    /// Stable 16-hex-char identifier of `window` under this splitter.
    fn fingerprint(&self, window: &DataWindow) -> String;
}

/// One in-sample/out-of-sample split by calendar days.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleSplitter {
    in_sample_pct: f64,
}

impl SimpleSplitter {
    pub fn new(in_sample_pct: f64) -> Self {
        Self { in_sample_pct }
    }

    pub fn in_sample_pct(&self) -> f64 {
        self.in_sample_pct
    }
}

impl DataSplitter for SimpleSplitter {
    fn split(&self, window: &DataWindow) -> Result<DataSplit> {
        let total_days = window.days();
        let is_days = (total_days as f64 * self.in_sample_pct) as i64;

        if is_days == 0 || is_days >= total_days {
            return Err(ForgeError::Validation(format!(
                "Invalid split of {}..={}: in-sample size is 0 or leaves no out-of-sample days",
                window.start, window.end
            )));
        }

        let is_end = window.start + Duration::days(is_days - 1);
        let oos_start = is_end + Duration::days(1);

        Ok(DataSplit {
            in_sample: DataWindow::new(window.start, is_end),
            out_of_sample: DataWindow::new(oos_start, window.end),
        })
    }

    fn fingerprint(&self, window: &DataWindow) -> String {
        let key = format!("{}|{}|{:.6}", window.start, window.end, self.in_sample_pct);
        let digest = Sha256::digest(key.as_bytes());
        hex::encode(&digest[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_split_by_days() {
        let window = DataWindow::new(date(2020, 1, 1), date(2020, 1, 10));
        let split = SimpleSplitter::new(0.7).split(&window).unwrap();
        assert_eq!(split.in_sample, DataWindow::new(date(2020, 1, 1), date(2020, 1, 7)));
        assert_eq!(split.out_of_sample, DataWindow::new(date(2020, 1, 8), date(2020, 1, 10)));
        assert_eq!(split.forward(), DataWindow::new(date(2020, 1, 11), date(2020, 1, 13)));
    }

    #[test]
    fn test_degenerate_windows_rejected() {
        let single = DataWindow::new(date(2020, 1, 1), date(2020, 1, 1));
        assert!(SimpleSplitter::new(0.7).split(&single).is_err());

        let inverted = DataWindow::new(date(2020, 2, 1), date(2020, 1, 1));
        assert!(inverted.is_empty());
        assert!(SimpleSplitter::new(0.5).split(&inverted).is_err());
    }

    #[test]
    fn test_fingerprint() {
        let window = DataWindow::new(date(2020, 1, 1), date(2021, 1, 1));
        let a = SimpleSplitter::new(0.7).fingerprint(&window);
        assert_eq!(a.len(), 16);
        assert_eq!(a, SimpleSplitter::new(0.7).fingerprint(&window));
        assert_ne!(a, SimpleSplitter::new(0.6).fingerprint(&window));
        let other = DataWindow::new(date(2020, 1, 2), date(2021, 1, 1));
        assert_ne!(a, SimpleSplitter::new(0.7).fingerprint(&other));
    }
}
