use super::traits::ConfigSection;
use crate::engines::evaluation::splitter::{DataSplitter, DataWindow, SimpleSplitter};
use crate::error::{ForgeError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Share of the window, by calendar days, used in-sample.
    pub in_sample_pct: f64,
    /// Fresh window for re-validating a probationary champion.
    pub holdout_start: Option<NaiveDate>,
    pub holdout_end: Option<NaiveDate>,
    pub concurrency_limit: usize,
    pub oracle_timeout_ms: u64,
    pub max_retries: usize,
    /// Metric that measures trading activity; zero or less marks a result degenerate.
    pub activity_metric: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or_default(),
            in_sample_pct: 0.7,
            holdout_start: None,
            holdout_end: None,
            concurrency_limit: 4,
            oracle_timeout_ms: 30_000,
            max_retries: 2,
            activity_metric: "trade_count".to_string(),
        }
    }
}

impl EvaluationConfig {
    pub fn window(&self) -> DataWindow {
        DataWindow::new(self.start_date, self.end_date)
    }

    pub fn splitter(&self) -> SimpleSplitter {
        SimpleSplitter::new(self.in_sample_pct)
    }

    pub fn holdout(&self) -> Option<DataWindow> {
        match (self.holdout_start, self.holdout_end) {
            (Some(start), Some(end)) => Some(DataWindow::new(start, end)),
            _ => None,
        }
    }

    /// Fresh data for re-validating a probationary champion: the holdout
    /// window when configured, otherwise a forward window past `end_date`
    /// as long as the out-of-sample half.
    pub fn revalidation_window(&self) -> Result<DataWindow> {
        match self.holdout() {
            Some(holdout) => Ok(holdout),
            None => Ok(self.splitter().split(&self.window())?.forward()),
        }
    }
}

impl ConfigSection for EvaluationConfig {
    fn section_name() -> &'static str {
        "evaluation"
    }

    fn validate(&self) -> Result<()> {
        if self.in_sample_pct <= 0.0 || self.in_sample_pct >= 1.0 {
            return Err(ForgeError::Configuration(
                "In-sample share must be between 0 and 1".to_string(),
            ));
        }
        self.splitter().split(&self.window())?;

        match (self.holdout_start, self.holdout_end) {
            (Some(start), Some(end)) if start > end => {
                return Err(ForgeError::Configuration(format!(
                    "Holdout window starts {} after it ends {}",
                    start, end
                )));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(ForgeError::Configuration(
                    "Holdout window needs both a start and an end date".to_string(),
                ));
            }
            _ => {}
        }

        if self.concurrency_limit == 0 {
            return Err(ForgeError::Configuration(
                "Concurrency limit must be at least 1".to_string(),
            ));
        }
        if self.oracle_timeout_ms == 0 {
            return Err(ForgeError::Configuration(
                "Oracle timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sub_window_is_rejected() {
        let mut config = EvaluationConfig::default();
        assert!(config.validate().is_ok());

        config.end_date = config.start_date;
        config.in_sample_pct = 0.99;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_half_open_holdout_is_rejected() {
        let mut config = EvaluationConfig::default();
        config.holdout_start = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert!(config.validate().is_err());
        config.holdout_end = NaiveDate::from_ymd_opt(2024, 6, 30);
        assert!(config.validate().is_ok());
        assert!(config.holdout().is_some());
        assert_eq!(config.revalidation_window().unwrap(), config.holdout().unwrap());
    }

    #[test]
    fn test_default_revalidation_window_lies_after_the_evaluation_window() {
        let config = EvaluationConfig::default();
        let split = config.splitter().split(&config.window()).unwrap();
        let fresh = config.revalidation_window().unwrap();

        assert!(fresh.start > config.end_date);
        assert_eq!(fresh.days(), split.out_of_sample.days());
    }
}
