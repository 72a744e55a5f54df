use crate::engines::evaluation::splitter::DataWindow;
use crate::functions::StrategyTemplate;
use crate::types::Parameters;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

/// One backtest request: a genome over a calendar window.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub genome_id: String,
    pub template: StrategyTemplate,
    pub parameters: Parameters,
    pub code: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl OracleRequest {
    pub fn window(&self) -> DataWindow {
        DataWindow::new(self.start, self.end)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("backtest failed: {0}")]
    Backtest(String),

    #[error("no market data for {start}..={end}")]
    NoData { start: NaiveDate, end: NaiveDate },

    #[error("strategy rejected: {0}")]
    Rejected(String),
}

/// Opaque scoring backend: market data plus backtest sandbox.
///
/// Implementations must be safe to call from several evaluator threads at
/// once. A call may be abandoned by the evaluator after its timeout.
pub trait ScoringOracle: Send + Sync {
    fn evaluate(&self, request: &OracleRequest) -> Result<BTreeMap<String, f64>, OracleError>;
}
