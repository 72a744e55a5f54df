pub mod factors;
pub mod templates;

pub use factors::{DataDomain, FactorInfo, FACTOR_CATALOG};
pub use templates::{ParamDomain, ParamSpec, StrategyTemplate};
