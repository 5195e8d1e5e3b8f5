//! The configuration DSL: typed review rules and report configs parsed from
//! YAML, with whitelist environment expansion, RuleBase inheritance, the
//! closed area taxonomy, and finding-schema composition.

pub mod areas;
pub mod env;
pub mod loader;
pub mod report;
pub mod rules;
pub mod schema;
pub mod validate;

pub use loader::{ReportConfigSet, RulesConfig};
pub use report::ReportConfig;
pub use rules::{ChannelConfig, ReviewRule, RuleBase};
