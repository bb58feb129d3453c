// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! verge-runtime: the runtime facade tying the bus, deployment manager,
//! VM, and log store together behind one entry point, plus the ambient
//! config/logging/error-aggregation stack every embedding binary needs.

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    apply_env_overrides, coerce_bool, coerce_list, default_schema, BusSection, ConfigError,
    DurabilityMode, EnvOverride, EventLoopSection, LogSection, ParseError, RequestSection,
    RuntimeConfig, VmSection,
};
pub use error::RuntimeError;
pub use logging::init_logging;
pub use runtime::Runtime;
