pub mod probe;

pub use probe::{
    ExtractRule, HttpTarget, IcmpTarget, ProbeGroup, ProbeItem, ProbeTarget, ProxyConfig,
    StatusRange, SuccessCriteria,
};
