#![allow(clippy::missing_errors_doc)]

pub mod conversion;
pub mod error;
pub mod fraction;
pub mod leverage_math;
pub mod obligation_order;
pub mod util;
