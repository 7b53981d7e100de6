mod helpers;
mod money;
mod rate;

pub mod op;
mod secret;

pub use helpers::{parse_boolean_flag, parse_list};
pub use money::{Money, MoneyConversionError, CURRENCY_CODE};
pub use rate::{Rate, RateConversionError, RATE_SCALE};
pub use secret::Secret;
