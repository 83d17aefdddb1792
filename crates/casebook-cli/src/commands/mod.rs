pub mod fund;
pub mod lbo;
pub mod time_value;
pub mod venture;
