pub mod logger;
pub mod utils;
