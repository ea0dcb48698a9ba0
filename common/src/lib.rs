pub mod config;
pub mod errors;
pub mod http;
pub mod koji;
pub mod rpm;
pub mod utils;
