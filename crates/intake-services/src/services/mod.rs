#[cfg(feature = "clamav")]
pub mod clamav;
pub mod scanner;
