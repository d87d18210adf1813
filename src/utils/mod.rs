pub mod file_detection;
pub mod paths;
pub mod test_helpers;
pub mod tokens;
