pub mod base;
pub mod bedrock;
pub mod configs;
pub mod eventstream;
pub mod sigv4;

#[cfg(any(test, feature = "testing"))]
pub mod mock;
