//! # batchproc-types
//!
//! `batchproc-types` contains the configuration types of the
//! [batchproc](https://docs.rs/batchproc) batch dispatch engine.
use std::error::Error as StdError;
use std::fmt;

pub(crate) mod env_vars;

pub mod config;

pub use env_vars::BATCHPROC_PREFIX;

/// A generic error carrying a message.
///
/// Mostly returned when configuration values are invalid or could
/// not be read from the environment.
#[derive(Debug)]
pub struct Error(String);

impl Error {
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Self(msg.into())
    }

    pub fn from_error<E: StdError>(err: E) -> Self {
        Self(err.to_string())
    }

    pub fn boxed(self) -> Box<dyn StdError + Send + Sync> {
        Box::new(self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;

        Ok(())
    }
}

impl StdError for Error {}
