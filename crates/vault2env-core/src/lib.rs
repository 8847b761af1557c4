//! vault2env core - redaction of secrets in child process output
//!
//! Secrets handed to a child process as environment variables tend to show up
//! again in its output. This crate keeps them off the terminal: every byte the
//! child writes to stdout or stderr passes through a [`RedactingWriter`] that
//! replaces known secret values with a surrogate chosen by a
//! [`RedactionMode`], including values split across several reads.

pub mod error;
pub mod paths;
pub mod policy;
pub mod process;
pub mod writer;

pub use error::{PumpError, RedactError};
pub use paths::Paths;
pub use policy::{RedactionMode, ASTERISK_MASK};
pub use process::{exit_code, pump, run_redacted, RunOutcome, StreamKind};
pub use writer::{RedactingWriter, RedactionPair, Redactor, SecretMap};
