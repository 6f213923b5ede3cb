//! Communication with the external coordinator.
//!
//! The coordinator hands out a task definition and nonce ranges, and consumes
//! range requests and result reports. Messages travel as newline-delimited
//! JSON over stdio or TCP; see [`messages`] for their shapes.
//!
//! The link and the executor run as separate tasks joined by two channels:
//!
//! ```text
//!   wire --> CoordinatorLink --inbox--> Executor
//!   wire <-- CoordinatorLink <-outbox-- Executor
//! ```

mod codec;
mod error;
mod link;
pub mod messages;

pub use codec::{MessageCodec, MAX_LINE_LENGTH};
pub use error::{LinkError, LinkResult, MessageError};
pub use link::{CoordinatorLink, Endpoint};
pub use messages::{CoordinatorMessage, ResultReport, ResultState, WorkerMessage};
