//! The bulk-move job subsystem: idempotency-key derivation, selection
//! resolution, the processing loop, and the size-based dispatch policy.

pub mod dispatch;
pub mod idempotency;
pub mod processor;
pub mod resolver;

pub use dispatch::{DispatchConfig, Dispatcher, SubmitError, SubmitRequest};
pub use idempotency::derive_idempotency_key;
pub use processor::{BulkMoveProcessor, ProcessError, ProcessorConfig};
pub use resolver::resolve_selection;
