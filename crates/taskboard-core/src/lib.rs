//! Embedded board document model.
//!
//! A board stores its whole list/task tree as one JSON document. This crate
//! owns the shape of that document ([`model`]), its conversion to and from
//! the stored text ([`codec`]), and the structural edits applied between a
//! decode and an encode ([`tree`]). Nothing here performs I/O.

pub mod codec;
pub mod error;
pub mod ids;
pub mod model;
pub mod tree;

pub use codec::{DecodeDiagnostics, DocumentCodec, DocumentDefect, TracingDiagnostics};
pub use error::TreeError;
pub use ids::{IdSource, RandomIds, SequentialIds};
pub use model::{List, Task};
pub use tree::TreeMutator;
