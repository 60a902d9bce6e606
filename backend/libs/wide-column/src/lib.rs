//! Wide-column storage for relationship data
//!
//! Models declare a static [`Schema`]: an ordered list of row-key components
//! plus column fields grouped into column families. [`RowKeyCodec`] turns
//! records into byte-ordered row keys so that a prefix scan on the leading
//! components returns rows in a meaningful order (for example, a user's
//! followers newest first). [`WideColumnStore`] runs those operations against
//! any [`WideColumnBackend`].

pub mod codec;
pub mod error;
pub mod model;
pub mod schema;
pub mod store;

pub use codec::{Columns, DecodedKey, RowKeyCodec, INTEGER_WIDTH, SEPARATOR};
pub use error::{Result, WideColumnError};
pub use model::{RecordExt, WideColumnModel};
pub use schema::{FieldKind, FieldSpec, FieldValue, KeyOrder, Record, Schema};
pub use store::{InMemoryBackend, Row, TableNamespace, WideColumnBackend, WideColumnStore};
