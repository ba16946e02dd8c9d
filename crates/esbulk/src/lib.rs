//! 🛻 esbulk — a bulk-ingestion client for Elasticsearch-compatible servers.
//!
//! Three layers, bottom to top:
//!
//! - [`encoder`]: turns documents into the NDJSON bodies the `_bulk`
//!   endpoint expects, plain or gzip-compressed.
//! - [`reader`] and [`bulk`]: wire types for the request side and a
//!   streaming walker for the response side that extracts each item's
//!   status without deserializing the whole body.
//! - [`connection`] and [`pool`]: one HTTP endpoint per [`Connection`],
//!   round-robin failover across several via [`ConnectionPool`].
//!
//! ```no_run
//! use esbulk::{BulkAction, BulkMeta, Connection, ConnectionConfig, Doc};
//! use std::collections::HashMap;
//!
//! # async fn demo() -> Result<(), esbulk::ClientError> {
//! let mut conn = Connection::new(ConnectionConfig {
//!     url: "http://localhost:9200".into(),
//!     ..ConnectionConfig::default()
//! })?;
//! conn.connect().await?;
//!
//! let docs = vec![
//!     Doc::Action(BulkAction::Index(BulkMeta::new("logs"))),
//!     Doc::Json(serde_json::json!({"message": "hello"})),
//! ];
//! let (status, result) = conn.bulk("logs", None, &HashMap::new(), &docs).await?;
//! # let _ = (status, result);
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod connection;
pub mod encoder;
pub mod pool;
pub mod reader;
pub mod transport;

pub use bulk::{read_item_status, read_to_items, BulkAction, BulkMeta, BulkResult, ResponseError};
pub use connection::{ClientError, Connection, ConnectionConfig};
pub use encoder::{BodyEncoder, Doc, Encoder, Event};
pub use pool::ConnectionPool;
pub use reader::{JsonReader, ReadError, Token};
pub use transport::TransportConfig;
