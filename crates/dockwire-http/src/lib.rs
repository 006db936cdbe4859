//! Wire layer for the container engine API.
//!
//! HTTP/1.1 is spoken by hand over a unix socket, plain TCP or TLS. The crate
//! covers request writing, response head parsing, body framing (fixed length,
//! chunked, raw until close), failure classification, and the stdout/stderr
//! multiplexing used once attach or exec hijacks a connection.
//!
//! All I/O is blocking. One [`HttpExchange`] owns one connection and keeps at
//! most one request in flight.

#![deny(clippy::all)]

mod classify;
mod codec;
mod demux;
mod endpoint;
mod error;
mod exchange;
mod request;
mod response;
mod transport;

#[cfg(test)]
mod test_support;

pub use classify::classify;
pub use classify::ErrorDetail;
pub use codec::copy_chunked;
pub use codec::ChunkedReader;
pub use codec::ChunkedWriter;
pub use codec::ContentLengthReader;
pub use codec::CHUNK_SIZE;
pub use demux::encode_frame;
pub use demux::CopyStats;
pub use demux::Frame;
pub use demux::StdoutReader;
pub use demux::StreamDemultiplexer;
pub use demux::StreamId;
pub use demux::StreamMode;
pub use demux::HEADER_LEN;
pub use demux::MULTIPLEXED_CONTENT_TYPE;
pub use demux::RAW_CONTENT_TYPE;
pub use endpoint::Endpoint;
pub use endpoint::TlsContext;
pub use endpoint::DEFAULT_TCP_PORT;
pub use endpoint::DEFAULT_TLS_PORT;
pub use endpoint::DEFAULT_UNIX_SOCKET;
pub use error::ErrorCategory;
pub use error::FrameError;
pub use error::WireError;
pub use exchange::write_request;
pub use exchange::Hijacked;
pub use exchange::HttpExchange;
pub use exchange::JsonStream;
pub use exchange::Response;
pub use request::Body;
pub use request::Method;
pub use request::Request;
pub use request::JSON_CONTENT_TYPE;
pub use response::BodyFraming;
pub use response::Headers;
pub use response::ResponseHead;
pub use transport::Connection;

pub type Result<T> = std::result::Result<T, WireError>;
