//! Body framing codecs: fixed Content-Length and chunked transfer encoding.

mod chunked;
mod content_length;
mod line;

pub use chunked::copy_chunked;
pub use chunked::ChunkedReader;
pub use chunked::ChunkedWriter;
pub use chunked::CHUNK_SIZE;
pub use content_length::ContentLengthReader;

pub(crate) use line::read_line;
