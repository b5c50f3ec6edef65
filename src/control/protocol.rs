//! Control protocol framing.
//!
//! Requests are newline-separated text: an operation line (`get=1` or
//! `set=1`), then for `set` any number of `key=value` lines, ended by a
//! blank line. Every response ends with `errno=<code>` and a blank line.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const IPC_ERROR_IO: i64 = -(libc::EIO as i64);
pub const IPC_ERROR_PROTOCOL: i64 = -(libc::EPROTO as i64);
pub const IPC_ERROR_INVALID: i64 = -(libc::EINVAL as i64);

/// A parsed control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get,
    Set(Vec<(String, String)>),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("control connection I/O: {0}")]
    Io(#[from] io::Error),

    #[error("unknown operation {0:?}")]
    UnknownOperation(String),

    #[error("malformed line {0:?}")]
    Malformed(String),
}

impl ProtocolError {
    /// Code reported back to the client in the `errno=` line.
    pub fn errno(&self) -> i64 {
        match self {
            Self::Io(_) => IPC_ERROR_IO,
            Self::UnknownOperation(_) => IPC_ERROR_INVALID,
            Self::Malformed(_) => IPC_ERROR_PROTOCOL,
        }
    }
}

/// Read the next request. `Ok(None)` means the peer closed the connection.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let Some(op) = read_line(reader).await? else {
        return Ok(None);
    };

    match op.as_str() {
        "get=1" => {
            // Trailing blank line; EOF is tolerated.
            if let Some(line) = read_line(reader).await? {
                if !line.is_empty() {
                    return Err(ProtocolError::Malformed(line));
                }
            }
            Ok(Some(Request::Get))
        }
        "set=1" => {
            let mut pairs = Vec::new();
            while let Some(line) = read_line(reader).await? {
                if line.is_empty() {
                    break;
                }
                let (key, value) = line
                    .split_once('=')
                    .ok_or_else(|| ProtocolError::Malformed(line.clone()))?;
                pairs.push((key.to_string(), value.to_string()));
            }
            Ok(Some(Request::Set(pairs)))
        }
        _ => Err(ProtocolError::UnknownOperation(op)),
    }
}

/// Write `key=value` lines followed by the `errno` trailer.
pub async fn write_response<W>(
    writer: &mut W,
    pairs: &[(String, String)],
    errno: i64,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut out = String::new();
    for (key, value) in pairs {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out.push_str(&format!("errno={errno}\n\n"));
    writer.write_all(out.as_bytes()).await?;
    writer.flush().await
}

async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
    Ok(Some(trimmed.to_string()))
}
