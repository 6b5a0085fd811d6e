use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Size of the buffer a request is read into; reading stops once it is full.
pub const REQUEST_BUFFER_SIZE: usize = 8192;

/// Longest request path accepted on a request line.
pub const MAX_PATH_LEN: usize = 255;

/// What was read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `GET <path> HTTP/...`
    Get(String),
    /// Bytes arrived but none of them formed a GET request line.
    Unsupported,
    /// Nothing arrived before the client closed or the read timed out.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    NeedMore,
    Done,
}

/// Incremental scanner over the raw request bytes. Only the request line is
/// kept; header lines are consumed until the blank line that ends them.
pub struct RequestParser {
    buf: Box<[u8; REQUEST_BUFFER_SIZE]>,
    filled: usize,
    line_start: usize,
    pending_cr: bool,
    seen_line: bool,
    path: Option<String>,
}

impl RequestParser {
    pub fn new() -> Self {
        RequestParser {
            buf: Box::new([0; REQUEST_BUFFER_SIZE]),
            filled: 0,
            line_start: 0,
            pending_cr: false,
            seen_line: false,
            path: None,
        }
    }

    /// Free space for the next read.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    pub fn received(&self) -> usize {
        self.filled
    }

    /// Scans `n` freshly read bytes.
    pub fn advance(&mut self, n: usize) -> Progress {
        let start = self.filled;
        self.filled = (self.filled + n).min(REQUEST_BUFFER_SIZE);

        for i in start..self.filled {
            let byte = self.buf[i];
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    self.line_start = i + 1;
                    continue;
                }
            }

            if byte != b'\n' && byte != b'\r' {
                continue;
            }

            self.pending_cr = byte == b'\r';
            let line = &self.buf[self.line_start..i];
            self.line_start = i + 1;
            if line.is_empty() {
                if self.seen_line {
                    return Progress::Done;
                }
                continue;
            }

            self.seen_line = true;
            if let Some(path) = parse_request_line(line) {
                self.path = Some(path);
                return Progress::Done;
            }
        }

        if self.filled == REQUEST_BUFFER_SIZE {
            return Progress::Done;
        }
        Progress::NeedMore
    }

    pub fn finish(self) -> Request {
        match self.path {
            Some(path) => Request::Get(path),
            None if self.filled > 0 => Request::Unsupported,
            None => Request::Empty,
        }
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        RequestParser::new()
    }
}

/// Matches `GET <path> HTTP/...` and returns the path.
pub fn parse_request_line(line: &[u8]) -> Option<String> {
    let line = std::str::from_utf8(line).ok()?;
    let rest = line.strip_prefix("GET")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let mut parts = rest.split_whitespace();
    let path = parts.next()?;
    let version = parts.next()?;
    if !version.starts_with("HTTP/") || path.len() > MAX_PATH_LEN {
        return None;
    }
    Some(path.to_string())
}

/// Reads a request with `timeout` bounding every single read, so an idle
/// client can hold the serve loop for at most that long per read.
pub async fn read_request<R>(reader: &mut R, timeout: Duration) -> Request
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut parser = RequestParser::new();
    loop {
        let n = match tokio::time::timeout(timeout, reader.read(parser.spare_mut())).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!("request: read: {}", e);
                break;
            }
            Err(_) => {
                debug!("request: read timed out after {} bytes", parser.received());
                break;
            }
        };

        if n == 0 || parser.advance(n) == Progress::Done {
            break;
        }
    }

    parser.finish()
}
