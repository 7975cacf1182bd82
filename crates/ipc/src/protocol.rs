//! Line-oriented request/response codec.
//!
//! Requests are single lines: `<COMMAND> [arg]...` terminated by LF or CRLF.
//! Responses are zero or more data frames followed by one status line:
//!
//! ```text
//! VALUE <key> <flags> <bytes>\r\n
//! <bytes of payload>\r\n
//! END\r\n
//! ```

use maxcpu_core::{MaxcpuError, Result};
use std::fmt;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const CRLF: &[u8] = b"\r\n";

/// Longest request or status line accepted, terminator excluded.
pub const MAX_LINE: usize = 8 * 1024;

/// Largest data frame payload a reader will allocate for.
pub const MAX_VALUE: usize = 16 * 1024 * 1024;

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `GET <key>` or `GETS <key>`.
    Get { key: String },
    Version,
    Quit,
}

/// Parse one request line (terminator already stripped).
///
/// Command names are case-insensitive; keys are taken verbatim.
pub fn parse_command(line: &[u8]) -> Result<Command> {
    let line = std::str::from_utf8(line)
        .map_err(|e| MaxcpuError::Protocol(format!("request is not UTF-8: {e}")))?;

    let mut args = line.split_whitespace();
    let Some(name) = args.next() else {
        return Err(MaxcpuError::Protocol("no command".into()));
    };
    let args: Vec<&str> = args.collect();

    match name.to_ascii_uppercase().as_str() {
        "GET" | "GETS" => match args.as_slice() {
            [key] => Ok(Command::Get {
                key: (*key).to_string(),
            }),
            _ => Err(MaxcpuError::Protocol(format!(
                "get takes exactly one key, got {}",
                args.len()
            ))),
        },
        "VERSION" if args.is_empty() => Ok(Command::Version),
        "QUIT" if args.is_empty() => Ok(Command::Quit),
        "VERSION" | "QUIT" => Err(MaxcpuError::Protocol(format!("{name} takes no arguments"))),
        other => Err(MaxcpuError::Protocol(format!("unknown command: {other}"))),
    }
}

/// One `VALUE` data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub key:   String,
    pub flags: u32,
    pub data:  Vec<u8>,
}

impl Value {
    pub fn new(key: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            flags: 0,
            data,
        }
    }
}

/// Terminal line of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    End,
    NotFound,
    Version(String),
    Error,
}

impl Status {
    pub fn parse(line: &str) -> Result<Self> {
        match line {
            "END" => Ok(Status::End),
            "NOT_FOUND" => Ok(Status::NotFound),
            "ERROR" => Ok(Status::Error),
            _ => line
                .strip_prefix("VERSION ")
                .map(|v| Status::Version(v.to_string()))
                .ok_or_else(|| MaxcpuError::Protocol(format!("unexpected response: {line}"))),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::End => f.write_str("END"),
            Status::NotFound => f.write_str("NOT_FOUND"),
            Status::Version(v) => write!(f, "VERSION {v}"),
            Status::Error => f.write_str("ERROR"),
        }
    }
}

/// Everything written back for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub values: Vec<Value>,
    pub status: Status,
}

impl Reply {
    pub fn status(status: Status) -> Self {
        Self {
            values: Vec::new(),
            status,
        }
    }

    pub fn value(value: Value) -> Self {
        Self {
            values: vec![value],
            status: Status::End,
        }
    }
}

/// Read one line, without its LF / CRLF terminator.
///
/// Returns `Ok(None)` at end of stream. A final line without terminator is
/// still returned; a line longer than [`MAX_LINE`] is an error.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE as u64 + 2)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    if buf.len() > MAX_LINE {
        return Err(MaxcpuError::Protocol(format!(
            "line exceeds {MAX_LINE} bytes"
        )));
    }
    Ok(Some(buf))
}

/// Parse the part of a data frame header after `VALUE `.
pub fn parse_value_header(header: &str) -> Result<(String, u32, usize)> {
    let fields: Vec<&str> = header.split_whitespace().collect();
    let [key, flags, len, ..] = fields.as_slice() else {
        return Err(MaxcpuError::Protocol(format!("short VALUE header: {header}")));
    };

    let flags = flags
        .parse::<u32>()
        .map_err(|e| MaxcpuError::Protocol(format!("bad flags '{flags}': {e}")))?;
    let len = len
        .parse::<usize>()
        .map_err(|e| MaxcpuError::Protocol(format!("bad byte length '{len}': {e}")))?;
    if len > MAX_VALUE {
        return Err(MaxcpuError::Protocol(format!("value of {len} bytes is too large")));
    }

    Ok(((*key).to_string(), flags, len))
}

async fn read_value_body<R>(reader: &mut R, len: usize) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = vec![0u8; len + CRLF.len()];
    reader.read_exact(&mut buf).await?;
    if !buf.ends_with(CRLF) {
        return Err(MaxcpuError::Protocol(
            "value payload not terminated by CRLF".into(),
        ));
    }
    buf.truncate(len);
    Ok(buf)
}

/// Read data frames up to and including the terminal status line.
pub async fn read_response<R>(reader: &mut R) -> Result<(Vec<Value>, Status)>
where
    R: AsyncBufRead + Unpin,
{
    let mut values = Vec::new();
    loop {
        let line = read_line(reader)
            .await?
            .ok_or_else(|| MaxcpuError::from(io::Error::from(io::ErrorKind::UnexpectedEof)))?;
        let line = std::str::from_utf8(&line)
            .map_err(|e| MaxcpuError::Protocol(format!("response is not UTF-8: {e}")))?;

        if let Some(header) = line.strip_prefix("VALUE ") {
            let (key, flags, len) = parse_value_header(header)?;
            let data = read_value_body(reader, len).await?;
            values.push(Value { key, flags, data });
            continue;
        }

        return Ok((values, Status::parse(line)?));
    }
}

pub async fn write_value<W>(writer: &mut W, value: &Value) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("VALUE {} {} {}\r\n", value.key, value.flags, value.data.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&value.data).await?;
    writer.write_all(CRLF).await
}

pub async fn write_status<W>(writer: &mut W, status: &Status) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(status.to_string().as_bytes()).await?;
    writer.write_all(CRLF).await?;
    writer.flush().await
}

/// Write all frames of `reply`, its status line, and flush.
pub async fn write_reply<W>(writer: &mut W, reply: &Reply) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for value in &reply.values {
        write_value(writer, value).await?;
    }
    write_status(writer, &reply.status).await
}

/// Write a request line.
pub async fn write_request<W>(writer: &mut W, request: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(request.as_bytes()).await?;
    writer.write_all(CRLF).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_get_and_gets_alias() {
        let get = parse_command(b"GET stats").unwrap();
        assert_eq!(get, Command::Get { key: "stats".into() });
        assert_eq!(parse_command(b"gets stats").unwrap(), get);
        assert_eq!(parse_command(b"  Get   stats  ").unwrap(), get);
    }

    #[test]
    fn parse_version_and_quit() {
        assert_eq!(parse_command(b"version").unwrap(), Command::Version);
        assert_eq!(parse_command(b"QUIT").unwrap(), Command::Quit);
    }

    #[test]
    fn get_requires_exactly_one_key() {
        assert!(parse_command(b"GET").is_err());
        assert!(parse_command(b"GET a b").is_err());
    }

    #[test]
    fn unknown_and_empty_commands_are_rejected() {
        assert!(matches!(parse_command(b"SET x"), Err(MaxcpuError::Protocol(_))));
        assert!(matches!(parse_command(b""), Err(MaxcpuError::Protocol(_))));
        assert!(matches!(parse_command(b"VERSION now"), Err(MaxcpuError::Protocol(_))));
        assert!(matches!(parse_command(&[0xff, 0xfe]), Err(MaxcpuError::Protocol(_))));
    }

    #[test]
    fn status_lines_parse() {
        assert_eq!(Status::parse("END").unwrap(), Status::End);
        assert_eq!(Status::parse("NOT_FOUND").unwrap(), Status::NotFound);
        assert_eq!(Status::parse("ERROR").unwrap(), Status::Error);
        assert_eq!(
            Status::parse("VERSION 0.1.0").unwrap(),
            Status::Version("0.1.0".into())
        );
        assert!(Status::parse("STORED").is_err());
    }

    #[tokio::test]
    async fn value_frame_layout() {
        let mut out = Vec::new();
        write_reply(&mut out, &Reply::value(Value::new("hello", b"{}".to_vec())))
            .await
            .unwrap();
        assert_eq!(out, b"VALUE hello 0 2\r\n{}\r\nEND\r\n");
    }

    #[tokio::test]
    async fn frames_round_trip_payload_sizes() {
        for len in [0usize, 1, 4096] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let reply = Reply::value(Value::new("blob", data.clone()));

            let mut wire = Vec::new();
            write_reply(&mut wire, &reply).await.unwrap();

            let mut reader = wire.as_slice();
            let (values, status) = read_response(&mut reader).await.unwrap();
            assert_eq!(status, Status::End);
            assert_eq!(values.len(), 1);
            assert_eq!(values[0].data.len(), len);
            assert_eq!(values[0].data, data);
            assert!(reader.is_empty());
        }
    }

    #[tokio::test]
    async fn payload_may_contain_crlf() {
        let data = b"a\r\nEND\r\nb".to_vec();
        let mut wire = Vec::new();
        write_reply(&mut wire, &Reply::value(Value::new("k", data.clone())))
            .await
            .unwrap();

        let (values, _) = read_response(&mut wire.as_slice()).await.unwrap();
        assert_eq!(values[0].data, data);
    }

    #[tokio::test]
    async fn read_line_strips_both_terminators() {
        let mut input: &[u8] = b"GET a\r\nVERSION\nQUIT";
        assert_eq!(read_line(&mut input).await.unwrap().unwrap(), b"GET a");
        assert_eq!(read_line(&mut input).await.unwrap().unwrap(), b"VERSION");
        assert_eq!(read_line(&mut input).await.unwrap().unwrap(), b"QUIT");
        assert!(read_line(&mut input).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overlong_line_is_rejected() {
        let long = vec![b'A'; MAX_LINE + 10];
        let mut input = long.as_slice();
        assert!(matches!(
            read_line(&mut input).await,
            Err(MaxcpuError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn truncated_value_is_an_error() {
        let mut input: &[u8] = b"VALUE k 0 10\r\nabc";
        assert!(read_response(&mut input).await.is_err());
    }

    #[test]
    fn value_header_rejects_bad_length() {
        assert!(parse_value_header("k 0 -1").is_err());
        assert!(parse_value_header("k 0").is_err());
        assert!(parse_value_header(&format!("k 0 {}", MAX_VALUE + 1)).is_err());
        assert_eq!(parse_value_header("k 3 12").unwrap(), ("k".to_string(), 3, 12));
    }
}
