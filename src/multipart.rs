use std::io;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use rand::RngExt;

use crate::error::Error;

const BOUNDARY_BYTES: usize = 30;
const OCTET_STREAM: &str = "application/octet-stream";

/// Storage capability used by [`Multipart::file`].
pub trait FileSource: Send + Sync {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads files from the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsFileSource;

impl FileSource for FsFileSource {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

#[derive(Clone, Debug)]
enum MultipartState {
    Open,
    Failed(Error),
    Consumed,
}

/// `multipart/form-data` body builder.
///
/// Parts are encoded as they are added. The first failure is kept and every later
/// call becomes a no-op; the request reports it when the body is materialized.
#[derive(Clone)]
pub struct Multipart {
    boundary: String,
    buffer: Vec<u8>,
    parts: usize,
    file_source: Arc<dyn FileSource>,
    state: MultipartState,
}

impl std::fmt::Debug for Multipart {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Multipart")
            .field("boundary", &self.boundary)
            .field("parts", &self.parts)
            .field("buffered_bytes", &self.buffer.len())
            .field("state", &self.state)
            .finish()
    }
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

impl Multipart {
    pub fn new() -> Self {
        Self {
            boundary: random_boundary(),
            buffer: Vec::new(),
            parts: 0,
            file_source: Arc::new(FsFileSource),
            state: MultipartState::Open,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn file_source(mut self, file_source: Arc<dyn FileSource>) -> Self {
        self.file_source = file_source;
        self
    }

    /// Adds a plain form field.
    pub fn param(mut self, name: &str, value: &str) -> Self {
        if self.is_open() {
            let disposition = format!("form-data; name=\"{}\"", escape_quotes(name));
            self.write_part(&disposition, None, value.as_bytes());
        }
        self
    }

    /// Adds a file read through the configured [`FileSource`]. The part's file
    /// name is the last component of `path`.
    pub fn file(self, field: &str, path: impl AsRef<Path>) -> Self {
        if !self.is_open() {
            return self;
        }
        let path = path.as_ref();
        let read = self.file_source.read_file(path);
        match read {
            Ok(data) => {
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string_lossy().into_owned());
                self.file_data(field, &filename, data)
            }
            Err(source) => self.fail(Error::MultipartFile {
                path: path.display().to_string(),
                source: Arc::new(source),
            }),
        }
    }

    /// Adds in-memory file contents as `application/octet-stream`.
    pub fn file_data(mut self, field: &str, filename: &str, data: impl AsRef<[u8]>) -> Self {
        if self.is_open() {
            let disposition = format!(
                "form-data; name=\"{}\"; filename=\"{}\"",
                escape_quotes(field),
                escape_quotes(filename)
            );
            self.write_part(&disposition, Some(OCTET_STREAM), data.as_ref());
        }
        self
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            MultipartState::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self.state, MultipartState::Consumed)
    }

    /// Closes the body and hands it out. The builder is unusable afterwards.
    pub(crate) fn materialize(&mut self) -> Result<(String, Bytes), Error> {
        self.check_usable()?;
        let mut body = std::mem::take(&mut self.buffer);
        self.write_closing(&mut body);
        self.state = MultipartState::Consumed;
        Ok((self.content_type(), Bytes::from(body)))
    }

    /// Same payload as [`Multipart::materialize`] without consuming the builder.
    pub(crate) fn preview(&self) -> Result<(String, Bytes), Error> {
        self.check_usable()?;
        let mut body = self.buffer.clone();
        self.write_closing(&mut body);
        Ok((self.content_type(), Bytes::from(body)))
    }

    fn check_usable(&self) -> Result<(), Error> {
        match &self.state {
            MultipartState::Open => Ok(()),
            MultipartState::Failed(error) => Err(error.clone()),
            MultipartState::Consumed => Err(Error::MultipartConsumed),
        }
    }

    fn is_open(&self) -> bool {
        matches!(self.state, MultipartState::Open)
    }

    fn fail(mut self, error: Error) -> Self {
        self.state = MultipartState::Failed(error);
        self
    }

    fn write_part(&mut self, disposition: &str, content_type: Option<&str>, data: &[u8]) {
        let delimiter = if self.parts == 0 {
            format!("--{}\r\n", self.boundary)
        } else {
            format!("\r\n--{}\r\n", self.boundary)
        };
        self.buffer.extend_from_slice(delimiter.as_bytes());
        self.buffer
            .extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
        if let Some(content_type) = content_type {
            self.buffer
                .extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        self.buffer.extend_from_slice(b"\r\n");
        self.buffer.extend_from_slice(data);
        self.parts += 1;
    }

    fn write_closing(&self, body: &mut Vec<u8>) {
        if self.parts > 0 {
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn random_boundary() -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut rng = rand::rng();
    let mut boundary = String::with_capacity(BOUNDARY_BYTES * 2);
    for _ in 0..BOUNDARY_BYTES {
        let byte: u8 = rng.random();
        boundary.push(HEX[(byte >> 4) as usize] as char);
        boundary.push(HEX[(byte & 0x0f) as usize] as char);
    }
    boundary
}
