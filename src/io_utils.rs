//! File plumbing for imports and exports.
//!
//! Imports are read whole and decoded with `encoding_rs` (BOM sniffed and
//! stripped, malformed input rejected). Exports can be transcoded to any
//! WHATWG encoding on the way out. The `-` path routes through stdin/stdout.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::error::InventoryError;

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Rejects uploads that are not `.csv` files. stdin is accepted as-is.
pub fn ensure_csv_path(path: &Path) -> Result<(), InventoryError> {
    if is_dash(path) {
        return Ok(());
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Ok(()),
        _ => Err(InventoryError::NotCsv(path.to_path_buf())),
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if is_dash(path) {
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("Reading CSV from stdin")?;
    } else {
        bytes = fs::read(path).with_context(|| format!("Opening input file {path:?}"))?;
    }
    Ok(bytes)
}

/// Decodes `bytes`, stripping any byte-order mark. Malformed input is an
/// [`InventoryError::Encoding`].
pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String, InventoryError> {
    let (text, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(InventoryError::Encoding(actual.name()))
    } else {
        Ok(text.into_owned())
    }
}

/// Reads and decodes an import file. When `fallback` is set and the primary
/// encoding fails, the bytes are decoded with the fallback instead.
pub fn read_text(
    path: &Path,
    encoding: &'static Encoding,
    fallback: Option<&'static Encoding>,
) -> Result<String> {
    let bytes = read_bytes(path)?;
    match (decode_bytes(&bytes, encoding), fallback) {
        (Ok(text), _) => Ok(text),
        (Err(err), Some(fallback)) => {
            debug!("{err}; retrying {path:?} as {}", fallback.name());
            Ok(decode_bytes(&bytes, fallback)?)
        }
        (Err(err), None) => Err(err.into()),
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, flexible: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(flexible);
    builder.from_reader(reader)
}

/// Opens `path` (or stdout for `None`/`-`) for writing, transcoding from
/// UTF-8 when another encoding is requested.
pub fn open_output(path: Option<&Path>, encoding: &'static Encoding) -> Result<Box<dyn Write>> {
    let base: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(io::stdout()),
    };
    if encoding == UTF_8 {
        Ok(base)
    } else {
        Ok(Box::new(TranscodingWriter::new(base, encoding)))
    }
}

pub fn write_text(path: Option<&Path>, text: &str, encoding: &'static Encoding) -> Result<()> {
    let mut writer = open_output(path, encoding)?;
    writer
        .write_all(text.as_bytes())
        .and_then(|_| writer.flush())
        .with_context(|| format!("Writing {}", describe_output(path)))
}

pub fn describe_output(path: Option<&Path>) -> String {
    match path {
        Some(p) if !is_dash(p) => format!("{p:?}"),
        _ => "stdout".to_string(),
    }
}

struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    buffer: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            buffer: Vec::new(),
        }
    }

    // Encodes the longest valid UTF-8 prefix; a trailing partial sequence
    // waits for the next write unless `force` is set.
    fn drain_buffer(&mut self, force: bool) -> io::Result<()> {
        let valid_up_to = match std::str::from_utf8(&self.buffer) {
            Ok(_) => self.buffer.len(),
            Err(err) if err.error_len().is_some() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Invalid UTF-8 sequence in output stream",
                ));
            }
            Err(err) => err.valid_up_to(),
        };
        if valid_up_to > 0 {
            let pending: Vec<u8> = self.buffer.drain(..valid_up_to).collect();
            let text = String::from_utf8(pending)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.encode_and_write(&text)?;
        }
        if force && !self.buffer.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Incomplete UTF-8 sequence at end of output stream",
            ));
        }
        Ok(())
    }

    fn encode_and_write(&mut self, text: &str) -> io::Result<()> {
        let (encoded, _, had_errors) = self.encoding.encode(text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to encode text using {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(encoded.as_ref())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.drain_buffer(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain_buffer(true)?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn decode_strips_bom_and_rejects_invalid_utf8() {
        let text = decode_bytes(b"\xEF\xBB\xBFservice,engine\n", UTF_8).unwrap();
        assert_eq!(text, "service,engine\n");
        assert!(matches!(
            decode_bytes(b"caf\xE9", UTF_8),
            Err(InventoryError::Encoding(_))
        ));
    }

    #[test]
    fn read_text_uses_fallback_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.csv");
        fs::write(&path, b"AccountID,Owner\n1,Jos\xE9\n").unwrap();
        assert!(read_text(&path, UTF_8, None).is_err());
        let text = read_text(&path, UTF_8, Some(WINDOWS_1252)).unwrap();
        assert!(text.contains("José"));
    }

    #[test]
    fn csv_extension_is_required() {
        assert!(ensure_csv_path(Path::new("inventory.CSV")).is_ok());
        assert!(ensure_csv_path(Path::new("-")).is_ok());
        assert!(matches!(
            ensure_csv_path(Path::new("inventory.xlsx")),
            Err(InventoryError::NotCsv(_))
        ));
    }

    #[test]
    fn transcoding_writer_encodes_split_sequences() {
        let mut out = Vec::new();
        {
            let mut writer = TranscodingWriter::new(&mut out, WINDOWS_1252);
            let bytes = "José".as_bytes();
            writer.write_all(&bytes[..4]).unwrap();
            writer.write_all(&bytes[4..]).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(out, b"Jos\xE9");
    }
}
