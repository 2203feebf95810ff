//! Draw-set files: JSON, optionally gzip- or bzip2-compressed, written
//! atomically.
//!
//! Writers go through a temporary file in the destination directory that is
//! synced to disk and then renamed over the target, so a reader sees either
//! the old file or the new one. Readers detect the codec from magic bytes.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::debug;
use thiserror::Error;

use crate::config::Codec;
use crate::model::DrawSet;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BZIP2_MAGIC: [u8; 3] = *b"BZh";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode or decode {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} holds an inconsistent draw set: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "draws".into(), |name| name.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.partial"))
}

/// Encode `draws` into `writer` and hand the writer back once the codec has
/// written its trailer.
fn encode<W: Write>(mut writer: W, draws: &DrawSet, codec: Codec) -> io::Result<W> {
    match codec {
        Codec::Plain => {
            serde_json::to_writer(&mut writer, draws)?;
            Ok(writer)
        }
        Codec::Gzip(level) => {
            let mut encoder = GzEncoder::new(writer, Compression::new(level));
            serde_json::to_writer(&mut encoder, draws)?;
            encoder.finish()
        }
        Codec::Bzip2 => {
            let mut encoder = BzEncoder::new(writer, bzip2::Compression::default());
            serde_json::to_writer(&mut encoder, draws)?;
            encoder.finish()
        }
    }
}

fn write_synced(file: File, draws: &DrawSet, codec: Codec) -> io::Result<()> {
    let file = encode(BufWriter::new(file), draws, codec)?
        .into_inner()
        .map_err(io::IntoInnerError::into_error)?;
    file.sync_all()
}

fn decode(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut text = Vec::new();
    if bytes.starts_with(&GZIP_MAGIC) {
        GzDecoder::new(bytes).read_to_end(&mut text)?;
    } else if bytes.starts_with(&BZIP2_MAGIC) {
        BzDecoder::new(bytes).read_to_end(&mut text)?;
    } else {
        text.extend_from_slice(bytes);
    }
    Ok(text)
}

/// Write `draws` to `path`, replacing any existing file atomically.
///
/// # Errors
///
/// Returns `StorageError::Io` if the file cannot be written, synced or
/// renamed.
pub fn write_draw_set(path: &Path, draws: &DrawSet, codec: Codec) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let temporary = temporary_path(path);
    let file = File::create(&temporary).map_err(io_error(&temporary))?;
    if let Err(source) = write_synced(file, draws, codec) {
        let _ = fs::remove_file(&temporary);
        return Err(StorageError::Io {
            path: temporary,
            source,
        });
    }
    fs::rename(&temporary, path).map_err(io_error(path))?;
    debug!(
        "wrote {} draws of {} proteins to {}",
        draws.n_iterations(),
        draws.mu.width(),
        path.display()
    );
    Ok(())
}

/// Read a draw set written by [`write_draw_set`], with any codec.
///
/// # Errors
///
/// Returns `StorageError` if the file cannot be read or decoded, or the
/// decoded traces disagree with their partition tag.
pub fn read_draw_set(path: &Path) -> Result<DrawSet, StorageError> {
    let bytes = fs::read(path).map_err(io_error(path))?;
    let text = decode(&bytes).map_err(io_error(path))?;
    let draws = serde_json::from_slice::<DrawSet>(&text).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    draws.check_shape().map_err(|reason| StorageError::Corrupt {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(draws)
}
