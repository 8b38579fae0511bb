//! Streaming ZIP generation.
//!
//! Archives are written straight into the HTTP response. A blocking task
//! walks the directory and pushes compressed chunks through a bounded
//! channel that the response body drains, so memory use stays at a few
//! chunks no matter how large the tree is.
//!
//! Nothing is staged on disk. If the walk fails halfway, the body stream
//! ends with an error and the client receives a truncated archive.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use axum::body::{Body, Bytes};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Chunks buffered between the producer thread and the response body.
const CHANNEL_DEPTH: usize = 16;

/// Size of the write buffer in front of the channel.
pub const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Entries at or above this size need zip64 headers.
const LARGE_FILE_THRESHOLD: u64 = u32::MAX as u64;

/// Write a ZIP archive of every regular file under `dir` into `writer`.
///
/// Entries are named by their path relative to `dir`, joined with `/`.
/// Directories only appear implicitly through file paths. The walk is
/// sorted by file name so the same tree always yields the same entry order.
pub fn write_zip<W: Write>(dir: &Path, writer: W) -> io::Result<()> {
    let mut zip = ZipWriter::new_stream(writer);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry_name(dir, entry.path()) else {
            continue;
        };
        let len = entry.metadata()?.len();

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(len >= LARGE_FILE_THRESHOLD);

        zip.start_file(name, options).map_err(io::Error::other)?;
        let mut file = File::open(entry.path())?;
        io::copy(&mut file, &mut zip)?;
    }

    let mut stream = zip.finish().map_err(io::Error::other)?;
    stream.flush()
}

/// Total size in bytes of the regular files under `dir`.
///
/// Unreadable entries are skipped.
pub fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Blocking `Write` half of a streamed response body.
///
/// Every write becomes one body chunk. Once the client goes away the
/// receiving side is dropped and writes fail with `BrokenPipe`, which
/// unwinds whatever producer is feeding us.
#[derive(Debug)]
pub struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Build a response body fed by `produce` on the blocking pool.
///
/// An error returned by `produce` is forwarded into the body stream, so
/// the connection is cut instead of ending as if the payload were whole.
pub fn writer_body<F>(produce: F) -> Body
where
    F: FnOnce(ChannelWriter) -> io::Result<()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let err_tx = tx.clone();

    tokio::task::spawn_blocking(move || {
        if let Err(e) = produce(ChannelWriter { tx }) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                tracing::debug!("Client disconnected during stream");
            } else {
                tracing::warn!("Streaming response aborted: {}", e);
            }
            let _ = err_tx.blocking_send(Err(e));
        }
    });

    Body::from_stream(ReceiverStream::new(rx))
}

/// Response body carrying a ZIP of `dir`, generated while it is sent.
pub fn zip_body(dir: impl AsRef<Path>) -> Body {
    let dir = dir.as_ref().to_path_buf();
    writer_body(move |sink| write_zip(&dir, BufWriter::with_capacity(STREAM_BUFFER_SIZE, sink)))
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use tempfile::TempDir;

    use super::*;

    fn build_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"bravo").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join("nested/c.bin"), [0u8, 1, 2, 3]).unwrap();
        std::fs::write(dir.path().join("nested/deeper/d.txt"), b"delta").unwrap();
        dir
    }

    #[test]
    fn test_zip_contains_exactly_regular_files() {
        let dir = build_tree();
        let mut out = Vec::new();
        write_zip(dir.path(), &mut out).expect("write zip");

        let mut archive = zip::ZipArchive::new(Cursor::new(out)).expect("read zip");
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["a.txt", "b.txt", "nested/c.bin", "nested/deeper/d.txt"]
        );

        let mut content = String::new();
        archive
            .by_name("nested/deeper/d.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "delta");
    }

    /// A sink that can only be appended to, like a socket.
    struct AppendOnly(Vec<u8>);

    impl Write for AppendOnly {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_zip_into_non_seekable_writer() {
        let dir = build_tree();
        let mut sink = AppendOnly(Vec::new());
        write_zip(dir.path(), &mut sink).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(sink.0)).unwrap();
        assert_eq!(archive.len(), 4);
        let mut content = Vec::new();
        archive
            .by_name("nested/c.bin")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, [0u8, 1, 2, 3]);
    }

    #[test]
    fn test_zip_entry_order_is_sorted() {
        let dir = build_tree();
        let mut out = Vec::new();
        write_zip(dir.path(), &mut out).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(out)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["a.txt", "b.txt", "nested/c.bin", "nested/deeper/d.txt"]
        );
    }

    #[test]
    fn test_empty_directory_yields_valid_empty_zip() {
        let dir = TempDir::new().unwrap();
        let mut out = Vec::new();
        write_zip(dir.path(), &mut out).unwrap();

        let archive = zip::ZipArchive::new(Cursor::new(out)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn test_missing_directory_errors() {
        let dir = TempDir::new().unwrap();
        let mut out = Vec::new();
        assert!(write_zip(&dir.path().join("gone"), &mut out).is_err());
    }

    #[test]
    fn test_dir_size_counts_files_only() {
        let dir = build_tree();
        assert_eq!(dir_size(dir.path()), 5 + 5 + 4 + 5);
    }

    #[test]
    fn test_entry_name_uses_forward_slashes() {
        let root = Path::new("root");
        let path = root.join("x").join("y").join("z.txt");
        assert_eq!(entry_name(root, &path).as_deref(), Some("x/y/z.txt"));
        assert_eq!(entry_name(root, root), None);
    }

    #[tokio::test]
    async fn test_zip_body_streams_archive() {
        let dir = build_tree();
        let body = zip_body(dir.path());
        let bytes = axum::body::to_bytes(body, usize::MAX).await.expect("body");

        let archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        assert_eq!(archive.len(), 4);
    }

    #[tokio::test]
    async fn test_writer_body_propagates_failure() {
        let body = writer_body(|mut sink| {
            sink.write_all(b"partial")?;
            Err(io::Error::other("disk vanished"))
        });
        assert!(axum::body::to_bytes(body, usize::MAX).await.is_err());
    }
}
