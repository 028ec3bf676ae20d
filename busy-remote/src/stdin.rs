//! Raw stdin reader.
//!
//! The key decoder needs the exact bytes the terminal sends, so stdin is
//! read directly (in raw mode) rather than through crossterm's event parser.
//! Reads block, so they run on a dedicated thread that forwards each chunk
//! over a channel.

use std::io::{self, Read};
use std::thread::JoinHandle;

use tokio::sync::mpsc;

const CHUNK_SIZE: usize = 64;

/// Forward chunks from `reader` until EOF, a read error, or the receiver
/// is dropped.
pub fn forward<R: Read>(mut reader: R, tx: &mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("stdin read failed: {e}");
                break;
            }
        }
    }
}

/// Spawn the stdin reader thread.
///
/// The thread stays blocked in `read` after the session ends; it exits with
/// the process.
pub fn spawn(capacity: usize) -> io::Result<(mpsc::Receiver<Vec<u8>>, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || forward(io::stdin().lock(), &tx))?;
    Ok((rx, handle))
}
