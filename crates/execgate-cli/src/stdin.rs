//! Line reader for stdin on its own thread.
//!
//! Tokio's stdin parks its read on the blocking pool and runtime shutdown
//! waits for it; a detached thread does not hold up process exit.

use std::io::{self, BufRead};

use tokio::sync::mpsc;

/// Lines of stdin, ending after EOF or the first read error.
pub fn lines() -> io::Result<mpsc::Receiver<io::Result<String>>> {
    spawn_reader(io::BufReader::new(io::stdin()))
}

fn spawn_reader<R>(reader: R) -> io::Result<mpsc::Receiver<io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("execgate-stdin".into())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reader_yields_lines_then_closes() {
        let mut rx = spawn_reader(io::Cursor::new("one\ntwo\n\nthree")).unwrap();
        let mut seen = Vec::new();
        while let Some(line) = rx.recv().await {
            seen.push(line.unwrap());
        }
        assert_eq!(seen, vec!["one", "two", "", "three"]);
    }

    #[tokio::test]
    async fn test_reader_stops_after_error() {
        let mut rx = spawn_reader(io::Cursor::new(b"ok\n\xFF\xFE\nlater\n".to_vec())).unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), "ok");
        assert!(rx.recv().await.unwrap().is_err());
        assert!(rx.recv().await.is_none());
    }
}
