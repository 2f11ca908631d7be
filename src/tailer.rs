/// Follows the event feed file, forwarding each complete line as it lands.
///
/// `notify` reports modifications of the feed's directory; on each one we
/// read from the last consumed byte. Only newline-terminated lines are
/// consumed, so a line the bridge is halfway through writing is picked up
/// whole on the next pass.
///
/// Rotation: if the file is shorter than our offset the bridge started a new
/// feed, and we restart from byte 0.
///
/// The watch loop blocks, so it runs on a blocking thread rather than on an
/// async worker.
use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

pub struct FeedTail {
    path:   PathBuf,
    offset: u64,
}

impl FeedTail {
    pub fn new(path: PathBuf) -> Self {
        Self { path, offset: 0 }
    }

    /// Read whatever complete lines were appended since the last call.
    /// Returns false once the receiver is gone.
    fn pump(&mut self, tx: &Sender<String>) -> Result<bool> {
        for line in self.read_new_lines()? {
            if tx.blocking_send(line).is_err() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn read_new_lines(&mut self) -> Result<Vec<String>> {
        let len = match std::fs::metadata(&self.path) {
            Ok(m) => m.len(),
            Err(_) => return Ok(Vec::new()), // not created yet
        };

        if len < self.offset {
            tracing::info!("Event feed rotated, restarting from byte 0");
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut chunk = Vec::with_capacity((len - self.offset) as usize);
        file.take(len - self.offset).read_to_end(&mut chunk)?;

        // Hold back a trailing partial line until its newline arrives.
        let Some(last_newline) = chunk.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &chunk[..=last_newline];
        self.offset += complete.len() as u64;

        Ok(String::from_utf8_lossy(complete)
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

/// Blocking tail loop. Spawn with `tokio::task::spawn_blocking`.
pub fn run(feed_path: PathBuf, tx: Sender<String>) -> Result<()> {
    tracing::info!("Tailing event feed {:?}", feed_path);

    let watch_dir = feed_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(std::path::Path::new("."))
        .to_path_buf();

    let (fs_tx, fs_rx) = std_mpsc::channel::<notify::Result<Event>>();
    let config = notify::Config::default().with_poll_interval(Duration::from_millis(500));
    let mut watcher = RecommendedWatcher::new(fs_tx, config)?;
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

    let mut tail = FeedTail::new(feed_path.clone());

    // Lines written before we started still count.
    if !tail.pump(&tx)? {
        return Ok(());
    }

    loop {
        match fs_rx.recv() {
            Ok(Ok(Event { kind: EventKind::Modify(_) | EventKind::Create(_), paths, .. })) => {
                if !paths.iter().any(|p| p.ends_with(feed_path.file_name().unwrap_or_default())) {
                    continue;
                }
                match tail.pump(&tx) {
                    Ok(true) => {}
                    Ok(false) => break, // engine gone
                    Err(e) => tracing::warn!("Feed read error: {}", e),
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!("Feed watcher error: {}", e),
            Err(_) => {
                tracing::warn!("Feed watcher channel closed, tailer exiting");
                break;
            }
        }
    }
    Ok(())
}
