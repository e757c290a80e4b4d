use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use crossbeam_channel as channel;
use ratewatch::{SequenceId, Snapshot, SpeedElement, TrackerConfig, TrackerRegistry};
use tracing::{info, warn};

use crate::cli::Watch;
use crate::ui::overview::run_tui;

#[derive(Clone, Debug, PartialEq)]
pub struct WatchRow {
    pub path: PathBuf,
    pub size: Option<u64>,
    pub rate: f64,
}

struct Source {
    path: PathBuf,
    next_id: SequenceId,
    last_size: Option<u64>,
}

/// File sizes treated as progress counters, one rate tracker per path.
pub struct WatchSet {
    sources: Vec<Source>,
    registry: TrackerRegistry<PathBuf>,
    events: Option<channel::Sender<String>>,
}

impl WatchSet {
    pub fn new(paths: Vec<PathBuf>, config: TrackerConfig) -> Self {
        let sources = paths
            .into_iter()
            .map(|path| Source { path, next_id: 0, last_size: None })
            .collect();
        Self { sources, registry: TrackerRegistry::new(config), events: None }
    }

    pub fn with_events(mut self, tx: channel::Sender<String>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn poll(&mut self) -> Vec<WatchRow> {
        let now = Instant::now();
        let sizes: Vec<Option<u64>> = self
            .sources
            .iter()
            .map(|s| std::fs::metadata(&s.path).ok().map(|m| m.len()))
            .collect();
        sizes.into_iter().enumerate().map(|(i, size)| self.observe(i, size, now)).collect()
    }

    pub(crate) fn observe(&mut self, index: usize, size: Option<u64>, now: Instant) -> WatchRow {
        let source = &mut self.sources[index];
        let Some(size) = size else {
            if source.last_size.take().is_some() {
                self.registry.remove(&source.path);
                let msg = format!("Gone: {}", source.path.display());
                if let Some(tx) = &self.events {
                    let _ = tx.send(msg);
                }
            }
            return WatchRow { path: source.path.clone(), size: None, rate: 0.0 };
        };

        // a new or shrunk file starts a new run
        let first = match source.last_size {
            None => true,
            Some(prev) => size < prev,
        };
        if first && source.last_size.is_some() {
            let msg = format!("Restarted: {}", source.path.display());
            if let Some(tx) = &self.events {
                let _ = tx.send(msg);
            }
        }
        source.next_id += 1;
        source.last_size = Some(size);
        let mut snap = Snapshot::new(source.next_id, now, size.min(i64::MAX as u64) as i64);
        snap.is_first = first;
        let rate = self.registry.current_rate(&source.path, &snap);
        WatchRow { path: source.path.clone(), size: Some(size), rate }
    }

    pub fn file_count(&self) -> usize {
        self.sources.len()
    }
}

pub fn run_watch(watch: Watch, config: TrackerConfig) -> Result<()> {
    if watch.paths.is_empty() {
        bail!("No files to watch");
    }
    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop = stop_flag.clone();
        let _ = ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        });
    }

    let element = SpeedElement::from(&watch.display);
    let refresh = Duration::from_millis(watch.display.refresh_ms.max(10));
    let (event_tx, event_rx) = channel::unbounded::<String>();
    let set = WatchSet::new(watch.paths.clone(), config).with_events(event_tx);
    info!(files = set.file_count(), "Watching");

    if watch.plain {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        run_plain(set, &element, refresh, event_rx, stop_flag, &mut out)
    } else {
        run_tui(set, &element, refresh, event_rx, stop_flag)
    }
}

fn run_plain<W: Write>(
    mut set: WatchSet,
    element: &SpeedElement,
    refresh: Duration,
    events: channel::Receiver<String>,
    stop: Arc<AtomicBool>,
    out: &mut W,
) -> Result<()> {
    while !stop.load(Ordering::Relaxed) {
        for row in set.poll() {
            match row.size {
                Some(size) => writeln!(out, "{}\t{}\t{}", row.path.display(), size, element.render(row.rate))?,
                None => writeln!(out, "{}\t-\t{}", row.path.display(), element.render(0.0))?,
            }
        }
        out.flush()?;
        while let Ok(ev) = events.try_recv() {
            warn!("{ev}");
        }
        std::thread::sleep(refresh);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> WatchSet {
        WatchSet::new(vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")], TrackerConfig::default())
    }

    #[test]
    fn growing_file_has_rate() {
        let mut s = set();
        let base = Instant::now();
        assert_eq!(s.observe(0, Some(0), base).rate, 0.0);
        let row = s.observe(0, Some(4096), base + Duration::from_secs(2));
        assert_eq!(row.rate, 2048.0);
        assert_eq!(row.size, Some(4096));
    }

    #[test]
    fn files_do_not_share_trackers() {
        let mut s = set();
        let base = Instant::now();
        s.observe(0, Some(0), base);
        s.observe(1, Some(0), base);
        let later = base + Duration::from_secs(1);
        assert_eq!(s.observe(0, Some(10), later).rate, 10.0);
        assert_eq!(s.observe(1, Some(30), later).rate, 30.0);
    }

    #[test]
    fn shrinking_file_restarts() {
        let (tx, rx) = channel::unbounded();
        let mut s = set().with_events(tx);
        let base = Instant::now();
        s.observe(0, Some(0), base);
        assert!(s.observe(0, Some(1000), base + Duration::from_secs(1)).rate > 0.0);
        assert_eq!(s.observe(0, Some(10), base + Duration::from_secs(2)).rate, 0.0);
        assert_eq!(rx.try_recv().unwrap(), "Restarted: a.bin");
        assert_eq!(s.observe(0, Some(60), base + Duration::from_secs(3)).rate, 50.0);
    }

    #[test]
    fn missing_file_drops_tracker() {
        let (tx, rx) = channel::unbounded();
        let mut s = set().with_events(tx);
        let base = Instant::now();
        assert_eq!(s.observe(0, None, base).rate, 0.0);
        assert!(rx.try_recv().is_err());
        s.observe(0, Some(5), base);
        assert!(s.registry.contains(&PathBuf::from("a.bin")));
        s.observe(0, None, base + Duration::from_secs(1));
        assert!(!s.registry.contains(&PathBuf::from("a.bin")));
        assert_eq!(rx.try_recv().unwrap(), "Gone: a.bin");
    }

    #[test]
    fn poll_reads_file_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.bin");
        std::fs::write(&path, vec![0u8; 123]).unwrap();
        let mut s = WatchSet::new(vec![path, dir.path().join("missing.bin")], TrackerConfig::default());
        let rows = s.poll();
        assert_eq!(rows[0].size, Some(123));
        assert_eq!(rows[1].size, None);
    }

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn plain_rows_written_tab_separated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.bin");
        std::fs::write(&path, vec![0u8; 10]).unwrap();
        let s = WatchSet::new(vec![path.clone()], TrackerConfig::default());
        let (_tx, rx) = channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let mut out = Vec::new();

        // stops after the first round
        struct StopAfterFlush<'a>(&'a mut Vec<u8>, Arc<AtomicBool>);
        impl Write for StopAfterFlush<'_> {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.write(buf)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                self.1.store(true, Ordering::Relaxed);
                Ok(())
            }
        }

        let mut w = StopAfterFlush(&mut out, stop.clone());
        run_plain(s, &SpeedElement::default(), Duration::from_millis(1), rx, stop, &mut w).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, format!("{}\t10\t?/s\n", path.display()));
    }

    #[test]
    fn plain_closed_output_is_broken_pipe() {
        let s = WatchSet::new(vec![PathBuf::from("nowhere.bin")], TrackerConfig::default());
        let (_tx, rx) = channel::unbounded();
        let err = run_plain(
            s,
            &SpeedElement::default(),
            Duration::from_millis(1),
            rx,
            Arc::new(AtomicBool::new(false)),
            &mut Closed,
        )
        .unwrap_err();
        let io = err.chain().find_map(|c| c.downcast_ref::<std::io::Error>()).unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::BrokenPipe);
        assert_eq!(crate::exit_code_for_error(&err), 4);
    }
}
