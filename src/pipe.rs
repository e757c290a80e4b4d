use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use crossbeam_channel as channel;
use ratewatch::{Progress, SpeedElement, TrackerConfig};
use tracing::{debug, info};

use crate::cli::Pipe;

const REPORT_EVERY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub bytes: u64,
    pub rate: f64,
    pub elapsed: Duration,
}

pub fn run_pipe(pipe: Pipe, config: TrackerConfig) -> Result<()> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop = stop_flag.clone();
        let _ = ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        });
    }

    let mut status = std::io::stderr();
    let (summary, _) = run_pipe_with_shutdown(
        &pipe,
        config,
        std::io::stdin(),
        std::io::stdout(),
        &mut status,
        stop_flag,
    )?;
    info!(bytes = summary.bytes, rate = summary.rate, elapsed_ms = summary.elapsed.as_millis() as u64, "Done");
    Ok(())
}

pub(crate) fn run_pipe_with_shutdown<R, W, S>(
    pipe: &Pipe,
    config: TrackerConfig,
    mut input: R,
    mut output: W,
    status: &mut S,
    stop_flag: Arc<AtomicBool>,
) -> Result<(Summary, W)>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
    S: Write,
{
    let element = SpeedElement::from(&pipe.display);
    let refresh = Duration::from_millis(pipe.display.refresh_ms.max(10));
    let progress = Arc::new(Progress::new(config));

    // reader -> writer handoff, and a completion signal for the display loop
    let (to_writer_tx, to_writer_rx) = channel::bounded::<Bytes>(pipe.buffer.max(1));
    let (done_tx, done_rx) = channel::bounded::<()>(1);

    let stop_reader = stop_flag.clone();
    let reader = thread::spawn(move || -> Result<()> {
        let mut buffer = vec![0u8; 64 * 1024];
        while !stop_reader.load(Ordering::Relaxed) {
            match input.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if to_writer_tx.send(Bytes::copy_from_slice(&buffer[..n])).is_err() {
                        // writer gone, its error is reported from there
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e).context("Reading input"),
            }
        }
        Ok(())
    });

    let stop_writer = stop_flag.clone();
    let progress_writer = Arc::clone(&progress);
    let writer = thread::spawn(move || -> Result<W> {
        loop {
            if stop_writer.load(Ordering::Relaxed) {
                break;
            }
            match to_writer_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(buf) => {
                    output.write_all(&buf).context("Writing output")?;
                    progress_writer.add(buf.len() as i64);
                }
                Err(channel::RecvTimeoutError::Timeout) => {}
                Err(channel::RecvTimeoutError::Disconnected) => break,
            }
        }
        output.flush().context("Flushing output")?;
        progress_writer.finish();
        let _ = done_tx.send(());
        Ok(output)
    });

    let started = Instant::now();
    let mut last_report = started;
    let (_, rate) = progress.tick();
    if !pipe.quiet {
        draw_status(status, &element, progress.value(), rate);
    }
    loop {
        match done_rx.recv_timeout(refresh) {
            Ok(()) | Err(channel::RecvTimeoutError::Disconnected) => break,
            Err(channel::RecvTimeoutError::Timeout) => {}
        }
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        let (snap, rate) = progress.tick();
        if !pipe.quiet {
            draw_status(status, &element, snap.value, rate);
        }
        if last_report.elapsed() >= REPORT_EVERY {
            last_report = Instant::now();
            info!(bytes = snap.value, rate_bps = rate as u64, "Throughput");
        }
    }

    let output = writer.join().map_err(|_| anyhow!("Output writer panicked"))??;
    if stop_flag.load(Ordering::Relaxed) {
        // the reader may still be blocked on input; leave it behind
        debug!("Stopped before end of input");
    } else {
        reader.join().map_err(|_| anyhow!("Input reader panicked"))??;
    }

    let (snap, rate) = progress.tick();
    if !pipe.quiet {
        draw_status(status, &element, snap.value, rate);
        let _ = writeln!(status);
    }
    let summary = Summary { bytes: snap.value.max(0) as u64, rate, elapsed: started.elapsed() };
    Ok((summary, output))
}

fn draw_status<S: Write>(status: &mut S, element: &SpeedElement, total: i64, rate: f64) {
    let _ = write!(status, "\r{} {}\x1b[K", element.units.format(total), element.render(rate));
    let _ = status.flush();
}
