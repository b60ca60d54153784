use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use serde::Serialize;

use schedscope::scale;
use schedscope::store::TraceStore;
use schedscope::{monitor, Pannable, ViewTransform};

#[derive(Debug, Parser)]
#[command(version, about = "Follow a live scheduling trace and summarize it")]
struct Command {
    /// Path of the shared trace artifact written by the recorder
    #[arg(short, long, default_value = "/tmp/sched_events_recorder_data")]
    file: PathBuf,
    /// Poll interval in milliseconds
    #[arg(long, default_value = "1000")]
    interval_ms: u64,
    /// Stop after this many seconds, 0 to follow until the recorder is done
    #[arg(short, long, default_value = "0")]
    duration: u64,
    /// Read the trace once and exit instead of following it
    #[arg(long)]
    once: bool,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
    /// Report progress after every refresh
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct ThreadSummary {
    tid: i32,
    name: String,
    switches: usize,
    first_ns: Option<u64>,
    last_ns: Option<u64>,
}

#[derive(Serialize)]
struct ProcessSummary {
    pid: i32,
    name: String,
    threads: Vec<ThreadSummary>,
}

#[derive(Serialize)]
struct TraceSummary {
    entries: usize,
    span_ns: u64,
    done: bool,
    gaps: usize,
    processes: Vec<ProcessSummary>,
}

fn summarize(store: &TraceStore) -> TraceSummary {
    let mut processes = Vec::new();
    for p in store.entities().processes() {
        let threads = p
            .threads
            .iter()
            .map(|&ti| {
                let t = store.thread(ti);
                ThreadSummary {
                    tid: t.tid,
                    name: store.thread_label(ti, 0),
                    switches: t.actions.len(),
                    first_ns: t.actions.first().map(|&at| store.nanos(at)),
                    last_ns: t.actions.last().map(|&at| store.nanos(at)),
                }
            })
            .collect();
        processes.push(ProcessSummary {
            pid: p.pid,
            name: p.name.clone(),
            threads,
        });
    }
    TraceSummary {
        entries: store.entry_count(),
        span_ns: store.nanos_max() - store.nanos_min(),
        done: store.done(),
        gaps: store.gaps().len(),
        processes,
    }
}

fn span_as_string(span_ns: u64) -> String {
    let mut parts = scale::decompose(span_ns as i64, 1);
    parts.reverse();
    parts.join(" ")
}

fn print_summary(s: &TraceSummary) {
    println!(
        "{} entries spanning {}{}",
        s.entries,
        span_as_string(s.span_ns),
        if s.done { "" } else { " (still recording)" }
    );
    for p in &s.processes {
        println!("  {} {}", p.pid, p.name);
        for t in &p.threads {
            println!("    {:>8} {:<24} {:>8} switches", t.tid, t.name, t.switches);
        }
    }
    if s.gaps > 0 {
        println!("*** {} gap(s) where trace data was lost", s.gaps);
    }
}

fn main() -> Result<()> {
    let opts = Command::parse();

    if opts.once {
        let mut store = TraceStore::open(&opts.file)?;
        store.refresh()?;
        let summary = summarize(&store);
        if opts.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&summary);
        }
        return Ok(());
    }

    let (stop_tx, stop_rx) = channel();

    if opts.duration > 0 {
        let stop_for_duration = stop_tx.clone();
        let duration = opts.duration;
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(duration));
            let _ = stop_for_duration.send(());
        });
        println!(
            "Following {} for up to {} seconds",
            opts.file.display(),
            duration
        );
    } else {
        println!("Following {}", opts.file.display());
        println!("Press Ctrl-C to stop");
    }
    let _ = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    });

    let verbose = opts.verbose;
    let mut view = ViewTransform::new();
    let result = monitor::poll_until_done(
        &opts.file,
        Duration::from_millis(opts.interval_ms),
        &stop_rx,
        |store| {
            view.update_data(store);
            if verbose {
                eprintln!(
                    "{} entries, {} threads, {} gaps, data width {}px",
                    store.entry_count(),
                    store.thread_count(),
                    store.gaps().len(),
                    view.data_width(),
                );
            }
        },
    )?;

    let Some(shared) = result else {
        bail!("no trace data ever appeared at {}", opts.file.display());
    };
    let store = shared.read().unwrap();
    let summary = summarize(&store);
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}
