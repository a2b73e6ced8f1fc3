//! Text-trace frontend: one trace file per process, lines of
//! `<cycle> <r|w> <address> [priority]`. Addresses take a 0x prefix or
//! decimal; blank lines and `#` comments are skipped.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context, Result};
use log::warn;

use crate::engine::Cycle;
use crate::mem::request::{AccessKind, ClientId, MemoryRequest};
use crate::sim::top::{MemoryClient, SimTop};

#[derive(Debug, Clone, Copy)]
pub struct TraceCommand {
    pub cycle: Cycle,
    pub kind: AccessKind,
    pub addr: u64,
    pub priority: u8,
}

fn parse_addr(field: &str) -> Result<u64> {
    if let Some(hex) = field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).with_context(|| format!("bad address {field:?}"))
    } else {
        field
            .parse()
            .with_context(|| format!("bad address {field:?}"))
    }
}

pub fn parse_trace_line(line: &str) -> Result<Option<TraceCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut fields = line.split_whitespace();
    let cycle = fields
        .next()
        .context("missing cycle")?
        .parse()
        .context("bad cycle")?;
    let kind = match fields.next().context("missing access kind")? {
        "r" | "R" => AccessKind::Read,
        "w" | "W" => AccessKind::Write,
        other => bail!("unknown access kind {other:?}"),
    };
    let addr = parse_addr(fields.next().context("missing address")?)?;
    let priority = match fields.next() {
        Some(field) => field.parse().context("bad priority")?,
        None => 0,
    };
    Ok(Some(TraceCommand {
        cycle,
        kind,
        addr,
        priority,
    }))
}

pub fn load_trace(path: &Path) -> Result<Vec<TraceCommand>> {
    let file =
        File::open(path).with_context(|| format!("cannot open trace {}", path.display()))?;
    let mut commands = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("cannot read trace line")?;
        if let Some(command) = parse_trace_line(&line)
            .with_context(|| format!("{}:{}", path.display(), number + 1))?
        {
            commands.push(command);
        }
    }
    Ok(commands)
}

/// Upstream endpoint for one trace stream: records completion latencies and
/// the unstall edge the driver retries on.
#[derive(Default)]
pub struct ReplayClient {
    pub completed: u64,
    pub total_latency: u64,
    pub unstall_pending: bool,
    issue_times: HashMap<u64, Cycle>,
}

impl ReplayClient {
    pub fn note_issued(&mut self, id: u64, now: Cycle) {
        self.issue_times.insert(id, now);
    }
}

impl MemoryClient for ReplayClient {
    fn access_completed(&mut self, request: &MemoryRequest, now: Cycle) {
        if let Some(issued) = self.issue_times.remove(&request.id) {
            self.total_latency += now - issued;
        }
        self.completed += 1;
    }

    fn unstall(&mut self, _now: Cycle) {
        self.unstall_pending = true;
    }
}

pub struct TraceStream {
    commands: Vec<TraceCommand>,
    next: usize,
    pid: usize,
    client: ClientId,
    handle: Arc<RwLock<ReplayClient>>,
    pending: Option<MemoryRequest>,
}

impl TraceStream {
    pub fn new(
        commands: Vec<TraceCommand>,
        pid: usize,
        client: ClientId,
        handle: Arc<RwLock<ReplayClient>>,
    ) -> Self {
        Self {
            commands,
            next: 0,
            pid,
            client,
            handle,
            pending: None,
        }
    }

    pub fn pid(&self) -> usize {
        self.pid
    }

    pub fn issued(&self) -> usize {
        self.next
    }

    pub fn completed(&self) -> u64 {
        self.handle.read().expect("client lock poisoned").completed
    }

    pub fn total_latency(&self) -> u64 {
        self.handle
            .read()
            .expect("client lock poisoned")
            .total_latency
    }
}

/// Drive the system with the traces: inject each command at its cycle,
/// retrying rejected requests once their tier unstalls, then drain.
pub fn replay(top: &mut SimTop, streams: &mut [TraceStream]) {
    let mut next_id: u64 = 1;
    loop {
        for stream in streams.iter_mut() {
            if stream.pending.is_none() {
                continue;
            }
            let ready = {
                let mut client = stream.handle.write().expect("client lock poisoned");
                std::mem::take(&mut client.unstall_pending)
            };
            if !ready {
                continue;
            }
            let request = stream.pending.take().expect("pending just checked");
            if top.access(request, stream.client) {
                stream
                    .handle
                    .write()
                    .expect("client lock poisoned")
                    .note_issued(request.id, top.now());
            } else {
                stream.pending = Some(request);
            }
        }

        let next = streams
            .iter()
            .enumerate()
            .filter(|(_, s)| s.pending.is_none() && s.next < s.commands.len())
            .map(|(i, s)| (s.commands[s.next].cycle, i))
            .min();

        match next {
            Some((cycle, idx)) => {
                top.run_until(cycle.max(top.now()));
                let stream = &mut streams[idx];
                let command = stream.commands[stream.next];
                stream.next += 1;
                let request = MemoryRequest {
                    id: next_id,
                    addr: command.addr,
                    kind: command.kind,
                    priority: command.priority,
                    pid: Some(stream.pid),
                    user: 0,
                };
                next_id += 1;
                if top.access(request, stream.client) {
                    stream
                        .handle
                        .write()
                        .expect("client lock poisoned")
                        .note_issued(request.id, top.now());
                } else {
                    stream.pending = Some(request);
                }
            }
            None => {
                if streams.iter().all(|s| s.pending.is_none()) {
                    break;
                }
                if !top.step() {
                    warn!("trace replay stalled with no events left; dropping retries");
                    break;
                }
            }
        }
    }
    top.run_to_completion();
}
