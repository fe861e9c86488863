use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::AuditLogConfig;
use crate::error::AuditError;

/// Something that happened in an audit session. Only ids, counts and
/// outcomes are recorded; contract text and chat content never are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    DocumentLoaded {
        document_id: String,
        redactions: usize,
    },
    AnalysisStarted {
        document_id: String,
        generation: u64,
    },
    AnalysisCompleted {
        document_id: String,
        generation: u64,
        findings: usize,
    },
    AnalysisFailed {
        document_id: String,
        generation: u64,
    },
    AnalysisStale {
        document_id: String,
        generation: u64,
    },
    FindingToggled {
        document_id: String,
        finding_id: String,
        validated: bool,
    },
    ChatExchange {
        document_id: String,
        outcome: ChatOutcome,
        history_len: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatOutcome {
    Answered,
    Rejected,
    Busy,
    Failed,
}

/// Running totals for the session, derived from the recorded events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    pub redactions: u64,
    pub stale_results: u64,
    pub failed_analyses: u64,
}

impl SessionCounters {
    fn apply(&mut self, event: &AuditEvent) {
        match event {
            AuditEvent::DocumentLoaded { redactions, .. } => self.redactions += *redactions as u64,
            AuditEvent::AnalysisStale { .. } => self.stale_results += 1,
            AuditEvent::AnalysisFailed { .. } => self.failed_analyses += 1,
            _ => {}
        }
    }
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    seq: u64,
    ts: String,
    event: &'a AuditEvent,
    counters: SessionCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    prev_hash: Option<&'a str>,
}

/// Last record of a log: where the next append continues from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ChainHead {
    seq: u64,
    hash: Option<String>,
}

/// SHA-256 over the compact JSON of a record without its `hash` field.
/// Keys serialize in a fixed order, so a parsed line re-hashes identically.
fn digest(record: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn io_error(path: &Path, err: std::io::Error) -> AuditError {
    AuditError::Io {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Walk a log and check sequence numbers and, where present, the hash chain.
fn scan(path: &Path) -> Result<ChainHead, AuditError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ChainHead::default()),
        Err(e) => return Err(io_error(path, e)),
    };

    let mut head = ChainHead::default();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| io_error(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let broken = |reason: &str| AuditError::BrokenChain {
            line: line_no,
            reason: reason.to_string(),
        };

        let mut record: Value = serde_json::from_str(&line).map_err(|e| AuditError::Malformed {
            line: line_no,
            reason: e.to_string(),
        })?;
        if record.get("seq").and_then(Value::as_u64) != Some(head.seq + 1) {
            return Err(broken("sequence number out of order"));
        }

        let prev_hash = record
            .get("prev_hash")
            .and_then(Value::as_str)
            .map(str::to_string);
        let hash = match record.as_object_mut().and_then(|m| m.remove("hash")) {
            None => None,
            Some(Value::String(hash)) => {
                if prev_hash != head.hash {
                    return Err(broken("prev_hash does not match the previous record"));
                }
                if digest(&record) != hash {
                    return Err(broken("hash does not match the record"));
                }
                Some(hash)
            }
            Some(_) => return Err(broken("hash is not a string")),
        };

        head = ChainHead {
            seq: head.seq + 1,
            hash,
        };
    }
    Ok(head)
}

/// Check an existing audit log end to end and return its record count.
pub fn verify(path: &Path) -> Result<u64, AuditError> {
    scan(path).map(|head| head.seq)
}

#[derive(Debug)]
struct Sink {
    path: PathBuf,
    file: File,
    hash_chain: bool,
    head: ChainHead,
}

impl Sink {
    /// Open `path` for appending, continuing its chain. A log that fails
    /// verification is not appended to.
    fn open(path: &Path, hash_chain: bool) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;
        }
        let head = scan(path)?;

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);
        let file = options.open(path).map_err(|e| io_error(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            hash_chain,
            head,
        })
    }

    fn append(&mut self, event: &AuditEvent, counters: SessionCounters) -> Result<(), AuditError> {
        let seq = self.head.seq + 1;
        let mut record = serde_json::to_value(AuditRecord {
            seq,
            ts: Utc::now().to_rfc3339(),
            event,
            counters,
            prev_hash: self.head.hash.as_deref().filter(|_| self.hash_chain),
        })
        .map_err(|e| AuditError::Malformed {
            line: seq as usize,
            reason: e.to_string(),
        })?;

        let hash = self.hash_chain.then(|| digest(&record));
        if let (Some(hash), Some(fields)) = (&hash, record.as_object_mut()) {
            fields.insert("hash".to_string(), Value::String(hash.clone()));
        }

        writeln!(self.file, "{record}").map_err(|e| io_error(&self.path, e))?;
        self.head = ChainHead { seq, hash };
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TrailState {
    sink: Option<Sink>,
    counters: SessionCounters,
}

/// Append-only record of an audit session, optionally hash-chained on disk.
#[derive(Debug, Default)]
pub struct AuditTrail {
    state: Mutex<TrailState>,
}

impl AuditTrail {
    /// A trail that keeps counters but writes nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn open(path: &Path, hash_chain: bool) -> Result<Self, AuditError> {
        let sink = Sink::open(path, hash_chain)?;
        tracing::debug!(path = %path.display(), records = sink.head.seq, "Audit log opened");
        Ok(Self {
            state: Mutex::new(TrailState {
                sink: Some(sink),
                counters: SessionCounters::default(),
            }),
        })
    }

    pub fn from_config(config: &AuditLogConfig) -> Result<Self, AuditError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        Self::open(&config.path, config.hash_chain)
    }

    /// Record `event`. Write failures are logged and do not interrupt the
    /// session.
    pub fn record(&self, event: AuditEvent) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;
        state.counters.apply(&event);
        if let Some(sink) = state.sink.as_mut()
            && let Err(e) = sink.append(&event, state.counters)
        {
            tracing::warn!(error = %e, "Failed to append audit event");
        }
    }

    pub fn counters(&self) -> SessionCounters {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counters
    }
}
