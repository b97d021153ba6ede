//! Dual-sink session logger: an append-synchronous JSONL file for forensic
//! replay, mirrored to stderr through `tracing` for the console.
//!
//! Every timestamp in the file is an epoch-milliseconds integer, matching
//! cursor-agent's own `timestamp_ms` convention so records can be diffed
//! against agent events without conversion.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    os::unix::fs::OpenOptionsExt,
    path::PathBuf,
    sync::Mutex,
    time::SystemTime,
};

use cursor_agent::AnnotatedEvent;
use serde::Serialize;
use serde_json::{json, value::RawValue, Value};
use tracing::{debug, error, info, warn, Level};

/// A structured attribute on a decision record.
pub type Attr = (String, Value);

pub fn attr(key: impl Into<String>, value: impl Into<Value>) -> Attr {
    (key.into(), value.into())
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for session log files.
    pub dir: PathBuf,
    /// Minimum level mirrored to the console (via `tracing`).
    pub console_level: Level,
    /// Minimum level written to the file sink.
    pub file_level: Level,
}

struct Inner {
    /// None when running console-only (file sink could not be opened).
    file: Option<File>,
    path: Option<PathBuf>,
    session_set: bool,
}

/// One log session per wrapper invocation. The file is opened as
/// `cursor-wrap-<start_ms>-unknown.jsonl` and renamed once the agent
/// reveals its session_id.
pub struct LogSession {
    inner: Mutex<Inner>,
    file_level: Level,
}

impl LogSession {
    /// Opens the file sink. Falls back to console-only logging (with a
    /// warning) if the directory or file cannot be created.
    pub fn open(cfg: &LogConfig) -> Self {
        if let Err(err) = fs::create_dir_all(&cfg.dir) {
            warn!(dir = %cfg.dir.display(), error = %err,
                "failed to create log directory, using console only");
            return Self::console_only(cfg);
        }

        let start_ms = epoch_ms(SystemTime::now());
        let path = cfg.dir.join(format!("cursor-wrap-{start_ms}-unknown.jsonl"));

        // O_SYNC: each record reaches disk before the write returns, so a
        // crash immediately after observing an event still leaves it on disk.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .custom_flags(libc::O_SYNC)
            .open(&path);

        match file {
            Ok(file) => Self {
                inner: Mutex::new(Inner {
                    file: Some(file),
                    path: Some(path),
                    session_set: false,
                }),
                file_level: cfg.file_level,
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err,
                    "failed to open log file, using console only");
                Self::console_only(cfg)
            }
        }
    }

    fn console_only(cfg: &LogConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                file: None,
                path: None,
                session_set: false,
            }),
            file_level: cfg.file_level,
        }
    }

    /// Renames the log file to incorporate the session_id. Called once after
    /// the first system/init event; later calls and rename failures are
    /// no-ops (the latter logged at WARN).
    pub fn set_session_id(&self, id: &str) {
        let mut inner = self.inner.lock().expect("log mutex poisoned");
        if inner.session_set {
            return;
        }
        let Some(path) = inner.path.clone() else {
            return;
        };

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let new_name = name.replace("-unknown.jsonl", &format!("-{id}.jsonl"));
        if new_name == name {
            return;
        }

        let new_path = path.with_file_name(new_name);
        if let Err(err) = fs::rename(&path, &new_path) {
            warn!(old = %path.display(), new = %new_path.display(), error = %err,
                "failed to rename log file");
            return;
        }

        inner.path = Some(new_path);
        inner.session_set = true;
    }

    /// Current path of the log file; None when running console-only.
    pub fn file_path(&self) -> Option<PathBuf> {
        self.inner.lock().expect("log mutex poisoned").path.clone()
    }

    /// Writes the forensic capture record for a raw agent event. The record
    /// embeds the event bytes verbatim as a nested object and is flushed to
    /// disk before this returns.
    pub fn raw_event(&self, ev: &AnnotatedEvent) {
        #[derive(Serialize)]
        struct RawEventRecord<'a> {
            time: i64,
            level: &'static str,
            msg: &'static str,
            recv_ts: i64,
            raw: &'a RawValue,
        }

        let raw: &RawValue = match serde_json::from_str(&ev.raw) {
            Ok(raw) => raw,
            Err(err) => {
                // The reader only emits lines that parsed as JSON.
                warn!(error = %err, "raw_event record skipped: line is not JSON");
                return;
            }
        };
        let record = RawEventRecord {
            time: epoch_ms(SystemTime::now()),
            level: "DEBUG",
            msg: "raw_event",
            recv_ts: epoch_ms(ev.recv_time),
            raw,
        };
        match serde_json::to_string(&record) {
            Ok(line) => self.write_line(&line),
            Err(err) => warn!(error = %err, "failed to serialize raw_event record"),
        }
    }

    pub fn debug(&self, msg: &str, attrs: &[Attr]) {
        self.log(Level::DEBUG, msg, attrs);
    }

    pub fn info(&self, msg: &str, attrs: &[Attr]) {
        self.log(Level::INFO, msg, attrs);
    }

    pub fn warn(&self, msg: &str, attrs: &[Attr]) {
        self.log(Level::WARN, msg, attrs);
    }

    pub fn error(&self, msg: &str, attrs: &[Attr]) {
        self.log(Level::ERROR, msg, attrs);
    }

    fn log(&self, level: Level, msg: &str, attrs: &[Attr]) {
        if level <= self.file_level {
            let mut record = serde_json::Map::new();
            record.insert("time".to_string(), json!(epoch_ms(SystemTime::now())));
            record.insert("level".to_string(), json!(level_name(level)));
            record.insert("msg".to_string(), json!(msg));
            for (key, value) in attrs {
                record.insert(key.clone(), value.clone());
            }
            self.write_line(&Value::Object(record).to_string());
        }

        // Console mirroring; the subscriber installed in main applies the
        // console level filter.
        let kv: String = attrs.iter().map(|(k, v)| format!(" {k}={v}")).collect();
        match level {
            Level::ERROR => error!("{msg}{kv}"),
            Level::WARN => warn!("{msg}{kv}"),
            Level::INFO => info!("{msg}{kv}"),
            _ => debug!("{msg}{kv}"),
        }
    }

    fn write_line(&self, line: &str) {
        let mut inner = self.inner.lock().expect("log mutex poisoned");
        let Some(file) = inner.file.as_mut() else {
            return;
        };
        if let Err(err) = file
            .write_all(line.as_bytes())
            .and_then(|()| file.write_all(b"\n"))
        {
            warn!(error = %err, "log file write failed");
        }
    }
}

fn epoch_ms(t: SystemTime) -> i64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

/// Default log directory: `~/.cursor-wrap/logs`.
pub fn default_log_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".cursor-wrap").join("logs")
}

/// Maps a `--log-level` string to a level; unrecognized values get INFO.
pub fn parse_level(s: &str) -> Level {
    match s.to_ascii_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cursor_agent::RawEvent;
    use std::{path::Path, time::Duration};

    fn test_config(dir: &Path) -> LogConfig {
        LogConfig {
            dir: dir.to_path_buf(),
            console_level: Level::WARN,
            file_level: Level::DEBUG,
        }
    }

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn opens_with_unknown_in_the_name() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogSession::open(&test_config(dir.path()));

        let path = log.file_path().unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("cursor-wrap-"));
        assert!(name.ends_with("-unknown.jsonl"));
    }

    #[test]
    fn rename_on_session_id_happens_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogSession::open(&test_config(dir.path()));

        log.set_session_id("sess-abc-123");
        let path = log.file_path().unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .ends_with("-sess-abc-123.jsonl"));
        assert!(path.exists());

        // A second id must not rename again.
        log.set_session_id("sess-other");
        assert_eq!(log.file_path().unwrap(), path);
    }

    #[test]
    fn raw_event_record_shape() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogSession::open(&test_config(dir.path()));

        let raw = r#"{"type":"system","subtype":"init","session_id":"s1"}"#;
        let ev = AnnotatedEvent {
            recv_time: SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123),
            raw: raw.to_string(),
            parsed: RawEvent {
                event_type: "system".to_string(),
                subtype: "init".to_string(),
            },
        };
        log.raw_event(&ev);

        let records = read_lines(&log.file_path().unwrap());
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record["level"], "DEBUG");
        assert_eq!(record["msg"], "raw_event");
        assert_eq!(record["recv_ts"], 1_700_000_000_123_i64);
        assert!(record["time"].is_i64());
        // The event is nested as an object, not a string.
        assert_eq!(record["raw"]["type"], "system");
        assert_eq!(record["raw"]["session_id"], "s1");
    }

    #[test]
    fn decision_records_flatten_attrs() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogSession::open(&test_config(dir.path()));

        log.error(
            "hang detected",
            &[
                attr("idle_silence_ms", 65_000),
                attr("open_call_count", 1),
                attr("last_event_type", "tool_call/started"),
                attr("open_call_0_id", "call-1"),
                attr("open_call_0_command", "npm test"),
                attr("open_call_0_elapsed_ms", 45_000),
                attr("open_call_0_timeout_ms", 10_000),
            ],
        );

        let records = read_lines(&log.file_path().unwrap());
        let record = &records[0];
        assert_eq!(record["level"], "ERROR");
        assert_eq!(record["msg"], "hang detected");
        assert_eq!(record["idle_silence_ms"], 65_000);
        assert_eq!(record["open_call_0_command"], "npm test");
        assert_eq!(record["open_call_0_timeout_ms"], 10_000);
    }

    #[test]
    fn file_level_filters_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path());
        cfg.file_level = Level::INFO;
        let log = LogSession::open(&cfg);

        log.debug("too quiet", &[]);
        log.info("kept", &[]);

        let records = read_lines(&log.file_path().unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["msg"], "kept");
    }

    #[test]
    fn console_only_fallback_survives_unwritable_dir() {
        // A file where the directory should be forces the fallback path.
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"not a dir").unwrap();

        let log = LogSession::open(&test_config(&blocked));
        assert!(log.file_path().is_none());

        // Logging must not panic without a file sink.
        log.info("console only", &[]);
        log.set_session_id("sess-1");
    }

    #[test]
    fn parse_level_accepts_the_usual_names() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("INFO"), Level::INFO);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }
}
