//! Tracing subscriber setup driven by the `logging` config sections.
//!
//! Console output is human readable on stderr; file output is JSON, routed to
//! rotating files by target prefix (`"wirekit::container"`, `"cats"`, ...).
//! Section `default` applies to everything no other section claims.

use crate::config::{LoggingConfig, Section};
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use parking_lot::Mutex;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Keeps the non-blocking console worker alive for the whole process.
static CONSOLE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

// ================= level helpers =================

/// `None` means the sink is off. Unknown names fall back to INFO.
fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" | "none" => None,
        _ => Some(LevelFilter::INFO),
    }
}

/// Returns true if target == prefix or target starts with "prefix::"
fn matches_prefix(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// ================= rotating file writers =================

type Rotating = Arc<Mutex<FileRotate<AppendTimestamp>>>;

#[derive(Clone)]
struct FileSink(Option<Rotating>);

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.0 {
            Some(file) => file.lock().write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.0 {
            Some(file) => file.lock().flush(),
            None => Ok(()),
        }
    }
}

/// Picks the file of the most specific matching section.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<Rotating>,
    by_prefix: Vec<(String, Rotating)>,
}

impl FileRouter {
    fn route(&self, target: &str) -> Option<Rotating> {
        self.by_prefix
            .iter()
            .filter(|(prefix, _)| matches_prefix(target, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, file)| file.clone())
            .or_else(|| self.default.clone())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = FileSink;

    fn make_writer(&'a self) -> Self::Writer {
        FileSink(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        FileSink(self.route(meta.target()))
    }
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn open_rotating(section: &Section, base_dir: &Path) -> std::io::Result<Option<Rotating>> {
    if section.file.trim().is_empty() {
        return Ok(None);
    }
    let path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Prefer a file count when given, else an age limit.
    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(
            i64::from(section.max_age_days.unwrap_or(1)),
        )),
    };
    let max_bytes = section.max_size_mb.unwrap_or(100) as usize * 1024 * 1024;

    let rot = FileRotate::new(
        &path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Ok(Some(Arc::new(Mutex::new(rot))))
}

fn build_file_router(cfg: &LoggingConfig, base_dir: &Path) -> FileRouter {
    let mut router = FileRouter::default();
    for (name, section) in cfg {
        match open_rotating(section, base_dir) {
            Ok(Some(file)) if name == "default" => router.default = Some(file),
            Ok(Some(file)) => router.by_prefix.push((name.clone(), file)),
            Ok(None) => {}
            Err(e) => eprintln!("Failed to open log file '{}' for '{name}': {e}", section.file),
        }
    }
    router
}

// ================= per-sink targets =================

enum Sink {
    Console,
    File { has_default_file: bool },
}

fn build_targets(cfg: &LoggingConfig, sink: Sink) -> Targets {
    let level_of = |section: &Section| match sink {
        Sink::Console => parse_level(&section.console_level),
        Sink::File { .. } => parse_level(&section.file_level),
    };

    let default_level = match (cfg.get("default"), &sink) {
        (Some(section), _) => level_of(section).unwrap_or(LevelFilter::OFF),
        (None, Sink::Console) => LevelFilter::INFO,
        (None, Sink::File { has_default_file }) => {
            if *has_default_file {
                LevelFilter::INFO
            } else {
                LevelFilter::OFF
            }
        }
    };

    let mut targets = Targets::new().with_default(default_level);
    for (name, section) in cfg.iter().filter(|(k, _)| k.as_str() != "default") {
        // a section without a file does not feed the file sink
        if matches!(sink, Sink::File { .. }) && section.file.trim().is_empty() {
            continue;
        }
        targets = targets.with_target(name.clone(), level_of(section).unwrap_or(LevelFilter::OFF));
    }
    targets
}

// ================= public init =================

/// Installs the global subscriber. Relative log file paths are resolved
/// against `base_dir` (normally the application home dir). `RUST_LOG`, when
/// set, caps every sink. Calling it again is a no-op.
pub fn init_logging_unified(cfg: &LoggingConfig, base_dir: &Path) {
    // Bridge `log` → `tracing` before installing the subscriber
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    if cfg.is_empty() {
        init_minimal();
        return;
    }

    let router = build_file_router(cfg, base_dir);
    let console_targets = build_targets(cfg, Sink::Console);
    let file_targets = build_targets(
        cfg,
        Sink::File {
            has_default_file: router.default.is_some(),
        },
    );

    let env = EnvFilter::try_from_default_env().ok();

    let (nb_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console_layer = fmt::layer()
        .with_writer(nb_stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets);

    let file_layer = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(file_targets)
    });

    let _ = tracing_subscriber::registry()
        .with(env)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// INFO to stderr; honors `RUST_LOG`.
fn init_minimal() {
    let env = EnvFilter::try_from_default_env().ok();
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(LevelFilter::INFO);

    let _ = tracing_subscriber::registry()
        .with(env)
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_logging_config;
    use tempfile::tempdir;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.into(),
            file: file.into(),
            file_level: file_level.into(),
            max_age_days: None,
            max_backups: Some(1),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level("off"), None);
        assert_eq!(parse_level("loud"), Some(LevelFilter::INFO));
    }

    #[test]
    fn prefixes_match_whole_path_segments() {
        assert!(matches_prefix("wirekit", "wirekit"));
        assert!(matches_prefix("wirekit::container", "wirekit"));
        assert!(!matches_prefix("wirekit_bootstrap", "wirekit"));
        assert!(!matches_prefix("cats", "wirekit"));
    }

    #[test]
    fn console_targets_follow_sections() {
        let mut cfg = default_logging_config();
        cfg.insert("wirekit".into(), section("debug", "", ""));
        cfg.insert("cats".into(), section("off", "", ""));

        let targets = build_targets(&cfg, Sink::Console);
        assert!(targets.would_enable("wirekit::graph", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("cats::api", &tracing::Level::ERROR));
        assert!(targets.would_enable("other", &tracing::Level::INFO));
        assert!(!targets.would_enable("other", &tracing::Level::DEBUG));
    }

    #[test]
    fn file_targets_skip_sections_without_file() {
        let mut cfg = LoggingConfig::new();
        cfg.insert("wirekit".into(), section("info", "", "trace"));
        cfg.insert("cats".into(), section("info", "logs/cats.log", "debug"));

        let targets = build_targets(
            &cfg,
            Sink::File {
                has_default_file: false,
            },
        );
        assert!(targets.would_enable("cats", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("wirekit", &tracing::Level::ERROR));
    }

    #[test]
    fn router_prefers_the_most_specific_section() {
        let tmp = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert("default".into(), section("info", "logs/all.log", "info"));
        cfg.insert("wirekit".into(), section("info", "logs/wirekit.log", "info"));
        cfg.insert(
            "wirekit::container".into(),
            section("info", "logs/container.log", "info"),
        );

        let router = build_file_router(&cfg, tmp.path());
        assert!(tmp.path().join("logs").is_dir());

        let container = router.route("wirekit::container").unwrap();
        let graph = router.route("wirekit::graph").unwrap();
        let other = router.route("cats").unwrap();
        assert!(!Arc::ptr_eq(&container, &graph));
        assert!(Arc::ptr_eq(&other, router.default.as_ref().unwrap()));
    }
}
