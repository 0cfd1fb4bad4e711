//! Category-filtered logging for the simulation core.
//!
//! Devices call [`log`] with a [`LogCategory`], a [`LogLevel`] and a closure
//! that builds the message. The closure only runs when the category is
//! enabled at that level and still has budget left in the current second,
//! so trace calls in per-cycle paths cost one atomic load when off.
//!
//! Levels live in a process-wide [`LogConfig`]: one global level plus an
//! optional override per category. Lines go to stderr, or to a file written
//! by a background thread fed over a channel.
//!
//! ```rust
//! use emu_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Cartridge, LogLevel::Debug, || {
//!     format!("Sega mapper: slot 2 -> bank {:02X}", 0x1F)
//! });
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Sender};

/// Lines per category per second before messages are dropped.
pub const DEFAULT_LINES_PER_SECOND: usize = 60;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        LogLevel::Off,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    /// Name or digit, case-insensitive.
    pub fn parse(text: &str) -> Option<Self> {
        let level = match text.to_ascii_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "err" | "1" => LogLevel::Error,
            "warn" | "warning" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => return None,
        };
        Some(level)
    }

    fn load(cell: &AtomicU8) -> Self {
        let raw = usize::from(cell.load(Ordering::Relaxed));
        Self::ALL.get(raw).copied().unwrap_or(LogLevel::Off)
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Frame pacing, control messages, FPS
    Scheduler,
    /// VDP/PPU register writes, mode changes, rendering
    Video,
    /// PSG writes and sample buffering
    Audio,
    /// Mapper register writes and bank switches
    Cartridge,
    /// Save-state encode/decode and slot storage
    SaveState,
    /// Interrupt lines (frame, line, STAT, timer)
    Interrupts,
    /// Hardware the machines only pretend to have
    Stubs,
}

const CATEGORY_COUNT: usize = LogCategory::ALL.len();

impl LogCategory {
    pub const ALL: [LogCategory; 7] = [
        LogCategory::Scheduler,
        LogCategory::Video,
        LogCategory::Audio,
        LogCategory::Cartridge,
        LogCategory::SaveState,
        LogCategory::Interrupts,
        LogCategory::Stubs,
    ];

    /// Category name or a device alias (`vdp`, `psg`, `mapper`, ...).
    pub fn parse(text: &str) -> Option<Self> {
        let category = match text.to_ascii_lowercase().as_str() {
            "scheduler" | "sched" => LogCategory::Scheduler,
            "video" | "vdp" | "ppu" => LogCategory::Video,
            "audio" | "psg" | "apu" => LogCategory::Audio,
            "cartridge" | "cart" | "mapper" => LogCategory::Cartridge,
            "savestate" | "state" => LogCategory::SaveState,
            "interrupts" | "irq" => LogCategory::Interrupts,
            "stubs" => LogCategory::Stubs,
            _ => return None,
        };
        Some(category)
    }

    pub fn name(self) -> &'static str {
        match self {
            LogCategory::Scheduler => "scheduler",
            LogCategory::Video => "video",
            LogCategory::Audio => "audio",
            LogCategory::Cartridge => "cartridge",
            LogCategory::SaveState => "savestate",
            LogCategory::Interrupts => "interrupts",
            LogCategory::Stubs => "stubs",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sliding one-second window of emitted lines for one category.
#[derive(Default)]
struct Budget {
    sent: VecDeque<Instant>,
    dropped: usize,
    reported: Option<Instant>,
}

/// What the throttle decided about one line.
#[derive(Debug, PartialEq, Eq)]
struct Admission {
    emit: bool,
    /// Lines dropped since the last report, when a report is due now.
    report_dropped: Option<usize>,
}

struct Throttle {
    per_second: AtomicUsize,
    budgets: Mutex<[Budget; CATEGORY_COUNT]>,
}

impl Throttle {
    fn new(per_second: usize) -> Self {
        Self {
            per_second: AtomicUsize::new(per_second),
            budgets: Mutex::new(Default::default()),
        }
    }

    fn admit(&self, category: LogCategory, now: Instant) -> Admission {
        let limit = self.per_second.load(Ordering::Relaxed);
        let mut budgets = self.budgets.lock().unwrap_or_else(PoisonError::into_inner);
        let budget = &mut budgets[category.index()];

        while budget
            .sent
            .front()
            .is_some_and(|&t| now.duration_since(t) > WINDOW)
        {
            budget.sent.pop_front();
        }

        if budget.sent.len() < limit {
            budget.sent.push_back(now);
            let report_dropped = (budget.dropped > 0).then(|| {
                budget.reported = Some(now);
                std::mem::take(&mut budget.dropped)
            });
            return Admission {
                emit: true,
                report_dropped,
            };
        }

        budget.dropped += 1;
        let due = budget
            .reported
            .map_or(true, |last| now.duration_since(last) >= WINDOW);
        let report_dropped = due.then(|| {
            budget.reported = Some(now);
            std::mem::take(&mut budget.dropped)
        });
        Admission {
            emit: false,
            report_dropped,
        }
    }
}

/// Process-wide log settings. Reach it through [`LogConfig::global`].
pub struct LogConfig {
    global: AtomicU8,
    /// `Off` means "follow the global level".
    overrides: [AtomicU8; CATEGORY_COUNT],
    throttle: Throttle,
    /// Feeds the file writer thread when a log file is set.
    file: Mutex<Option<Sender<String>>>,
}

impl LogConfig {
    fn new() -> Self {
        Self {
            global: AtomicU8::new(LogLevel::Off as u8),
            overrides: std::array::from_fn(|_| AtomicU8::new(LogLevel::Off as u8)),
            throttle: Throttle::new(DEFAULT_LINES_PER_SECOND),
            file: Mutex::new(None),
        }
    }

    pub fn global() -> &'static Self {
        static CONFIG: OnceLock<LogConfig> = OnceLock::new();
        CONFIG.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global.store(level as u8, Ordering::Relaxed);
    }

    pub fn global_level(&self) -> LogLevel {
        LogLevel::load(&self.global)
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.overrides[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self, category: LogCategory) -> LogLevel {
        LogLevel::load(&self.overrides[category.index()])
    }

    /// The category's override when it has one, the global level otherwise.
    pub fn effective_level(&self, category: LogCategory) -> LogLevel {
        match self.level(category) {
            LogLevel::Off => self.global_level(),
            level => level,
        }
    }

    pub fn enabled(&self, category: LogCategory, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self.effective_level(category)
    }

    /// Everything off, overrides cleared.
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    pub fn set_lines_per_second(&self, lines: usize) {
        self.throttle.per_second.store(lines, Ordering::Relaxed);
    }

    pub fn lines_per_second(&self) -> usize {
        self.throttle.per_second.load(Ordering::Relaxed)
    }

    /// Append lines to `path` from a background thread. Replaces a previous
    /// file; that writer exits once its channel closes.
    pub fn set_log_file(&self, path: PathBuf) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let (tx, rx) = unbounded::<String>();
        thread::Builder::new()
            .name("emu-log-writer".to_string())
            .spawn(move || {
                for line in rx {
                    if writeln!(file, "{line}").and_then(|_| file.flush()).is_err() {
                        break;
                    }
                }
            })?;
        *self.file.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(())
    }

    /// Back to stderr.
    pub fn clear_log_file(&self) {
        self.file.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn emit(&self, line: String) {
        let file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        match file.as_ref() {
            Some(tx) => {
                if let Err(err) = tx.send(line) {
                    eprintln!("{}", err.into_inner());
                }
            }
            None => eprintln!("{line}"),
        }
    }
}

fn format_line(category: LogCategory, level: LogLevel, message: &str) -> String {
    format!("{:<5} [{category}] {message}", level.label())
}

/// Log `message()` under `category` at `level`.
///
/// Each category may emit [`DEFAULT_LINES_PER_SECOND`] lines per second
/// (see [`LogConfig::set_lines_per_second`]); past that, lines are dropped
/// and a count of them is written at most once a second.
pub fn log<F>(category: LogCategory, level: LogLevel, message: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.enabled(category, level) {
        return;
    }
    let admission = config.throttle.admit(category, Instant::now());
    if let Some(dropped) = admission.report_dropped {
        config.emit(format_line(
            category,
            LogLevel::Warn,
            &format!("{dropped} line(s) dropped by the rate limit"),
        ));
    }
    if admission.emit {
        config.emit(format_line(category, level, &message()));
    }
}
