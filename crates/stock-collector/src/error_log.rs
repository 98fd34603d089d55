//! 에러 로그.
//!
//! 재시도 알림과 종목별 최종 실패를 `"{시각} - {메시지}"` 한 줄씩 기록합니다.
//! 기록 실패는 tracing으로만 보고하며 호출자에게 전파하지 않습니다.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Local};

/// 에러 로그 기록자
pub trait ErrorLog: Send + Sync {
    fn record(&self, message: &str);
}

/// 기록된 에러 한 건
#[derive(Debug, Clone)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl ErrorLogEntry {
    fn new(message: &str) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.to_string(),
        }
    }

    /// 파일에 기록되는 한 줄
    pub fn line(&self) -> String {
        format!(
            "{} - {}\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
            self.message
        )
    }
}

/// 파일 append 에러 로그
#[derive(Debug)]
pub struct FileErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::error!(path = %path.display(), error = %e, "에러 로그 디렉토리 생성 실패");
                }
            }
        }
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

impl ErrorLog for FileErrorLog {
    fn record(&self, message: &str) {
        tracing::warn!("{}", message);

        let entry = ErrorLogEntry::new(message);
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = self.append(&entry.line()) {
            tracing::error!(path = %self.path.display(), error = %e, "에러 로그 기록 실패");
        }
    }
}

/// 메모리 에러 로그 (테스트, 결과 검사용)
#[derive(Debug, Default)]
pub struct MemoryErrorLog {
    entries: Mutex<Vec<ErrorLogEntry>>,
}

impl MemoryErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorLog for MemoryErrorLog {
    fn record(&self, message: &str) {
        tracing::debug!("{}", message);
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.push(ErrorLogEntry::new(message));
    }
}
