//! 재시도 정책.
//!
//! 고정 대기 스케줄(기본 10초/30초/60초)로 재시도하며, 오류 메시지에
//! 제공자의 쿨다운 힌트("retry after N seconds")가 있으면 N초 + 여유 시간을 기다립니다.
//! 힌트는 초 또는 분 단위가 붙은 경우만 인정하고 [`MAX_COOLDOWN_SECS`]로 제한합니다.
//! 힌트는 대기 시간만 바꾸고 시도 횟수는 바꾸지 않습니다.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error_log::ErrorLog;

/// 쿨다운 힌트 상한 (초)
pub const MAX_COOLDOWN_SECS: u64 = 3600;

/// 쿨다운 힌트 표현 (소문자 비교)
const COOLDOWN_MARKERS: [&str; 5] = [
    "retry after",
    "try again after",
    "try again in",
    "please wait",
    "thử lại sau",
];

/// 재시도 정책
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// i번째 재시도 전 대기 시간
    pub delays: Vec<Duration>,
    /// 쿨다운 힌트에 더하는 여유 시간
    pub rate_limit_buffer: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_secs(&[10, 30, 60], 5)
    }
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>, rate_limit_buffer: Duration) -> Self {
        Self {
            delays,
            rate_limit_buffer,
        }
    }

    pub fn from_secs(delays: &[u64], rate_limit_buffer_secs: u64) -> Self {
        Self::new(
            delays.iter().map(|&s| Duration::from_secs(s)).collect(),
            Duration::from_secs(rate_limit_buffer_secs),
        )
    }

    /// 재시도 없는 정책
    pub fn none() -> Self {
        Self::new(Vec::new(), Duration::ZERO)
    }

    /// 최대 시도 횟수 (첫 시도 포함)
    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// `retry_idx`번째 재시도 전 대기 시간
    pub fn resolve_delay(&self, retry_idx: usize, message: &str) -> Duration {
        match parse_cooldown_hint(message) {
            Some(secs) => Duration::from_secs(secs.min(MAX_COOLDOWN_SECS))
                .saturating_add(self.rate_limit_buffer),
            None => self
                .delays
                .get(retry_idx)
                .or_else(|| self.delays.last())
                .copied()
                .unwrap_or(Duration::ZERO),
        }
    }

    /// 작업을 정책에 따라 재시도.
    ///
    /// 재시도할 때마다 `"Retry {n} for {label} due to error: {e}"`를 기록하고,
    /// 스케줄을 모두 소진하면 마지막 오류를 반환합니다.
    pub async fn retry<F, Fut, T, E>(&self, label: &str, log: &dyn ErrorLog, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.delays.len() {
                        return Err(err);
                    }
                    let message = err.to_string();
                    let delay = self.resolve_delay(attempt, &message);
                    log.record(&format!(
                        "Retry {} for {} due to error: {}",
                        attempt + 1,
                        label,
                        message
                    ));
                    tracing::debug!(
                        label = label,
                        attempt = attempt + 1,
                        wait_secs = delay.as_secs_f64(),
                        "재시도 대기"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// 오류 메시지에서 쿨다운 시간(초) 추출.
///
/// 숫자 뒤에 초 또는 분 단위가 있어야 합니다. 단위가 없으면 힌트로 보지 않습니다.
pub fn parse_cooldown_hint(message: &str) -> Option<u64> {
    let lower = message.to_lowercase();
    COOLDOWN_MARKERS.iter().find_map(|marker| {
        let idx = lower.find(marker)?;
        let rest = lower[idx + marker.len()..].trim_start_matches(|c: char| c.is_whitespace() || c == ':');
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let value: u64 = match digits.parse() {
            Ok(value) => value,
            // u64 범위를 넘는 값
            Err(_) if !digits.is_empty() => u64::MAX,
            Err(_) => return None,
        };
        let unit: String = rest[digits.len()..]
            .trim_start()
            .chars()
            .take_while(|c| c.is_alphabetic())
            .collect();
        match unit.as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" | "giây" => Some(value),
            "m" | "min" | "mins" | "minute" | "minutes" | "phút" => Some(value.saturating_mul(60)),
            _ => None,
        }
    })
}
