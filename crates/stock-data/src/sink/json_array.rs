//! 여러 실행에 걸쳐 이어 쓰는 JSON 배열 파일.
//!
//! 파일은 `[` 로 시작해 객체를 하나씩 덧붙이고, 마지막 객체 뒤에 `]` 로 닫힙니다.
//! 쓰기 전에 파일 끝을 검사해 상태를 판정하므로, 이미 닫힌 파일에 추가하거나
//! 중단된 실행이 남긴 열린 파일을 이어 쓸 수 있습니다. 객체 중간에서 끊긴 파일은
//! 마지막 완전한 객체까지 잘라낸 뒤 이어 씁니다.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use super::RecordSink;
use crate::{DataError, Result, Table};

/// 객체 사이 구분자
const SEPARATOR: &[u8] = b",\n";

/// 파일 끝 상태 (공백 제외)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    /// 파일 없음 또는 공백뿐
    Missing,
    /// `[` 만 있음
    Empty,
    /// 마지막 객체 뒤에 구분자 없음
    AfterObject,
    /// 마지막 객체 뒤에 구분자 있음 (다음 객체 대기)
    AfterSeparator,
    /// `]` 로 닫힘
    Closed,
    /// 배열로 해석할 수 없는 끝
    Corrupt,
}

/// 파일 끝 상태와 마지막 유효 문자 위치
#[derive(Debug, Clone, Copy)]
struct Tail {
    state: TailState,
    /// 마지막 유효 문자의 바이트 오프셋
    pos: u64,
}

/// JSON 배열 파일 핸들
#[derive(Debug, Clone)]
pub struct JsonArrayFile {
    path: PathBuf,
}

impl JsonArrayFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 파일이 없으면 `[` 로 초기화
    pub fn init(&self) -> Result<()> {
        if self.tail()?.state == TailState::Missing {
            self.ensure_parent()?;
            let mut file = File::create(&self.path)?;
            file.write_all(b"[")?;
        }
        Ok(())
    }

    /// 현재 파일 끝 상태
    pub fn tail_state(&self) -> Result<TailState> {
        Ok(self.tail()?.state)
    }

    /// 객체 하나를 추가.
    ///
    /// `is_last`이면 배열을 닫고, 아니면 다음 객체를 위한 구분자를 남깁니다.
    pub fn append(&self, record: &Map<String, Value>, is_last: bool) -> Result<()> {
        let tail = self.checked_tail()?;
        let mut file = match tail.state {
            TailState::Missing => {
                self.ensure_parent()?;
                let mut file = File::create(&self.path)?;
                file.write_all(b"[")?;
                file
            }
            TailState::Empty => self.open_truncated(tail.pos + 1)?,
            TailState::AfterSeparator => {
                // 구분자 뒤 공백 제거 후 그대로 이어 씀
                let mut file = self.open_truncated(tail.pos)?;
                file.write_all(SEPARATOR)?;
                file
            }
            TailState::AfterObject => {
                let mut file = self.open_truncated(tail.pos + 1)?;
                file.write_all(SEPARATOR)?;
                file
            }
            TailState::Closed => match self.significant_before(tail.pos)? {
                Some((pos, b'[')) => self.open_truncated(pos + 1)?,
                Some((pos, b'}')) => {
                    let mut file = self.open_truncated(pos + 1)?;
                    file.write_all(SEPARATOR)?;
                    file
                }
                Some((pos, b',')) => {
                    // `,]` 형태는 구분자를 한 번만 남김
                    let mut file = self.open_truncated(pos)?;
                    file.write_all(SEPARATOR)?;
                    file
                }
                _ => {
                    return Err(DataError::InvalidData(format!(
                        "cannot reopen JSON array in {}",
                        self.path.display()
                    )))
                }
            },
            TailState::Corrupt => {
                return Err(DataError::InvalidData(format!(
                    "unexpected end of JSON array in {}",
                    self.path.display()
                )))
            }
        };

        file.write_all(&pretty(record)?)?;
        file.write_all(if is_last { b"]" } else { SEPARATOR })?;
        file.flush()?;
        Ok(())
    }

    /// 열린 배열을 닫음.
    ///
    /// 이미 닫혀 있거나 파일이 없으면 아무것도 하지 않습니다.
    pub fn finish(&self) -> Result<()> {
        let tail = self.checked_tail()?;
        match tail.state {
            TailState::Closed | TailState::Missing => Ok(()),
            TailState::Empty | TailState::AfterObject => {
                let mut file = self.open_truncated(tail.pos + 1)?;
                file.write_all(b"]")?;
                Ok(())
            }
            TailState::AfterSeparator => {
                let mut file = self.open_truncated(tail.pos)?;
                file.write_all(b"]")?;
                Ok(())
            }
            TailState::Corrupt => Err(DataError::InvalidData(format!(
                "cannot close JSON array in {}",
                self.path.display()
            ))),
        }
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// `len` 으로 자른 뒤 끝에 쓰기 위치를 둔 파일 핸들
    fn open_truncated(&self, len: u64) -> Result<File> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.set_len(len)?;
        file.seek(SeekFrom::End(0))?;
        Ok(file)
    }

    /// 파일 끝 상태. 끊긴 객체가 있으면 먼저 복구합니다.
    fn checked_tail(&self) -> Result<Tail> {
        let tail = self.tail()?;
        if tail.state == TailState::Corrupt {
            return self.repair();
        }
        Ok(tail)
    }

    /// 마지막 완전한 경계(`[`, 최상위 `}`, 닫는 `]`)까지 파일을 자름
    fn repair(&self) -> Result<Tail> {
        let bytes = fs::read(&self.path)?;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut boundary: Option<Tail> = None;

        for (i, &byte) in bytes.iter().enumerate() {
            if in_string {
                match byte {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            let pos = i as u64;
            match byte {
                b'"' => in_string = true,
                b'[' if depth == 0 => {
                    depth = 1;
                    boundary = Some(Tail {
                        state: TailState::Empty,
                        pos,
                    });
                }
                b'{' | b'[' => depth += 1,
                b'}' | b']' if depth > 0 => {
                    depth -= 1;
                    if depth == 1 && byte == b'}' {
                        boundary = Some(Tail {
                            state: TailState::AfterObject,
                            pos,
                        });
                    } else if depth == 0 {
                        boundary = Some(Tail {
                            state: TailState::Closed,
                            pos,
                        });
                        break;
                    }
                }
                _ if depth == 0 && !byte.is_ascii_whitespace() => break,
                _ => {}
            }
        }

        let tail = boundary.ok_or_else(|| {
            DataError::InvalidData(format!("no JSON array found in {}", self.path.display()))
        })?;
        let keep = tail.pos + 1;
        self.open_truncated(keep)?;
        tracing::warn!(
            path = %self.path.display(),
            removed_bytes = bytes.len() as u64 - keep,
            "끊긴 JSON 배열 복구"
        );
        Ok(tail)
    }

    fn tail(&self) -> Result<Tail> {
        if !self.path.exists() {
            return Ok(Tail {
                state: TailState::Missing,
                pos: 0,
            });
        }
        let len = fs::metadata(&self.path)?.len();
        let state = match self.significant_before(len)? {
            None => {
                return Ok(Tail {
                    state: TailState::Missing,
                    pos: 0,
                })
            }
            Some((pos, byte)) => {
                let state = match byte {
                    b'[' => TailState::Empty,
                    b'}' => TailState::AfterObject,
                    b',' => TailState::AfterSeparator,
                    b']' => TailState::Closed,
                    _ => TailState::Corrupt,
                };
                Tail { state, pos }
            }
        };
        Ok(state)
    }

    /// `end` 이전의 마지막 공백이 아닌 바이트 (위치, 값)
    fn significant_before(&self, end: u64) -> Result<Option<(u64, u8)>> {
        const CHUNK: u64 = 256;

        let mut file = File::open(&self.path)?;
        let mut end = end;
        let mut buf = vec![0u8; CHUNK as usize];

        while end > 0 {
            let start = end.saturating_sub(CHUNK);
            let size = (end - start) as usize;
            file.seek(SeekFrom::Start(start))?;
            file.read_exact(&mut buf[..size])?;

            if let Some(offset) = buf[..size].iter().rposition(|b| !b.is_ascii_whitespace()) {
                return Ok(Some((start + offset as u64, buf[offset])));
            }
            end = start;
        }
        Ok(None)
    }
}

/// 4칸 들여쓰기 JSON 직렬화
fn pretty(record: &Map<String, Value>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    record.serialize(&mut ser)?;
    Ok(out)
}

/// 식별자마다 행을 JSON 배열 파일에 추가하는 싱크
#[derive(Debug, Clone)]
pub struct JsonArraySink {
    file: JsonArrayFile,
    objects_written: usize,
}

impl JsonArraySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonArrayFile::new(path),
            objects_written: 0,
        }
    }

    pub fn objects_written(&self) -> usize {
        self.objects_written
    }
}

impl RecordSink for JsonArraySink {
    fn accept(&mut self, identifier: &str, rows: &Table, is_last: bool) -> Result<()> {
        let records = rows.records();
        let count = records.len();
        for (i, record) in records.iter().enumerate() {
            self.file.append(record, is_last && i + 1 == count)?;
            self.objects_written += 1;
        }
        tracing::info!(
            symbol = identifier,
            objects = count,
            path = %self.file.path().display(),
            "JSON 기록 완료"
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.file.finish()
    }
}
