//! 検査済みの開始値を記録する台帳。
//!
//! 1行1整数の追記専用テキストファイル。起動時に一度だけ読み込み、
//! 以後はメモリ上の集合で所属判定する。所属判定は参考情報であり、
//! 同じ値を二度検査しても結果は変わらない。

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use num_bigint::BigInt;
use tracing::{debug, warn};

use crate::error::{CollatzError, Result};

/// 検査済み判定と記録のインターフェース
pub trait CheckedLedger: Send + Sync {
    fn has_been_checked(&self, n: &BigInt) -> bool;
    fn record_checked(&self, n: &BigInt) -> Result<()>;
    /// 記録済みの異なる値の数
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// メモリのみの台帳
#[derive(Debug, Default)]
pub struct MemoryLedger {
    seen: Mutex<HashSet<BigInt>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckedLedger for MemoryLedger {
    fn has_been_checked(&self, n: &BigInt) -> bool {
        self.seen.lock().map(|s| s.contains(n)).unwrap_or(false)
    }

    fn record_checked(&self, n: &BigInt) -> Result<()> {
        let mut seen = self.seen.lock().map_err(|_| CollatzError::LockPoisoned)?;
        seen.insert(n.clone());
        Ok(())
    }

    fn len(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }
}

struct FileState {
    seen: HashSet<BigInt>,
    writer: BufWriter<File>,
}

/// ファイルに追記する台帳。書き込みは単一のロックで直列化する。
pub struct FileLedger {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileLedger {
    /// 既存の台帳を読み込み、追記用に開く。ファイルが無ければ空で始める。
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let seen = load_entries(&path)?;
        let ledger_err = |source| CollatzError::Ledger { path: path.clone(), source };
        let unterminated = lacks_trailing_newline(&path).map_err(ledger_err)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(ledger_err)?;
        let mut writer = BufWriter::new(file);
        if unterminated {
            // 改行の無い最終行に次の値が連結されないようにする
            warn!(path = %path.display(), "ledger does not end with a newline, terminating last line");
            writer.write_all(b"\n").and_then(|_| writer.flush()).map_err(ledger_err)?;
        }
        debug!(path = %path.display(), entries = seen.len(), "ledger opened");
        Ok(FileLedger {
            path,
            state: Mutex::new(FileState { seen, writer }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 空でないファイルの最後のバイトが改行でなければ true
fn lacks_trailing_newline(path: &Path) -> std::io::Result<bool> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn load_entries(path: &Path) -> Result<HashSet<BigInt>> {
    let mut seen = HashSet::new();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(seen),
        Err(source) => return Err(CollatzError::Ledger { path: path.to_path_buf(), source }),
    };
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| CollatzError::Ledger { path: path.to_path_buf(), source })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match BigInt::from_str(trimmed) {
            Ok(n) => {
                seen.insert(n);
            }
            Err(_) => warn!(path = %path.display(), line = lineno + 1, "skipping malformed ledger entry"),
        }
    }
    Ok(seen)
}

impl CheckedLedger for FileLedger {
    fn has_been_checked(&self, n: &BigInt) -> bool {
        self.state.lock().map(|s| s.seen.contains(n)).unwrap_or(false)
    }

    fn record_checked(&self, n: &BigInt) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CollatzError::LockPoisoned)?;
        let write = writeln!(state.writer, "{}", n).and_then(|_| state.writer.flush());
        write.map_err(|source| CollatzError::Ledger { path: self.path.clone(), source })?;
        state.seen.insert(n.clone());
        Ok(())
    }

    fn len(&self) -> usize {
        self.state.lock().map(|s| s.seen.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_ledger_roundtrip() {
        let ledger = MemoryLedger::new();
        let n = BigInt::from(295147905179352825857u128);
        assert!(!ledger.has_been_checked(&n));
        ledger.record_checked(&n).unwrap();
        ledger.record_checked(&n).unwrap();
        assert!(ledger.has_been_checked(&n));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_file_ledger_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("checked_numbers.txt")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_file_ledger_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checked_numbers.txt");
        std::fs::write(&path, "17\n\nnot-a-number\n19\n17\n").unwrap();
        let ledger = FileLedger::open(&path).unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.has_been_checked(&BigInt::from(19)));
    }

    #[test]
    fn test_file_ledger_terminates_unfinished_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checked_numbers.txt");
        std::fs::write(&path, "17").unwrap();
        let n = BigInt::from(295147905179352825857u128);
        {
            let ledger = FileLedger::open(&path).unwrap();
            ledger.record_checked(&n).unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "17\n295147905179352825857\n");

        let reopened = FileLedger::open(&path).unwrap();
        assert!(reopened.has_been_checked(&BigInt::from(17)));
        assert!(reopened.has_been_checked(&n));
        assert_eq!(reopened.len(), 2);
        // 改行で終わっていれば何も足さない
        drop(reopened);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "17\n295147905179352825857\n");
    }

    #[test]
    fn test_memory_ledger_poisoned_lock_is_an_error() {
        let ledger = std::sync::Arc::new(MemoryLedger::new());
        let poisoner = ledger.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.seen.lock().unwrap();
            panic!("poison the ledger lock");
        })
        .join();
        assert!(matches!(
            ledger.record_checked(&BigInt::from(7)),
            Err(CollatzError::LockPoisoned)
        ));
    }
}
