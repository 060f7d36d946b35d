use anyhow::{anyhow, bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// WAL operation types, one per user store mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalOperation {
    InsertUser {
        username: String,
        password_hash: String,
    },
    SetSession {
        username: String,
        token: String,
        timestamp: i64,
    },
    ClearSession {
        username: String,
    },
    SetSubscription {
        username: String,
        end: i64,
        months: u32,
    },
}

impl WalOperation {
    fn to_line(&self) -> String {
        match self {
            WalOperation::InsertUser {
                username,
                password_hash,
            } => format!("INSERT_USER|{}|{}", username, password_hash),
            WalOperation::SetSession {
                username,
                token,
                timestamp,
            } => format!("SET_SESSION|{}|{}|{}", username, token, timestamp),
            WalOperation::ClearSession { username } => format!("CLEAR_SESSION|{}", username),
            WalOperation::SetSubscription {
                username,
                end,
                months,
            } => format!("SET_SUBSCRIPTION|{}|{}|{}", username, end, months),
        }
    }

    fn from_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split('|').collect();

        let username = |idx: usize| -> Result<String> {
            match parts.get(idx) {
                Some(name) if !name.is_empty() => Ok(name.to_string()),
                _ => bail!("Missing username"),
            }
        };

        match parts.first() {
            Some(&"INSERT_USER") => {
                if parts.len() != 3 {
                    bail!("Invalid INSERT_USER format");
                }
                if parts[2].is_empty() {
                    bail!("Missing password hash");
                }

                Ok(WalOperation::InsertUser {
                    username: username(1)?,
                    password_hash: parts[2].to_string(),
                })
            }
            Some(&"SET_SESSION") => {
                if parts.len() != 4 {
                    bail!("Invalid SET_SESSION format");
                }
                let timestamp = parts[3].parse::<i64>().context("Invalid session timestamp")?;

                Ok(WalOperation::SetSession {
                    username: username(1)?,
                    token: parts[2].to_string(),
                    timestamp,
                })
            }
            Some(&"CLEAR_SESSION") => {
                if parts.len() != 2 {
                    bail!("Invalid CLEAR_SESSION format");
                }

                Ok(WalOperation::ClearSession {
                    username: username(1)?,
                })
            }
            Some(&"SET_SUBSCRIPTION") => {
                if parts.len() != 4 {
                    bail!("Invalid SET_SUBSCRIPTION format");
                }
                let end = parts[2].parse::<i64>().context("Invalid subscription end")?;
                let months = parts[3].parse::<u32>().context("Invalid subscription months")?;

                Ok(WalOperation::SetSubscription {
                    username: username(1)?,
                    end,
                    months,
                })
            }
            _ => bail!("Unknown operation type"),
        }
    }
}

pub struct Wal {
    file: Mutex<File>,
    path: PathBuf,
}

impl Wal {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .context("Failed to open WAL file")?;

        terminate_partial_line(&mut file, &path)?;

        Ok(Wal {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, File>> {
        self.file.lock().map_err(|_| anyhow!("WAL lock poisoned"))
    }

    pub fn log_operation(&self, op: &WalOperation) -> Result<()> {
        let line = op.to_line();
        let mut file = self.lock()?;
        writeln!(file, "{}", line).context("Failed to write to WAL")?;
        file.flush().context("Failed to flush WAL")?;
        Ok(())
    }

    pub fn replay(&self) -> Result<Vec<WalOperation>> {
        let file = File::open(&self.path).context("Failed to open WAL for replay")?;
        let reader = BufReader::new(file);
        let mut operations = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.context("Failed to read line from WAL")?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            match WalOperation::from_line(line) {
                Ok(op) => operations.push(op),
                Err(e) => {
                    tracing::warn!(
                        line_num = line_num + 1,
                        error = %e,
                        "Failed to parse WAL line, skipping"
                    );
                }
            }
        }

        Ok(operations)
    }

    /// Force buffered writes down to disk
    pub fn sync(&self) -> Result<()> {
        let file = self.lock()?;
        file.sync_all().context("Failed to sync WAL")?;
        Ok(())
    }
}

/// A crash mid-append can leave the last line without its newline. Close it
/// off so the next record starts on a line of its own; replay then skips only
/// the torn record.
fn terminate_partial_line(file: &mut File, path: &Path) -> Result<()> {
    let len = file.metadata().context("Failed to stat WAL file")?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))
        .and_then(|_| file.read_exact(&mut last))
        .context("Failed to read WAL tail")?;

    if last[0] != b'\n' {
        tracing::warn!(wal_path = %path.display(), "WAL ends with a partial line, terminating it");
        file.write_all(b"\n").context("Failed to terminate partial WAL line")?;
        file.flush().context("Failed to flush WAL")?;
    }

    Ok(())
}
