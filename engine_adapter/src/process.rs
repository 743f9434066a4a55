/*
 *  Motors, a collection of games and engines.
 *  Copyright (C) 2024 ToTheAnd
 *
 *  Motors is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  Motors is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with Motors. If not, see <https://www.gnu.org/licenses/>.
 */

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

use crate::Res;

/// A live engine subprocess: its handle, and line-buffered ends of its stdio pipes.
///
/// Dialects (`uci`, `xboard`) never touch `Child` directly; they speak through
/// `send_string`/`read_string` only, so restart/crash handling lives in one place.
pub struct EngineProcess {
    child: Child,
    to_engine: ChildStdin,
    from_engine: Lines<BufReader<ChildStdout>>,
}

impl EngineProcess {
    pub fn from_path(path: &str) -> Res<Self> {
        Self::new(Path::new(path), &[])
    }

    pub fn new(file: &Path, args: &[String]) -> Res<Self> {
        let mut cmd = Command::new(file);
        cmd.kill_on_drop(true)
            .stdout(Stdio::piped())
            .stdin(Stdio::piped())
            .stderr(Stdio::null())
            .args(args);
        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take().unwrap();
        let to_engine = child.stdin.take().unwrap();
        let reader = BufReader::new(stdout).lines();
        Ok(Self {
            child,
            to_engine,
            from_engine: reader,
        })
    }

    pub async fn send_string(&mut self, message: &str) -> Res<()> {
        self.to_engine.write_all(message.as_bytes()).await?;
        self.to_engine.write_all(b"\n").await?;
        self.to_engine.flush().await?;
        Ok(())
    }

    pub async fn read_string(&mut self, time_limit: Duration) -> Res<String> {
        let res = timeout(time_limit, self.from_engine.next_line())
            .await??
            .ok_or(NoNextLineError)?;
        Ok(res)
    }

    /// Non-blocking liveness check, used by the Game Worker's Recovering state to
    /// decide whether a silent engine has actually died before attempting a restart.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    pub async fn kill(mut self) {
        let _ = self.child.kill().await;
    }
}

#[derive(Debug, Error)]
struct NoNextLineError;

impl Display for NoNextLineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "engine closed its output stream without a final line")
    }
}
