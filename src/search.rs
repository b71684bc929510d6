//! 2^68 超の奇数に対する無人探索。
//!
//! ワーカースレッドが状態 (`SearchState`) を所有し、コマンドチャネル経由で
//! のみ遷移する。進捗はイベントチャネルで前面に流し、前面はワーカーの
//! メモリに触れない。

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use num_bigint::BigInt;
use tracing::{debug, error, info, info_span, warn};

use crate::candidate::{trivial_threshold, CandidateGenerator, CandidateMode};
use crate::engine::{self, Outcome, StepKind, Trajectory, DEFAULT_SEARCH_CAP};
use crate::error::Result;
use crate::ledger::CheckedLedger;

/// 一時停止中にコマンドを待つ間隔
const PAUSE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Running,
    Paused,
    Stopping,
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchState::Idle => "idle",
            SearchState::Running => "running",
            SearchState::Paused => "paused",
            SearchState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub enum SearchCommand {
    Start,
    Pause,
    Resume,
    TogglePause,
    Stop,
    SetDelay(Duration),
    SetMode(CandidateMode),
    /// ワーカースレッドを終了する
    Shutdown,
}

/// 探索レベルでの判定。`Outcome` を 2^68 境界と合わせて解釈する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// 1 に到達、または {1,2,4} を再訪
    Trivial,
    NonTrivialCycle { cycle: Vec<BigInt> },
    /// 上限に達したが、最後の値は検証済み領域 (2^68 未満) に落ちている
    FellBelowThreshold,
    /// 上限に達し、2^68 以上に留まっている
    Inconclusive,
}

impl Verdict {
    pub fn classify(trajectory: &Trajectory, outcome: &Outcome) -> Self {
        match outcome {
            Outcome::ReachedTrivialCycle => Verdict::Trivial,
            Outcome::ReachedNonTrivialCycle { cycle } => Verdict::NonTrivialCycle { cycle: cycle.clone() },
            Outcome::StepCapReached => match trajectory.last() {
                Some(last) if *last < trivial_threshold() => Verdict::FellBelowThreshold,
                _ => Verdict::Inconclusive,
            },
        }
    }

    pub fn is_trivial(&self) -> bool {
        matches!(self, Verdict::Trivial | Verdict::FellBelowThreshold)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Trivial => f.write_str("trivial"),
            Verdict::NonTrivialCycle { cycle } => write!(f, "NON-TRIVIAL cycle (length {})", cycle.len()),
            Verdict::FellBelowThreshold => f.write_str("fell below 2^68"),
            Verdict::Inconclusive => f.write_str("inconclusive"),
        }
    }
}

/// 1候補の検査結果
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub candidate: BigInt,
    pub verdict: Verdict,
    pub trajectory_len: usize,
    pub session_checked: u64,
    pub total_checked: u64,
}

#[derive(Debug, Clone)]
pub enum SearchEvent {
    StateChanged(SearchState),
    Checked(CheckReport),
    Skipped(BigInt),
    NonTrivialCycle { candidate: BigInt, cycle: Vec<BigInt> },
    NoCandidates,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub step_cap: u64,
    /// 表示のための検査間隔
    pub delay: Duration,
    pub mode: CandidateMode,
    /// 1セッションで検査する候補数の上限
    pub max_candidates: Option<u64>,
    /// 乱数候補の種 (テスト用)
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            step_cap: DEFAULT_SEARCH_CAP,
            delay: Duration::from_millis(100),
            mode: CandidateMode::Sequential,
            max_candidates: None,
            seed: None,
        }
    }
}

/// ワーカースレッドへの窓口。drop するとワーカーを終了して join する。
pub struct SearchHandle {
    commands: Sender<SearchCommand>,
    events: Receiver<SearchEvent>,
    worker: Option<JoinHandle<()>>,
}

impl SearchHandle {
    pub fn spawn(config: SearchConfig, ledger: Arc<dyn CheckedLedger>) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (evt_tx, evt_rx) = mpsc::channel();
        let total_checked = ledger.len() as u64;
        let generator = match config.seed {
            Some(seed) => CandidateGenerator::with_seed(config.mode, seed),
            None => CandidateGenerator::new(config.mode),
        };
        let worker = Worker {
            config,
            state: SearchState::Idle,
            generator,
            ledger,
            commands: cmd_rx,
            events: evt_tx,
            session_checked: 0,
            total_checked,
        };
        let join = thread::Builder::new()
            .name("collatz-search".to_string())
            .spawn(move || worker.run())?;
        Ok(SearchHandle { commands: cmd_tx, events: evt_rx, worker: Some(join) })
    }

    /// コマンド送信。ワーカーが終了していれば false。
    pub fn send(&self, command: SearchCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// 別スレッド (入力待ちなど) からコマンドを送るための送信側
    pub fn command_sender(&self) -> Sender<SearchCommand> {
        self.commands.clone()
    }

    pub fn start(&self) -> bool {
        self.send(SearchCommand::Start)
    }

    pub fn toggle_pause(&self) -> bool {
        self.send(SearchCommand::TogglePause)
    }

    pub fn stop(&self) -> bool {
        self.send(SearchCommand::Stop)
    }

    pub fn events(&self) -> &Receiver<SearchEvent> {
        &self.events
    }

    /// 溜まっているイベントをブロックせずに取り出す
    pub fn drain_events(&self) -> Vec<SearchEvent> {
        self.events.try_iter().collect()
    }
}

impl Drop for SearchHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(SearchCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("search worker panicked");
            }
        }
    }
}

struct Worker {
    config: SearchConfig,
    state: SearchState,
    generator: CandidateGenerator,
    ledger: Arc<dyn CheckedLedger>,
    commands: Receiver<SearchCommand>,
    events: Sender<SearchEvent>,
    session_checked: u64,
    total_checked: u64,
}

impl Worker {
    fn run(mut self) {
        let span = info_span!("search", cap = self.config.step_cap);
        let _enter = span.enter();
        debug!("search worker started");

        loop {
            match self.state {
                SearchState::Idle => match self.commands.recv() {
                    Ok(cmd) => {
                        if !self.apply(cmd) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                SearchState::Paused => match self.commands.recv_timeout(PAUSE_POLL) {
                    Ok(cmd) => {
                        if !self.apply(cmd) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                SearchState::Stopping => {
                    info!(session_checked = self.session_checked, "search stopped");
                    self.set_state(SearchState::Idle);
                }
                SearchState::Running => {
                    if !self.drain_commands() {
                        break;
                    }
                    if self.state != SearchState::Running {
                        continue;
                    }
                    if self.limit_reached() {
                        self.set_state(SearchState::Stopping);
                        continue;
                    }
                    if let Err(e) = self.check_next() {
                        error!(error = %e, "search loop failed");
                        self.emit(SearchEvent::Failed(e.to_string()));
                        self.set_state(SearchState::Stopping);
                        continue;
                    }
                    if self.limit_reached() {
                        self.set_state(SearchState::Stopping);
                        continue;
                    }
                    if !self.pace() {
                        break;
                    }
                }
            }
        }

        debug!("search worker exiting");
    }

    /// 戻り値 false はワーカー終了
    fn apply(&mut self, command: SearchCommand) -> bool {
        use SearchState::*;
        match command {
            SearchCommand::Start => match self.state {
                Idle => {
                    self.session_checked = 0;
                    info!(mode = ?self.generator.mode(), "search started");
                    self.set_state(Running);
                }
                Paused => self.set_state(Running),
                Running | Stopping => {}
            },
            SearchCommand::Pause => {
                if self.state == Running {
                    self.set_state(Paused);
                }
            }
            SearchCommand::Resume => {
                if self.state == Paused {
                    self.set_state(Running);
                }
            }
            SearchCommand::TogglePause => match self.state {
                Running => self.set_state(Paused),
                Paused => self.set_state(Running),
                Idle | Stopping => {}
            },
            SearchCommand::Stop => {
                if matches!(self.state, Running | Paused) {
                    self.set_state(Stopping);
                }
            }
            SearchCommand::SetDelay(delay) => self.config.delay = delay,
            SearchCommand::SetMode(mode) => self.generator.set_mode(mode),
            SearchCommand::Shutdown => return false,
        }
        true
    }

    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => {
                    if !self.apply(cmd) {
                        return false;
                    }
                }
                Err(mpsc::TryRecvError::Empty) => return true,
                Err(mpsc::TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// 検査間隔だけ待つ。待機中に届いたコマンドはその場で処理する。
    fn pace(&mut self) -> bool {
        if self.config.delay.is_zero() {
            return true;
        }
        match self.commands.recv_timeout(self.config.delay) {
            Ok(cmd) => self.apply(cmd),
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn limit_reached(&self) -> bool {
        self.config
            .max_candidates
            .is_some_and(|max| self.session_checked >= max)
    }

    fn check_next(&mut self) -> Result<()> {
        let Some(candidate) = self.generator.next_candidate() else {
            warn!("no valid candidates in range");
            self.emit(SearchEvent::NoCandidates);
            self.set_state(SearchState::Stopping);
            return Ok(());
        };

        if self.ledger.has_been_checked(&candidate) {
            debug!(%candidate, "skipping already checked number");
            self.emit(SearchEvent::Skipped(candidate));
            return Ok(());
        }

        let (trajectory, outcome) = engine::trace(&candidate, self.config.step_cap, StepKind::Accelerated)?;
        let verdict = Verdict::classify(&trajectory, &outcome);

        self.ledger.record_checked(&candidate)?;
        self.session_checked += 1;
        self.total_checked += 1;

        if let Verdict::NonTrivialCycle { cycle } = &verdict {
            warn!(%candidate, cycle_len = cycle.len(), "non-trivial cycle found");
            self.emit(SearchEvent::NonTrivialCycle { candidate: candidate.clone(), cycle: cycle.clone() });
        } else {
            debug!(%candidate, %verdict, len = trajectory.len(), "checked");
        }

        self.emit(SearchEvent::Checked(CheckReport {
            candidate,
            verdict,
            trajectory_len: trajectory.len(),
            session_checked: self.session_checked,
            total_checked: self.total_checked,
        }));
        Ok(())
    }

    fn set_state(&mut self, state: SearchState) {
        if self.state != state {
            self.state = state;
            self.emit(SearchEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SearchEvent) {
        // 受信側が消えていれば、次のコマンド受信で切断を検知する
        let _ = self.events.send(event);
    }
}
