use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use collatz_explorer::*;
use num_bigint::BigInt;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "collatz-explorer", version, about = "Collatz 予想の軌道追跡と 2^68 超の反例探索")]
struct Cli {
    /// 設定ファイル (TOML)
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// ログレベル (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "COLLATZ_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 1ステップ計算
    Step {
        n: String,
        /// 3n+1 の後に 2 の因子をすべて除く
        #[arg(long)]
        accelerated: bool,
    },
    /// 軌道追跡 (1 到達・サイクル検出・上限まで)
    Trace {
        #[command(flatten)]
        input: NumberInput,
        #[arg(long)]
        cap: Option<u64>,
        #[arg(long)]
        accelerated: bool,
        /// 軌道 CSV を保存するディレクトリ
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// 手動探索。上限に達するたびに続行を尋ねる
    Explore {
        #[command(flatten)]
        input: NumberInput,
        #[arg(long)]
        cap: Option<u64>,
    },
    /// 2^68 超の奇数を無人探索する (入力 p: 一時停止/再開, q: 停止)
    Search {
        /// 乱数候補を使う
        #[arg(long)]
        random: bool,
        /// 乱数候補の上限 2^68 * 10^F
        #[arg(long)]
        range_factor: Option<u32>,
        /// 検査間隔 (ms)
        #[arg(long)]
        delay_ms: Option<u64>,
        /// 検査する候補数の上限
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        cap: Option<u64>,
        #[arg(long)]
        ledger: Option<PathBuf>,
        /// 台帳をファイルに残さない
        #[arg(long)]
        no_ledger: bool,
    },
    /// 範囲検証 [start, end] の全奇数
    Verify {
        start: String,
        end: String,
        #[arg(long)]
        cap: Option<u64>,
        #[arg(long)]
        accelerated: bool,
    },
}

#[derive(Args, Debug)]
struct NumberInput {
    /// 開始値
    n: String,
    /// 開始値に 10^k を掛ける
    #[arg(long, default_value_t = 0)]
    pow10: u32,
}

impl NumberInput {
    fn value(&self) -> Result<BigInt> {
        parse_scaled(&self.n, self.pow10).with_context(|| format!("数値を解析できません: {}", self.n))
    }
}

fn step_kind(accelerated: bool) -> StepKind {
    if accelerated { StepKind::Accelerated } else { StepKind::Unaccelerated }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("設定を読み込めません: {}", cli.config.display()))?;
    if let Some(level) = &cli.log_level {
        settings.log_level = level.clone();
    }
    logging::init(&settings.log_level)?;

    match cli.command {
        Command::Step { n, accelerated } => cmd_step(&n, accelerated),
        Command::Trace { input, cap, accelerated, save } => {
            let cap = cap.unwrap_or(settings.interactive_cap);
            cmd_trace(&input.value()?, cap, step_kind(accelerated), save.as_deref())
        }
        Command::Explore { input, cap } => cmd_explore(input.value()?, cap.unwrap_or(settings.interactive_cap)),
        Command::Search { random, range_factor, delay_ms, limit, cap, ledger, no_ledger } => {
            if random {
                settings.random = true;
            }
            if let Some(f) = range_factor {
                settings.range_factor = f;
            }
            if let Some(d) = delay_ms {
                settings.delay_ms = d;
            }
            if let Some(c) = cap {
                settings.search_cap = c;
            }
            if let Some(path) = ledger {
                settings.ledger_path = path;
            }
            settings.validate()?;
            cmd_search(&settings, limit, no_ledger)
        }
        Command::Verify { start, end, cap, accelerated } => {
            let cap = cap.unwrap_or(settings.search_cap);
            cmd_verify(&start, &end, cap, step_kind(accelerated))
        }
    }
}

fn parse_n(s: &str) -> Result<BigInt> {
    BigInt::from_str(s.trim()).with_context(|| format!("数値を解析できません: {}", s))
}

fn cmd_step(n: &str, accelerated: bool) -> Result<()> {
    let n = parse_n(n)?;
    let kind = step_kind(accelerated);
    let next = kind.apply(&n)?;
    println!("n  = {}", n);
    println!("n' = {} ({})", next, kind);
    Ok(())
}

fn cmd_trace(start: &BigInt, cap: u64, kind: StepKind, save: Option<&Path>) -> Result<()> {
    println!("軌道追跡: n={} ({}, 最大 {} ステップ)", format_big(start), kind, cap);

    let timer = Instant::now();
    let (trajectory, outcome) = trace(start, cap, kind)?;
    let elapsed = timer.elapsed();

    print_trajectory(trajectory.values(), 0);
    println!();
    println!("--- 結果 ---");
    println!("軌道長        = {}", trajectory.len());
    if let Some(max) = trajectory.max_value() {
        println!("最大値        = {}", format_big(max));
    }
    println!("終了理由      = {}", outcome);
    if let Outcome::ReachedNonTrivialCycle { cycle } = &outcome {
        println!("!!! 非自明サイクル: {:?}", cycle.iter().map(|v| v.to_string()).collect::<Vec<_>>());
    }
    if outcome == Outcome::StepCapReached {
        if let Some(last) = trajectory.last() {
            println!("続行するには: collatz-explorer trace {} --cap {}", last, cap);
        }
    }
    println!("計算時間      = {:?}", elapsed);

    if let Some(dir) = save {
        let path = save_trajectory_csv(dir, start, &trajectory)?;
        println!("\n軌道CSV保存: {}", path.display());
    }
    Ok(())
}

fn cmd_explore(start: BigInt, cap: u64) -> Result<()> {
    println!("{} の計算を開始...", start);
    let (mut session, mut report) = ExplorerSession::start(start, cap)?;
    let stdin = io::stdin();

    loop {
        print_trajectory(&report.segment, report.total_len - report.segment.len());
        match &report.outcome {
            Outcome::ReachedTrivialCycle => println!("自明なループ (4-2-1) を検出。"),
            Outcome::ReachedNonTrivialCycle { cycle } => {
                println!("!!! 非自明なループを検出: {:?}", cycle.iter().map(|v| v.to_string()).collect::<Vec<_>>());
            }
            Outcome::StepCapReached => println!("最大ステップ ({}) に到達。発散の可能性あり。", cap),
        }
        println!("累積長 = {}", report.total_len);

        if !session.can_continue() {
            return Ok(());
        }
        print!("続行しますか? [y/N] ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 || !line.trim().eq_ignore_ascii_case("y") {
            println!("中断: 最後の値 = {}", session.values().last().map(|v| v.to_string()).unwrap_or_default());
            return Ok(());
        }
        report = session.continue_trace()?;
    }
}

fn cmd_search(settings: &Settings, limit: Option<u64>, no_ledger: bool) -> Result<()> {
    let ledger: Arc<dyn CheckedLedger> = if no_ledger {
        Arc::new(MemoryLedger::new())
    } else {
        Arc::new(FileLedger::open(&settings.ledger_path)
            .with_context(|| format!("台帳を開けません: {}", settings.ledger_path.display()))?)
    };
    info!(checked = ledger.len(), "ledger loaded");

    let config = SearchConfig { max_candidates: limit, ..settings.search_config() };
    println!("探索: {:?} / 間隔 {}ms / 上限 {} ステップ", config.mode, settings.delay_ms, config.step_cap);
    println!("(入力 p + Enter: 一時停止/再開, q + Enter: 停止)");

    let handle = SearchHandle::spawn(config, ledger)?;
    let commands = handle.command_sender();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let cmd = match line.trim() {
                "p" => SearchCommand::TogglePause,
                "q" => SearchCommand::Stop,
                _ => continue,
            };
            if commands.send(cmd).is_err() {
                break;
            }
        }
    });
    handle.start();

    let mut started = false;
    let mut non_trivial = 0u64;
    for event in handle.events().iter() {
        match event {
            SearchEvent::StateChanged(state) => {
                println!("[{}]", state);
                match state {
                    SearchState::Running => started = true,
                    SearchState::Idle if started => break,
                    _ => {}
                }
            }
            SearchEvent::Checked(report) => {
                println!(
                    "現在の数: {} | 判定={} | 長さ={} | 全体 {} / セッション {}",
                    format_sci(&report.candidate), report.verdict, report.trajectory_len,
                    report.total_checked, report.session_checked
                );
            }
            SearchEvent::Skipped(n) => println!("検査済みのため省略: {}", n),
            SearchEvent::NonTrivialCycle { candidate, cycle } => {
                non_trivial += 1;
                println!();
                println!("!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!");
                println!("!!! 非自明サイクルを検出: 開始値 {}", candidate);
                println!("!!! サイクル: {:?}", cycle.iter().map(|v| v.to_string()).collect::<Vec<_>>());
                println!("!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!");
                println!();
            }
            SearchEvent::NoCandidates => println!("範囲内に候補がありません。"),
            SearchEvent::Failed(msg) => error!(%msg, "search failed"),
        }
    }

    if non_trivial > 0 {
        bail!("{} 個の非自明サイクルを検出", non_trivial);
    }
    Ok(())
}

fn cmd_verify(start: &str, end: &str, cap: u64, kind: StepKind) -> Result<()> {
    let start = parse_n(start)?;
    let end = parse_n(end)?;
    let num_threads = rayon::current_num_threads();
    println!("範囲検証: [{}, {}] ({}, 最大 {} ステップ/数, {}スレッド並列)", start, end, kind, cap, num_threads);

    let timer = Instant::now();
    let last_print = Mutex::new(Instant::now());
    let cancel = AtomicBool::new(false);
    let result = verify_range(&start, &end, cap, kind, &cancel, |done, total| {
        if let Ok(mut lp) = last_print.try_lock() {
            if lp.elapsed() >= Duration::from_millis(500) {
                let pct = done as f64 / total as f64 * 100.0;
                eprint!("\x1b[2K\r  [{:.1}s] {}/{} ({:.1}%)", timer.elapsed().as_secs_f64(), done, total, pct);
                *lp = Instant::now();
            }
        }
    })?;
    let elapsed = timer.elapsed();
    eprintln!();

    println!();
    println!("--- 結果 ---");
    println!("検証した奇数の数    = {}", result.total_checked);
    println!("自明サイクル到達    = {}", result.trivial);
    println!("全て収束            = {}", if result.all_converged { "はい" } else { "いいえ" });
    println!("最長軌道            = {} (n={})", result.longest_trajectory, result.longest_trajectory_start);
    println!("計算時間            = {:?}", elapsed);
    for (n, cycle) in &result.non_trivial {
        println!("!!! 非自明サイクル: n={} 長さ {}", n, cycle.len());
    }
    if !result.failures.is_empty() {
        println!("上限に達した数      = {} 個", result.failures.len());
        for f in &result.failures[..result.failures.len().min(10)] {
            println!("  {}", f);
        }
    }
    Ok(())
}

fn print_trajectory(values: &[BigInt], offset: usize) {
    let show_limit = 50;
    let len = values.len();
    for (i, v) in values.iter().enumerate() {
        if i < show_limit || i >= len.saturating_sub(5) {
            println!("  {:>6}  {:>50}", offset + i, format_big(v));
        } else if i == show_limit {
            println!("  ... ({} ステップ省略) ...", len.saturating_sub(show_limit + 5));
        }
    }
}

fn save_trajectory_csv(dir: &Path, start: &BigInt, trajectory: &Trajectory) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("ディレクトリを作成できません: {}", dir.display()))?;
    let path = dir.join(format!("trace_{}_{}.csv", short_n(start), timestamp()));
    let file = File::create(&path).with_context(|| format!("作成できません: {}", path.display()))?;
    let mut w = BufWriter::new(file);
    writeln!(w, "step,n,digits")?;
    for (i, v) in trajectory.values().iter().enumerate() {
        writeln!(w, "{},{},{}", i, v, v.to_string().len())?;
    }
    w.flush()?;
    Ok(path)
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn short_n(n: &BigInt) -> String {
    let s = n.to_string();
    if s.len() <= 16 {
        s
    } else {
        format!("{}..{}d", &s[..6], s.len())
    }
}

fn format_big(n: &BigInt) -> String {
    let s = n.to_string();
    if s.len() <= 50 {
        s
    } else {
        format!("{}...{} ({}桁)", &s[..20], &s[s.len() - 20..], s.len())
    }
}

/// 20桁を超える数は 1.23e45 形式
fn format_sci(n: &BigInt) -> String {
    let s = n.to_string();
    if s.len() <= 20 {
        return s;
    }
    let digits = s.trim_start_matches('-');
    format!("{}.{}e{}", &digits[..1], &digits[1..3], digits.len() - 1)
}
