#![windows_subsystem = "windows"]

use collatz_explorer::*;
use eframe::egui;
use egui_plot::{Line, Plot, PlotPoints};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// ログ欄に残す最大行数
const MAX_LOG_LINES: usize = 2000;

fn main() -> eframe::Result<()> {
    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("設定を読み込めません: {}", e);
            Settings::default()
        }
    };
    if let Err(e) = logging::init(&settings.log_level) {
        eprintln!("{}", e);
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 700.0])
            .with_title("Collatz Conjecture Explorer"),
        ..Default::default()
    };
    eframe::run_native(
        "collatz-explorer",
        options,
        Box::new(|cc| {
            setup_japanese_font(&cc.egui_ctx);
            Ok(Box::new(CollatzApp::new(settings)))
        }),
    )
}

fn setup_japanese_font(ctx: &egui::Context) {
    let mut fonts = egui::FontDefinitions::default();
    let font_paths = [
        "C:\\Windows\\Fonts\\YuGothR.ttc",
        "C:\\Windows\\Fonts\\meiryo.ttc",
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/System/Library/Fonts/ヒラギノ角ゴシック W3.ttc",
    ];
    for path in &font_paths {
        if let Ok(data) = std::fs::read(path) {
            fonts.font_data.insert("japanese".to_owned(), egui::FontData::from_owned(data));
            fonts.families
                .entry(egui::FontFamily::Proportional)
                .or_default()
                .insert(0, "japanese".to_owned());
            fonts.families
                .entry(egui::FontFamily::Monospace)
                .or_default()
                .push("japanese".to_owned());
            break;
        }
    }
    ctx.set_fonts(fonts);
}

/// 20桁を超える数は 1.23e45 形式
fn format_sci(n: &BigInt) -> String {
    let s = n.to_string();
    if s.len() <= 20 {
        return s;
    }
    format!("{}.{}e{}", &s[..1], &s[1..3], s.len() - 1)
}

fn format_values(values: &[BigInt]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// プロット用の log2 近似
fn log2_approx(n: &BigInt) -> f64 {
    let bits = n.bits();
    if bits < 1000 {
        n.to_f64().map(f64::log2).unwrap_or(bits as f64)
    } else {
        bits as f64
    }
}

// ─── データ構造 ─────────────────────────────────────

#[derive(PartialEq)]
enum Tab { Search, Explore }

struct CollatzApp {
    tab: Tab,
    settings: Settings,
    // 無人探索
    search: Option<SearchHandle>,
    search_state: SearchState,
    automated: bool,
    delay_ms: u64,
    range_factor: u32,
    current: Option<BigInt>,
    total_checked: u64,
    session_checked: u64,
    log: Vec<String>,
    manual_input: String,
    manual_power: u32,
    alert: Option<String>,
    // 手動探索
    explore_input: String,
    explore_power: u32,
    explore: Option<ExplorerSession>,
    explore_log: Vec<String>,
}

impl CollatzApp {
    fn new(settings: Settings) -> Self {
        Self {
            tab: Tab::Search,
            automated: settings.random,
            delay_ms: settings.delay_ms,
            range_factor: settings.range_factor,
            settings,
            search: None,
            search_state: SearchState::Idle,
            current: None,
            total_checked: 0,
            session_checked: 0,
            log: Vec::new(),
            manual_input: String::new(),
            manual_power: 0,
            alert: None,
            explore_input: "27".to_string(),
            explore_power: 0,
            explore: None,
            explore_log: Vec::new(),
        }
    }

    fn push_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
        if self.log.len() > MAX_LOG_LINES {
            let excess = self.log.len() - MAX_LOG_LINES;
            self.log.drain(..excess);
        }
    }

    fn candidate_mode(&self) -> CandidateMode {
        if self.automated {
            CandidateMode::random(self.range_factor)
        } else {
            CandidateMode::Sequential
        }
    }

    fn send(&mut self, command: SearchCommand) {
        let delivered = self.search.as_ref().map(|h| h.send(command)).unwrap_or(false);
        if !delivered && self.search.is_some() {
            warn!("search worker is gone");
            self.search = None;
            self.search_state = SearchState::Idle;
        }
    }
}

impl eframe::App for CollatzApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_events();
        if matches!(self.search_state, SearchState::Running | SearchState::Paused | SearchState::Stopping) {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        let blocked = self.alert.is_some();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.add_enabled_ui(!blocked, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Collatz Explorer");
                    ui.separator();
                    if ui.selectable_label(self.tab == Tab::Search, "無人探索").clicked() {
                        self.tab = Tab::Search;
                    }
                    if ui.selectable_label(self.tab == Tab::Explore, "手動探索").clicked() {
                        self.tab = Tab::Explore;
                    }
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(!blocked, |ui| match self.tab {
                Tab::Search => self.ui_search(ui),
                Tab::Explore => self.ui_explore(ui),
            });
        });

        self.ui_alert(ctx);
    }
}

impl CollatzApp {
    // ─── イベント処理 ──────────────────────────────
    fn process_events(&mut self) {
        let events = match &self.search {
            Some(handle) => handle.drain_events(),
            None => return,
        };
        for event in events {
            match event {
                SearchEvent::StateChanged(state) => {
                    self.search_state = state;
                    self.push_log(format!("[{}]", state));
                }
                SearchEvent::Checked(report) => {
                    self.total_checked = report.total_checked;
                    self.session_checked = report.session_checked;
                    self.push_log(format!(
                        "Checked {}: {} (len {})",
                        report.candidate, report.verdict, report.trajectory_len
                    ));
                    self.current = Some(report.candidate);
                }
                SearchEvent::Skipped(n) => self.push_log(format!("Skipping already checked number: {}", n)),
                SearchEvent::NonTrivialCycle { candidate, cycle } => {
                    self.push_log(format!("Non-trivial cycle found: {}", format_values(&cycle)));
                    self.alert = Some(format!("{} でサイクルを検出しました!\n{}", candidate, format_values(&cycle)));
                }
                SearchEvent::NoCandidates => self.push_log("No valid candidates in range."),
                SearchEvent::Failed(msg) => self.push_log(format!("Error in search loop: {}", msg)),
            }
        }
    }

    fn start_search(&mut self) {
        if self.search.is_none() {
            let ledger: Arc<dyn CheckedLedger> = match FileLedger::open(&self.settings.ledger_path) {
                Ok(l) => Arc::new(l),
                Err(e) => {
                    error!(error = %e, "ledger unavailable, using memory ledger");
                    self.push_log(format!("台帳を開けません ({}), メモリのみで続行", e));
                    Arc::new(MemoryLedger::new())
                }
            };
            let config = SearchConfig {
                delay: Duration::from_millis(self.delay_ms),
                mode: self.candidate_mode(),
                ..self.settings.search_config()
            };
            match SearchHandle::spawn(config, ledger) {
                Ok(handle) => self.search = Some(handle),
                Err(e) => {
                    self.push_log(format!("探索スレッドを起動できません: {}", e));
                    return;
                }
            }
        }
        self.push_log("Starting search...");
        self.send(SearchCommand::Start);
    }

    // ─── 無人探索タブ ──────────────────────────────
    fn ui_search(&mut self, ui: &mut egui::Ui) {
        let state = self.search_state;

        ui.horizontal(|ui| {
            ui.add_enabled_ui(state == SearchState::Idle, |ui| {
                if ui.button("Start").clicked() {
                    self.start_search();
                }
            });
            let pause_label = if state == SearchState::Paused { "Resume" } else { "Pause" };
            ui.add_enabled_ui(matches!(state, SearchState::Running | SearchState::Paused), |ui| {
                if ui.button(pause_label).clicked() {
                    self.send(SearchCommand::TogglePause);
                }
                if ui.button("Stop").clicked() {
                    self.send(SearchCommand::Stop);
                }
            });
            if ui.checkbox(&mut self.automated, "Automated Search").changed() {
                let mode = self.candidate_mode();
                self.send(SearchCommand::SetMode(mode));
            }
        });

        ui.horizontal(|ui| {
            ui.label("Delay (ms):");
            if ui.add(egui::Slider::new(&mut self.delay_ms, 0..=config::MAX_DELAY_MS)).changed() {
                self.send(SearchCommand::SetDelay(Duration::from_millis(self.delay_ms)));
            }
            ui.label("Range Factor:");
            let resp = ui.add(egui::Slider::new(
                &mut self.range_factor,
                candidate::MIN_RANGE_FACTOR..=candidate::MAX_RANGE_FACTOR,
            ));
            if resp.changed() && self.automated {
                let mode = self.candidate_mode();
                self.send(SearchCommand::SetMode(mode));
            }
        });

        ui.separator();
        ui.monospace(format!(
            "Current number: {}",
            self.current.as_ref().map(format_sci).unwrap_or_else(|| "N/A".to_string())
        ));
        ui.label(format!(
            "Overall checked: {} | Session checked: {}",
            self.total_checked, self.session_checked
        ));
        ui.label(format!("State: {}", state));

        ui.separator();
        ui.horizontal(|ui| {
            ui.label("Manual check number:");
            ui.add(egui::TextEdit::singleline(&mut self.manual_input).desired_width(200.0));
            ui.label("×10^");
            ui.add(egui::Slider::new(&mut self.manual_power, 0..=explorer::MAX_POWER_OF_TEN));
            if ui.button("Check").clicked() {
                self.manual_check();
            }
        });

        ui.separator();
        egui::ScrollArea::vertical()
            .id_salt("search_log")
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &self.log {
                    ui.monospace(line);
                }
            });
    }

    /// 入力した数を加速ステップで追跡し、軌道全体をログに出す
    fn manual_check(&mut self) {
        let n = match parse_scaled(&self.manual_input, self.manual_power) {
            Ok(n) => n,
            Err(e) => {
                self.alert = Some(format!("正の整数を入力してください ({})", e));
                return;
            }
        };
        self.push_log(format!("Manually checking {}...", n));
        match trace(&n, self.settings.search_cap, StepKind::Accelerated) {
            Ok((trajectory, outcome)) => {
                self.push_log("Full tree:");
                self.push_log(format_values(trajectory.values()));
                match outcome {
                    Outcome::ReachedNonTrivialCycle { cycle } => {
                        self.push_log(format!("Non-trivial cycle found: {}", format_values(&cycle)));
                        self.alert = Some(format!("{} でサイクルを検出しました!", n));
                    }
                    Outcome::ReachedTrivialCycle => self.push_log("Trivial cycle encountered."),
                    Outcome::StepCapReached => self.push_log("Step cap reached without cycle detection."),
                }
            }
            Err(e) => self.push_log(format!("Error: {}", e)),
        }
    }

    // ─── 手動探索タブ ──────────────────────────────
    fn ui_explore(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Number:");
            ui.add(egui::TextEdit::singleline(&mut self.explore_input).desired_width(200.0));
            ui.label("×10^");
            ui.add(egui::Slider::new(&mut self.explore_power, 0..=explorer::MAX_POWER_OF_TEN));
            if ui.button("Start").clicked() {
                self.start_explore();
            }
            let can_continue = self.explore.as_ref().is_some_and(|s| s.can_continue());
            ui.add_enabled_ui(can_continue, |ui| {
                if ui.button("Continue").clicked() {
                    self.continue_explore();
                }
            });
        });

        ui.separator();

        if let Some(session) = &self.explore {
            let points: Vec<[f64; 2]> = session
                .values()
                .iter()
                .enumerate()
                .map(|(i, v)| [i as f64, log2_approx(v)])
                .collect();
            Plot::new("explore_plot")
                .height(180.0)
                .allow_drag(false)
                .x_axis_label("step")
                .y_axis_label("log2 n")
                .show(ui, |plot_ui| {
                    plot_ui.line(Line::new(PlotPoints::from(points)));
                });
        }

        egui::ScrollArea::vertical()
            .id_salt("explore_log")
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &self.explore_log {
                    ui.monospace(line);
                }
            });
    }

    fn start_explore(&mut self) {
        self.explore_log.clear();
        let n = match parse_scaled(&self.explore_input, self.explore_power) {
            Ok(n) => n,
            Err(e) => {
                self.alert = Some(format!("入力エラー: {}", e));
                return;
            }
        };
        self.explore_log.push(format!("Starting computation for {}...", n));
        match ExplorerSession::start(n, self.settings.interactive_cap) {
            Ok((session, report)) => {
                self.explore = Some(session);
                self.report_explore(report);
            }
            Err(e) => self.explore_log.push(format!("Error: {}", e)),
        }
    }

    fn continue_explore(&mut self) {
        let Some(session) = self.explore.as_mut() else { return };
        match session.continue_trace() {
            Ok(report) => self.report_explore(report),
            Err(e) => self.explore_log.push(format!("Error: {}", e)),
        }
    }

    fn report_explore(&mut self, report: ExplorerReport) {
        let Some(session) = &self.explore else { return };
        let full = format_values(session.values());
        match &report.outcome {
            Outcome::ReachedTrivialCycle => {
                self.explore_log.push("Trivial loop (4-2-1) detected.".to_string());
                self.explore_log.push(format!("Full sequence: {}", full));
            }
            Outcome::ReachedNonTrivialCycle { cycle } => {
                self.explore_log.push(format!("Non-trivial loop detected: {}", format_values(cycle)));
                self.explore_log.push(format!("Full sequence: {}", full));
                self.alert = Some(format!("非自明なループを検出: {}", format_values(cycle)));
            }
            Outcome::StepCapReached => {
                self.explore_log.push(format!(
                    "Reached max steps ({}). Possible divergence.",
                    self.settings.interactive_cap
                ));
                self.explore_log.push(format!("Current sequence: {}", full));
            }
        }
    }

    // ─── 警告ダイアログ ────────────────────────────
    fn ui_alert(&mut self, ctx: &egui::Context) {
        let Some(message) = self.alert.clone() else { return };
        egui::Window::new("Collatz Explorer")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(&message);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    self.alert = None;
                }
            });
    }
}
