use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal;
use directories::ProjectDirs;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pdfview_core::{
    Color, FileStateStore, HistoryLog, HostTheme, ReverseIndex, StateStore, SynctexInfo,
    ThemeMode, Viewer, ViewerConfig, ViewerEvent, ViewportSize,
};
use pdfview_render::PdfRenderFactory;
use pdfview_tty::{format_status, EventMapper, FrameStyle, KittyRenderer, TerminalGrid, UiEvent};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};
use url::Url;

/// Upper bound on how long the loop blocks waiting for terminal input.
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(
    name = "pdfview",
    version,
    about = "continuous-scroll PDF viewer for kitty-compatible terminals"
)]
struct Args {
    /// Page to open the document on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Forward search target, `page:x:y` or `synctex_info=page:x:y`
    #[arg(long = "synctex")]
    synctex: Option<SynctexInfo>,

    /// Config file to use instead of the platform default
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path to the document to open
    file: PathBuf,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pdfview", "pdfview")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = ViewerConfig::load(&config_path)?;
    let store = FileStateStore::new(project_dirs.data_local_dir().join("state"))?;
    let provider = PdfRenderFactory::new()?;

    let mut grid = terminal_grid()?;
    let mut viewer = Viewer::open_with(
        &provider,
        &args.file,
        config.clone(),
        host_theme(),
        viewport_for(&grid),
    )
    .await?;
    info!(path = ?viewer.info().path, pages = viewer.info().page_count, "document opened");

    match store.load(viewer.info()) {
        Ok(Some(state)) => viewer.restore(&state)?,
        Ok(None) => {}
        Err(err) => warn!("ignoring unreadable state: {err:#}"),
    }
    if config.store_history {
        record_history(
            HistoryLog::new(project_dirs.data_local_dir().join("history")),
            viewer.info().path.to_string_lossy().into_owned(),
        );
    }
    viewer.jump_to_launch_target(args.page, args.synctex, Instant::now());
    build_reverse_index(&project_dirs, &viewer);

    let (change_tx, mut change_rx) = mpsc::unbounded_channel();
    let _watcher = watch_document(&viewer.info().path, change_tx)?;

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide, EnableMouseCapture)?;
    let mut renderer = KittyRenderer::new(stdout);
    renderer.clear_all()?;

    let mut mapper = EventMapper::new();
    let (cell_width, cell_height) = grid.cell_size();
    mapper.set_cell_size(cell_width, cell_height);
    let style = FrameStyle {
        selection: config.selection_color,
        ..FrameStyle::default()
    };
    let mut status = StatusLine::default();
    let mut dirty = true;

    loop {
        let now = Instant::now();
        if drain_changes(&mut change_rx) {
            viewer.notify_file_changed(now);
        }
        let outcome = viewer.tick(now);
        if outcome.reload_due {
            viewer.reload(&provider, now).await;
        }
        dirty |= outcome.redraw;
        dirty |= handle_viewer_events(&mut viewer, &mut mapper, &mut status, &project_dirs);

        if dirty {
            let frame = match viewer.paint() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!("failed to paint: {err:#}");
                    dirty = false;
                    continue;
                }
            };
            renderer.draw_frame(&frame, &style, &grid)?;
            let message = mapper.pending_input().or_else(|| status.text());
            let line = format_status(
                message.as_deref().unwrap_or(""),
                frame.progress.as_deref(),
                usize::from(grid.columns),
            );
            renderer.draw_status_line(&grid, &line)?;
            dirty = handle_viewer_events(&mut viewer, &mut mapper, &mut status, &project_dirs);
        }

        if event::poll(poll_timeout(viewer.next_deadline(), Instant::now()))? {
            let ui_event = mapper.map_event(event::read()?);
            match handle_event(ui_event, &mut viewer, &mut mapper, &mut grid)? {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
        }
    }

    renderer.delete_images()?;
    renderer.clear_all()?;
    renderer.writer().flush()?;

    store.save(viewer.info(), &viewer.persisted_state())?;
    Ok(())
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

/// Last message from the viewer plus the hover tooltip, shown on the bottom row.
#[derive(Debug, Default)]
struct StatusLine {
    message: Option<String>,
    tooltip: Option<String>,
}

impl StatusLine {
    fn text(&self) -> Option<String> {
        self.tooltip.clone().or_else(|| self.message.clone())
    }
}

fn handle_event(
    event: UiEvent,
    viewer: &mut Viewer,
    mapper: &mut EventMapper,
    grid: &mut TerminalGrid,
) -> Result<LoopAction> {
    let now = Instant::now();
    match event {
        UiEvent::Command(command) => {
            debug!(?command, "command");
            if let Err(err) = viewer.apply(command) {
                warn!("command failed: {err:#}");
            }
        }
        UiEvent::Pointer(pointer) => viewer.handle_pointer(pointer, now),
        UiEvent::PromptChanged { tag, content } => {
            viewer.handle_input_changed(tag, &content, now)
        }
        UiEvent::PromptSubmit { tag, content } => viewer.handle_input_response(tag, &content),
        UiEvent::PromptCancel { tag } => viewer.handle_input_cancelled(tag),
        UiEvent::Resize { .. } => {
            *grid = terminal_grid()?;
            let (cell_width, cell_height) = grid.cell_size();
            mapper.set_cell_size(cell_width, cell_height);
            viewer.resize(viewport_for(grid));
        }
        UiEvent::Quit => return Ok(LoopAction::Quit),
        UiEvent::None => return Ok(LoopAction::Continue),
    }
    Ok(LoopAction::ContinueRedraw)
}

/// Routes the viewer's host requests; returns whether the screen needs repainting.
fn handle_viewer_events(
    viewer: &mut Viewer,
    mapper: &mut EventMapper,
    status: &mut StatusLine,
    project_dirs: &ProjectDirs,
) -> bool {
    let mut redraw = false;
    for event in viewer.drain_events() {
        match event {
            ViewerEvent::Notify(message) => {
                info!("{message}");
                status.message = Some(message);
                redraw = true;
            }
            ViewerEvent::PromptInput {
                label,
                tag,
                initial,
            } => {
                mapper.begin_prompt(tag, label, &initial);
                redraw = true;
            }
            ViewerEvent::OpenUrl { url, external } => {
                debug!(external, "opening url");
                if let Err(err) = open_url(&url) {
                    warn!("failed to open {url}: {err:#}");
                    status.message = Some(format!("Cannot open {url}"));
                    redraw = true;
                }
            }
            ViewerEvent::CopyToClipboard(text) => {
                status.message = Some(match copy_to_clipboard(&text) {
                    Ok(()) => "Copied to clipboard".to_string(),
                    Err(err) => {
                        warn!("clipboard unavailable: {err:#}");
                        "Clipboard unavailable".to_string()
                    }
                });
                redraw = true;
            }
            ViewerEvent::Tooltip(tooltip) => {
                if status.tooltip != tooltip {
                    status.tooltip = tooltip;
                    redraw = true;
                }
            }
            ViewerEvent::PositionChanged {
                current_page,
                page_count,
            } => debug!(current_page, page_count, "position changed"),
            ViewerEvent::EnterFullscreen | ViewerEvent::ExitFullscreen => {
                debug!("fullscreen request ignored in terminal");
            }
            ViewerEvent::TranslateWord(word) => {
                status.message = Some(format!("Translate: {word}"));
                redraw = true;
            }
            ViewerEvent::SynctexBackwardEdit { path, page, x, y } => {
                if let Err(err) = synctex_edit(&path, page, x, y) {
                    warn!("synctex backward search failed: {err:#}");
                    status.message = Some("synctex is not available".to_string());
                    redraw = true;
                }
            }
            ViewerEvent::DocumentReloaded => {
                build_reverse_index(project_dirs, viewer);
                redraw = true;
            }
            ViewerEvent::RedrawNeeded => redraw = true,
        }
    }
    redraw
}

fn poll_timeout(deadline: Option<Instant>, now: Instant) -> Duration {
    deadline
        .map(|deadline| deadline.saturating_duration_since(now))
        .map_or(MAX_POLL_INTERVAL, |until| until.min(MAX_POLL_INTERVAL))
}

fn terminal_grid() -> Result<TerminalGrid> {
    let window = terminal::window_size()?;
    Ok(TerminalGrid::new(
        window.columns,
        window.rows,
        u32::from(window.width),
        u32::from(window.height),
    ))
}

fn viewport_for(grid: &TerminalGrid) -> ViewportSize {
    let (width, height) = grid.image_size();
    ViewportSize::new(width, height)
}

/// Reads the terminal's colour scheme from `COLORFGBG` (`fg;bg`, ANSI indices).
fn host_theme() -> HostTheme {
    std::env::var("COLORFGBG")
        .ok()
        .and_then(|value| theme_from_colorfgbg(&value))
        .unwrap_or_default()
}

fn theme_from_colorfgbg(value: &str) -> Option<HostTheme> {
    let background: u8 = value.rsplit(';').next()?.trim().parse().ok()?;
    let dark = matches!(background, 0..=6 | 8);
    Some(if dark {
        HostTheme {
            mode: ThemeMode::Dark,
            background: Color::BLACK,
            foreground: Color::WHITE,
        }
    } else {
        HostTheme::default()
    })
}

fn drain_changes(rx: &mut UnboundedReceiver<()>) -> bool {
    let mut changed = false;
    while rx.try_recv().is_ok() {
        changed = true;
    }
    changed
}

/// Watches the document's directory so editors that replace the file are still noticed.
fn watch_document(path: &Path, tx: UnboundedSender<()>) -> Result<RecommendedWatcher> {
    let target = path.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event)
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    && event.paths.iter().any(|changed| changed == &target) =>
            {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(err) => warn!("file watcher error: {err}"),
        }
    })?;
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    watcher
        .watch(directory, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {:?}", directory))?;
    Ok(watcher)
}

fn record_history(history: HistoryLog, entry: String) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        if let Err(err) = history.record(&entry) {
            warn!("failed to record history: {err:#}");
        }
    })
}

fn build_reverse_index(project_dirs: &ProjectDirs, viewer: &Viewer) {
    let document = viewer.info().path.clone();
    let index = ReverseIndex::for_document(&project_dirs.cache_dir().join("reverse"), &document);
    if index.is_building() || index.is_fresh(&document) {
        return;
    }
    let backend = viewer.backend();
    tokio::task::spawn_blocking(move || {
        if let Some(parent) = index.cache_path().parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!("failed to create reverse index directory: {err}");
                return;
            }
        }
        match index.build(backend.as_ref()) {
            Ok(true) => info!(path = ?index.cache_path(), "reverse index written"),
            Ok(false) => debug!("reverse index build already running"),
            Err(err) => warn!("failed to build reverse index: {err:#}"),
        }
    });
}

fn open_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw).with_context(|| format!("invalid url {raw:?}"))?;
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    std::process::Command::new(opener)
        .arg(url.as_str())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to run {opener}"))?;
    Ok(())
}

fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(text.to_string())?;
    Ok(())
}

fn synctex_edit(path: &Path, page: usize, x: f32, y: f32) -> Result<()> {
    let target = format!("{page}:{x}:{y}:{}", path.display());
    info!(%target, "synctex backward search");
    std::process::Command::new("synctex")
        .args(["edit", "-o", target.as_str()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to run synctex")?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pdfview.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
