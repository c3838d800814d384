use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use storeshell::connectivity::ConnectivityState;
use storeshell::console::parse_command;
use storeshell::gateway::GatewayDefaults;
use storeshell::scheduler::ManualAlarms;
use storeshell::{
    channel, intent_from_args, load_config, open_scheduler, BrowserSurface, Clock,
    ConnectivityProbe, HttpProbe, Intent, NavigationRouter, NavigationSource,
    NavigationTarget, Notification, NotificationGateway, NotificationPresenter, NotificationSurface, RawEvent,
    RemotePush, Resolution, Shell, ShellConfig, ShellEvent, StaticProbe, SystemClock,
    ThreadAlarms, ViewState,
};

// ANSI color codes for terminal output
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "storeshell")]
#[command(about = "Storeshell - notification and navigation core for storefront apps", long_about = None)]
#[command(version)]
struct Cli {
    /// shell.toml, a directory holding one, or app.config.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show where a URL would be opened
    Resolve {
        url: String,

        /// What triggered the navigation
        #[arg(short, long, value_enum, default_value = "deep-link")]
        source: SourceArg,
    },

    /// Turn a remote push payload (JSON file or - for stdin) into a notification
    Push {
        file: String,
    },

    /// Schedule a local notification
    Schedule {
        /// Dedup key; scheduling the same key again replaces it
        #[arg(short, long)]
        key: String,

        /// Delay before it fires, in milliseconds
        #[arg(short, long)]
        delay_ms: u64,

        #[arg(short, long)]
        body: String,

        /// Defaults to the app name
        #[arg(short, long)]
        title: Option<String>,

        /// URL opened when the notification is tapped
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Cancel a scheduled notification
    Cancel {
        key: String,
    },

    /// List scheduled notifications
    Pending,

    /// Fire every scheduled notification that is already due
    FireDue,

    /// Run the shell headless, reading line commands from stdin
    Run {
        /// Deep link delivered with the launch
        #[arg(long)]
        deep_link: Option<String>,

        /// Treat the network as unreachable instead of probing
        #[arg(long)]
        offline: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    ColdStart,
    NotificationTap,
    DeepLink,
    Reload,
    PageLink,
}

impl From<SourceArg> for NavigationSource {
    fn from(source: SourceArg) -> Self {
        match source {
            SourceArg::ColdStart => NavigationSource::ColdStart,
            SourceArg::NotificationTap => NavigationSource::NotificationTap,
            SourceArg::DeepLink => NavigationSource::DeepLink,
            SourceArg::Reload => NavigationSource::Reload,
            SourceArg::PageLink => NavigationSource::PageLink,
        }
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref())
        .map_err(|e| e.to_string())
        .and_then(|config| match cli.command {
            Commands::Resolve { url, source } => resolve_url(&config, &url, source.into()),
            Commands::Push { file } => convert_push(&config, &file),
            Commands::Schedule { key, delay_ms, body, title, url } => {
                schedule_notification(&config, &key, delay_ms, &body, title, url)
            }
            Commands::Cancel { key } => cancel_notification(&config, &key),
            Commands::Pending => list_pending(&config),
            Commands::FireDue => fire_due(&config),
            Commands::Run { deep_link, offline } => run_shell(config, deep_link, offline),
        });

    if let Err(e) = result {
        eprintln!("{}error{}: {}", RED, RESET, e);
        std::process::exit(1);
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("STORESHELL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn resolve_url(config: &ShellConfig, url: &str, source: NavigationSource) -> Result<(), String> {
    let router = router_for(config)?;
    match router.resolve(&NavigationTarget::new(url, source)) {
        Resolution::Load(url) => println!("{}load{} {}", GREEN, RESET, url),
        Resolution::Delegate(url) => println!("{}delegate{} {}", YELLOW, RESET, url),
    }
    Ok(())
}

fn convert_push(config: &ShellConfig, file: &str) -> Result<(), String> {
    let content = if file == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        buf
    } else {
        fs::read_to_string(file).map_err(|e| format!("Failed to read {}: {}", file, e))?
    };

    let push: RemotePush =
        serde_json::from_str(&content).map_err(|e| format!("Invalid push payload: {}", e))?;

    let mut gateway = NotificationGateway::new(GatewayDefaults::from_config(config));
    match gateway.receive(RawEvent::RemotePush(push)) {
        Some(notification) => {
            let json = serde_json::to_string_pretty(&notification)
                .map_err(|e| format!("Failed to serialize notification: {}", e))?;
            println!("{}", json);
        }
        None => println!("{}dropped{} (no body)", DIM, RESET),
    }
    Ok(())
}

fn schedule_notification(
    config: &ShellConfig,
    key: &str,
    delay_ms: u64,
    body: &str,
    title: Option<String>,
    url: Option<String>,
) -> Result<(), String> {
    let scheduler = offline_scheduler(config);
    let title = title.unwrap_or_else(|| config.app.name.clone());
    let mut notification = Notification::new(&title, body, &config.notifications.channel_id, key);
    if let Some(url) = url {
        notification = notification.with_url(&url);
    }

    let entry = scheduler
        .schedule(notification, delay_ms, key)
        .map_err(|e| e.to_string())?;
    println!(
        "{}scheduled{} {} at {}",
        GREEN, RESET, entry.dedup_key, entry.trigger_at_epoch_ms
    );
    println!("{}  stored in {}{}", DIM, config.schedule_path().display(), RESET);
    Ok(())
}

fn cancel_notification(config: &ShellConfig, key: &str) -> Result<(), String> {
    let scheduler = offline_scheduler(config);
    if scheduler.cancel(key).map_err(|e| e.to_string())? {
        println!("{}cancelled{} {}", GREEN, RESET, key);
    } else {
        println!("{}nothing scheduled for{} {}", DIM, RESET, key);
    }
    Ok(())
}

fn list_pending(config: &ShellConfig) -> Result<(), String> {
    let scheduler = offline_scheduler(config);
    let pending = scheduler.pending().map_err(|e| e.to_string())?;
    if pending.is_empty() {
        println!("{}no scheduled notifications{}", DIM, RESET);
        return Ok(());
    }

    let now = SystemClock.now_ms();
    for entry in pending {
        let due = if entry.trigger_at_epoch_ms <= now {
            format!("{}due{}", YELLOW, RESET)
        } else {
            format!("in {}s", (entry.trigger_at_epoch_ms - now) / 1000)
        };
        println!(
            "{}{}{} {} - {}: {}",
            CYAN, entry.dedup_key, RESET, due, entry.payload.title, entry.payload.body
        );
    }
    Ok(())
}

fn fire_due(config: &ShellConfig) -> Result<(), String> {
    let scheduler = offline_scheduler(config);
    let fired = scheduler.fire_due().map_err(|e| e.to_string())?;

    let mut presenter = NotificationPresenter::new(notification_surface(config));
    for notification in &fired {
        presenter.present(notification);
    }
    println!("{}fired{} {}", GREEN, RESET, fired.len());
    Ok(())
}

fn run_shell(config: ShellConfig, deep_link: Option<String>, offline: bool) -> Result<(), String> {
    let (sender, events) = channel();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let alarm_sender = sender.clone();
    let alarms = ThreadAlarms::new(clock.clone(), move |key| {
        alarm_sender.send(ShellEvent::AlarmFired(key));
    });
    let scheduler = open_scheduler(&config, Box::new(alarms), clock);

    let probe: Box<dyn ConnectivityProbe> = if offline {
        Box::new(StaticProbe(ConnectivityState::Offline))
    } else {
        Box::new(HttpProbe::new(
            &config.store.url,
            Duration::from_millis(config.network.probe_timeout_ms),
        ))
    };

    let surface = notification_surface(&config);
    let mut shell = Shell::new(config, HeadlessBrowser::default(), surface, probe, scheduler)
        .map_err(|e| e.to_string())?;
    shell.setup();

    let intent: Option<Intent> = deep_link.and_then(|link| intent_from_args([link]));
    sender.send(ShellEvent::Foreground { intent, cold_start: true });

    let input = sender.clone();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            match parse_command(&line) {
                Ok(Some(event)) => {
                    if !input.send(event) {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => eprintln!("{}error{}: {}", RED, RESET, e),
            }
        }
        input.send(ShellEvent::Shutdown);
    });
    drop(sender);

    shell.run(events);
    Ok(())
}

fn router_for(config: &ShellConfig) -> Result<NavigationRouter, String> {
    let policy = storeshell::AllowListPolicy::new(&config.store.url, &config.store.trusted_suffixes)
        .map_err(|e| e.to_string())?;
    Ok(NavigationRouter::new(policy))
}

/// Scheduler for one-shot commands. Nothing stays running to deliver alarms;
/// the next `run` re-arms what was stored.
fn offline_scheduler(config: &ShellConfig) -> Arc<storeshell::DynScheduler> {
    open_scheduler(config, Box::new(ManualAlarms::new()), Arc::new(SystemClock))
}

#[cfg(feature = "native")]
fn notification_surface(config: &ShellConfig) -> Box<dyn NotificationSurface> {
    Box::new(storeshell::DesktopSurface::new(&config.app.name, 5000))
}

#[cfg(not(feature = "native"))]
fn notification_surface(_config: &ShellConfig) -> Box<dyn NotificationSurface> {
    Box::new(storeshell::LogSurface)
}

/// Browser stand-in that prints what a real engine would be told to do
#[derive(Default)]
struct HeadlessBrowser {
    current: Option<String>,
}

impl BrowserSurface for HeadlessBrowser {
    fn load(&mut self, url: &str) {
        println!("{}load{} {}", GREEN, RESET, url);
        self.current = Some(url.to_string());
    }

    fn reload(&mut self) {
        println!("{}reload{} {}", GREEN, RESET, self.current.as_deref().unwrap_or(""));
    }

    fn open_external(&mut self, url: &str) {
        println!("{}open-external{} {}", YELLOW, RESET, url);
    }

    fn current_url(&self) -> Option<String> {
        self.current.clone()
    }

    fn show(&mut self, state: ViewState) {
        let name = match state {
            ViewState::Loading => "loading",
            ViewState::Content => "content",
            ViewState::Offline => "offline",
        };
        println!("{}view{} {}", CYAN, RESET, name);
    }

    fn clear_refresh_indicator(&mut self) {
        println!("{}refresh-indicator cleared{}", DIM, RESET);
    }
}
