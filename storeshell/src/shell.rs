//! Shell dispatcher
//!
//! Producers (push service, OS broadcasts, alarm threads, UI gestures, the
//! browser engine) post `ShellEvent`s through an `EventSender`. One consumer
//! thread drains them in `Shell::run`; it is the only code that touches view
//! state, visible notifications and the browser.
//!
//! ```text
//! push / broadcast ──► gateway ──┐
//! alarm fired ─────► scheduler ──┴─► presenter ──tap──┐
//! deep link / cold start ───────────────────────────►├─► router ──► view state ──► browser
//! ```

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ShellConfig;
use crate::connectivity::{
    ConnectivityProbe, ConnectivityState, ConnectivityViewState, ViewCommand, ViewEvent, ViewState,
};
use crate::error::ConfigError;
use crate::gateway::{GatewayDefaults, NotificationGateway, RawEvent};
use crate::intent::Intent;
use crate::presenter::{NotificationPresenter, NotificationSurface};
use crate::router::{
    select_candidate, AllowListPolicy, LinkPolicy, NavigationRouter, NavigationSource,
    NavigationTarget, Resolution,
};
use crate::scheduler::DynScheduler;

/// The embedded browser and the surfaces around it
pub trait BrowserSurface {
    /// Navigate the embedded browser
    fn load(&mut self, url: &str);
    fn reload(&mut self);
    /// Hand a URL to the OS handler
    fn open_external(&mut self, url: &str);
    fn current_url(&self) -> Option<String>;
    /// Make `state`'s surface the visible one
    fn show(&mut self, state: ViewState);
    fn clear_refresh_indicator(&mut self);
}

/// Main-frame lifecycle reported by the browser engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    Started,
    Finished,
    Error { main_frame: bool },
}

/// Everything the consumer thread reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// App came to the foreground, at launch or with a new intent
    Foreground {
        intent: Option<Intent>,
        cold_start: bool,
    },
    /// Remote push or OS broadcast
    Inbound(RawEvent),
    /// Scheduled alarm for a dedup key
    AlarmFired(String),
    /// The user tapped the alert with this dedup key
    NotificationTapped(String),
    Page(PageEvent),
    /// In-page link activation from an engine that cannot ask synchronously
    LinkActivated(String),
    Retry,
    Refresh,
    ReloadRequested,
    Shutdown,
}

/// Cloneable handle producers use to reach the consumer thread
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<ShellEvent>,
}

impl EventSender {
    /// Returns false once the shell has stopped
    pub fn send(&self, event: ShellEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Create the event channel feeding `Shell::run`
pub fn channel() -> (EventSender, Receiver<ShellEvent>) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, rx)
}

pub struct Shell<B, N, P> {
    browser: B,
    probe: P,
    router: NavigationRouter,
    view: ConnectivityViewState,
    gateway: NotificationGateway,
    presenter: NotificationPresenter<N>,
    scheduler: Arc<DynScheduler>,
    config: ShellConfig,
}

impl<B, N, P> Shell<B, N, P>
where
    B: BrowserSurface,
    N: NotificationSurface,
    P: ConnectivityProbe,
{
    pub fn new(
        config: ShellConfig,
        browser: B,
        surface: N,
        probe: P,
        scheduler: Arc<DynScheduler>,
    ) -> Result<Self, ConfigError> {
        let policy = AllowListPolicy::new(&config.store.url, &config.store.trusted_suffixes)?;

        Ok(Self {
            browser,
            probe,
            view: ConnectivityViewState::new(policy.primary_url()),
            router: NavigationRouter::new(policy),
            gateway: NotificationGateway::new(GatewayDefaults::from_config(&config)),
            presenter: NotificationPresenter::new(surface),
            scheduler,
            config,
        })
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn presenter(&self) -> &NotificationPresenter<N> {
        &self.presenter
    }

    pub fn router(&self) -> &NavigationRouter {
        &self.router
    }

    pub fn view_state(&self) -> ViewState {
        self.view.state()
    }

    /// App-setup work. Failures are logged; startup always continues.
    pub fn setup(&mut self) {
        self.gateway.ensure_channel();

        match self.scheduler.rearm() {
            Ok(armed) => debug!(armed, "re-armed pending reminders"),
            Err(e) => warn!(error = %e, "could not re-arm pending reminders"),
        }

        // Anything that came due while the app was not running
        match self.scheduler.fire_due() {
            Ok(fired) => {
                for notification in &fired {
                    self.presenter.present(notification);
                }
            }
            Err(e) => warn!(error = %e, "could not deliver overdue reminders"),
        }

        if let Err(e) = self.scheduler.schedule_welcome_back(
            &self.config.reminder,
            &self.config.app.name,
            &self.config.notifications.channel_id,
        ) {
            warn!(error = %e, "continuing without welcome-back reminder");
        }
    }

    /// Drain events until `Shutdown` or until every sender is gone
    pub fn run(mut self, events: Receiver<ShellEvent>) {
        info!(store = %self.router.primary_url(), "shell started");
        for event in events {
            if !self.handle(event) {
                break;
            }
        }
        info!("shell stopped");
    }

    /// Handle one event. Returns false on shutdown.
    pub fn handle(&mut self, event: ShellEvent) -> bool {
        match event {
            ShellEvent::Foreground { intent, cold_start } => self.on_foreground(intent, cold_start),
            ShellEvent::Inbound(raw) => {
                if let Some(notification) = self.gateway.receive(raw) {
                    self.presenter.present(&notification);
                }
            }
            ShellEvent::AlarmFired(key) => match self.scheduler.on_fire(&key) {
                Ok(Some(notification)) => {
                    self.gateway.ensure_channel();
                    self.presenter.present(&notification);
                }
                Ok(None) => {}
                Err(e) => warn!(dedup_key = %key, error = %e, "failed to fire scheduled notification"),
            },
            ShellEvent::NotificationTapped(key) => match self.presenter.tap(&key) {
                Some(intent) => self.on_foreground(Some(intent), false),
                None => debug!(dedup_key = %key, "tap on an alert that is no longer visible"),
            },
            ShellEvent::Page(page) => {
                let event = match page {
                    PageEvent::Started => ViewEvent::PageStarted,
                    PageEvent::Finished => ViewEvent::PageFinished,
                    PageEvent::Error { main_frame } => ViewEvent::PageError { main_frame },
                };
                self.apply_view(event);
            }
            ShellEvent::LinkActivated(url) => {
                if !self.on_link_activated(&url) {
                    debug!(%url, "link stays in the store");
                }
            }
            ShellEvent::Retry => self.apply_view(ViewEvent::Retry),
            ShellEvent::Refresh => self.apply_view(ViewEvent::Refresh),
            ShellEvent::ReloadRequested => {
                let current = self
                    .browser
                    .current_url()
                    .unwrap_or_else(|| self.router.primary_url().to_string());
                self.navigate(NavigationTarget::new(&current, NavigationSource::Reload));
            }
            ShellEvent::Shutdown => return false,
        }
        true
    }

    /// The browser engine asks whether to follow a link activated in the
    /// page. Returns true when the engine must cancel it.
    pub fn on_link_activated(&mut self, url: &str) -> bool {
        match self.router.intercept(url) {
            LinkPolicy::Allow => false,
            LinkPolicy::Cancel(url) => {
                self.browser.open_external(&url);
                true
            }
        }
    }

    fn on_foreground(&mut self, intent: Option<Intent>, cold_start: bool) {
        let mut candidates = intent
            .map(|i| i.navigation_candidates())
            .unwrap_or_default();
        if cold_start {
            candidates.push(NavigationTarget::new(
                self.router.primary_url(),
                NavigationSource::ColdStart,
            ));
        }

        match select_candidate(candidates) {
            Some(target) => self.navigate(target),
            None => debug!("foregrounded without navigation"),
        }
    }

    fn navigate(&mut self, target: NavigationTarget) {
        match self.router.resolve(&target) {
            Resolution::Load(url) => {
                let event = if target.source == NavigationSource::Reload {
                    ViewEvent::ReloadRequested
                } else {
                    ViewEvent::Navigate(url)
                };
                self.apply_view(event);
            }
            Resolution::Delegate(url) => {
                info!(%url, source = ?target.source, "opening outside the store");
                self.browser.open_external(&url);
            }
        }
    }

    fn apply_view(&mut self, event: ViewEvent) {
        let connectivity = match event {
            ViewEvent::Navigate(_)
            | ViewEvent::ReloadRequested
            | ViewEvent::Retry
            | ViewEvent::Refresh => self.probe.probe(),
            _ => ConnectivityState::Unknown,
        };

        let before = self.view.state();
        let transition = self.view.handle(&event, connectivity);

        for command in transition.commands {
            match command {
                ViewCommand::Load(url) => self.browser.load(&url),
                ViewCommand::Reload => self.browser.reload(),
                ViewCommand::ClearRefreshIndicator => self.browser.clear_refresh_indicator(),
            }
        }

        if transition.state != before {
            self.browser.show(transition.state);
        }
    }
}
