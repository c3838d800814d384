//! Connectivity and view state for the browser surface
//!
//! `ConnectivityViewState` is the only writer of `ViewState`. Every
//! transition is a pure function of the current state, the event and the
//! probe reading; side effects come back as `ViewCommand`s for the caller to
//! apply to the browser.

use std::time::Duration;

use tracing::debug;

/// Network reachability as reported by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Unknown,
    Online,
    Offline,
}

impl ConnectivityState {
    /// Unknown fails closed
    pub fn is_online(self) -> bool {
        self == ConnectivityState::Online
    }
}

/// Which surface is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Loading,
    Content,
    Offline,
}

/// Page-lifecycle and user events fed into the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    PageStarted,
    PageFinished,
    PageError { main_frame: bool },
    /// A routed `Load` wants to navigate the browser
    Navigate(String),
    ReloadRequested,
    Retry,
    Refresh,
}

/// Effects to apply to the browser after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    Load(String),
    Reload,
    ClearRefreshIndicator,
}

/// Result of one transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ViewState,
    pub commands: Vec<ViewCommand>,
}

/// Source of `ConnectivityState` readings
pub trait ConnectivityProbe {
    fn probe(&self) -> ConnectivityState;
}

impl ConnectivityProbe for Box<dyn ConnectivityProbe> {
    fn probe(&self) -> ConnectivityState {
        (**self).probe()
    }
}

/// Fixed reading, for tests and headless runs
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub ConnectivityState);

impl ConnectivityProbe for StaticProbe {
    fn probe(&self) -> ConnectivityState {
        self.0
    }
}

/// Probes reachability of the storefront with a HEAD request.
///
/// Any HTTP response means online, including error statuses; transport
/// failures mean offline. This is the headless stand-in for the platform's
/// reachability check: it blocks the calling thread for up to `timeout`, so
/// keep the timeout short (see `config::DEFAULT_PROBE_TIMEOUT_MS`).
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            timeout,
        }
    }
}

impl ConnectivityProbe for HttpProbe {
    fn probe(&self) -> ConnectivityState {
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        match agent.head(&self.url).call() {
            Ok(_) | Err(ureq::Error::Status(_, _)) => ConnectivityState::Online,
            Err(e) => {
                debug!(url = %self.url, error = %e, "connectivity probe failed");
                ConnectivityState::Offline
            }
        }
    }
}

/// Loading / Content / Offline state machine
#[derive(Debug, Clone)]
pub struct ConnectivityViewState {
    state: ViewState,
    primary_url: String,
}

impl ConnectivityViewState {
    pub fn new(primary_url: &str) -> Self {
        Self {
            state: ViewState::Loading,
            primary_url: primary_url.to_string(),
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    /// Apply one event given the current probe reading
    pub fn handle(&mut self, event: &ViewEvent, connectivity: ConnectivityState) -> Transition {
        let online = connectivity.is_online();
        let mut commands = Vec::new();

        let next = match (self.state, event) {
            (_, ViewEvent::PageStarted) => ViewState::Loading,

            // The engine also reports a finish after a failed main-frame
            // load; only a load in progress becomes content.
            (ViewState::Loading, ViewEvent::PageFinished) => ViewState::Content,
            (state, ViewEvent::PageFinished) => state,

            (_, ViewEvent::PageError { main_frame: true }) => ViewState::Offline,
            (state, ViewEvent::PageError { main_frame: false }) => state,

            (_, ViewEvent::Navigate(url)) => {
                if online {
                    commands.push(ViewCommand::Load(url.clone()));
                    ViewState::Loading
                } else {
                    ViewState::Offline
                }
            }

            (state, ViewEvent::ReloadRequested) => {
                if online {
                    commands.push(ViewCommand::Reload);
                    ViewState::Loading
                } else if state == ViewState::Content {
                    ViewState::Offline
                } else {
                    state
                }
            }

            (ViewState::Offline, ViewEvent::Retry) => {
                if online {
                    commands.push(ViewCommand::Load(self.primary_url.clone()));
                    ViewState::Loading
                } else {
                    ViewState::Offline
                }
            }
            (state, ViewEvent::Retry) => state,

            (ViewState::Content, ViewEvent::Refresh) => {
                commands.push(ViewCommand::ClearRefreshIndicator);
                if online {
                    commands.push(ViewCommand::Reload);
                    ViewState::Loading
                } else {
                    ViewState::Offline
                }
            }
            (state, ViewEvent::Refresh) => {
                commands.push(ViewCommand::ClearRefreshIndicator);
                state
            }
        };

        if next != self.state {
            debug!(from = ?self.state, to = ?next, ?event, "view state transition");
        }
        self.state = next;

        Transition {
            state: next,
            commands,
        }
    }
}
