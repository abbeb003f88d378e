/// Process that reads the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSurface {
    Daemon,
    Cli,
}

impl ConfigSurface {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSurface::Daemon => "DAEMON",
            ConfigSurface::Cli => "CLI",
        }
    }
}

/// JSON-pointer prefixes each surface actually reads.
///
/// Keep in sync with `EngineConfig::from_config_json` and its callers: a
/// prefix listed here that nothing reads hides typos from the unused-key
/// report.
pub fn consumed_pointers(surface: ConfigSurface) -> &'static [&'static str] {
    match surface {
        ConfigSurface::Daemon => DAEMON,
        ConfigSurface::Cli => CLI,
    }
}

static DAEMON: &[&str] = &[
    "/store/backend",
    "/store/database_url_env",
    "/store/max_connections",
    "/transactions",
    "/notifications/queue_capacity",
    "/daemon/bind_addr",
];

// The CLI never binds a socket or dispatches notifications.
static CLI: &[&str] = &[
    "/store/backend",
    "/store/database_url_env",
    "/store/max_connections",
    "/transactions",
];
