//! Builder-style configuration for every client transport.

use std::collections::HashMap;
use std::time::Duration;

/// Which transport(s) to try, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    #[default]
    AutoDetect,
    StreamableHttp,
    Sse,
}

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub endpoint: String,
    pub mode: TransportMode,
    /// SSE endpoint-discovery timeout; Streamable HTTP does not use this.
    pub connection_timeout: Duration,
    pub initialization_timeout: Duration,
    pub additional_headers: HashMap<String, String>,
}

impl HttpTransportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            mode: TransportMode::default(),
            connection_timeout: Duration::from_secs(30),
            initialization_timeout: Duration::from_secs(60),
            additional_headers: HashMap::new(),
        }
    }

    pub fn with_mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_initialization_timeout(mut self, timeout: Duration) -> Self {
        self.initialization_timeout = timeout;
        self
    }

    /// Rejects an empty header name; matches the validation the teacher's
    /// client config applies before a transport is ever constructed.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.additional_headers.insert(name, value.into());
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct StdioTransportConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_directory: Option<std::path::PathBuf>,
    /// `None` removes an inherited variable; `Some` sets/overrides it.
    pub environment: HashMap<String, Option<String>>,
    pub shutdown_timeout: Duration,
}

impl StdioTransportConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            working_directory: None,
            environment: HashMap::new(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.environment.insert(key.into(), value);
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
