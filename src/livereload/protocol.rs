//! Live-reload wire messages.
//!
//! JSON text frames following the livereload protocol (official-7):
//! the client sends `hello` and `info`, the server sends `hello`,
//! `reload` and `alert`.

use serde::{Deserialize, Serialize};

/// Protocol identifier announced in `hello`.
pub const PROTOCOL_V7: &str = "http://livereload.com/protocols/official-7";

/// Name announced to clients.
pub const SERVER_NAME: &str = concat!("helix-dev-server/", env!("CARGO_PKG_VERSION"));

/// Commands understood from the browser.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ClientCommand {
    Hello {
        #[serde(default)]
        protocols: Vec<String>,
    },
    Info {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        plugins: serde_json::Value,
    },
}

/// Commands pushed to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ServerCommand {
    Hello {
        protocols: Vec<String>,
        #[serde(rename = "serverName")]
        server_name: String,
    },
    Reload {
        /// First affected path, for clients that only read one.
        path: String,
        paths: Vec<String>,
        #[serde(rename = "liveCSS")]
        live_css: bool,
        #[serde(rename = "liveImg")]
        live_img: bool,
    },
    Alert {
        message: String,
    },
}

impl ServerCommand {
    pub fn hello() -> Self {
        ServerCommand::Hello {
            protocols: vec![PROTOCOL_V7.to_string()],
            server_name: SERVER_NAME.to_string(),
        }
    }

    /// Reload for a non-empty, deduplicated list of source paths.
    pub fn reload(paths: Vec<String>) -> Self {
        let live_css = paths.iter().any(|p| p.ends_with(".css"));
        ServerCommand::Reload {
            path: paths.first().cloned().unwrap_or_default(),
            paths,
            live_css,
            live_img: true,
        }
    }

    pub fn alert(message: impl Into<String>) -> Self {
        ServerCommand::Alert {
            message: message.into(),
        }
    }

    /// Short name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            ServerCommand::Hello { .. } => "hello",
            ServerCommand::Reload { .. } => "reload",
            ServerCommand::Alert { .. } => "alert",
        }
    }
}
