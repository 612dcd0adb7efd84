//! Socket endpoints for the command listener.

use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use url::Url;

/// Where the daemon accepts client connections.
///
/// Written as `unix:///run/frodo/frodod.sock` or `tcp://0.0.0.0:7083`. TOML
/// files may also use a tagged table such as
/// `{ transport = "tcp", host = "0.0.0.0", port = 7083 }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix { path: Utf8PathBuf },
    /// TCP socket endpoint.
    Tcp { host: String, port: u16 },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Unix socket path, when the endpoint is a Unix socket.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Creates the Unix socket's parent directory (mode `0700`) if missing.
    ///
    /// TCP endpoints need no preparation.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            })?;

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        builder
            .create(parent.as_std_path())
            .map_err(|source| SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" if url.path().is_empty() => {
                Err(SocketParseError::MissingUnixPath(input.to_owned()))
            }
            "unix" => Ok(Self::unix(url.path())),
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

impl Serialize for SocketEndpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
enum TaggedEndpoint {
    Unix { path: Utf8PathBuf },
    Tcp { host: String, port: u16 },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EndpointRepr {
    Text(String),
    Table(TaggedEndpoint),
}

impl<'de> Deserialize<'de> for SocketEndpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match EndpointRepr::deserialize(deserializer)? {
            EndpointRepr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            EndpointRepr::Table(TaggedEndpoint::Unix { path }) => Ok(Self::Unix { path }),
            EndpointRepr::Table(TaggedEndpoint::Tcp { host, port }) => Ok(Self::Tcp { host, port }),
        }
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`].
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme other than `unix` or `tcp`.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// Unix socket path was empty.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// The text is not a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised while preparing the socket directory.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path has no parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent { path: Utf8PathBuf },
    /// Creating the parent directory failed.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}
