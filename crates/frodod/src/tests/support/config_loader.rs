//! Configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use frodo_config::{Config, SocketEndpoint};
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use crate::bootstrap::ConfigLoader;

use super::bench::test_config;

/// Loader that provisions a Unix socket path under a temporary directory.
#[derive(Clone)]
pub(crate) struct TestConfigLoader {
    socket_dir: Arc<TempDir>,
}

impl TestConfigLoader {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for socket");
        Self {
            socket_dir: Arc::new(dir),
        }
    }

    pub(crate) fn socket_path(&self) -> String {
        self.socket_dir
            .path()
            .join("run")
            .join("frodod.sock")
            .to_str()
            .expect("temporary socket path was not valid UTF-8")
            .to_owned()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            daemon_socket: SocketEndpoint::unix(self.socket_path()),
            ..test_config()
        })
    }
}

/// Loader that fails by passing an unsupported socket scheme.
pub(crate) struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("frodod"),
            OsString::from("--daemon-socket"),
            OsString::from("http://localhost:80"),
        ];
        Config::load_from_iter(args)
    }
}
