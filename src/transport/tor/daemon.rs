use super::TorSettings;

use crate::transport::{Error, Result};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info};

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

pub const COOKIE_FILE: &str = "control_auth_cookie";

/// A `tor` process owned by the node.
pub struct TorDaemon {
    child: Child,
}

impl TorDaemon {
    /// Writes the torrc, starts tor and waits until it reports a complete bootstrap.
    pub async fn launch(settings: &TorSettings, tor_dir: &Path) -> Result<TorDaemon> {
        let data_dir = tor_dir.join("data");
        tokio::fs::create_dir_all(&data_dir).await?;
        let torrc = tor_dir.join("torrc");
        tokio::fs::write(&torrc, torrc_contents(settings, tor_dir, &data_dir)).await?;

        let mut child = Command::new(&settings.tor_binary)
            .arg("-f")
            .arg(&torrc)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Bootstrap(format!("could not start {}: {}", settings.tor_binary, e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Bootstrap("tor stdout unavailable".to_owned()))?;

        let bootstrap_timeout = Duration::from_secs(settings.bootstrap_timeout_secs);
        let lines = match timeout(bootstrap_timeout, wait_for_bootstrap(stdout)).await {
            Ok(Ok(lines)) => lines,
            Ok(Err(err)) => {
                let _ = child.kill().await;
                return Err(err);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(Error::Bootstrap(format!("tor did not bootstrap within {:?}", bootstrap_timeout)));
            }
        };
        // Keep draining the log so tor never blocks on a full pipe.
        tokio::spawn(async move {
            let mut lines = lines;
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("tor: {}", line);
            }
        });
        Ok(TorDaemon { child })
    }

    pub async fn stop(mut self) -> Result<()> {
        if let Ok(None) = self.child.try_wait() {
            self.child.kill().await?;
        }
        Ok(())
    }
}

async fn wait_for_bootstrap(
    stdout: ChildStdout,
) -> Result<tokio::io::Lines<BufReader<ChildStdout>>> {
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        debug!("tor: {}", line);
        if line.contains("Bootstrapped 100%") {
            info!("tor bootstrapped");
            return Ok(lines);
        }
    }
    Err(Error::Bootstrap("tor exited before bootstrapping".to_owned()))
}

pub fn cookie_file(tor_dir: &Path) -> PathBuf {
    tor_dir.join(COOKIE_FILE)
}

fn torrc_contents(settings: &TorSettings, tor_dir: &Path, data_dir: &Path) -> String {
    format!(
        "DataDirectory {}\n\
         SocksPort 127.0.0.1:{}\n\
         ControlPort 127.0.0.1:{}\n\
         CookieAuthentication 1\n\
         CookieAuthFile {}\n\
         AvoidDiskWrites 1\n\
         Log notice stdout\n",
        data_dir.display(),
        settings.socks_port,
        settings.control_port,
        cookie_file(tor_dir).display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torrc_names_ports_and_cookie() {
        let settings = TorSettings::default();
        let torrc = torrc_contents(&settings, Path::new("/base/tor"), Path::new("/base/tor/data"));
        assert!(torrc.contains(&format!("SocksPort 127.0.0.1:{}", settings.socks_port)));
        assert!(torrc.contains(&format!("ControlPort 127.0.0.1:{}", settings.control_port)));
        assert!(torrc.contains("CookieAuthFile /base/tor/control_auth_cookie"));
    }

    #[actix_rt::test]
    async fn missing_binary_fails_to_bootstrap() {
        let settings = TorSettings { tor_binary: "/nonexistent/tor".to_owned(), ..Default::default() };
        let dir = std::env::temp_dir().join(format!("tradenet-tor-{}", crate::id::Id::generate()));
        assert!(matches!(TorDaemon::launch(&settings, &dir).await, Err(Error::Bootstrap(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
