// src/connection.rs - Outbound IP discovery and internet connectivity probing
use autodrop_shared::PrinterEvent;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::config::OnlineCheckConfig;
use crate::error::AgentResult;

/// Resolves, once per process, the local address used to reach the internet.
#[derive(Debug)]
pub struct IpResolver {
    host: String,
    port: u16,
    cached: OnceCell<String>,
}

impl IpResolver {
    pub fn new(check: &OnlineCheckConfig) -> Self {
        Self { host: check.host.clone(), port: check.port, cached: OnceCell::new() }
    }

    pub async fn get(&self) -> AgentResult<String> {
        let ip = self
            .cached
            .get_or_try_init(|| async {
                // connect() on UDP only selects a route, nothing is sent.
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                socket.connect((self.host.as_str(), self.port)).await?;
                let ip = socket.local_addr()?.ip().to_string();
                tracing::info!("Outbound IP resolved to {}", ip);
                Ok::<_, std::io::Error>(ip)
            })
            .await?;
        Ok(ip.clone())
    }
}

/// Probe the online-check host with a TCP connect.
pub async fn is_online(check: &OnlineCheckConfig, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((check.host.as_str(), check.port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::debug!("Online check {}:{} failed: {}", check.host, check.port, e);
            false
        }
        Err(_) => {
            tracing::debug!("Online check {}:{} timed out", check.host, check.port);
            false
        }
    }
}

/// Watch connectivity and hand a `ConnectivityChanged` event to `dispatch` on the
/// first observation and on every change after that.
pub fn spawn_connectivity_monitor<D>(check: OnlineCheckConfig, mut dispatch: D) -> JoinHandle<()>
where
    D: FnMut(PrinterEvent) + Send + 'static,
{
    tokio::spawn(async move {
        let period = Duration::from_secs(check.interval.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last: Option<bool> = None;
        loop {
            ticker.tick().await;
            let online = is_online(&check, Duration::from_secs(5)).await;
            if last != Some(online) {
                tracing::info!("Connectivity changed: online={}", online);
                dispatch(PrinterEvent::ConnectivityChanged { online });
                last = Some(online);
            }
        }
    })
}
