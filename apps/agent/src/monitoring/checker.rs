use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Method;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use super::types::{Observation, QueuedProbe};
use crate::error::ProbeError;
use crate::models::{HttpTarget, IcmpTarget, ProbeTarget, ProxyConfig};

const USER_AGENT: &str = concat!("uppe-agent/", env!("CARGO_PKG_VERSION"));
const ECHO_PAYLOAD: [u8; 56] = [0; 56];

/// One probe strategy
#[async_trait]
pub trait Checker: Send + Sync {
    /// Run the probe and report what the network answered.
    ///
    /// The caller enforces the overall deadline; implementations should still
    /// respect `probe.timeout` for their own I/O.
    async fn check(&self, probe: &QueuedProbe) -> Result<Observation, ProbeError>;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
    /// One pooled client per distinct proxy
    proxied: DashMap<ProxyConfig, reqwest::Client>,
}

impl HttpChecker {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProbeError::RequestConstruction(format!("http client: {e}")))?;

        Ok(Self { client, proxied: DashMap::new() })
    }

    /// Items behind a proxy share a client built on first use
    fn client_for(&self, target: &HttpTarget) -> Result<reqwest::Client, ProbeError> {
        let Some(proxy) = &target.proxy else {
            return Ok(self.client.clone());
        };

        if let Some(client) = self.proxied.get(proxy) {
            return Ok(client.clone());
        }

        let client = proxied_client(proxy)?;
        debug!(proxy = %proxy.url(), "built proxied http client");
        Ok(self.proxied.entry(proxy.clone()).or_insert(client).clone())
    }
}

fn proxied_client(proxy: &ProxyConfig) -> Result<reqwest::Client, ProbeError> {
    let mut route = reqwest::Proxy::all(proxy.url())
        .map_err(|e| ProbeError::RequestConstruction(format!("invalid proxy {}: {e}", proxy.url())))?;

    if let Some(user) = &proxy.user {
        route = route.basic_auth(user, proxy.password.as_deref().unwrap_or_default());
    }

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .proxy(route)
        .build()
        .map_err(|e| ProbeError::RequestConstruction(format!("proxy client: {e}")))
}

/// Build the request without sending it, so construction errors stay apart from transport errors
fn build_request(
    client: &reqwest::Client,
    target: &HttpTarget,
    timeout: Duration,
) -> Result<reqwest::Request, ProbeError> {
    let url = Url::parse(&target.url)
        .map_err(|e| ProbeError::RequestConstruction(format!("invalid url {}: {e}", target.url)))?;

    let method = Method::from_bytes(target.method().as_bytes())
        .map_err(|_| ProbeError::RequestConstruction(format!("invalid method {}", target.method())))?;

    let mut request = client.request(method, url).timeout(timeout);

    for (key, value) in &target.headers {
        request = request.header(key.as_str(), value.as_str());
    }

    if let Some(body) = &target.body {
        request = request.body(body.clone());
    }

    request.build().map_err(|e| ProbeError::RequestConstruction(e.to_string()))
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> ProbeError {
    if error.is_timeout() {
        ProbeError::Timeout(timeout)
    } else if error.is_builder() {
        ProbeError::RequestConstruction(error.to_string())
    } else {
        ProbeError::Transport(error.to_string())
    }
}

#[async_trait]
impl Checker for HttpChecker {
    async fn check(&self, probe: &QueuedProbe) -> Result<Observation, ProbeError> {
        let ProbeTarget::Http(target) = probe.target() else {
            return Err(ProbeError::RequestConstruction("not an http target".to_string()));
        };

        let client = self.client_for(target)?;
        let request = build_request(&client, target, probe.timeout)?;

        debug!(method = %request.method(), url = %request.url(), "sending http probe");

        let response = client
            .execute(request)
            .await
            .map_err(|e| transport_error(e, probe.timeout))?;

        let status_code = response.status().as_u16();

        let body = if probe.item.needs_body() {
            let text = response.text().await.map_err(|e| match transport_error(e, probe.timeout) {
                ProbeError::Transport(reason) => ProbeError::Transport(format!("read body: {reason}")),
                other => other,
            })?;
            Some(text)
        } else {
            None
        };

        Ok(Observation::Http { status_code, body })
    }
}

/// Sends a single ICMP echo request and waits for its reply
#[async_trait]
pub trait EchoTransport: Send + Sync {
    /// Round-trip time of the answered echo, or why it was not answered within `timeout`
    async fn echo(&self, address: IpAddr, sequence: u16, timeout: Duration)
    -> Result<Duration, ProbeError>;
}

/// Echo transport on top of `surge-ping`.
///
/// Sockets are opened lazily, once per address family. Opening them may need
/// elevated privileges (or `net.ipv4.ping_group_range` on Linux); a failure is
/// reported as unreachable.
#[derive(Default)]
pub struct SurgeTransport {
    v4: OnceCell<surge_ping::Client>,
    v6: OnceCell<surge_ping::Client>,
}

impl SurgeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self, address: IpAddr) -> Result<&surge_ping::Client, ProbeError> {
        let (cell, config) = match address {
            IpAddr::V4(_) => (&self.v4, surge_ping::Config::default()),
            IpAddr::V6(_) => {
                (&self.v6, surge_ping::Config::builder().kind(surge_ping::ICMP::V6).build())
            }
        };

        cell.get_or_try_init(|| async move { surge_ping::Client::new(&config) })
            .await
            .map_err(|e| ProbeError::Unreachable(format!("cannot open icmp socket: {e}")))
    }
}

#[async_trait]
impl EchoTransport for SurgeTransport {
    async fn echo(
        &self,
        address: IpAddr,
        sequence: u16,
        timeout: Duration,
    ) -> Result<Duration, ProbeError> {
        let client = self.client(address).await?;
        let mut pinger = client.pinger(address, surge_ping::PingIdentifier(rand::random())).await;
        pinger.timeout(timeout);

        match pinger.ping(surge_ping::PingSequence(sequence), &ECHO_PAYLOAD).await {
            Ok((_packet, rtt)) => Ok(rtt),
            Err(e) => Err(ProbeError::Unreachable(format!("echo {sequence} to {address} lost: {e}"))),
        }
    }
}

/// ICMP checker: reachable only when every echo is answered before the deadline
pub struct IcmpChecker<T = SurgeTransport> {
    transport: T,
}

impl IcmpChecker<SurgeTransport> {
    pub fn new() -> Self {
        Self { transport: SurgeTransport::new() }
    }
}

impl Default for IcmpChecker<SurgeTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EchoTransport> IcmpChecker<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }
}

async fn resolve(target: &IcmpTarget) -> Result<IpAddr, ProbeError> {
    let host = target.address.trim();
    if let Ok(address) = host.parse::<IpAddr>() {
        return Ok(address);
    }

    let mut addresses = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ProbeError::Unreachable(format!("cannot resolve {host}: {e}")))?;

    addresses
        .next()
        .map(|socket| socket.ip())
        .ok_or_else(|| ProbeError::Unreachable(format!("no address for {host}")))
}

#[async_trait]
impl<T: EchoTransport> Checker for IcmpChecker<T> {
    async fn check(&self, probe: &QueuedProbe) -> Result<Observation, ProbeError> {
        let ProbeTarget::Icmp(target) = probe.target() else {
            return Err(ProbeError::RequestConstruction("not an icmp target".to_string()));
        };

        // Beyond the clock range only the executor's deadline applies
        let deadline = Instant::now().checked_add(probe.timeout);
        let address = resolve(target).await?;
        let repeat = probe.repeat.max(1);

        for sequence in 0..repeat {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => probe.timeout,
            };
            if remaining.is_zero() {
                return Err(ProbeError::Timeout(probe.timeout));
            }
            let rtt = self.transport.echo(address, sequence as u16, remaining).await?;
            debug!(%address, sequence, rtt_ms = rtt.as_millis() as u64, "echo reply");
        }

        Ok(Observation::Echo { replies: repeat })
    }
}
