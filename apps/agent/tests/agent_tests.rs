//! End-to-end agent tests: config -> scheduler -> queue -> workers -> events

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediator::{Delivery, Inbox};
use tokio::sync::mpsc;
use uppe_agent::models::{ProbeGroup, ProbeItem};
use uppe_agent::monitoring::{Checker, EchoTransport, HttpChecker, IcmpChecker, ProbeExecutor};
use uppe_agent::settings::{ConfigProvider, PING_REPEAT, PING_TIMEOUT_SEC, SettingsItem};
use uppe_agent::{Agent, AgentConfig, AgentError, ConfigError, Event, EventName, ProbeError};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_with(groups: Vec<ProbeGroup>) -> AgentConfig {
    let mut config = AgentConfig { groups, ..AgentConfig::default() };
    config.agent.workers = Some(2);
    config.agent.drain_timeout_seconds = 2;
    config
}

async fn next_result(
    results: &mut mpsc::Receiver<Delivery<EventName, Event>>,
) -> uppe_agent::monitoring::ProbeResult {
    let delivery = tokio::time::timeout(Duration::from_secs(5), results.recv())
        .await
        .expect("Timeout waiting for probe result")
        .expect("Result inbox closed");

    match delivery.payload {
        Event::ProbeCompleted(result) => result,
        Event::SettingsSaved(item) => panic!("unexpected settings event for {}", item.name),
    }
}

#[tokio::test]
async fn test_group_tick_produces_results() {
    logger::try_init_for_tests();

    let server = MockServer::start().await;
    Mock::given(path("/up"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(path("/down"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let group = ProbeGroup::new("web", Duration::from_secs(60))
        .with_item(ProbeItem::check_status("up", format!("{}/up", server.uri())))
        .with_item(ProbeItem::check_status("down", format!("{}/down", server.uri())));

    let mut agent = Agent::new(config_with(vec![group])).unwrap();
    let (inbox, mut results) = Inbox::<EventName, Event>::new(16);
    agent.dispatcher().register(inbox, &[EventName::ProbeCompleted]).unwrap();

    agent.start().unwrap();

    let mut seen = vec![next_result(&mut results).await, next_result(&mut results).await];
    seen.sort_by(|a, b| a.item().cmp(b.item()));

    assert_eq!(seen[0].item(), "down");
    assert!(!seen[0].is_success());
    assert_eq!(seen[0].status_code(), Some(404));

    assert_eq!(seen[1].item(), "up");
    assert!(seen[1].is_success());
    assert_eq!(seen[1].status_code(), Some(200));
    assert_eq!(seen[1].group(), "web");

    assert!(matches!(agent.start(), Err(AgentError::AlreadyStarted)));
    assert!(agent.shutdown().await);
}

#[tokio::test]
async fn test_groups_fire_independently() {
    let server = MockServer::start().await;
    Mock::given(path("/fast"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
        .mount(&server)
        .await;

    let slow = ProbeGroup::new("slow", Duration::from_secs(60))
        .with_item(ProbeItem::check_status("s1", format!("{}/slow", server.uri())))
        .with_item(ProbeItem::check_status("s2", format!("{}/slow", server.uri())));
    let fast = ProbeGroup::new("fast", Duration::from_secs(1))
        .with_item(ProbeItem::check_status("f", format!("{}/fast", server.uri())));

    let mut config = config_with(vec![slow, fast]);
    config.agent.workers = Some(4);
    let mut agent = Agent::new(config).unwrap();
    let (inbox, mut results) = Inbox::<EventName, Event>::new(64);
    agent.dispatcher().register(inbox, &[EventName::ProbeCompleted]).unwrap();
    agent.start().unwrap();

    // Two fast ticks complete while the slow group's first tick is still in flight
    let mut fast_results = 0;
    while fast_results < 2 {
        if next_result(&mut results).await.group() == "fast" {
            fast_results += 1;
        }
    }

    agent.shutdown().await;
}

/// Answers every echo, refusing waits longer than any item may configure
struct BoundedEcho;

#[async_trait]
impl EchoTransport for BoundedEcho {
    async fn echo(
        &self,
        _address: IpAddr,
        _sequence: u16,
        timeout: Duration,
    ) -> Result<Duration, ProbeError> {
        if timeout > Duration::from_secs(300) {
            return Err(ProbeError::Unreachable(format!("echo wait of {timeout:?}")));
        }
        Ok(Duration::from_millis(1))
    }
}

#[tokio::test]
async fn test_oversized_ping_timeout_setting_keeps_workers_alive() {
    let group = ProbeGroup::new("lan", Duration::from_secs(1))
        .with_item(ProbeItem::ping("loopback", "127.0.0.1", 1));
    let mut config = config_with(vec![group]);
    config.settings.insert(
        PING_TIMEOUT_SEC.to_string(),
        toml::Value::String("18446744073709551615".to_string()),
    );

    let http: Arc<dyn Checker> = Arc::new(HttpChecker::new().unwrap());
    let executor = ProbeExecutor::with_checkers(http, Arc::new(IcmpChecker::with_transport(BoundedEcho)));
    let mut agent = Agent::with_executor(config, executor).unwrap();
    let (inbox, mut results) = Inbox::<EventName, Event>::new(16);
    agent.dispatcher().register(inbox, &[EventName::ProbeCompleted]).unwrap();
    agent.start().unwrap();

    // More ticks than workers: every one must still produce a result
    for _ in 0..3 {
        let result = next_result(&mut results).await;
        assert!(result.is_success(), "unexpected failure: {:?}", result.error());
    }

    assert!(agent.shutdown().await);
}

#[tokio::test]
async fn test_settings_event_reaches_provider() {
    let mut config = config_with(Vec::new());
    config.settings.insert(PING_REPEAT.to_string(), toml::Value::Integer(3));

    let agent = Agent::new(config).unwrap();
    assert_eq!(agent.settings().get_u64(PING_REPEAT, 1), 3);

    agent
        .dispatcher()
        .dispatch(
            EventName::SettingsItemSave,
            Event::SettingsSaved(SettingsItem::new(PING_REPEAT, "4")),
        )
        .await
        .unwrap();

    let settings = agent.settings().clone();
    let repeat = tokio::time::timeout(Duration::from_secs(2), async move {
        loop {
            let repeat = settings.get_u64(PING_REPEAT, 1);
            if repeat == 4 {
                return repeat;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(repeat, 4);
    agent.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let group = ProbeGroup::new("lan", Duration::from_secs(10))
        .with_item(ProbeItem::ping("gw", "10.0.0.1", 0));

    let error = Agent::new(config_with(vec![group])).err().unwrap();
    assert!(matches!(error, AgentError::Config(ConfigError::Invalid { .. })));
}

#[tokio::test]
async fn test_probe_completed_cannot_be_bound_twice() {
    let agent = Agent::new(config_with(Vec::new())).unwrap();

    let (first, _first_rx) = Inbox::<EventName, Event>::new(4);
    let (second, _second_rx) = Inbox::<EventName, Event>::new(4);
    agent.dispatcher().register(first, &[EventName::ProbeCompleted]).unwrap();

    assert!(agent.dispatcher().register(second, &[EventName::ProbeCompleted]).is_err());
    // Settings names are taken by the agent itself
    let (third, _third_rx) = Inbox::<EventName, Event>::new(4);
    assert!(agent.dispatcher().register(third, &[EventName::SettingsItemSave]).is_err());

    agent.shutdown().await;
}
