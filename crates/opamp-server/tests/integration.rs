//! End-to-end tests: real WebSocket agents against a bound server.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use opamp_core::protobufs::{
    AgentCapabilities, AgentDescription, AgentToServer, ComponentHealth, KeyValue,
    ServerErrorResponseType, ServerToAgent, ServerToAgentFlags,
};
use opamp_core::{InstanceId, decode_frame, encode_frame};
use opamp_proxy::{
    ConnectionSettingsCalculator, FleetQuery, OpAmpProxy, StaticTelemetrySettings,
};
use opamp_server::{OPAMP_PATH, OpAmpServer, ServerConfig};
use opamp_settings::{TelemetryDestination, TelemetrySettings};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SERVER_CAPS: u64 = 0b101;
const WAIT: Duration = Duration::from_secs(5);

async fn start(config: ServerConfig) -> (OpAmpServer, String) {
    let telemetry = TelemetrySettings {
        own_metrics: Some(TelemetryDestination {
            endpoint: "http://collector:4318/v1/metrics".into(),
            headers: Default::default(),
        }),
        ..Default::default()
    };
    let calc = ConnectionSettingsCalculator::new(Arc::new(StaticTelemetrySettings::new(telemetry)));
    let server = OpAmpServer::new(config, Arc::new(OpAmpProxy::new(SERVER_CAPS, calc)));
    let (addr, _handle) = server.listen().await.unwrap();
    (server, format!("ws://{addr}{OPAMP_PATH}"))
}

async fn connect(url: &str) -> Client {
    let (ws, _resp) = connect_async(url).await.unwrap();
    ws
}

async fn send(client: &mut Client, msg: &AgentToServer) {
    client
        .send(Message::Binary(encode_frame(msg).into()))
        .await
        .unwrap();
}

/// Next binary frame, skipping control frames.
async fn recv(client: &mut Client) -> ServerToAgent {
    tokio::time::timeout(WAIT, async {
        loop {
            match client.next().await.unwrap().unwrap() {
                Message::Binary(data) => return decode_frame(&data).unwrap(),
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    })
    .await
    .unwrap()
}

async fn roundtrip(client: &mut Client, msg: &AgentToServer) -> ServerToAgent {
    send(client, msg).await;
    recv(client).await
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
}

fn description(host: &str) -> AgentDescription {
    AgentDescription {
        identifying_attributes: vec![KeyValue::string("service.name", "otelcol")],
        non_identifying_attributes: vec![KeyValue::string("host.name", host)],
    }
}

fn health(status: &str) -> ComponentHealth {
    ComponentHealth {
        healthy: true,
        status: status.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn health_is_retained_across_reports() {
    let (server, url) = start(ServerConfig::default()).await;
    let mut client = connect(&url).await;
    let id = InstanceId::new();
    let uid = id.to_bytes().to_vec();

    let first = roundtrip(
        &mut client,
        &AgentToServer {
            instance_uid: uid.clone(),
            sequence_num: 1,
            agent_description: Some(description("pod-a")),
            capabilities: AgentCapabilities::ReportsHealth.bit(),
            health: Some(health("running")),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(first.instance_uid, uid);
    assert_eq!(first.capabilities, SERVER_CAPS);
    assert!(!ServerToAgentFlags::ReportFullState.is_set_in(first.flags));
    let offer = first.connection_settings.unwrap();
    assert!(!offer.hash.is_empty());
    assert_eq!(
        offer.own_metrics.unwrap().destination_endpoint,
        "http://collector:4318/v1/metrics"
    );

    let second = roundtrip(
        &mut client,
        &AgentToServer {
            instance_uid: uid.clone(),
            sequence_num: 2,
            capabilities: AgentCapabilities::ReportsHealth.bit(),
            ..Default::default()
        },
    )
    .await;
    assert!(!ServerToAgentFlags::ReportFullState.is_set_in(second.flags));
    assert!(second.connection_settings.is_none());

    let proxy = server.proxy();
    assert_eq!(proxy.health()[&id].as_ref().unwrap().status, "running");
    assert_eq!(proxy.agents_by_hostname().get("pod-a"), Some(&id));
}

#[tokio::test]
async fn first_report_after_gap_requests_full_state() {
    let (_server, url) = start(ServerConfig::default()).await;
    let mut client = connect(&url).await;

    let resp = roundtrip(
        &mut client,
        &AgentToServer {
            instance_uid: InstanceId::new().to_bytes().to_vec(),
            sequence_num: 5,
            capabilities: AgentCapabilities::ReportsHealth.bit(),
            ..Default::default()
        },
    )
    .await;
    assert!(ServerToAgentFlags::ReportFullState.is_set_in(resp.flags));
}

#[tokio::test]
async fn bad_instance_uid_keeps_connection_usable() {
    let (server, url) = start(ServerConfig::default()).await;
    let mut client = connect(&url).await;

    let resp = roundtrip(
        &mut client,
        &AgentToServer {
            instance_uid: vec![1, 2, 3],
            sequence_num: 1,
            ..Default::default()
        },
    )
    .await;
    assert_eq!(resp.instance_uid, vec![1, 2, 3]);
    assert_eq!(
        resp.error_response.unwrap().r#type,
        ServerErrorResponseType::BadRequest as i32
    );
    assert_eq!(server.proxy().agent_count(), 0);

    let ok = roundtrip(
        &mut client,
        &AgentToServer {
            instance_uid: InstanceId::new().to_bytes().to_vec(),
            sequence_num: 1,
            ..Default::default()
        },
    )
    .await;
    assert!(ok.error_response.is_none());
    assert_eq!(server.proxy().agent_count(), 1);
}

#[tokio::test]
async fn undecodable_frame_gets_bad_request() {
    let (_server, url) = start(ServerConfig::default()).await;
    let mut client = connect(&url).await;

    client
        .send(Message::Binary(vec![0x00, 0xff, 0xff].into()))
        .await
        .unwrap();
    let resp = recv(&mut client).await;
    assert_eq!(
        resp.error_response.unwrap().r#type,
        ServerErrorResponseType::BadRequest as i32
    );
    assert_eq!(resp.capabilities, SERVER_CAPS);
}

#[tokio::test]
async fn legacy_ulid_uid_is_accepted() {
    let (server, url) = start(ServerConfig::default()).await;
    let mut client = connect(&url).await;
    let ulid = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    let resp = roundtrip(
        &mut client,
        &AgentToServer {
            instance_uid: ulid.as_bytes().to_vec(),
            sequence_num: 1,
            ..Default::default()
        },
    )
    .await;
    assert!(resp.error_response.is_none());
    assert_eq!(resp.instance_uid, ulid.as_bytes());

    let id = InstanceId::from_wire(ulid.as_bytes()).unwrap();
    assert!(server.proxy().agent(id).is_ok());
}

#[tokio::test]
async fn closing_socket_removes_agent() {
    let (server, url) = start(ServerConfig::default()).await;
    let mut client = connect(&url).await;
    let id = InstanceId::new();
    let _ = roundtrip(
        &mut client,
        &AgentToServer {
            instance_uid: id.to_bytes().to_vec(),
            sequence_num: 1,
            agent_description: Some(description("pod-gone")),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(server.proxy().agent_count(), 1);

    client.close(None).await.unwrap();
    let proxy = Arc::clone(server.proxy());
    wait_until(|| proxy.agent_count() == 0).await;
    assert!(proxy.agents_by_hostname().is_empty());
    wait_until(|| server.session_count() == 0).await;
}

#[tokio::test]
async fn server_pushes_reach_agent() {
    let (server, url) = start(ServerConfig::default()).await;
    let mut client = connect(&url).await;
    let id = InstanceId::new();
    let _ = roundtrip(
        &mut client,
        &AgentToServer {
            instance_uid: id.to_bytes().to_vec(),
            sequence_num: 1,
            ..Default::default()
        },
    )
    .await;

    server
        .proxy()
        .send_to_agent(
            id,
            ServerToAgent {
                flags: ServerToAgentFlags::ReportFullState.bit(),
                ..Default::default()
            },
        )
        .unwrap();
    let pushed = recv(&mut client).await;
    assert_eq!(pushed.instance_uid, id.to_bytes().to_vec());
    assert!(ServerToAgentFlags::ReportFullState.is_set_in(pushed.flags));

    server.proxy().offer_connection_settings(id).unwrap();
    let offered = recv(&mut client).await;
    assert!(offered.connection_settings.is_some());
}

#[tokio::test]
async fn heartbeat_sends_pings() {
    let config = ServerConfig {
        heartbeat_interval_secs: Some(1),
        heartbeat_timeout_secs: 30,
        ..ServerConfig::default()
    };
    let (_server, url) = start(config).await;
    let mut client = connect(&url).await;

    let got_ping = tokio::time::timeout(WAIT, async {
        loop {
            if let Message::Ping(_) = client.next().await.unwrap().unwrap() {
                return;
            }
        }
    })
    .await;
    assert!(got_ping.is_ok());
}

#[tokio::test]
async fn silent_agent_is_dropped() {
    let config = ServerConfig {
        heartbeat_interval_secs: Some(1),
        heartbeat_timeout_secs: 1,
        ..ServerConfig::default()
    };
    let (server, url) = start(config).await;
    let mut client = connect(&url).await;
    let _ = roundtrip(
        &mut client,
        &AgentToServer {
            instance_uid: InstanceId::new().to_bytes().to_vec(),
            sequence_num: 1,
            ..Default::default()
        },
    )
    .await;

    // Stop reading so no pongs go back.
    let proxy = Arc::clone(server.proxy());
    wait_until(|| proxy.agent_count() == 0).await;
    drop(client);
}

#[tokio::test]
async fn fleet_signal_fires_on_new_agent() {
    let (server, url) = start(ServerConfig::default()).await;
    let updates = server.proxy().has_updates();
    let mut client = connect(&url).await;
    let _ = roundtrip(
        &mut client,
        &AgentToServer {
            instance_uid: InstanceId::new().to_bytes().to_vec(),
            sequence_num: 1,
            ..Default::default()
        },
    )
    .await;

    let fired = tokio::time::timeout(WAIT, updates.changed()).await.unwrap();
    assert!(fired);
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    let (server, url) = start(ServerConfig::default()).await;
    let mut client = connect(&url).await;
    let _ = roundtrip(
        &mut client,
        &AgentToServer {
            instance_uid: InstanceId::new().to_bytes().to_vec(),
            sequence_num: 1,
            ..Default::default()
        },
    )
    .await;
    assert_eq!(server.session_count(), 1);

    server
        .shutdown()
        .graceful_shutdown(Vec::new(), Some(WAIT))
        .await;
    assert_eq!(server.session_count(), 0);
    assert_eq!(server.proxy().agent_count(), 0);

    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
