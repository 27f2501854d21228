//! Session tests against a local WebSocket relay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use parley_common::SignalingSettings;
use parley_signaling::{
    decode, establish, CandidateOutcome, ChannelSigner, ClientId, ConnectionState, IceCandidate,
    LocalPeer, MediaConnection, MediaError, NegotiationEngine, SdpKind, SessionError,
    SessionEvent, SignalingMessage, SignalingSession,
};
use parley_sigv4::{ChannelEndpoint, Credentials, FixedClock, SystemClock};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async};

const ARN: &str = "arn:aws:kinesisvideo:us-west-2:123456789012:channel/demo/1";

#[derive(Default)]
struct RecordingMedia {
    remote: Mutex<Vec<(ClientId, SdpKind)>>,
    candidates: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaConnection for RecordingMedia {
    async fn set_local_description(&self, _kind: SdpKind, _sdp: &str) -> Result<(), MediaError> {
        Ok(())
    }

    async fn set_remote_description(
        &self,
        client_id: &ClientId,
        kind: SdpKind,
        _sdp: &str,
    ) -> Result<(), MediaError> {
        self.remote.lock().unwrap().push((client_id.clone(), kind));
        Ok(())
    }

    async fn add_ice_candidate(
        &self,
        _client_id: &ClientId,
        candidate: &IceCandidate,
    ) -> Result<(), MediaError> {
        self.candidates
            .lock()
            .unwrap()
            .push(candidate.candidate.clone());
        Ok(())
    }
}

fn creds() -> Credentials {
    Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
}

fn settings() -> SignalingSettings {
    SignalingSettings {
        reconnect_delay: Duration::from_millis(10),
        connect_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

async fn relay() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    (listener, endpoint)
}

/// A frame as the relay forwards it.
fn inbound(message_type: &str, payload: Value, sender: Option<&str>) -> Message {
    let mut frame = json!({
        "messageType": message_type,
        "messagePayload": STANDARD.encode(payload.to_string()),
    });
    if let Some(sender) = sender {
        frame["senderClientId"] = Value::from(sender);
    }
    Message::text(frame.to_string())
}

fn candidate_payload(n: u32) -> Value {
    json!({"candidate": format!("candidate:{}", n), "sdpMid": "0", "sdpMLineIndex": 0})
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event stream ended")
}

#[tokio::test]
async fn viewer_session_exchanges_signaling() {
    let (listener, endpoint) = relay().await;
    let (handshake_tx, handshake_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let agent = req
                .headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let query = req.uri().query().unwrap_or_default().to_string();
            let _ = handshake_tx.send((agent, query));
            Ok(resp)
        };
        let mut ws = accept_hdr_async(stream, callback).await.unwrap();

        let offer = ws.next().await.unwrap().unwrap();
        let offer = offer.into_text().unwrap().as_str().to_string();

        ws.send(Message::text("not json".to_string())).await.unwrap();
        ws.send(Message::text(
            r#"{"messageType":"STATUS_RESPONSE","messagePayload":""}"#.to_string(),
        ))
            .await
            .unwrap();
        ws.send(inbound("ICE_CANDIDATE", candidate_payload(1), None)).await.unwrap();
        ws.send(inbound("ICE_CANDIDATE", candidate_payload(2), None)).await.unwrap();
        ws.send(inbound("SDP_ANSWER", json!({"type": "answer", "sdp": "v=0 answer"}), None))
            .await
            .unwrap();
        ws.send(inbound("ICE_CANDIDATE", candidate_payload(3), None)).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
        offer
    });

    let local = LocalPeer::viewer(Some(ClientId::from("viewer-1")));
    let url = establish(
        &local,
        &ChannelEndpoint::new(endpoint, ARN),
        &creds(),
        "us-west-2",
        &SystemClock,
    )
    .unwrap();
    let media = Arc::new(RecordingMedia::default());
    let engine = Arc::new(NegotiationEngine::new(local, media.clone()));
    let (session, mut events) = SignalingSession::connect(url, engine.clone(), settings())
        .await
        .unwrap();
    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected));

    session.send_offer("v=0 offer").await.unwrap();

    for n in 1..=2 {
        match next_event(&mut events).await {
            SessionEvent::RemoteCandidate {
                client_id,
                candidate,
                outcome,
            } => {
                assert!(client_id.is_counterpart());
                assert_eq!(candidate.candidate, format!("candidate:{}", n));
                assert_eq!(outcome, CandidateOutcome::Buffered);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    match next_event(&mut events).await {
        SessionEvent::RemoteSdp {
            kind, sdp, flushed, ..
        } => {
            assert_eq!(kind, SdpKind::Answer);
            assert_eq!(sdp, "v=0 answer");
            assert_eq!(flushed, 2);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::RemoteCandidate {
            outcome: CandidateOutcome::Applied,
            ..
        }
    ));
    assert_eq!(
        *media.candidates.lock().unwrap(),
        vec!["candidate:1", "candidate:2", "candidate:3"]
    );
    assert_eq!(
        *media.remote.lock().unwrap(),
        vec![(ClientId::counterpart(), SdpKind::Answer)]
    );

    session.observe_connection_state(ConnectionState::Connected);
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::ConnectionStateChanged {
            state: ConnectionState::Connected
        }
    ));

    session.close().await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Closed));
    assert_eq!(engine.peer_count().await, 0);

    let offer = server.await.unwrap();
    let envelope = decode(&offer).unwrap().unwrap();
    assert_eq!(
        envelope.message,
        SignalingMessage::SdpOffer {
            sdp: "v=0 offer".into()
        }
    );
    assert_eq!(envelope.sender_client_id, Some(ClientId::from("viewer-1")));

    let (agent, query) = handshake_rx.await.unwrap();
    assert!(agent.starts_with("parley/"));
    assert!(query.contains("X-Amz-ClientId=viewer-1"));
    assert!(query.contains("X-Amz-Signature="));
}

#[tokio::test]
async fn reconnect_budget_then_terminal_failure() {
    let (listener, endpoint) = relay().await;
    let connections = Arc::new(AtomicUsize::new(0));

    let accepted = connections.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            accepted.fetch_add(1, Ordering::SeqCst);
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.close(None).await;
        }
    });

    let signer = ChannelSigner::new(
        LocalPeer::master(),
        ChannelEndpoint::new(endpoint, ARN),
        creds(),
        "us-west-2",
        Arc::new(SystemClock),
    );
    let engine = Arc::new(NegotiationEngine::new(
        LocalPeer::master(),
        Arc::new(RecordingMedia::default()),
    ));
    let (session, mut events) = SignalingSession::connect_signed(signer, engine.clone(), settings())
        .await
        .unwrap();

    let mut seen = Vec::new();
    loop {
        let event = next_event(&mut events).await;
        let terminal = event.is_terminal();
        seen.push(event);
        if terminal {
            break;
        }
    }

    let reconnects: Vec<u32> = seen
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Reconnecting { attempt } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(reconnects, vec![1, 2]);
    let connected = seen
        .iter()
        .filter(|event| matches!(event, SessionEvent::Connected))
        .count();
    assert_eq!(connected, 3);
    assert!(matches!(
        seen.last(),
        Some(SessionEvent::Failed {
            error: SessionError::Transport(_)
        })
    ));
    assert_eq!(connections.load(Ordering::SeqCst), 3);

    timeout(Duration::from_secs(5), async {
        while !session.is_closed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(matches!(
        session.send_answer("v=0", &ClientId::from("v1")).await,
        Err(SessionError::Closed)
    ));
}

#[tokio::test]
async fn relay_gone_exhausts_budget() {
    let (listener, endpoint) = relay().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _ = ws.close(None).await;
        // listener dropped here; reconnects are refused
    });

    let local = LocalPeer::master();
    let url = establish(
        &local,
        &ChannelEndpoint::new(endpoint, ARN),
        &creds(),
        "us-west-2",
        &SystemClock,
    )
    .unwrap();
    let engine = Arc::new(NegotiationEngine::new(local, Arc::new(RecordingMedia::default())));
    let (_session, mut events) = SignalingSession::connect(url, engine, settings())
        .await
        .unwrap();

    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Disconnected { .. }));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Reconnecting { attempt: 1 }));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Reconnecting { attempt: 2 }));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Failed { .. }));
}

#[tokio::test]
async fn expired_url_is_not_used() {
    let local = LocalPeer::master();
    let clock = FixedClock(Utc::now() - chrono::Duration::seconds(300));
    let url = establish(
        &local,
        &ChannelEndpoint::new("ws://127.0.0.1:9", ARN),
        &creds(),
        "us-west-2",
        &clock,
    )
    .unwrap();
    assert_eq!(url.query_param("X-Amz-Expires"), Some("299"));

    let engine = Arc::new(NegotiationEngine::new(local, Arc::new(RecordingMedia::default())));
    let err = SignalingSession::connect(url, engine, settings())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UrlExpired(_)));
}

#[tokio::test]
async fn engine_binds_to_one_session() {
    let local = LocalPeer::master();
    let url = establish(
        &local,
        &ChannelEndpoint::new("ws://127.0.0.1:9", ARN),
        &creds(),
        "us-west-2",
        &SystemClock,
    )
    .unwrap();
    let engine = Arc::new(NegotiationEngine::new(local, Arc::new(RecordingMedia::default())));
    let _outbox = engine.take_outbox();

    let err = SignalingSession::connect(url, engine, settings())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::EngineInUse));
}

/// Media whose remote-description call never completes.
#[derive(Default)]
struct StalledMedia {
    entered: Notify,
}

#[async_trait]
impl MediaConnection for StalledMedia {
    async fn set_local_description(&self, _kind: SdpKind, _sdp: &str) -> Result<(), MediaError> {
        Ok(())
    }

    async fn set_remote_description(
        &self,
        _client_id: &ClientId,
        _kind: SdpKind,
        _sdp: &str,
    ) -> Result<(), MediaError> {
        self.entered.notify_one();
        std::future::pending().await
    }

    async fn add_ice_candidate(
        &self,
        _client_id: &ClientId,
        _candidate: &IceCandidate,
    ) -> Result<(), MediaError> {
        Ok(())
    }
}

#[tokio::test]
async fn close_cancels_stalled_remote_description() {
    let (listener, endpoint) = relay().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(inbound("ICE_CANDIDATE", candidate_payload(1), Some("viewer-1")))
            .await
            .unwrap();
        ws.send(inbound(
            "SDP_OFFER",
            json!({"type": "offer", "sdp": "v=0 offer"}),
            Some("viewer-1"),
        ))
        .await
        .unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
    });

    let local = LocalPeer::master();
    let url = establish(
        &local,
        &ChannelEndpoint::new(endpoint, ARN),
        &creds(),
        "us-west-2",
        &SystemClock,
    )
    .unwrap();
    let media = Arc::new(StalledMedia::default());
    let engine = Arc::new(NegotiationEngine::new(local, media.clone()));
    let (session, mut events) = SignalingSession::connect(url, engine.clone(), settings())
        .await
        .unwrap();
    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected));
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::RemoteCandidate {
            outcome: CandidateOutcome::Buffered,
            ..
        }
    ));

    timeout(Duration::from_secs(5), media.entered.notified())
        .await
        .expect("remote description never reached the media layer");

    timeout(Duration::from_secs(3), session.close())
        .await
        .expect("close blocked on the stalled remote description");
    assert!(matches!(next_event(&mut events).await, SessionEvent::Closed));
    assert_eq!(engine.generation(), 1);
    assert_eq!(engine.peer_count().await, 0);
}
