/// 실시간 채널 WebSocket 핸들러
/// 클라이언트는 토픽 구독/해제와 시청자 수 조회를 요청하고,
/// 서버는 batch_update 메시지를 푸시한다.
// region:    --- Imports
use crate::fanout::{FanoutBus, SubscriberId};
use crate::handlers::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Client Protocol

/// 클라이언트 요청 메시지
#[derive(Debug, Deserialize)]
struct ClientRequest {
    action: String,
    topic: String,
}

// endregion: --- Client Protocol

// region:    --- WebSocket Handler

/// WebSocket 업그레이드
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, Arc::clone(&state.fanout)))
}

/// 연결별 수명: 구독 관리 + 배치 메시지 전달
async fn handle_socket(socket: WebSocket, fanout: Arc<FanoutBus>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut subscriptions: HashMap<String, SubscriberId> = HashMap::new();

    // 송신 태스크: 팬아웃 버스가 넣은 메시지를 클라이언트로 전달
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_tx.send(Message::Text(message)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => {
                let request = match serde_json::from_str::<ClientRequest>(&text) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("{:<12} --> 잘못된 요청 수신: {:?}", "Ws", e);
                        continue;
                    }
                };
                match request.action.as_str() {
                    "subscribe" => {
                        if !subscriptions.contains_key(&request.topic) {
                            let id = fanout.subscribe(&request.topic, tx.clone());
                            subscriptions.insert(request.topic.clone(), id);
                        }
                        let _ = tx.send(
                            serde_json::json!({
                                "type": "subscribed",
                                "topic": request.topic,
                            })
                            .to_string(),
                        );
                    }
                    "unsubscribe" => {
                        if let Some(id) = subscriptions.remove(&request.topic) {
                            fanout.unsubscribe(&request.topic, id);
                        }
                    }
                    "viewers_count" => {
                        let count = fanout.viewers_count(&request.topic);
                        let _ = tx.send(
                            serde_json::json!({
                                "type": "viewers_count",
                                "topic": request.topic,
                                "count": count,
                            })
                            .to_string(),
                        );
                    }
                    other => {
                        warn!("{:<12} --> 알 수 없는 액션: {}", "Ws", other);
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // 연결 종료: 남은 구독 모두 해제
    for (topic, id) in subscriptions {
        fanout.unsubscribe(&topic, id);
    }
    send_task.abort();
    info!("{:<12} --> 연결 종료", "Ws");
}

// endregion: --- WebSocket Handler
