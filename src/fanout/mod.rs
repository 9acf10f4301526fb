/// 실시간 업데이트 팬아웃 버스
/// 1. 토픽 구독/해제
/// 2. 토픽별 배치 발행 (윈도우 + 상한)
/// 3. 크로스 프로세스 릴레이 (Kafka, 선택)
// region:    --- Imports
use crate::auction::events::UpdateEvent;
use crate::message_broker::{KafkaConsumer, KafkaProducer};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub mod ws;

// endregion: --- Imports

// region:    --- Fanout Config

/// 릴레이용 Kafka 토픽
pub const RELAY_TOPIC: &str = "updates";

pub type SubscriberId = u64;

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// 배치 윈도우
    pub batch_window: Duration,
    /// 윈도우 내 최대 이벤트 수 (도달 시 즉시 플러시)
    pub batch_cap: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            batch_window: Duration::from_secs(1),
            batch_cap: 100,
        }
    }
}

// endregion: --- Fanout Config

// region:    --- Topic State

/// 토픽별 런타임 상태
struct TopicState {
    subscribers: HashMap<SubscriberId, UnboundedSender<String>>,
    pending: Vec<UpdateEvent>,
    flush_handle: Option<JoinHandle<()>>,
}

impl TopicState {
    fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
            pending: Vec::new(),
            flush_handle: None,
        }
    }
}

// endregion: --- Topic State

// region:    --- Fanout Bus

struct FanoutInner {
    config: FanoutConfig,
    topics: DashMap<String, Arc<Mutex<TopicState>>>,
    next_subscriber_id: AtomicU64,
    relay_producer: Option<Arc<KafkaProducer>>,
}

impl FanoutInner {
    fn topic_state(&self, topic: &str) -> Arc<Mutex<TopicState>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TopicState::new())))
            .clone()
    }

    /// 로컬 배칭 경로: 버퍼에 추가하고 상한/윈도우 규칙에 따라 플러시
    fn publish_local(&self, event: UpdateEvent) {
        let topic = event.topic.clone();
        let state_arc = self.topic_state(&topic);
        let mut state = state_arc.lock().unwrap();
        state.pending.push(event);

        if state.pending.len() >= self.config.batch_cap {
            // 상한 도달: 대기 중인 타이머 취소 후 즉시 플러시
            if let Some(handle) = state.flush_handle.take() {
                handle.abort();
            }
            Self::flush_locked(&topic, &mut state);
        } else if state.flush_handle.is_none() {
            // 윈도우 타이머 시작 (토픽당 하나)
            let state_for_timer = Arc::clone(&state_arc);
            let topic_for_timer = topic.clone();
            let window = self.config.batch_window;
            state.flush_handle = Some(tokio::spawn(async move {
                tokio::time::sleep(window).await;
                let mut state = state_for_timer.lock().unwrap();
                state.flush_handle = None;
                Self::flush_locked(&topic_for_timer, &mut state);
            }));
        }
    }

    /// 배치 전송: batch_update 메시지 하나로 모든 구독자에게 전달
    /// 전송 실패한 구독자는 제거한다.
    fn flush_locked(topic: &str, state: &mut TopicState) {
        if state.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut state.pending);
        let count = batch.len();
        let message = serde_json::json!({
            "type": "batch_update",
            "topic": topic,
            "count": count,
            "updates": batch,
        })
        .to_string();

        let before = state.subscribers.len();
        state
            .subscribers
            .retain(|_, sender| sender.send(message.clone()).is_ok());
        debug!(
            "{:<12} --> 배치 플러시: topic={}, count={}, 구독자={}/{}",
            "Fanout",
            topic,
            count,
            state.subscribers.len(),
            before
        );
    }
}

/// 팬아웃 버스 서비스
/// 전역 싱글턴이 아닌 명시적으로 생성/종료되는 인스턴스다.
pub struct FanoutBus {
    inner: Arc<FanoutInner>,
    relay_task: Mutex<Option<JoinHandle<()>>>,
}

impl FanoutBus {
    pub fn new(config: FanoutConfig) -> Self {
        Self {
            inner: Arc::new(FanoutInner {
                config,
                topics: DashMap::new(),
                next_subscriber_id: AtomicU64::new(0),
                relay_producer: None,
            }),
            relay_task: Mutex::new(None),
        }
    }

    /// 릴레이 구성: 발행이 Kafka를 경유하고, 각 인스턴스의
    /// 릴레이 컨슈머가 로컬 배칭 경로로 재진입한다.
    pub fn with_relay(config: FanoutConfig, producer: Arc<KafkaProducer>) -> Self {
        Self {
            inner: Arc::new(FanoutInner {
                config,
                topics: DashMap::new(),
                next_subscriber_id: AtomicU64::new(0),
                relay_producer: Some(producer),
            }),
            relay_task: Mutex::new(None),
        }
    }

    /// 릴레이 컨슈머 시작
    pub fn start_relay(&self, consumer: Arc<KafkaConsumer>) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let inner_for_handler = Arc::clone(&inner);
            if let Err(e) = consumer
                .consume_json::<UpdateEvent, _, _>(RELAY_TOPIC, move |event| {
                    let inner = Arc::clone(&inner_for_handler);
                    Box::pin(async move {
                        inner.publish_local(event);
                        Ok(())
                    })
                })
                .await
            {
                error!("{:<12} --> 릴레이 소비 오류: {:?}", "Fanout", e);
            }
        });
        *self.relay_task.lock().unwrap() = Some(handle);
        info!("{:<12} --> 릴레이 컨슈머 시작", "Fanout");
    }

    /// 서비스 종료: 릴레이와 대기 중인 플러시 타이머를 모두 중단
    pub fn stop(&self) {
        if let Some(handle) = self.relay_task.lock().unwrap().take() {
            handle.abort();
        }
        for entry in self.inner.topics.iter() {
            let mut state = entry.value().lock().unwrap();
            if let Some(handle) = state.flush_handle.take() {
                handle.abort();
            }
            state.pending.clear();
        }
        info!("{:<12} --> 팬아웃 버스 종료", "Fanout");
    }

    /// 이벤트 발행 (호출자를 블로킹하지 않음)
    pub fn publish(&self, event: UpdateEvent) {
        if let Some(producer) = &self.inner.relay_producer {
            let producer = Arc::clone(producer);
            let key = event.topic.clone();
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("{:<12} --> 이벤트 직렬화 실패: {:?}", "Fanout", e);
                    return;
                }
            };
            tokio::spawn(async move {
                if let Err(e) = producer.send_message(RELAY_TOPIC, &key, &payload).await {
                    error!("{:<12} --> 릴레이 발행 실패: {}", "Fanout", e);
                }
            });
            return;
        }
        self.inner.publish_local(event);
    }

    /// 토픽 구독
    pub fn subscribe(&self, topic: &str, sender: UnboundedSender<String>) -> SubscriberId {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed) + 1;
        let state_arc = self.inner.topic_state(topic);
        state_arc.lock().unwrap().subscribers.insert(id, sender);
        info!(
            "{:<12} --> 구독: topic={}, subscriber={}",
            "Fanout", topic, id
        );
        id
    }

    /// 토픽 구독 해제
    pub fn unsubscribe(&self, topic: &str, subscriber_id: SubscriberId) {
        if let Some(state_arc) = self.inner.topics.get(topic) {
            state_arc.lock().unwrap().subscribers.remove(&subscriber_id);
            debug!(
                "{:<12} --> 구독 해제: topic={}, subscriber={}",
                "Fanout", topic, subscriber_id
            );
        } else {
            warn!("{:<12} --> 알 수 없는 토픽 구독 해제: {}", "Fanout", topic);
        }
    }

    /// 토픽 구독자 수
    pub fn viewers_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|state| state.lock().unwrap().subscribers.len())
            .unwrap_or(0)
    }
}

// endregion: --- Fanout Bus

// region:    --- Tests


// endregion: --- Tests
