/// 작업 큐 백엔드
/// 1. InMemoryJobQueue: 프로세스 내 레인 채널 + 워커 풀
/// 2. KafkaJobQueue: 레인별 Kafka 토픽 + 컨슈머 워커 (분산)
// region:    --- Imports
use super::{Job, JobError, JobExecutor, JobPriority, JobQueue};
use crate::message_broker::{KafkaConsumer, KafkaProducer};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

// endregion: --- Imports

// region:    --- In-Memory Queue

/// 인메모리 작업 큐
/// 레인마다 디스패처 태스크 하나가 세마포어로 동시성을 제한하며 작업을 실행한다.
pub struct InMemoryJobQueue {
    lanes: HashMap<JobPriority, UnboundedSender<Job>>,
    dedupe: DashMap<String, ()>,
    next_id: AtomicU64,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
}

impl InMemoryJobQueue {
    /// 큐 생성 및 워커 시작
    pub fn start(executor: Arc<JobExecutor>) -> Self {
        let mut lanes = HashMap::new();
        let mut dispatchers = Vec::new();

        for priority in JobPriority::ALL {
            let (tx, mut rx) = unbounded_channel::<Job>();
            lanes.insert(priority, tx);

            let executor = Arc::clone(&executor);
            let semaphore = Arc::new(Semaphore::new(priority.concurrency()));
            dispatchers.push(tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    let permit = match Arc::clone(&semaphore).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let executor = Arc::clone(&executor);
                    tokio::spawn(async move {
                        executor.run(job).await;
                        drop(permit);
                    });
                }
            }));
        }

        info!("{:<12} --> 인메모리 작업 큐 시작", "JobQueue");
        Self {
            lanes,
            dedupe: DashMap::new(),
            next_id: AtomicU64::new(0),
            dispatchers: Mutex::new(dispatchers),
        }
    }

    /// 워커 종료
    pub fn stop(&self) {
        for handle in self.dispatchers.lock().unwrap().drain(..) {
            handle.abort();
        }
        info!("{:<12} --> 인메모리 작업 큐 종료", "JobQueue");
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        priority: JobPriority,
        dedupe_key: Option<String>,
    ) -> Result<u64, JobError> {
        if let Some(key) = &dedupe_key {
            if self.dedupe.insert(key.clone(), ()).is_some() {
                debug!(
                    "{:<12} --> 중복 작업 무시: type={}, key={}",
                    "JobQueue", job_type, key
                );
                return Ok(0);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let job = Job {
            id,
            job_type: job_type.to_string(),
            payload,
            priority,
            attempts: 0,
            dedupe_key,
        };
        self.lanes
            .get(&priority)
            .ok_or_else(|| JobError::Failed("unknown lane".to_string()))?
            .send(job)
            .map_err(|e| JobError::Failed(e.to_string()))?;

        debug!(
            "{:<12} --> 작업 등록: type={}, id={}, lane={:?}",
            "JobQueue", job_type, id, priority
        );
        Ok(id)
    }

    fn is_duplicate(&self, dedupe_key: &str) -> bool {
        self.dedupe.contains_key(dedupe_key)
    }

    fn mark_seen(&self, dedupe_key: &str) {
        self.dedupe.insert(dedupe_key.to_string(), ());
    }
}

// endregion: --- In-Memory Queue

// region:    --- Kafka Queue

/// Kafka 기반 분산 작업 큐
/// 등록은 레인 토픽으로 발행하고, 각 인스턴스의 레인 컨슈머가
/// 인메모리 백엔드와 같은 실행기/동시성 정책으로 처리한다.
pub struct KafkaJobQueue {
    producer: Arc<KafkaProducer>,
    dedupe: DashMap<String, ()>,
    next_id: AtomicU64,
    consumers: Mutex<Vec<JoinHandle<()>>>,
}

impl KafkaJobQueue {
    pub fn new(producer: Arc<KafkaProducer>) -> Self {
        Self {
            producer,
            dedupe: DashMap::new(),
            next_id: AtomicU64::new(0),
            consumers: Mutex::new(Vec::new()),
        }
    }

    /// 레인별 컨슈머 워커 시작
    pub fn start_workers(&self, brokers: &str, executor: Arc<JobExecutor>) {
        let mut consumers = self.consumers.lock().unwrap();
        for priority in JobPriority::ALL {
            let consumer = KafkaConsumer::new(brokers, priority.lane_topic());
            let executor = Arc::clone(&executor);
            let semaphore = Arc::new(Semaphore::new(priority.concurrency()));
            consumers.push(tokio::spawn(async move {
                let result = consumer
                    .consume_json::<Job, _, _>(priority.lane_topic(), move |job| {
                        let executor = Arc::clone(&executor);
                        let semaphore = Arc::clone(&semaphore);
                        Box::pin(async move {
                            let permit = semaphore
                                .acquire_owned()
                                .await
                                .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;
                            // 레인 동시성 한도 내에서 실행
                            tokio::spawn(async move {
                                executor.run(job).await;
                                drop(permit);
                            });
                            Ok(())
                        })
                    })
                    .await;
                if let Err(e) = result {
                    error!(
                        "{:<12} --> 레인 컨슈머 오류: lane={:?}, {:?}",
                        "JobQueue", priority, e
                    );
                }
            }));
        }
        info!("{:<12} --> Kafka 작업 큐 워커 시작", "JobQueue");
    }

    /// 컨슈머 워커 종료
    pub fn stop(&self) {
        for handle in self.consumers.lock().unwrap().drain(..) {
            handle.abort();
        }
        info!("{:<12} --> Kafka 작업 큐 종료", "JobQueue");
    }
}

#[async_trait]
impl JobQueue for KafkaJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        priority: JobPriority,
        dedupe_key: Option<String>,
    ) -> Result<u64, JobError> {
        if let Some(key) = &dedupe_key {
            if self.dedupe.insert(key.clone(), ()).is_some() {
                debug!(
                    "{:<12} --> 중복 작업 무시: type={}, key={}",
                    "JobQueue", job_type, key
                );
                return Ok(0);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let job = Job {
            id,
            job_type: job_type.to_string(),
            payload,
            priority,
            attempts: 0,
            dedupe_key,
        };
        let raw = serde_json::to_string(&job).map_err(|e| JobError::Failed(e.to_string()))?;
        self.producer
            .send_message(priority.lane_topic(), &id.to_string(), &raw)
            .await
            .map_err(JobError::Broker)?;

        debug!(
            "{:<12} --> 작업 발행: type={}, id={}, topic={}",
            "JobQueue",
            job_type,
            id,
            priority.lane_topic()
        );
        Ok(id)
    }

    fn is_duplicate(&self, dedupe_key: &str) -> bool {
        self.dedupe.contains_key(dedupe_key)
    }

    fn mark_seen(&self, dedupe_key: &str) {
        self.dedupe.insert(dedupe_key.to_string(), ());
    }
}

// endregion: --- Kafka Queue

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::tests::MemoryFailedJobStore;
    use crate::jobs::JobHandler;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct CountingHandler {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _job: &Job) -> Result<(), JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn executor_with_counter(calls: Arc<AtomicU32>) -> Arc<JobExecutor> {
        let store = Arc::new(MemoryFailedJobStore::new());
        let mut executor = JobExecutor::new(store, 3, Duration::from_millis(100));
        executor.register("count", Arc::new(CountingHandler { calls }));
        Arc::new(executor)
    }

    /// 등록한 작업이 워커에서 실행되는지 확인
    #[tokio::test]
    async fn test_in_memory_queue_executes_jobs() {
        let calls = Arc::new(AtomicU32::new(0));
        let queue = InMemoryJobQueue::start(executor_with_counter(Arc::clone(&calls)));

        for _ in 0..5 {
            queue
                .enqueue("count", serde_json::json!({}), JobPriority::High, None)
                .await
                .unwrap();
        }

        // 워커 처리 대기
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        queue.stop();
    }

    /// 중복 키 등록은 무시되는지 확인
    #[tokio::test]
    async fn test_in_memory_queue_dedupes() {
        let calls = Arc::new(AtomicU32::new(0));
        let queue = InMemoryJobQueue::start(executor_with_counter(Arc::clone(&calls)));

        let first = queue
            .enqueue(
                "count",
                serde_json::json!({}),
                JobPriority::Medium,
                Some("key-1".to_string()),
            )
            .await
            .unwrap();
        let second = queue
            .enqueue(
                "count",
                serde_json::json!({}),
                JobPriority::Medium,
                Some("key-1".to_string()),
            )
            .await
            .unwrap();

        assert!(first > 0);
        assert_eq!(second, 0);
        assert!(queue.is_duplicate("key-1"));

        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        queue.stop();
    }

    /// mark_seen으로 기록한 키는 중복으로 판정되는지 확인
    #[tokio::test]
    async fn test_mark_seen() {
        let calls = Arc::new(AtomicU32::new(0));
        let queue = InMemoryJobQueue::start(executor_with_counter(calls));

        assert!(!queue.is_duplicate("bid:1:2:3000:42"));
        queue.mark_seen("bid:1:2:3000:42");
        assert!(queue.is_duplicate("bid:1:2:3000:42"));
        queue.stop();
    }
}

// endregion: --- Tests
