use anyhow::Result as AnyResult;
use async_trait::async_trait;
use ddd_eventing::error::{EventingError, EventingResult};
use ddd_eventing::{Event, Listener, Provider, QueuedEvent};
use ddd_eventing_aws::sqs::codec::{DEDUPLICATION_ID_ATTRIBUTE, RETRY_COUNT_ATTRIBUTE};
use ddd_eventing_aws::sqs::{OutgoingMessage, QueueClient, ReceivedMessage};
use ddd_eventing_aws::{SqsProvider, SqsProviderConfig};
use futures_util::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const QUEUE: &str = "https://sqs.us-east-1.amazonaws.com/1234/domain-events";
const BODY: &str = r#"{"Message":"{\"name\":\"Domain\\\\Event\",\"data\":{\"occurredOn\":\"2018-03-08 11:11:11\"}}"}"#;

/// 脚本化的队列：按顺序返回预设批次，用尽后模拟空的长轮询
#[derive(Default)]
struct MockQueue {
    batches: Mutex<VecDeque<EventingResult<Vec<ReceivedMessage>>>>,
    deleted: Mutex<Vec<String>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    visibility: Mutex<Vec<(String, i32)>>,
    fail_deletes: bool,
    fail_visibility: bool,
}

impl MockQueue {
    fn with_batches(batches: Vec<EventingResult<Vec<ReceivedMessage>>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl QueueClient for MockQueue {
    async fn receive_messages(
        &self,
        queue_url: &str,
        wait_time_seconds: i32,
        _max_messages: i32,
    ) -> EventingResult<Vec<ReceivedMessage>> {
        assert_eq!(queue_url, QUEUE);
        assert_eq!(wait_time_seconds, 20);
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => batch,
            None => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn delete_message(&self, _queue_url: &str, receipt_handle: &str) -> EventingResult<()> {
        if self.fail_deletes {
            return Err(EventingError::transport("delete_message", "access denied"));
        }
        self.deleted.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }

    async fn send_message(&self, _queue_url: &str, message: OutgoingMessage) -> EventingResult<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn change_message_visibility(
        &self,
        _queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> EventingResult<()> {
        if self.fail_visibility {
            return Err(EventingError::transport(
                "change_message_visibility",
                "receipt handle expired",
            ));
        }
        self.visibility
            .lock()
            .unwrap()
            .push((receipt_handle.to_string(), visibility_timeout));
        Ok(())
    }
}

fn raw(receipt: &str, body: &str, retry_count: Option<&str>) -> ReceivedMessage {
    let mut message_attributes = HashMap::new();
    if let Some(count) = retry_count {
        message_attributes.insert(RETRY_COUNT_ATTRIBUTE.to_string(), count.to_string());
    }
    ReceivedMessage {
        receipt_handle: Some(receipt.to_string()),
        body: Some(body.to_string()),
        attributes: HashMap::from([(
            DEDUPLICATION_ID_ATTRIBUTE.to_string(),
            format!("dedup-{receipt}"),
        )]),
        message_attributes,
    }
}

async fn provider(queue: Arc<MockQueue>) -> EventingResult<SqsProvider> {
    SqsProvider::new(
        SqsProviderConfig::builder()
            .queue_url(QUEUE)
            .client(queue as Arc<dyn QueueClient>)
            .poll_error_delay(Duration::from_millis(5))
            .build(),
    )
    .await
}

async fn next_event(
    events: &mut ddd_eventing::provider::EventStream,
) -> AnyResult<Arc<dyn QueuedEvent>> {
    tokio::time::timeout(Duration::from_secs(2), events.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("event stream closed"))
}

#[tokio::test]
async fn construction_requires_queue_url() {
    let result = SqsProvider::new(
        SqsProviderConfig::builder()
            .queue_url("")
            .client(Arc::new(MockQueue::default()) as Arc<dyn QueueClient>)
            .build(),
    )
    .await;
    assert!(matches!(result, Err(EventingError::InvalidConfig { .. })));
}

#[tokio::test]
async fn maximum_retry_count_defaults_to_25() -> AnyResult<()> {
    let p = provider(Arc::new(MockQueue::default())).await?;
    assert_eq!(p.maximum_retry_count(), 25);

    let custom = SqsProvider::new(
        SqsProviderConfig::builder()
            .queue_url(QUEUE)
            .client(Arc::new(MockQueue::default()) as Arc<dyn QueueClient>)
            .maximum_retry_count(3)
            .build(),
    )
    .await?;
    assert_eq!(custom.maximum_retry_count(), 3);
    Ok(())
}

#[tokio::test]
async fn start_decodes_batches_and_skips_malformed_messages() -> AnyResult<()> {
    let queue = Arc::new(MockQueue::with_batches(vec![Ok(vec![
        raw("bad-1", "not json", None),
        raw("bad-2", BODY, Some("five")),
        raw("good-1", BODY, Some("5")),
        raw("good-2", BODY, None),
    ])]));
    let p = provider(queue.clone()).await?;
    let mut streams = p.start().await?;

    let first = next_event(&mut streams.events).await?;
    assert_eq!(first.name(), "Domain\\Event");
    assert_eq!(first.receipt_token(), "good-1");
    assert_eq!(first.retry_count(), 5);
    assert_eq!(first.delay_seconds(), 64);
    assert_eq!(first.deduplication_key(), Some("dedup-good-1"));
    assert_eq!(
        first.field("occurredOn").and_then(|v| v.as_str()),
        Some("2018-03-08 11:11:11")
    );

    let second = next_event(&mut streams.events).await?;
    assert_eq!(second.receipt_token(), "good-2");
    assert_eq!(second.retry_count(), 0);

    for _ in 0..2 {
        let err = streams.errors.next().await.expect("decode error reported");
        assert!(matches!(err, EventingError::Decode { .. }));
    }

    // 解码失败的消息不被确认
    assert!(queue.deleted.lock().unwrap().is_empty());
    p.stop().await;
    Ok(())
}

#[tokio::test]
async fn transport_errors_do_not_stop_polling() -> AnyResult<()> {
    let queue = Arc::new(MockQueue::with_batches(vec![
        Err(EventingError::transport("receive_message", "throttled")),
        Ok(vec![raw("after-error", BODY, None)]),
    ]));
    let p = provider(queue).await?;
    let mut streams = p.start().await?;

    let err = streams.errors.next().await.expect("transport error reported");
    assert!(matches!(err, EventingError::Transport { .. }));

    let event = next_event(&mut streams.events).await?;
    assert_eq!(event.receipt_token(), "after-error");
    p.stop().await;
    Ok(())
}

#[tokio::test]
async fn requeue_deletes_and_resubmits_with_backoff() -> AnyResult<()> {
    let queue = Arc::new(MockQueue::with_batches(vec![Ok(vec![
        raw("r-5", BODY, Some("5")),
        raw("r-15", BODY, Some("15")),
    ])]));
    let p = provider(queue.clone()).await?;
    let mut streams = p.start().await?;

    let five = next_event(&mut streams.events).await?;
    let fifteen = next_event(&mut streams.events).await?;
    p.requeue(five.as_ref()).await;
    p.requeue(fifteen.as_ref()).await;

    assert_eq!(*queue.deleted.lock().unwrap(), vec!["r-5", "r-15"]);

    let sent = queue.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].body, BODY);
    assert_eq!(sent[0].delay_seconds, 64);
    assert_eq!(sent[0].deduplication_id.as_deref(), Some("dedup-r-5"));
    assert_eq!(
        sent[0].number_attributes.get(RETRY_COUNT_ATTRIBUTE).map(String::as_str),
        Some("6")
    );
    assert_eq!(sent[1].delay_seconds, 900);
    assert_eq!(
        sent[1].number_attributes.get(RETRY_COUNT_ATTRIBUTE).map(String::as_str),
        Some("16")
    );

    p.stop().await;
    Ok(())
}

#[tokio::test]
async fn delete_failure_surfaces_on_error_stream() -> AnyResult<()> {
    let queue = Arc::new(MockQueue {
        batches: Mutex::new(VecDeque::from([Ok(vec![raw("d-1", BODY, None)])])),
        fail_deletes: true,
        ..Default::default()
    });
    let p = provider(queue).await?;
    let mut streams = p.start().await?;

    let event = next_event(&mut streams.events).await?;
    p.delete(event.as_ref()).await;

    let err = streams.errors.next().await.expect("delete error reported");
    assert!(matches!(
        err,
        EventingError::Transport {
            operation: "delete_message",
            ..
        }
    ));
    p.stop().await;
    Ok(())
}

#[tokio::test]
async fn delete_failures_wait_for_room_on_a_full_error_stream() -> AnyResult<()> {
    let queue = Arc::new(MockQueue {
        batches: Mutex::new(VecDeque::from([Ok(vec![
            raw("d-1", BODY, None),
            raw("d-2", BODY, None),
        ])])),
        fail_deletes: true,
        ..Default::default()
    });
    let p = SqsProvider::new(
        SqsProviderConfig::builder()
            .queue_url(QUEUE)
            .client(queue as Arc<dyn QueueClient>)
            .error_buffer(1)
            .build(),
    )
    .await?;
    let mut streams = p.start().await?;
    let first = next_event(&mut streams.events).await?;
    let second = next_event(&mut streams.events).await?;

    let errors = &mut streams.errors;
    let ((), reported) = tokio::join!(
        async {
            p.delete(first.as_ref()).await;
            p.delete(second.as_ref()).await;
        },
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut reported = 0;
            while reported < 2 {
                match tokio::time::timeout(Duration::from_secs(2), errors.next()).await {
                    Ok(Some(_)) => reported += 1,
                    _ => break,
                }
            }
            reported
        }
    );
    assert_eq!(reported, 2);

    p.stop().await;
    Ok(())
}

#[tokio::test]
async fn visibility_update_targets_the_receipt_and_returns_errors() -> AnyResult<()> {
    let queue = Arc::new(MockQueue::with_batches(vec![Ok(vec![raw("v-1", BODY, None)])]));
    let p = provider(queue.clone()).await?;
    let mut streams = p.start().await?;

    let event = next_event(&mut streams.events).await?;
    event.update_visibility_timeout(120).await?;
    p.update_visibility_timeout("v-1", 300).await?;
    assert_eq!(
        *queue.visibility.lock().unwrap(),
        vec![("v-1".to_string(), 120), ("v-1".to_string(), 300)]
    );
    p.stop().await;

    let failing = Arc::new(MockQueue {
        fail_visibility: true,
        ..Default::default()
    });
    let p = provider(failing).await?;
    assert!(p.update_visibility_timeout("gone", 30).await.is_err());
    Ok(())
}

#[tokio::test]
async fn stop_closes_both_streams_and_start_is_single_use() -> AnyResult<()> {
    let p = provider(Arc::new(MockQueue::default())).await?;
    let mut streams = p.start().await?;
    assert!(matches!(p.start().await, Err(EventingError::Provider { .. })));

    p.stop().await;
    assert!(streams.events.next().await.is_none());
    assert!(streams.errors.next().await.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn listener_acknowledges_requeues_and_abandons() -> AnyResult<()> {
    let queue = Arc::new(MockQueue::with_batches(vec![Ok(vec![
        raw("ok", r#"{"Message":"{\"name\":\"Paid\",\"data\":{}}"}"#, None),
        raw("retry", r#"{"Message":"{\"name\":\"Broken\",\"data\":{}}"}"#, Some("1")),
        raw("give-up", r#"{"Message":"{\"name\":\"Broken\",\"data\":{}}"}"#, Some("4")),
    ])]));
    let p = SqsProvider::new(
        SqsProviderConfig::builder()
            .queue_url(QUEUE)
            .client(queue.clone() as Arc<dyn QueueClient>)
            .maximum_retry_count(3)
            .build(),
    )
    .await?;

    let terminal = Arc::new(AtomicUsize::new(0));
    let mut listener = Listener::new(Arc::new(p));
    listener.register_fn("Paid", |_ev: Arc<dyn QueuedEvent>| async { anyhow::Ok(()) });
    listener.register_fn("Broken", |_ev: Arc<dyn QueuedEvent>| async {
        Err::<(), _>(anyhow::anyhow!("downstream unavailable"))
    });
    {
        let terminal = terminal.clone();
        listener.on_error(move |err: &EventingError| {
            assert!(err.is_terminal());
            terminal.fetch_add(1, Ordering::SeqCst);
        });
    }

    let halt = listener.halt_token();
    let running = tokio::spawn(async move { listener.listen().await });

    let settled = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let deleted = queue.deleted.lock().unwrap().len();
            let sent = queue.sent.lock().unwrap().len();
            if deleted == 2 && sent == 1 && terminal.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(settled.is_ok());

    let mut deleted = queue.deleted.lock().unwrap().clone();
    deleted.sort();
    assert_eq!(deleted, vec!["ok", "retry"]);
    let sent = queue.sent.lock().unwrap().clone();
    assert_eq!(
        sent[0].number_attributes.get(RETRY_COUNT_ATTRIBUTE).map(String::as_str),
        Some("2")
    );
    assert_eq!(sent[0].delay_seconds, 4);

    halt.cancel();
    tokio::time::timeout(Duration::from_secs(3), running).await???;
    Ok(())
}
