use anyhow::Result;
use ddd_eventing::event::decode_payload;
use ddd_eventing::{
    Event, EventingError, InMemoryProvider, Listener, NamedEvent, Payload, Provider, Publisher,
    QueuedEvent,
};
use ddd_eventing_aws::{SnsPublisher, SnsPublisherConfig, SqsProvider, SqsProviderConfig};
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXAMPLE_EVENT: &str = "ExampleDomainEvent";
const FAILING_EVENT: &str = "PaymentDeclined";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExampleDomainEvent {
    occurred_on: String,
    #[serde(default)]
    account_id: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn sample(name: &str, account_id: &str) -> NamedEvent {
    let data: Payload = match json!({
        "occurredOn": "2018-03-08 11:11:11",
        "accountId": account_id,
    }) {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    };
    NamedEvent::new(name, data)
}

async fn publish_samples(publisher: &dyn Publisher) -> Result<()> {
    let events = [
        sample(EXAMPLE_EVENT, "acc-1"),
        sample(EXAMPLE_EVENT, "acc-2"),
        sample(FAILING_EVENT, "acc-3"),
        sample("UnhandledEvent", "acc-4"),
    ];
    let refs: Vec<&dyn Event> = events.iter().map(|e| e as &dyn Event).collect();
    publisher.publish_batch(&refs).await?;
    info!(count = refs.len(), "published sample events");
    Ok(())
}

/// 有队列地址时接入 SQS（可选经 SNS 发布样例事件），否则使用内存事件源
async fn build_provider() -> Result<Arc<dyn Provider>> {
    let region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let endpoint_url = env::var("AWS_ENDPOINT_URL").ok();

    let Ok(queue_url) = env::var("EVENTS_QUEUE_URL") else {
        info!("EVENTS_QUEUE_URL not set, using in-memory provider");
        let provider = InMemoryProvider::new(64)
            .with_maximum_retry_count(2)
            .with_redelivery();
        publish_samples(&provider).await?;
        return Ok(Arc::new(provider));
    };

    if let Ok(topic_arn) = env::var("EVENTS_TOPIC_ARN") {
        let publisher = SnsPublisher::new(
            SnsPublisherConfig::builder()
                .topic_arn(topic_arn)
                .region(region.clone())
                .maybe_endpoint_url(endpoint_url.clone())
                .build(),
        )
        .await?;
        publish_samples(&publisher).await?;
    }

    let provider = SqsProvider::new(
        SqsProviderConfig::builder()
            .queue_url(queue_url)
            .region(region)
            .maybe_endpoint_url(endpoint_url)
            .build(),
    )
    .await?;
    Ok(Arc::new(provider))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let provider = build_provider().await?;
    let mut listener = Listener::new(provider);

    listener.register_fn(EXAMPLE_EVENT, |ev: Arc<dyn QueuedEvent>| async move {
        let payload: ExampleDomainEvent = decode_payload(ev.as_ref())?;
        info!(
            occurred_on = %payload.occurred_on,
            account_id = payload.account_id.as_deref().unwrap_or("-"),
            retries = ev.retry_count(),
            "handled example event"
        );
        // 长耗时处理前续期可见期
        if let Err(err) = ev.update_visibility_timeout(60).await {
            warn!(error = %err, "could not extend visibility timeout");
        }
        anyhow::Ok(())
    });
    listener.register_fn(FAILING_EVENT, |ev: Arc<dyn QueuedEvent>| async move {
        Err::<(), _>(anyhow::anyhow!(
            "payment gateway rejected attempt {}",
            ev.retry_count() + 1
        ))
    });
    listener.on_error(|err: &EventingError| {
        error!(error = %err, "event abandoned");
    });

    let listener = Arc::new(listener);
    let signal = {
        let listener = listener.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("ctrl-c received, halting");
                    listener.halt();
                }
                Err(err) => warn!(error = %err, "failed to listen for ctrl-c"),
            }
        })
    };

    listener.listen().await?;
    signal.abort();
    info!("listener stopped");
    Ok(())
}
