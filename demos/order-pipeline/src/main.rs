//! Walks one batch of orders through every hop a real deployment has:
//! an HTTP front end, an internal RPC call, a message queue with byte-array
//! headers, a bus with typed properties and finally a replaying workflow.
//!
//! Run with `RUST_LOG=debug` to also see dropped baggage and rejected
//! headers reported by the library.
use baggage_relay::correlation::CorrelationContext;
use baggage_relay::propagation::{
    BinaryHeaders, TextMapPropagator, TypedProperties, W3cPropagator,
};
use baggage_relay::replay::{ReplayContext, WorkflowCheckpointInput};
use baggage_relay::TraceContext;
use baggage_relay_http::{HeaderExtractor, HeaderInjector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const ORDERS: usize = 8;
const DEFAULT_CONCURRENCY: usize = 4;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreated {
    order_id: String,
    customer_name: String,
    amount_cents: u64,
}

/// A message as the broker delivers it.
#[derive(Debug)]
struct QueueMessage {
    body: Vec<u8>,
    headers: HashMap<String, Vec<u8>>,
}

fn log_hop(hop: &'static str, cx: &TraceContext) {
    let correlation = CorrelationContext::from_baggage(cx.baggage()).unwrap_or_default();
    info!(
        name: "hop",
        hop = hop,
        trace_id = %cx.trace_id(),
        span_id = %cx.span_id(),
        tenant_id = correlation.tenant_id.as_deref().unwrap_or("-"),
        user_id = correlation.user_id.as_deref().unwrap_or("-"),
        correlation_id = correlation.correlation_id.as_deref().unwrap_or("-"),
    );
}

/// The public endpoint: a root context carrying the caller's identity.
fn web_api(propagator: &W3cPropagator, tenant_id: &str) -> Result<http::HeaderMap, BoxError> {
    let mut cx = propagator.extract(&HeaderExtractor(&http::HeaderMap::new()));
    let correlation = CorrelationContext::new()
        .with_tenant_id(tenant_id)
        .with_user_id("user-42")
        .with_correlation_id(uuid::Uuid::new_v4().to_string());
    correlation.insert_into(cx.baggage_mut())?;
    // loose entries for peers that read the ids one by one
    correlation.insert_flat_into(cx.baggage_mut());
    log_hop("web-api", &cx);

    let mut outgoing = http::HeaderMap::new();
    propagator.inject_context(&cx, &mut HeaderInjector(&mut outgoing));
    Ok(outgoing)
}

/// The internal RPC service: publishes one queue message per order.
async fn order_api(
    propagator: &W3cPropagator,
    request: &http::HeaderMap,
    queue: &mpsc::Sender<QueueMessage>,
) -> Result<(), BoxError> {
    let cx = propagator.extract(&HeaderExtractor(request));
    log_hop("order-api", &cx);

    for n in 0..ORDERS {
        let order = OrderCreated {
            order_id: format!("o-{n}"),
            customer_name: format!("customer-{n}"),
            amount_cents: 1_000 + n as u64,
        };
        let mut headers = HashMap::new();
        propagator.inject_context(&cx.new_child(), &mut BinaryHeaders(&mut headers));
        queue
            .send(QueueMessage {
                body: serde_json::to_vec(&order)?,
                headers,
            })
            .await?;
    }
    Ok(())
}

/// The queue consumer: forwards each order onto the bus as typed
/// properties.
fn message_handler(
    propagator: &W3cPropagator,
    message: &QueueMessage,
) -> Result<(OrderCreated, HashMap<String, Value>), BoxError> {
    let cx = propagator.extract(&BinaryHeaders(&message.headers));
    log_hop("message-handler", &cx);

    let order: OrderCreated = serde_json::from_slice(&message.body)?;
    let mut properties = HashMap::new();
    propagator.inject_context(
        &cx,
        &mut TypedProperties::new(&mut properties).with_diagnostic_id(),
    );
    Ok((order, properties))
}

/// The bus trigger: starts a workflow and replays it the way an engine
/// would after a restart.
fn start_workflow(
    propagator: &W3cPropagator,
    order: OrderCreated,
    properties: &HashMap<String, Value>,
) -> Result<(), BoxError> {
    let instance_id = format!("order-{}", order.order_id);
    let (trigger, input) =
        WorkflowCheckpointInput::enqueue(order, propagator, &TypedProperties::new(properties));
    log_hop("workflow-trigger", &trigger);

    let history = input.to_json()?;
    let first = run_orchestration(&instance_id, &history)?;
    let replayed = run_orchestration(&instance_id, &history)?;
    if first != replayed {
        return Err(format!("replay of {instance_id} produced different span ids").into());
    }
    Ok(())
}

fn run_orchestration(instance_id: &str, history: &str) -> Result<Vec<String>, BoxError> {
    let input = WorkflowCheckpointInput::<OrderCreated>::from_json(history)?;
    let mut replay = ReplayContext::rehydrate(instance_id, &input);
    log_hop("orchestration", replay.orchestration());

    let mut spans = vec![replay.orchestration().span().to_string()];
    for _activity in ["reserve-stock", "charge-card"] {
        let step = replay.next_step();
        log_hop("activity", &step);
        spans.push(step.span().to_string());
    }
    Ok(spans)
}

fn concurrency() -> usize {
    match std::env::var("ORDER_PIPELINE_CONCURRENCY") {
        Ok(value) => match value.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                warn!(
                    name: "invalid_concurrency",
                    value = value.as_str(),
                    default = DEFAULT_CONCURRENCY
                );
                DEFAULT_CONCURRENCY
            }
        },
        Err(_) => DEFAULT_CONCURRENCY,
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let propagator = Arc::new(W3cPropagator::new());
    let (tx, mut rx) = mpsc::channel::<QueueMessage>(ORDERS);

    let request = web_api(&propagator, "acme")?;
    order_api(&propagator, &request, &tx).await?;
    drop(tx);

    let permits = Arc::new(Semaphore::new(concurrency()));
    let mut handlers = Vec::with_capacity(ORDERS);
    while let Some(message) = rx.recv().await {
        let permit = Arc::clone(&permits).acquire_owned().await?;
        let propagator = Arc::clone(&propagator);
        handlers.push(tokio::spawn(async move {
            let _permit = permit;
            let (order, properties) = message_handler(&propagator, &message)?;
            tokio::task::yield_now().await;
            start_workflow(&propagator, order, &properties)
        }));
    }

    for handler in handlers {
        handler.await??;
    }
    info!(name: "pipeline_complete", orders = ORDERS);
    Ok(())
}
