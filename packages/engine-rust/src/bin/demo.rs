//! Courier demo: wires a small order workflow, dispatches, publishes and logs
//! the resulting statistics and pipeline analysis.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use courier_core::{Notification, Request, RequestKind};
use courier_engine::telemetry::init_tracing;
use courier_engine::{
    DispatchError, LogConfig, Mediator, MediatorConfig, NotificationHandler, Registration,
    RequestCatalog, RequestHandler, Subscriber, TracingLifecycleObserver, Typed, TypedMiddleware,
    TypedNext,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs the courier mediator against an in-memory order book.
#[derive(Parser, Debug)]
#[command(name = "courier-demo", version, about, long_about = None)]
struct Args {
    /// Tracing filter directive
    #[arg(long, env = "COURIER_LOG", default_value = "info")]
    log: String,

    /// Emit JSON log lines
    #[arg(long, env = "COURIER_LOG_JSON")]
    json: bool,

    /// Deadline for each request, in milliseconds
    #[arg(long, env = "COURIER_REQUEST_TIMEOUT_MS", default_value_t = 5_000)]
    timeout_ms: u64,

    /// Maximum in-flight requests
    #[arg(long, env = "COURIER_MAX_CONCURRENT", default_value_t = 64)]
    max_concurrent: u32,

    /// Number of orders to place
    #[arg(long, default_value_t = 3)]
    orders: u32,
}

impl Args {
    fn config(&self) -> MediatorConfig {
        MediatorConfig {
            default_request_timeout_ms: self.timeout_ms,
            max_concurrent_requests: self.max_concurrent,
            log: LogConfig {
                filter: self.log.clone(),
                json: self.json,
            },
            ..MediatorConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

struct PlaceOrder {
    sku: String,
    quantity: u32,
}

impl Request for PlaceOrder {
    type Response = u64;
    const KIND: RequestKind = RequestKind::Command;
}

struct OrderTotal;

impl Request for OrderTotal {
    type Response = u32;
    const KIND: RequestKind = RequestKind::Query;
}

struct OrderPlaced {
    id: u64,
    quantity: u32,
}

impl Notification for OrderPlaced {}

// ---------------------------------------------------------------------------
// Handlers, middleware, subscribers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct OrderBook {
    orders: parking_lot::Mutex<Vec<(u64, u32)>>,
}

struct PlaceOrderHandler(Arc<OrderBook>);

#[async_trait]
impl RequestHandler<PlaceOrder> for PlaceOrderHandler {
    async fn handle(
        &self,
        request: &PlaceOrder,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<u64> {
        anyhow::ensure!(request.quantity > 0, "cannot order zero of {}", request.sku);
        let mut orders = self.0.orders.lock();
        let id = orders.len() as u64 + 1;
        orders.push((id, request.quantity));
        Ok(id)
    }
}

struct OrderTotalHandler(Arc<OrderBook>);

#[async_trait]
impl RequestHandler<OrderTotal> for OrderTotalHandler {
    async fn handle(
        &self,
        _request: &OrderTotal,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<u32> {
        Ok(self.0.orders.lock().iter().map(|(_, quantity)| quantity).sum())
    }
}

/// Rejects oversized orders before they reach the handler.
struct QuantityLimit(u32);

#[async_trait]
impl TypedMiddleware<PlaceOrder> for QuantityLimit {
    fn order(&self) -> Option<i32> {
        Some(10)
    }

    fn configuration(&self) -> Option<String> {
        Some(format!("max_quantity={}", self.0))
    }

    async fn handle(
        &self,
        request: &PlaceOrder,
        _cancel: &CancellationToken,
        next: TypedNext<'_, PlaceOrder>,
    ) -> Result<u64, DispatchError> {
        if request.quantity > self.0 {
            return Err(anyhow::anyhow!("quantity {} exceeds {}", request.quantity, self.0).into());
        }
        next.run().await
    }
}

struct StockReservation;

#[async_trait]
impl NotificationHandler<OrderPlaced> for StockReservation {
    async fn handle(
        &self,
        notification: &OrderPlaced,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        info!(order = notification.id, quantity = notification.quantity, "stock reserved");
        Ok(())
    }
}

/// Fails for large orders, to show isolated delivery failures.
struct ShippingLabel;

#[async_trait]
impl Subscriber<OrderPlaced> for ShippingLabel {
    async fn on_notification(
        &self,
        notification: &OrderPlaced,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(
            notification.quantity < 5,
            "label printer jammed on order {}",
            notification.id
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.config();
    init_tracing(&config.log).context("failed to initialise tracing")?;

    let book = Arc::new(OrderBook::default());
    let mediator = Mediator::builder()
        .config(config)
        .handler::<PlaceOrder, _>(PlaceOrderHandler(Arc::clone(&book)))
        .handler::<OrderTotal, _>(OrderTotalHandler(Arc::clone(&book)))
        .notification_handler::<OrderPlaced, _>(StockReservation)
        .middleware(Registration::request(Typed::new(QuantityLimit(8))))
        .observer(Arc::new(TracingLifecycleObserver))
        .with_builtin_middleware()
        .build();
    mediator.subscribe::<OrderPlaced, _>(&Arc::new(ShippingLabel));

    for quantity in (1..=args.orders).map(|n| n * 3) {
        let request = PlaceOrder {
            sku: "courier-mug".to_string(),
            quantity,
        };
        match mediator.send(request).await {
            Ok(id) => {
                let report = mediator.publish(OrderPlaced { id, quantity }).await?;
                info!(order = id, outcome = report.outcome().as_str(), "order placed");
            }
            Err(err) => warn!(quantity, error = %err, "order rejected"),
        }
    }

    let total = mediator.send(OrderTotal).await?;
    info!(total, "units ordered");

    let catalog = RequestCatalog::new().with::<PlaceOrder>().with::<OrderTotal>();
    let report = serde_json::json!({
        "statistics": mediator.report_statistics(),
        "commands": mediator.analyze_commands(&catalog),
        "queries": mediator.analyze_queries(&catalog),
        "middleware": mediator.inspector().analyze_middleware(),
    });
    info!(report = %report, "courier demo finished");
    Ok(())
}
