use anyhow::Result;
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::{info, warn};

#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
    snapshots: IntCounter,
    change_records: IntCounter,
    invalidations: IntCounter,
    notifications: IntCounterVec,
    feed_errors: IntCounterVec,
}

impl MetricsHandle {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let snapshots = IntCounter::new(
            "order_feed_snapshots_total",
            "Feed snapshots processed by the notifier",
        )?;
        let change_records = IntCounter::new(
            "order_feed_change_records_total",
            "Change records seen across all snapshots",
        )?;
        let invalidations = IntCounter::new(
            "order_cache_invalidations_total",
            "Cache invalidations issued for shop order lists",
        )?;
        let notifications = IntCounterVec::new(
            Opts::new("order_notifications_total", "Notifications shown to the owner"),
            &["style"],
        )?;
        let feed_errors = IntCounterVec::new(
            Opts::new("order_feed_errors_total", "Errors reported by the order feed"),
            &["code"],
        )?;
        registry.register(Box::new(snapshots.clone()))?;
        registry.register(Box::new(change_records.clone()))?;
        registry.register(Box::new(invalidations.clone()))?;
        registry.register(Box::new(notifications.clone()))?;
        registry.register(Box::new(feed_errors.clone()))?;
        Ok(Self {
            registry,
            snapshots,
            change_records,
            invalidations,
            notifications,
            feed_errors,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_snapshot(&self, records: usize) {
        self.snapshots.inc();
        self.change_records.inc_by(records as u64);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.inc();
    }

    pub fn record_notification(&self, style: &str) {
        self.notifications.with_label_values(&[style]).inc();
    }

    pub fn record_feed_error(&self, code: &str) {
        self.feed_errors.with_label_values(&[code]).inc();
    }

    pub fn render(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let make_svc = make_service_fn(move |_| {
            let metrics = self.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_req: Request<Body>| {
                    let metrics = metrics.clone();
                    async move { Ok::<_, hyper::Error>(metrics.respond()) }
                }))
            }
        });

        let server = Server::bind(&addr).serve(make_svc);
        info!(%addr, "metrics exporter listening");
        server.await?;
        Ok(())
    }

    fn respond(&self) -> Response<Body> {
        match self.render() {
            Ok((content_type, buffer)) => {
                let mut resp = Response::new(Body::from(buffer));
                if let Ok(value) = content_type.parse::<hyper::header::HeaderValue>() {
                    resp.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
                }
                resp
            }
            Err(err) => {
                warn!(error = ?err, "failed to encode metrics");
                let mut resp = Response::new(Body::from("metrics encoding failed"));
                *resp.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
                resp
            }
        }
    }
}
