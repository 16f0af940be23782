//! # Interceptor Integration Tests
//!
//! End-to-end tests for the request interceptor: policy resolution,
//! instance selection, connection accounting symmetry under success and
//! failure, and the empty-list hard failure.

use async_trait::async_trait;
use bytes::Bytes;
use client_balancer::{
    BalancerError, BalancerResult, BalancingConfig, ConfigPolicyBinder, ConnectionCounter,
    InstanceDirectory, OutgoingRequest, PolicyKind, PolicyRegistry, RequestInterceptor,
    ServiceInstance, StaticInstanceDirectory, Transport, UpstreamResponse,
};
use http::{Method, StatusCode};
use parking_lot::Mutex;
use tokio_test::assert_ok;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Everything a test needs to drive the interceptor
struct Harness {
    directory: Arc<StaticInstanceDirectory>,
    counter: Arc<ConnectionCounter>,
    registry: Arc<PolicyRegistry>,
}

fn harness(bindings: &[(&str, PolicyKind)]) -> Harness {
    let directory = Arc::new(StaticInstanceDirectory::new());
    let counter = Arc::new(ConnectionCounter::new());
    let config = BalancingConfig::from_bindings(
        bindings
            .iter()
            .map(|(name, kind)| (name.to_string(), *kind)),
    );
    let registry = Arc::new(PolicyRegistry::new(Arc::new(ConfigPolicyBinder::new(
        config,
        directory.clone() as Arc<dyn InstanceDirectory>,
        counter.clone(),
    ))));
    Harness {
        directory,
        counter,
        registry,
    }
}

fn request(service: &str) -> OutgoingRequest {
    OutgoingRequest::new(service, Method::GET, "/api/hello")
}

/// Transport that records the in-flight count it observed per dispatch
/// and can be told to fail every request.
struct RecordingTransport {
    counter: Arc<ConnectionCounter>,
    observed: Mutex<Vec<(String, usize)>>,
    dispatches: AtomicUsize,
    fail: bool,
}

impl RecordingTransport {
    fn new(counter: Arc<ConnectionCounter>, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            counter,
            observed: Mutex::new(Vec::new()),
            dispatches: AtomicUsize::new(0),
            fail,
        })
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn dispatch(
        &self,
        request: &OutgoingRequest,
        instance: &ServiceInstance,
    ) -> BalancerResult<UpstreamResponse> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        self.observed
            .lock()
            .push((instance.instance_key(), self.counter.count(instance)));

        if self.fail {
            return Err(BalancerError::transport(
                request.service.clone(),
                "connection refused",
            ));
        }
        Ok(UpstreamResponse::new(StatusCode::OK).with_body(Bytes::from_static(b"hello")))
    }
}

#[tokio::test]
async fn round_robin_requests_cycle_through_instances() {
    let h = harness(&[("service-a", PolicyKind::RoundRobin)]);
    for host in ["a", "b", "c"] {
        h.directory
            .register_instance("service-a", ServiceInstance::new(host, 8080));
    }
    let transport = RecordingTransport::new(h.counter.clone(), false);
    let interceptor = RequestInterceptor::new(h.registry, h.counter.clone(), transport.clone());

    for _ in 0..6 {
        let response = tokio_test::assert_ok!(interceptor.intercept(request("service-a")).await);
        assert!(response.is_success());
        assert_eq!(response.body, Bytes::from_static(b"hello"));
    }

    let targets: Vec<String> = transport
        .observed
        .lock()
        .iter()
        .map(|(key, _)| key.clone())
        .collect();
    assert_eq!(
        targets,
        vec!["a:8080", "b:8080", "c:8080", "a:8080", "b:8080", "c:8080"]
    );
}

#[tokio::test]
async fn least_connections_increments_around_dispatch_and_settles_to_zero() {
    let h = harness(&[("service-c", PolicyKind::LeastConnections)]);
    let a = ServiceInstance::new("a", 8080);
    h.directory.register_instance("service-c", a.clone());
    let transport = RecordingTransport::new(h.counter.clone(), false);
    let interceptor =
        RequestInterceptor::new(h.registry, h.counter.clone(), transport.clone());

    tokio_test::assert_ok!(interceptor.intercept(request("service-c")).await);

    // The transport saw the count while the request was in flight.
    assert_eq!(transport.observed.lock()[0], ("a:8080".to_string(), 1));
    // And the guard released it afterwards.
    assert_eq!(h.counter.count(&a), 0);
}

#[tokio::test]
async fn counter_is_symmetric_under_transport_failure() {
    let h = harness(&[("service-c", PolicyKind::LeastConnections)]);
    let a = ServiceInstance::new("a", 8080);
    h.directory.register_instance("service-c", a.clone());
    let transport = RecordingTransport::new(h.counter.clone(), true);
    let interceptor =
        RequestInterceptor::new(h.registry, h.counter.clone(), transport.clone());

    for _ in 0..5 {
        let err = interceptor.intercept(request("service-c")).await.unwrap_err();
        assert!(matches!(err, BalancerError::Transport { .. }));
        assert!(err.is_retryable());
    }

    assert_eq!(h.counter.count(&a), 0);
    assert_eq!(transport.dispatches.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn transport_failure_propagates_verbatim() {
    let h = harness(&[("service-a", PolicyKind::Random)]);
    h.directory
        .register_instance("service-a", ServiceInstance::new("a", 8080));
    let transport = RecordingTransport::new(h.counter.clone(), true);
    let interceptor = RequestInterceptor::new(h.registry, h.counter, transport);

    let err = interceptor.intercept(request("service-a")).await.unwrap_err();
    assert_eq!(
        err,
        BalancerError::transport("service-a", "connection refused")
    );
}

#[tokio::test]
async fn non_tracking_policies_never_touch_the_counter() {
    let h = harness(&[
        ("service-a", PolicyKind::RoundRobin),
        ("service-b", PolicyKind::Random),
    ]);
    for service in ["service-a", "service-b"] {
        h.directory
            .register_instance(service, ServiceInstance::new("a", 8080));
    }
    let transport = RecordingTransport::new(h.counter.clone(), false);
    let interceptor =
        RequestInterceptor::new(h.registry, h.counter.clone(), transport);

    interceptor.intercept(request("service-a")).await.unwrap();
    interceptor.intercept(request("service-b")).await.unwrap();

    assert!(
        h.counter.snapshot().is_empty(),
        "round-robin and random must bypass connection accounting"
    );
}

#[tokio::test]
async fn empty_instance_list_aborts_before_dispatch() {
    let h = harness(&[
        ("service-a", PolicyKind::RoundRobin),
        ("service-b", PolicyKind::Random),
        ("service-c", PolicyKind::LeastConnections),
    ]);
    let transport = RecordingTransport::new(h.counter.clone(), false);
    let interceptor = RequestInterceptor::new(h.registry, h.counter, transport.clone());

    for service in ["service-a", "service-b", "service-c"] {
        let err = interceptor.intercept(request(service)).await.unwrap_err();
        assert_eq!(err, BalancerError::no_instance(service));
    }
    assert_eq!(
        transport.dispatches.load(Ordering::SeqCst),
        0,
        "no dispatch may happen without a selected instance"
    );
}

#[tokio::test]
async fn unbound_service_surfaces_configuration_error() {
    let h = harness(&[("service-a", PolicyKind::RoundRobin)]);
    let transport = RecordingTransport::new(h.counter.clone(), false);
    let interceptor = RequestInterceptor::new(h.registry, h.counter, transport);

    let err = interceptor.intercept(request("service-x")).await.unwrap_err();
    assert_eq!(err, BalancerError::unbound("service-x"));
}

/// Transport that parks every request until released, so tests can observe
/// in-flight counts from outside.
struct ParkedTransport {
    release: tokio::sync::Notify,
}

#[async_trait]
impl Transport for ParkedTransport {
    async fn dispatch(
        &self,
        _request: &OutgoingRequest,
        _instance: &ServiceInstance,
    ) -> BalancerResult<UpstreamResponse> {
        self.release.notified().await;
        Ok(UpstreamResponse::new(StatusCode::OK))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn least_connections_steers_away_from_in_flight_instances() {
    let h = harness(&[("service-c", PolicyKind::LeastConnections)]);
    let a = ServiceInstance::new("a", 8080);
    let b = ServiceInstance::new("b", 8080);
    h.directory.register_instance("service-c", a.clone());
    h.directory.register_instance("service-c", b.clone());

    let transport = Arc::new(ParkedTransport {
        release: tokio::sync::Notify::new(),
    });
    let interceptor = Arc::new(RequestInterceptor::new(
        h.registry.clone(),
        h.counter.clone(),
        transport.clone(),
    ));

    // Park one request; it lands on "a" (first-encountered minimum).
    let first = tokio::spawn({
        let interceptor = interceptor.clone();
        async move { interceptor.intercept(request("service-c")).await }
    });
    while h.counter.count(&a) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // While "a" holds an in-flight request, a direct selection picks "b".
    let policy = h.registry.resolve("service-c").unwrap();
    assert_eq!(policy.select("service-c").await.unwrap().host, "b");

    // notify_one stores a permit, so this cannot race the waiter.
    transport.release.notify_one();
    first.await.unwrap().unwrap();
    assert_eq!(h.counter.count(&a), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_leave_all_counts_at_zero() {
    let h = harness(&[("service-c", PolicyKind::LeastConnections)]);
    for host in ["a", "b", "c"] {
        h.directory
            .register_instance("service-c", ServiceInstance::new(host, 8080));
    }
    // Half the requests fail; bookkeeping must stay symmetric regardless.
    let ok_transport = RecordingTransport::new(h.counter.clone(), false);
    let failing_transport = RecordingTransport::new(h.counter.clone(), true);
    let ok = Arc::new(RequestInterceptor::new(
        h.registry.clone(),
        h.counter.clone(),
        ok_transport,
    ));
    let failing = Arc::new(RequestInterceptor::new(
        h.registry.clone(),
        h.counter.clone(),
        failing_transport,
    ));

    let mut handles = Vec::new();
    for i in 0..100 {
        let interceptor = if i % 2 == 0 { ok.clone() } else { failing.clone() };
        handles.push(tokio::spawn(async move {
            let _ = interceptor.intercept(request("service-c")).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for (instance, count) in h.counter.snapshot() {
        assert_eq!(count, 0, "instance {} still shows in-flight load", instance);
    }
}
