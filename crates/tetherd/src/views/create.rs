//! The `new` method: a view creation that spans two asynchronous surface
//! steps.
//!
//! Each step's callback fires on whatever thread the surface picks, posts the
//! next transition back to the host context and carries the request along
//! with it. A request only ever moves forward:
//!
//! ```text
//! Requested -> EnvReady -> HandleReady -> Settled
//!     \            \            \
//!      `------------`------------`-> Settled (failure)
//! ```
//!
//! The host keeps a copy of every unsettled request's completion, so a server
//! that stops while a callback is still outstanding answers it anyway.

use serde_json::{Value, json};
use tracing::{debug, error, warn};

use tether_rpc::{Bridge, Completion, Handle, MethodError, Params};

use super::{VIEWS_TARGET, ViewHost, surface_failure};
use crate::surface::{Bounds, Surface, SurfaceError, View, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreatePhase {
    Requested,
    EnvReady,
    HandleReady,
    Settled,
}

/// Where the new view goes and what it shows.
#[derive(Debug)]
struct Placement {
    parent: WindowId,
    bounds: Bounds,
    url: String,
}

impl Placement {
    fn parse(params: &Params, default_url: &str) -> Result<Self, MethodError> {
        let parent: WindowId = params.get(0)?;
        let bounds: Bounds = params.get(1)?;
        let url = params
            .optional::<String>(2)?
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| default_url.to_owned());
        Ok(Self {
            parent,
            bounds,
            url,
        })
    }
}

/// One `new` request in flight.
///
/// Dropping a request that has not settled (because the host loop stopped
/// before a callback re-entered it) answers `shutting-down`.
#[derive(Debug)]
struct CreateRequest {
    ticket: u64,
    placement: Placement,
    completion: Completion,
    phase: CreatePhase,
}

pub(super) fn start<S: Surface>(
    host: &mut ViewHost<S>,
    params: Params,
    completion: Completion,
    bridge: &Bridge<ViewHost<S>>,
) {
    let placement = match Placement::parse(&params, &host.default_url) {
        Ok(placement) => placement,
        Err(failure) => {
            settle(&completion, Err(failure));
            return;
        }
    };
    let request = CreateRequest {
        ticket: host.track_create(completion.clone()),
        placement,
        completion,
        phase: CreatePhase::Requested,
    };

    let bridge = bridge.clone();
    host.surface.prepare_environment(Box::new(move |result| {
        let reentry = bridge.clone();
        request.resume(&bridge, move |request, host| {
            request.environment_ready(host, result, &reentry);
        });
    }));
}

impl CreateRequest {
    /// Posts the next transition to the host context.
    fn resume<S: Surface>(
        self,
        bridge: &Bridge<ViewHost<S>>,
        step: impl FnOnce(Self, &mut ViewHost<S>) + Send + 'static,
    ) {
        let ticket = self.ticket;
        if bridge.post(move |host| step(self, host)).is_err() {
            // Dropping the rejected work has already answered the request.
            debug!(target: VIEWS_TARGET, ticket, "host stopped before view creation resumed");
        }
    }

    fn advance(&mut self, next: CreatePhase) {
        debug!(
            target: VIEWS_TARGET,
            ticket = self.ticket,
            id = ?self.completion.request_id(),
            from = ?self.phase,
            to = ?next,
            "view creation advanced"
        );
        self.phase = next;
    }

    fn environment_ready<S: Surface>(
        mut self,
        host: &mut ViewHost<S>,
        result: Result<S::Environment, SurfaceError>,
        bridge: &Bridge<ViewHost<S>>,
    ) {
        let environment = match result {
            Ok(environment) => environment,
            Err(failure) => return self.finish(host, Err(surface_failure(failure))),
        };
        self.advance(CreatePhase::EnvReady);

        let parent = self.placement.parent;
        let bridge = bridge.clone();
        host.surface.create_view(
            environment,
            parent,
            Box::new(move |result| {
                self.resume(&bridge, move |request, host| request.view_ready(host, result));
            }),
        );
    }

    fn view_ready<S: Surface>(mut self, host: &mut ViewHost<S>, result: Result<S::View, SurfaceError>) {
        let registered = result
            .map_err(surface_failure)
            .and_then(|view| self.register(host, view));
        match registered {
            Ok(handle) => {
                host.reporter.view_created(handle);
                self.finish(host, Ok(json!(handle)));
            }
            Err(failure) => self.finish(host, Err(failure)),
        }
    }

    /// Configures `view` and records it under a fresh handle.
    fn register<S: Surface>(
        &mut self,
        host: &mut ViewHost<S>,
        mut view: S::View,
    ) -> Result<Handle, MethodError> {
        let handle = host.views.allocate();
        debug!(target: VIEWS_TARGET, %handle, "handle allocated for view");
        if let Err(failure) = self.configure(&mut view) {
            discard(handle, &mut view);
            return Err(surface_failure(failure));
        }
        host.views.insert(handle, view).map_err(|failure| {
            error!(target: VIEWS_TARGET, %handle, error = %failure, "fresh handle already registered");
            MethodError::internal(failure.to_string())
        })?;
        self.advance(CreatePhase::HandleReady);
        Ok(handle)
    }

    fn configure(&self, view: &mut impl View) -> Result<(), SurfaceError> {
        view.set_bounds(self.placement.bounds)?;
        view.set_visible(true)?;
        view.navigate(&self.placement.url)
    }

    fn finish<S: Surface>(mut self, host: &mut ViewHost<S>, result: Result<Value, MethodError>) {
        self.advance(CreatePhase::Settled);
        host.untrack_create(self.ticket);
        settle(&self.completion, result);
    }
}

impl Drop for CreateRequest {
    fn drop(&mut self) {
        if self.phase == CreatePhase::Settled || self.completion.is_settled() {
            return;
        }
        debug!(
            target: VIEWS_TARGET,
            ticket = self.ticket,
            id = ?self.completion.request_id(),
            phase = ?self.phase,
            "view creation abandoned"
        );
        settle(&self.completion, Err(MethodError::shutting_down()));
    }
}

fn discard(handle: Handle, view: &mut impl View) {
    if let Err(failure) = view.close() {
        warn!(target: VIEWS_TARGET, %handle, error = %failure, "half-built view failed to close");
    }
}

fn settle(completion: &Completion, result: Result<Value, MethodError>) {
    if let Err(failure) = completion.settle(result) {
        debug!(target: VIEWS_TARGET, error = %failure, "view creation reply not applied");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, mpsc};
    use std::time::{Duration, Instant};

    use rstest::rstest;
    use tether_config::Config;
    use tether_rpc::{
        ErrorCode, HostLoop, HostState, Outbound, RequestId, Response, ResponseReceiver,
        ShutdownSignal,
    };

    use super::*;
    use crate::health::StructuredHealthReporter;
    use crate::surface::{HeadlessSurface, HeadlessView};
    use crate::tests::support::StalledSurface;

    type Host = ViewHost<HeadlessSurface>;

    struct Harness {
        host: HostLoop<Host>,
        bridge: Bridge<Host>,
        surface: HeadlessSurface,
        outbound: Outbound,
        receiver: ResponseReceiver,
    }

    impl Harness {
        fn new() -> Self {
            let surface = HeadlessSurface::new();
            let state = ViewHost::new(
                surface.clone(),
                &Config::default(),
                Arc::new(StructuredHealthReporter::new()),
                ShutdownSignal::new(),
            );
            let (host, bridge) = HostLoop::new(state);
            let (outbound, receiver) = Outbound::channel();
            Self {
                host,
                bridge,
                surface,
                outbound,
                receiver,
            }
        }

        fn create(&mut self, id: u64, params: Value) -> Response {
            let Value::Array(values) = params else {
                panic!("params must be an array");
            };
            let completion =
                Completion::new(Some(RequestId::from(id)), "new", self.outbound.clone());
            start(self.host.state_mut(), Params::new(values), completion, &self.bridge);
            self.settle()
        }

        fn settle(&mut self) -> Response {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if let Some(response) = self.receiver.recv_timeout(Duration::from_millis(1)) {
                    return response;
                }
                self.host.pump(Duration::from_millis(10));
            }
            panic!("view creation never settled");
        }
    }

    #[rstest]
    fn creates_a_visible_view_at_the_requested_bounds() {
        let mut harness = Harness::new();
        let response = harness.create(3, json!([77, [0, 0, 200, 100], "https://example.org"]));

        assert_eq!(response.result(), Some(&json!(1)));
        let records = harness.surface.views();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].parent, WindowId::from_raw(77));
        assert_eq!(records[0].bounds, Bounds::new(0, 0, 200, 100));
        assert!(records[0].visible);
        assert_eq!(records[0].url.as_deref(), Some("https://example.org"));
        assert_eq!(harness.host.state().pending_creates(), 0);
        assert!(harness.host.state().views().contains(Handle::from_raw(1)));
    }

    #[rstest]
    #[case::null(Value::Null)]
    #[case::empty(json!(""))]
    fn missing_url_falls_back_to_the_default(#[case] url: Value) {
        let mut harness = Harness::new();
        harness.create(1, json!([1, [0, 0, 1, 1], url]));
        assert_eq!(
            harness.surface.views()[0].url.as_deref(),
            Some("https://www.example.com")
        );
    }

    #[rstest]
    fn handles_increase_across_creations() {
        let mut harness = Harness::new();
        let first = harness.create(1, json!([1, [0, 0, 1, 1], null]));
        let second = harness.create(2, json!([1, [0, 0, 1, 1], null]));
        assert_eq!(first.result(), Some(&json!(1)));
        assert_eq!(second.result(), Some(&json!(2)));
    }

    #[rstest]
    #[case::environment(true)]
    #[case::view(false)]
    fn surface_failures_settle_as_handler_failures(#[case] environment: bool) {
        let mut harness = Harness::new();
        if environment {
            harness.surface.fail_next_environment("no runtime");
        } else {
            harness.surface.fail_next_creation("no window");
        }
        let response = harness.create(9, json!([1, [0, 0, 1, 1], null]));

        let error = response.error().expect("error response");
        assert_eq!(error.code, ErrorCode::HandlerFailed);
        assert!(harness.host.state().views().is_empty());
        assert_eq!(harness.host.state().pending_creates(), 0);
    }

    #[rstest]
    fn malformed_params_never_reach_the_surface() {
        let mut harness = Harness::new();
        let response = harness.create(4, json!(["parent", [0, 0, 1, 1]]));

        let error = response.error().expect("error response");
        assert_eq!(error.code, ErrorCode::InvalidParams);
        assert!(harness.surface.views().is_empty());
        assert!(!harness.host.state().exit_requested());
    }

    fn stalled_host() -> (HostLoop<ViewHost<StalledSurface>>, Bridge<ViewHost<StalledSurface>>, StalledSurface) {
        let surface = StalledSurface::new();
        let state = ViewHost::new(
            surface.clone(),
            &Config::default(),
            Arc::new(StructuredHealthReporter::new()),
            ShutdownSignal::new(),
        );
        let (host, bridge) = HostLoop::new(state);
        (host, bridge, surface)
    }

    #[rstest]
    fn abandoned_creations_answer_once_even_if_the_surface_replies_later() {
        let (mut host, bridge, surface) = stalled_host();
        let (outbound, receiver) = Outbound::channel();
        let completion = Completion::new(Some(RequestId::from(3)), "new", outbound);
        start(
            host.state_mut(),
            Params::new(vec![json!(1), json!([0, 0, 1, 1]), Value::Null]),
            completion,
            &bridge,
        );
        assert_eq!(host.state().pending_creates(), 1);
        assert_eq!(surface.held(), 1);

        assert_eq!(host.state_mut().abandon_creates(), 1);
        assert_eq!(host.state().pending_creates(), 0);
        let response = receiver
            .recv_timeout(Duration::from_secs(1))
            .expect("abandoned creation answers");
        assert_eq!(response.id, Some(RequestId::from(3)));
        assert_eq!(
            response.error().expect("error response").code,
            ErrorCode::ShuttingDown
        );

        drop(host);
        surface.fire_held(&Ok(()));
        assert!(receiver.drain().is_empty(), "the late callback stays silent");
    }

    #[rstest]
    fn late_callbacks_after_completion_do_not_reanswer() {
        let (mut host, bridge, surface) = stalled_host();
        let (outbound, receiver) = Outbound::channel();
        let completion = Completion::new(Some(RequestId::from(8)), "new", outbound);
        start(
            host.state_mut(),
            Params::new(vec![json!(1), json!([0, 0, 1, 1])]),
            completion,
            &bridge,
        );
        surface.fire_held(&Err(SurfaceError::Environment("no runtime".to_owned())));
        host.drain();

        let response = receiver
            .recv_timeout(Duration::from_secs(1))
            .expect("failed creation answers");
        assert_eq!(
            response.error().expect("error response").code,
            ErrorCode::HandlerFailed
        );
        assert_eq!(host.state_mut().abandon_creates(), 0);
        assert!(receiver.drain().is_empty());
    }

    fn headless_view(surface: &mut HeadlessSurface) -> HeadlessView {
        let (sender, receiver) = mpsc::channel();
        surface.prepare_environment(Box::new(move |result| {
            sender.send(result).expect("environment receiver alive");
        }));
        let environment = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("environment callback")
            .expect("environment prepared");
        let (sender, receiver) = mpsc::channel();
        surface.create_view(
            environment,
            WindowId::from_raw(1),
            Box::new(move |result| {
                sender.send(result).expect("view receiver alive");
            }),
        );
        receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("view callback")
            .expect("view created")
    }

    fn env_ready_request(outbound: Outbound) -> CreateRequest {
        CreateRequest {
            ticket: 0,
            placement: Placement {
                parent: WindowId::from_raw(1),
                bounds: Bounds::new(0, 0, 10, 10),
                url: "https://example.org".to_owned(),
            },
            completion: Completion::new(Some(RequestId::from(1)), "new", outbound),
            phase: CreatePhase::EnvReady,
        }
    }

    #[rstest]
    #[case::configured(false)]
    #[case::configuration_fails(true)]
    fn handle_is_ready_only_once_the_view_is_registered(#[case] closed_first: bool) {
        let mut harness = Harness::new();
        let mut view = headless_view(&mut harness.surface);
        if closed_first {
            view.close().expect("close view");
        }
        let mut request = env_ready_request(harness.outbound.clone());

        let registered = request.register(harness.host.state_mut(), view);

        if closed_first {
            let failure = registered.expect_err("closed views cannot be configured");
            assert_eq!(failure.code(), ErrorCode::HandlerFailed);
            assert_eq!(request.phase, CreatePhase::EnvReady);
            assert!(harness.host.state().views().is_empty());
        } else {
            let handle = registered.expect("view registered");
            assert_eq!(request.phase, CreatePhase::HandleReady);
            assert!(harness.host.state().views().contains(handle));
        }
    }

    #[rstest]
    fn stopped_host_answers_shutting_down() {
        let mut harness = Harness::new();
        let completion = Completion::new(Some(RequestId::from(5)), "new", harness.outbound.clone());
        start(
            harness.host.state_mut(),
            Params::new(vec![json!(1), json!([0, 0, 1, 1])]),
            completion,
            &harness.bridge,
        );
        drop(harness.host);

        let response = harness
            .receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("abandoned creation answers");
        let error = response.error().expect("error response");
        assert_eq!(error.code, ErrorCode::ShuttingDown);
    }
}
