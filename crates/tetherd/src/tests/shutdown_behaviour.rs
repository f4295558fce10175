//! Shutdown while a view creation is still waiting on its surface.

use std::io::Cursor;
use std::sync::Arc;
use std::thread;

use rstest::rstest;
use serde_json::Value;

use tether_config::Config;
use tether_rpc::{ErrorCode, RequestId, Response, RunOutcome};

use super::support::{RecordingHealthReporter, SharedBuffer, StalledSurface, wait_until};
use crate::server::Server;
use crate::views::ExitMode;

const STALLED_NEW: &str = "{\"id\":3,\"method\":\"new\",\"params\":[1,[0,0,5,5],null]}\n";

fn stalled_server(surface: &StalledSurface) -> Server<StalledSurface> {
    Server::new(
        &Config::default(),
        surface.clone(),
        Arc::new(RecordingHealthReporter::default()),
    )
    .expect("stdio server assembles")
}

fn response_for(responses: &[Response], id: u64) -> &Response {
    responses
        .iter()
        .find(|response| response.id == Some(RequestId::from(id)))
        .unwrap_or_else(|| panic!("request {id} never answered: {responses:?}"))
}

fn assert_shutting_down(response: &Response) {
    assert_eq!(
        response.error().expect("error response").code,
        ErrorCode::ShuttingDown
    );
}

#[rstest]
fn exit_answers_creations_still_in_flight() {
    let surface = StalledSurface::new();
    let output = SharedBuffer::default();
    let input = format!("{STALLED_NEW}{{\"id\":4,\"method\":\"exit\"}}\n");

    let outcome = stalled_server(&surface)
        .run_with_io(Cursor::new(input.into_bytes()), output.clone())
        .expect("stdio session runs");

    assert_eq!(outcome, RunOutcome::ExitRequested);
    assert_eq!(surface.held(), 1, "the surface never replied");
    let responses = output.responses();
    assert_eq!(responses.len(), 2);
    assert_eq!(response_for(&responses, 4).result(), Some(&Value::Null));
    assert_shutting_down(response_for(&responses, 3));

    surface.fire_held(&Ok(()));
    assert_eq!(output.responses().len(), 2, "late callbacks answer nothing");
}

#[rstest]
fn signal_while_waiting_after_end_of_input_answers_the_creation() {
    let surface = StalledSurface::new();
    let output = SharedBuffer::default();
    let server = stalled_server(&surface);
    let bridge = server.bridge();
    let shutdown = server.shutdown_signal();

    let writer = output.clone();
    let running = thread::spawn(move || {
        server.run_with_io(Cursor::new(STALLED_NEW.as_bytes().to_vec()), writer)
    });
    wait_until("the creation to reach the surface", || surface.held() == 1);
    wait_until("end of input to be seen", || shutdown.is_triggered());
    assert!(output.responses().is_empty(), "end of input waits for the creation");

    bridge
        .post(|host| host.request_exit(ExitMode::Immediate, "signal 15"))
        .expect("host still running");
    let outcome = running
        .join()
        .expect("server thread panicked")
        .expect("stdio session runs");

    assert_eq!(outcome, RunOutcome::ExitRequested);
    let responses = output.responses();
    assert_eq!(responses.len(), 1);
    assert_shutting_down(response_for(&responses, 3));
}
