//! Host-side handlers for the synchronous view methods.

use serde_json::{Value, json};
use tracing::{info, warn};

use tether_rpc::{MethodError, Params};

use super::{ExitMode, VIEWS_TARGET, ViewHost, surface_failure};
use crate::surface::{Bounds, Surface, View, WindowId};

pub(super) fn exit<S: Surface>(host: &mut ViewHost<S>, _params: Params) -> Result<Value, MethodError> {
    host.request_exit(ExitMode::Immediate, "exit requested by controller");
    Ok(Value::Null)
}

pub(super) fn close<S: Surface>(host: &mut ViewHost<S>, params: Params) -> Result<Value, MethodError> {
    let handle = params.handle(0)?;
    let Some(mut view) = host.views.remove(handle) else {
        return host.missing(handle, json!(false));
    };
    if let Err(error) = view.close() {
        warn!(target: VIEWS_TARGET, %handle, %error, "view failed to close cleanly");
    }
    host.reporter.view_closed(handle);
    Ok(json!(true))
}

pub(super) fn resize<S: Surface>(host: &mut ViewHost<S>, params: Params) -> Result<Value, MethodError> {
    let handle = params.handle(0)?;
    let bounds: Bounds = params.get(1)?;
    host.with_view(handle, json!(false), |view| {
        view.set_bounds(bounds).map(|()| json!(true))
    })
}

pub(super) fn set_visible<S: Surface>(
    host: &mut ViewHost<S>,
    params: Params,
) -> Result<Value, MethodError> {
    let handle = params.handle(0)?;
    let visible: bool = params.get(1)?;
    host.with_view(handle, json!(false), |view| {
        view.set_visible(visible).map(|()| json!(true))
    })
}

pub(super) fn reparent<S: Surface>(
    host: &mut ViewHost<S>,
    params: Params,
) -> Result<Value, MethodError> {
    let handle = params.handle(0)?;
    let parent: WindowId = params.get(1)?;
    host.with_view(handle, json!(false), |view| {
        view.set_parent(parent).map(|()| json!(true))
    })
}

pub(super) fn get_title<S: Surface>(
    host: &mut ViewHost<S>,
    params: Params,
) -> Result<Value, MethodError> {
    let handle = params.handle(0)?;
    host.with_view(handle, Value::Null, |view| view.title().map(Value::String))
}

pub(super) fn navigate<S: Surface>(
    host: &mut ViewHost<S>,
    params: Params,
) -> Result<Value, MethodError> {
    let handle = params.handle(0)?;
    let url: String = params.get(1)?;
    if url.is_empty() {
        return Err(MethodError::invalid_params("parameter 1: url must not be empty"));
    }
    host.with_view(handle, json!(false), |view| {
        view.navigate(&url).map(|()| json!(true))
    })
}

pub(super) fn set_focus<S: Surface>(
    host: &mut ViewHost<S>,
    params: Params,
) -> Result<Value, MethodError> {
    let window: WindowId = params.get(0)?;
    host.surface.focus(window).map_err(surface_failure)?;
    info!(target: VIEWS_TARGET, %window, "focus moved");
    Ok(Value::Null)
}

pub(super) fn list<S: Surface>(host: &mut ViewHost<S>, _params: Params) -> Result<Value, MethodError> {
    Ok(json!(host.views.handles()))
}
