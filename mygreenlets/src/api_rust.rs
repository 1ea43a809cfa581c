//! api rust amigable con firmas estilo my_thread_*
//! wrappers delgados sobre MyGreenlet y el registro del hilo

use crate::config::RuntimeConfig;
use crate::error::{ManagedError, SwitchError};
use crate::greenlet::{GreenletState, MyGreenlet};
use crate::registry;
use crate::trace::{self, TraceFn};
use crate::value::Value;

pub fn my_greenlet_create<F>(name: &str, entry: F) -> MyGreenlet
where
    F: FnOnce(Value) -> Result<Value, ManagedError> + 'static,
{
    MyGreenlet::builder().name(name).spawn(entry)
}

pub fn my_greenlet_switch(
    target: &MyGreenlet,
    value: impl Into<Value>,
) -> Result<Value, SwitchError> {
    target.switch(value)
}

pub fn my_greenlet_throw(target: &MyGreenlet, err: ManagedError) -> Result<Value, SwitchError> {
    target.throw(err)
}

pub fn my_greenlet_current() -> MyGreenlet {
    registry::current()
}

pub fn my_greenlet_status(g: &MyGreenlet) -> GreenletState {
    g.state()
}

// cambia el padre, rechaza ciclos
pub fn my_greenlet_setparent(g: &MyGreenlet, parent: &MyGreenlet) -> Result<(), SwitchError> {
    g.set_parent(parent)
}

pub fn my_greenlet_settrace(hook: Option<TraceFn>) -> Option<TraceFn> {
    trace::set_trace(hook)
}

pub fn my_greenlet_configure(config: RuntimeConfig) {
    registry::configure(config);
}
