//! mygreenlets: contextos de ejecucion cooperativos sobre un solo hilo
//! cada greenlet tiene su propia pila y el control se cede explicitamente con switch
//! expone api rust y api ffi con firmas tipo c

pub mod api_rust;
pub mod boundary;
pub mod config;
mod context_wrapper;
pub mod error;
pub mod fatal;
pub mod ffi;
pub mod greenlet;
pub mod registry;
mod switch;
pub mod trace;
pub mod value;

pub use api_rust::{
    my_greenlet_configure, my_greenlet_create, my_greenlet_current, my_greenlet_setparent,
    my_greenlet_settrace, my_greenlet_status, my_greenlet_switch, my_greenlet_throw,
};
pub use boundary::{guard, Boundary, ForeignUnwind};
pub use config::RuntimeConfig;
pub use error::{ManagedError, SwitchError, UsageError};
pub use greenlet::{GreenletBuilder, GreenletEntry, GreenletId, GreenletState, MyGreenlet};
pub use registry::{allocated_stacks, current, live_greenlets};
pub use trace::{set_trace, TraceEvent, TraceFn};
pub use value::{Payload, Value};
