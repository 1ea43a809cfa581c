//! hook de trazas: se llama en cada transferencia de control

use crate::greenlet::GreenletId;
use crate::registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Switch,
    Throw,
}

/// recibe (evento, origen, destino)
pub type TraceFn = Box<dyn FnMut(TraceEvent, GreenletId, GreenletId) + 'static>;

/// instala (o quita con None) el hook de este hilo y devuelve el anterior
pub fn set_trace(hook: Option<TraceFn>) -> Option<TraceFn> {
    registry::with(|r| {
        r.trace_epoch += 1;
        std::mem::replace(&mut r.trace, hook)
    })
}

pub fn has_trace() -> bool {
    registry::with(|r| r.trace.is_some())
}

// el hook se saca del registro mientras corre: puede hacer switch sin
// provocar trazas recursivas
pub(crate) fn emit(event: TraceEvent, origin: GreenletId, target: GreenletId) {
    let taken = registry::with(|r| r.trace.take().map(|h| (h, r.trace_epoch)));
    let Some((mut hook, epoch)) = taken else {
        return;
    };

    hook(event, origin, target);

    // si el hook se reemplazo mientras corria, gana el nuevo
    let stale = registry::with(|r| {
        if r.trace_epoch == epoch && r.trace.is_none() {
            r.trace = Some(hook);
            None
        } else {
            Some(hook)
        }
    });
    drop(stale);
}
