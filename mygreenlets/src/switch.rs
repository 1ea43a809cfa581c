//! primitiva de switch
//!
//! cada transferencia pasa por tres pasos:
//! 1. prepare: valida y actualiza el registro (estados, current, inbox del destino)
//! 2. resume: salto fisico de pila, el contexto que sale queda congelado ahi
//! 3. settle: quien recibe el control guarda el snapshot del que salio y lee su inbox
//!
//! el prestamo del registro nunca cruza el paso 2

use context::Transfer;
use tracing::{debug, trace, warn};

use crate::boundary;
use crate::context_wrapper::{GreenletStack, MachineContext, Resumed};
use crate::error::{SwitchError, UsageError};
use crate::fatal::{self, FatalReport};
use crate::greenlet::{GreenletId, GreenletState};
use crate::registry::{self, Registry};
use crate::trace::{self, TraceEvent};
use crate::value::{Payload, Value};

// que pasa con el contexto que cede el control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leaving {
    Suspend,
    Die,
}

struct SwitchPlan {
    target: GreenletId,
    machine: MachineContext,
    // payload que el destino todavia no habia leido
    displaced: Option<Payload>,
}

// switch rechazado: el payload vuelve al llamador para soltarlo fuera del prestamo
struct Rejected {
    error: UsageError,
    payload: Payload,
}

// mismas reglas que prepare pero sin tocar nada
fn validate(r: &Registry, target: GreenletId) -> Result<(), UsageError> {
    let origin = r.current();
    if target == origin {
        return Err(UsageError::SelfSwitch(origin));
    }
    match r.get(target).map(|rec| rec.state) {
        None => Err(UsageError::Unknown(target)),
        Some(GreenletState::Dead) => Err(UsageError::DeadTarget(target)),
        Some(GreenletState::Running) => Err(UsageError::SelfSwitch(target)),
        Some(GreenletState::New | GreenletState::Suspended) => Ok(()),
    }
}

fn prepare(
    r: &mut Registry,
    target: GreenletId,
    payload: Payload,
    leaving: Leaving,
) -> Result<SwitchPlan, Rejected> {
    if let Err(error) = validate(r, target) {
        return Err(Rejected { error, payload });
    }
    let origin = r.current();

    let Some(rec) = r.get_mut(target) else {
        return Err(Rejected {
            error: UsageError::Unknown(target),
            payload,
        });
    };

    let machine = match rec.state {
        GreenletState::New => {
            // primer switch: pila nueva con el trampoline como primera instruccion
            let stack = match GreenletStack::new(rec.stack_size, rec.guard_pages) {
                Ok(stack) => stack,
                Err(reason) => {
                    return Err(Rejected {
                        error: UsageError::StackAlloc { id: target, reason },
                        payload,
                    });
                }
            };
            let machine = MachineContext::bootstrap(&stack, trampoline);
            rec.stack = Some(stack);
            machine
        }
        _ => match rec.machine.take() {
            Some(machine) => machine,
            None => {
                return Err(Rejected {
                    error: UsageError::NotResumable(target),
                    payload,
                });
            }
        },
    };

    // desde aqui el switch ya no puede fallar
    rec.state = GreenletState::Running;
    let displaced = rec.inbox.replace(payload);

    if let Some(origin_rec) = r.get_mut(origin) {
        origin_rec.state = match leaving {
            Leaving::Suspend => GreenletState::Suspended,
            Leaving::Die => GreenletState::Dead,
        };
    }
    r.set_current(target);

    Ok(SwitchPlan {
        target,
        machine,
        displaced,
    })
}

/// lado receptor de cualquier transferencia
fn settle(resumed: Resumed) -> (GreenletId, Option<Payload>) {
    let (me, inbox, parked) = registry::with(|r| {
        let from = GreenletId::from_raw(resumed.data);
        let parked = r.park(from, resumed.from);
        let me = r.current();
        (me, r.take_inbox(me), parked)
    });
    // la pila del que murio ya no la usa nadie: corremos sobre la nuestra
    drop(parked);
    (me, inbox)
}

fn deliver(inbox: Option<Payload>) -> Result<Value, SwitchError> {
    match inbox {
        Some(Payload::Value(value)) => Ok(value),
        Some(Payload::Error(err)) => Err(SwitchError::Raised(err)),
        None => Ok(Value::None),
    }
}

pub(crate) fn switch_to(
    target: GreenletId,
    payload: Payload,
    event: TraceEvent,
) -> Result<Value, SwitchError> {
    let origin = registry::with(|r| validate(r, target).map(|_| r.current()))?;

    // el hook corre con el origen todavia como current
    trace::emit(event, origin, target);

    let plan = registry::with(|r| prepare(r, target, payload, Leaving::Suspend));
    let plan = match plan {
        Ok(plan) => plan,
        Err(rejected) => {
            drop(rejected.payload);
            return Err(rejected.error.into());
        }
    };
    drop(plan.displaced);

    trace!(origin = %origin, target = %plan.target, ?event, "switch");

    // safety: somos el greenlet que esta corriendo y el registro ya apunta al destino
    let resumed = unsafe { plan.machine.resume(origin.as_raw()) };

    // alguien nos reanudo
    let (_, inbox) = settle(resumed);
    deliver(inbox)
}

// primera instruccion de todo greenlet
extern "C" fn trampoline(transfer: Transfer) -> ! {
    let (me, outcome) = run_entry(Resumed::from_transfer(transfer));
    die(me, outcome)
}

fn run_entry(resumed: Resumed) -> (GreenletId, Payload) {
    let (me, inbox) = settle(resumed);
    let (entry, name) = registry::with(|r| (r.take_entry(me), r.name(me)));

    let outcome = match (entry, inbox) {
        // throw a un greenlet que nunca arranco: muere sin ejecutar la entry
        (entry, Some(Payload::Error(err))) => {
            debug!(greenlet = %me, kind = %err.kind, "throw antes de arrancar");
            drop(entry);
            Payload::Error(err)
        }
        (Some(entry), inbox) => {
            debug!(greenlet = %me, name = %name, "arrancando entry");
            let arg = match inbox {
                Some(Payload::Value(value)) => value,
                _ => Value::None,
            };
            match boundary::run_outermost(me, &name, move || entry(arg)) {
                Ok(value) => Payload::Value(value),
                Err(err) => Payload::Error(err),
            }
        }
        (None, _) => Payload::Value(Value::None),
    };

    (me, outcome)
}

// el greenlet termino: se marca DEAD y el resultado va al padre como si
// el padre hubiera recibido un switch con ese payload
fn die(me: GreenletId, outcome: Payload) -> ! {
    let outcome = match outcome {
        Payload::Error(mut err) => {
            err.hops.push(me);
            Payload::Error(err)
        }
        other => other,
    };

    let (parent, root) = registry::with(|r| (r.resolve_parent(me), r.root()));
    trace::emit(TraceEvent::Switch, me, parent);

    let plan = match registry::with(|r| prepare(r, parent, outcome, Leaving::Die)) {
        Ok(plan) => Ok(plan),
        // p. ej. el padre era NEW y no hubo memoria para su pila
        Err(rejected) if parent != root => {
            warn!(
                greenlet = %me,
                parent = %parent,
                error = %rejected.error,
                "padre inalcanzable, el resultado va al raiz"
            );
            trace::emit(TraceEvent::Switch, me, root);
            registry::with(|r| prepare(r, root, rejected.payload, Leaving::Die))
        }
        Err(rejected) => Err(rejected),
    };

    match plan {
        Ok(plan) => {
            debug!(greenlet = %me, parent = %plan.target, "greenlet muerto");
            drop(plan.displaced);
            // safety: seguimos siendo el contexto fisico que corre; el registro ya
            // nos marco DEAD y quien reciba el control descarta nuestro snapshot
            unsafe {
                plan.machine.resume(me.as_raw());
            }
            fatal::terminate(FatalReport::invariant(me, "un greenlet muerto volvio a correr"))
        }
        Err(rejected) => fatal::terminate(FatalReport::invariant(
            me,
            format!("no hay a quien entregar el resultado: {}", rejected.error),
        )),
    }
}
