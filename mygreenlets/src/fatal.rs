// camino fatal: un desenrollado nativo llego a una frontera de greenlet
// no se reintenta, no se atrapa y no se convierte en error gestionado
//
// convencion de salida:
// - posix: abort() -> el proceso muere por SIGABRT
// - windows: el abort de rust termina con STATUS_STACK_BUFFER_OVERRUN (0xC0000409)

use core::sync::atomic::{AtomicPtr, Ordering};
use std::fmt;
use std::io::Write;

use tracing::error;

use crate::boundary::ForeignUnwind;
use crate::greenlet::GreenletId;

/// codigo de salida de un proceso abortado en windows
pub const WINDOWS_ABORT_STATUS: u32 = 0xC000_0409;

/// hook del host para diagnosticos antes de abortar
pub type FatalHook = fn(&FatalReport);

// puntero a funcion sin Mutex; nulo = sin hook
static FATAL_HOOK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

pub fn set_fatal_hook(hook: Option<FatalHook>) {
    let p = hook.map_or(core::ptr::null_mut(), |f| f as *mut ());
    FATAL_HOOK.store(p, Ordering::Release);
}

fn fatal_hook() -> Option<FatalHook> {
    let p = FATAL_HOOK.load(Ordering::Acquire);
    if p.is_null() {
        return None;
    }
    // safety: solo se guardan punteros que vienen de un FatalHook
    Some(unsafe { core::mem::transmute::<*mut (), FatalHook>(p) })
}

#[derive(Debug)]
pub enum FatalReason {
    ForeignUnwind(ForeignUnwind),
    /// invariante del runtime rota (p. ej. un greenlet muerto que vuelve a correr)
    Invariant(String),
}

#[derive(Debug)]
pub struct FatalReport {
    pub greenlet: GreenletId,
    pub name: String,
    pub reason: FatalReason,
}

impl FatalReport {
    pub fn foreign(greenlet: GreenletId, name: String, unwind: ForeignUnwind) -> Self {
        Self {
            greenlet,
            name,
            reason: FatalReason::ForeignUnwind(unwind),
        }
    }

    pub fn invariant(greenlet: GreenletId, what: impl Into<String>) -> Self {
        Self {
            greenlet,
            name: String::new(),
            reason: FatalReason::Invariant(what.into()),
        }
    }
}

impl fmt::Display for FatalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            FatalReason::ForeignUnwind(unwind) => write!(
                f,
                "excepcion nativa no atrapada llego al marco externo del greenlet {} ({}): {}",
                self.greenlet, self.name, unwind
            ),
            FatalReason::Invariant(what) => {
                write!(f, "invariante rota en el greenlet {}: {}", self.greenlet, what)
            }
        }
    }
}

/// vacia diagnosticos y aborta el proceso sin seguir desenrollando
pub fn terminate(report: FatalReport) -> ! {
    error!(greenlet = %report.greenlet, name = %report.name, "{report}");

    if let Some(hook) = fatal_hook() {
        // un hook que hace panic no puede evitar el abort
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(&report)));
    }

    let _ = std::io::stdout().flush();
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "Fatal error: {report}");
    let _ = writeln!(stderr, "Aborted: los errores nativos no pueden cruzar un switch de greenlet");
    let _ = stderr.flush();
    drop(stderr);

    // el payload del desenrollado no se destruye
    std::mem::forget(report);
    std::process::abort()
}
