//! frontera de excepciones
//!
//! decide que pasa con un error que llega al marco mas externo de un greenlet:
//! - error gestionado (`ManagedError`): viaja al padre por el canal normal del switch
//! - desenrollado nativo en vuelo (panic, o excepcion extranjera que entro por una
//!   funcion `C-unwind`): no se convierte en nada, es fatal para el proceso
//!
//! el desenrollado pertenece a la pila fisica donde se lanzo; dejarlo cruzar
//! un switch correria destructores sobre marcos que ya no son validos

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::error::ManagedError;
use crate::fatal::{self, FatalReport};
use crate::greenlet::GreenletId;
use crate::registry;
use crate::value::Value;

/// desenrollado nativo que llego a una frontera
pub struct ForeignUnwind {
    message: String,
    payload: Box<dyn Any + Send + 'static>,
}

impl ForeignUnwind {
    pub fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "excepcion nativa de tipo desconocido".to_string()
        };
        Self { message, payload }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> &(dyn Any + Send) {
        &*self.payload
    }
}

impl fmt::Debug for ForeignUnwind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignUnwind")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ForeignUnwind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// clasificacion del resultado de una entry en su marco mas externo
#[derive(Debug)]
pub enum Boundary {
    Returned(Value),
    Raised(ManagedError),
    Unrecoverable(ForeignUnwind),
}

pub fn classify(result: std::thread::Result<Result<Value, ManagedError>>) -> Boundary {
    match result {
        Ok(Ok(value)) => Boundary::Returned(value),
        // GreenletExit termina el greenlet sin ser un error para el padre
        Ok(Err(err)) if err.is_exit() => Boundary::Returned(err.value),
        Ok(Err(err)) => Boundary::Raised(err),
        Err(payload) => Boundary::Unrecoverable(ForeignUnwind::from_panic(payload)),
    }
}

// marco mas externo: lo que no se pueda transportar termina el proceso
pub(crate) fn run_outermost<F>(site: GreenletId, name: &str, f: F) -> Result<Value, ManagedError>
where
    F: FnOnce() -> Result<Value, ManagedError>,
{
    // si lo atrapado es una excepcion extranjera el runtime de rust puede abortar
    // aqui mismo, que es el mismo desenlace
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    match classify(result) {
        Boundary::Returned(value) => Ok(value),
        Boundary::Raised(err) => Err(err),
        Boundary::Unrecoverable(foreign) => {
            fatal::terminate(FatalReport::foreign(site, name.to_string(), foreign))
        }
    }
}

/// ejecuta una llamada nativa bajo la misma frontera que usa cada greenlet
/// sirve para el greenlet raiz, donde no hay ningun switch de por medio
pub fn guard<F>(f: F) -> Result<Value, ManagedError>
where
    F: FnOnce() -> Result<Value, ManagedError>,
{
    let (site, name) = registry::with(|r| {
        let site = r.current();
        (site, r.name(site))
    });
    run_outermost(site, &name, f)
}
