// modulo raiz de greenletext
// rutinas nativas que se comportan como una extension del host: desenrollan
// con excepciones nativas que no son errores gestionados

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};

use mygreenlets::{current, ManagedError, MyGreenlet, SwitchError, Value};

/// texto que se imprime si g1 llega a atrapar la excepcion lanzada en g2
pub const UNEXPECTED_CATCH: &str = "excepcion nativa atrapada inesperadamente en g1";

/// excepcion nativa: viaja como payload de un desenrollado, nunca por el switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeException {
    pub depth: i64,
}

/// firma de las rutinas que se usan como entry de un greenlet
pub type NativeRoutine = fn(Value) -> Result<Value, ManagedError>;

fn raise_native(depth: i64) -> ! {
    panic::resume_unwind(Box::new(NativeException { depth }))
}

fn depth_arg(arg: &Value) -> Result<i64, ManagedError> {
    arg.as_int().ok_or_else(|| {
        ManagedError::new("TypeError", format!("se esperaba un entero, llego {arg}"))
    })
}

/// lanza una excepcion nativa y no la atrapa
pub fn test_exception_throw(arg: Value) -> Result<Value, ManagedError> {
    let depth = depth_arg(&arg).unwrap_or_default();
    raise_native(depth)
}

/// rutina con abi c que lanza una excepcion nativa sin atraparla
/// el argumento es la profundidad como palabra nativa
pub extern "C-unwind" fn test_exception_throw_native(arg: *mut c_void) -> *mut c_void {
    raise_native(arg as usize as i64)
}

/// baja `depth` marcos, cede al padre y al volver lanza y atrapa una
/// excepcion nativa en la misma pila. devuelve la profundidad
pub fn test_exception_switch(arg: Value) -> Result<Value, ManagedError> {
    let depth = depth_arg(&arg)?;
    switch_recurse(depth, depth)
}

#[inline(never)]
fn switch_recurse(depth: i64, left: i64) -> Result<Value, ManagedError> {
    if left > 0 {
        return switch_recurse(depth, left - 1);
    }

    let me = current();
    let parent = me
        .parent()
        .ok_or_else(|| ManagedError::new("RuntimeError", "greenlet sin padre"))?;
    parent.switch(())?;

    let caught = panic::catch_unwind(|| -> Result<Value, ManagedError> { raise_native(depth) });
    match caught {
        Ok(_) => Err(ManagedError::new("RuntimeError", "lanzar la excepcion nativa no funciono")),
        Err(payload) => match payload.downcast_ref::<NativeException>() {
            Some(e) if e.depth == depth => Ok(Value::from(depth)),
            Some(e) => Err(ManagedError::new(
                "AssertionError",
                format!("profundidad distinta: {} != {depth}", e.depth),
            )),
            None => Err(ManagedError::new("RuntimeError", "excepcion nativa inesperada")),
        },
    }
}

/// crea g2 con `g2_func` y cambia a el. si una excepcion nativa de g2 cruzara
/// el switch, este marco la atraparia: eso no debe pasar nunca
pub fn test_exception_switch_and_do_in_g2(g2_func: NativeRoutine) -> Result<Value, ManagedError> {
    let g2 = MyGreenlet::builder().name("g2").spawn(g2_func);

    let result = panic::catch_unwind(AssertUnwindSafe(|| g2.switch(Value::from(0))));
    match result {
        Ok(Ok(_)) => Ok(Value::None),
        Ok(Err(SwitchError::Raised(err))) => Err(err),
        Ok(Err(usage)) => Err(usage.into()),
        Err(_) => {
            // la memoria ya puede estar corrupta: se avisa antes que nada
            eprintln!("{UNEXPECTED_CATCH}");
            Err(ManagedError::new("AssertionError", UNEXPECTED_CATCH))
        }
    }
}
