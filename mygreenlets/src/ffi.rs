//! capa con firmas tipo c para un interprete host
//! los greenlets se exponen como punteros opacos y los valores como void*
//! una rutina nativa levanta un error gestionado devolviendo NULL con el
//! indicador de error puesto (my_greenlet_set_error)
//!
//! las rutinas usan el abi "C-unwind": una excepcion nativa que se escape de
//! ellas llega al marco externo del greenlet y termina el proceso

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};

use crate::error::{ManagedError, SwitchError};
use crate::greenlet::{GreenletState, MyGreenlet};
use crate::registry;
use crate::value::Value;

thread_local! {
    static LAST_ERROR: RefCell<Option<ManagedError>> = const { RefCell::new(None) };
}

// tipos opacos equivalentes
#[allow(non_camel_case_types)]
pub type my_greenlet_t = *mut MyGreenlet;
#[allow(non_camel_case_types)]
pub type my_greenlet_start_t = extern "C-unwind" fn(arg: *mut c_void) -> *mut c_void;

pub const MY_GREENLET_OK: i32 = 0;
pub const MY_GREENLET_EINVAL: i32 = 1;
pub const MY_GREENLET_ERAISED: i32 = 2;

fn set_error(err: ManagedError) {
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(err));
}

fn take_error() -> Option<ManagedError> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

fn into_handle(g: MyGreenlet) -> my_greenlet_t {
    Box::into_raw(Box::new(g))
}

fn from_c(arg: *mut c_void) -> Value {
    if arg.is_null() {
        Value::None
    } else {
        Value::Raw(arg as usize)
    }
}

fn to_c(value: Value) -> Result<*mut c_void, ManagedError> {
    match value {
        Value::None => Ok(std::ptr::null_mut()),
        Value::Raw(word) => Ok(word as *mut c_void),
        other => Err(ManagedError::new(
            "TypeError",
            format!("valor no representable en c: {other}"),
        )),
    }
}

fn c_string(s: *const c_char, default: &str) -> String {
    if s.is_null() {
        return default.to_string();
    }
    // safety: el host promete un string terminado en nul
    unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
}

// traduce el resultado de un switch a codigo de retorno + out param
fn complete(result: Result<Value, SwitchError>, retval: *mut *mut c_void) -> i32 {
    let (code, outcome) = match result {
        Ok(value) => (MY_GREENLET_ERAISED, to_c(value)),
        Err(SwitchError::Usage(usage)) => (MY_GREENLET_EINVAL, Err(usage.into())),
        Err(SwitchError::Raised(err)) => (MY_GREENLET_ERAISED, Err(err)),
    };
    match outcome {
        Ok(ptr) => {
            if !retval.is_null() {
                unsafe { *retval = ptr };
            }
            MY_GREENLET_OK
        }
        Err(err) => {
            set_error(err);
            code
        }
    }
}

// crea un greenlet cuya entry es una rutina nativa
#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_create(
    out: *mut my_greenlet_t,
    start_routine: my_greenlet_start_t,
) -> i32 {
    if out.is_null() {
        return MY_GREENLET_EINVAL;
    }

    let g = MyGreenlet::builder().name("ffi").spawn(move |arg| {
        let ret = start_routine(to_c(arg)?);
        if ret.is_null() {
            if let Some(err) = take_error() {
                return Err(err);
            }
        }
        Ok(from_c(ret))
    });

    unsafe { *out = into_handle(g) };
    MY_GREENLET_OK
}

// handle nuevo al greenlet actual, el host lo libera con my_greenlet_destroy
#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_current() -> my_greenlet_t {
    into_handle(registry::current())
}

#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_parent(g: my_greenlet_t) -> my_greenlet_t {
    let Some(g) = (unsafe { g.as_ref() }) else {
        return std::ptr::null_mut();
    };
    g.parent().map_or(std::ptr::null_mut(), into_handle)
}

#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_switch(
    g: my_greenlet_t,
    arg: *mut c_void,
    retval: *mut *mut c_void,
) -> i32 {
    let Some(g) = (unsafe { g.as_ref() }) else {
        return MY_GREENLET_EINVAL;
    };
    complete(g.switch(from_c(arg)), retval)
}

#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_throw(
    g: my_greenlet_t,
    kind: *const c_char,
    message: *const c_char,
    retval: *mut *mut c_void,
) -> i32 {
    let Some(g) = (unsafe { g.as_ref() }) else {
        return MY_GREENLET_EINVAL;
    };
    let err = ManagedError::new(c_string(kind, "Exception"), c_string(message, ""));
    complete(g.throw(err), retval)
}

// 0 new, 1 running, 2 suspended, 3 dead, -1 handle invalido
#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_state(g: my_greenlet_t) -> i32 {
    let Some(g) = (unsafe { g.as_ref() }) else {
        return -1;
    };
    match g.state() {
        GreenletState::New => 0,
        GreenletState::Running => 1,
        GreenletState::Suspended => 2,
        GreenletState::Dead => 3,
    }
}

#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_destroy(g: my_greenlet_t) -> i32 {
    if g.is_null() {
        return MY_GREENLET_EINVAL;
    }
    drop(unsafe { Box::from_raw(g) });
    MY_GREENLET_OK
}

// equivalente a PyErr_SetString: la rutina nativa lo llama antes de devolver NULL
#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_set_error(kind: *const c_char, message: *const c_char) {
    set_error(ManagedError::new(c_string(kind, "Exception"), c_string(message, "")));
}

#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_error_occurred() -> i32 {
    LAST_ERROR.with(|e| e.borrow().is_some()) as i32
}

// saca el error pendiente como "kind: valor"; NULL si no hay
#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_error_fetch() -> *mut c_char {
    match take_error() {
        Some(err) => {
            let text = err.to_string().replace('\0', "");
            CString::new(text).map_or(std::ptr::null_mut(), CString::into_raw)
        }
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_error_clear() {
    drop(take_error());
}

#[unsafe(no_mangle)]
pub extern "C-unwind" fn my_greenlet_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}
