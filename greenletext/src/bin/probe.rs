// proceso desechable para los tests del camino fatal
// uso: probe <escenario>
//   throw        excepcion nativa sin atrapar en el greenlet raiz
//   throw-in-g2  excepcion nativa sin atrapar dentro de g2, con g1 esperando
//   ffi-throw    rutina extern "C-unwind" creada y arrancada por la api c, lanza sin atrapar
//   switch       los cuatro greenlets del test de orden, termina normal
// si el proceso sobrevive a un escenario fatal sale con 0 y el test falla

use std::ffi::c_void;
use std::ptr;

use greenletext::{
    test_exception_switch, test_exception_switch_and_do_in_g2, test_exception_throw,
    test_exception_throw_native,
};
use mygreenlets::fatal::{self, FatalReport};
use mygreenlets::ffi::{self, my_greenlet_t, MY_GREENLET_OK};
use mygreenlets::{guard, ManagedError, MyGreenlet, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn report_to_stderr(report: &FatalReport) {
    eprintln!("probe: hook fatal en {} ({})", report.greenlet, report.name);
}

fn run_switch_order() -> Result<Value, ManagedError> {
    let mut greenlets = Vec::new();
    for i in 0..4 {
        let g = MyGreenlet::new(test_exception_switch);
        g.switch(i)?;
        greenlets.push(g);
    }
    let mut results = Vec::new();
    for g in &greenlets {
        results.push(g.switch(())?);
    }
    Ok(Value::from(results))
}

// create + switch solo por la api c, sobre una rutina nativa
fn run_ffi_throw() -> Result<Value, ManagedError> {
    let mut g: my_greenlet_t = ptr::null_mut();
    let rc = ffi::my_greenlet_create(&mut g, test_exception_throw_native);
    if rc != MY_GREENLET_OK {
        return Err(ManagedError::new("RuntimeError", format!("create devolvio {rc}")));
    }

    let mut out: *mut c_void = ptr::null_mut();
    let rc = ffi::my_greenlet_switch(g, 7 as *mut c_void, &mut out);
    ffi::my_greenlet_destroy(g);
    if rc != MY_GREENLET_OK {
        return Err(ManagedError::new("RuntimeError", format!("switch devolvio {rc}")));
    }
    Ok(Value::Raw(out as usize))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    fatal::set_fatal_hook(Some(report_to_stderr));

    let scenario = std::env::args().nth(1).unwrap_or_default();
    info!(%scenario, "probe arrancando");

    let outcome = match scenario.as_str() {
        "throw" => guard(|| test_exception_throw(Value::from(0))),
        "throw-in-g2" => {
            let g1 = MyGreenlet::builder()
                .name("g1")
                .spawn(|_| test_exception_switch_and_do_in_g2(test_exception_throw));
            g1.switch(()).map_err(ManagedError::from)
        }
        "ffi-throw" => run_ffi_throw(),
        "switch" => run_switch_order(),
        other => {
            eprintln!("escenario desconocido: {other:?}");
            std::process::exit(64);
        }
    };

    match outcome {
        Ok(value) => println!("probe termino: {value}"),
        Err(err) => {
            println!("probe termino con error gestionado: {err}");
            std::process::exit(1);
        }
    }
}
