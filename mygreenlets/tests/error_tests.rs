// tests de errores gestionados y de la frontera de excepciones

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mygreenlets::boundary::{classify, guard, Boundary};
use mygreenlets::error::USAGE_KIND;
use mygreenlets::{current, GreenletId, ManagedError, MyGreenlet, SwitchError, Value};

fn value_error(msg: &str) -> ManagedError {
    ManagedError::new("ValueError", msg)
}

#[test]
fn test_managed_error_depth_one() {
    println!("\n=== TEST: error gestionado a un nivel ===\n");

    let g = MyGreenlet::new(|_| Err(value_error("boom")));

    let err = g.switch(()).unwrap_err();
    let SwitchError::Raised(err) = err else {
        panic!("se esperaba un error gestionado, llego {err:?}");
    };
    assert_eq!(err.kind, "ValueError");
    assert_eq!(err.value, Value::from("boom"));
    assert_eq!(err.hops, vec![g.id()]);
    assert!(g.is_dead());

    println!("  Test pasado: {err}");
}

#[test]
fn test_managed_error_depth_two() {
    println!("\n=== TEST: error gestionado a dos niveles ===\n");

    let inner_id: Rc<Cell<Option<GreenletId>>> = Rc::default();
    let slot = inner_id.clone();

    let g1 = MyGreenlet::new(move |_| {
        let g2 = MyGreenlet::new(|_| Err(value_error("desde g2")));
        slot.set(Some(g2.id()));
        // sin atrapar: el error sigue hacia el padre de g1
        g2.switch(())?;
        Ok(Value::from("inalcanzable"))
    });

    let err = g1.switch(()).unwrap_err();
    let err = err.as_managed().expect("error gestionado").clone();
    assert_eq!(err.kind, "ValueError");
    assert_eq!(err.value, Value::from("desde g2"));

    let g2_id = inner_id.get().expect("g2 se creo");
    assert_eq!(err.hops, vec![g2_id, g1.id()], "el error cruza un switch por salto");
    assert!(g1.is_dead());

    println!("  Test pasado: {err} via {:?}", err.hops);
}

#[test]
fn test_managed_error_caught_midway() {
    let g1 = MyGreenlet::new(|_| {
        let g2 = MyGreenlet::new(|_| Err(value_error("x")));
        match g2.switch(()) {
            Err(SwitchError::Raised(err)) => Ok(Value::from(format!("atrapado {}", err.kind))),
            other => Ok(Value::from(format!("inesperado {other:?}"))),
        }
    });

    assert_eq!(g1.switch(()).unwrap(), Value::from("atrapado ValueError"));
}

#[test]
fn test_throw_into_suspended_is_raised_at_switch_point() {
    println!("\n=== TEST: throw a un greenlet suspendido ===\n");

    let root = current();
    let g = MyGreenlet::new(move |_| match root.switch("esperando") {
        Err(SwitchError::Raised(err)) => Ok(Value::from(format!("{}={}", err.kind, err.value))),
        Ok(v) => Ok(Value::from(format!("valor {v}"))),
        Err(other) => Err(other.into()),
    });

    assert_eq!(g.switch(()).unwrap(), Value::from("esperando"));
    let result = g.throw(ManagedError::new("KeyError", "k")).unwrap();
    assert_eq!(result, Value::from("KeyError=k"));

    println!("  Test pasado: el switch dentro del greenlet levanto el error");
}

#[test]
fn test_throw_uncaught_propagates_to_parent() {
    let root = current();
    let g = MyGreenlet::new(move |_| {
        root.switch(())?;
        Ok(Value::None)
    });
    g.switch(()).unwrap();

    let err = g.throw(ManagedError::new("KeyError", "k")).unwrap_err();
    let err = err.as_managed().expect("error gestionado");
    assert!(err.is_kind("KeyError"));
    assert_eq!(err.hops, vec![g.id()]);
    assert!(g.is_dead());
}

#[test]
fn test_throw_into_new_never_runs_entry() {
    let ran = Rc::new(Cell::new(false));
    let ran_inner = ran.clone();
    let g = MyGreenlet::new(move |_| {
        ran_inner.set(true);
        Ok(Value::None)
    });

    let err = g.throw(ManagedError::new("RuntimeError", "antes de arrancar")).unwrap_err();
    assert!(err.as_managed().is_some_and(|e| e.is_kind("RuntimeError")));
    assert!(!ran.get(), "la entry no deberia haber corrido");
    assert!(g.is_dead());
}

#[test]
fn test_exit_is_a_normal_return() {
    let g = MyGreenlet::new(|_| Err(ManagedError::exit(7)));
    assert_eq!(g.switch(()).unwrap(), Value::from(7));
    assert!(g.is_dead());
}

#[test]
fn test_usage_error_inside_greenlet_becomes_managed() {
    let g = MyGreenlet::new(|_| {
        // switch a si mismo y propagado con ?
        current().switch(())?;
        Ok(Value::None)
    });

    let err = g.switch(()).unwrap_err();
    assert!(err.as_usage().is_none(), "afuera llega como error gestionado");
    let err = err.as_managed().expect("error gestionado");
    assert_eq!(err.kind, USAGE_KIND);
    assert!(g.is_dead());
}

#[test]
fn test_native_panic_caught_inside_context_is_fine() {
    println!("\n=== TEST: panic atrapado dentro del mismo contexto ===\n");

    let log = Rc::new(RefCell::new(Vec::new()));
    let log_inner = log.clone();
    let root = current();

    let g = MyGreenlet::new(move |_| {
        root.switch(())?;
        // despues de un switch el desenrollado local sigue funcionando
        let caught = std::panic::catch_unwind(|| {
            std::panic::resume_unwind(Box::new(3_i32));
        });
        let depth = caught
            .err()
            .and_then(|p| p.downcast_ref::<i32>().copied())
            .unwrap_or(-1);
        log_inner.borrow_mut().push(depth);
        Ok(Value::from(depth))
    });

    g.switch(()).unwrap();
    assert_eq!(g.switch(()).unwrap(), Value::from(3));
    assert_eq!(log.borrow().as_slice(), [3]);

    println!("  Test pasado");
}

#[test]
fn test_classify_outcomes() {
    assert!(matches!(
        classify(Ok(Ok(Value::from(1)))),
        Boundary::Returned(v) if v == Value::from(1)
    ));
    assert!(matches!(
        classify(Ok(Err(ManagedError::exit("fin")))),
        Boundary::Returned(v) if v == Value::from("fin")
    ));
    assert!(matches!(
        classify(Ok(Err(value_error("e")))),
        Boundary::Raised(e) if e.kind == "ValueError"
    ));

    match classify(Err(Box::new("explota"))) {
        Boundary::Unrecoverable(foreign) => assert_eq!(foreign.message(), "explota"),
        other => panic!("se esperaba desenrollado nativo, llego {other:?}"),
    }
    // el payload se conserva intacto para quien lo quiera inspeccionar
    match classify(Err(Box::new(3_i32))) {
        Boundary::Unrecoverable(foreign) => {
            assert_eq!(foreign.payload().downcast_ref::<i32>(), Some(&3));
            assert!(foreign.message().contains("desconocido"));
        }
        other => panic!("se esperaba desenrollado nativo, llego {other:?}"),
    }
    match classify(Err(Box::new(String::from("dinamico")))) {
        Boundary::Unrecoverable(foreign) => assert_eq!(foreign.to_string(), "dinamico"),
        other => panic!("se esperaba desenrollado nativo, llego {other:?}"),
    }
}

#[test]
fn test_guard_passes_managed_results_through() {
    assert_eq!(guard(|| Ok(Value::from(5))).unwrap(), Value::from(5));
    let err = guard(|| Err(value_error("fuera"))).unwrap_err();
    assert_eq!(err.kind, "ValueError");
    assert_eq!(guard(|| Err(ManagedError::exit(1))).unwrap(), Value::from(1));
}
