// tests del switch: payloads, orden, estados y contextos muertos

use std::cell::RefCell;
use std::rc::Rc;

use mygreenlets::{
    current, GreenletState, ManagedError, MyGreenlet, Payload, SwitchError, UsageError, Value,
};

#[test]
fn test_round_trip_payloads() {
    println!("\n=== TEST: ida y vuelta de payloads ===\n");

    let root = current();
    let g = MyGreenlet::new(move |first| {
        let mut v = first;
        for _ in 0..3 {
            let n = v.as_int().unwrap_or_default();
            v = root.switch(n + 1)?;
        }
        Ok(Value::from(v.as_int().unwrap_or_default() * 10))
    });

    assert_eq!(g.switch(1).unwrap(), Value::from(2));
    assert_eq!(g.switch(5).unwrap(), Value::from(6));
    assert_eq!(g.switch(7).unwrap(), Value::from(8));
    assert_eq!(g.switch(9).unwrap(), Value::from(90));
    assert!(g.is_dead(), "el greenlet deberia haber terminado");

    println!("  Test pasado: cada switch devuelve el ultimo payload enviado");
}

#[test]
fn test_ping_pong_between_contexts() {
    println!("\n=== TEST: ping-pong entre dos contextos ===\n");

    let trail = Rc::new(RefCell::new(Vec::new()));
    let ping_slot: Rc<RefCell<Option<MyGreenlet>>> = Rc::default();

    // pong devuelve a ping el doble de lo que recibe, nunca termina
    let trail_pong = trail.clone();
    let slot = ping_slot.clone();
    let pong = MyGreenlet::builder().name("pong").spawn(move |first| {
        let mut v = first;
        loop {
            let n = v.as_int().unwrap_or_default();
            trail_pong.borrow_mut().push(format!("pong {n}"));
            let ping = slot.borrow().clone().expect("ping registrado");
            v = ping.switch(n * 2)?;
        }
    });

    let trail_ping = trail.clone();
    let ping = MyGreenlet::builder().name("ping").spawn(move |_| {
        let mut acc = 1;
        for _ in 0..3 {
            trail_ping.borrow_mut().push(format!("ping {acc}"));
            acc = pong.switch(acc)?.as_int().unwrap_or_default();
        }
        Ok(Value::from(acc))
    });
    *ping_slot.borrow_mut() = Some(ping.clone());

    assert_eq!(ping.switch(()).unwrap(), Value::from(8));
    assert_eq!(
        trail.borrow().as_slice(),
        ["ping 1", "pong 1", "ping 2", "pong 2", "ping 4", "pong 4"]
    );

    println!("  Test pasado: {:?}", trail.borrow());
}

#[test]
fn test_creation_order_resume() {
    println!("\n=== TEST: suspender 4 contextos y reanudarlos en orden ===\n");

    let mut greenlets = Vec::new();
    for i in 0..4 {
        let g = MyGreenlet::new(|depth| {
            let parent = current().parent().expect("greenlet sin padre");
            parent.switch(())?;
            Ok(depth)
        });
        assert_eq!(g.switch(i).unwrap(), Value::None);
        assert_eq!(g.state(), GreenletState::Suspended);
        greenlets.push(g);
    }

    for (i, g) in greenlets.iter().enumerate() {
        assert_eq!(g.switch(()).unwrap(), Value::from(i as i64));
        assert!(g.is_dead());
    }

    println!("  Test pasado: cada contexto devuelve su indice");
}

#[test]
fn test_state_lifecycle() {
    println!("\n=== TEST: NEW -> RUNNING -> SUSPENDED -> DEAD ===\n");

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_inner = seen.clone();
    let root = current();

    let g = MyGreenlet::new(move |_| {
        let me = current();
        seen_inner.borrow_mut().push(me.state());
        seen_inner.borrow_mut().push(root.state());
        root.switch(())?;
        seen_inner.borrow_mut().push(me.state());
        Ok(Value::None)
    });

    assert_eq!(g.state(), GreenletState::New);
    assert!(!g.is_started());

    g.switch(()).unwrap();
    assert_eq!(g.state(), GreenletState::Suspended);
    assert!(g.is_active());
    assert_eq!(current().state(), GreenletState::Running);

    g.switch(()).unwrap();
    assert_eq!(g.state(), GreenletState::Dead);
    assert!(!g.is_active());

    assert_eq!(
        seen.borrow().as_slice(),
        [GreenletState::Running, GreenletState::Suspended, GreenletState::Running]
    );

    println!("  Test pasado: los estados siguen la maquina de estados");
}

#[test]
fn test_switch_to_self_is_usage_error() {
    println!("\n=== TEST: switch al contexto actual ===\n");

    let root = current();
    let err = root.switch(1).unwrap_err();
    assert_eq!(err, SwitchError::Usage(UsageError::SelfSwitch(root.id())));
    assert_eq!(root.state(), GreenletState::Running);

    let g = MyGreenlet::new(|_| {
        let me = current();
        let inner = me.switch(()).unwrap_err();
        assert!(matches!(inner, SwitchError::Usage(UsageError::SelfSwitch(_))));
        Ok(Value::from("sigo vivo"))
    });
    assert_eq!(g.switch(()).unwrap(), Value::from("sigo vivo"));

    println!("  Test pasado: el llamador sigue corriendo");
}

#[test]
fn test_dead_context_protection() {
    println!("\n=== TEST: switch a un contexto muerto ===\n");

    // a nunca muere: devuelve lo que recibe + 1
    let a = MyGreenlet::new(|first| {
        let parent = current().parent().expect("a tiene padre");
        let mut v = first;
        loop {
            v = parent.switch(v.as_int().unwrap_or_default() + 1)?;
        }
    });
    assert_eq!(a.switch(1).unwrap(), Value::from(2));

    let b = MyGreenlet::new(|_| Ok(Value::from("listo")));
    assert_eq!(b.switch(()).unwrap(), Value::from("listo"));
    assert!(b.is_dead());

    let err = b.switch(()).unwrap_err();
    assert_eq!(err, SwitchError::Usage(UsageError::DeadTarget(b.id())));
    let err = b.throw(mygreenlets::ManagedError::new("KeyError", "x")).unwrap_err();
    assert_eq!(err, SwitchError::Usage(UsageError::DeadTarget(b.id())));
    assert_eq!(b.state(), GreenletState::Dead, "un greenlet muerto no cambia de estado");

    // el resto de contextos sigue intacto
    assert_eq!(a.switch(10).unwrap(), Value::from(11));
    assert_eq!(a.switch(41).unwrap(), Value::from(42));
    assert_eq!(a.state(), GreenletState::Suspended);

    println!("  Test pasado: el contexto muerto no altero a los demas");
}

#[test]
fn test_nested_return_goes_to_creator() {
    println!("\n=== TEST: el resultado va al padre, no al raiz ===\n");

    let g1 = MyGreenlet::new(|_| {
        let g2 = MyGreenlet::new(|v| Ok(Value::from(vec![Value::from("g2"), v])));
        let from_g2 = g2.switch("hola")?;
        assert!(g2.is_dead());
        Ok(Value::from(vec![Value::from("g1"), from_g2]))
    });

    let result = g1.switch(()).unwrap();
    assert_eq!(
        result,
        Value::from(vec![
            Value::from("g1"),
            Value::from(vec![Value::from("g2"), Value::from("hola")]),
        ])
    );

    println!("  Test pasado: {result}");
}

#[test]
fn test_explicit_parent_receives_result() {
    println!("\n=== TEST: padre explicito ===\n");

    let root = current();
    let g1 = MyGreenlet::new(move |v| {
        let resumed = root.switch("g1 listo")?;
        Ok(Value::from(vec![v, resumed]))
    });
    assert_eq!(g1.switch("a").unwrap(), Value::from("g1 listo"));

    let g2 = MyGreenlet::builder()
        .parent(&g1)
        .spawn(|_| Ok(Value::from("desde g2")));
    assert_eq!(g2.parent().map(|p| p.id()), Some(g1.id()));

    // g2 muere -> g1 reanuda con su valor -> g1 muere -> el raiz recibe el de g1
    let result = g2.switch(()).unwrap();
    assert_eq!(result, Value::from(vec![Value::from("a"), Value::from("desde g2")]));
    assert!(g1.is_dead());
    assert!(g2.is_dead());

    println!("  Test pasado: el resultado encadeno por los padres");
}

#[test]
fn test_dead_parent_is_skipped() {
    let g1 = MyGreenlet::new(|_| Ok(Value::from(1)));
    let g2 = MyGreenlet::builder().parent(&g1).spawn(|_| Ok(Value::from(2)));

    assert_eq!(g1.switch(()).unwrap(), Value::from(1));
    assert!(g1.is_dead());

    // g1 ya murio, el resultado de g2 sube hasta el raiz
    assert_eq!(g2.switch(()).unwrap(), Value::from(2));
}

#[test]
fn test_new_parent_is_started_with_result() {
    let g1 = MyGreenlet::new(|v| Ok(Value::from(v.as_int().unwrap_or_default() * 2)));
    let g2 = MyGreenlet::builder().parent(&g1).spawn(|_| Ok(Value::from(5)));

    // g2 muere y arranca a g1 con 5, g1 muere y entrega 10 al raiz
    assert_eq!(g2.switch(()).unwrap(), Value::from(10));
    assert!(g1.is_dead());
}

#[test]
fn test_parent_cycles_are_rejected() {
    let root = current();
    let g1 = MyGreenlet::new(|_| Ok(Value::None));
    let g2 = MyGreenlet::builder().parent(&g1).spawn(|_| Ok(Value::None));

    let err = g1.set_parent(&g2).unwrap_err();
    assert_eq!(err, SwitchError::Usage(UsageError::ParentCycle(g1.id())));

    let err = g1.set_parent(&g1).unwrap_err();
    assert_eq!(err, SwitchError::Usage(UsageError::ParentCycle(g1.id())));

    let err = root.set_parent(&g1).unwrap_err();
    assert_eq!(err, SwitchError::Usage(UsageError::RootParent(root.id())));

    // cambio valido
    g2.set_parent(&root).unwrap();
    assert_eq!(g2.parent().map(|p| p.id()), Some(root.id()));
    assert!(root.parent().is_none());
}

#[test]
fn test_switch_payload_carries_values_and_errors() {
    let root = current();
    let g = MyGreenlet::new(move |first| {
        let second = root.switch(first)?;
        Ok(Value::from(vec![Value::from("segundo"), second]))
    });

    assert_eq!(g.switch_payload(Payload::from(Value::from(4))).unwrap(), Value::from(4));

    // un payload de error se comporta como throw
    let err = g
        .switch_payload(Payload::from(ManagedError::new("KeyError", "p")))
        .unwrap_err();
    assert!(err.as_managed().is_some_and(|e| e.is_kind("KeyError")));
    assert!(g.is_dead());
}
