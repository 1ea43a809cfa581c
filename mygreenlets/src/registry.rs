//! registro de greenlets por hilo
//! guarda todos los registros vivos del hilo y cual esta corriendo
//! vive en thread-local, nunca se accede al registro de otro hilo

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread::ThreadId;

use tracing::{debug, warn};

use crate::config::{self, RuntimeConfig};
use crate::context_wrapper::{GreenletStack, MachineContext};
use crate::error::UsageError;
use crate::greenlet::{GreenletEntry, GreenletId, GreenletRecord, GreenletState, MyGreenlet};
use crate::trace::TraceFn;
use crate::value::Payload;

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::new());
    // handles soltados mientras el registro estaba prestado, se procesan despues
    static DEFERRED: RefCell<Vec<GreenletId>> = const { RefCell::new(Vec::new()) };
}

// helper para acceder mut al registro del hilo
// nunca se llama a codigo del host ni se cambia de pila con el prestamo activo
pub(crate) fn with<R>(f: impl FnOnce(&mut Registry) -> R) -> R {
    let out = REGISTRY.with(|rc| {
        let mut registry = rc.borrow_mut();
        f(&mut registry)
    });
    drain_deferred();
    out
}

/// suelta un handle; si el registro queda libre se destruye fuera del prestamo
pub(crate) fn release(id: GreenletId) {
    let released = REGISTRY.try_with(|rc| match rc.try_borrow_mut() {
        Ok(mut registry) => Some(registry.release(id)),
        Err(_) => None,
    });

    match released {
        Ok(Some(retired)) => drop(retired),
        Ok(None) => {
            let _ = DEFERRED.try_with(|d| d.borrow_mut().push(id));
        }
        // el hilo esta terminando y el registro ya no existe
        Err(_) => {}
    }
}

fn drain_deferred() {
    let pending = DEFERRED
        .try_with(|d| std::mem::take(&mut *d.borrow_mut()))
        .unwrap_or_default();
    for id in pending {
        release(id);
    }
}

/// greenlet que esta corriendo en el hilo que llama
pub fn current() -> MyGreenlet {
    let id = with(|r| {
        let id = r.current();
        r.acquire(id);
        id
    });
    MyGreenlet::from_acquired(id)
}

/// cantidad de registros vivos en este hilo, incluido el raiz
pub fn live_greenlets() -> usize {
    with(|r| r.records.len())
}

/// cantidad de pilas reservadas en este hilo (greenlets arrancados que no murieron)
pub fn allocated_stacks() -> usize {
    with(|r| r.records.values().filter(|rec| rec.stack.is_some()).count())
}

/// reemplaza la configuracion del hilo, aplica a los greenlets creados despues
pub fn configure(config: RuntimeConfig) {
    with(|r| r.config = config);
}

pub fn config() -> RuntimeConfig {
    with(|r| r.config.clone())
}

pub(crate) fn state_of(id: GreenletId) -> GreenletState {
    // un id que no esta en el registro ya fue retirado, y solo se retiran NEW o DEAD
    with(|r| r.get(id).map(|rec| rec.state)).unwrap_or(GreenletState::Dead)
}

// para Debug: no puede fallar aunque el registro este prestado
pub(crate) fn peek_state(id: GreenletId) -> Option<GreenletState> {
    REGISTRY
        .try_with(|rc| rc.try_borrow().ok().and_then(|r| r.get(id).map(|rec| rec.state)))
        .ok()
        .flatten()
}

/// lo que `park` libera: se suelta fuera del prestamo
#[derive(Default)]
pub(crate) struct Parked {
    pub stack: Option<GreenletStack>,
    pub retired: Option<GreenletRecord>,
}

pub(crate) struct Registry {
    records: HashMap<GreenletId, GreenletRecord>,
    root: GreenletId,
    current: GreenletId,
    thread: ThreadId,
    config: RuntimeConfig,
    pub(crate) trace: Option<TraceFn>,
    pub(crate) trace_epoch: u64,
}

impl Registry {
    fn new() -> Self {
        let root = GreenletId::next();
        let thread = std::thread::current().id();
        let mut records = HashMap::new();
        records.insert(root, GreenletRecord::root(root));

        debug!(root = %root, ?thread, "registro de greenlets creado");

        Self {
            records,
            root,
            current: root,
            thread,
            config: config::process_defaults(),
            trace: None,
            trace_epoch: 0,
        }
    }

    pub(crate) fn current(&self) -> GreenletId {
        self.current
    }

    pub(crate) fn set_current(&mut self, id: GreenletId) {
        self.current = id;
    }

    pub(crate) fn root(&self) -> GreenletId {
        self.root
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn get(&self, id: GreenletId) -> Option<&GreenletRecord> {
        self.records.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: GreenletId) -> Option<&mut GreenletRecord> {
        self.records.get_mut(&id)
    }

    pub(crate) fn register(&mut self, record: GreenletRecord) {
        debug_assert_eq!(record.thread, self.thread);
        self.records.insert(record.id, record);
    }

    /// saca el registro si ya no se puede volver a usar: NEW o DEAD y sin handles
    /// el llamador lo suelta fuera del prestamo
    pub(crate) fn retire(&mut self, id: GreenletId) -> Option<GreenletRecord> {
        if id == self.root {
            return None;
        }
        let rec = self.records.get(&id)?;
        let finished = matches!(rec.state, GreenletState::New | GreenletState::Dead);
        if rec.handles > 0 || !finished {
            return None;
        }
        debug!(greenlet = %id, state = %rec.state, "greenlet retirado");
        self.records.remove(&id)
    }

    pub(crate) fn acquire(&mut self, id: GreenletId) -> bool {
        match self.records.get_mut(&id) {
            Some(rec) => {
                rec.handles += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn release(&mut self, id: GreenletId) -> Option<GreenletRecord> {
        let rec = self.records.get_mut(&id)?;
        rec.handles = rec.handles.saturating_sub(1);
        if rec.handles == 0 && rec.state == GreenletState::Suspended {
            // no hay cancelacion: la pila queda viva hasta que termine el hilo
            warn!(
                greenlet = %id,
                name = %rec.name,
                "greenlet suspendido sin handles, queda huerfano"
            );
        }
        self.retire(id)
    }

    pub(crate) fn set_parent(
        &mut self,
        id: GreenletId,
        parent: GreenletId,
    ) -> Result<(), UsageError> {
        if id == self.root {
            return Err(UsageError::RootParent(id));
        }
        if !self.records.contains_key(&id) {
            return Err(UsageError::Unknown(id));
        }
        if !self.records.contains_key(&parent) {
            return Err(UsageError::Unknown(parent));
        }

        // recorrer la cadena del nuevo padre buscando a `id`
        let mut link = Some(parent);
        while let Some(p) = link {
            if p == id {
                return Err(UsageError::ParentCycle(id));
            }
            link = self.records.get(&p).and_then(|rec| rec.parent);
        }

        if let Some(rec) = self.records.get_mut(&id) {
            rec.parent = Some(parent);
        }
        Ok(())
    }

    /// a quien se le entrega el resultado cuando `id` muere:
    /// el primer ancestro que no este muerto, o el raiz si la cadena se corta
    pub(crate) fn resolve_parent(&self, id: GreenletId) -> GreenletId {
        let mut link = self.records.get(&id).and_then(|rec| rec.parent);
        let mut steps = 0;
        while let Some(p) = link {
            steps += 1;
            if steps > self.records.len() {
                break;
            }
            match self.records.get(&p) {
                Some(rec) if rec.state != GreenletState::Dead => return p,
                Some(rec) => link = rec.parent,
                None => break,
            }
        }
        self.root
    }

    /// guarda el snapshot del contexto que nos acaba de ceder el control
    /// si ese contexto murio, su snapshot y su pila se descartan aunque queden
    /// handles, y el registro se retira si ya no tiene ninguno
    pub(crate) fn park(&mut self, from: GreenletId, machine: MachineContext) -> Parked {
        let Some(rec) = self.records.get_mut(&from) else {
            return Parked::default();
        };
        match rec.state {
            GreenletState::Suspended => {
                rec.machine = Some(machine);
                Parked::default()
            }
            GreenletState::Dead => {
                rec.machine = None;
                drop(machine);
                let stack = rec.stack.take();
                Parked {
                    stack,
                    retired: self.retire(from),
                }
            }
            _ => Parked::default(),
        }
    }

    pub(crate) fn take_inbox(&mut self, id: GreenletId) -> Option<Payload> {
        self.records.get_mut(&id)?.inbox.take()
    }

    pub(crate) fn take_entry(&mut self, id: GreenletId) -> Option<GreenletEntry> {
        self.records.get_mut(&id)?.entry.take()
    }

    pub(crate) fn name(&self, id: GreenletId) -> String {
        self.records
            .get(&id)
            .map(|rec| rec.name.clone())
            .unwrap_or_default()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let suspended = self
            .records
            .values()
            .filter(|rec| rec.state == GreenletState::Suspended && rec.id != self.root)
            .count();
        if suspended > 0 {
            // sus pilas se liberan sin desenrollarlas
            warn!(suspended, "hilo terminando con greenlets suspendidos");
        }
    }
}
