//! tipos basicos del greenlet: id, estado, registro interno y handle del host

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;

use tracing::debug;

use crate::context_wrapper::{GreenletStack, MachineContext};
use crate::error::{ManagedError, SwitchError};
use crate::registry;
use crate::switch;
use crate::trace::TraceEvent;
use crate::value::{Payload, Value};

// identificador de greenlet, unico en el proceso y nunca reutilizado
// es un usize para viajar tal cual en Transfer.data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GreenletId(usize);

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

impl GreenletId {
    pub(crate) fn next() -> Self {
        GreenletId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0 as u64
    }

    pub(crate) fn as_raw(self) -> usize {
        self.0
    }

    pub(crate) fn from_raw(raw: usize) -> Self {
        GreenletId(raw)
    }
}

impl fmt::Display for GreenletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

// estados del greenlet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreenletState {
    New,
    Running,
    Suspended,
    Dead,
}

impl fmt::Display for GreenletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GreenletState::New => "NEW",
            GreenletState::Running => "RUNNING",
            GreenletState::Suspended => "SUSPENDED",
            GreenletState::Dead => "DEAD",
        };
        f.write_str(s)
    }
}

// entry: se ejecuta una sola vez, con el payload del primer switch
pub type GreenletEntry = Box<dyn FnOnce(Value) -> Result<Value, ManagedError> + 'static>;

// estructura del greenlet tal como la guarda el registro
pub(crate) struct GreenletRecord {
    pub id: GreenletId,
    pub name: String,
    pub thread: ThreadId,
    pub state: GreenletState,
    pub parent: Option<GreenletId>, // referencia debil, solo se busca por id
    pub entry: Option<GreenletEntry>,
    pub machine: Option<MachineContext>, // solo valido mientras SUSPENDED
    pub stack: Option<GreenletStack>, // se crea en el primer switch
    pub stack_size: usize,
    pub guard_pages: bool,
    pub inbox: Option<Payload>, // valor o error pendiente para el proximo resume
    pub handles: usize,
}

impl GreenletRecord {
    pub(crate) fn new(
        id: GreenletId,
        name: String,
        parent: GreenletId,
        entry: GreenletEntry,
        stack_size: usize,
        guard_pages: bool,
    ) -> Self {
        Self {
            id,
            name,
            thread: std::thread::current().id(),
            state: GreenletState::New,
            parent: Some(parent),
            entry: Some(entry),
            machine: None,
            stack: None,
            stack_size,
            guard_pages,
            inbox: None,
            handles: 1,
        }
    }

    // el greenlet raiz es la pila original del hilo: ya corre, no tiene entry ni pila propia
    pub(crate) fn root(id: GreenletId) -> Self {
        Self {
            id,
            name: "main".to_string(),
            thread: std::thread::current().id(),
            state: GreenletState::Running,
            parent: None,
            entry: None,
            machine: None,
            stack: None,
            stack_size: 0,
            guard_pages: false,
            inbox: None,
            handles: 0,
        }
    }
}

impl fmt::Debug for GreenletRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GreenletRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("thread", &self.thread)
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("has_entry", &self.entry.is_some())
            .field("has_machine", &self.machine.is_some())
            .field("stack", &self.stack)
            .field("handles", &self.handles)
            .finish()
    }
}

/// handle del host a un greenlet
///
/// es un indice al registro del hilo; clonar y soltar handles lleva la cuenta
/// que decide cuando el registro se puede liberar. no es Send: un greenlet
/// solo se puede nombrar desde el hilo que lo creo
pub struct MyGreenlet {
    id: GreenletId,
    _not_send: PhantomData<*const ()>,
}

impl MyGreenlet {
    /// crea un greenlet en estado NEW, la pila se reserva en el primer switch
    pub fn new<F>(entry: F) -> Self
    where
        F: FnOnce(Value) -> Result<Value, ManagedError> + 'static,
    {
        GreenletBuilder::new().spawn(entry)
    }

    pub fn builder() -> GreenletBuilder {
        GreenletBuilder::new()
    }

    /// greenlet que esta corriendo en este hilo
    pub fn current() -> Self {
        registry::current()
    }

    // el llamador ya incremento la cuenta de handles
    pub(crate) fn from_acquired(id: GreenletId) -> Self {
        Self {
            id,
            _not_send: PhantomData,
        }
    }

    pub fn id(&self) -> GreenletId {
        self.id
    }

    pub fn name(&self) -> String {
        registry::with(|r| r.get(self.id).map(|rec| rec.name.clone())).unwrap_or_default()
    }

    pub fn state(&self) -> GreenletState {
        registry::state_of(self.id)
    }

    pub fn is_started(&self) -> bool {
        self.state() != GreenletState::New
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state(), GreenletState::Running | GreenletState::Suspended)
    }

    pub fn is_dead(&self) -> bool {
        self.state() == GreenletState::Dead
    }

    pub fn is_root(&self) -> bool {
        registry::with(|r| r.root() == self.id)
    }

    pub fn parent(&self) -> Option<MyGreenlet> {
        registry::with(|r| {
            let parent = r.get(self.id)?.parent?;
            r.acquire(parent).then(|| MyGreenlet::from_acquired(parent))
        })
    }

    pub fn set_parent(&self, parent: &MyGreenlet) -> Result<(), SwitchError> {
        registry::with(|r| r.set_parent(self.id, parent.id))?;
        Ok(())
    }

    /// cede el control a este greenlet entregandole `value`
    /// retorna lo que entregue el proximo switch que nos reanude
    pub fn switch(&self, value: impl Into<Value>) -> Result<Value, SwitchError> {
        switch::switch_to(self.id, Payload::Value(value.into()), TraceEvent::Switch)
    }

    /// cede el control levantando `err` en el punto donde este greenlet quedo suspendido
    pub fn throw(&self, err: ManagedError) -> Result<Value, SwitchError> {
        switch::switch_to(self.id, Payload::Error(err), TraceEvent::Throw)
    }

    pub fn switch_payload(&self, payload: Payload) -> Result<Value, SwitchError> {
        let event = if payload.is_error() {
            TraceEvent::Throw
        } else {
            TraceEvent::Switch
        };
        switch::switch_to(self.id, payload, event)
    }
}

impl Clone for MyGreenlet {
    fn clone(&self) -> Self {
        registry::with(|r| r.acquire(self.id));
        MyGreenlet::from_acquired(self.id)
    }
}

impl Drop for MyGreenlet {
    fn drop(&mut self) {
        registry::release(self.id);
    }
}

impl PartialEq for MyGreenlet {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MyGreenlet {}

impl fmt::Debug for MyGreenlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MyGreenlet")
            .field("id", &self.id)
            .field("state", &registry::peek_state(self.id))
            .finish()
    }
}

/// parametros opcionales de creacion
#[derive(Debug, Default)]
pub struct GreenletBuilder {
    name: Option<String>,
    stack_size: Option<usize>,
    parent: Option<GreenletId>,
}

impl GreenletBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// por defecto el padre es el greenlet que esta corriendo al crear
    pub fn parent(mut self, parent: &MyGreenlet) -> Self {
        self.parent = Some(parent.id());
        self
    }

    pub fn spawn<F>(self, entry: F) -> MyGreenlet
    where
        F: FnOnce(Value) -> Result<Value, ManagedError> + 'static,
    {
        let entry: GreenletEntry = Box::new(entry);
        let id = GreenletId::next();
        let name = self.name.unwrap_or_else(|| format!("greenlet-{}", id.as_u64()));

        registry::with(|r| {
            let parent = self
                .parent
                .filter(|p| r.get(*p).is_some())
                .unwrap_or_else(|| r.current());
            let config = r.config().clone();
            let stack_size = self
                .stack_size
                .map(|size| size.max(crate::config::MIN_STACK_SIZE))
                .unwrap_or(config.stack_size);

            let record =
                GreenletRecord::new(id, name, parent, entry, stack_size, config.guard_pages);
            debug!(
                greenlet = %id,
                name = %record.name,
                parent = %parent,
                stack_size,
                "greenlet creado"
            );
            r.register(record);
        });

        MyGreenlet::from_acquired(id)
    }
}
