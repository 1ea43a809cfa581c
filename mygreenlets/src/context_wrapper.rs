// wrapper minimalista sobre el crate context
// es el unico modulo que toca pilas y registros, el resto usa estos tipos

use context::stack::{FixedSizeStack, ProtectedFixedSizeStack, Stack};
use context::{Context, Transfer};

/// funcion que arranca en una pila nueva, nunca retorna
pub(crate) type Bootstrap = extern "C" fn(Transfer) -> !;

/// pila propia de un greenlet
/// vive en el registro mientras exista el greenlet, nunca se libera mientras
/// alguien pueda reanudar un contexto que apunte a ella
pub(crate) struct GreenletStack {
    memory: StackMemory,
    size: usize,
}

enum StackMemory {
    Protected(ProtectedFixedSizeStack),
    Plain(FixedSizeStack),
}

impl GreenletStack {
    pub(crate) fn new(size: usize, guard_pages: bool) -> Result<Self, String> {
        let memory = if guard_pages {
            ProtectedFixedSizeStack::new(size).map(StackMemory::Protected)
        } else {
            FixedSizeStack::new(size).map(StackMemory::Plain)
        };
        memory
            .map(|memory| Self { memory, size })
            .map_err(|e| e.to_string())
    }

    fn raw(&self) -> &Stack {
        match &self.memory {
            StackMemory::Protected(stack) => &**stack,
            StackMemory::Plain(stack) => &**stack,
        }
    }
}

impl std::fmt::Debug for GreenletStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.memory {
            StackMemory::Protected(_) => "protected",
            StackMemory::Plain(_) => "plain",
        };
        f.debug_struct("GreenletStack")
            .field("kind", &kind)
            .field("size", &self.size)
            .finish()
    }
}

/// estado de maquina guardado (pila + registros) de un greenlet suspendido
/// se consume al reanudar, asi un mismo snapshot no se puede usar dos veces
pub(crate) struct MachineContext {
    context: Context,
}

/// lo que recibe un contexto cuando alguien lo reanuda
pub(crate) struct Resumed {
    /// snapshot del contexto que nos cedio el control
    pub from: MachineContext,
    pub data: usize,
}

impl MachineContext {
    /// fabrica un contexto que al primer resume ejecuta `entry` sobre `stack`
    pub(crate) fn bootstrap(stack: &GreenletStack, entry: Bootstrap) -> Self {
        // safety: la pila la guarda el registro junto al registro del greenlet
        // y solo se libera cuando el greenlet es NEW o DEAD
        let context = unsafe { Context::new(stack.raw(), entry) };
        Self { context }
    }

    /// guarda el contexto actual y salta a este
    /// retorna cuando otro contexto nos reanude
    ///
    /// safety: solo lo puede llamar el greenlet que esta corriendo en este hilo,
    /// y la pila a la que apunta el snapshot tiene que seguir viva
    pub(crate) unsafe fn resume(self, data: usize) -> Resumed {
        let transfer = unsafe { self.context.resume(data) };
        Resumed::from_transfer(transfer)
    }
}

impl Resumed {
    pub(crate) fn from_transfer(transfer: Transfer) -> Self {
        Self {
            from: MachineContext {
                context: transfer.context,
            },
            data: transfer.data,
        }
    }
}

impl std::fmt::Debug for MachineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineContext").finish_non_exhaustive()
    }
}
