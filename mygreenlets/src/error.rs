//! errores del runtime
//! usage: mal uso de la api, no fatal, no se toca ningun estado
//! managed: errores del host que viajan por el canal normal del switch

use thiserror::Error;

use crate::greenlet::GreenletId;
use crate::value::Value;

/// tipo del error que termina un greenlet sin propagarse como error
pub const EXIT_KIND: &str = "GreenletExit";
/// tipo con el que un error de uso llega al codigo del host
pub const USAGE_KIND: &str = "greenlet.error";

/// error estructurado del host (tipo + valor)
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {value}")]
pub struct ManagedError {
    pub kind: String,
    pub value: Value,
    /// greenlets de los que el error salio sin ser atrapado, en orden
    pub hops: Vec<GreenletId>,
}

impl ManagedError {
    pub fn new(kind: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            hops: Vec::new(),
        }
    }

    /// termina el greenlet actual entregando `value` al padre como retorno normal
    pub fn exit(value: impl Into<Value>) -> Self {
        Self::new(EXIT_KIND, value)
    }

    pub fn is_exit(&self) -> bool {
        self.kind == EXIT_KIND
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("no se puede cambiar a un greenlet muerto ({0})")]
    DeadTarget(GreenletId),

    #[error("el greenlet {0} ya esta corriendo, no puede cambiar a si mismo")]
    SelfSwitch(GreenletId),

    #[error("greenlet {0} no registrado en este hilo")]
    Unknown(GreenletId),

    #[error("asignar ese padre a {0} crearia un ciclo")]
    ParentCycle(GreenletId),

    #[error("el greenlet raiz {0} no puede tener padre")]
    RootParent(GreenletId),

    #[error("no se pudo crear la pila de {id}: {reason}")]
    StackAlloc { id: GreenletId, reason: String },

    #[error("greenlet {0} suspendido sin contexto guardado")]
    NotResumable(GreenletId),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SwitchError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Raised(ManagedError),
}

impl SwitchError {
    pub fn as_managed(&self) -> Option<&ManagedError> {
        match self {
            SwitchError::Raised(err) => Some(err),
            SwitchError::Usage(_) => None,
        }
    }

    pub fn as_usage(&self) -> Option<&UsageError> {
        match self {
            SwitchError::Usage(err) => Some(err),
            SwitchError::Raised(_) => None,
        }
    }
}

impl From<ManagedError> for SwitchError {
    fn from(err: ManagedError) -> Self {
        SwitchError::Raised(err)
    }
}

// permite usar `?` dentro de una entry: los errores de uso llegan al host
// como un error gestionado mas
impl From<SwitchError> for ManagedError {
    fn from(err: SwitchError) -> Self {
        match err {
            SwitchError::Raised(err) => err,
            SwitchError::Usage(usage) => ManagedError::new(USAGE_KIND, usage.to_string()),
        }
    }
}

impl From<UsageError> for ManagedError {
    fn from(err: UsageError) -> Self {
        SwitchError::Usage(err).into()
    }
}
