//! configuracion del runtime
//! valores por defecto del proceso + override por hilo via registry::configure

use once_cell::sync::Lazy;
use tracing::warn;

pub const DEFAULT_STACK_SIZE: usize = 256 * 1024; // 256kb por greenlet
pub const MIN_STACK_SIZE: usize = 16 * 1024;

pub const STACK_SIZE_ENV: &str = "MYGREENLETS_STACK_SIZE";
pub const STACK_GUARD_ENV: &str = "MYGREENLETS_STACK_GUARD";

/// parametros con los que se crean las pilas de los greenlets nuevos
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// bytes de pila por greenlet
    pub stack_size: usize,
    /// si es true la pila lleva una pagina de guarda (ProtectedFixedSizeStack)
    pub guard_pages: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            guard_pages: true,
        }
    }
}

impl RuntimeConfig {
    /// lee la configuracion de las variables de entorno
    /// valores invalidos se reportan y se ignoran
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(STACK_SIZE_ENV) {
            match parse_stack_size(&raw) {
                Some(size) => config = config.with_stack_size(size),
                None => warn!(
                    var = STACK_SIZE_ENV,
                    value = %raw,
                    "tamano de pila invalido, se usa el default"
                ),
            }
        }

        if let Ok(raw) = std::env::var(STACK_GUARD_ENV) {
            match parse_flag(&raw) {
                Some(flag) => config.guard_pages = flag,
                None => {
                    warn!(var = STACK_GUARD_ENV, value = %raw, "flag invalido, se usa el default")
                }
            }
        }

        config
    }

    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = size.max(MIN_STACK_SIZE);
        self
    }

    pub fn with_guard_pages(mut self, guard_pages: bool) -> Self {
        self.guard_pages = guard_pages;
        self
    }
}

// se lee una sola vez por proceso
static PROCESS_DEFAULTS: Lazy<RuntimeConfig> = Lazy::new(RuntimeConfig::from_env);

/// configuracion inicial de cada hilo nuevo
pub fn process_defaults() -> RuntimeConfig {
    PROCESS_DEFAULTS.clone()
}

// acepta "65536", "64k", "1m"
fn parse_stack_size(raw: &str) -> Option<usize> {
    let raw = raw.trim().to_ascii_lowercase();
    let (digits, factor) = if let Some(n) = raw.strip_suffix('k') {
        (n, 1024)
    } else if let Some(n) = raw.strip_suffix('m') {
        (n, 1024 * 1024)
    } else {
        (raw.as_str(), 1)
    };
    let n: usize = digits.trim().parse().ok()?;
    if n == 0 {
        return None;
    }
    n.checked_mul(factor)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
