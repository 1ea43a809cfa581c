//! valores que viajan entre greenlets en cada switch

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::error::ManagedError;

/// modelo de valores del host
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<Value>),
    /// palabra nativa opaca, la usa la api c para pasar punteros
    Raw(usize),
    /// objeto arbitrario del host
    Opaque(Rc<dyn Any>),
}

impl Value {
    pub fn opaque<T: Any>(value: T) -> Self {
        Value::Opaque(Rc::new(value))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Opaque(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a == b,
            // identidad, no contenido
            (Value::Opaque(a), Value::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            Value::Raw(word) => write!(f, "Raw({word:#x})"),
            Value::Opaque(obj) => write!(f, "Opaque({:p})", Rc::as_ptr(obj)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Value::Raw(word) => write!(f, "{word:#x}"),
            Value::Opaque(_) => f.write_str("<opaque>"),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::None
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Tuple(items)
    }
}

/// lo que entrega un switch: un valor o un error pendiente
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Value(Value),
    Error(ManagedError),
}

impl Payload {
    pub fn is_error(&self) -> bool {
        matches!(self, Payload::Error(_))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

impl From<ManagedError> for Payload {
    fn from(err: ManagedError) -> Self {
        Payload::Error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_tuple() {
        let v = Value::from(vec![Value::from(1), Value::from("dos"), Value::None]);
        assert_eq!(v.to_string(), "(1, dos, None)");
    }

    #[test]
    fn opaque_compares_by_identity() {
        let a = Value::opaque(5u8);
        let b = a.clone();
        let c = Value::opaque(5u8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_ref::<u8>(), Some(&5));
    }
}
