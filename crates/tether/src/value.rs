//! Typed value exchange between the host and an interpreter context.
//!
//! Injection goes through [`IntoValue`]: every supported host type maps to
//! exactly one [`Value`] variant, and that variant is what the engine's
//! `set_named` dispatches on. Scalars keep their native width (an `i16` is
//! injected as [`Value::Short`], never widened to `Int` or boxed as an object).
//!
//! Extraction goes through [`FromValue`]: the target type names the
//! [`ValueKind`] it asks the engine for and then checks the reply, including
//! integer range. `get_value::<i8>` on a guest value of 300 is a
//! [`SessionError::TypeConversion`], not a silent wrap.

use indexmap::IndexMap;
use strum::Display;

use crate::error::SessionError;

/// Keyword arguments for [`Session::invoke`](crate::Session::invoke).
pub type Kwargs = IndexMap<String, Value>;

/// Opaque reference to an object that lives on the other side of the boundary.
///
/// The session tracks every reference the engine hands back and releases them
/// all before the context is terminated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ObjectRef {
    id: u64,
    type_name: String,
}

impl ObjectRef {
    #[must_use]
    pub fn new(id: u64, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// Reference to a host type, injected so guest code can construct or inspect it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ClassRef(String);

impl ClassRef {
    #[must_use]
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self(qualified_name.into())
    }

    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.0
    }
}

/// A value crossing the host/interpreter boundary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    /// The guest's null value.
    None,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    BoolArray(Vec<bool>),
    /// Raw bytes. Unlike the signed [`Value::Byte`] scalar this is the natural
    /// host representation of a byte buffer.
    ByteArray(Vec<u8>),
    ShortArray(Vec<i16>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    /// Anything without a narrower representation.
    Object(ObjectRef),
    Class(ClassRef),
}

/// Type descriptor naming what a [`Value`] is, or what an extraction asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ValueKind {
    #[strum(serialize = "None")]
    None,
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "byte")]
    Byte,
    #[strum(serialize = "short")]
    Short,
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "long")]
    Long,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "double")]
    Double,
    #[strum(serialize = "str")]
    Str,
    #[strum(serialize = "bool[]")]
    BoolArray,
    #[strum(serialize = "bytes")]
    ByteArray,
    #[strum(serialize = "short[]")]
    ShortArray,
    #[strum(serialize = "int[]")]
    IntArray,
    #[strum(serialize = "long[]")]
    LongArray,
    #[strum(serialize = "float[]")]
    FloatArray,
    #[strum(serialize = "double[]")]
    DoubleArray,
    /// The untyped target: the engine picks the host representation itself.
    #[strum(serialize = "object")]
    Object,
    #[strum(serialize = "class")]
    Class,
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::None => ValueKind::None,
            Self::Bool(_) => ValueKind::Bool,
            Self::Byte(_) => ValueKind::Byte,
            Self::Short(_) => ValueKind::Short,
            Self::Int(_) => ValueKind::Int,
            Self::Long(_) => ValueKind::Long,
            Self::Float(_) => ValueKind::Float,
            Self::Double(_) => ValueKind::Double,
            Self::Str(_) => ValueKind::Str,
            Self::BoolArray(_) => ValueKind::BoolArray,
            Self::ByteArray(_) => ValueKind::ByteArray,
            Self::ShortArray(_) => ValueKind::ShortArray,
            Self::IntArray(_) => ValueKind::IntArray,
            Self::LongArray(_) => ValueKind::LongArray,
            Self::FloatArray(_) => ValueKind::FloatArray,
            Self::DoubleArray(_) => ValueKind::DoubleArray,
            Self::Object(_) => ValueKind::Object,
            Self::Class(_) => ValueKind::Class,
        }
    }

    /// Returns the integer payload widened to `i64`, for any integral scalar.
    fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }
}

// =============================================================================
// Injection
// =============================================================================

/// Host types that can be injected into an interpreter context.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

macro_rules! into_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }
        )*
    };
}

macro_rules! into_array_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl IntoValue for Vec<$ty> {
                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }

            impl IntoValue for &[$ty] {
                fn into_value(self) -> Value {
                    Value::$variant(self.to_vec())
                }
            }
        )*
    };
}

into_value! {
    bool => Bool,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => Str,
    ObjectRef => Object,
    ClassRef => Class,
}

into_array_value! {
    bool => BoolArray,
    u8 => ByteArray,
    i16 => ShortArray,
    i32 => IntArray,
    i64 => LongArray,
    f32 => FloatArray,
    f64 => DoubleArray,
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Str(self.to_owned())
    }
}

/// A single character is injected as a one-character string.
impl IntoValue for char {
    fn into_value(self) -> Value {
        Value::Str(self.to_string())
    }
}

/// Character buffers are injected as strings.
impl IntoValue for &[char] {
    fn into_value(self) -> Value {
        Value::Str(self.iter().collect())
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::None, IntoValue::into_value)
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Host types that can be extracted from an interpreter context.
pub trait FromValue: Sized {
    /// What the engine is asked to convert the guest value into.
    const KIND: ValueKind;

    fn from_value(value: Value) -> Result<Self, SessionError>;
}

impl FromValue for Value {
    const KIND: ValueKind = ValueKind::Object;

    fn from_value(value: Value) -> Result<Self, SessionError> {
        Ok(value)
    }
}

macro_rules! from_integer_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const KIND: ValueKind = ValueKind::$kind;

                fn from_value(value: Value) -> Result<Self, SessionError> {
                    let wide = value
                        .as_integer()
                        .ok_or_else(|| SessionError::conversion(value.kind(), Self::KIND))?;
                    <$ty>::try_from(wide).map_err(|_| SessionError::out_of_range(wide, Self::KIND))
                }
            }
        )*
    };
}

from_integer_value! {
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
}

macro_rules! from_exact_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const KIND: ValueKind = ValueKind::$variant;

                fn from_value(value: Value) -> Result<Self, SessionError> {
                    match value {
                        Value::$variant(inner) => Ok(inner),
                        other => Err(SessionError::conversion(other.kind(), Self::KIND)),
                    }
                }
            }
        )*
    };
}

from_exact_value! {
    bool => Bool,
    f32 => Float,
    String => Str,
    Vec<bool> => BoolArray,
    Vec<u8> => ByteArray,
    Vec<i16> => ShortArray,
    Vec<i32> => IntArray,
    Vec<i64> => LongArray,
    Vec<f32> => FloatArray,
    Vec<f64> => DoubleArray,
    ObjectRef => Object,
    ClassRef => Class,
}

/// `f32` widens losslessly, so a guest single-precision value is accepted too.
impl FromValue for f64 {
    const KIND: ValueKind = ValueKind::Double;

    fn from_value(value: Value) -> Result<Self, SessionError> {
        match value {
            Value::Double(v) => Ok(v),
            Value::Float(v) => Ok(Self::from(v)),
            other => Err(SessionError::conversion(other.kind(), Self::KIND)),
        }
    }
}

impl FromValue for char {
    const KIND: ValueKind = ValueKind::Str;

    fn from_value(value: Value) -> Result<Self, SessionError> {
        let Value::Str(text) = value else {
            return Err(SessionError::conversion(value.kind(), Self::KIND));
        };
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(SessionError::TypeConversion(format!(
                "expected a single character, got {} characters",
                text.chars().count()
            ))),
        }
    }
}

/// The guest null maps to `None`; anything else goes through `T`.
impl<T: FromValue> FromValue for Option<T> {
    const KIND: ValueKind = T::KIND;

    fn from_value(value: Value) -> Result<Self, SessionError> {
        match value {
            Value::None => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn scalars_keep_their_native_width() {
        assert_eq!(7_i8.into_value(), Value::Byte(7));
        assert_eq!(7_i16.into_value(), Value::Short(7));
        assert_eq!(7_i32.into_value(), Value::Int(7));
        assert_eq!(7_i64.into_value(), Value::Long(7));
        assert_eq!(1.5_f32.into_value(), Value::Float(1.5));
        assert_eq!(1.5_f64.into_value(), Value::Double(1.5));
    }

    #[test]
    fn chars_inject_as_strings() {
        assert_eq!('x'.into_value(), Value::Str("x".to_owned()));
        assert_eq!(['a', 'b'].as_slice().into_value(), Value::Str("ab".to_owned()));
    }

    #[test]
    fn slices_inject_as_arrays() {
        assert_eq!([1_i32, 2, 3].as_slice().into_value(), Value::IntArray(vec![1, 2, 3]));
        assert_eq!(b"ab".as_slice().into_value(), Value::ByteArray(vec![b'a', b'b']));
    }

    #[test]
    fn object_and_class_references_use_their_own_variants() {
        let obj = ObjectRef::new(9, "java.util.ArrayList");
        assert_eq!(obj.clone().into_value(), Value::Object(obj));
        let class = ClassRef::new("java.lang.String");
        assert_eq!(class.clone().into_value().kind(), ValueKind::Class);
    }

    #[test]
    fn integer_extraction_narrows_within_range() {
        assert_eq!(i8::from_value(Value::Long(-128)).unwrap(), -128);
        assert_eq!(i16::from_value(Value::Int(1234)).unwrap(), 1234);
        assert_eq!(i64::from_value(Value::Byte(5)).unwrap(), 5);
    }

    #[test]
    fn integer_extraction_rejects_out_of_range() {
        let err = i8::from_value(Value::Long(i64::MAX)).unwrap_err();
        assert!(matches!(err, SessionError::TypeConversion(_)), "got {err:?}");
        assert!(err.to_string().contains("out of range for byte"), "got {err}");
    }

    #[test]
    fn integer_extraction_rejects_non_integers() {
        let err = i32::from_value(Value::Double(1.0)).unwrap_err();
        assert!(matches!(err, SessionError::TypeConversion(_)));
        let err = i32::from_value(Value::Str("1".to_owned())).unwrap_err();
        assert_eq!(err.to_string(), "type conversion failed: cannot convert str to int");
    }

    #[test]
    fn double_accepts_float_but_not_the_reverse() {
        assert_eq!(f64::from_value(Value::Float(0.5)).unwrap(), 0.5);
        assert!(f32::from_value(Value::Double(0.5)).is_err());
    }

    #[test]
    fn char_extraction_requires_exactly_one_character() {
        assert_eq!(char::from_value(Value::Str("z".to_owned())).unwrap(), 'z');
        assert!(char::from_value(Value::Str("zz".to_owned())).is_err());
        assert!(char::from_value(Value::Str(String::new())).is_err());
    }

    #[test]
    fn option_maps_guest_null() {
        assert_eq!(Option::<i32>::from_value(Value::None).unwrap(), None);
        assert_eq!(Option::<i32>::from_value(Value::Int(3)).unwrap(), Some(3));
        assert_eq!(<Option<i32> as FromValue>::KIND, ValueKind::Int);
        assert_eq!(None::<i32>.into_value(), Value::None);
    }
}
