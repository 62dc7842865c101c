//! Host type descriptors
//!
//! Conversions are driven by a [`HostType`]: a host class plus, for generic
//! classes, the declared type parameters. An erased type has no parameters and
//! every parameter reads as `Object`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::PolyglotResult;
use crate::host_value::HostValue;
use crate::proxy::InterfaceProxy;

// ============================================================================
// Primitive kinds
// ============================================================================

/// The host's primitive scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
}

impl PrimitiveKind {
    /// Name of the primitive type
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Char => "char",
        }
    }

    /// Name of the boxed counterpart
    pub fn boxed_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Short => "Short",
            PrimitiveKind::Int => "Integer",
            PrimitiveKind::Long => "Long",
            PrimitiveKind::Float => "Float",
            PrimitiveKind::Double => "Double",
            PrimitiveKind::Char => "Character",
        }
    }

    /// Whether the kind is numeric
    pub fn is_numeric(self) -> bool {
        !matches!(self, PrimitiveKind::Boolean | PrimitiveKind::Char)
    }

    /// Whether a value of `from` widens to `self` without a cast
    pub fn widens_from(self, from: PrimitiveKind) -> bool {
        use PrimitiveKind::*;
        match from {
            Byte => matches!(self, Short | Int | Long | Float | Double),
            Short | Char => matches!(self, Int | Long | Float | Double),
            Int => matches!(self, Long | Float | Double),
            Long => matches!(self, Float | Double),
            Float => matches!(self, Double),
            Double | Boolean => false,
        }
    }
}

// ============================================================================
// Host classes
// ============================================================================

/// A host class, without type arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostClass {
    /// A primitive scalar
    Primitive(PrimitiveKind),
    /// The boxed form of a primitive scalar
    Boxed(PrimitiveKind),
    String,
    CharSequence,
    Number,
    /// The root of the class hierarchy
    Object,
    /// The generic value handle
    Value,
    List,
    Map,
    MapEntry,
    Iterable,
    Iterator,
    Function,
    ByteSequence,
    /// An array with the given component class
    Array(Box<HostClass>),
    /// A host interface a guest value may implement
    Interface(Arc<InterfaceDesc>),
    /// Any other host class, known by name only
    Named(Arc<str>),
}

impl HostClass {
    /// Host-visible class name
    pub fn name(&self) -> String {
        match self {
            HostClass::Primitive(k) => k.name().to_string(),
            HostClass::Boxed(k) => k.boxed_name().to_string(),
            HostClass::String => "String".to_string(),
            HostClass::CharSequence => "CharSequence".to_string(),
            HostClass::Number => "Number".to_string(),
            HostClass::Object => "Object".to_string(),
            HostClass::Value => "Value".to_string(),
            HostClass::List => "List".to_string(),
            HostClass::Map => "Map".to_string(),
            HostClass::MapEntry => "Map.Entry".to_string(),
            HostClass::Iterable => "Iterable".to_string(),
            HostClass::Iterator => "Iterator".to_string(),
            HostClass::Function => "Function".to_string(),
            HostClass::ByteSequence => "ByteSequence".to_string(),
            HostClass::Array(component) => format!("{}[]", component.name()),
            HostClass::Interface(desc) => desc.name().to_string(),
            HostClass::Named(name) => name.to_string(),
        }
    }

    fn primitive_or_boxed(&self) -> Option<PrimitiveKind> {
        match self {
            HostClass::Primitive(k) | HostClass::Boxed(k) => Some(*k),
            _ => None,
        }
    }

    /// Plain class-hierarchy assignability (no boxing, no widening)
    fn is_supertype_of(&self, from: &HostClass) -> bool {
        if self == from {
            return true;
        }
        match (self, from) {
            (HostClass::Object, HostClass::Primitive(_)) => false,
            (HostClass::Object, _) => true,
            (HostClass::CharSequence, HostClass::String) => true,
            (HostClass::Number, HostClass::Boxed(k)) => k.is_numeric(),
            (HostClass::Iterable, HostClass::List) => true,
            (HostClass::Array(to), HostClass::Array(from)) => {
                !matches!(**to, HostClass::Primitive(_)) && to.is_supertype_of(from)
            }
            _ => false,
        }
    }

    /// Whether a value of class `from` may be passed where `self` is
    /// expected, allowing boxing, unboxing and primitive widening
    pub fn is_assignable_from(&self, from: &HostClass) -> bool {
        if self.is_supertype_of(from) {
            return true;
        }
        let from_primitive = matches!(from, HostClass::Primitive(_));
        match (self.primitive_or_boxed(), from.primitive_or_boxed()) {
            (Some(to_kind), Some(from_kind)) => {
                if to_kind == from_kind {
                    // int is more specific than Integer, not the other way round
                    from_primitive
                } else {
                    to_kind.widens_from(from_kind)
                }
            }
            (None, Some(from_kind)) => match self {
                HostClass::Object => from_primitive,
                HostClass::Number => from_primitive && from_kind.is_numeric(),
                HostClass::String | HostClass::CharSequence => from_kind == PrimitiveKind::Char,
                _ => false,
            },
            _ => false,
        }
    }
}

// ============================================================================
// Host types
// ============================================================================

/// A host class together with its declared type arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostType {
    class: HostClass,
    params: Option<Vec<HostType>>,
}

impl HostType {
    /// An erased (non-generic) type
    pub fn new(class: HostClass) -> Self {
        HostType {
            class,
            params: None,
        }
    }

    /// A parameterized type
    pub fn generic(class: HostClass, params: Vec<HostType>) -> Self {
        HostType {
            class,
            params: Some(params),
        }
    }

    pub fn object() -> Self {
        Self::new(HostClass::Object)
    }

    pub fn string() -> Self {
        Self::new(HostClass::String)
    }

    pub fn value() -> Self {
        Self::new(HostClass::Value)
    }

    pub fn number() -> Self {
        Self::new(HostClass::Number)
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(HostClass::Primitive(kind))
    }

    pub fn boxed(kind: PrimitiveKind) -> Self {
        Self::new(HostClass::Boxed(kind))
    }

    pub fn bytes() -> Self {
        Self::new(HostClass::ByteSequence)
    }

    pub fn named(name: &str) -> Self {
        Self::new(HostClass::Named(Arc::from(name)))
    }

    pub fn interface(desc: Arc<InterfaceDesc>) -> Self {
        Self::new(HostClass::Interface(desc))
    }

    pub fn list_of(element: HostType) -> Self {
        Self::generic(HostClass::List, vec![element])
    }

    pub fn map_of(key: HostType, value: HostType) -> Self {
        Self::generic(HostClass::Map, vec![key, value])
    }

    pub fn entry_of(key: HostType, value: HostType) -> Self {
        Self::generic(HostClass::MapEntry, vec![key, value])
    }

    pub fn iterable_of(element: HostType) -> Self {
        Self::generic(HostClass::Iterable, vec![element])
    }

    pub fn iterator_of(element: HostType) -> Self {
        Self::generic(HostClass::Iterator, vec![element])
    }

    /// `Function<param, ret>`; the return type is the second argument
    pub fn function_of(param: HostType, ret: HostType) -> Self {
        Self::generic(HostClass::Function, vec![param, ret])
    }

    pub fn array_of(component: HostType) -> Self {
        HostType {
            class: HostClass::Array(Box::new(component.class.clone())),
            params: Some(vec![component]),
        }
    }

    /// The class, without type arguments
    pub fn class(&self) -> &HostClass {
        &self.class
    }

    /// Whether the type was declared with type arguments
    pub fn is_generic(&self) -> bool {
        self.params.is_some()
    }

    /// The `index`th type argument; `Object` when erased or absent
    pub fn param(&self, index: usize) -> HostType {
        self.params
            .as_ref()
            .and_then(|p| p.get(index).cloned())
            .unwrap_or_else(HostType::object)
    }

    /// Component type of an array type
    pub fn component(&self) -> Option<HostType> {
        match &self.class {
            HostClass::Array(component) => Some(
                self.params
                    .as_ref()
                    .and_then(|p| p.first().cloned())
                    .unwrap_or_else(|| HostType::new((**component).clone())),
            ),
            _ => None,
        }
    }

    /// Whether the type is a primitive scalar (and thus cannot hold null)
    pub fn is_primitive(&self) -> bool {
        matches!(self.class, HostClass::Primitive(_))
    }

    /// Whether the type is a target of primitive coercion
    pub fn is_primitive_coercible(&self) -> bool {
        matches!(
            self.class,
            HostClass::Primitive(_)
                | HostClass::Boxed(_)
                | HostClass::String
                | HostClass::CharSequence
                | HostClass::Number
        )
    }

    /// Whether the type targets a single character
    pub fn is_char(&self) -> bool {
        matches!(
            self.class,
            HostClass::Primitive(PrimitiveKind::Char) | HostClass::Boxed(PrimitiveKind::Char)
        )
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(component) = self.component() {
            return write!(f, "{}[]", component);
        }
        f.write_str(&self.class.name())?;
        if let Some(params) = &self.params {
            let parts: Vec<String> = params.iter().map(|p| p.to_string()).collect();
            write!(f, "<{}>", parts.join(", "))?;
        }
        Ok(())
    }
}

impl From<HostClass> for HostType {
    fn from(class: HostClass) -> Self {
        HostType::new(class)
    }
}

// ============================================================================
// Interfaces
// ============================================================================

/// Body of an interface method with a host-side default implementation.
pub type DefaultMethod =
    Arc<dyn Fn(&InterfaceProxy, &[HostValue]) -> PolyglotResult<HostValue> + Send + Sync>;

/// A method declared on a host interface.
#[derive(Clone)]
pub struct MethodDesc {
    name: String,
    params: Vec<HostType>,
    ret: HostType,
    varargs: bool,
    default: Option<DefaultMethod>,
}

impl MethodDesc {
    /// An abstract method with no parameters returning `Object`
    pub fn new(name: impl Into<String>) -> Self {
        MethodDesc {
            name: name.into(),
            params: Vec::new(),
            ret: HostType::object(),
            varargs: false,
            default: None,
        }
    }

    /// Append a parameter
    pub fn param(mut self, ty: HostType) -> Self {
        self.params.push(ty);
        self
    }

    /// Set the return type
    pub fn returns(mut self, ty: HostType) -> Self {
        self.ret = ty;
        self
    }

    /// Mark the last parameter (an array) as variable arity
    pub fn varargs(mut self) -> Self {
        self.varargs = true;
        self
    }

    /// Give the method a host-side default body
    pub fn with_default<F>(mut self, body: F) -> Self
    where
        F: Fn(&InterfaceProxy, &[HostValue]) -> PolyglotResult<HostValue> + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(body));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[HostType] {
        &self.params
    }

    pub fn return_type(&self) -> &HostType {
        &self.ret
    }

    pub fn is_varargs(&self) -> bool {
        self.varargs
    }

    pub fn default_body(&self) -> Option<&DefaultMethod> {
        self.default.as_ref()
    }

    /// Whether the method must be provided by the implementing guest value
    pub fn is_abstract(&self) -> bool {
        self.default.is_none()
    }
}

impl fmt::Debug for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDesc")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("varargs", &self.varargs)
            .field("default", &self.default.is_some())
            .finish()
    }
}

/// A host interface. Interfaces are identified by name.
#[derive(Debug)]
pub struct InterfaceDesc {
    name: String,
    methods: Vec<MethodDesc>,
}

impl InterfaceDesc {
    pub fn new(name: impl Into<String>, methods: Vec<MethodDesc>) -> Arc<Self> {
        Arc::new(InterfaceDesc {
            name: name.into(),
            methods,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodDesc] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDesc> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// The single abstract method, if the interface is functional
    pub fn functional_method(&self) -> Option<&MethodDesc> {
        let mut abstracts = self.methods.iter().filter(|m| m.is_abstract());
        match (abstracts.next(), abstracts.next()) {
            (Some(method), None) => Some(method),
            _ => None,
        }
    }

    pub fn is_functional(&self) -> bool {
        self.functional_method().is_some()
    }
}

impl PartialEq for InterfaceDesc {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for InterfaceDesc {}

impl Hash for InterfaceDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PrimitiveKind::*;

    #[test]
    fn test_display_names() {
        assert_eq!(HostType::primitive(Int).to_string(), "int");
        assert_eq!(HostType::boxed(Int).to_string(), "Integer");
        assert_eq!(HostType::list_of(HostType::string()).to_string(), "List<String>");
        assert_eq!(
            HostType::map_of(HostType::string(), HostType::object()).to_string(),
            "Map<String, Object>"
        );
        assert_eq!(HostType::array_of(HostType::string()).to_string(), "String[]");
        assert_eq!(
            HostType::array_of(HostType::list_of(HostType::boxed(Long))).to_string(),
            "List<Long>[]"
        );
    }

    #[test]
    fn test_erased_params_read_as_object() {
        let list = HostType::new(HostClass::List);
        assert_eq!(list.param(0), HostType::object());
        let function = HostType::function_of(HostType::string(), HostType::boxed(Int));
        assert_eq!(function.param(1), HostType::boxed(Int));
    }

    #[test]
    fn test_widening() {
        assert!(Long.widens_from(Int));
        assert!(Double.widens_from(Float));
        assert!(Int.widens_from(Char));
        assert!(!Int.widens_from(Long));
        assert!(!Char.widens_from(Byte));
    }

    #[test]
    fn test_assignability() {
        let int = HostClass::Primitive(Int);
        let integer = HostClass::Boxed(Int);
        assert!(integer.is_assignable_from(&int));
        assert!(!int.is_assignable_from(&integer));
        assert!(HostClass::Primitive(Long).is_assignable_from(&int));
        assert!(HostClass::Number.is_assignable_from(&integer));
        assert!(HostClass::Number.is_assignable_from(&int));
        assert!(HostClass::Object.is_assignable_from(&HostClass::String));
        assert!(HostClass::CharSequence.is_assignable_from(&HostClass::String));
        assert!(HostClass::String.is_assignable_from(&HostClass::Primitive(Char)));
        assert!(!HostClass::String.is_assignable_from(&HostClass::Object));
    }

    #[test]
    fn test_functional_interface() {
        let runnable = InterfaceDesc::new("Runnable", vec![MethodDesc::new("run")]);
        assert!(runnable.is_functional());
        let two = InterfaceDesc::new("Pair", vec![MethodDesc::new("a"), MethodDesc::new("b")]);
        assert!(!two.is_functional());
        let with_default = InterfaceDesc::new(
            "Greeter",
            vec![
                MethodDesc::new("name").returns(HostType::string()),
                MethodDesc::new("greet").with_default(|_, _| Ok(HostValue::Null)),
            ],
        );
        assert_eq!(with_default.functional_method().map(MethodDesc::name), Some("name"));
    }
}
