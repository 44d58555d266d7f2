//! Provider tokens.
//!
//! A [`Token`] is the key a provider is registered under. Tokens compare by
//! value: two `Token::of::<T>()` calls are equal, two string tokens with the
//! same text are equal, and every [`Symbol`] is unique.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a Rust type standing in for a "class".
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name, e.g. `CatsService`.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// A unique token. Each call to [`Symbol::new`] yields a value unequal to every
/// other symbol, even with the same description.
#[derive(Clone, Copy)]
pub struct Symbol {
    id: u64,
    description: &'static str,
}

impl Symbol {
    pub fn new(description: &'static str) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description,
        }
    }

    pub fn description(&self) -> &'static str {
        self.description
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Type(TypeKey),
    Name(Cow<'static, str>),
    Symbol(Symbol),
}

/// Resolves to the [`Request`](crate::pipeline::Request) of the current
/// request scope. Anything depending on it becomes request-scoped.
pub const REQUEST: Token = Token::Name(Cow::Borrowed("REQUEST"));

impl Token {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Token::Type(TypeKey::of::<T>())
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Token::Name(name.into())
    }

    pub fn symbol(description: &'static str) -> Self {
        Token::Symbol(Symbol::new(description))
    }

    pub fn type_key(&self) -> Option<TypeKey> {
        match self {
            Token::Type(key) => Some(*key),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type(key) => f.write_str(key.short_name()),
            Token::Name(name) => write!(f, "\"{name}\""),
            Token::Symbol(sym) => write!(f, "Symbol({})", sym.description),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<&'static str> for Token {
    fn from(name: &'static str) -> Self {
        Token::Name(Cow::Borrowed(name))
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::Name(Cow::Owned(name))
    }
}

impl From<Symbol> for Token {
    fn from(sym: Symbol) -> Self {
        Token::Symbol(sym)
    }
}

impl From<TypeKey> for Token {
    fn from(key: TypeKey) -> Self {
        Token::Type(key)
    }
}

impl From<&Token> for Token {
    fn from(token: &Token) -> Self {
        token.clone()
    }
}
