//! This module defines the node chain that represents both programs and runtime values.
//! A [`Node`] is either a leaf ([`Node::Atom`]), one link of a chain ([`Node::Link`]),
//! or one of the sentinels [`Node::Nil`] (the empty chain, which doubles as false),
//! [`Node::True`] and [`Node::Unspecified`]. A [`Handle`] is a cheap, clonable
//! reference to a node and is what every evaluation step passes around.
//!
//! A list `(a (b c) d)` is a chain of three links whose `content` fields hold the
//! atom `a`, the head link of the nested chain `(b c)`, and the atom `d`. Walking
//! `continuation` advances along the list; descending into `content` enters an element.
//!
//! Chains are immutable once built and reference counted, so sharing a tail between
//! two lists (as `cons` and `append` do) is safe and no reclamation pass is needed.

use std::fmt;
use std::rc::Rc;

/// Type alias for the integers that numeral atoms denote
pub(crate) type NumberType = i64;

/// Atom labels that carry no data of their own. A structure made only of these
/// (and of empty links) counts as empty.
pub(crate) const RESERVED_LABELS: [&str; 4] = ["quote", "()", "#f", "#t"];

/// The universal tree cell
#[derive(Debug)]
pub enum Node {
    /// The canonical empty chain; also the false sentinel
    Nil,
    /// The true sentinel
    True,
    /// A symbol or numeral leaf
    Atom(Rc<str>),
    /// One link of a chain. `continuation` is `None` at the end of the chain and
    /// otherwise always points at another `Link`.
    Link {
        content: Handle,
        continuation: Option<Handle>,
    },
    /// Result of forms evaluated only for their effect (e.g. `define`)
    /// These values never equal themselves or any other value
    Unspecified,
}

/// A reference to a node, used as argument and result of every evaluation step
///
/// Two handles wrapping structurally equal nodes are not necessarily the same
/// object; use [`Handle::ptr_eq`] for identity and `==` for structure.
#[derive(Clone)]
pub struct Handle(Rc<Node>);

impl Handle {
    pub fn new(node: Node) -> Self {
        Handle(Rc::new(node))
    }

    pub fn nil() -> Self {
        Handle::new(Node::Nil)
    }

    pub fn truth() -> Self {
        Handle::new(Node::True)
    }

    /// `True` for `true`, `Nil` for `false`
    pub fn boolean(value: bool) -> Self {
        if value { Handle::truth() } else { Handle::nil() }
    }

    pub fn unspecified() -> Self {
        Handle::new(Node::Unspecified)
    }

    pub fn atom<S: AsRef<str>>(label: S) -> Self {
        Handle::new(Node::Atom(Rc::from(label.as_ref())))
    }

    /// A numeral atom
    pub fn number(n: NumberType) -> Self {
        Handle::atom(n.to_string())
    }

    /// The synthesized `#f` atom returned by failed association lookups
    pub fn false_atom() -> Self {
        Handle::atom("#f")
    }

    /// Build a single link. A continuation must itself be a link.
    pub fn link(content: Handle, continuation: Option<Handle>) -> Self {
        debug_assert!(
            continuation.as_ref().is_none_or(Handle::is_list),
            "continuation must be a chain link"
        );
        Handle::new(Node::Link {
            content,
            continuation,
        })
    }

    /// Build a chain from its elements; no elements gives `Nil`
    pub fn list(items: Vec<Handle>) -> Self {
        let mut chain: Option<Handle> = None;
        for item in items.into_iter().rev() {
            chain = Some(Handle::link(item, chain));
        }
        chain.unwrap_or_else(Handle::nil)
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn label(&self) -> Option<&str> {
        match self.node() {
            Node::Atom(label) => Some(&**label),
            _ => None,
        }
    }

    pub fn content(&self) -> Option<&Handle> {
        match self.node() {
            Node::Link { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn continuation(&self) -> Option<&Handle> {
        match self.node() {
            Node::Link { continuation, .. } => continuation.as_ref(),
            _ => None,
        }
    }

    /// Iterate the contents of a chain's links in order. Anything other than a
    /// link yields nothing.
    pub fn elements(&self) -> Elements {
        Elements {
            next: self.is_list().then(|| self.clone()),
        }
    }

    /// Whether the node has sub-structure (is a chain link)
    pub fn is_list(&self) -> bool {
        matches!(self.node(), Node::Link { .. })
    }

    pub fn is_atom(&self) -> bool {
        matches!(self.node(), Node::Atom(_))
    }

    /// The single truthiness test: only the true sentinel counts. A literal
    /// `#t` atom is just an atom here.
    pub fn is_true(&self) -> bool {
        matches!(self.node(), Node::True)
    }

    /// The empty chain or a literal `#f`
    pub fn is_false_or_empty(&self) -> bool {
        match self.node() {
            Node::Nil => true,
            Node::Atom(label) => &**label == "#f",
            _ => false,
        }
    }

    /// Whether no data-bearing label is reachable from this node through
    /// `content` and `continuation`. Reserved labels (`quote`, `()`, `#f`, `#t`)
    /// do not count as data.
    pub fn is_empty_structure(&self) -> bool {
        let mut link = self.clone();
        loop {
            let next = match link.node() {
                Node::Atom(label) => return RESERVED_LABELS.contains(&&**label),
                Node::Nil | Node::True | Node::Unspecified => return true,
                Node::Link {
                    content,
                    continuation,
                } => {
                    if !content.is_empty_structure() {
                        return false;
                    }
                    match continuation {
                        Some(next) => next.clone(),
                        None => return true,
                    }
                }
            };
            link = next;
        }
    }

    /// The label of the leaf reached by repeatedly descending into `content`.
    /// For a bare atom this is its own label; for `((f x) y)` it is `f`.
    pub fn head_atom(&self) -> Option<&str> {
        let mut node = self;
        loop {
            match node.node() {
                Node::Atom(label) => return Some(&**label),
                Node::Link { content, .. } => node = content,
                _ => return None,
            }
        }
    }
}

impl std::ops::Deref for Handle {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

/// Iterator over the elements of a chain
pub struct Elements {
    next: Option<Handle>,
}

impl Iterator for Elements {
    type Item = Handle;

    fn next(&mut self) -> Option<Handle> {
        let link = self.next.take()?;
        let Node::Link {
            content,
            continuation,
        } = link.node()
        else {
            return None;
        };
        self.next = continuation.clone();
        Some(content.clone())
    }
}

impl Drop for Node {
    // Unlink uniquely owned continuations one by one so that dropping a long
    // chain does not recurse once per element.
    fn drop(&mut self) {
        let Node::Link { continuation, .. } = self else {
            return;
        };
        let mut next = continuation.take();
        while let Some(Handle(rc)) = next {
            next = match Rc::try_unwrap(rc) {
                Ok(mut node) => match &mut node {
                    Node::Link { continuation, .. } => continuation.take(),
                    _ => None,
                },
                Err(_) => None,
            };
        }
    }
}

impl From<&str> for Handle {
    fn from(s: &str) -> Self {
        Handle::atom(s)
    }
}

impl From<String> for Handle {
    fn from(s: String) -> Self {
        Handle::atom(s)
    }
}

impl From<bool> for Handle {
    fn from(b: bool) -> Self {
        Handle::boolean(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Handle {
            fn from(n: $int_type) -> Self {
                Handle::number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Handle>> From<Vec<T>> for Handle {
    fn from(v: Vec<T>) -> Self {
        Handle::list(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Handle>, const N: usize> From<[T; N]> for Handle {
    fn from(arr: [T; N]) -> Self {
        Handle::list(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper function for creating atoms - works great in mixed lists!
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Handle {
    Handle::atom(name)
}

/// Helper function for creating handles from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Handle>>(value: T) -> Handle {
    value.into()
}

/// Helper function for creating the empty chain
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Handle {
    Handle::nil()
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Nil => write!(f, "()"),
            Node::True => write!(f, "#t"),
            Node::Atom(label) => write!(f, "{label}"),
            Node::Unspecified => write!(f, "#<unspecified>"),
            Node::Link {
                content,
                continuation,
            } => {
                write!(f, "({content}")?;
                let mut next = continuation.as_ref();
                while let Some(link) = next {
                    match link.node() {
                        Node::Link {
                            content,
                            continuation,
                        } => {
                            write!(f, " {content}")?;
                            next = continuation.as_ref();
                        }
                        other => {
                            write!(f, " . {other}")?;
                            next = None;
                        }
                    }
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.node(), f)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Nil => write!(f, "Nil"),
            Node::True => write!(f, "True"),
            Node::Atom(label) => write!(f, "Atom({label})"),
            Node::Unspecified => write!(f, "Unspecified"),
            Node::Link { .. } => {
                write!(f, "Chain(")?;
                for (i, element) in self.elements().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element:?}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Structural equality: labels first, then `content`, then `continuation`,
/// with any difference in branch presence making the nodes unequal.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        let (mut a, mut b) = (self, other);
        loop {
            match (a, b) {
                (Node::Nil, Node::Nil) | (Node::True, Node::True) => return true,
                (Node::Atom(x), Node::Atom(y)) => return x == y,
                (
                    Node::Link {
                        content: c1,
                        continuation: n1,
                    },
                    Node::Link {
                        content: c2,
                        continuation: n2,
                    },
                ) => {
                    if c1 != c2 {
                        return false;
                    }
                    match (n1, n2) {
                        (Some(n1), Some(n2)) => {
                            a = n1.node();
                            b = n2.node();
                        }
                        (None, None) => return true,
                        _ => return false,
                    }
                }
                _ => return false, // Different variants, or Unspecified, never equal
            }
        }
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.node() == other.node()
    }
}
