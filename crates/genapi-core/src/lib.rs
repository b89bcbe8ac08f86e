#![cfg_attr(docsrs, feature(doc_cfg))]
//! GenApi node graph: name-indexed feature nodes backed by device registers.
//!
//! A [`NodeMap`] is built once from a parsed [`genapi_xml::XmlModel`] and then
//! driven by a device-specific [`RegisterIo`] implementation for the lifetime
//! of a connection. Register-backed nodes cache their last value, keyed by a
//! fingerprint of the selector state that produced the address they were read
//! from, so repeated reads under an unchanged selector avoid a wire round
//! trip while a selector change always forces a fresh read. Each node also
//! carries a [`Cacheable`] policy (`NoCache`/`WriteThrough`/`WriteAround`)
//! and a list of invalidator feature names; writing a feature invalidates
//! the cache of every other feature that names it as an invalidator.

pub mod bitops;
pub mod expr;
pub mod swissknife;

use std::cell::RefCell;
use std::collections::HashMap;

use genapi_xml::{
    AccessMode, Addressing, BitField, Cacheable, EnumEntryDecl, EnumValueSrc, NodeDecl, XmlModel,
};
use thiserror::Error;
use tracing::trace;

pub use genapi_xml::Cacheable;
pub use swissknife::{Converter, Formula, SwissKnife, VariableBinding};

/// Error taxonomy shared by every GenApi operation.
#[derive(Debug, Error)]
pub enum GenApiError {
    /// No node with this name exists in the map.
    #[error("unknown feature: {0}")]
    UnknownFeature(String),
    /// The node exists but does not permit the requested operation.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// A value was outside the node's declared `Min`/`Max` range.
    #[error("value out of range: {0}")]
    OutOfRange(String),
    /// The caller passed a value of the wrong kind for this node, or an
    /// enumeration entry name that does not exist.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The underlying transport timed out.
    #[error("timeout: {0}")]
    Timeout(String),
    /// The device heartbeat has lapsed; the port no longer accepts requests.
    #[error("device not connected: {0}")]
    NotConnected(String),
    /// The transport reported a wire-level protocol failure.
    #[error("protocol error: {0}")]
    ProtocolError(String),
    /// A bounded resource (retry budget, buffer pool, ...) was exhausted.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// A register payload could not be decoded into the node's type.
    #[error("parse error: {0}")]
    ParseError(String),
}

impl From<bitops::BitOpsError> for GenApiError {
    fn from(err: bitops::BitOpsError) -> Self {
        GenApiError::ParseError(err.to_string())
    }
}

impl From<expr::EvalError> for GenApiError {
    fn from(err: expr::EvalError) -> Self {
        GenApiError::ParseError(err.to_string())
    }
}

/// Abstraction over a device's register space, implemented by each transport
/// (GVCP over UDP, USB3 Vision control over a bulk pipe, ...).
pub trait RegisterIo {
    /// Read `len` bytes starting at `addr`.
    fn read(&self, addr: u64, len: usize) -> Result<Vec<u8>, GenApiError>;
    /// Write `data` starting at `addr`.
    fn write(&self, addr: u64, data: &[u8]) -> Result<(), GenApiError>;
}

#[derive(Debug, Clone, Default)]
struct Cache<V> {
    value: Option<V>,
    fingerprint: Option<String>,
}

impl<V: Clone> Cache<V> {
    fn get(&self, fingerprint: &str) -> Option<V> {
        if self.fingerprint.as_deref() == Some(fingerprint) {
            self.value.clone()
        } else {
            None
        }
    }

    fn put(&mut self, fingerprint: String, value: V) {
        self.fingerprint = Some(fingerprint);
        self.value = Some(value);
    }

    fn invalidate(&mut self) {
        self.value = None;
        self.fingerprint = None;
    }
}

/// A single node in the feature graph.
#[derive(Debug, Clone)]
pub enum Node {
    Integer(IntegerNode),
    Float(FloatNode),
    Enum(EnumNode),
    Boolean(BooleanNode),
    Command(CommandNode),
    Category(CategoryNode),
}

impl Node {
    fn name(&self) -> &str {
        match self {
            Node::Integer(n) => &n.name,
            Node::Float(n) => &n.name,
            Node::Enum(n) => &n.name,
            Node::Boolean(n) => &n.name,
            Node::Command(n) => &n.name,
            Node::Category(n) => &n.name,
        }
    }
}

/// Integer feature backed by a register, optionally restricted to a bitfield.
#[derive(Debug, Clone)]
pub struct IntegerNode {
    pub name: String,
    pub addressing: Addressing,
    pub len: u32,
    pub access: AccessMode,
    pub min: i64,
    pub max: i64,
    pub inc: Option<i64>,
    pub unit: Option<String>,
    pub bitfield: Option<BitField>,
    pub selectors: Vec<String>,
    pub selected_if: Vec<(String, Vec<String>)>,
    pub cacheable: Cacheable,
    pub invalidators: Vec<String>,
    cache: RefCell<Cache<i64>>,
}

/// Floating point feature backed by an integer register plus scale/offset.
#[derive(Debug, Clone)]
pub struct FloatNode {
    pub name: String,
    pub addressing: Addressing,
    pub access: AccessMode,
    pub min: f64,
    pub max: f64,
    pub unit: Option<String>,
    pub scale: Option<(i64, i64)>,
    pub offset: Option<f64>,
    pub selectors: Vec<String>,
    pub selected_if: Vec<(String, Vec<String>)>,
    pub cacheable: Cacheable,
    pub invalidators: Vec<String>,
    cache: RefCell<Cache<f64>>,
}

/// Enumeration feature over a set of named integer entries.
#[derive(Debug, Clone)]
pub struct EnumNode {
    pub name: String,
    pub addressing: Addressing,
    pub access: AccessMode,
    pub entries: Vec<EnumEntryDecl>,
    pub default: Option<String>,
    pub selectors: Vec<String>,
    pub selected_if: Vec<(String, Vec<String>)>,
    pub cacheable: Cacheable,
    pub invalidators: Vec<String>,
    cache: RefCell<Cache<i64>>,
}

/// Boolean feature backed by a single bit within a register.
#[derive(Debug, Clone)]
pub struct BooleanNode {
    pub name: String,
    pub addressing: Addressing,
    pub len: u32,
    pub access: AccessMode,
    pub bitfield: BitField,
    pub selectors: Vec<String>,
    pub selected_if: Vec<(String, Vec<String>)>,
    pub cacheable: Cacheable,
    pub invalidators: Vec<String>,
    cache: RefCell<Cache<bool>>,
}

/// Command feature: writing any value to its register executes the command.
#[derive(Debug, Clone)]
pub struct CommandNode {
    pub name: String,
    pub address: u64,
    pub len: u32,
}

/// Category used purely to organise features into a tree for display.
#[derive(Debug, Clone)]
pub struct CategoryNode {
    pub name: String,
    pub children: Vec<String>,
}

/// The value conventionally written to a `Command` register to trigger
/// execution on the device.
const COMMAND_EXECUTE_VALUE: u64 = 1;

/// Name-indexed feature graph built from a parsed GenICam XML document.
#[derive(Debug, Default, Clone)]
pub struct NodeMap {
    nodes: HashMap<String, Node>,
}

impl NodeMap {
    /// Build a node map from a parsed XML model, converting every
    /// declaration into its corresponding graph node.
    pub fn from_xml_model(model: &XmlModel) -> Result<Self, GenApiError> {
        let mut map = NodeMap::default();
        for decl in &model.nodes {
            map.insert_decl(decl);
        }
        Ok(map)
    }

    fn insert_decl(&mut self, decl: &NodeDecl) {
        let node = match decl.clone() {
            NodeDecl::Integer {
                name,
                addressing,
                len,
                access,
                min,
                max,
                inc,
                unit,
                bitfield,
                selectors,
                selected_if,
                cacheable,
                invalidators,
            } => Node::Integer(IntegerNode {
                name,
                addressing,
                len,
                access,
                min,
                max,
                inc,
                unit,
                bitfield,
                selectors,
                selected_if,
                cacheable,
                invalidators,
                cache: RefCell::new(Cache::default()),
            }),
            NodeDecl::Float {
                name,
                addressing,
                access,
                min,
                max,
                unit,
                scale,
                offset,
                selectors,
                selected_if,
                cacheable,
                invalidators,
            } => Node::Float(FloatNode {
                name,
                addressing,
                access,
                min,
                max,
                unit,
                scale,
                offset,
                selectors,
                selected_if,
                cacheable,
                invalidators,
                cache: RefCell::new(Cache::default()),
            }),
            NodeDecl::Enum {
                name,
                addressing,
                access,
                entries,
                default,
                selectors,
                selected_if,
                cacheable,
                invalidators,
            } => Node::Enum(EnumNode {
                name,
                addressing,
                access,
                entries,
                default,
                selectors,
                selected_if,
                cacheable,
                invalidators,
                cache: RefCell::new(Cache::default()),
            }),
            NodeDecl::Boolean {
                name,
                addressing,
                len,
                access,
                bitfield,
                selectors,
                selected_if,
                cacheable,
                invalidators,
            } => Node::Boolean(BooleanNode {
                name,
                addressing,
                len,
                access,
                bitfield,
                selectors,
                selected_if,
                cacheable,
                invalidators,
                cache: RefCell::new(Cache::default()),
            }),
            NodeDecl::Command { name, address, len } => {
                Node::Command(CommandNode { name, address, len })
            }
            NodeDecl::Category { name, children } => {
                Node::Category(CategoryNode { name, children })
            }
        };
        self.nodes.insert(node.name().to_string(), node);
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Mutable lookup of a node by name.
    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    /// Insert or replace a node directly, bypassing XML interpretation.
    /// Used for graph nodes (`SwissKnife`, `Converter`, ...) assembled in
    /// code rather than declared in the schema.
    pub fn insert(&mut self, name: String, node: Node) {
        self.nodes.insert(name, node);
    }

    /// List the symbolic entry names of an enumeration feature.
    pub fn enum_entries(&self, name: &str) -> Result<Vec<String>, GenApiError> {
        match self.node(name) {
            Some(Node::Enum(e)) => Ok(e.entries.iter().map(|entry| entry.name.clone()).collect()),
            Some(_) => Err(GenApiError::InvalidArgument(format!("{name} is not an enumeration"))),
            None => Err(GenApiError::UnknownFeature(name.to_string())),
        }
    }

    fn resolve_selector_key<T: RegisterIo>(&self, selector: &str, io: &T) -> Result<String, GenApiError> {
        match self.node(selector) {
            Some(Node::Enum(_)) => self.get_enum(selector, io),
            Some(Node::Integer(_)) => Ok(self.get_integer(selector, io)?.to_string()),
            Some(_) => Err(GenApiError::InvalidArgument(format!(
                "{selector} cannot be used as a selector"
            ))),
            None => Err(GenApiError::UnknownFeature(selector.to_string())),
        }
    }

    fn resolve_address<T: RegisterIo>(
        &self,
        addressing: &Addressing,
        io: &T,
    ) -> Result<(u64, u32, String), GenApiError> {
        match addressing {
            Addressing::Fixed { address, len } => Ok((*address, *len, "fixed".to_string())),
            Addressing::BySelector { selector, map } => {
                let key = self.resolve_selector_key(selector, io)?;
                let (address, len) = map
                    .iter()
                    .find(|(entry, _)| entry == &key)
                    .map(|(_, addr)| *addr)
                    .ok_or_else(|| {
                        GenApiError::InvalidArgument(format!(
                            "selector {selector}={key} has no mapped address"
                        ))
                    })?;
                Ok((address, len, format!("{selector}={key}")))
            }
            Addressing::Indirect { p_address_node, len } => {
                let raw = self.get_integer(p_address_node, io)?;
                let address = u64::try_from(raw).map_err(|_| {
                    GenApiError::ProtocolError(format!("{p_address_node} resolved to a negative address"))
                })?;
                Ok((address, *len, format!("indirect:{p_address_node}={address}")))
            }
        }
    }

    fn check_read(access: AccessMode, name: &str) -> Result<(), GenApiError> {
        if access == AccessMode::WO {
            return Err(GenApiError::AccessDenied(format!("{name} is write-only")));
        }
        Ok(())
    }

    fn check_write(access: AccessMode, name: &str) -> Result<(), GenApiError> {
        if access == AccessMode::RO {
            return Err(GenApiError::AccessDenied(format!("{name} is read-only")));
        }
        Ok(())
    }

    fn decode_register(bytes: &[u8], bitfield: Option<BitField>) -> Result<u64, GenApiError> {
        match bitfield {
            Some(bf) => Ok(bitops::extract(bytes, bf)?),
            None => Ok(decode_be(bytes)),
        }
    }

    fn encode_register(
        current: &[u8],
        bitfield: Option<BitField>,
        value: u64,
    ) -> Result<Vec<u8>, GenApiError> {
        match bitfield {
            Some(bf) => {
                let mut buf = current.to_vec();
                bitops::insert(&mut buf, bf, value)?;
                Ok(buf)
            }
            None => Ok(encode_be(value, current.len())),
        }
    }

    /// Read an integer feature, resolving selector/indirect addressing and
    /// serving cached values when the selector state has not changed.
    pub fn get_integer<T: RegisterIo>(&self, name: &str, io: &T) -> Result<i64, GenApiError> {
        let node = self
            .node(name)
            .ok_or_else(|| GenApiError::UnknownFeature(name.to_string()))?;
        let Node::Integer(n) = node else {
            return Err(GenApiError::InvalidArgument(format!("{name} is not an integer")));
        };
        Self::check_read(n.access, name)?;
        let (address, len, fingerprint) = self.resolve_address(&n.addressing, io)?;
        if n.cacheable != Cacheable::NoCache {
            if let Some(cached) = n.cache.borrow().get(&fingerprint) {
                trace!(node = name, "integer cache hit");
                return Ok(cached);
            }
        }
        let bytes = io.read(address, len as usize)?;
        let raw = Self::decode_register(&bytes, n.bitfield)?;
        let value = raw as i64;
        if n.cacheable != Cacheable::NoCache {
            n.cache.borrow_mut().put(fingerprint, value);
        }
        Ok(value)
    }

    /// Write an integer feature, validating range and increment before the
    /// transport write, and refreshing the cache on success.
    pub fn set_integer<T: RegisterIo>(&self, name: &str, value: i64, io: &T) -> Result<(), GenApiError> {
        let node = self
            .node(name)
            .ok_or_else(|| GenApiError::UnknownFeature(name.to_string()))?;
        let Node::Integer(n) = node else {
            return Err(GenApiError::InvalidArgument(format!("{name} is not an integer")));
        };
        Self::check_write(n.access, name)?;
        if value < n.min || value > n.max {
            return Err(GenApiError::OutOfRange(format!(
                "{name}: {value} outside [{}, {}]",
                n.min, n.max
            )));
        }
        if let Some(inc) = n.inc {
            if inc > 0 && (value - n.min) % inc != 0 {
                return Err(GenApiError::OutOfRange(format!(
                    "{name}: {value} is not a multiple of increment {inc} from {}",
                    n.min
                )));
            }
        }
        let (address, len, fingerprint) = self.resolve_address(&n.addressing, io)?;
        let current = io.read(address, len as usize)?;
        let encoded = Self::encode_register(&current, n.bitfield, value as u64)?;
        io.write(address, &encoded)?;
        match n.cacheable {
            Cacheable::NoCache | Cacheable::WriteAround => n.cache.borrow_mut().invalidate(),
            Cacheable::WriteThrough => n.cache.borrow_mut().put(fingerprint, value),
        }
        self.invalidate_dependents(name);
        Ok(())
    }

    /// Read a float feature, applying the declared register-to-engineering
    /// scale and offset.
    pub fn get_float<T: RegisterIo>(&self, name: &str, io: &T) -> Result<f64, GenApiError> {
        let node = self
            .node(name)
            .ok_or_else(|| GenApiError::UnknownFeature(name.to_string()))?;
        let Node::Float(n) = node else {
            return Err(GenApiError::InvalidArgument(format!("{name} is not a float")));
        };
        Self::check_read(n.access, name)?;
        let (address, len, fingerprint) = self.resolve_address(&n.addressing, io)?;
        if n.cacheable != Cacheable::NoCache {
            if let Some(cached) = n.cache.borrow().get(&fingerprint) {
                trace!(node = name, "float cache hit");
                return Ok(cached);
            }
        }
        let bytes = io.read(address, len as usize)?;
        let raw = decode_be(&bytes) as i64;
        let mut value = raw as f64;
        if let Some((num, den)) = n.scale {
            if den == 0 {
                return Err(GenApiError::ParseError(format!("{name}: zero scale denominator")));
            }
            value = value * num as f64 / den as f64;
        }
        if let Some(offset) = n.offset {
            value += offset;
        }
        if n.cacheable != Cacheable::NoCache {
            n.cache.borrow_mut().put(fingerprint, value);
        }
        Ok(value)
    }

    /// Write a float feature, inverting the declared scale/offset before
    /// encoding the raw register value.
    pub fn set_float<T: RegisterIo>(&self, name: &str, value: f64, io: &T) -> Result<(), GenApiError> {
        let node = self
            .node(name)
            .ok_or_else(|| GenApiError::UnknownFeature(name.to_string()))?;
        let Node::Float(n) = node else {
            return Err(GenApiError::InvalidArgument(format!("{name} is not a float")));
        };
        Self::check_write(n.access, name)?;
        if value < n.min || value > n.max {
            return Err(GenApiError::OutOfRange(format!(
                "{name}: {value} outside [{}, {}]",
                n.min, n.max
            )));
        }
        let mut raw = value;
        if let Some(offset) = n.offset {
            raw -= offset;
        }
        if let Some((num, den)) = n.scale {
            if num == 0 {
                return Err(GenApiError::ParseError(format!("{name}: zero scale numerator")));
            }
            raw = raw * den as f64 / num as f64;
        }
        let (address, len, fingerprint) = self.resolve_address(&n.addressing, io)?;
        let encoded = encode_be(raw.round() as i64 as u64, len as usize);
        io.write(address, &encoded)?;
        match n.cacheable {
            Cacheable::NoCache | Cacheable::WriteAround => n.cache.borrow_mut().invalidate(),
            Cacheable::WriteThrough => n.cache.borrow_mut().put(fingerprint, value),
        }
        self.invalidate_dependents(name);
        Ok(())
    }

    /// Read an enumeration feature as its symbolic entry name.
    pub fn get_enum<T: RegisterIo>(&self, name: &str, io: &T) -> Result<String, GenApiError> {
        let node = self
            .node(name)
            .ok_or_else(|| GenApiError::UnknownFeature(name.to_string()))?;
        let Node::Enum(n) = node else {
            return Err(GenApiError::InvalidArgument(format!("{name} is not an enumeration")));
        };
        Self::check_read(n.access, name)?;
        let (address, len, fingerprint) = self.resolve_address(&n.addressing, io)?;
        let cached = if n.cacheable != Cacheable::NoCache {
            n.cache.borrow().get(&fingerprint)
        } else {
            None
        };
        let raw = if let Some(cached) = cached {
            cached
        } else {
            let bytes = io.read(address, len as usize)?;
            let value = decode_be(&bytes) as i64;
            if n.cacheable != Cacheable::NoCache {
                n.cache.borrow_mut().put(fingerprint, value);
            }
            value
        };
        for entry in &n.entries {
            if self.entry_matches(entry, raw, io)? {
                return Ok(entry.name.clone());
            }
        }
        Err(GenApiError::ParseError(format!(
            "{name}: register value {raw} does not match any enumeration entry"
        )))
    }

    /// Write an enumeration feature by symbolic entry name.
    pub fn set_enum<T: RegisterIo>(&self, name: &str, entry_name: &str, io: &T) -> Result<(), GenApiError> {
        let node = self
            .node(name)
            .ok_or_else(|| GenApiError::UnknownFeature(name.to_string()))?;
        let Node::Enum(n) = node else {
            return Err(GenApiError::InvalidArgument(format!("{name} is not an enumeration")));
        };
        Self::check_write(n.access, name)?;
        let entry = n
            .entries
            .iter()
            .find(|e| e.name == entry_name)
            .ok_or_else(|| {
                GenApiError::InvalidArgument(format!("{name} has no entry named {entry_name}"))
            })?;
        let raw = self.entry_value(entry, io)?;
        let (address, len, fingerprint) = self.resolve_address(&n.addressing, io)?;
        let encoded = encode_be(raw as u64, len as usize);
        io.write(address, &encoded)?;
        match n.cacheable {
            Cacheable::NoCache | Cacheable::WriteAround => n.cache.borrow_mut().invalidate(),
            Cacheable::WriteThrough => n.cache.borrow_mut().put(fingerprint, raw),
        }
        self.invalidate_dependents(name);
        Ok(())
    }

    fn entry_value<T: RegisterIo>(&self, entry: &EnumEntryDecl, io: &T) -> Result<i64, GenApiError> {
        match &entry.value {
            EnumValueSrc::Literal(v) => Ok(*v),
            EnumValueSrc::FromNode(node) => self.get_integer(node, io),
        }
    }

    fn entry_matches<T: RegisterIo>(&self, entry: &EnumEntryDecl, raw: i64, io: &T) -> Result<bool, GenApiError> {
        Ok(self.entry_value(entry, io)? == raw)
    }

    /// Read a boolean feature.
    pub fn get_bool<T: RegisterIo>(&self, name: &str, io: &T) -> Result<bool, GenApiError> {
        let node = self
            .node(name)
            .ok_or_else(|| GenApiError::UnknownFeature(name.to_string()))?;
        let Node::Boolean(n) = node else {
            return Err(GenApiError::InvalidArgument(format!("{name} is not a boolean")));
        };
        Self::check_read(n.access, name)?;
        let (address, len, fingerprint) = self.resolve_address(&n.addressing, io)?;
        if n.cacheable != Cacheable::NoCache {
            if let Some(cached) = n.cache.borrow().get(&fingerprint) {
                return Ok(cached);
            }
        }
        let bytes = io.read(address, len as usize)?;
        let raw = bitops::extract(&bytes, n.bitfield)?;
        let value = raw != 0;
        if n.cacheable != Cacheable::NoCache {
            n.cache.borrow_mut().put(fingerprint, value);
        }
        Ok(value)
    }

    /// Write a boolean feature.
    pub fn set_bool<T: RegisterIo>(&self, name: &str, value: bool, io: &T) -> Result<(), GenApiError> {
        let node = self
            .node(name)
            .ok_or_else(|| GenApiError::UnknownFeature(name.to_string()))?;
        let Node::Boolean(n) = node else {
            return Err(GenApiError::InvalidArgument(format!("{name} is not a boolean")));
        };
        Self::check_write(n.access, name)?;
        let (address, len, fingerprint) = self.resolve_address(&n.addressing, io)?;
        let mut current = io.read(address, len as usize)?;
        bitops::insert(&mut current, n.bitfield, value as u64)?;
        io.write(address, &current)?;
        match n.cacheable {
            Cacheable::NoCache | Cacheable::WriteAround => n.cache.borrow_mut().invalidate(),
            Cacheable::WriteThrough => n.cache.borrow_mut().put(fingerprint, value),
        }
        self.invalidate_dependents(name);
        Ok(())
    }

    /// Execute a command feature by writing the conventional execute value
    /// to its register.
    pub fn exec_command<T: RegisterIo>(&self, name: &str, io: &T) -> Result<(), GenApiError> {
        let node = self
            .node(name)
            .ok_or_else(|| GenApiError::UnknownFeature(name.to_string()))?;
        let Node::Command(n) = node else {
            return Err(GenApiError::InvalidArgument(format!("{name} is not a command")));
        };
        let encoded = encode_be(COMMAND_EXECUTE_VALUE, n.len as usize);
        io.write(n.address, &encoded)?;
        self.invalidate_dependents(name);
        Ok(())
    }

    /// Invalidate the cache of every node that declares `written` as one of
    /// its invalidators, per the cache coherence invariant: after writing a
    /// feature, any feature naming it as an invalidator must be freshly
    /// fetched on its next read rather than served from cache.
    fn invalidate_dependents(&self, written: &str) {
        for node in self.nodes.values() {
            let invalidated = match node {
                Node::Integer(n) => n.invalidators.iter().any(|dep| dep == written),
                Node::Float(n) => n.invalidators.iter().any(|dep| dep == written),
                Node::Enum(n) => n.invalidators.iter().any(|dep| dep == written),
                Node::Boolean(n) => n.invalidators.iter().any(|dep| dep == written),
                Node::Command(_) | Node::Category(_) => false,
            };
            if !invalidated {
                continue;
            }
            match node {
                Node::Integer(n) => n.cache.borrow_mut().invalidate(),
                Node::Float(n) => n.cache.borrow_mut().invalidate(),
                Node::Enum(n) => n.cache.borrow_mut().invalidate(),
                Node::Boolean(n) => n.cache.borrow_mut().invalidate(),
                Node::Command(_) | Node::Category(_) => {}
            }
            trace!(written, node = node.name(), "cache invalidated by dependency write");
        }
    }
}

fn decode_be(bytes: &[u8]) -> u64 {
    let mut value = 0u64;
    for byte in bytes {
        value = (value << 8) | *byte as u64;
    }
    value
}

fn encode_be(value: u64, len: usize) -> Vec<u8> {
    let full = value.to_be_bytes();
    full[8 - len.min(8)..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRegisters {
        bytes: RefCell<HashMap<u64, Vec<u8>>>,
    }

    impl FakeRegisters {
        fn new() -> Self {
            FakeRegisters { bytes: RefCell::new(HashMap::new()) }
        }

        fn seed(&self, addr: u64, value: &[u8]) {
            self.bytes.borrow_mut().insert(addr, value.to_vec());
        }
    }

    impl RegisterIo for FakeRegisters {
        fn read(&self, addr: u64, len: usize) -> Result<Vec<u8>, GenApiError> {
            Ok(self
                .bytes
                .borrow()
                .get(&addr)
                .cloned()
                .unwrap_or_else(|| vec![0u8; len]))
        }

        fn write(&self, addr: u64, data: &[u8]) -> Result<(), GenApiError> {
            self.bytes.borrow_mut().insert(addr, data.to_vec());
            Ok(())
        }
    }

    fn integer_node(name: &str, address: u64) -> NodeDecl {
        NodeDecl::Integer {
            name: name.to_string(),
            addressing: Addressing::Fixed { address, len: 4 },
            len: 4,
            access: AccessMode::RW,
            min: 0,
            max: 10_000,
            inc: None,
            unit: None,
            bitfield: None,
            selectors: Vec::new(),
            selected_if: Vec::new(),
            cacheable: Cacheable::default(),
            invalidators: Vec::new(),
        }
    }

    #[test]
    fn roundtrips_integer_through_fake_registers() {
        let model = XmlModel {
            version: "1.0".into(),
            nodes: vec![integer_node("Width", 0x1000)],
        };
        let map = NodeMap::from_xml_model(&model).expect("build map");
        let io = FakeRegisters::new();
        map.set_integer("Width", 1920, &io).expect("set");
        assert_eq!(map.get_integer("Width", &io).expect("get"), 1920);
    }

    #[test]
    fn rejects_out_of_range_integer() {
        let model = XmlModel { version: "1.0".into(), nodes: vec![integer_node("Width", 0x1000)] };
        let map = NodeMap::from_xml_model(&model).expect("build map");
        let io = FakeRegisters::new();
        let err = map.set_integer("Width", 99_999, &io).unwrap_err();
        assert!(matches!(err, GenApiError::OutOfRange(_)));
    }

    #[test]
    fn write_only_node_rejects_reads() {
        let model = XmlModel {
            version: "1.0".into(),
            nodes: vec![NodeDecl::Integer {
                name: "Trigger".into(),
                addressing: Addressing::Fixed { address: 0x2000, len: 4 },
                len: 4,
                access: AccessMode::WO,
                min: 0,
                max: 1,
                inc: None,
                unit: None,
                bitfield: None,
                selectors: Vec::new(),
                selected_if: Vec::new(),
                cacheable: Cacheable::default(),
                invalidators: Vec::new(),
            }],
        };
        let map = NodeMap::from_xml_model(&model).expect("build map");
        let io = FakeRegisters::new();
        let err = map.get_integer("Trigger", &io).unwrap_err();
        assert!(matches!(err, GenApiError::AccessDenied(_)));
    }

    #[test]
    fn selector_addressing_switches_register_block() {
        let model = XmlModel {
            version: "1.0".into(),
            nodes: vec![
                NodeDecl::Enum {
                    name: "Source".into(),
                    addressing: Addressing::Fixed { address: 0x3000, len: 4 },
                    access: AccessMode::RW,
                    entries: vec![
                        EnumEntryDecl { name: "A".into(), value: EnumValueSrc::Literal(0), display_name: None },
                        EnumEntryDecl { name: "B".into(), value: EnumValueSrc::Literal(1), display_name: None },
                    ],
                    default: Some("A".into()),
                    selectors: Vec::new(),
                    selected_if: Vec::new(),
                    cacheable: Cacheable::default(),
                    invalidators: Vec::new(),
                },
                NodeDecl::Integer {
                    name: "Gain".into(),
                    addressing: Addressing::BySelector {
                        selector: "Source".into(),
                        map: vec![("A".into(), (0x4000, 4)), ("B".into(), (0x4004, 4))],
                    },
                    len: 4,
                    access: AccessMode::RW,
                    min: 0,
                    max: 100,
                    inc: None,
                    unit: None,
                    bitfield: None,
                    selectors: Vec::new(),
                    selected_if: Vec::new(),
                    cacheable: Cacheable::default(),
                    invalidators: Vec::new(),
                },
            ],
        };
        let map = NodeMap::from_xml_model(&model).expect("build map");
        let io = FakeRegisters::new();
        map.set_enum("Source", "A", &io).expect("select A");
        map.set_integer("Gain", 10, &io).expect("set gain A");
        map.set_enum("Source", "B", &io).expect("select B");
        map.set_integer("Gain", 20, &io).expect("set gain B");
        map.set_enum("Source", "A", &io).expect("select A again");
        assert_eq!(map.get_integer("Gain", &io).expect("get gain A"), 10);
    }

    #[test]
    fn float_applies_scale_and_offset() {
        let model = XmlModel {
            version: "1.0".into(),
            nodes: vec![NodeDecl::Float {
                name: "ExposureTime".into(),
                addressing: Addressing::Fixed { address: 0x5000, len: 4 },
                access: AccessMode::RW,
                min: 0.0,
                max: 1_000_000.0,
                unit: Some("us".into()),
                scale: Some((1, 10)),
                offset: Some(5.0),
                selectors: Vec::new(),
                selected_if: Vec::new(),
                cacheable: Cacheable::default(),
                invalidators: Vec::new(),
            }],
        };
        let map = NodeMap::from_xml_model(&model).expect("build map");
        let io = FakeRegisters::new();
        io.seed(0x5000, &100u32.to_be_bytes());
        let value = map.get_float("ExposureTime", &io).expect("get");
        assert!((value - 15.0).abs() < 1e-9);
    }

    #[test]
    fn enum_from_node_resolves_dynamic_value() {
        let model = XmlModel {
            version: "1.0".into(),
            nodes: vec![
                integer_node("DynamicCode", 0x6000),
                NodeDecl::Enum {
                    name: "Mode".into(),
                    addressing: Addressing::Fixed { address: 0x6004, len: 4 },
                    access: AccessMode::RW,
                    entries: vec![EnumEntryDecl {
                        name: "Dynamic".into(),
                        value: EnumValueSrc::FromNode("DynamicCode".into()),
                        display_name: None,
                    }],
                    default: None,
                    selectors: Vec::new(),
                    selected_if: Vec::new(),
                    cacheable: Cacheable::default(),
                    invalidators: Vec::new(),
                },
            ],
        };
        let map = NodeMap::from_xml_model(&model).expect("build map");
        let io = FakeRegisters::new();
        map.set_integer("DynamicCode", 42, &io).expect("set code");
        map.set_enum("Mode", "Dynamic", &io).expect("set enum");
        assert_eq!(map.get_enum("Mode", &io).expect("get enum"), "Dynamic");
    }

    #[test]
    fn exec_command_writes_execute_value() {
        let model = XmlModel {
            version: "1.0".into(),
            nodes: vec![NodeDecl::Command { name: "AcquisitionStart".into(), address: 0x7000, len: 4 }],
        };
        let map = NodeMap::from_xml_model(&model).expect("build map");
        let io = FakeRegisters::new();
        map.exec_command("AcquisitionStart", &io).expect("exec");
        assert_eq!(io.read(0x7000, 4).unwrap(), 1u32.to_be_bytes().to_vec());
    }

    #[test]
    fn write_invalidates_dependent_feature_cache() {
        let model = XmlModel {
            version: "1.0".into(),
            nodes: vec![
                NodeDecl::Integer {
                    name: "FeatureA".into(),
                    addressing: Addressing::Fixed { address: 0x8000, len: 4 },
                    len: 4,
                    access: AccessMode::RW,
                    min: 0,
                    max: 100,
                    inc: None,
                    unit: None,
                    bitfield: None,
                    selectors: Vec::new(),
                    selected_if: Vec::new(),
                    cacheable: Cacheable::WriteThrough,
                    invalidators: vec!["FeatureB".into()],
                },
                NodeDecl::Integer {
                    name: "FeatureB".into(),
                    addressing: Addressing::Fixed { address: 0x8004, len: 4 },
                    len: 4,
                    access: AccessMode::RW,
                    min: 0,
                    max: 100,
                    inc: None,
                    unit: None,
                    bitfield: None,
                    selectors: Vec::new(),
                    selected_if: Vec::new(),
                    cacheable: Cacheable::default(),
                    invalidators: Vec::new(),
                },
            ],
        };
        let map = NodeMap::from_xml_model(&model).expect("build map");
        let io = FakeRegisters::new();
        io.seed(0x8000, &10u32.to_be_bytes());
        assert_eq!(map.get_integer("FeatureA", &io).expect("first read"), 10);
        // The device-side register changes underneath the cache; a cached
        // read would still observe the stale value.
        io.seed(0x8000, &20u32.to_be_bytes());
        assert_eq!(map.get_integer("FeatureA", &io).expect("cached read"), 10);
        map.set_integer("FeatureB", 5, &io).expect("write invalidator");
        assert_eq!(
            map.get_integer("FeatureA", &io).expect("post-invalidation read"),
            20
        );
    }

    #[test]
    fn nocache_policy_never_serves_stale_value() {
        let model = XmlModel {
            version: "1.0".into(),
            nodes: vec![NodeDecl::Integer {
                name: "Live".into(),
                addressing: Addressing::Fixed { address: 0x9000, len: 4 },
                len: 4,
                access: AccessMode::RW,
                min: 0,
                max: 1000,
                inc: None,
                unit: None,
                bitfield: None,
                selectors: Vec::new(),
                selected_if: Vec::new(),
                cacheable: Cacheable::NoCache,
                invalidators: Vec::new(),
            }],
        };
        let map = NodeMap::from_xml_model(&model).expect("build map");
        let io = FakeRegisters::new();
        io.seed(0x9000, &1u32.to_be_bytes());
        assert_eq!(map.get_integer("Live", &io).expect("first read"), 1);
        io.seed(0x9000, &2u32.to_be_bytes());
        assert_eq!(map.get_integer("Live", &io).expect("second read"), 2);
    }

    #[test]
    fn unknown_feature_is_an_error() {
        let map = NodeMap::default();
        let io = FakeRegisters::new();
        let err = map.get_integer("DoesNotExist", &io).unwrap_err();
        assert!(matches!(err, GenApiError::UnknownFeature(_)));
    }
}
