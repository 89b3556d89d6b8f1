//! Mangled-name parser.
//!
//! Parses the compact entity grammar used by the metadata and symbol tables
//! into [`Node`] trees. The grammar is postfix: identifiers and leaf types
//! push operands, operator characters pop them and push combined nodes,
//! exactly like the reference demangler's operand stack.
//!
//! Supported productions (`<ident>` is a length-prefixed identifier):
//!
//! ```text
//! mangled     ::= ("$s" | "_$s") op*
//! module      ::= <ident> | "s"                    (s = the Swift module)
//! nominal     ::= ctx <ident> ("V"|"O"|"C"|"P"|"a")
//! extension   ::= nominal [signature] module "E"
//! variable    ::= ctx <ident> type "v" ("p"|"g"|"s"|"M"|"r")
//! subscript   ::= ctx type type "i" ("p"|"g"|"s")
//! function    ::= ctx <ident> type type "F"
//! static      ::= entity "Z"
//! allocator   ::= ctx type "fC"      constructor ::= ctx type "fc"
//! destructor  ::= ctx "fd"          deallocator ::= ctx "fD"
//! descriptor  ::= entity "Tq"       witness     ::= entity nominal protocol "TW"
//! merged      ::= entity "Tm"       opaque      ::= entity "Qr" "MQ"
//! type        ::= "y" | "S" known | nominal | type type "t"
//!               | type type "c" | type "Xw" | type "Sg"
//! requirement ::= type type ("Rs"|"Rc")
//! signature   ::= requirement+ "l"
//! private     ::= <ident> "LL"
//! operator fn ::= <ident> "o" ("i"|"p"|"P")
//! ```
//!
//! Unknown operators and malformed pops produce [`ResurfaceError::Demangle`];
//! the parser never panics on hostile input.

use super::node::{Node, NodeKind, NodeRef};
use crate::error::{ResurfaceError, Result};

/// The mangling prefix identifying a language symbol.
pub const MANGLING_PREFIX: &str = "$s";

/// Whether a raw symbol name carries the language's mangling prefix.
pub fn is_language_symbol(name: &str) -> bool
{
    name.starts_with(MANGLING_PREFIX) || name.strip_prefix('_').map(|rest| rest.starts_with(MANGLING_PREFIX)).unwrap_or(false)
}

/// Demangle a full symbol into a `global`-rooted tree.
pub fn demangle(name: &str) -> Result<NodeRef>
{
    let body = strip_prefix(name).ok_or_else(|| err(name, "missing mangling prefix"))?;
    let mut parser = Parser::new(name, body);
    parser.run()?;
    parser.finish_global()
}

/// Demangle a bare type mangling (no prefix), as found in metadata records.
///
/// Returns the single parsed operand: a nominal, a protocol, or a type
/// expression. A generic-signature mangling yields the signature node.
pub fn demangle_type(mangling: &str) -> Result<NodeRef>
{
    let mut parser = Parser::new(mangling, mangling);
    parser.run()?;
    parser.finish_single()
}

fn strip_prefix(name: &str) -> Option<&str>
{
    name.strip_prefix(MANGLING_PREFIX)
        .or_else(|| name.strip_prefix('_').and_then(|rest| rest.strip_prefix(MANGLING_PREFIX)))
}

fn err(symbol: &str, reason: impl Into<String>) -> ResurfaceError
{
    ResurfaceError::Demangle {
        symbol: symbol.to_string(),
        reason: reason.into(),
    }
}

struct Parser<'a>
{
    symbol: &'a str,
    input: &'a [u8],
    pos: usize,
    stack: Vec<NodeRef>,
}

impl<'a> Parser<'a>
{
    fn new(symbol: &'a str, body: &'a str) -> Self
    {
        Self {
            symbol,
            input: body.as_bytes(),
            pos: 0,
            stack: Vec::new(),
        }
    }

    fn error(&self, reason: impl Into<String>) -> ResurfaceError
    {
        err(self.symbol, reason)
    }

    fn peek(&self) -> Option<u8>
    {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8>
    {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn expect_next(&mut self, context: &str) -> Result<u8>
    {
        self.bump().ok_or_else(|| self.error(format!("truncated after {context}")))
    }

    fn pop(&mut self, context: &str) -> Result<NodeRef>
    {
        self.stack.pop().ok_or_else(|| self.error(format!("operand stack empty in {context}")))
    }

    /// Pop a context operand. A bare identifier in context position names a
    /// module (the leftmost component of every context chain), so it is
    /// rebuilt as a module node here.
    fn pop_context(&mut self, context: &str) -> Result<NodeRef>
    {
        let node = self.pop(context)?;
        match node.kind() {
            NodeKind::Module | NodeKind::Extension => Ok(node),
            kind if kind.is_nominal() => Ok(node),
            NodeKind::Identifier => Ok(Node::with_text(NodeKind::Module, node.text().unwrap_or_default())),
            other => Err(self.error(format!("{context}: expected context, found {other:?}"))),
        }
    }

    fn pop_name(&mut self, context: &str) -> Result<NodeRef>
    {
        let node = self.pop(context)?;
        match node.kind() {
            NodeKind::Identifier | NodeKind::PrivateDeclName | NodeKind::PrefixOperator | NodeKind::InfixOperator | NodeKind::PostfixOperator => Ok(node),
            other => Err(self.error(format!("{context}: expected name, found {other:?}"))),
        }
    }

    fn pop_type(&mut self, context: &str) -> Result<NodeRef>
    {
        let node = self.pop(context)?;
        let ok = node.kind().is_nominal()
            || matches!(
                node.kind(),
                NodeKind::Tuple | NodeKind::FunctionType | NodeKind::Weak | NodeKind::Type
            );
        if ok {
            Ok(node)
        } else {
            Err(self.error(format!("{context}: expected type, found {:?}", node.kind())))
        }
    }

    fn run(&mut self) -> Result<()>
    {
        while let Some(byte) = self.peek() {
            match byte {
                b'0'..=b'9' => {
                    let ident = self.parse_identifier()?;
                    self.stack.push(ident);
                }
                b's' => {
                    self.pos += 1;
                    self.stack.push(Node::with_text(NodeKind::Module, "Swift"));
                }
                b'S' => {
                    self.pos += 1;
                    self.parse_known_type()?;
                }
                b'V' => {
                    self.pos += 1;
                    self.nominal(NodeKind::Structure)?;
                }
                b'O' => {
                    self.pos += 1;
                    self.nominal(NodeKind::Enum)?;
                }
                b'C' => {
                    self.pos += 1;
                    self.nominal(NodeKind::Class)?;
                }
                b'P' => {
                    self.pos += 1;
                    self.nominal(NodeKind::Protocol)?;
                }
                b'a' => {
                    self.pos += 1;
                    self.nominal(NodeKind::TypeAlias)?;
                }
                b'E' => {
                    self.pos += 1;
                    self.extension()?;
                }
                b'F' => {
                    self.pos += 1;
                    self.function()?;
                }
                b'v' => {
                    self.pos += 1;
                    self.variable_entity()?;
                }
                b'i' => {
                    self.pos += 1;
                    self.subscript_entity()?;
                }
                b'f' => {
                    self.pos += 1;
                    self.init_family()?;
                }
                b'Z' => {
                    self.pos += 1;
                    let entity = self.pop("static")?;
                    self.stack.push(Node::new(NodeKind::Static, vec![entity]));
                }
                b'T' => {
                    self.pos += 1;
                    self.thunk_family()?;
                }
                b'M' => {
                    self.pos += 1;
                    match self.expect_next("M")? {
                        b'Q' => {
                            let inner = self.pop("opaque type descriptor")?;
                            self.stack.push(Node::new(NodeKind::OpaqueTypeDescriptor, vec![inner]));
                        }
                        other => return Err(self.error(format!("unknown operator M{}", other as char))),
                    }
                }
                b'Q' => {
                    self.pos += 1;
                    match self.expect_next("Q")? {
                        b'r' => {
                            let entity = self.pop("opaque return type")?;
                            self.stack.push(Node::new(NodeKind::OpaqueReturnTypeOf, vec![entity]));
                        }
                        other => return Err(self.error(format!("unknown operator Q{}", other as char))),
                    }
                }
                b'R' => {
                    self.pos += 1;
                    self.requirement()?;
                }
                b'l' => {
                    self.pos += 1;
                    self.generic_signature()?;
                }
                b'y' => {
                    self.pos += 1;
                    self.stack.push(Node::new(NodeKind::Tuple, Vec::new()));
                }
                b't' => {
                    self.pos += 1;
                    let second = self.pop_type("tuple")?;
                    let first = self.pop_type("tuple")?;
                    self.stack.push(Node::new(NodeKind::Tuple, vec![first, second]));
                }
                b'c' => {
                    self.pos += 1;
                    let ret = self.pop_type("function type")?;
                    let params = self.pop_type("function type")?;
                    self.stack.push(Node::new(NodeKind::FunctionType, vec![params, ret]));
                }
                b'X' => {
                    self.pos += 1;
                    match self.expect_next("X")? {
                        b'w' => {
                            let inner = self.pop_type("weak")?;
                            self.stack.push(Node::new(NodeKind::Weak, vec![inner]));
                        }
                        other => return Err(self.error(format!("unknown operator X{}", other as char))),
                    }
                }
                b'L' => {
                    self.pos += 1;
                    match self.expect_next("L")? {
                        b'L' => {
                            let ident = self.pop_name("private decl name")?;
                            self.stack.push(Node::new(NodeKind::PrivateDeclName, vec![ident]));
                        }
                        other => return Err(self.error(format!("unknown operator L{}", other as char))),
                    }
                }
                b'o' => {
                    self.pos += 1;
                    self.operator_name()?;
                }
                other => return Err(self.error(format!("unknown operator {}", other as char))),
            }
        }
        Ok(())
    }

    fn parse_identifier(&mut self) -> Result<NodeRef>
    {
        let mut len: usize = 0;
        while let Some(byte @ b'0'..=b'9') = self.peek() {
            len = len
                .checked_mul(10)
                .and_then(|v| v.checked_add((byte - b'0') as usize))
                .ok_or_else(|| self.error("identifier length overflow"))?;
            self.pos += 1;
        }
        if len == 0 {
            return Err(self.error("zero-length identifier"));
        }
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("identifier runs past end of input"))?;
        let text = std::str::from_utf8(&self.input[self.pos..end]).map_err(|_| self.error("identifier is not UTF-8"))?;
        self.pos = end;
        Ok(Node::with_text(NodeKind::Identifier, text))
    }

    fn nominal(&mut self, kind: NodeKind) -> Result<()>
    {
        let name = self.pop_name("nominal")?;
        let context = self.pop_context("nominal")?;
        self.stack.push(Node::new(kind, vec![context, name]));
        Ok(())
    }

    fn extension(&mut self) -> Result<()>
    {
        let module = match self.pop("extension")? {
            node if node.kind() == NodeKind::Module => node,
            node if node.kind() == NodeKind::Identifier => {
                Node::with_text(NodeKind::Module, node.text().unwrap_or_default())
            }
            node => {
                return Err(self.error(format!("extension: expected defining module, found {:?}", node.kind())));
            }
        };
        let signature = match self.stack.last() {
            Some(top) if top.kind() == NodeKind::DependentGenericSignature => Some(self.stack.pop().unwrap()),
            _ => None,
        };
        let extended = self.pop("extension")?;
        if !extended.kind().is_nominal() {
            return Err(self.error(format!("extension: expected extended nominal, found {:?}", extended.kind())));
        }
        let mut children = vec![module, extended];
        children.extend(signature);
        self.stack.push(Node::new(NodeKind::Extension, children));
        Ok(())
    }

    fn function(&mut self) -> Result<()>
    {
        let ret = self.pop_type("function")?;
        let params = self.pop_type("function")?;
        let name = self.pop_name("function")?;
        let context = self.pop_context("function")?;
        let signature = Node::new(NodeKind::Type, vec![Node::new(NodeKind::FunctionType, vec![params, ret])]);
        self.stack.push(Node::new(NodeKind::Function, vec![context, name, signature]));
        Ok(())
    }

    fn variable_entity(&mut self) -> Result<()>
    {
        let accessor = self.expect_next("v")?;
        let ty = self.pop_type("variable")?;
        let name = self.pop_name("variable")?;
        let context = self.pop_context("variable")?;
        let variable = Node::new(NodeKind::Variable, vec![context, name, ty]);
        let node = match accessor {
            b'p' => variable,
            b'g' => Node::new(NodeKind::Getter, vec![variable]),
            b's' => Node::new(NodeKind::Setter, vec![variable]),
            b'M' => Node::new(NodeKind::ModifyAccessor, vec![variable]),
            b'r' => Node::new(NodeKind::ReadAccessor, vec![variable]),
            other => return Err(self.error(format!("unknown accessor v{}", other as char))),
        };
        self.stack.push(node);
        Ok(())
    }

    fn subscript_entity(&mut self) -> Result<()>
    {
        let accessor = self.expect_next("i")?;
        let ret = self.pop_type("subscript")?;
        let params = self.pop_type("subscript")?;
        let context = self.pop_context("subscript")?;
        let signature = Node::new(NodeKind::Type, vec![Node::new(NodeKind::FunctionType, vec![params, ret])]);
        let subscript = Node::new(NodeKind::Subscript, vec![context, signature]);
        let node = match accessor {
            b'p' => subscript,
            b'g' => Node::new(NodeKind::Getter, vec![subscript]),
            b's' => Node::new(NodeKind::Setter, vec![subscript]),
            other => return Err(self.error(format!("unknown accessor i{}", other as char))),
        };
        self.stack.push(node);
        Ok(())
    }

    fn init_family(&mut self) -> Result<()>
    {
        match self.expect_next("f")? {
            b'C' => {
                let params = self.pop_type("allocator")?;
                let context = self.pop_context("allocator")?;
                self.stack.push(Node::new(NodeKind::Allocator, vec![context, params]));
            }
            b'c' => {
                let params = self.pop_type("constructor")?;
                let context = self.pop_context("constructor")?;
                self.stack.push(Node::new(NodeKind::Constructor, vec![context, params]));
            }
            b'd' => {
                let context = self.pop_context("destructor")?;
                self.stack.push(Node::new(NodeKind::Destructor, vec![context]));
            }
            b'D' => {
                let context = self.pop_context("deallocator")?;
                self.stack.push(Node::new(NodeKind::Deallocator, vec![context]));
            }
            other => return Err(self.error(format!("unknown operator f{}", other as char))),
        }
        Ok(())
    }

    fn thunk_family(&mut self) -> Result<()>
    {
        match self.expect_next("T")? {
            b'q' => {
                let entity = self.pop("method descriptor")?;
                self.stack.push(Node::new(NodeKind::MethodDescriptor, vec![entity]));
            }
            b'W' => {
                let protocol = self.pop("protocol witness")?;
                if protocol.kind() != NodeKind::Protocol {
                    return Err(self.error(format!("protocol witness: expected protocol, found {:?}", protocol.kind())));
                }
                let conforming = self.pop("protocol witness")?;
                if !conforming.kind().is_nominal() {
                    return Err(self.error(format!(
                        "protocol witness: expected conforming nominal, found {:?}",
                        conforming.kind()
                    )));
                }
                let entity = self.pop("protocol witness")?;
                let conformance = Node::new(
                    NodeKind::ProtocolConformance,
                    vec![Node::new(NodeKind::Type, vec![conforming]), protocol],
                );
                self.stack.push(Node::new(NodeKind::ProtocolWitness, vec![entity, conformance]));
            }
            b'm' => {
                let entity = self.pop("merged function")?;
                self.stack.push(Node::new(NodeKind::MergedFunction, Vec::new()));
                self.stack.push(entity);
            }
            other => return Err(self.error(format!("unknown operator T{}", other as char))),
        }
        Ok(())
    }

    fn parse_known_type(&mut self) -> Result<()>
    {
        let swift = || Node::with_text(NodeKind::Module, "Swift");
        let named = |name: &str| {
            Node::new(
                NodeKind::Structure,
                vec![Node::with_text(NodeKind::Module, "Swift"), Node::with_text(NodeKind::Identifier, name)],
            )
        };
        match self.expect_next("S")? {
            b'i' => self.stack.push(named("Int")),
            b'u' => self.stack.push(named("UInt")),
            b'S' => self.stack.push(named("String")),
            b'b' => self.stack.push(named("Bool")),
            b'd' => self.stack.push(named("Double")),
            b'f' => self.stack.push(named("Float")),
            b'g' => {
                let wrapped = self.pop_type("optional")?;
                self.stack.push(Node::new(
                    NodeKind::Structure,
                    vec![swift(), Node::with_text(NodeKind::Identifier, "Optional"), wrapped],
                ));
            }
            b'o' => self.stack.push(Node::with_text(NodeKind::Module, "__C")),
            other => return Err(self.error(format!("unknown known-type S{}", other as char))),
        }
        Ok(())
    }

    fn requirement(&mut self) -> Result<()>
    {
        let relation = match self.expect_next("R")? {
            b's' => "same-type",
            b'c' => "conformance",
            other => return Err(self.error(format!("unknown requirement R{}", other as char))),
        };
        let constraint = self.pop_type("requirement")?;
        let subject = self.pop_type("requirement")?;
        self.stack
            .push(Node::with_text_and_children(NodeKind::RequirementKinds, relation, vec![subject, constraint]));
        Ok(())
    }

    fn generic_signature(&mut self) -> Result<()>
    {
        let mut requirements = Vec::new();
        while matches!(self.stack.last().map(|n| n.kind()), Some(NodeKind::RequirementKinds)) {
            requirements.push(self.stack.pop().unwrap());
        }
        if requirements.is_empty() {
            return Err(self.error("generic signature with no requirements"));
        }
        requirements.reverse();
        self.stack.push(Node::new(NodeKind::DependentGenericSignature, requirements));
        Ok(())
    }

    fn operator_name(&mut self) -> Result<()>
    {
        let fixity = self.expect_next("o")?;
        let name = self.pop_name("operator")?;
        let text = name.text().unwrap_or_default().to_string();
        let node = match fixity {
            b'i' => Node::with_text(NodeKind::InfixOperator, text),
            b'p' => Node::with_text(NodeKind::PrefixOperator, text),
            b'P' => Node::with_text(NodeKind::PostfixOperator, text),
            other => return Err(self.error(format!("unknown operator fixity o{}", other as char))),
        };
        self.stack.push(node);
        Ok(())
    }

    fn finish_global(mut self) -> Result<NodeRef>
    {
        match self.stack.len() {
            0 => Err(self.error("empty mangling")),
            1 => {
                let payload = self.stack.pop().unwrap();
                Ok(Node::new(NodeKind::Global, vec![payload]))
            }
            2 if self.stack[0].kind() == NodeKind::MergedFunction => {
                let entity = self.stack.pop().unwrap();
                let merged = self.stack.pop().unwrap();
                Ok(Node::new(NodeKind::Global, vec![merged, entity]))
            }
            n => Err(self.error(format!("{n} unconsumed operands"))),
        }
    }

    fn finish_single(mut self) -> Result<NodeRef>
    {
        if self.stack.len() == 1 {
            Ok(self.stack.pop().unwrap())
        } else {
            Err(self.error(format!("expected a single operand, found {}", self.stack.len())))
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn rejects_unprefixed_symbols()
    {
        assert!(demangle("main").is_err());
        assert!(!is_language_symbol("main"));
        assert!(is_language_symbol("$s4main3FooV"));
        assert!(is_language_symbol("_$s4main3FooV"));
    }

    #[test]
    fn parses_stored_global_variable()
    {
        let root = demangle("$s4main9someValueSivp").unwrap();
        assert_eq!(root.kind(), NodeKind::Global);
        let variable = root.child(0).unwrap();
        assert_eq!(variable.kind(), NodeKind::Variable);
        assert_eq!(variable.child(0).unwrap().kind(), NodeKind::Module);
        assert_eq!(variable.child(1).unwrap().text(), Some("someValue"));
    }

    #[test]
    fn parses_member_function_in_extension()
    {
        let root = demangle("$s4main3FooV4mainE3bazyyF").unwrap();
        let function = root.child(0).unwrap();
        assert_eq!(function.kind(), NodeKind::Function);
        let extension = function.child(0).unwrap();
        assert_eq!(extension.kind(), NodeKind::Extension);
        assert_eq!(extension.child(1).unwrap().kind(), NodeKind::Structure);
    }

    #[test]
    fn parses_protocol_witness()
    {
        let root = demangle("$s4main3FooV3barSivg4main3FooV4main1PPTW").unwrap();
        let witness = root.child(0).unwrap();
        assert_eq!(witness.kind(), NodeKind::ProtocolWitness);
        assert_eq!(witness.child(0).unwrap().kind(), NodeKind::Getter);
        let conformance = witness.child(1).unwrap();
        assert_eq!(conformance.kind(), NodeKind::ProtocolConformance);
        assert_eq!(conformance.child(0).unwrap().kind(), NodeKind::Type);
        assert_eq!(conformance.child(1).unwrap().kind(), NodeKind::Protocol);
    }

    #[test]
    fn merged_function_keeps_marker_first()
    {
        let root = demangle("$s4main3fooyyFTm").unwrap();
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.child(0).unwrap().kind(), NodeKind::MergedFunction);
        assert_eq!(root.child(1).unwrap().kind(), NodeKind::Function);
    }

    #[test]
    fn truncated_input_is_an_error_not_a_panic()
    {
        assert!(demangle("$s4ma").is_err());
        assert!(demangle("$s4main3FooV3bar").is_err());
        assert!(demangle("$s0").is_err());
    }
}
