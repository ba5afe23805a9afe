//! Rust-facing method signatures.
use std::fmt;

/// A Rust type, as rendered in a stub signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RustType {
    Unit,
    Value,
    String,
    I64,
    F64,
    Bool,
    Bytes,
    Vec(Box<RustType>),
    Map(Box<RustType>),
    Option(Box<RustType>),
    /// A generated struct or enum.
    Named(String),
}

impl RustType {
    pub fn optional(self) -> Self {
        match self {
            RustType::Option(_) => self,
            other => RustType::Option(Box::new(other)),
        }
    }
}

impl fmt::Display for RustType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RustType::Unit => f.write_str("()"),
            RustType::Value => f.write_str("serde_json::Value"),
            RustType::String => f.write_str("String"),
            RustType::I64 => f.write_str("i64"),
            RustType::F64 => f.write_str("f64"),
            RustType::Bool => f.write_str("bool"),
            RustType::Bytes => f.write_str("Vec<u8>"),
            RustType::Vec(item) => write!(f, "Vec<{item}>"),
            RustType::Map(value) => write!(f, "HashMap<String, {value}>"),
            RustType::Option(inner) => write!(f, "Option<{inner}>"),
            RustType::Named(name) => f.write_str(name),
        }
    }
}

/// A parameter of a stub method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedParam {
    /// Rust identifier.
    pub ident: String,
    /// Name of the argument as the caller passes it, and as it is sent on the wire.
    pub name: String,
    pub ty: RustType,
}

/// The typed client method generated for an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<TypedParam>,
    pub result: RustType,
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "async fn {}(&self", self.name)?;
        for param in &self.params {
            write!(f, ", {}: {}", param.ident, param.ty)?;
        }
        write!(f, ") -> Result<{}, DispatchError>", self.result)
    }
}

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match", "mod",
    "move", "mut", "pub", "ref", "return", "static", "struct", "trait", "true", "try", "type",
    "unsafe", "use", "where", "while", "yield",
];

/// A snake_case identifier for an operation id or a parameter name.
///
/// gRPC operation ids (`package.Service/Method`) are named after their method.
pub fn snake_ident(name: &str) -> String {
    use cruet::*;

    let base = name.rsplit('/').next().unwrap_or(name);
    let ident = sanitize(&base.to_snake_case());
    escape(ident)
}

/// A PascalCase type name. Qualified protobuf names keep their last segment.
pub fn pascal_type(name: &str) -> String {
    use cruet::*;

    let base = name.rsplit('.').next().unwrap_or(name);
    sanitize(&base.to_pascal_case())
}

fn sanitize(ident: &str) -> String {
    let mut out: String = ident
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    match out.chars().next() {
        None => out.push('_'),
        Some(c) if c.is_ascii_digit() => out.insert(0, '_'),
        Some(_) => {}
    }
    out
}

fn escape(ident: String) -> String {
    match ident.as_str() {
        // These cannot be raw identifiers.
        "self" | "super" | "crate" | "Self" => format!("{ident}_"),
        _ if KEYWORDS.contains(&ident.as_str()) => format!("r#{ident}"),
        _ => ident,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(snake_ident("getVertex"), "get_vertex");
        assert_eq!(
            snake_ident("interactive.graph.v1.GraphService/ListVertices"),
            "list_vertices"
        );
    }

    #[test]
    fn test_keywords_are_escaped() {
        assert_eq!(snake_ident("type"), "r#type");
        assert_eq!(snake_ident("self"), "self_");
    }

    #[test]
    fn test_invalid_characters_are_replaced() {
        assert_eq!(snake_ident("X-Request-Id"), "x_request_id");
        assert_eq!(snake_ident("2hop"), "_2hop");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(pascal_type("interactive.graph.v1.Vertex"), "Vertex");
        assert_eq!(pascal_type("vertex_list"), "VertexList");
    }

    #[test]
    fn test_rust_type_rendering() {
        let ty = RustType::Map(Box::new(RustType::Vec(Box::new(RustType::I64)))).optional();
        assert_eq!(ty.to_string(), "Option<HashMap<String, Vec<i64>>>");
    }
}
