//! Route bindings and the plugin registration contract.

use std::fmt;
use std::str::FromStr;

use axum::http::Method;

use crate::rpc::MethodDescriptor;
use crate::schema::MessageDescriptor;

/// Number of verbs a leaf can bind.
pub const VERB_COUNT: usize = 5;

/// HTTP verbs a route can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpVerb {
    pub const ALL: [HttpVerb; VERB_COUNT] = [
        HttpVerb::Get,
        HttpVerb::Post,
        HttpVerb::Put,
        HttpVerb::Delete,
        HttpVerb::Patch,
    ];

    /// Slot index inside a leaf.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Delete => "DELETE",
            HttpVerb::Patch => "PATCH",
        }
    }

    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(HttpVerb::Get),
            Method::POST => Some(HttpVerb::Post),
            Method::PUT => Some(HttpVerb::Put),
            Method::DELETE => Some(HttpVerb::Delete),
            Method::PATCH => Some(HttpVerb::Patch),
            _ => None,
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpVerb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpVerb::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported HTTP verb '{s}'"))
    }
}

/// How the HTTP body maps onto the RPC input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySpec {
    /// `""`: no body allowed.
    None,
    /// `"*"`: the body is the whole input object.
    Whole,
    /// `"<field>"`: the body is the value of one named field.
    Field(String),
}

impl BodySpec {
    /// Parse the codegen string form.
    pub fn parse(spec: &str) -> Self {
        match spec {
            "" => BodySpec::None,
            "*" => BodySpec::Whole,
            field => BodySpec::Field(field.to_string()),
        }
    }
}

/// A (verb, path pattern) → RPC method association. Immutable once built.
#[derive(Debug, Clone)]
pub struct RouteBinding {
    pub method: MethodDescriptor,
    pub verb: HttpVerb,
    pub pattern: String,
    pub body: BodySpec,
}

impl RouteBinding {
    pub fn new(method: MethodDescriptor, verb: HttpVerb, pattern: impl Into<String>, body: &str) -> Self {
        Self {
            method,
            verb,
            pattern: pattern.into(),
            body: BodySpec::parse(body),
        }
    }

    pub fn service(&self) -> &str {
        &self.method.service
    }

    pub fn input(&self) -> Option<&MessageDescriptor> {
        self.method.input.as_ref()
    }

    pub fn output(&self) -> Option<&MessageDescriptor> {
        self.method.output.as_ref()
    }
}

/// A generated route table, in registration order.
pub type RouteTable = Vec<RouteBinding>;

/// A generated route table shipped by an extension.
///
/// Each plugin registers its table explicitly at startup (or later, on a
/// running gateway); unregistering by name removes its routes again.
pub trait RoutePlugin: Send + Sync {
    fn name(&self) -> &str;

    fn routes(&self) -> RouteTable;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_spec_parse() {
        assert_eq!(BodySpec::parse(""), BodySpec::None);
        assert_eq!(BodySpec::parse("*"), BodySpec::Whole);
        assert_eq!(BodySpec::parse("item"), BodySpec::Field("item".into()));
    }

    #[test]
    fn verb_from_method() {
        assert_eq!(HttpVerb::from_method(&Method::PATCH), Some(HttpVerb::Patch));
        assert_eq!(HttpVerb::from_method(&Method::HEAD), None);
        assert_eq!("delete".parse::<HttpVerb>(), Ok(HttpVerb::Delete));
        assert!("TRACE".parse::<HttpVerb>().is_err());
    }

    #[test]
    fn verb_slots_are_distinct() {
        let mut seen = [false; VERB_COUNT];
        for v in HttpVerb::ALL {
            assert!(!seen[v.index()]);
            seen[v.index()] = true;
        }
    }
}
