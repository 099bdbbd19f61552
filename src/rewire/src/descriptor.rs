//! Method descriptors
//!
//! A [`MethodDescriptor`] names a function by declaring type and member, the way a
//! reflection lookup would: binding flags narrow the search and an optional parameter
//! list picks one overload. Descriptors are plain data; turning one into a code address
//! is the job of a [`Reflection`](crate::resolve::Reflection) implementation.
//!
//! The shorthand text form is `Type::member`, `Type::member(Param1, Param2)` or
//! `Type::get Property` for a property getter. The declaring type may itself contain
//! `::`; the last separator splits off the member.

use crate::error::TableError;
use bitflags::bitflags;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Which members a lookup is allowed to see
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindingFlags: u32 {
        /// Static members
        const STATIC = 0x01;
        /// Instance members
        const INSTANCE = 0x02;
        /// Public members
        const PUBLIC = 0x04;
        /// Private, protected and internal members
        const NON_PUBLIC = 0x08;
    }
}

impl Default for BindingFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl BindingFlags {
    const SCOPE: Self = Self::STATIC.union(Self::INSTANCE);
    const VISIBILITY: Self = Self::PUBLIC.union(Self::NON_PUBLIC);

    /// Check whether a lookup with these flags can see a member declared with `member`
    ///
    /// The lookup must cover both the member's scope (static/instance) and its
    /// visibility (public/non-public).
    pub fn admits(self, member: BindingFlags) -> bool {
        self.intersects(member & Self::SCOPE) && self.intersects(member & Self::VISIBILITY)
    }

    /// Parse a list of flag names (`static`, `instance`, `public`, `non_public`)
    ///
    /// An empty list means "search everything".
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        if names.is_empty() {
            return Ok(Self::default());
        }

        let mut flags = Self::empty();
        for name in names {
            flags |= match name.as_ref().to_ascii_lowercase().replace('-', "_").as_str() {
                "static" => Self::STATIC,
                "instance" => Self::INSTANCE,
                "public" => Self::PUBLIC,
                "non_public" | "nonpublic" | "private" => Self::NON_PUBLIC,
                other => return Err(format!("unknown binding flag '{}'", other)),
            };
        }
        Ok(flags)
    }

    /// Flag names in canonical order
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Self::STATIC) {
            names.push("static");
        }
        if self.contains(Self::INSTANCE) {
            names.push("instance");
        }
        if self.contains(Self::PUBLIC) {
            names.push("public");
        }
        if self.contains(Self::NON_PUBLIC) {
            names.push("non_public");
        }
        names
    }
}

/// What kind of member a descriptor points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    #[default]
    Method,
    /// Property getter; resolves to the accessor `get_<Name>`
    Getter,
}

/// Identifies a function by declaring type and member name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "DescriptorRepr")]
pub struct MethodDescriptor {
    pub type_name: String,
    pub member: String,
    pub kind: MemberKind,
    pub flags: BindingFlags,
    /// Parameter type names selecting one overload; `None` accepts any
    pub parameters: Option<Vec<String>>,
}

impl MethodDescriptor {
    pub fn new(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            member: member.into(),
            kind: MemberKind::Method,
            flags: BindingFlags::default(),
            parameters: None,
        }
    }

    /// Descriptor for a property getter
    pub fn getter(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Getter,
            ..Self::new(type_name, property)
        }
    }

    pub fn with_flags(mut self, flags: BindingFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = Some(parameters.into_iter().map(Into::into).collect());
        self
    }

    /// The member name a lookup must match
    pub fn member_name(&self) -> String {
        match self.kind {
            MemberKind::Method => self.member.clone(),
            MemberKind::Getter => format!("get_{}", self.member),
        }
    }

    /// `Type.member`, the name recorded in the audit log
    ///
    /// Nested type paths are dotted too: `Verse::AI::Toils_Recipe` becomes
    /// `Verse.AI.Toils_Recipe`.
    pub fn qualified_name(&self) -> String {
        if self.type_name.is_empty() {
            self.member_name()
        } else {
            format!("{}.{}", self.type_name.replace("::", "."), self.member_name())
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())?;
        if let Some(params) = &self.parameters {
            write!(f, "({})", params.join(", "))?;
        }
        Ok(())
    }
}

impl FromStr for MethodDescriptor {
    type Err = TableError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TableError::Descriptor {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let (path, parameters) = match trimmed.find('(') {
            Some(open) => {
                let params = trimmed[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("unterminated parameter list"))?;
                (&trimmed[..open], Some(parse_parameters(params).map_err(|r| invalid(&r))?))
            }
            None => (trimmed, None),
        };

        let (type_name, member) = match path.rsplit_once("::") {
            Some((type_name, member)) => (type_name.trim(), member.trim()),
            None => ("", path.trim()),
        };

        let (kind, member) = match member.strip_prefix("get ") {
            Some(property) => (MemberKind::Getter, property.trim()),
            None => (MemberKind::Method, member),
        };

        if member.is_empty() {
            return Err(invalid("missing member name"));
        }
        if member.contains(char::is_whitespace) {
            return Err(invalid("member name contains whitespace"));
        }

        let mut descriptor = Self::new(type_name, member);
        descriptor.kind = kind;
        descriptor.parameters = parameters;
        Ok(descriptor)
    }
}

fn parse_parameters(list: &str) -> Result<Vec<String>, String> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|p| {
            let p = p.trim();
            if p.is_empty() {
                Err("empty parameter type".to_string())
            } else {
                Ok(p.to_string())
            }
        })
        .collect()
}

/// Accepted TOML shapes for a descriptor
#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorRepr {
    Short(String),
    Full {
        #[serde(rename = "type", default)]
        type_name: String,
        member: String,
        #[serde(default)]
        kind: MemberKind,
        #[serde(default)]
        flags: Vec<String>,
        #[serde(default)]
        parameters: Option<Vec<String>>,
    },
}

impl TryFrom<DescriptorRepr> for MethodDescriptor {
    type Error = TableError;

    fn try_from(repr: DescriptorRepr) -> Result<Self, Self::Error> {
        match repr {
            DescriptorRepr::Short(s) => s.parse(),
            DescriptorRepr::Full {
                type_name,
                member,
                kind,
                flags,
                parameters,
            } => {
                let flags = BindingFlags::from_names(&flags).map_err(|reason| {
                    TableError::Descriptor {
                        input: format!("{}::{}", type_name, member),
                        reason,
                    }
                })?;
                Ok(Self {
                    type_name,
                    member,
                    kind,
                    flags,
                    parameters,
                })
            }
        }
    }
}
