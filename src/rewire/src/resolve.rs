//! Method resolution
//!
//! A [`Reflection`] implementation turns a [`MethodDescriptor`] into a tagged
//! [`Resolution`]. Only `Resolution::Resolved` carries an address, so nothing
//! downstream can write through an address that was never found.

use crate::descriptor::{BindingFlags, MethodDescriptor};
use std::collections::HashMap;
use std::sync::RwLock;

/// A descriptor whose native entry point is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMethod {
    pub descriptor: MethodDescriptor,
    /// Address of the first instruction of the method body
    pub entry: usize,
}

/// Outcome of resolving a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedMethod),
    /// Declaring type or member does not exist, or the lookup was ambiguous
    NotFound {
        descriptor: MethodDescriptor,
        reason: String,
    },
    /// The member exists but has no native code yet
    NotYetCompiled { descriptor: MethodDescriptor },
}

impl Resolution {
    pub fn resolved(descriptor: MethodDescriptor, entry: usize) -> Self {
        Resolution::Resolved(ResolvedMethod { descriptor, entry })
    }

    pub fn not_found(descriptor: MethodDescriptor, reason: impl Into<String>) -> Self {
        Resolution::NotFound {
            descriptor,
            reason: reason.into(),
        }
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        match self {
            Resolution::Resolved(m) => &m.descriptor,
            Resolution::NotFound { descriptor, .. } => descriptor,
            Resolution::NotYetCompiled { descriptor } => descriptor,
        }
    }

    pub fn entry(&self) -> Option<usize> {
        match self {
            Resolution::Resolved(m) => Some(m.entry),
            _ => None,
        }
    }

    /// Human-readable reason this resolution has no address, if any
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Resolution::Resolved(_) => None,
            Resolution::NotFound { reason, .. } => Some(reason.clone()),
            Resolution::NotYetCompiled { .. } => Some("method has not been compiled yet".into()),
        }
    }
}

/// Looks up methods by descriptor
pub trait Reflection {
    fn resolve(&self, descriptor: &MethodDescriptor) -> Resolution;
}

impl<R: Reflection + ?Sized> Reflection for &R {
    fn resolve(&self, descriptor: &MethodDescriptor) -> Resolution {
        (**self).resolve(descriptor)
    }
}

/// One registered member of a [`MethodTable`]
#[derive(Debug, Clone)]
struct MethodEntry {
    flags: BindingFlags,
    parameters: Vec<String>,
    entry: Option<usize>,
}

/// In-process method registry
///
/// Types and members are registered with their binding flags, parameter types and,
/// once compiled, their entry address. Lookups follow reflection rules: the
/// descriptor's flags must admit the member, a parameter list picks an overload, and
/// an ambiguous lookup without one is reported as not found.
#[derive(Debug, Default)]
pub struct MethodTable {
    methods: RwLock<HashMap<(String, String), Vec<MethodEntry>>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled member
    pub fn register(
        &self,
        type_name: &str,
        member: &str,
        flags: BindingFlags,
        parameters: &[&str],
        entry: usize,
    ) {
        self.insert(type_name, member, flags, parameters, Some(entry));
    }

    /// Register a member whose code does not exist yet
    pub fn register_pending(
        &self,
        type_name: &str,
        member: &str,
        flags: BindingFlags,
        parameters: &[&str],
    ) {
        self.insert(type_name, member, flags, parameters, None);
    }

    /// Supply the entry address of a previously pending member
    ///
    /// Returns false when no member with these parameters is registered.
    pub fn mark_compiled(
        &self,
        type_name: &str,
        member: &str,
        parameters: &[&str],
        entry: usize,
    ) -> bool {
        let mut methods = self.methods.write().unwrap_or_else(|e| e.into_inner());
        let Some(overloads) = methods.get_mut(&(type_name.to_string(), member.to_string())) else {
            return false;
        };
        match overloads.iter_mut().find(|m| m.parameters == parameters) {
            Some(m) => {
                m.entry = Some(entry);
                true
            }
            None => false,
        }
    }

    /// Number of registered members (all overloads)
    pub fn len(&self) -> usize {
        self.methods
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(
        &self,
        type_name: &str,
        member: &str,
        flags: BindingFlags,
        parameters: &[&str],
        entry: Option<usize>,
    ) {
        let parameters: Vec<String> = parameters.iter().map(|p| p.to_string()).collect();
        let mut methods = self.methods.write().unwrap_or_else(|e| e.into_inner());
        let overloads = methods
            .entry((type_name.to_string(), member.to_string()))
            .or_default();

        // Re-registering an overload replaces it
        overloads.retain(|m| m.parameters != parameters);
        overloads.push(MethodEntry {
            flags,
            parameters,
            entry,
        });
    }
}

impl Reflection for MethodTable {
    fn resolve(&self, descriptor: &MethodDescriptor) -> Resolution {
        let methods = self.methods.read().unwrap_or_else(|e| e.into_inner());
        let key = (descriptor.type_name.clone(), descriptor.member_name());

        let Some(overloads) = methods.get(&key) else {
            let type_known = methods.keys().any(|(t, _)| *t == descriptor.type_name);
            let reason = if type_known {
                format!("no member '{}'", key.1)
            } else {
                format!("type '{}' not found", descriptor.type_name)
            };
            return Resolution::not_found(descriptor.clone(), reason);
        };

        let candidates: Vec<&MethodEntry> = overloads
            .iter()
            .filter(|m| descriptor.flags.admits(m.flags))
            .filter(|m| match &descriptor.parameters {
                Some(params) => *params == m.parameters,
                None => true,
            })
            .collect();

        match candidates.as_slice() {
            [] => Resolution::not_found(
                descriptor.clone(),
                "no overload matches the binding flags and parameters",
            ),
            [method] => match method.entry {
                Some(entry) => Resolution::resolved(descriptor.clone(), entry),
                None => Resolution::NotYetCompiled {
                    descriptor: descriptor.clone(),
                },
            },
            _ => Resolution::not_found(
                descriptor.clone(),
                format!("ambiguous match among {} overloads", candidates.len()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATIC_PUBLIC: BindingFlags = BindingFlags::STATIC.union(BindingFlags::PUBLIC);
    const INSTANCE_PRIVATE: BindingFlags = BindingFlags::INSTANCE.union(BindingFlags::NON_PUBLIC);

    fn sample_table() -> MethodTable {
        let table = MethodTable::new();
        table.register("GameEnder", "CheckGameOver", STATIC_PUBLIC, &[], 0x1000);
        table.register("ThingContainer", "TryDrop", STATIC_PUBLIC, &["Thing"], 0x2000);
        table.register(
            "ThingContainer",
            "TryDrop",
            STATIC_PUBLIC,
            &["Thing", "IntVec3"],
            0x2100,
        );
        table.register("Pawn", "get_Goods", INSTANCE_PRIVATE, &[], 0x3000);
        table.register_pending("Lord", "Notify_PawnTookDamage", STATIC_PUBLIC, &[]);
        table
    }

    #[test]
    fn test_resolve_simple() {
        let table = sample_table();
        let r = table.resolve(&MethodDescriptor::new("GameEnder", "CheckGameOver"));
        assert_eq!(r.entry(), Some(0x1000));
        assert!(r.failure_reason().is_none());
    }

    #[test]
    fn test_resolve_missing_type_and_member() {
        let table = sample_table();

        let r = table.resolve(&MethodDescriptor::new("Nope", "CheckGameOver"));
        assert!(matches!(&r, Resolution::NotFound { reason, .. } if reason.contains("type 'Nope'")));

        let r = table.resolve(&MethodDescriptor::new("GameEnder", "Nope"));
        assert!(matches!(&r, Resolution::NotFound { reason, .. } if reason.contains("no member")));
    }

    #[test]
    fn test_resolve_overloads() {
        let table = sample_table();

        let ambiguous = table.resolve(&MethodDescriptor::new("ThingContainer", "TryDrop"));
        assert!(
            matches!(&ambiguous, Resolution::NotFound { reason, .. } if reason.contains("ambiguous"))
        );

        let picked = table.resolve(
            &MethodDescriptor::new("ThingContainer", "TryDrop").with_parameters(["Thing", "IntVec3"]),
        );
        assert_eq!(picked.entry(), Some(0x2100));
    }

    #[test]
    fn test_resolve_respects_binding_flags() {
        let table = sample_table();

        let public_only = MethodDescriptor::getter("Pawn", "Goods")
            .with_flags(BindingFlags::INSTANCE | BindingFlags::PUBLIC);
        assert!(matches!(table.resolve(&public_only), Resolution::NotFound { .. }));

        let any = MethodDescriptor::getter("Pawn", "Goods");
        assert_eq!(table.resolve(&any).entry(), Some(0x3000));
    }

    #[test]
    fn test_pending_until_compiled() {
        let table = sample_table();
        let d = MethodDescriptor::new("Lord", "Notify_PawnTookDamage");

        assert!(matches!(table.resolve(&d), Resolution::NotYetCompiled { .. }));
        assert!(table.mark_compiled("Lord", "Notify_PawnTookDamage", &[], 0x4000));
        assert_eq!(table.resolve(&d).entry(), Some(0x4000));

        assert!(!table.mark_compiled("Lord", "Missing", &[], 0x5000));
    }

    #[test]
    fn test_reregister_replaces_overload() {
        let table = sample_table();
        let before = table.len();
        table.register("GameEnder", "CheckGameOver", STATIC_PUBLIC, &[], 0x9000);
        assert_eq!(table.len(), before);
        assert_eq!(
            table
                .resolve(&MethodDescriptor::new("GameEnder", "CheckGameOver"))
                .entry(),
            Some(0x9000)
        );
    }
}
