//! Redirection engine
//!
//! [`Redirector::try_redirect`] overwrites the entry of a source method with a jump to
//! a destination method. Afterwards every call to the source runs the destination.
//! There is no way back: the overwritten bytes are reported but never restored.
//!
//! The engine refuses to write unless both sides resolved to a non-zero address, the
//! addresses differ, the jump can be encoded for the configured pointer width and the
//! memory backend accepts the patch site.

use crate::arch::{Jump, PointerWidth};
use crate::audit::{AuditLog, RecordOutcome};
use crate::error::RedirectError;
use crate::memory::CodeMemory;
use crate::resolve::Resolution;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// A patch that has been written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub source: String,
    pub destination: String,
    pub source_address: usize,
    pub destination_address: usize,
    pub jump: Jump,
    /// Bytes that were at the patch site before the jump replaced them
    pub overwritten: Vec<u8>,
}

impl Patch {
    pub fn bytes(&self) -> Vec<u8> {
        self.jump.encode()
    }
}

/// Applies redirections through a [`CodeMemory`] backend
pub struct Redirector<M: CodeMemory> {
    memory: M,
    width: Result<PointerWidth, u32>,
    audit: Arc<AuditLog>,
    write_lock: Mutex<()>,
}

impl<M: CodeMemory> Redirector<M> {
    /// Redirector for the host pointer width with a fresh audit log
    pub fn new(memory: M) -> Self {
        Self {
            memory,
            width: PointerWidth::host().map_err(|_| usize::BITS),
            audit: Arc::new(AuditLog::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Use a fixed pointer width instead of the host's
    pub fn with_width(mut self, width: PointerWidth) -> Self {
        self.width = Ok(width);
        self
    }

    /// Append to a shared audit log instead of a private one
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn width(&self) -> Result<PointerWidth, RedirectError> {
        self.width.map_err(RedirectError::UnsupportedPointerWidth)
    }

    /// Make every future call to `source` run `destination`
    ///
    /// The attempt is recorded in the audit log before anything else happens, so the
    /// log holds one entry per call whatever the outcome.
    pub fn try_redirect(
        &self,
        source: &Resolution,
        destination: &Resolution,
    ) -> Result<Patch, RedirectError> {
        let source_name = source.descriptor().qualified_name();
        let destination_name = destination.descriptor().qualified_name();
        let index = self.audit.begin(&source_name, &destination_name);

        let result = self.apply(source, destination, &source_name, &destination_name);

        match &result {
            Ok(patch) => {
                self.audit.finish(index, RecordOutcome::Applied);
                if self.audit.patches_on(&source_name) > 1 {
                    warn!(source = %source_name, "method redirected more than once");
                }
                debug!(
                    source = %source_name,
                    destination = %destination_name,
                    at = %format!("{:#x}", patch.source_address),
                    to = %format!("{:#x}", patch.destination_address),
                    bytes = ?patch.bytes(),
                    "redirected"
                );
            }
            Err(e) => {
                self.audit
                    .finish(index, RecordOutcome::Failed(e.to_string()));
            }
        }

        result
    }

    fn apply(
        &self,
        source: &Resolution,
        destination: &Resolution,
        source_name: &str,
        destination_name: &str,
    ) -> Result<Patch, RedirectError> {
        let source_address = source.entry().ok_or_else(|| RedirectError::SourceUnresolved {
            name: source_name.to_string(),
            reason: source.failure_reason().unwrap_or_default(),
        })?;
        let destination_address =
            destination
                .entry()
                .ok_or_else(|| RedirectError::DestinationUnresolved {
                    name: destination_name.to_string(),
                    reason: destination.failure_reason().unwrap_or_default(),
                })?;

        if source_address == 0 {
            return Err(RedirectError::NullAddress {
                name: source_name.to_string(),
            });
        }
        if destination_address == 0 {
            return Err(RedirectError::NullAddress {
                name: destination_name.to_string(),
            });
        }
        if source_address == destination_address {
            return Err(RedirectError::SelfRedirect {
                name: source_name.to_string(),
                address: source_address,
            });
        }

        let jump = Jump::build(self.width()?, source_address, destination_address)?;
        let bytes = jump.encode();

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let overwritten = self.memory.read_bytes(source_address, bytes.len())?;
        self.memory.write_code(source_address, &bytes)?;

        Ok(Patch {
            source: source_name.to_string(),
            destination: destination_name.to_string(),
            source_address,
            destination_address,
            jump,
            overwritten,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::MethodDescriptor;
    use crate::error::MemoryError;
    use crate::memory::{BufferMemory, FILL_BYTE};

    fn resolved(type_name: &str, member: &str, entry: usize) -> Resolution {
        Resolution::resolved(MethodDescriptor::new(type_name, member), entry)
    }

    #[test]
    fn test_wide_patch_bytes() {
        let memory = BufferMemory::new()
            .with_code(0x1000_0000, 64)
            .with_code(0x2000_0000, 64);
        let redirector = Redirector::new(memory).with_width(PointerWidth::Wide);

        let patch = redirector
            .try_redirect(
                &resolved("Foo", "Bar", 0x1000_0000),
                &resolved("Baz", "Qux", 0x2000_0000),
            )
            .unwrap();

        let site = redirector.memory().read_bytes(0x1000_0000, 12).unwrap();
        let mut expected = vec![0x48, 0xB8];
        expected.extend_from_slice(&0x2000_0000u64.to_ne_bytes());
        expected.extend_from_slice(&[0xFF, 0xE0]);
        assert_eq!(site, expected);

        assert_eq!(patch.overwritten, vec![FILL_BYTE; 12]);
        assert_eq!(patch.source, "Foo.Bar");
        assert_eq!(patch.destination, "Baz.Qux");

        // Bytes past the jump are untouched
        let after = redirector.memory().read_bytes(0x1000_000C, 4).unwrap();
        assert_eq!(after, vec![FILL_BYTE; 4]);
    }

    #[test]
    fn test_narrow_patch_bytes() {
        let memory = BufferMemory::new().with_code(0x0040_1000, 32);
        let redirector = Redirector::new(memory).with_width(PointerWidth::Narrow);

        redirector
            .try_redirect(
                &resolved("Foo", "Bar", 0x0040_1000),
                &resolved("Baz", "Qux", 0x0050_2000),
            )
            .unwrap();

        let site = redirector.memory().read_bytes(0x0040_1000, 5).unwrap();
        let offset = (0x0050_2000i64 - 0x0040_1000i64 - 5) as i32;
        assert_eq!(site[0], 0xE9);
        assert_eq!(&site[1..5], &offset.to_le_bytes());
    }

    #[test]
    fn test_unresolved_source_writes_nothing() {
        let memory = BufferMemory::new().with_code(0x1000, 32);
        let redirector = Redirector::new(memory).with_width(PointerWidth::Wide);

        let missing = Resolution::not_found(MethodDescriptor::new("Nope", "Missing"), "type 'Nope' not found");
        let err = redirector
            .try_redirect(&missing, &resolved("Baz", "Qux", 0x1000))
            .unwrap_err();

        assert!(matches!(err, RedirectError::SourceUnresolved { ref name, .. } if name == "Nope.Missing"));
        assert_eq!(
            redirector.memory().read_bytes(0x1000, 12).unwrap(),
            vec![FILL_BYTE; 12]
        );
    }

    #[test]
    fn test_not_yet_compiled_destination() {
        let memory = BufferMemory::new().with_code(0x1000, 32);
        let redirector = Redirector::new(memory).with_width(PointerWidth::Wide);

        let pending = Resolution::NotYetCompiled {
            descriptor: MethodDescriptor::new("RA_Lord", "Notify_PawnTookDamage"),
        };
        let err = redirector
            .try_redirect(&resolved("Lord", "Notify_PawnTookDamage", 0x1000), &pending)
            .unwrap_err();

        assert!(matches!(err, RedirectError::DestinationUnresolved { .. }));
    }

    #[test]
    fn test_null_and_self_redirects_are_refused() {
        let memory = BufferMemory::new().with_code(0x1000, 32);
        let redirector = Redirector::new(memory).with_width(PointerWidth::Wide);

        let err = redirector
            .try_redirect(&resolved("A", "a", 0), &resolved("B", "b", 0x1000))
            .unwrap_err();
        assert!(matches!(err, RedirectError::NullAddress { .. }));

        let err = redirector
            .try_redirect(&resolved("A", "a", 0x1000), &resolved("B", "b", 0x1000))
            .unwrap_err();
        assert!(matches!(err, RedirectError::SelfRedirect { address: 0x1000, .. }));
    }

    #[test]
    fn test_memory_errors_propagate() {
        let memory = BufferMemory::new().with_region(0x1000, vec![0; 32], "rw-p");
        let redirector = Redirector::new(memory).with_width(PointerWidth::Wide);

        let err = redirector
            .try_redirect(&resolved("A", "a", 0x1000), &resolved("B", "b", 0x2000))
            .unwrap_err();
        assert!(matches!(
            err,
            RedirectError::Memory(MemoryError::NotExecutable { .. })
        ));
    }

    #[test]
    fn test_audit_records_every_attempt_in_order() {
        let memory = BufferMemory::new().with_code(0x1000, 64);
        let redirector = Redirector::new(memory).with_width(PointerWidth::Wide);

        let _ = redirector.try_redirect(&resolved("A", "a", 0x1000), &resolved("RA_A", "a", 0x9000));
        let _ = redirector.try_redirect(
            &Resolution::not_found(MethodDescriptor::new("B", "b"), "missing"),
            &resolved("RA_B", "b", 0x9100),
        );
        let _ = redirector.try_redirect(&resolved("C", "c", 0x1020), &resolved("RA_C", "c", 0x9200));

        let audit = redirector.audit();
        assert_eq!(audit.sources(), vec!["A.a", "B.b", "C.c"]);
        assert_eq!(audit.destinations(), vec!["RA_A.a", "RA_B.b", "RA_C.c"]);
        assert!(audit.get(0).unwrap().is_applied());
        assert!(!audit.get(1).unwrap().is_applied());
        assert!(audit.get(2).unwrap().is_applied());
    }

    #[test]
    fn test_shared_audit_log() {
        let audit = Arc::new(AuditLog::new());
        let first = Redirector::new(BufferMemory::new().with_code(0x1000, 16))
            .with_width(PointerWidth::Wide)
            .with_audit(Arc::clone(&audit));
        let second = Redirector::new(BufferMemory::new().with_code(0x1000, 16))
            .with_width(PointerWidth::Wide)
            .with_audit(Arc::clone(&audit));

        first
            .try_redirect(&resolved("A", "a", 0x1000), &resolved("B", "b", 0x2000))
            .unwrap();
        second
            .try_redirect(&resolved("A", "a", 0x1000), &resolved("C", "c", 0x3000))
            .unwrap();

        assert_eq!(audit.len(), 2);
        assert_eq!(audit.duplicate_sources(), vec!["A.a"]);
    }

    #[test]
    fn test_failed_then_applied_is_one_patch() {
        let redirector =
            Redirector::new(BufferMemory::new().with_code(0x1000, 16)).with_width(PointerWidth::Wide);

        let _ = redirector.try_redirect(
            &resolved("A", "a", 0x1000),
            &Resolution::not_found(MethodDescriptor::new("B", "b"), "missing"),
        );
        redirector
            .try_redirect(&resolved("A", "a", 0x1000), &resolved("B", "b", 0x2000))
            .unwrap();

        let audit = redirector.audit();
        assert_eq!(audit.sources(), vec!["A.a", "A.a"]);
        assert_eq!(audit.patches_on("A.a"), 1);
        assert!(audit.duplicate_sources().is_empty());
    }
}
