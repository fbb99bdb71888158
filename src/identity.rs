//! Content-hash and UUID derivation (component 4.A).
//!
//! Every derived entity gets a stable UUID computed by hashing a coordinate
//! tuple. Unlike `properties::Bid::new` in the teacher, which mints a
//! time-based `Uuid::now_v6` for each new identity, derivation here must be
//! idempotent: the same coordinates must produce the same UUID on every
//! platform and every run, so `Uuid::new_v5` (name-based, SHA1) is used
//! instead against a fixed namespace.
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace UUID for all coordinate-derived identities in this crate.
/// Arbitrary but fixed: changing it would change every derived UUID.
pub const NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x1a, 0x3d, 0x2b, 0x9c, 0x44, 0x4e, 0x8a, 0xb1, 0x02, 0x5e, 0x7d, 0x11, 0xaa, 0xcc, 0x03,
]);

/// Sentinel used in place of an absent optional coordinate field (e.g. a
/// scope with no signature). Must never collide with a real field value in
/// practice; the leading null byte is deliberately not representable in a
/// parsed signature string.
pub const ABSENT: &str = "\u{0}absent";

/// A coordinate tuple identifying a derived entity, per spec.md 3.1.
/// Fields are joined with a unit-separator byte before hashing so that
/// `["ab", "c"]` and `["a", "bc"]` never collide.
#[derive(Debug, Clone)]
pub struct Coordinate<'a> {
    fields: Vec<&'a str>,
}

impl<'a> Coordinate<'a> {
    pub fn new(kind: &'a str) -> Self {
        Coordinate { fields: vec![kind] }
    }

    pub fn field(mut self, value: &'a str) -> Self {
        self.fields.push(value);
        self
    }

    pub fn optional_field(mut self, value: Option<&'a str>) -> Self {
        self.fields.push(value.unwrap_or(ABSENT));
        self
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                buf.push(0x1f); // ASCII unit separator
            }
            buf.extend_from_slice(field.as_bytes());
        }
        buf
    }
}

/// Derives a deterministic UUID from a coordinate tuple.
///
/// `derive_uuid(t) == derive_uuid(t)` for any `t`, across runs, processes,
/// and platforms: `Uuid::new_v5` hashes the namespace + name bytes with
/// SHA1 and is defined to be stable regardless of host byte order.
pub fn derive_uuid(coord: &Coordinate) -> Uuid {
    Uuid::new_v5(&NAMESPACE, &coord.canonical_bytes())
}

/// 256-bit content hash over the byte range the parser designates as the
/// "hashable content" for a node (function source, section body, whole file
/// for structural kinds).
pub fn content_hash(bytes: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn content_hash_hex(bytes: &[u8]) -> String {
    hex::encode(content_hash(bytes))
}

/// 96-bit short hash of a node label plus its sorted required property
/// names, used as a parser's declared `schema_version`. Sorting makes the
/// hash independent of the order extractors were registered in.
pub fn schema_hash(node_label: &str, required_property_names: &[&str]) -> String {
    let mut sorted: Vec<&str> = required_property_names.to_vec();
    sorted.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(node_label.as_bytes());
    for name in &sorted {
        hasher.update(0x1fu8.to_le_bytes());
        hasher.update(name.as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..12]) // 96 bits = 12 bytes
}

/// Coordinate-tuple constructors for the entity kinds enumerated in
/// spec.md 3.1.
pub mod coord {
    use super::Coordinate;

    pub fn file(absolute_path: &str) -> Coordinate<'_> {
        Coordinate::new("file").field(absolute_path)
    }

    pub fn dir(absolute_path: &str) -> Coordinate<'_> {
        Coordinate::new("dir").field(absolute_path)
    }

    pub fn scope<'a>(
        file: &'a str,
        signature: Option<&'a str>,
        start_line: &'a str,
    ) -> Coordinate<'a> {
        Coordinate::new("scope")
            .field(file)
            .optional_field(signature)
            .field(start_line)
    }

    pub fn markdown(absolute_path: &str) -> Coordinate<'_> {
        Coordinate::new("markdown").field(absolute_path)
    }

    pub fn section<'a>(absolute_path: &'a str, start_line: &'a str) -> Coordinate<'a> {
        Coordinate::new("section")
            .field(absolute_path)
            .field(start_line)
    }

    pub fn codeblock<'a>(absolute_path: &'a str, start_line: &'a str) -> Coordinate<'a> {
        Coordinate::new("codeblock")
            .field(absolute_path)
            .field(start_line)
    }

    pub fn document_kind<'a>(kind: &'a str, absolute_path: &'a str) -> Coordinate<'a> {
        Coordinate::new(kind).field(absolute_path)
    }

    pub fn webpage(url: &str) -> Coordinate<'_> {
        Coordinate::new("webpage").field(url)
    }

    pub fn lib(package_name: &str) -> Coordinate<'_> {
        Coordinate::new("lib").field(package_name)
    }

    pub fn pending<'a>(from_uuid: &'a str, import_path: &'a str) -> Coordinate<'a> {
        Coordinate::new("pending")
            .field(from_uuid)
            .field(import_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_uuid_is_deterministic() {
        let a = derive_uuid(&coord::file("/proj/a.rs"));
        let b = derive_uuid(&coord::file("/proj/a.rs"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_coordinates_yield_different_uuids() {
        let a = derive_uuid(&coord::file("/proj/a.rs"));
        let b = derive_uuid(&coord::file("/proj/b.rs"));
        assert_ne!(a, b);
    }

    #[test]
    fn field_boundaries_do_not_collide() {
        let a = derive_uuid(&coord::scope("ab", Some("c"), "1"));
        let b = derive_uuid(&coord::scope("a", Some("bc"), "1"));
        assert_ne!(a, b);
    }

    #[test]
    fn absent_signature_uses_sentinel() {
        let a = derive_uuid(&coord::scope("/proj/a.rs", None, "10"));
        let b = derive_uuid(&coord::scope("/proj/a.rs", None, "10"));
        assert_eq!(a, b);
        let c = derive_uuid(&coord::scope("/proj/a.rs", Some(ABSENT), "10"));
        assert_eq!(a, c);
    }

    #[test]
    fn content_hash_is_stable() {
        let h1 = content_hash(b"return 1");
        let h2 = content_hash(b"return 1");
        assert_eq!(h1, h2);
        let h3 = content_hash(b"return 2");
        assert_ne!(h1, h3);
    }

    #[test]
    fn schema_hash_ignores_property_order() {
        let a = schema_hash("Function", &["name", "start_line", "signature"]);
        let b = schema_hash("Function", &["signature", "name", "start_line"]);
        assert_eq!(a, b);
    }

    #[test]
    fn schema_hash_changes_with_label_or_fields() {
        let a = schema_hash("Function", &["name"]);
        let b = schema_hash("Class", &["name"]);
        assert_ne!(a, b);
        let c = schema_hash("Function", &["name", "signature"]);
        assert_ne!(a, c);
    }
}
