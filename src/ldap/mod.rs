//! LDAP directory mirror (spec §4.5, C5): DIT materialization, DN
//! construction, attribute mapping, and idempotent add/modify against the
//! ICAO-defined Directory Information Tree.

pub mod dit;
pub mod writer;

pub use dit::{container_ou, v1_dn, v2_dn, DnScheme};
pub use writer::{LdapDirectoryWriter, LdapWriter, WrittenEntry};
