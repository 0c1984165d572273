//! ASN.1 / X.509 utility belt (spec component C1).
//!
//! These helpers never fail loudly: per spec §4.1 they degrade to an empty
//! string / `"XX"` sentinel rather than propagating an error, because they
//! are called from deep inside best-effort classification and rendering
//! paths where a malformed DN must not abort the whole upload.

pub mod b64;
pub mod dn;
pub mod fingerprint;
pub mod time;

pub use b64::decode_tolerant;
pub use dn::{escape_rdn_value, extract_country_code, render_dn_rfc2253};
pub use fingerprint::sha256_hex;
pub use time::{asn1_time_to_chrono, asn1_time_to_iso8601, serial_to_hex};
