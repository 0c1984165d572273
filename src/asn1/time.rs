//! Time and serial-number rendering helpers (spec §4.1).

use chrono::{DateTime, Utc};
use x509_parser::asn1_rs::Integer;
use x509_parser::time::ASN1Time;

/// Render a `chrono::DateTime<Utc>` (as decoded from an ASN.1 UTCTime or
/// GeneralizedTime) in the `YYYY-MM-DD HH:MM:SS+00` form the spec calls for.
pub fn asn1_time_to_iso8601(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S+00").to_string()
}

/// Convert `x509_parser`'s ASN.1 time type (backed by `time::OffsetDateTime`)
/// into `chrono::DateTime<Utc>`, the type used throughout the data model.
pub fn asn1_time_to_chrono(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0)
        .unwrap_or_else(|| DateTime::from_timestamp(0, 0).expect("epoch is representable"))
}

/// Render a certificate serial number as uppercase hex, matching the
/// convention OpenSSL's `BIGNUM` printer uses.
pub fn serial_to_hex(serial: &Integer) -> String {
    hex::encode_upper(serial.as_ref())
}
