//! Filename sanitization and file-format sniffing (spec §4.12, C12).
//!
//! Everything here is pure and side-effect free: no filesystem access, no
//! hashing. [`UploadCoordinator`](super::UploadCoordinator) calls through
//! these before it ever touches disk.

use crate::error::{PkdError, Result};
use crate::model::FileFormat;

/// Maximum sanitized filename length (spec §4.12).
const MAX_FILENAME_LEN: usize = 255;

/// Body size caps per spec §4.12: 100 MiB for LDIF/Master-List documents,
/// 10 MiB for a single certificate/CRL.
pub const MAX_BULK_SIZE: u64 = 100 * 1024 * 1024;
pub const MAX_SINGLE_SIZE: u64 = 10 * 1024 * 1024;

/// Reduce a client-supplied filename to `[A-Za-z0-9_.-]`, rejecting path
/// traversal and empty results. The original is preserved separately as
/// `originalFileName` (spec §3) -- this sanitized form is never used to
/// address the file on disk either (spec §4.12: the upload UUID is used
/// instead), it only needs to be safe to log and to derive an extension
/// from.
pub fn sanitize_filename(original: &str) -> Result<String> {
    if original.is_empty() {
        return Err(PkdError::InvalidFilename("filename must not be empty".to_string()));
    }
    if original.contains("..") {
        return Err(PkdError::InvalidFilename(format!(
            "filename contains a path traversal sequence: {original:?}"
        )));
    }

    // Strip any directory components a client might have sent.
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original);

    let sanitized: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' { c } else { '_' })
        .take(MAX_FILENAME_LEN)
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.' || c == '_') {
        return Err(PkdError::InvalidFilename(format!(
            "filename sanitizes to nothing usable: {original:?}"
        )));
    }

    Ok(sanitized)
}

/// Decide the declared [`FileFormat`] from a sanitized filename's extension.
/// The coordinator cross-checks this against the magic-byte sniff in
/// [`sniff_format`] before trusting either alone.
pub fn format_from_extension(sanitized_filename: &str) -> Result<FileFormat> {
    let ext = sanitized_filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .ok_or_else(|| PkdError::UnsupportedFormat(format!("no extension on {sanitized_filename:?}")))?;

    match ext.as_str() {
        "ldif" => Ok(FileFormat::Ldif),
        "ml" => Ok(FileFormat::Ml),
        "pem" => Ok(FileFormat::Pem),
        "der" => Ok(FileFormat::Der),
        "cer" | "crt" => Ok(FileFormat::Cer),
        "p7b" | "p7c" => Ok(FileFormat::P7b),
        "crl" => Ok(FileFormat::Crl),
        other => Err(PkdError::UnsupportedFormat(format!("unrecognized extension .{other}"))),
    }
}

/// Magic-byte + structural sanity check (spec §4.12): LDIF text must
/// contain a `dn:` or `version:` line; CMS/ML/PEM/DER/P7B binary formats
/// must start with a SEQUENCE tag (`0x30`) and carry a syntactically valid
/// BER/DER length encoding. A CRL is itself a CMS-unrelated DER SEQUENCE
/// too, so it gets the same binary check. PEM-armored input is accepted
/// for any binary format by checking for the `-----BEGIN` marker instead.
pub fn sniff_format(declared: FileFormat, body: &[u8]) -> Result<()> {
    match declared {
        FileFormat::Ldif => {
            let text = String::from_utf8_lossy(body);
            if text.lines().any(|l| {
                let l = l.trim_start();
                l.to_ascii_lowercase().starts_with("dn:") || l.to_ascii_lowercase().starts_with("version:")
            }) {
                Ok(())
            } else {
                Err(PkdError::InvalidLdif(
                    "LDIF body contains no dn: or version: line".to_string(),
                ))
            }
        }
        FileFormat::Ml | FileFormat::Der | FileFormat::Cer | FileFormat::P7b | FileFormat::Crl => {
            if looks_like_pem(body) {
                return Ok(());
            }
            check_der_sequence(body)
        }
        FileFormat::Pem => {
            if looks_like_pem(body) {
                Ok(())
            } else {
                Err(PkdError::InvalidFilename("PEM body is missing a -----BEGIN marker".to_string()))
            }
        }
    }
}

fn looks_like_pem(body: &[u8]) -> bool {
    body.windows(11).any(|w| w == b"-----BEGIN ")
}

/// Validate that `body` starts with a SEQUENCE tag and a syntactically
/// sound BER/DER length octet sequence, without fully parsing the content
/// (that's the job of the CMS extractor / X.509 parser downstream).
fn check_der_sequence(body: &[u8]) -> Result<()> {
    if body.first() != Some(&0x30) {
        return Err(PkdError::InvalidCms(
            "body does not start with an ASN.1 SEQUENCE tag (0x30)".to_string(),
        ));
    }
    let length_byte = *body.get(1).ok_or_else(|| PkdError::InvalidCms("body too short to carry a length".to_string()))?;
    if length_byte < 0x80 {
        return Ok(()); // short form, any value is a valid length
    }
    let num_octets = (length_byte & 0x7f) as usize;
    if num_octets == 0 {
        return Err(PkdError::InvalidCms("indefinite-length DER is not accepted".to_string()));
    }
    if body.len() < 2 + num_octets {
        return Err(PkdError::InvalidCms("long-form length octets run past end of body".to_string()));
    }
    Ok(())
}

/// Cap check against the per-format size ceiling (spec §4.12).
pub fn check_size_cap(format: FileFormat, size: u64) -> Result<()> {
    let limit = match format {
        FileFormat::Ldif | FileFormat::Ml => MAX_BULK_SIZE,
        _ => MAX_SINGLE_SIZE,
    };
    if size > limit {
        return Err(PkdError::TooLarge { size, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_disallowed_characters() {
        assert_eq!(sanitize_filename("my upload (1).ldif").unwrap(), "my_upload__1_.ldif");
    }

    #[test]
    fn sanitize_rejects_path_traversal() {
        assert!(sanitize_filename("../../etc/passwd").is_err());
    }

    #[test]
    fn sanitize_strips_directory_components() {
        assert_eq!(sanitize_filename("dir/sub/file.ldif").unwrap(), "file.ldif");
    }

    #[test]
    fn sanitize_rejects_empty_input() {
        assert!(sanitize_filename("").is_err());
    }

    #[test]
    fn format_from_extension_covers_every_declared_format() {
        assert_eq!(format_from_extension("a.ldif").unwrap(), FileFormat::Ldif);
        assert_eq!(format_from_extension("a.ml").unwrap(), FileFormat::Ml);
        assert_eq!(format_from_extension("a.pem").unwrap(), FileFormat::Pem);
        assert_eq!(format_from_extension("a.der").unwrap(), FileFormat::Der);
        assert_eq!(format_from_extension("a.cer").unwrap(), FileFormat::Cer);
        assert_eq!(format_from_extension("a.p7b").unwrap(), FileFormat::P7b);
        assert_eq!(format_from_extension("a.crl").unwrap(), FileFormat::Crl);
    }

    #[test]
    fn format_from_extension_rejects_unknown_extension() {
        assert!(format_from_extension("a.exe").is_err());
    }

    #[test]
    fn sniff_ldif_requires_dn_or_version_line() {
        assert!(sniff_format(FileFormat::Ldif, b"dn: cn=x,c=KR\n").is_ok());
        assert!(sniff_format(FileFormat::Ldif, b"version: 1\n").is_ok());
        assert!(sniff_format(FileFormat::Ldif, b"objectClass: top\n").is_err());
    }

    #[test]
    fn sniff_binary_accepts_a_short_form_sequence() {
        assert!(sniff_format(FileFormat::Der, &[0x30, 0x05, 0, 0, 0, 0, 0]).is_ok());
    }

    #[test]
    fn sniff_binary_accepts_long_form_length_within_bounds() {
        let mut body = vec![0x30, 0x82, 0x00, 0x02];
        body.extend_from_slice(&[0xAA, 0xBB]);
        assert!(sniff_format(FileFormat::Der, &body).is_ok());
    }

    #[test]
    fn sniff_binary_rejects_truncated_long_form_length() {
        let body = vec![0x30, 0x82, 0x10];
        assert!(sniff_format(FileFormat::Der, &body).is_err());
    }

    #[test]
    fn sniff_binary_rejects_wrong_leading_byte() {
        assert!(sniff_format(FileFormat::Der, &[0x04, 0x00]).is_err());
    }

    #[test]
    fn sniff_binary_accepts_pem_armored_body_regardless_of_leading_byte() {
        let pem = b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";
        assert!(sniff_format(FileFormat::Cer, pem).is_ok());
    }

    #[test]
    fn size_cap_distinguishes_bulk_and_single_formats() {
        assert!(check_size_cap(FileFormat::Ldif, MAX_BULK_SIZE).is_ok());
        assert!(check_size_cap(FileFormat::Ldif, MAX_BULK_SIZE + 1).is_err());
        assert!(check_size_cap(FileFormat::Cer, MAX_SINGLE_SIZE).is_ok());
        assert!(check_size_cap(FileFormat::Cer, MAX_SINGLE_SIZE + 1).is_err());
    }
}
