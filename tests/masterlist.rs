//! Master List classification and ingestion-path coverage (spec §4.7, §4.9).
//!
//! Building a genuinely CMS-signed Master List envelope needs the
//! `x509-certificate`/signing-key stack the crate doesn't otherwise depend
//! on (see `cryptographic-message-syntax`'s own `SignerBuilder`, which
//! takes that crate's certificate type, not an `x509-parser`/`rcgen` one).
//! The inner `SEQUENCE { version?, SET OF Certificate }` framing is already
//! covered at the unit level in `cms::extractor`'s own tests; this file
//! instead covers what an end-to-end upload actually observes: how a
//! Master List member classifies regardless of its own basicConstraints,
//! and how a malformed envelope is rejected without touching the store.

mod common;

use common::{deps_with_store, issued_by, self_signed_csca, MemoryStore};
use icao_pkd_core::classify::{classify, Origin};
use icao_pkd_core::processing::strategy::ingest_master_list;
use icao_pkd_core::processing::RunningCounts;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

/// spec §4.7/§4.9 -- every certificate inside a Master List body classifies
/// as CSCA, even a leaf-shaped one with no CA bit and no keyCertSign, since
/// membership in the body is itself the classification signal.
#[test]
fn master_list_member_classifies_as_csca_regardless_of_its_own_basic_constraints() {
    let root = self_signed_csca("CSCA-ML-ROOT", "DE", -30, 3650);
    // Issued as a leaf (is_ca = false) -- would be a DSC under any other origin.
    let leaf_shaped = issued_by(&root, "NOT-ACTUALLY-A-CSCA", "DE", false, -10, 80);

    let (_, parsed) = X509Certificate::from_der(&leaf_shaped.der).expect("valid DER");
    assert_eq!(classify(&parsed, Origin::MasterList), icao_pkd_core::model::CertificateType::Csca);
}

/// spec §4.9 -- the certificate that signed a Master List (filed under
/// `o=mlsc`) classifies as MLSC even though it is itself CA-capable.
#[test]
fn master_list_signer_classifies_as_mlsc_even_when_ca_capable() {
    let signer = self_signed_csca("MLSC-SIGNER", "DE", -30, 3650);
    let (_, parsed) = X509Certificate::from_der(&signer.der).expect("valid DER");
    assert_eq!(classify(&parsed, Origin::LdifMasterListSigner), icao_pkd_core::model::CertificateType::Mlsc);
}

/// A malformed Master List envelope is rejected with `INVALID_CMS` and
/// leaves no trace in the store -- ingestion is all-or-nothing per member
/// list, not a partial commit of whatever happened to parse.
#[tokio::test]
async fn malformed_master_list_envelope_is_rejected_without_persisting_anything() {
    let store = MemoryStore::new();
    let deps = deps_with_store(&store, true);
    let upload_id = uuid::Uuid::new_v4();

    // A SET (tag 0x31), not the SEQUENCE a CMS ContentInfo must start with.
    let garbage = [0x31u8, 0x00];
    let mut counts = RunningCounts::default();
    let err = ingest_master_list(upload_id, &garbage, &deps, &mut counts).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_CMS");

    assert!(store.certificates.lock().unwrap().is_empty());
    assert!(store.master_lists.lock().unwrap().is_empty());
}
