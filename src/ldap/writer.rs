//! LDAP add/modify operations against the DIT described in [`crate::ldap::dit`]
//! (spec §4.5).
//!
//! Container creation (`c={CC}`, `o={ou}`) is idempotent: an `ENTRY_ALREADY_EXISTS`
//! result from the directory is swallowed, not surfaced as an error. A
//! duplicate add of the leaf entry itself falls back to a REPLACE of the
//! binary attribute, per spec §4.5's "On `ALREADY_EXISTS`, fall back to a
//! REPLACE of the binary attribute."

use std::collections::HashSet;

use async_trait::async_trait;
use ldap3::{Mod, ResultCode};

use crate::asn1::time::asn1_time_to_iso8601;
use crate::classify::is_self_signed;
use crate::config::LdapConfig;
use crate::error::{PkdError, Result};
use crate::ldap::dit::{self, Container, DnScheme};
use crate::model::{Certificate, Crl, MasterListRecord};
use crate::pool::ldap::LdapPool;

/// ldap3's `add`/`modify` take a single type parameter for both attribute
/// names and values, so everything -- including ASCII attribute names --
/// travels as `Vec<u8>` here.
type Attr = (Vec<u8>, HashSet<Vec<u8>>);

fn attr(name: &str, values: impl IntoIterator<Item = Vec<u8>>) -> Attr {
    (name.as_bytes().to_vec(), values.into_iter().collect())
}

fn one(value: impl Into<Vec<u8>>) -> HashSet<Vec<u8>> {
    [value.into()].into_iter().collect()
}

/// What an LDAP write reports back: the DN the caller must persist
/// (spec §4.5 "Every successful write reports back the DN").
#[derive(Debug, Clone)]
pub struct WrittenEntry {
    pub dn: String,
}

#[async_trait]
pub trait LdapDirectoryWriter: Send + Sync {
    async fn write_certificate(&self, cert: &Certificate, scheme: DnScheme, is_link: bool) -> Result<WrittenEntry>;
    async fn write_crl(&self, crl: &Crl, scheme: DnScheme) -> Result<WrittenEntry>;
    async fn write_master_list(&self, ml: &MasterListRecord, scheme: DnScheme) -> Result<WrittenEntry>;
}

pub struct LdapWriter {
    pool: std::sync::Arc<LdapPool>,
    base_dn: String,
    data_container: String,
    nc_data_container: String,
}

impl LdapWriter {
    pub fn new(pool: std::sync::Arc<LdapPool>, config: &LdapConfig) -> Self {
        Self {
            pool,
            base_dn: config.base_dn.clone(),
            data_container: config.data_container.clone(),
            nc_data_container: config.nc_data_container.clone(),
        }
    }

    async fn ensure_containers(&self, ou: Container, country_code: &str, subtree: &str) -> Result<()> {
        let mut conn = self.pool.acquire_write().await?;
        for (depth, dn) in dit::required_containers(ou, country_code, subtree, &self.base_dn).iter().enumerate() {
            let attrs: Vec<Attr> = if depth == 0 {
                vec![
                    attr("objectClass", [b"top".to_vec(), b"country".to_vec()]),
                    attr("c", [country_code.to_uppercase().into_bytes()]),
                ]
            } else {
                vec![
                    attr("objectClass", [b"top".to_vec(), b"organizationalUnit".to_vec()]),
                    attr("ou", [ou.as_str().as_bytes().to_vec()]),
                ]
            };
            let result = conn
                .add(dn.as_str(), attrs)
                .await
                .map_err(|e| PkdError::LdapConnectionFailed(e.to_string()))?;
            if result.rc != ResultCode(0).0 && result.rc != ResultCode(68).0 {
                return Err(PkdError::LdapSaveFailed(format!(
                    "failed to ensure container {dn}: rc={} {}",
                    result.rc, result.text
                )));
            }
        }
        Ok(())
    }

    async fn add_or_replace_binary(
        &self,
        dn: &str,
        binary_attr: &str,
        binary_value: Vec<u8>,
        mut attrs: Vec<Attr>,
    ) -> Result<()> {
        let mut conn = self.pool.acquire_write().await?;

        attrs.push(attr(binary_attr, [binary_value.clone()]));

        let result = conn
            .add(dn, attrs)
            .await
            .map_err(|e| PkdError::LdapConnectionFailed(e.to_string()))?;

        if result.rc == ResultCode(0).0 {
            return Ok(());
        }
        if result.rc != ResultCode(68).0 {
            return Err(PkdError::LdapSaveFailed(format!(
                "add failed for {dn}: rc={} {}",
                result.rc, result.text
            )));
        }

        // ENTRY_ALREADY_EXISTS: fall back to REPLACE of the binary attribute.
        let replace = conn
            .modify(dn, vec![Mod::Replace(binary_attr.as_bytes().to_vec(), one(binary_value))])
            .await
            .map_err(|e| PkdError::LdapConnectionFailed(e.to_string()))?;
        if replace.rc != ResultCode(0).0 {
            return Err(PkdError::LdapSaveFailed(format!(
                "replace fallback failed for {dn}: rc={} {}",
                replace.rc, replace.text
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LdapDirectoryWriter for LdapWriter {
    async fn write_certificate(&self, cert: &Certificate, scheme: DnScheme, is_link: bool) -> Result<WrittenEntry> {
        let ou = dit::container_ou(cert.certificate_type, is_link);
        let subtree = dit::data_subtree(cert.certificate_type, &self.data_container, &self.nc_data_container);
        self.ensure_containers(ou, &cert.country_code, &subtree).await?;

        let dn = match scheme {
            DnScheme::V1 => dit::v1_dn(&cert.subject_dn, &cert.serial_number, ou, &cert.country_code, &subtree, &self.base_dn),
            DnScheme::V2 => dit::v2_dn(&cert.fingerprint_sha256, ou, &cert.country_code, &subtree, &self.base_dn),
        };

        let mut object_classes: Vec<Vec<u8>> = ["top", "person", "organizationalPerson", "inetOrgPerson", "pkdDownload"]
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();

        let mut attrs: Vec<Attr> = vec![
            attr("cn", [cert.fingerprint_sha256.as_bytes().to_vec()]),
            attr("sn", [cert.serial_number.as_bytes().to_vec()]),
            attr("description", [cert.subject_dn.as_bytes().to_vec()]),
        ];

        if cert.certificate_type == crate::model::CertificateType::DscNc {
            object_classes.push(b"pkdConformanceCode".to_vec());
            attrs.push(attr("pkdConformanceCode", [b"NC".to_vec()]));
            attrs.push(attr("pkdConformanceText", [b"non-conformant DSC".to_vec()]));
            attrs.push(attr("pkdVersion", [b"1".to_vec()]));
        }

        attrs.insert(0, attr("objectClass", object_classes));

        self.add_or_replace_binary(&dn, "userCertificate;binary", cert.certificate_binary.clone(), attrs).await?;
        Ok(WrittenEntry { dn })
    }

    async fn write_crl(&self, crl: &Crl, scheme: DnScheme) -> Result<WrittenEntry> {
        self.ensure_containers(Container::Crl, &crl.country_code, &self.data_container).await?;

        let dn = match scheme {
            DnScheme::V1 => dit::v1_dn(
                &crl.issuer_dn,
                crl.crl_number.as_deref().unwrap_or("0"),
                Container::Crl,
                &crl.country_code,
                &self.data_container,
                &self.base_dn,
            ),
            DnScheme::V2 => dit::v2_dn(&crl.fingerprint_sha256, Container::Crl, &crl.country_code, &self.data_container, &self.base_dn),
        };

        let attrs = vec![
            attr("objectClass", [b"top".to_vec(), b"cRLDistributionPoint".to_vec(), b"pkdDownload".to_vec()]),
            attr("cn", [crl.fingerprint_sha256.as_bytes().to_vec()]),
            attr("description", [crl.issuer_dn.as_bytes().to_vec()]),
            attr("certificateRevocationListTimestamp", [asn1_time_to_iso8601(crl.this_update).into_bytes()]),
        ];

        self.add_or_replace_binary(&dn, "certificateRevocationList;binary", crl.crl_binary.clone(), attrs).await?;
        Ok(WrittenEntry { dn })
    }

    async fn write_master_list(&self, ml: &MasterListRecord, scheme: DnScheme) -> Result<WrittenEntry> {
        self.ensure_containers(Container::Ml, &ml.signer_country, &self.data_container).await?;

        let dn = match scheme {
            DnScheme::V1 => dit::v1_dn(&ml.signer_dn, "0", Container::Ml, &ml.signer_country, &self.data_container, &self.base_dn),
            DnScheme::V2 => dit::v2_dn(&ml.fingerprint_sha256, Container::Ml, &ml.signer_country, &self.data_container, &self.base_dn),
        };

        let attrs = vec![
            attr("objectClass", [b"top".to_vec(), b"pkdMasterList".to_vec(), b"pkdDownload".to_vec()]),
            attr("cn", [ml.fingerprint_sha256.as_bytes().to_vec()]),
            attr("description", [ml.signer_dn.as_bytes().to_vec()]),
            attr("pkdVersion", [ml.version.unwrap_or(0).to_string().into_bytes()]),
        ];

        self.add_or_replace_binary(&dn, "pkdMasterListContent", ml.ml_binary.clone(), attrs).await?;
        Ok(WrittenEntry { dn })
    }
}

/// Whether `cert`, per its own subject/issuer DN pair, is the "new" half of
/// a key-rollover link pair. Used by the caller (the processing strategies)
/// to pick [`Container::Lc`] vs [`Container::Csca`] for LDAP writes without
/// duplicating the self-signed check the classifier already does.
pub fn is_link_certificate(cert: &x509_parser::certificate::X509Certificate) -> bool {
    !is_self_signed(cert)
}
