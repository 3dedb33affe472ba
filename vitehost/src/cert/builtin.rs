//! In-process issuer: a self-signed localhost certificate packed into a
//! PKCS#12 bundle. Useful where the .NET SDK is not installed.

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::x509::X509;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use time::{Duration, OffsetDateTime};

use super::{CertError, CertificateIssuer};
use crate::log::Logger;

const LEAF_VALIDITY_DAYS: i64 = 365;
const COMMON_NAME: &str = "localhost";
const ORGANIZATION: &str = "vitehost development";
pub const SUBJECT_NAMES: &[&str] = &["localhost", "127.0.0.1", "::1"];

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinIssuer;

struct Pem {
    cert: String,
    key: String,
}

fn self_signed(names: &[&str]) -> Result<Pem, CertError> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, COMMON_NAME);
    dn.push(DnType::OrganizationName, ORGANIZATION);
    params.distinguished_name = dn;
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let mut sans = Vec::new();
    for name in names {
        if let Ok(ip) = name.parse::<IpAddr>() {
            sans.push(SanType::IpAddress(ip));
        } else {
            let dns = (*name).try_into().map_err(|e| {
                CertError::Generate(format!("Invalid DNS name '{}': {:?}", name, e))
            })?;
            sans.push(SanType::DnsName(dns));
        }
    }
    params.subject_alt_names = sans;

    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::days(1);
    params.not_after = now + Duration::days(LEAF_VALIDITY_DAYS);

    let key = KeyPair::generate().map_err(|e| CertError::Generate(e.to_string()))?;
    let cert = params
        .self_signed(&key)
        .map_err(|e| CertError::Generate(e.to_string()))?;

    Ok(Pem {
        cert: cert.pem(),
        key: key.serialize_pem(),
    })
}

fn pkcs12_der(pem: &Pem, password: &str) -> Result<Vec<u8>, CertError> {
    let pkey = PKey::private_key_from_pem(pem.key.as_bytes())
        .map_err(|e| CertError::Generate(format!("Failed to load private key: {}", e)))?;
    let cert = X509::from_pem(pem.cert.as_bytes())
        .map_err(|e| CertError::Generate(format!("Failed to load certificate: {}", e)))?;

    let bundle = Pkcs12::builder()
        .name(COMMON_NAME)
        .pkey(&pkey)
        .cert(&cert)
        .build2(password)
        .map_err(|e| CertError::Generate(format!("Failed to build PKCS#12 bundle: {}", e)))?;

    bundle
        .to_der()
        .map_err(|e| CertError::Generate(format!("Failed to encode PKCS#12 bundle: {}", e)))
}

#[async_trait]
impl CertificateIssuer for BuiltinIssuer {
    fn name(&self) -> &str {
        "built-in issuer"
    }

    async fn issue(
        &self,
        bundle_path: &Path,
        password: &str,
        log: &Logger,
    ) -> Result<(), CertError> {
        let pem = self_signed(SUBJECT_NAMES)?;
        let der = pkcs12_der(&pem, password)?;
        fs::write(bundle_path, der).map_err(|e| CertError::Write(bundle_path.to_path_buf(), e))?;

        log.info(format!(
            "Wrote self-signed certificate for {} to {}",
            SUBJECT_NAMES.join(", "),
            bundle_path.display()
        ));
        Ok(())
    }
}
