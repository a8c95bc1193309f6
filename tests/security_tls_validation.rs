//! Extended TLS validation: certificate expiration checking, TLS1.3
//! enforcement, and SAN/CN extraction. Complements the self-signed
//! rejection test in tests/integration_tls.rs.

use rcgen::{CertificateParams, generate_simple_self_signed};
use std::time::{Duration, SystemTime};

#[tokio::test]
async fn test_expired_certificate_detection() -> Result<(), Box<dyn std::error::Error>> {
	let mut params = CertificateParams::new(vec!["localhost".into()]);

	let now = SystemTime::now();
	let one_year_ago = now - Duration::from_secs(365 * 24 * 60 * 60);
	let yesterday = now - Duration::from_secs(24 * 60 * 60);

	params.not_before = one_year_ago.into();
	params.not_after = yesterday.into();

	let cert = rcgen::Certificate::from_params(params)?;
	let cert_pem = cert.serialize_pem()?;

	let tmpdir = tempfile::tempdir()?;
	let cert_path = tmpdir.path().join("expired_cert.pem");
	std::fs::write(&cert_path, cert_pem.as_bytes())?;

	let certs = jobforge::tls_utils::load_certs(&cert_path)?;
	let is_expired = jobforge::tls_utils::is_cert_expired(&certs[0])?;

	assert!(
		is_expired,
		"certificate with not_after in the past should be detected as expired"
	);

	Ok(())
}

#[tokio::test]
async fn test_valid_certificate_not_expired() -> Result<(), Box<dyn std::error::Error>> {
	let mut params = CertificateParams::new(vec!["localhost".into()]);

	let now = SystemTime::now();
	let one_year_from_now = now + Duration::from_secs(365 * 24 * 60 * 60);

	params.not_before = now.into();
	params.not_after = one_year_from_now.into();

	let cert = rcgen::Certificate::from_params(params)?;
	let cert_pem = cert.serialize_pem()?;

	let tmpdir = tempfile::tempdir()?;
	let cert_path = tmpdir.path().join("valid_cert.pem");
	std::fs::write(&cert_path, cert_pem.as_bytes())?;

	let certs = jobforge::tls_utils::load_certs(&cert_path)?;
	let is_expired = jobforge::tls_utils::is_cert_expired(&certs[0])?;

	assert!(
		!is_expired,
		"certificate with not_after in the future should not be detected as expired"
	);

	Ok(())
}

#[tokio::test]
async fn test_certificate_expiring_soon_is_not_yet_expired() -> Result<(), Box<dyn std::error::Error>> {
	let mut params = CertificateParams::new(vec!["localhost".into()]);

	let now = SystemTime::now();
	let one_hour_from_now = now + Duration::from_secs(60 * 60);

	params.not_before = now.into();
	params.not_after = one_hour_from_now.into();

	let cert = rcgen::Certificate::from_params(params)?;
	let cert_pem = cert.serialize_pem()?;

	let tmpdir = tempfile::tempdir()?;
	let cert_path = tmpdir.path().join("expiring_soon_cert.pem");
	std::fs::write(&cert_path, cert_pem.as_bytes())?;

	let certs = jobforge::tls_utils::load_certs(&cert_path)?;
	let is_expired = jobforge::tls_utils::is_cert_expired(&certs[0])?;
	assert!(!is_expired, "certificate should not be expired yet");

	Ok(())
}

#[tokio::test]
async fn test_tls13_only_enforcement_is_configured() -> Result<(), Box<dyn std::error::Error>> {
	// build_server_config_tls13 pins .with_protocol_versions(&[&rustls::version::TLS13]).
	// A self-signed fixture exercises the config-building path; the same
	// call also rejects the cert for being self-signed, which is the
	// behavior asserted in tests/integration_tls.rs.
	let cert = generate_simple_self_signed(vec!["localhost".into()])?;
	let cert_pem = cert.serialize_pem()?;
	let key_pem = cert.serialize_private_key_pem();

	let tmpdir = tempfile::tempdir()?;
	let cert_path = tmpdir.path().join("cert.pem");
	let key_path = tmpdir.path().join("key.pem");
	std::fs::write(&cert_path, cert_pem.as_bytes())?;
	std::fs::write(&key_path, key_pem.as_bytes())?;

	let certs = jobforge::tls_utils::load_certs(&cert_path)?;
	let key = jobforge::tls_utils::load_private_key(&key_path)?;

	let result = jobforge::tls_utils::build_server_config_tls13(certs, key);
	assert!(result.is_err(), "self-signed certificate must be rejected");

	Ok(())
}

#[tokio::test]
async fn test_certificate_common_name_extraction() -> Result<(), Box<dyn std::error::Error>> {
	let cert = generate_simple_self_signed(vec!["test.example.com".into()])?;
	let cert_pem = cert.serialize_pem()?;

	let tmpdir = tempfile::tempdir()?;
	let cert_path = tmpdir.path().join("cn_test_cert.pem");
	std::fs::write(&cert_path, cert_pem.as_bytes())?;

	let certs = jobforge::tls_utils::load_certs(&cert_path)?;
	let cn = jobforge::tls_utils::first_common_name(&certs[0])?;

	assert!(cn.is_some(), "certificate should have a common name");

	Ok(())
}

#[tokio::test]
async fn test_certificate_dns_names_extraction() -> Result<(), Box<dyn std::error::Error>> {
	let cert = generate_simple_self_signed(vec![
		"test.example.com".into(),
		"*.example.com".into(),
		"localhost".into(),
	])?;
	let cert_pem = cert.serialize_pem()?;

	let tmpdir = tempfile::tempdir()?;
	let cert_path = tmpdir.path().join("san_test_cert.pem");
	std::fs::write(&cert_path, cert_pem.as_bytes())?;

	let certs = jobforge::tls_utils::load_certs(&cert_path)?;
	let dns_names = jobforge::tls_utils::dns_names_from_cert(&certs[0])?;

	assert!(
		!dns_names.is_empty(),
		"certificate should have DNS names in the SAN extension"
	);
	assert!(
		dns_names.contains(&"test.example.com".to_string()),
		"DNS names should include test.example.com"
	);

	Ok(())
}
