//! AWS Signature Version 4 request signing
//!
//! Minimal SigV4 implementation covering what the S3-compatible store
//! needs: header-signed PUT/GET/DELETE and presigned GET URLs. R2 uses
//! region `auto` and service `s3`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const REGION: &str = "auto";
const SERVICE: &str = "s3";

/// Characters left unencoded in URI path segments and query values:
/// unreserved characters per RFC 3986.
const URI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// A signed request: headers to attach to the HTTP call.
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
}

pub fn sha256_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

fn hmac(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret: &str, date: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date);
    let k_region = hmac(&k_date, REGION);
    let k_service = hmac(&k_region, SERVICE);
    hmac(&k_service, "aws4_request")
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|seg| utf8_percent_encode(seg, URI_ENCODE).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn encode_query(pairs: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = pairs.iter().collect();
    sorted.sort();
    sorted
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, URI_ENCODE),
                utf8_percent_encode(v, URI_ENCODE)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn scope(date: &str) -> String {
    format!("{}/{}/{}/aws4_request", date, REGION, SERVICE)
}

fn string_to_sign(amz_date: &str, date: &str, canonical_request: &str) -> String {
    format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope(date),
        sha256_hex(canonical_request.as_bytes())
    )
}

/// Sign a request with headers (`Authorization`, `x-amz-date`,
/// `x-amz-content-sha256`).
pub fn sign_request(
    credentials: &Credentials,
    method: &str,
    host: &str,
    path: &str,
    query: &[(String, String)],
    payload: &[u8],
    now: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let content_sha256 = sha256_hex(payload);

    let canonical_headers = format!(
        "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
        host, content_sha256, amz_date
    );
    let signed_headers = "host;x-amz-content-sha256;x-amz-date";

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        encode_path(path),
        encode_query(query),
        canonical_headers,
        signed_headers,
        content_sha256
    );

    let signature = hex::encode(hmac(
        &signing_key(&credentials.secret_access_key, &date),
        &string_to_sign(&amz_date, &date, &canonical_request),
    ));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id,
        scope(&date),
        signed_headers,
        signature
    );

    SignedHeaders {
        authorization,
        amz_date,
        content_sha256,
    }
}

/// Build a presigned GET URL valid for `expires_in` seconds.
pub fn presign_get(
    credentials: &Credentials,
    host: &str,
    path: &str,
    expires_in: u64,
    now: DateTime<Utc>,
) -> String {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let query = vec![
        (
            "X-Amz-Algorithm".to_string(),
            "AWS4-HMAC-SHA256".to_string(),
        ),
        (
            "X-Amz-Credential".to_string(),
            format!("{}/{}", credentials.access_key_id, scope(&date)),
        ),
        ("X-Amz-Date".to_string(), amz_date.clone()),
        ("X-Amz-Expires".to_string(), expires_in.to_string()),
        ("X-Amz-SignedHeaders".to_string(), "host".to_string()),
    ];

    let canonical_request = format!(
        "GET\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
        encode_path(path),
        encode_query(&query),
        host
    );

    let signature = hex::encode(hmac(
        &signing_key(&credentials.secret_access_key, &date),
        &string_to_sign(&amz_date, &date, &canonical_request),
    ));

    format!(
        "https://{}{}?{}&X-Amz-Signature={}",
        host,
        encode_path(path),
        encode_query(&query),
        signature
    )
}
