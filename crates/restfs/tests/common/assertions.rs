//! Custom assertions for restfs integration tests.

use crate::common::TestServer;
use reqwest::StatusCode;
use restfs::DEFAULT_PREFIX;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Assert that a file exists and has the expected content.
pub async fn assert_file_content(server: &TestServer, path: &str, expected: &[u8]) {
    match server.get_bytes(path).await {
        Ok(actual) => {
            assert_eq!(
                actual.as_ref(),
                expected,
                "File content mismatch at {path}: expected {} bytes, got {} bytes",
                expected.len(),
                actual.len()
            );
        }
        Err((status, body)) => {
            panic!("Failed to read file {path}: status={status}, body={body}");
        }
    }
}

/// Assert that a file exists and its SHA-256 hash matches.
pub async fn assert_file_hash(server: &TestServer, path: &str, expected_hash: &[u8; 32]) {
    match server.get_bytes(path).await {
        Ok(actual) => {
            let actual_hash = sha256(&actual);
            assert_eq!(
                &actual_hash, expected_hash,
                "File hash mismatch at {path}: expected {expected_hash:x?}, got {actual_hash:x?}"
            );
        }
        Err((status, body)) => {
            panic!("Failed to read file {path}: status={status}, body={body}");
        }
    }
}

/// Assert that a path returns 404 Not Found.
pub async fn assert_not_found(server: &TestServer, path: &str) {
    let resp = server.get(path).await;
    assert_eq!(
        resp.status(),
        StatusCode::NOT_FOUND,
        "Expected 404 for {path}, got {}",
        resp.status()
    );
}

/// Assert that a directory contains exactly the expected entries.
///
/// `expected` holds full paths without the server prefix, e.g. `"/dir/a.txt"`.
pub async fn assert_dir_entries(server: &TestServer, path: &str, expected: &[&str]) {
    let (status, body) = server.propfind_body(path, "1").await;
    assert_eq!(
        status,
        StatusCode::MULTI_STATUS,
        "PROPFIND {path} failed with status {status}: {body}"
    );

    let mut actual: HashSet<String> = extract_hrefs(&body).into_iter().collect();
    let dir = path.trim_end_matches('/');
    actual.remove(dir);
    actual.remove("");

    let expected: HashSet<String> = expected.iter().map(|s| s.to_string()).collect();
    let missing: Vec<_> = expected.difference(&actual).collect();
    let extra: Vec<_> = actual.difference(&expected).collect();
    assert!(
        missing.is_empty() && extra.is_empty(),
        "Directory {path} entries mismatch:\n  missing: {missing:?}\n  extra: {extra:?}"
    );
}

/// Assert that a directory exists (PROPFIND returns success).
pub async fn assert_dir_exists(server: &TestServer, path: &str) {
    let resp = server.propfind(path, "0").await;
    assert_eq!(
        resp.status(),
        StatusCode::MULTI_STATUS,
        "Expected directory {path} to exist"
    );
}

/// Calculate SHA-256 hash of data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Extract href values from a PROPFIND response, decoded, without the server
/// prefix and without trailing slashes.
pub fn extract_hrefs(xml: &str) -> Vec<String> {
    let mut hrefs = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("href>") {
        let after = &rest[start + "href>".len()..];
        let Some(end) = after.find('<') else {
            break;
        };
        let href = percent_decode(&after[..end].trim().replace("&amp;", "&"));
        if !href.is_empty() {
            let href = href.strip_prefix(DEFAULT_PREFIX).unwrap_or(&href);
            hrefs.push(href.trim_end_matches('/').to_string());
        }
        rest = &after[end..];
    }
    hrefs
}

/// Decode %XX escapes.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16)
        {
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let hash = sha256(b"hello world");
        assert_eq!(hash[..4], [0xb9, 0x4d, 0x27, 0xb9]);
    }

    #[test]
    fn test_extract_hrefs() {
        let xml = "<D:multistatus><D:response><D:href>/dav/a%20b/</D:href></D:response>\
                   <D:response><D:href>/dav/a%20b/c.txt</D:href></D:response></D:multistatus>";
        assert_eq!(extract_hrefs(xml), ["/a b", "/a b/c.txt"]);
    }
}
