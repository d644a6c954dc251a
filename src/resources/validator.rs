//! URI validation for resource registration (spec.md §4.7-4.8).

use thiserror::Error;

const MAX_URI_LENGTH: usize = 2048;
const MAX_DATA_URI_LENGTH: usize = 1024 * 1024;
const ALLOWED_SCHEMES: &[&str] = &["file", "http", "https", "data"];
const DANGEROUS_FILE_EXTENSIONS: &[&str] = &[".exe", ".bat", ".cmd", ".com", ".scr", ".pif"];
const SUSPICIOUS_QUERY_PATTERNS: &[&str] =
    &["javascript:", "data:", "vbscript:", "<script", "</script"];
const ALLOWED_DATA_MEDIA_TYPES: &[&str] = &[
    "text/plain",
    "text/html",
    "text/css",
    "text/javascript",
    "application/json",
    "application/xml",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/svg+xml",
];

/// Failures a URI can fail validation with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("uri must not be empty")]
    Empty,

    #[error("uri exceeds maximum length of {max} characters")]
    TooLong { max: usize },

    #[error("uri is not parseable: {uri}")]
    Unparseable { uri: String },

    #[error("uri scheme '{scheme}' is not allowed")]
    SchemeNotAllowed { scheme: String },

    #[error("uri contains a path traversal segment")]
    PathTraversal,

    #[error("uri contains a control character")]
    ControlCharacter,

    #[error("file uri path must be absolute or './'-prefixed")]
    FilePathNotAbsolute,

    #[error("file uri has a disallowed extension: {extension}")]
    DangerousExtension { extension: String },

    #[error("http(s) uri targets a private or loopback host: {host}")]
    PrivateHost { host: String },

    #[error("http(s) uri query string contains a suspicious pattern")]
    SuspiciousQuery,

    #[error("data uri does not match the required shape")]
    MalformedData,

    #[error("data uri media type '{media_type}' is not allowed")]
    DisallowedMediaType { media_type: String },
}

/// Validates resource URIs against a scheme allow-list and a handful of
/// per-scheme rules.
#[derive(Debug, Clone)]
pub struct UriValidator {
    allowed_schemes: Vec<String>,
}

impl Default for UriValidator {
    fn default() -> Self {
        Self {
            allowed_schemes: ALLOWED_SCHEMES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl UriValidator {
    #[must_use]
    pub fn new(allowed_schemes: Vec<String>) -> Self {
        Self { allowed_schemes }
    }

    /// Validates `uri` against every rule in spec.md §4.8.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub fn validate(&self, uri: &str) -> Result<(), ValidationError> {
        if uri.is_empty() {
            return Err(ValidationError::Empty);
        }
        // Tab, LF and CR are tolerated; every other control character is not.
        if uri.chars().any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r')) {
            return Err(ValidationError::ControlCharacter);
        }

        let (scheme, rest) = uri
            .split_once(':')
            .ok_or_else(|| ValidationError::Unparseable { uri: uri.to_string() })?;

        if !self.allowed_schemes.iter().any(|s| s == scheme) {
            return Err(ValidationError::SchemeNotAllowed {
                scheme: scheme.to_string(),
            });
        }

        if rest.split('/').any(|segment| segment == "..") {
            return Err(ValidationError::PathTraversal);
        }

        // The data-scheme length cap is specified independently (1 MiB) of
        // the generic URI cap, since a base64 payload routinely exceeds
        // 2048 characters by design.
        if scheme == "data" {
            if uri.len() > MAX_DATA_URI_LENGTH {
                return Err(ValidationError::TooLong { max: MAX_DATA_URI_LENGTH });
            }
        } else if uri.len() > MAX_URI_LENGTH {
            return Err(ValidationError::TooLong { max: MAX_URI_LENGTH });
        }

        match scheme {
            "file" => Self::validate_file(rest),
            "http" | "https" => Self::validate_http(rest),
            "data" => Self::validate_data(rest),
            _ => unreachable!("scheme already checked against allow-list"),
        }
    }

    fn validate_file(rest: &str) -> Result<(), ValidationError> {
        let path = rest.trim_start_matches("//");
        if !(path.starts_with('/') || path.starts_with("./")) {
            return Err(ValidationError::FilePathNotAbsolute);
        }
        let lower = path.to_ascii_lowercase();
        if let Some(extension) = DANGEROUS_FILE_EXTENSIONS.iter().find(|ext| lower.ends_with(**ext)) {
            return Err(ValidationError::DangerousExtension {
                extension: (*extension).to_string(),
            });
        }
        Ok(())
    }

    fn validate_http(rest: &str) -> Result<(), ValidationError> {
        if !rest.starts_with("//") || rest.len() <= 2 {
            return Err(ValidationError::Unparseable {
                uri: format!("http:{rest}"),
            });
        }
        let authority_and_path = &rest[2..];
        let authority = authority_and_path.split(['/', '?', '#']).next().unwrap_or("");
        let authority = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
        let host = if authority.starts_with('[') {
            authority.split(']').next().unwrap_or(authority).trim_start_matches('[')
        } else {
            authority.split_once(':').map_or(authority, |(h, _)| h)
        };
        if is_private_or_loopback_host(host) {
            return Err(ValidationError::PrivateHost {
                host: host.to_string(),
            });
        }
        if let Some(query) = authority_and_path.split_once('?').map(|(_, q)| q) {
            let lower_query = query.to_ascii_lowercase();
            if SUSPICIOUS_QUERY_PATTERNS.iter().any(|p| lower_query.contains(p)) {
                return Err(ValidationError::SuspiciousQuery);
            }
        }
        Ok(())
    }

    fn validate_data(rest: &str) -> Result<(), ValidationError> {
        // `^([^;,]+)(;[^,]*)?,(.*)$` applied to `rest` (the part after `data:`).
        let (header, _payload) = rest.split_once(',').ok_or(ValidationError::MalformedData)?;
        let media_type = header.split(';').next().unwrap_or("");
        if media_type.is_empty() || media_type.contains(':') {
            return Err(ValidationError::MalformedData);
        }
        if !ALLOWED_DATA_MEDIA_TYPES.contains(&media_type) {
            return Err(ValidationError::DisallowedMediaType {
                media_type: media_type.to_string(),
            });
        }
        Ok(())
    }
}

fn is_private_or_loopback_host(host: &str) -> bool {
    let host = host.trim_matches(|c| c == '[' || c == ']');
    if host.eq_ignore_ascii_case("localhost") || host == "::1" || host == "0.0.0.0" {
        return true;
    }
    let octets: Vec<&str> = host.split('.').collect();
    if octets.len() != 4 {
        return false;
    }
    let Ok(parts) = octets.iter().map(|o| o.parse::<u8>()).collect::<Result<Vec<u8>, _>>() else {
        return false;
    };
    match parts[..] {
        [10, ..] => true,
        [172, b, ..] => (16..=31).contains(&b),
        [192, 168, ..] => true,
        [127, ..] => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_each_allowed_scheme() {
        let validator = UriValidator::default();
        assert!(validator.validate("file:///a/b.txt").is_ok());
        assert!(validator.validate("https://example.com/a").is_ok());
        assert!(validator.validate("data:text/plain,hello").is_ok());
    }

    #[test]
    fn rejects_empty_uri() {
        assert_eq!(UriValidator::default().validate(""), Err(ValidationError::Empty));
    }

    #[test]
    fn rejects_disallowed_scheme() {
        let err = UriValidator::default().validate("ftp://example.com/a").unwrap_err();
        assert!(matches!(err, ValidationError::SchemeNotAllowed { .. }));
    }

    #[test]
    fn rejects_path_traversal_in_file_uri() {
        let err = UriValidator::default()
            .validate("file:///a/../../etc/passwd")
            .unwrap_err();
        assert_eq!(err, ValidationError::PathTraversal);
    }

    #[test]
    fn rejects_control_characters() {
        let err = UriValidator::default().validate("file:///a\u{0}b").unwrap_err();
        assert_eq!(err, ValidationError::ControlCharacter);
    }

    #[test]
    fn allows_tab_and_newline_in_uri() {
        assert!(UriValidator::default().validate("file:///a\tb").is_ok());
        assert!(UriValidator::default().validate("file:///a\nb").is_ok());
        assert!(UriValidator::default().validate("file:///a\rb").is_ok());
    }

    #[test]
    fn rejects_overlong_uri() {
        let long = format!("file:///{}", "a".repeat(MAX_URI_LENGTH));
        let err = UriValidator::default().validate(&long).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { .. }));
    }

    #[test]
    fn custom_scheme_list_is_honoured() {
        let validator = UriValidator::new(vec!["custom".to_string()]);
        assert!(validator.validate("custom:thing").is_ok());
        assert!(validator.validate("file:///a").is_err());
    }

    #[test]
    fn rejects_relative_file_path_without_dot_slash_prefix() {
        let err = UriValidator::default().validate("file:relative/path.txt").unwrap_err();
        assert_eq!(err, ValidationError::FilePathNotAbsolute);
    }

    #[test]
    fn accepts_dot_slash_prefixed_file_path() {
        assert!(UriValidator::default().validate("file:./relative/path.txt").is_ok());
    }

    #[test]
    fn rejects_dangerous_file_extension() {
        let err = UriValidator::default().validate("file:///a/payload.exe").unwrap_err();
        assert!(matches!(err, ValidationError::DangerousExtension { .. }));
    }

    #[test]
    fn rejects_localhost_and_private_http_hosts() {
        assert!(matches!(
            UriValidator::default().validate("http://localhost/a").unwrap_err(),
            ValidationError::PrivateHost { .. }
        ));
        assert!(matches!(
            UriValidator::default().validate("http://127.0.0.1/a").unwrap_err(),
            ValidationError::PrivateHost { .. }
        ));
        assert!(matches!(
            UriValidator::default().validate("http://10.1.2.3/a").unwrap_err(),
            ValidationError::PrivateHost { .. }
        ));
        assert!(matches!(
            UriValidator::default().validate("http://192.168.1.1/a").unwrap_err(),
            ValidationError::PrivateHost { .. }
        ));
        assert!(matches!(
            UriValidator::default().validate("http://172.16.0.1/a").unwrap_err(),
            ValidationError::PrivateHost { .. }
        ));
        assert!(UriValidator::default().validate("http://example.com/a").is_ok());
    }

    #[test]
    fn rejects_suspicious_query_strings() {
        let err = UriValidator::default()
            .validate("https://example.com/a?x=javascript:alert(1)")
            .unwrap_err();
        assert_eq!(err, ValidationError::SuspiciousQuery);

        let err = UriValidator::default()
            .validate("https://example.com/a?x=<script>alert(1)</script>")
            .unwrap_err();
        assert_eq!(err, ValidationError::SuspiciousQuery);
    }

    #[test]
    fn rejects_malformed_data_uri() {
        let err = UriValidator::default().validate("data:no-comma-here").unwrap_err();
        assert_eq!(err, ValidationError::MalformedData);
    }

    #[test]
    fn rejects_disallowed_data_media_type() {
        let err = UriValidator::default()
            .validate("data:application/octet-stream,AAAA")
            .unwrap_err();
        assert!(matches!(err, ValidationError::DisallowedMediaType { .. }));
    }

    #[test]
    fn rejects_data_uri_over_one_mebibyte() {
        let payload = "a".repeat(MAX_DATA_URI_LENGTH + 1);
        let uri = format!("data:text/plain,{payload}");
        let err = UriValidator::default().validate(&uri).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max } if max == MAX_DATA_URI_LENGTH));
    }

    #[test]
    fn accepts_data_uri_with_charset_parameter() {
        assert!(UriValidator::default()
            .validate("data:text/plain;charset=utf-8,hello")
            .is_ok());
    }
}
