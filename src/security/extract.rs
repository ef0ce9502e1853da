use http::header::AUTHORIZATION;
use http::HeaderMap;

/// Result of looking for a bearer credential on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    Bearer(&'a str),
    NoCredential,
}

impl<'a> Credential<'a> {
    pub fn token(self) -> Option<&'a str> {
        match self {
            Credential::Bearer(t) => Some(t),
            Credential::NoCredential => None,
        }
    }
}

/// Pull the bearer token out of the `Authorization` header.
///
/// The scheme is matched case-insensitively. A missing header, a header that
/// is not valid visible ASCII, another scheme, or an empty token all yield
/// [`Credential::NoCredential`]. The token itself is not inspected.
pub fn extract_bearer(headers: &HeaderMap) -> Credential<'_> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Credential::NoCredential;
    };
    let Ok(value) = value.to_str() else {
        return Credential::NoCredential;
    };
    let value = value.trim();
    let Some((scheme, token)) = value.split_once(' ') else {
        return Credential::NoCredential;
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Credential::NoCredential;
    }
    match token.trim() {
        "" => Credential::NoCredential,
        token => Credential::Bearer(token),
    }
}
