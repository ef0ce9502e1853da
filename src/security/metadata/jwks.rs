use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Key material type of a JWK, as far as signature verification cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Hmac,
    Rsa,
    EcP256,
    EcP384,
}

impl KeyFamily {
    /// Family able to verify `alg`, `None` for algorithms keys are never
    /// published for.
    pub fn for_algorithm(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Some(KeyFamily::Hmac),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(KeyFamily::Rsa),
            Algorithm::ES256 => Some(KeyFamily::EcP256),
            Algorithm::ES384 => Some(KeyFamily::EcP384),
            _ => None,
        }
    }
}

/// One verification key from the provider's key set.
#[derive(Clone)]
pub struct SigningKey {
    kid: Option<String>,
    alg: Option<Algorithm>,
    family: KeyFamily,
    key: DecodingKey,
}

impl SigningKey {
    pub fn new(
        kid: Option<String>,
        alg: Option<Algorithm>,
        family: KeyFamily,
        key: DecodingKey,
    ) -> Self {
        Self {
            kid,
            alg,
            family,
            key,
        }
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        self.alg
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    /// A key verifies `alg` when its material fits and, if the JWK pinned an
    /// algorithm, it is the same one.
    pub fn supports(&self, alg: Algorithm) -> bool {
        KeyFamily::for_algorithm(alg) == Some(self.family)
            && (self.alg.is_none() || self.alg == Some(alg))
    }

    fn from_jwk(jwk: &Value) -> Result<Option<Self>, String> {
        let field = |name: &str| jwk.get(name).and_then(Value::as_str);

        if field("use").is_some_and(|u| !u.eq_ignore_ascii_case("sig")) {
            return Ok(None);
        }
        let kid = field("kid").map(str::to_string);
        let alg = match field("alg") {
            Some(a) => match Algorithm::from_str(a) {
                Ok(alg) => Some(alg),
                // encryption algorithms (RSA-OAEP, ...) or unknown
                Err(_) => return Ok(None),
            },
            None => None,
        };
        let kty = field("kty").ok_or("missing kty")?;

        let (family, key) = if kty.eq_ignore_ascii_case("oct") {
            let k = field("k").ok_or("oct key without k")?;
            let secret = base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(k.trim_end_matches('='))
                .map_err(|e| format!("invalid k: {e}"))?;
            (KeyFamily::Hmac, DecodingKey::from_secret(&secret))
        } else if kty.eq_ignore_ascii_case("RSA") {
            let n = field("n").ok_or("RSA key without n")?;
            let e = field("e").ok_or("RSA key without e")?;
            let key = DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?;
            (KeyFamily::Rsa, key)
        } else if kty.eq_ignore_ascii_case("EC") {
            let family = match field("crv") {
                Some("P-256") => KeyFamily::EcP256,
                Some("P-384") => KeyFamily::EcP384,
                other => return Err(format!("unsupported curve {other:?}")),
            };
            let x = field("x").ok_or("EC key without x")?;
            let y = field("y").ok_or("EC key without y")?;
            let key = DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())?;
            (family, key)
        } else {
            return Ok(None);
        };

        let signing_key = Self::new(kid, alg, family, key);
        if let Some(alg) = alg {
            if !signing_key.supports(alg) {
                return Err(format!("alg {alg:?} does not match kty {kty}"));
            }
        }
        Ok(Some(signing_key))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

/// The provider's published verification keys.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: Vec<SigningKey>,
}

impl KeySet {
    pub fn new(keys: Vec<SigningKey>) -> Self {
        Self { keys }
    }

    /// Build from a JWKS document (`{"keys": [...]}`).
    ///
    /// Encryption keys and key types that cannot verify signatures are
    /// skipped. Malformed entries are skipped as well so one bad key does
    /// not take the whole set down.
    pub fn from_jwks(document: &Value) -> Self {
        let mut keys = Vec::new();
        let entries = document
            .get("keys")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for jwk in entries {
            match SigningKey::from_jwk(jwk) {
                Ok(Some(key)) => keys.push(key),
                Ok(None) => {}
                Err(reason) => {
                    let kid = jwk.get("kid").and_then(Value::as_str).unwrap_or("");
                    debug!(kid, reason = %reason, "skipping unusable JWK");
                }
            }
        }
        Self { keys }
    }

    pub fn find(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|k| k.kid() == Some(kid))
    }

    /// Keys able to verify `alg`, in document order.
    pub fn candidates(&self, alg: Algorithm) -> impl Iterator<Item = &SigningKey> {
        self.keys.iter().filter(move |k| k.supports(alg))
    }

    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().filter_map(SigningKey::kid)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SigningKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
