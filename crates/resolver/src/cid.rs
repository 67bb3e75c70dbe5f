#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{Jwk, ResolverError};

/// Controlled Identifier Document: binds an HTTPS identifier to verification
/// methods and service endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidDocument {
    #[serde(rename = "@context", alias = "context", default)]
    pub context: Vec<String>,
    pub id: String,
    #[serde(default)]
    pub authentication: Vec<VerificationMethod>,
    #[serde(default)]
    pub service: Vec<ServiceEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub controller: String,
    #[serde(rename = "publicKeyJwk")]
    pub public_key_jwk: Jwk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

impl CidDocument {
    /// Structural validation against the identifier the document was fetched
    /// as. Key material is not checked here; signature verification happens
    /// at the validator.
    pub fn validate(&self, fetched_as: &str) -> Result<(), ResolverError> {
        let id = lws_core::normalize_uri(&self.id)
            .map_err(|_| ResolverError::InvalidDocument("id is not an absolute URI".to_owned()))?;
        let fetched_as = lws_core::normalize_uri(fetched_as)
            .map_err(|_| ResolverError::InvalidUri(fetched_as.to_owned()))?;
        if id != fetched_as {
            return Err(ResolverError::InvalidDocument(format!(
                "id {id:?} does not match the resolved identifier"
            )));
        }

        for method in &self.authentication {
            if method.controller != self.id {
                return Err(ResolverError::InvalidDocument(format!(
                    "verification method {:?} has a foreign controller",
                    method.id
                )));
            }
            let fragment_of_id = method
                .id
                .strip_prefix(&self.id)
                .and_then(|rest| rest.strip_prefix('#'))
                .is_some();
            let bare_kid = method.public_key_jwk.kid.as_deref() == Some(method.id.as_str());
            if !fragment_of_id && !bare_kid {
                return Err(ResolverError::InvalidDocument(format!(
                    "verification method id {:?} is neither a fragment of the document id nor a bare kid",
                    method.id
                )));
            }
        }

        Ok(())
    }

    /// Look up a verification method by key id. Search order: fragment id,
    /// raw id, then `publicKeyJwk.kid`; first match wins.
    #[must_use]
    pub fn verification_method(&self, kid: &str) -> Option<&VerificationMethod> {
        let fragment = format!("{}#{kid}", self.id);
        self.authentication
            .iter()
            .find(|method| method.id == fragment)
            .or_else(|| self.authentication.iter().find(|method| method.id == kid))
            .or_else(|| {
                self.authentication
                    .iter()
                    .find(|method| method.public_key_jwk.kid.as_deref() == Some(kid))
            })
    }
}
