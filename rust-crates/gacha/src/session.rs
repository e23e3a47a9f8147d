use thiserror::Error;
use url::Url;

const REDACTED_KEY: &str = "<admin-key>";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid document url '{url}': {source}")]
    InvalidDocumentUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("document url '{url}' cannot be used as a base for resource paths")]
    NotABase { url: String },
}

/// Where the machine is reachable and which privileged-access token, if any,
/// the current editor holds. Shared by the sync adapter (URL routing) and the
/// aggregate (admin-only gating).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    document_path: String,
    admin_key: Option<String>,
}

impl Session {
    pub fn new(document_url: &str) -> Result<Self, SessionError> {
        let mut parsed =
            Url::parse(document_url).map_err(|source| SessionError::InvalidDocumentUrl {
                url: document_url.to_string(),
                source,
            })?;
        if parsed.cannot_be_a_base() {
            return Err(SessionError::NotABase {
                url: document_url.to_string(),
            });
        }
        parsed.set_query(None);
        parsed.set_fragment(None);
        let mut document_path = parsed.to_string();
        if !document_path.ends_with('/') {
            document_path.push('/');
        }
        Ok(Self {
            document_path,
            admin_key: None,
        })
    }

    /// An empty key counts as no key.
    pub fn with_admin_key(mut self, admin_key: Option<String>) -> Self {
        self.admin_key = admin_key.filter(|key| !key.trim().is_empty());
        self
    }

    pub fn document_path(&self) -> &str {
        &self.document_path
    }

    pub fn admin_key(&self) -> Option<&str> {
        self.admin_key.as_deref()
    }

    pub fn has_admin_key(&self) -> bool {
        self.admin_key.is_some()
    }

    /// Strips the admin key out of `text` before it reaches logs or errors.
    pub fn redact(&self, text: &str) -> String {
        match &self.admin_key {
            Some(key) => text.replace(key.as_str(), REDACTED_KEY),
            None => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn new__appends_trailing_slash_and_drops_query() {
        let session = Session::new("http://sim.example:12046/cap/abc?x=1").unwrap();

        assert_eq!(session.document_path(), "http://sim.example:12046/cap/abc/");
    }

    #[test]
    fn new__rejects_non_base_urls() {
        let err = Session::new("mailto:owner@example.com").unwrap_err();

        assert!(matches!(err, SessionError::NotABase { .. }));
    }

    #[test]
    fn with_admin_key__treats_blank_key_as_absent() {
        let session = Session::new("http://localhost/cap/")
            .unwrap()
            .with_admin_key(Some("  ".to_string()));

        assert!(!session.has_admin_key());
    }

    #[test]
    fn redact__hides_the_key() {
        let session = Session::new("http://localhost/cap/")
            .unwrap()
            .with_admin_key(Some("s3cret".to_string()));

        assert_eq!(
            session.redact("http://localhost/cap/s3cret/get/info"),
            "http://localhost/cap/<admin-key>/get/info"
        );
    }
}
