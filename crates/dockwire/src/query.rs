//! Request target construction.

use serde::Serialize;
use url::form_urlencoded;

use dockwire_http::WireError;

/// Path plus query string of one API call, before the version prefix.
#[derive(Debug, Clone, Default)]
pub(crate) struct Target {
    path: String,
    query: Vec<(&'static str, String)>,
}

impl Target {
    pub(crate) fn new(path: &'static str) -> Self {
        Self {
            path: path.to_string(),
            query: Vec::new(),
        }
    }

    /// Appends a caller-supplied path segment such as a container id or an
    /// image reference. Image references keep their `/` separators.
    pub(crate) fn segment(mut self, value: &str) -> Result<Self, WireError> {
        let invalid = value.is_empty()
            || value
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '?' | '#' | '%'))
            || value.split('/').any(|part| part.is_empty() || part == "..");
        if invalid {
            return Err(WireError::InvalidInput(format!(
                "invalid resource name {value:?}"
            )));
        }
        self.path.push('/');
        self.path.push_str(value);
        Ok(self)
    }

    pub(crate) fn then(mut self, literal: &'static str) -> Self {
        self.path.push('/');
        self.path.push_str(literal);
        self
    }

    pub(crate) fn param(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    pub(crate) fn param_opt(self, key: &'static str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    pub(crate) fn flag(self, key: &'static str, value: bool) -> Self {
        self.param(key, if value { "1" } else { "0" })
    }

    /// Adds `key` only when set.
    pub(crate) fn flag_if(self, key: &'static str, value: bool) -> Self {
        if value {
            self.param(key, "1")
        } else {
            self
        }
    }

    /// JSON-encoded parameter, skipped when `value` is empty.
    pub(crate) fn json_param<T>(self, key: &'static str, value: &T, empty: bool) -> Result<Self, WireError>
    where
        T: Serialize + ?Sized,
    {
        if empty {
            return Ok(self);
        }
        let encoded = serde_json::to_string(value)?;
        Ok(self.param(key, encoded))
    }

    pub(crate) fn build(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();
        format!("{}?{}", self.path, query)
    }
}
