use std::fmt;

/// One federated system owning part of the composite schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Backend {
    name: String,
    url: String,
}

impl Backend {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The spelling of a local name in this backend's responses.
    ///
    /// Local names are qualified by the backend-local type (`Customer.fullName`); responses only
    /// carry the field part.
    pub fn display_name<'a>(&self, local_name: &'a LocalName) -> &'a str {
        local_name.field_name()
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

/// A backend-local field token, `Type.field`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalName(String);

impl LocalName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The backend-local type, if the token is qualified.
    pub fn type_name(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(ty, _)| ty)
    }

    pub fn field_name(&self) -> &str {
        self.0
            .rsplit_once('.')
            .map(|(_, field)| field)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for LocalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
