use serde::{Deserialize, Serialize};

use crate::integration::store::Document;

use super::Sub;

#[derive(Deserialize)]
struct Profile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserInfo {
    pub sub: Sub,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserInfo {
    /// The trimmed name, if there is one worth showing.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

impl TryFrom<&Document> for UserInfo {
    type Error = super::Error;

    fn try_from(doc: &Document) -> super::Result<Self> {
        let profile = doc
            .decode::<Profile>()
            .map_err(super::Error::from)?;

        Ok(Self {
            sub: Sub::from(doc.id()),
            name: profile.name,
            email: profile.email,
        })
    }
}
